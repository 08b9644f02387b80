use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)(ms|s|m)$").expect("duration regex must compile"));

/// Parse a script duration such as `250ms`, `5s` or `2m`.
///
/// Returns `None` for anything else, including signs, whitespace, fractional
/// values, or numbers too large to represent.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let caps = DURATION_RE.captures(text)?;
    let value: u64 = caps[1].parse().ok()?;
    let ms = match &caps[2] {
        "ms" => value,
        "s" => value.checked_mul(1_000)?,
        "m" => value.checked_mul(60_000)?,
        _ => return None,
    };
    Some(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("0s"), Some(Duration::ZERO));
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "5", "ms", "-1s", "1.5s", "5 s", "5h", "s5", "10sec"] {
            assert_eq!(parse_duration(bad), None, "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_overflow_is_rejected() {
        assert_eq!(parse_duration("99999999999999999999ms"), None);
        assert_eq!(parse_duration(&format!("{}m", u64::MAX)), None);
    }
}

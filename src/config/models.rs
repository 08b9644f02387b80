use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration for Otto.
///
/// Deserialized from an optional JSON file. Every field has a default, so an
/// empty object `{}` is a valid configuration. Command-line flags override
/// the values read here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(default)]
pub struct Config {
    /// Time a key is held between its down and up events, in milliseconds.
    pub interval_ms: u64,

    /// Which key event backend to use.
    pub backend: Backend,

    /// Directory scanned for `event*` devices when recording with the direct backend.
    pub device_dir: PathBuf,

    /// Name of the virtual input device created by the direct backend.
    #[validate(min_length = 1)]
    pub device_name: String,

    /// Poll timeout of the capture loop, in milliseconds. Bounds how long
    /// stopping a recording can take.
    #[validate(minimum = 1)]
    #[validate(maximum = 60000)]
    pub poll_timeout_ms: u16,

    /// Duplicate-event suppression window for recording, in milliseconds.
    #[validate(maximum = 10000)]
    pub debounce_ms: u64,

    /// Base URL of the device's app manager (`launch_app` / `close_app`).
    #[validate(min_length = 1)]
    pub app_endpoint: String,

    /// Pause after a successful app request, in milliseconds.
    pub app_settle_ms: u64,

    /// Extra or replacement key names, applied on top of the backend's defaults.
    /// Example: `{ "netflix": 412 }`
    pub key_overrides: KeyOverrides,
}

/// Key name -> backend code.
pub type KeyOverrides = BTreeMap<String, u32>;

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            backend: Backend::default(),
            device_dir: PathBuf::from("/dev/input"),
            device_name: "OttoUInput".to_string(),
            poll_timeout_ms: 500,
            debounce_ms: 200,
            app_endpoint: "http://127.0.0.1:9005".to_string(),
            app_settle_ms: 5000,
            key_overrides: KeyOverrides::new(),
        }
    }
}

/// Key event backend.
/// - "direct": Linux uinput for emission, evdev devices for capture
/// - "bus": the platform message bus
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Direct,
    Bus,
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "bus" => Ok(Self::Bus),
            other => Err(format!("unknown backend '{other}' (expected direct or bus)")),
        }
    }
}

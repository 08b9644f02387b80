use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::sink::{KeyEvent, KeyEventKind};

/// Default window for collapsing repeated key-down events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Drops key-down events that repeat the same code within a short window.
///
/// Each `(kind, code)` pair keeps the time it was last accepted. Only key-downs
/// are ever dropped; ups and repeats are always accepted and only refresh
/// their own timestamp. A dropped event does not refresh anything, so a key
/// held in a noisy stream is still accepted once per window.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_seen: HashMap<KeyEvent, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: HashMap::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns `false` when `event`, observed at `now`, should be dropped.
    pub fn accept(&mut self, event: KeyEvent, now: Instant) -> bool {
        if event.kind == KeyEventKind::Down {
            if let Some(prev) = self.last_seen.get(&event) {
                if now.saturating_duration_since(*prev) < self.window {
                    return false;
                }
            }
        }
        self.last_seen.insert(event, now);
        true
    }

    pub fn reset(&mut self) {
        self.last_seen.clear();
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

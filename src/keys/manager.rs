use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error};

use super::table::KeyTable;
use crate::sink::{EventSink, KeyEventKind};

/// Turns key names into timed down/up sequences on an `EventSink`.
pub struct KeyManager {
    table: Arc<KeyTable>,
    sink: Arc<dyn EventSink>,
    interval: Duration,
}

impl KeyManager {
    /// - `interval`: time a key is held between its down and up events.
    pub fn new(table: Arc<KeyTable>, sink: Arc<dyn EventSink>, interval: Duration) -> Self {
        Self {
            table,
            sink,
            interval,
        }
    }

    pub fn table(&self) -> &KeyTable {
        &self.table
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Press and release `key` `repeat` times. Unknown keys are logged and skipped.
    pub fn send_key_press(&self, key: &str, repeat: u32) {
        let Some(code) = self.lookup(key) else {
            return;
        };
        for _ in 0..repeat {
            self.sink.emit(KeyEventKind::Down, code);
            thread::sleep(self.interval);
            self.sink.emit(KeyEventKind::Up, code);
        }
        debug!(
            target: "otto::keys",
            %key, repeat, interval_ms = self.interval.as_millis() as u64,
            "Sent key press"
        );
    }

    /// Release `key` without a preceding press.
    pub fn send_key_release(&self, key: &str) {
        let Some(code) = self.lookup(key) else {
            return;
        };
        self.sink.emit(KeyEventKind::Up, code);
        debug!(target: "otto::keys", %key, "Sent key release");
    }

    /// Hold `key` down for `duration`, then release it.
    pub fn send_key_hold(&self, key: &str, duration: Duration) {
        let Some(code) = self.lookup(key) else {
            return;
        };
        self.sink.emit(KeyEventKind::Down, code);
        thread::sleep(duration);
        self.sink.emit(KeyEventKind::Up, code);
        debug!(
            target: "otto::keys",
            %key, duration_ms = duration.as_millis() as u64,
            "Sent key hold"
        );
    }

    fn lookup(&self, key: &str) -> Option<u32> {
        let code = self.table.code_of(key);
        if code.is_none() {
            error!(target: "otto::keys", %key, "Invalid key");
        }
        code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::sink::KeyEvent;
    use crate::sink::testing::MemorySink;

    fn manager() -> (KeyManager, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let km = KeyManager::new(
            Arc::new(KeyTable::for_backend(Backend::Direct)),
            sink.clone(),
            Duration::ZERO,
        );
        (km, sink)
    }

    #[test]
    fn test_press_emits_down_up_pairs() {
        let (km, sink) = manager();
        km.send_key_press("up", 2);
        assert_eq!(
            sink.emitted(),
            vec![
                KeyEvent::new(KeyEventKind::Down, 103),
                KeyEvent::new(KeyEventKind::Up, 103),
                KeyEvent::new(KeyEventKind::Down, 103),
                KeyEvent::new(KeyEventKind::Up, 103),
            ]
        );
    }

    #[test]
    fn test_unknown_key_emits_nothing() {
        let (km, sink) = manager();
        km.send_key_press("nope", 3);
        km.send_key_release("nope");
        km.send_key_hold("nope", Duration::ZERO);
        assert!(sink.emitted().is_empty());
    }

    #[test]
    fn test_release_and_hold() {
        let (km, sink) = manager();
        km.send_key_release("mute");
        km.send_key_hold("power", Duration::from_millis(1));
        assert_eq!(
            sink.emitted(),
            vec![
                KeyEvent::new(KeyEventKind::Up, 55),
                KeyEvent::new(KeyEventKind::Down, 116),
                KeyEvent::new(KeyEventKind::Up, 116),
            ]
        );
    }
}

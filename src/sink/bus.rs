//! Message-bus backend.
//!
//! Set-top-box middleware exposes key injection and IR key notifications over a
//! platform message bus. `MessageBus` is the narrow surface this crate needs from
//! it; `BusSink` adapts any such bus to `EventSink`.
//!
//! Key types on the bus use the platform encoding (`BUS_KEY_DOWN`, ...), not the
//! Linux input values. Delivery happens on whatever thread the bus chooses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tracing::{debug, error, trace, warn};

use super::{Capture, EventSink, KeyEvent, KeyEventHandler, KeyEventKind};
use crate::keys::KeyCode;

pub const BUS_KEY_DOWN: u32 = 0x0000_8000;
pub const BUS_KEY_UP: u32 = 0x0000_8100;
pub const BUS_KEY_REPEAT: u32 = 0x0000_8200;

/// Raw bus notification callback: `(key_type, key_code)`.
pub type RawKeyHandler = Arc<dyn Fn(u32, KeyCode) + Send + Sync>;

/// Identifies one `subscribe` registration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// The platform bus operations used by `BusSink`.
pub trait MessageBus: Send + Sync {
    /// Inject a key event into the platform input stack.
    fn dispatch(&self, key_type: u32, code: KeyCode) -> Result<()>;

    /// Register a callback for IR key notifications.
    fn subscribe(&self, handler: RawKeyHandler) -> Result<SubscriptionId>;

    /// Remove a previously registered callback.
    fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;
}

pub fn encode_kind(kind: KeyEventKind) -> u32 {
    match kind {
        KeyEventKind::Down => BUS_KEY_DOWN,
        KeyEventKind::Up => BUS_KEY_UP,
        KeyEventKind::Repeat => BUS_KEY_REPEAT,
    }
}

pub fn decode_kind(key_type: u32) -> Option<KeyEventKind> {
    match key_type {
        BUS_KEY_DOWN => Some(KeyEventKind::Down),
        BUS_KEY_UP => Some(KeyEventKind::Up),
        BUS_KEY_REPEAT => Some(KeyEventKind::Repeat),
        _ => None,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process bus: every dispatched key is delivered to all subscribers,
/// synchronously, on the dispatching thread.
#[derive(Default)]
pub struct LoopbackBus {
    subscribers: Mutex<Vec<(SubscriptionId, RawKeyHandler)>>,
    next_id: AtomicU64,
}

impl LoopbackBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }
}

impl MessageBus for LoopbackBus {
    fn dispatch(&self, key_type: u32, code: KeyCode) -> Result<()> {
        // Snapshot so callbacks may subscribe/unsubscribe without deadlocking.
        let handlers: Vec<RawKeyHandler> = lock(&self.subscribers)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        trace!(
            target: "otto::sink", key_type, code, subscribers = handlers.len(),
            "Loopback dispatch"
        );
        for handler in handlers {
            handler(key_type, code);
        }
        Ok(())
    }

    fn subscribe(&self, handler: RawKeyHandler) -> Result<SubscriptionId> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.subscribers).push((id, handler));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let mut subs = lock(&self.subscribers);
        let before = subs.len();
        subs.retain(|(sid, _)| *sid != id);
        if subs.len() == before {
            warn!(target: "otto::sink", ?id, "Unsubscribe for unknown subscription");
        }
        Ok(())
    }
}

/// `EventSink` delegating to a `MessageBus` obtained once at startup.
pub struct BusSink {
    bus: Arc<dyn MessageBus>,
}

impl BusSink {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }
}

impl EventSink for BusSink {
    fn name(&self) -> &'static str {
        "bus"
    }

    fn emit(&self, kind: KeyEventKind, code: KeyCode) {
        match self.bus.dispatch(encode_kind(kind), code) {
            Ok(()) => debug!(target: "otto::sink", code, ?kind, "Key event dispatched"),
            Err(e) => error!(
                target: "otto::sink", code, ?kind, error = %e,
                "Failed to dispatch key event"
            ),
        }
    }

    fn start_capture(&self, handler: KeyEventHandler) -> Result<Box<dyn Capture>> {
        let raw: RawKeyHandler = Arc::new(move |key_type, code| match decode_kind(key_type) {
            Some(kind) => handler(KeyEvent::new(kind, code)),
            None => debug!(target: "otto::sink", key_type, code, "Unhandled bus key type"),
        });
        let id = self.bus.subscribe(raw)?;
        debug!(target: "otto::sink", ?id, "IR key handler registered");
        Ok(Box::new(BusCapture {
            bus: Arc::clone(&self.bus),
            id: Some(id),
        }))
    }
}

struct BusCapture {
    bus: Arc<dyn MessageBus>,
    id: Option<SubscriptionId>,
}

impl Capture for BusCapture {
    fn stop(&mut self) {
        if let Some(id) = self.id.take() {
            match self.bus.unsubscribe(id) {
                Ok(()) => debug!(target: "otto::sink", ?id, "IR key handler removed"),
                Err(e) => error!(
                    target: "otto::sink", ?id, error = %e,
                    "Failed to remove IR key handler"
                ),
            }
        }
    }
}

impl Drop for BusCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;

    #[test]
    fn test_kind_encoding() {
        for kind in [KeyEventKind::Down, KeyEventKind::Up, KeyEventKind::Repeat] {
            assert_eq!(decode_kind(encode_kind(kind)), Some(kind));
        }
        assert_eq!(decode_kind(0x1234), None);
    }

    #[test]
    fn test_capture_receives_emitted_keys_until_stopped() {
        let bus = Arc::new(LoopbackBus::new());
        let sink = BusSink::new(bus.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler: KeyEventHandler = {
            let seen = Arc::clone(&seen);
            Arc::new(move |ev: KeyEvent| seen.lock().unwrap().push(ev))
        };

        let mut capture = sink.start_capture(handler).unwrap();
        assert_eq!(bus.subscriber_count(), 1);

        sink.emit(KeyEventKind::Down, 0x8C);
        sink.emit(KeyEventKind::Up, 0x8C);
        bus.dispatch(0xdead, 0x8C).unwrap();

        capture.stop();
        assert_eq!(bus.subscriber_count(), 0);
        sink.emit(KeyEventKind::Down, 0x81);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                KeyEvent::new(KeyEventKind::Down, 0x8C),
                KeyEvent::new(KeyEventKind::Up, 0x8C),
            ]
        );
    }

    struct BrokenBus;

    impl MessageBus for BrokenBus {
        fn dispatch(&self, _key_type: u32, _code: KeyCode) -> Result<()> {
            bail!("dispatcher unavailable")
        }
        fn subscribe(&self, _handler: RawKeyHandler) -> Result<SubscriptionId> {
            bail!("register failed")
        }
        fn unsubscribe(&self, _id: SubscriptionId) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_bus_failures() {
        let sink = BusSink::new(Arc::new(BrokenBus));
        // Emission failure is swallowed.
        sink.emit(KeyEventKind::Down, 1);
        // Registration failure is propagated.
        assert!(sink.start_capture(Arc::new(|_: KeyEvent| {})).is_err());
    }
}

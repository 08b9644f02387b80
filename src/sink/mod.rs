/*!
Event sinks: where synthetic key events go, and where live key events come from.

An `EventSink` has two jobs:
- `emit` a single key event (down, up, or repeat) into the device input stack
- `start_capture` a live stream of observed key events, funnelled into one handler

Backends:
- `uinput.rs` -> `UinputSink` (virtual input device + polling of `/dev/input/event*`)
- `bus.rs`    -> `BusSink`    (delegates to a platform `MessageBus`)
- `LogSink`   (this file)     -> dry-run backend that only logs

Backends are selected at runtime by `build_sink`, so every consumer (KeyManager,
Recorder) holds an `Arc<dyn EventSink>` and never a concrete type.

Emission failures are logged and swallowed; a failed event never aborts a run.
Capture setup failures are returned to the caller.
*/

use std::sync::Arc;

use anyhow::{Result, bail};
use tracing::{info, warn};

use crate::config::{Backend, Config};
use crate::keys::KeyCode;

pub mod bus;
pub mod uinput;

pub use bus::{BusSink, LoopbackBus, MessageBus};
pub use uinput::UinputSink;

/// The three kinds of key event a remote produces.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum KeyEventKind {
    Down,
    Up,
    Repeat,
}

/// A decoded key event, independent of backend encoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub code: KeyCode,
}

impl KeyEvent {
    pub fn new(kind: KeyEventKind, code: KeyCode) -> Self {
        Self { kind, code }
    }
}

/// Callback receiving every captured key event. May run on any thread.
pub type KeyEventHandler = Arc<dyn Fn(KeyEvent) + Send + Sync>;

/// Capability implemented by every key event backend.
pub trait EventSink: Send + Sync {
    /// Static human-readable identifier (used in logs).
    fn name(&self) -> &'static str;

    /// Emit one key event. Failures are logged, never returned.
    fn emit(&self, kind: KeyEventKind, code: KeyCode);

    /// Start delivering live key events to `handler` until the returned capture is stopped.
    fn start_capture(&self, handler: KeyEventHandler) -> Result<Box<dyn Capture>>;
}

/// A running live-event capture.
///
/// `stop` must release every resource the capture holds before returning
/// (worker threads joined, descriptors closed, callbacks unregistered).
/// Calling it twice is harmless.
pub trait Capture: Send {
    fn stop(&mut self);
}

/// Dry-run backend: logs each event instead of emitting it.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl LogSink {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn emit(&self, kind: KeyEventKind, code: KeyCode) {
        info!(target: "otto::sink", ?kind, code, "DRY-RUN emit");
    }

    fn start_capture(&self, _handler: KeyEventHandler) -> Result<Box<dyn Capture>> {
        bail!("Recording is not available in dry-run mode")
    }
}

/// Construct the sink selected by the configuration.
///
/// Device or bus initialization failures are fatal and propagated.
pub fn build_sink(cfg: &Config, dry_run: bool) -> Result<Arc<dyn EventSink>> {
    if dry_run {
        info!(target: "otto::sink", "Dry-run enabled; key events will only be logged");
        return Ok(Arc::new(LogSink::new()));
    }

    let sink: Arc<dyn EventSink> = match cfg.backend {
        Backend::Direct => Arc::new(UinputSink::new(
            &cfg.device_name,
            &cfg.device_dir,
            cfg.poll_timeout_ms,
        )?),
        Backend::Bus => {
            warn!(
                target: "otto::sink",
                "Bus backend uses the in-process loopback bus; keys do not reach platform \
                 middleware and nothing external can be recorded"
            );
            Arc::new(BusSink::new(Arc::new(LoopbackBus::new())))
        }
    };
    info!(target: "otto::sink", sink = sink.name(), "Event sink ready");
    Ok(sink)
}

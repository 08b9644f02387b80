#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! Otto: a scriptable remote-control simulator for set-top-box testing.
//!
//! Otto replays plain-text key scripts (`key_press`, `wait`, loops, variables,
//! app launches) against a device's input stack, and records live remote key
//! presses back into the same script format.
//!
//! - `config`: Configuration models, loader, and schema helpers.
//! - `executor`: Script parsing, command dispatch, and the script engine.
//! - `keys`: Key tables and timed key presses.
//! - `recorder`: Live key capture into a script file.
//! - `sink`: Key event backends (uinput/evdev, message bus, dry-run).
//! - `utils`: Variable resolution and duration parsing.
//!
//! Use `otto::prelude::*` to bring commonly used items into scope quickly.

/// Public module: configuration (models, loader, schema helpers).
pub mod config;
/// Public module: script engine, dispatcher and built-in commands.
pub mod executor;
/// Public module: key tables and the key manager.
pub mod keys;
/// Public module: key event recording.
pub mod recorder;
/// Public module: key event backends.
pub mod sink;
/// Public module: utilities (interpolation, durations).
pub mod utils;

/// Crate-level constants for consumers that want to inspect package metadata at runtime.
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the crate version (e.g., "0.1.0").
#[inline]
pub const fn version() -> &'static str {
    PKG_VERSION
}

fn parse_level(s: &str) -> Option<tracing::Level> {
    use tracing::Level;
    match s.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Initialize tracing (logging).
/// - `level` wins when given and recognised.
/// - Otherwise honors the `RUST_LOG` environment variable as a plain level name.
/// - Falls back to `info`.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init_tracing(level: Option<&str>) {
    use tracing_subscriber::fmt;

    let level = level
        .and_then(parse_level)
        .or_else(|| std::env::var("RUST_LOG").ok().as_deref().and_then(parse_level))
        .unwrap_or(tracing::Level::INFO);

    // Ignore the error if the global subscriber was already set.
    let _ = fmt().with_max_level(level).try_init();
}

/// A convenient set of exports for most consumers.
///
/// Bring this into scope with:
/// `use otto::prelude::*;`
pub mod prelude {
    pub use anyhow::{Context, Error, Result, anyhow, bail, ensure};

    pub use tracing::{debug, error, info, trace, warn};

    pub use std::time::Duration;

    pub use crate::config::{Backend, Config};
    pub use crate::executor::{
        Builtins, Dispatcher, HttpLauncher, ScriptEngine, register_builtins, script,
    };
    pub use crate::keys::{KeyManager, KeyTable};
    pub use crate::recorder::Recorder;
    pub use crate::sink::{EventSink, KeyEventKind, build_sink};

    pub use crate::{config, executor, keys, recorder, sink, utils};
}

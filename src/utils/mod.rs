//! Utilities for Otto.
//!
//! Submodules:
//! - `interpolation`: the script variable store and `$name` argument resolution.
//! - `duration`: parsing of `wait`-style durations (`250ms`, `5s`, `2m`).

pub mod duration;
pub mod interpolation;

pub use duration::parse_duration;
pub use interpolation::{VAR_SIGIL, VariableStore, resolve_args};

//! Key names, key codes, and timed key presses.
//!
//! - `table`: the bidirectional `KeyTable` and the default code sets per backend.
//! - `manager`: `KeyManager`, which presses keys by name through an `EventSink`.

pub mod manager;
pub mod table;

pub use manager::KeyManager;
pub use table::{BUS_IR_KEYS, KeyCode, KeyTable, LINUX_INPUT_KEYS};

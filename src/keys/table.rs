use tracing::{debug, warn};

use crate::config::Backend;

/// Numeric key code as understood by the selected input backend.
pub type KeyCode = u32;

/// Remote-control key names mapped to Linux input (`linux/input-event-codes.h`) codes.
pub const LINUX_INPUT_KEYS: &[(&str, KeyCode)] = &[
    ("0", 11),
    ("1", 2),
    ("2", 3),
    ("3", 4),
    ("4", 5),
    ("5", 6),
    ("6", 7),
    ("7", 8),
    ("8", 9),
    ("9", 10),
    ("up", 103),
    ("down", 108),
    ("left", 105),
    ("right", 106),
    ("enter", 28),
    ("mute", 55),
    ("volup", 78),
    ("voldown", 74),
    ("play", 207),
    ("pause", 119),
    ("stop", 128),
    ("exit", 1),
    ("info", 358),
    ("red", 107),
    ("green", 111),
    ("yellow", 62),
    ("blue", 110),
    ("power", 116),
    ("home", 102),
    ("settings", 60),
    ("record", 63),
    ("input", 67),
];

/// Remote-control key names mapped to the platform bus IR key codes.
pub const BUS_IR_KEYS: &[(&str, KeyCode)] = &[
    ("0", 0x30),
    ("1", 0x31),
    ("2", 0x32),
    ("3", 0x33),
    ("4", 0x34),
    ("5", 0x35),
    ("6", 0x36),
    ("7", 0x37),
    ("8", 0x38),
    ("9", 0x39),
    ("up", 0x81),
    ("down", 0x82),
    ("left", 0x83),
    ("right", 0x84),
    ("enter", 0x85),
    ("mute", 0x8C),
    ("volup", 0x8A),
    ("voldown", 0x8B),
    ("play", 0x99),
    ("pause", 0x9B),
    ("stop", 0x9A),
    ("exit", 0x87),
    ("info", 0x8E),
    ("red", 0x94),
    ("green", 0x9F),
    ("yellow", 0x92),
    ("blue", 0x93),
    ("power", 0x80),
    ("home", 0x8D),
    ("settings", 0xA1),
    ("record", 0x9C),
    ("input", 0xD0),
];

/// Bidirectional key name <-> code table.
///
/// Entries keep their definition order: defaults first, then names added later.
/// Reverse lookups return the first name (in that order) carrying the code, so
/// aliases added after a default never shadow it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyTable {
    entries: Vec<(String, KeyCode)>,
}

impl KeyTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, code)` pairs, upserting in order.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, KeyCode)>) -> Self {
        let mut table = Self::new();
        for (name, code) in pairs {
            table.upsert(name, code);
        }
        table
    }

    /// The default table for a backend's code space.
    pub fn for_backend(backend: Backend) -> Self {
        let table = match backend {
            Backend::Direct => Self::from_pairs(LINUX_INPUT_KEYS.iter().copied()),
            Backend::Bus => Self::from_pairs(BUS_IR_KEYS.iter().copied()),
        };
        debug!(target: "otto::keys", ?backend, keys = table.len(), "Default key mappings loaded");
        table
    }

    /// Look up the code for a key name.
    pub fn code_of(&self, name: &str) -> Option<KeyCode> {
        let found = self
            .entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, code)| *code);
        if found.is_none() {
            warn!(target: "otto::keys", %name, "Key name not found in key table");
        }
        found
    }

    /// Look up the first name mapped to `code`.
    pub fn name_of(&self, code: KeyCode) -> Option<&str> {
        let found = self
            .entries
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(name, _)| name.as_str());
        if found.is_none() {
            warn!(target: "otto::keys", code, "Key code not found in key table");
        }
        found
    }

    /// Add or update a mapping.
    pub fn add(&mut self, name: impl Into<String>, code: KeyCode) {
        let name = name.into();
        debug!(target: "otto::keys", %name, code, "Added/updated key mapping");
        self.upsert(&name, code);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in definition order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, KeyCode)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), *c))
    }

    fn upsert(&mut self, name: &str, code: KeyCode) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = code,
            None => self.entries.push((name.to_string(), code)),
        }
    }
}

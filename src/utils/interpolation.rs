use std::collections::HashMap;
use tracing::{error, trace};

/// Prefix marking a variable reference in script arguments (e.g., `$count`).
pub const VAR_SIGIL: char = '$';

/// Mutable string table shared by every command of a script run.
///
/// Names are stored without the sigil. Entries can be inserted or overwritten,
/// never removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableStore {
    vars: HashMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a variable. Returns the previous value, if any.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.vars.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Resolve variable references in an instruction's arguments.
///
/// Rules:
/// - `args[0]` is the command name and is copied untouched.
/// - Any later token starting with `$` is replaced by the value stored under the
///   remaining text (`$x` -> `vars["x"]`).
/// - An undefined reference is logged and the token is kept verbatim (`$x` stays `$x`).
/// - Substituted values are not scanned again, so `$a` -> `"$b"` yields the literal `$b`.
pub fn resolve_args(args: &[String], vars: &VariableStore) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut iter = args.iter();

    if let Some(command) = iter.next() {
        out.push(command.clone());
    }

    for arg in iter {
        match arg.strip_prefix(VAR_SIGIL) {
            Some(name) => match vars.get(name) {
                Some(value) => {
                    trace!(target: "otto::runtime", var = %name, %value, "Resolved variable");
                    out.push(value.to_string());
                }
                None => {
                    error!(target: "otto::runtime", var = %name, "Undefined variable");
                    out.push(arg.clone());
                }
            },
            None => out.push(arg.clone()),
        }
    }

    out
}

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, error, warn};

use super::engine::StepContext;
use super::script::Instruction;
use crate::utils::interpolation;

/// A script command implementation.
///
/// Handlers receive the full resolved instruction (`args[0]` is the command name)
/// so one handler can serve several commands. Recoverable problems (bad arguments,
/// unknown keys, ...) are logged and `Ok(())` is returned; an `Err` aborts the run.
pub trait CommandHandler: Send + Sync {
    fn execute(&self, args: &[String], ctx: &mut StepContext<'_>) -> Result<()>;

    /// Forget per-program state. Called whenever a new program is loaded,
    /// possibly more than once.
    fn reset(&self) {}
}

/// Maps command names to handlers.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `command`. Re-registering overwrites with a warning.
    pub fn register(&mut self, command: impl Into<String>, handler: Arc<dyn CommandHandler>) {
        let command = command.into();
        if self.handlers.contains_key(&command) {
            warn!(target: "otto::runtime", %command, "Command already registered; overwriting");
        }
        debug!(target: "otto::runtime", %command, "Registered command");
        self.handlers.insert(command, handler);
    }

    pub fn is_registered(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// Resolve variables and run the handler for `instruction`.
    ///
    /// Empty instructions and unknown commands are logged and skipped.
    pub fn dispatch(&self, instruction: &Instruction, ctx: &mut StepContext<'_>) -> Result<()> {
        let Some(command) = instruction.command() else {
            error!(target: "otto::runtime", "No command provided for execution");
            return Ok(());
        };
        let Some(handler) = self.handlers.get(command) else {
            error!(target: "otto::runtime", %command, "Unsupported command");
            return Ok(());
        };

        debug!(target: "otto::runtime", %command, "Executing command");
        let resolved = interpolation::resolve_args(instruction.tokens(), ctx.vars());
        handler.execute(&resolved, ctx)
    }

    /// Call `reset` on every registered handler.
    ///
    /// A handler registered under several names is reset once per name.
    pub fn reset_handlers(&self) {
        for handler in self.handlers.values() {
            handler.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::VariableStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Capture {
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl CommandHandler for Capture {
        fn execute(&self, args: &[String], _ctx: &mut StepContext<'_>) -> Result<()> {
            self.calls.lock().unwrap().push(args.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_dispatch_resolves_arguments() {
        let capture = Arc::new(Capture::default());
        let mut d = Dispatcher::new();
        d.register("key_press", capture.clone());

        let mut vars = VariableStore::new();
        vars.set("k", "down");
        let mut ctx = StepContext::new(0, 1, &mut vars);
        d.dispatch(&Instruction::from("key_press $k $n"), &mut ctx).unwrap();

        assert_eq!(
            *capture.calls.lock().unwrap(),
            vec![vec!["key_press".to_string(), "down".into(), "$n".into()]]
        );
    }

    #[test]
    fn test_empty_and_unknown_commands_are_skipped() {
        let capture = Arc::new(Capture::default());
        let mut d = Dispatcher::new();
        d.register("known", capture.clone());

        let mut vars = VariableStore::new();
        let mut ctx = StepContext::new(0, 1, &mut vars);
        d.dispatch(&Instruction::default(), &mut ctx).unwrap();
        d.dispatch(&Instruction::from("unknown 1 2"), &mut ctx).unwrap();
        assert!(capture.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reregistering_overwrites() {
        let first = Arc::new(Capture::default());
        let second = Arc::new(Capture::default());
        let mut d = Dispatcher::new();
        d.register("cmd", first.clone());
        d.register("cmd", second.clone());

        let mut vars = VariableStore::new();
        let mut ctx = StepContext::new(0, 1, &mut vars);
        d.dispatch(&Instruction::from("cmd"), &mut ctx).unwrap();
        assert!(first.calls.lock().unwrap().is_empty());
        assert_eq!(second.calls.lock().unwrap().len(), 1);
    }
}

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

/*!
Executor module for Otto.

This module wires together:
- `script`: reading a script file into tokenized instructions
- `dispatcher`: command name -> handler registry, with variable resolution
- `engine`: the program counter loop that steps through instructions
- `handlers`: the built-in commands (`var`, `key_press`, `wait`, loops, apps, ...)
- `apps`: HTTP requests to the device's app manager

Typical usage:
- Build a `Dispatcher` and call `register_builtins` on it.
- Wrap it in a `ScriptEngine`, `load` a script and `run_to_completion`.

Example:
```no_run
use std::sync::Arc;
use std::time::Duration;
use otto::executor::{Builtins, Dispatcher, HttpLauncher, ScriptEngine, register_builtins, script};
use otto::keys::{KeyManager, KeyTable};
use otto::sink::LogSink;

let keys = Arc::new(KeyManager::new(
    Arc::new(KeyTable::for_backend(Default::default())),
    Arc::new(LogSink::new()),
    Duration::from_millis(100),
));
let mut dispatcher = Dispatcher::new();
register_builtins(&mut dispatcher, Builtins {
    keys,
    launcher: Arc::new(HttpLauncher::new(Duration::from_secs(10))?),
    app_endpoint: "http://127.0.0.1:9005".into(),
    app_settle: Duration::from_secs(5),
    dry_run: true,
});
let mut engine = ScriptEngine::new(dispatcher);
engine.load(script::load_from_path("commands.txt")?);
engine.run_to_completion()?;
# Ok::<(), anyhow::Error>(())
```
*/

pub mod apps;
pub mod dispatcher;
pub mod engine;
pub mod handlers;
pub mod script;

pub use apps::{AppLauncher, HttpLauncher};
pub use dispatcher::{CommandHandler, Dispatcher};
pub use engine::{EngineError, EngineState, ScriptEngine, StepContext};
pub use handlers::{Builtins, register_builtins};
pub use script::Instruction;

//! Built-in script commands.
//!
//! | command      | usage                          | handler          |
//! |--------------|--------------------------------|------------------|
//! | `var`        | `var <name> <value>`           | `VarHandler`     |
//! | `key_press`  | `key_press <key> [repeat]`     | `KeyPressHandler`|
//! | `key_hold`   | `key_hold <key> <duration>`    | `KeyHoldHandler` |
//! | `wait`       | `wait <duration>`              | `WaitHandler`    |
//! | `loop_start` | `loop_start <count>`           | `LoopHandler`    |
//! | `loop_end`   | `loop_end`                     | `LoopHandler`    |
//! | `launch_app` | `launch_app <id>`              | `AppHandler`     |
//! | `close_app`  | `close_app <id>`               | `AppHandler`     |

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, warn};

use super::apps::{AppLauncher, app_action_url};
use super::dispatcher::{CommandHandler, Dispatcher};
use super::engine::StepContext;
use crate::keys::KeyManager;
use crate::utils::{VAR_SIGIL, parse_duration};

/// `var <name> <value>`
#[derive(Debug, Default)]
pub struct VarHandler;

impl CommandHandler for VarHandler {
    fn execute(&self, args: &[String], ctx: &mut StepContext<'_>) -> Result<()> {
        let [_, name, value] = args else {
            error!(
                target: "otto::runtime",
                "Invalid variable command format. Usage: var <name> <value>"
            );
            return Ok(());
        };
        if name.is_empty() || name.contains(VAR_SIGIL) {
            error!(target: "otto::runtime", %name, "Invalid variable name");
            return Ok(());
        }
        ctx.vars_mut().set(name.as_str(), value.as_str());
        debug!(target: "otto::runtime", %name, %value, "Variable set");
        Ok(())
    }
}

/// `key_press <key> [repeat]`
pub struct KeyPressHandler {
    keys: Arc<KeyManager>,
}

impl KeyPressHandler {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }
}

/// Parse a repeat count, falling back to 1 for anything unusable.
///
/// Counts are `i32`; larger values are invalid rather than clamped.
fn parse_repeat(raw: Option<&String>) -> u32 {
    let Some(raw) = raw else {
        return 1;
    };
    match raw.parse::<i32>() {
        Ok(n) if n >= 1 => n.unsigned_abs(),
        Ok(_) => {
            warn!(target: "otto::runtime", %raw, "Repeat count must be at least 1; using 1");
            1
        }
        Err(_) => {
            warn!(target: "otto::runtime", %raw, "Invalid repeat count; using 1");
            1
        }
    }
}

impl CommandHandler for KeyPressHandler {
    fn execute(&self, args: &[String], _ctx: &mut StepContext<'_>) -> Result<()> {
        let Some(key) = args.get(1) else {
            error!(
                target: "otto::runtime",
                "Invalid key_press command format. Usage: key_press <key> [repeat]"
            );
            return Ok(());
        };
        let repeat = parse_repeat(args.get(2));
        debug!(target: "otto::runtime", %key, repeat, "Sending key press");
        self.keys.send_key_press(key, repeat);
        Ok(())
    }
}

/// `key_hold <key> <duration>`
pub struct KeyHoldHandler {
    keys: Arc<KeyManager>,
}

impl KeyHoldHandler {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }
}

impl CommandHandler for KeyHoldHandler {
    fn execute(&self, args: &[String], _ctx: &mut StepContext<'_>) -> Result<()> {
        let [_, key, duration] = args else {
            error!(
                target: "otto::runtime",
                "Invalid key_hold command format. Usage: key_hold <key> <duration>"
            );
            return Ok(());
        };
        let Some(duration) = parse_duration(duration) else {
            error!(
                target: "otto::runtime", %duration,
                "Invalid duration format. Usage examples: 500ms, 5s, 2m"
            );
            return Ok(());
        };
        self.keys.send_key_hold(key, duration);
        Ok(())
    }
}

/// `wait <duration>`: blocks the calling thread.
#[derive(Debug, Default)]
pub struct WaitHandler {
    dry_run: bool,
}

impl WaitHandler {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CommandHandler for WaitHandler {
    fn execute(&self, args: &[String], _ctx: &mut StepContext<'_>) -> Result<()> {
        let [_, raw] = args else {
            error!(target: "otto::runtime", "Invalid wait command format. Usage: wait <duration>");
            return Ok(());
        };
        let Some(duration) = parse_duration(raw) else {
            error!(
                target: "otto::runtime", duration = %raw,
                "Invalid duration format. Usage examples: 5s, 2m"
            );
            return Ok(());
        };
        let ms = duration.as_millis() as u64;
        if self.dry_run {
            info!(target: "otto::runtime", ms, "DRY-RUN wait");
            return Ok(());
        }
        debug!(target: "otto::runtime", ms, "Waiting");
        thread::sleep(duration);
        Ok(())
    }
}

/// One active loop: where its `loop_start` sits and how many passes remain.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LoopFrame {
    pub return_index: usize,
    pub remaining: u32,
}

/// `loop_start <count>` / `loop_end`.
///
/// Frames nest LIFO. `loop_end` decrements the innermost frame and, while
/// passes remain, jumps to the first instruction after that frame's
/// `loop_start`; otherwise it pops the frame and execution falls through.
#[derive(Debug, Default)]
pub struct LoopHandler {
    frames: Mutex<Vec<LoopFrame>>,
}

impl LoopHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current nesting depth.
    pub fn depth(&self) -> usize {
        self.frames().len()
    }

    fn frames(&self) -> MutexGuard<'_, Vec<LoopFrame>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start(&self, args: &[String], ctx: &StepContext<'_>) {
        let [_, raw] = args else {
            error!(
                target: "otto::runtime",
                "Invalid loop_start command. Usage: loop_start <count>"
            );
            return;
        };
        let count = match raw.parse::<i32>() {
            Ok(n) if n > 0 => n.unsigned_abs(),
            Ok(_) => {
                error!(target: "otto::runtime", count = %raw, "Loop count must be greater than 0");
                return;
            }
            Err(_) => {
                error!(
                    target: "otto::runtime", count = %raw,
                    "Invalid loop count. Usage: loop_start <count>"
                );
                return;
            }
        };

        let mut frames = self.frames();
        frames.push(LoopFrame {
            return_index: ctx.current_index(),
            remaining: count,
        });
        debug!(
            target: "otto::runtime",
            index = ctx.current_index(), count, depth = frames.len(),
            "Loop started"
        );
    }

    fn end(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let mut frames = self.frames();
        let depth = frames.len();
        let Some(frame) = frames.last_mut() else {
            error!(target: "otto::runtime", "loop_end encountered without matching loop_start");
            return Ok(());
        };

        frame.remaining -= 1;
        if frame.remaining > 0 {
            let target = frame.return_index + 1;
            debug!(
                target: "otto::runtime",
                remaining = frame.remaining, target, depth,
                "Loop iteration"
            );
            ctx.jump_to(target)?;
        } else {
            frames.pop();
            debug!(target: "otto::runtime", depth = frames.len(), "Loop completed");
        }
        Ok(())
    }
}

impl CommandHandler for LoopHandler {
    fn execute(&self, args: &[String], ctx: &mut StepContext<'_>) -> Result<()> {
        match args.first().map(String::as_str) {
            Some("loop_start") => self.start(args, ctx),
            Some("loop_end") => self.end(ctx)?,
            other => error!(target: "otto::runtime", command = ?other, "Unknown loop command"),
        }
        Ok(())
    }

    fn reset(&self) {
        self.frames().clear();
    }
}

/// `launch_app <id>` / `close_app <id>`.
pub struct AppHandler {
    launcher: Arc<dyn AppLauncher>,
    endpoint: String,
    settle: Duration,
    dry_run: bool,
}

impl AppHandler {
    /// - `settle`: pause after a successful request so the app can come up or go away.
    pub fn new(
        launcher: Arc<dyn AppLauncher>,
        endpoint: impl Into<String>,
        settle: Duration,
        dry_run: bool,
    ) -> Self {
        Self {
            launcher,
            endpoint: endpoint.into(),
            settle,
            dry_run,
        }
    }
}

impl CommandHandler for AppHandler {
    fn execute(&self, args: &[String], _ctx: &mut StepContext<'_>) -> Result<()> {
        let [command, app_id] = args else {
            error!(
                target: "otto::runtime",
                "Invalid command format. Usage: launch_app <app_id> or close_app <app_id>"
            );
            return Ok(());
        };
        let action = match command.as_str() {
            "launch_app" => "launch",
            "close_app" => "close",
            other => {
                error!(target: "otto::runtime", command = %other, "Unknown app command");
                return Ok(());
            }
        };
        let url = match app_action_url(&self.endpoint, action, app_id) {
            Ok(url) => url,
            Err(e) => {
                error!(target: "otto::runtime", %app_id, error = %e, "Cannot build app request");
                return Ok(());
            }
        };

        if self.dry_run {
            info!(target: "otto::runtime", %url, "DRY-RUN app request");
            return Ok(());
        }

        debug!(target: "otto::runtime", %action, %app_id, "App request");
        match self.launcher.post(&url) {
            Ok(()) => {
                debug!(target: "otto::runtime", %command, %app_id, "Command executed");
                thread::sleep(self.settle);
            }
            Err(e) => {
                error!(
                    target: "otto::runtime", %command, %app_id, error = %e,
                    "Failed to execute app command"
                );
            }
        }
        Ok(())
    }
}

/// Dependencies and settings for the built-in commands.
pub struct Builtins {
    pub keys: Arc<KeyManager>,
    pub launcher: Arc<dyn AppLauncher>,
    pub app_endpoint: String,
    pub app_settle: Duration,
    pub dry_run: bool,
}

/// Register every built-in command on `dispatcher`.
pub fn register_builtins(dispatcher: &mut Dispatcher, builtins: Builtins) {
    dispatcher.register("var", Arc::new(VarHandler));
    dispatcher.register(
        "key_press",
        Arc::new(KeyPressHandler::new(Arc::clone(&builtins.keys))),
    );
    dispatcher.register("key_hold", Arc::new(KeyHoldHandler::new(builtins.keys)));
    dispatcher.register("wait", Arc::new(WaitHandler::new(builtins.dry_run)));

    let loops = Arc::new(LoopHandler::new());
    dispatcher.register("loop_start", loops.clone());
    dispatcher.register("loop_end", loops);

    let apps = Arc::new(AppHandler::new(
        builtins.launcher,
        builtins.app_endpoint,
        builtins.app_settle,
        builtins.dry_run,
    ));
    dispatcher.register("launch_app", apps.clone());
    dispatcher.register("close_app", apps);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::executor::engine::{EngineState, ScriptEngine};
    use crate::executor::script::parse_script;
    use crate::keys::KeyTable;
    use crate::sink::testing::MemorySink;
    use crate::sink::{KeyEvent, KeyEventKind};
    use crate::utils::VariableStore;
    use anyhow::bail;
    use reqwest::Url;

    #[derive(Default)]
    struct FakeLauncher {
        urls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl AppLauncher for FakeLauncher {
        fn post(&self, url: &Url) -> Result<()> {
            self.urls.lock().unwrap().push(url.to_string());
            if self.fail {
                bail!("connection refused");
            }
            Ok(())
        }
    }

    /// Counts `key_press` dispatches by their first argument.
    #[derive(Default)]
    struct PressLog {
        keys: Mutex<Vec<String>>,
    }

    impl CommandHandler for PressLog {
        fn execute(&self, args: &[String], _ctx: &mut StepContext<'_>) -> Result<()> {
            self.keys.lock().unwrap().push(args[1..].join(" "));
            Ok(())
        }
    }

    struct Fixture {
        engine: ScriptEngine,
        sink: Arc<MemorySink>,
        launcher: Arc<FakeLauncher>,
    }

    fn fixture() -> Fixture {
        let sink = Arc::new(MemorySink::default());
        let launcher = Arc::new(FakeLauncher::default());
        let keys = Arc::new(KeyManager::new(
            Arc::new(KeyTable::for_backend(Backend::Direct)),
            sink.clone(),
            Duration::ZERO,
        ));
        let mut dispatcher = Dispatcher::new();
        register_builtins(
            &mut dispatcher,
            Builtins {
                keys,
                launcher: launcher.clone(),
                app_endpoint: "http://127.0.0.1:9005".into(),
                app_settle: Duration::ZERO,
                dry_run: false,
            },
        );
        Fixture {
            engine: ScriptEngine::new(dispatcher),
            sink,
            launcher,
        }
    }

    fn run(fx: &mut Fixture, script: &str) -> u64 {
        fx.engine.load(parse_script(script));
        let steps = fx.engine.run_to_completion().unwrap();
        assert_eq!(fx.engine.state(), EngineState::Halted);
        steps
    }

    fn with_press_log(fx: &mut Fixture) -> Arc<PressLog> {
        let log = Arc::new(PressLog::default());
        fx.engine.dispatcher_mut().register("key_press", log.clone());
        log
    }

    fn downs(sink: &MemorySink) -> Vec<u32> {
        sink.emitted()
            .into_iter()
            .filter(|e| e.kind == KeyEventKind::Down)
            .map(|e| e.code)
            .collect()
    }

    #[test]
    fn test_loop_runs_body_exactly_n_times() {
        let mut fx = fixture();
        let log = with_press_log(&mut fx);
        run(&mut fx, "loop_start 2\nkey_press ok\nloop_end");
        assert_eq!(*log.keys.lock().unwrap(), vec!["ok", "ok"]);
    }

    #[test]
    fn test_loop_step_count_matches_expansion() {
        for n in 1..=4u64 {
            let mut fx = fixture();
            let body = "key_press up\nwait 0ms\nvar x y";
            let steps = run(&mut fx, &format!("loop_start {n}\n{body}\nloop_end"));
            // loop_start once, body n times, loop_end n times
            assert_eq!(steps, 1 + n * 3 + n);
            assert_eq!(downs(&fx.sink).len() as u64, n);
        }
    }

    #[test]
    fn test_nested_loops() {
        let mut fx = fixture();
        let log = with_press_log(&mut fx);
        run(
            &mut fx,
            "loop_start 2\nkey_press a\nloop_start 3\nkey_press b\nloop_end\nloop_end\nkey_press c",
        );
        assert_eq!(
            *log.keys.lock().unwrap(),
            vec!["a", "b", "b", "b", "a", "b", "b", "b", "c"]
        );
    }

    #[test]
    fn test_empty_loop_body() {
        let mut fx = fixture();
        assert_eq!(run(&mut fx, "loop_start 3\nloop_end"), 4);
    }

    #[test]
    fn test_unbalanced_loop_end_is_skipped() {
        let mut fx = fixture();
        let log = with_press_log(&mut fx);
        let steps = run(&mut fx, "loop_end\nkey_press ok\nloop_end");
        assert_eq!(steps, 3);
        assert_eq!(*log.keys.lock().unwrap(), vec!["ok"]);
    }

    #[test]
    fn test_invalid_loop_counts_push_nothing() {
        let loops = LoopHandler::new();
        let mut vars = VariableStore::new();
        let mut ctx = StepContext::new(0, 2, &mut vars);
        for bad in ["0", "-2", "many", "2147483648", "99999999999"] {
            let args: Vec<String> = vec!["loop_start".into(), bad.into()];
            loops.execute(&args, &mut ctx).unwrap();
        }
        loops.execute(&["loop_start".to_string()], &mut ctx).unwrap();
        assert_eq!(loops.depth(), 0);
        assert_eq!(ctx.jump_target(), None);
    }

    #[test]
    fn test_loop_frames_reset_on_load() {
        let mut fx = fixture();
        run(&mut fx, "loop_start 5\nkey_press up");
        let log = with_press_log(&mut fx);
        run(&mut fx, "key_press down\nloop_end\nkey_press ok");
        assert_eq!(*log.keys.lock().unwrap(), vec!["down", "ok"]);
    }

    #[test]
    fn test_variables_feed_key_press() {
        let mut fx = fixture();
        run(&mut fx, "var k mute\nvar n 2\nkey_press $k $n");
        assert_eq!(downs(&fx.sink), vec![55, 55]);
        assert_eq!(fx.engine.variables().get("k"), Some("mute"));
    }

    #[test]
    fn test_unresolved_repeat_defaults_to_one() {
        let mut fx = fixture();
        run(&mut fx, "key_press up $x");
        assert_eq!(
            fx.sink.emitted(),
            vec![
                KeyEvent::new(KeyEventKind::Down, 103),
                KeyEvent::new(KeyEventKind::Up, 103),
            ]
        );
    }

    #[test]
    fn test_repeat_count_parsing() {
        let raw = |s: &str| Some(s.to_string());
        assert_eq!(parse_repeat(None), 1);
        assert_eq!(parse_repeat(raw("3").as_ref()), 3);
        assert_eq!(parse_repeat(raw("2147483647").as_ref()), 2_147_483_647);
        assert_eq!(parse_repeat(raw("2147483648").as_ref()), 1);
        assert_eq!(parse_repeat(raw("99999999999").as_ref()), 1);
        assert_eq!(parse_repeat(raw("-1").as_ref()), 1);
    }

    #[test]
    fn test_oversized_counts_do_not_run() {
        let mut fx = fixture();
        let steps = run(&mut fx, "key_press up 99999999999
loop_start 99999999999
loop_end");
        assert_eq!(downs(&fx.sink), vec![103]);
        assert_eq!(steps, 3);
    }

    #[test]
    fn test_bad_repeat_and_unknown_key() {
        let mut fx = fixture();
        run(&mut fx, "key_press up 0\nkey_press up -3\nkey_press nosuchkey 4\nkey_press");
        assert_eq!(downs(&fx.sink), vec![103, 103]);
    }

    #[test]
    fn test_var_validation() {
        let mut fx = fixture();
        run(&mut fx, "var a\nvar a b c\nvar $a x\nvar ok yes");
        let vars = fx.engine.variables();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("ok"), Some("yes"));
    }

    #[test]
    fn test_key_hold() {
        let mut fx = fixture();
        run(&mut fx, "key_hold power 1ms\nkey_hold power forever\nkey_hold power");
        assert_eq!(
            fx.sink.emitted(),
            vec![
                KeyEvent::new(KeyEventKind::Down, 116),
                KeyEvent::new(KeyEventKind::Up, 116),
            ]
        );
    }

    #[test]
    fn test_wait_sleeps_and_rejects_bad_durations() {
        let mut fx = fixture();
        let started = std::time::Instant::now();
        run(&mut fx, "wait 30ms\nwait soon\nwait 5\nwait");
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_dry_run_wait_does_not_sleep() {
        let wait = WaitHandler::new(true);
        let mut vars = VariableStore::new();
        let mut ctx = StepContext::new(0, 1, &mut vars);
        let started = std::time::Instant::now();
        wait.execute(&["wait".to_string(), "10m".to_string()], &mut ctx).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_app_commands_post_urls() {
        let mut fx = fixture();
        run(&mut fx, "launch_app Netflix\nclose_app Netflix\nlaunch_app\nlaunch_app a b");
        assert_eq!(
            *fx.launcher.urls.lock().unwrap(),
            vec![
                "http://127.0.0.1:9005/as/apps/action/launch?appId=Netflix",
                "http://127.0.0.1:9005/as/apps/action/close?appId=Netflix",
            ]
        );
    }

    #[test]
    fn test_app_failure_is_not_fatal() {
        let launcher = Arc::new(FakeLauncher {
            fail: true,
            ..FakeLauncher::default()
        });
        let apps = AppHandler::new(
            launcher.clone(),
            "http://localhost:1",
            Duration::from_secs(60),
            false,
        );
        let mut vars = VariableStore::new();
        let mut ctx = StepContext::new(0, 1, &mut vars);
        let started = std::time::Instant::now();
        apps.execute(&["launch_app".to_string(), "x".to_string()], &mut ctx).unwrap();
        assert_eq!(launcher.urls.lock().unwrap().len(), 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use otto::prelude::*;

const APP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Otto CLI
#[derive(Debug, Parser)]
#[command(
    name = otto::PKG_NAME,
    version = otto::PKG_VERSION,
    about = "Replay and record remote-control key scripts on a set-top box"
)]
struct Args {
    /// Script file to execute
    script: Option<PathBuf>,

    /// Time each key is held down, in milliseconds
    #[arg(long = "interval-ms")]
    interval_ms: Option<u64>,

    /// Record live key presses into FILE until Ctrl+C instead of running a script
    #[arg(long = "record", value_name = "FILE")]
    record: Option<PathBuf>,

    /// Key event backend: direct or bus
    #[arg(long = "backend")]
    backend: Option<Backend>,

    /// Set log level (e.g., trace, debug, info, warn, error). Overrides RUST_LOG.
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Log key events, waits and app requests instead of performing them
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Path to an optional JSON configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Print the JSON Schema for the configuration and exit
    #[arg(long = "print-schema")]
    print_schema: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version also arrive here
            let code = if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
            let _ = e.print();
            return code;
        }
    };

    otto::init_tracing(args.log_level.as_deref());

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    if args.print_schema {
        return config::write_schema_to_writer(std::io::stdout().lock());
    }

    let mut config = match &args.config {
        Some(path) => config::load_from_path_async(path).await?,
        None => Config::default(),
    };
    if let Some(interval_ms) = args.interval_ms {
        config.interval_ms = interval_ms;
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }

    info!(
        version = otto::PKG_VERSION,
        backend = ?config.backend,
        interval_ms = config.interval_ms,
        dry_run = args.dry_run,
        "Starting Otto"
    );

    if let Some(output) = args.record {
        return record(config, output, args.dry_run).await;
    }
    let Some(script_path) = args.script else {
        bail!("No script given. Usage: otto <script> or otto --record <file>");
    };

    let dry_run = args.dry_run;
    tokio::task::spawn_blocking(move || execute(&config, &script_path, dry_run))
        .await
        .context("Script execution task failed")?
}

/// Backend defaults plus configured overrides.
fn key_table(config: &Config) -> KeyTable {
    let mut table = KeyTable::for_backend(config.backend);
    for (name, code) in &config.key_overrides {
        debug!(target: "otto::config", %name, code, "Key override");
        table.add(name.as_str(), *code);
    }
    table
}

fn execute(config: &Config, script_path: &Path, dry_run: bool) -> Result<()> {
    let instructions = script::load_from_path(script_path)?;
    let sink = build_sink(config, dry_run)?;

    let keys = Arc::new(KeyManager::new(
        Arc::new(key_table(config)),
        sink,
        Duration::from_millis(config.interval_ms),
    ));
    let mut dispatcher = Dispatcher::new();
    register_builtins(
        &mut dispatcher,
        Builtins {
            keys,
            launcher: Arc::new(HttpLauncher::new(APP_REQUEST_TIMEOUT)?),
            app_endpoint: config.app_endpoint.clone(),
            app_settle: Duration::from_millis(config.app_settle_ms),
            dry_run,
        },
    );

    let mut engine = ScriptEngine::new(dispatcher);
    engine.load(instructions);
    engine.run_to_completion()?;
    Ok(())
}

async fn record(config: Config, output: PathBuf, dry_run: bool) -> Result<()> {
    let sink = build_sink(&config, dry_run)?;
    let mut recorder = Recorder::new(
        sink,
        Arc::new(key_table(&config)),
        Duration::from_millis(config.debounce_ms),
    );
    recorder.start(&output)?;
    info!("Recording key events. Press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, stopping recording");

    // stop() joins the capture thread
    tokio::task::spawn_blocking(move || recorder.stop())
        .await
        .context("Recorder shutdown task failed")?
}

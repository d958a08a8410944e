use anyhow::Result;
use clap::{Parser, Subcommand};
use liftd::{config::DaemonConfig, doctor, rest, AppContext};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "liftd",
    about = "Lift AI Host — pose repetition-counting daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP server port
    #[arg(long, env = "LIFTD_PORT")]
    port: Option<u16>,

    /// Data directory for config.toml and model artifacts
    #[arg(long, env = "LIFTD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LIFTD_LOG")]
    log: Option<String>,

    /// Bind address for the HTTP server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "LIFTD_BIND")]
    bind_address: Option<String>,

    /// Path to the trained phase-model artifact (JSON). Omit to use the
    /// geometry heuristic classifier.
    #[arg(long, env = "LIFTD_MODEL")]
    model: Option<std::path::PathBuf>,

    /// Confidence threshold a classification must exceed to drive the
    /// counter (0 < t <= 1)
    #[arg(long, env = "LIFTD_THRESHOLD")]
    threshold: Option<f32>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "LIFTD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    ///
    /// Runs liftd in the foreground.
    ///
    /// Examples:
    ///   liftd serve
    ///   liftd
    Serve,
    /// Run diagnostic checks on daemon prerequisites.
    ///
    /// Checks port availability, data directory writability, and that any
    /// configured model artifact loads.
    ///
    /// Exit code 0 if all checks pass, 1 if any check fails.
    ///
    /// Examples:
    ///   liftd doctor
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Logging setup ────────────────────────────────────────────────────────
    // Init once — must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let log_format = std::env::var("LIFTD_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

    let config = DaemonConfig::new(
        args.port,
        args.data_dir,
        args.log,
        args.bind_address,
        args.model,
        args.threshold,
    );

    match args.command {
        Some(Command::Doctor) => {
            let results = doctor::run_doctor(&config);
            doctor::print_doctor_results(&results);
            let failed = results.iter().filter(|r| !r.passed).count();
            std::process::exit(if failed == 0 { 0 } else { 1 });
        }
        None | Some(Command::Serve) => run_server(config).await?,
    }

    Ok(())
}

async fn run_server(config: DaemonConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        bind = %config.bind_address,
        threshold = config.detection.threshold,
        model = ?config.model_path,
        "starting liftd"
    );

    let ctx = Arc::new(AppContext::from_config(config)?);
    rest::start_rest_server(ctx).await
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("liftd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            // Fall back to stdout-only — don't panic on a bad log path.
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}

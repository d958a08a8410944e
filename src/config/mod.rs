use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

use crate::engine::DEFAULT_THRESHOLD;

const DEFAULT_PORT: u16 = 5000;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── DetectionConfig ──────────────────────────────────────────────────────────

/// Rep detection tuning (`[detection]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Confidence a classification must *exceed* (strict) to drive the stage
    /// machine. Must lie in (0, 1]. Default: 0.7.
    pub threshold: f32,
    /// Reps per set for set tracking. 0 disables set counting (default).
    pub reps_per_set: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            reps_per_set: 0,
        }
    }
}

// ─── AnnotateConfig ───────────────────────────────────────────────────────────

/// Annotated-frame rendering defaults (`[annotate]` in config.toml).
/// Per-request options override these.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnnotateConfig {
    /// Frames wider than this are downscaled before processing. Default: 640.
    pub max_width: u32,
    /// JPEG quality for annotated responses (1-100). Default: 70.
    pub jpeg_quality: u8,
    /// Include the annotated frame in responses unless the request opts out.
    /// Default: true.
    pub return_image: bool,
}

impl Default for AnnotateConfig {
    fn default() -> Self {
        Self {
            max_width: 640,
            jpeg_quality: 70,
            return_image: true,
        }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// HTTP server port (default: 5000).
    port: Option<u16>,
    /// Bind address (default: "127.0.0.1"; use "0.0.0.0" for LAN access).
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,liftd=trace" (default: "info").
    /// Note: logging is initialized from the CLI / env before this file is
    /// read, so this field only shows up in `DaemonConfig` — it does not
    /// change the active log filter.
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json" (structured for log
    /// aggregators). Same caveat as `log`: only CLI / env take effect.
    log_format: Option<String>,
    /// Path to the trained phase-model artifact. Omit to use the geometry heuristic.
    model_path: Option<PathBuf>,
    /// Rep detection tuning (`[detection]`).
    detection: Option<DetectionConfig>,
    /// Annotated-frame rendering defaults (`[annotate]`).
    annotate: Option<AnnotateConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── DaemonConfig ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    /// Resolved log filter. Informational — the subscriber is installed from
    /// CLI / env in `main` before the config file is read.
    pub log: String,
    /// Log output format: "pretty" (default) | "json". Informational, like `log`.
    pub log_format: String,
    /// Bind address for the HTTP server (LIFTD_BIND env var, default: "127.0.0.1").
    pub bind_address: String,
    /// Trained model artifact (LIFTD_MODEL env var). None = geometry heuristic.
    pub model_path: Option<PathBuf>,
    /// Rep detection tuning: acceptance threshold, set tracking.
    pub detection: DetectionConfig,
    /// Annotated-frame rendering defaults.
    pub annotate: AnnotateConfig,
}

impl DaemonConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
        model_path: Option<PathBuf>,
        threshold: Option<f32>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let log_format = std::env::var("LIFTD_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let bind_address = bind_address
            .or(std::env::var("LIFTD_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let model_path = model_path
            .or(std::env::var("LIFTD_MODEL")
                .ok()
                .filter(|s| !s.is_empty())
                .map(PathBuf::from))
            .or(toml.model_path);

        let mut detection = toml.detection.unwrap_or_default();
        if let Some(t) = threshold {
            detection.threshold = t;
        }
        if !(detection.threshold > 0.0 && detection.threshold <= 1.0) {
            warn!(
                threshold = detection.threshold,
                "detection threshold outside (0, 1] — falling back to {DEFAULT_THRESHOLD}"
            );
            detection.threshold = DEFAULT_THRESHOLD;
        }

        let annotate = toml.annotate.unwrap_or_default();

        Self {
            port,
            data_dir,
            log,
            log_format,
            bind_address,
            model_path,
            detection,
            annotate,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/liftd
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("liftd");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/liftd or ~/.local/share/liftd
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("liftd");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("liftd");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\liftd
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("liftd");
        }
    }
    // Fallback
    PathBuf::from(".liftd")
}

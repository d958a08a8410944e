pub mod annotate;
pub mod classify;
pub mod config;
pub mod doctor;
pub mod engine;
pub mod metrics;
pub mod pipeline;
pub mod rest;
pub mod session;
pub mod skeleton;

use std::sync::Arc;

use classify::PhaseClassifier;
use config::DaemonConfig;
use metrics::DaemonMetrics;
use session::SessionStore;
use skeleton::PoseExtractor;

/// Shared application state passed to every route handler.
///
/// Constructed once at process start and torn down at shutdown — there is no
/// ambient global state, so tests can assemble a context around stub
/// collaborators.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    /// Per-session rep counters with the atomic update contract.
    pub store: Arc<SessionStore>,
    /// Phase classifier collaborator (trained artifact or geometry heuristic).
    pub classifier: Arc<dyn PhaseClassifier>,
    /// Pose extraction collaborator; `NullExtractor` unless a landmark model
    /// is wired in.
    pub extractor: Arc<dyn PoseExtractor>,
    /// Frame-path counters for `GET /metrics`.
    pub metrics: Arc<DaemonMetrics>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Assemble the context from config: builds the store, metrics, and the
    /// configured classifier. Fails only when a configured model artifact
    /// cannot be loaded.
    pub fn from_config(config: DaemonConfig) -> anyhow::Result<Self> {
        let classifier = classify::from_config(&config)?;
        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(SessionStore::new()),
            classifier,
            extractor: Arc::new(skeleton::NullExtractor),
            metrics: Arc::new(DaemonMetrics::new()),
            started_at: std::time::Instant::now(),
        })
    }
}

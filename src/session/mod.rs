// SPDX-License-Identifier: MIT
//! Session state store — per-session rep counters with an atomic update
//! contract.
//!
//! Every session is an independent unit of mutable memory guarded by its own
//! async mutex, so concurrent updates to the same session serialize (no lost
//! increments) while distinct sessions never contend beyond the brief
//! registry read lock. Unknown keys are created lazily — status is always
//! answerable, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::engine::Stage;

/// Session key used when the caller does not supply one (single-user
/// deployments).
pub const DEFAULT_SESSION: &str = "default";

/// The mutable memory tracked for one session.
///
/// `repetition_count` is monotonically non-decreasing except on explicit
/// reset, and moves only on a DOWN→UP edge recognized by
/// [`crate::engine::advance`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub repetition_count: u64,
    pub current_stage: Stage,
    /// Most recent classifier label, accepted or not — kept for status
    /// queries.
    pub last_label: Option<String>,
    /// Probability the classifier assigned to `last_label`.
    pub last_confidence: Option<f32>,
    /// Completed sets, advanced every `reps_per_set` reps when set tracking
    /// is enabled (0 = disabled).
    pub set_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            repetition_count: 0,
            current_stage: Stage::Unknown,
            last_label: None,
            last_confidence: None,
            set_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Probability for the wire contract: last confidence, or 0 before any
    /// classification.
    pub fn probability(&self) -> f32 {
        self.last_confidence.unwrap_or(0.0)
    }

    /// Roll the set counter after a completed rep. Call only when a rep just
    /// completed; `reps_per_set == 0` disables set tracking.
    pub fn roll_set(&mut self, reps_per_set: u64) {
        if reps_per_set > 0 && self.repetition_count % reps_per_set == 0 {
            self.set_count += 1;
        }
    }

    fn clear(&mut self) {
        self.repetition_count = 0;
        self.current_stage = Stage::Unknown;
        self.last_label = None;
        self.last_confidence = None;
        self.set_count = 0;
        self.updated_at = Utc::now();
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Keyed registry of session states.
///
/// Constructed once at process start and injected through `AppContext` —
/// there is no ambient global state, so tests can build stores in isolation.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionState>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the per-session handle, creating it on first use.
    async fn handle(&self, key: &str) -> Arc<Mutex<SessionState>> {
        // Fast path: the session already exists.
        if let Some(handle) = self.sessions.read().await.get(key) {
            return Arc::clone(handle);
        }

        let mut sessions = self.sessions.write().await;
        // Re-check under the write lock — another task may have created it.
        Arc::clone(
            sessions
                .entry(key.to_string())
                .or_insert_with(|| {
                    info!(session = %key, "session created");
                    Arc::new(Mutex::new(SessionState::new()))
                }),
        )
    }

    /// Read-only snapshot. Lazily initializes unknown keys.
    pub async fn get(&self, key: &str) -> SessionState {
        self.handle(key).await.lock().await.clone()
    }

    /// Apply `f` to the session's state as a single atomic operation with
    /// respect to other `update`/`reset` calls on the same key. Returns the
    /// post-update snapshot alongside `f`'s output.
    ///
    /// The closure runs under the session mutex — keep it to pure state
    /// transformation; classification and I/O belong before this call.
    pub async fn update<F, T>(&self, key: &str, f: F) -> (SessionState, T)
    where
        F: FnOnce(&mut SessionState) -> T,
    {
        let handle = self.handle(key).await;
        let mut state = handle.lock().await;
        let out = f(&mut state);
        state.updated_at = Utc::now();
        (state.clone(), out)
    }

    /// Reset the session to its initial values. Idempotent; competes with
    /// `update` under the same per-session mutex, so an interleaved reset
    /// always leaves one of the two well-defined end states.
    pub async fn reset(&self, key: &str) -> SessionState {
        let handle = self.handle(key).await;
        let mut state = handle.lock().await;
        state.clear();
        info!(session = %key, "session reset");
        state.clone()
    }

    /// Snapshot every session, keyed by session id.
    pub async fn list(&self) -> Vec<(String, SessionState)> {
        let sessions = self.sessions.read().await;
        let mut out = Vec::with_capacity(sessions.len());
        for (key, handle) in sessions.iter() {
            out.push((key.clone(), handle.lock().await.clone()));
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{advance, ClassificationResult};

    #[tokio::test]
    async fn unknown_key_is_lazily_created() {
        let store = SessionStore::new();
        assert!(store.is_empty().await);
        let state = store.get("fresh").await;
        assert_eq!(state.repetition_count, 0);
        assert_eq!(state.current_stage, Stage::Unknown);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_returns_post_update_snapshot() {
        let store = SessionStore::new();
        let (state, fired) = store
            .update("a", |s| {
                advance(s, &ClassificationResult::new("down", 0.9), 0.7);
                advance(s, &ClassificationResult::new("up", 0.9), 0.7)
            })
            .await;
        assert!(fired);
        assert_eq!(state.repetition_count, 1);
        assert_eq!(state.current_stage, Stage::Up);
    }

    #[tokio::test]
    async fn reset_is_idempotent_and_total() {
        let store = SessionStore::new();
        store
            .update("a", |s| {
                advance(s, &ClassificationResult::new("down", 0.9), 0.7);
                advance(s, &ClassificationResult::new("up", 0.9), 0.7);
            })
            .await;

        let state = store.reset("a").await;
        assert_eq!(state.repetition_count, 0);
        assert_eq!(state.current_stage, Stage::Unknown);
        assert!(state.last_label.is_none());
        assert!(state.last_confidence.is_none());

        // Resetting an already-fresh session is a no-op, not an error.
        let again = store.reset("a").await;
        assert_eq!(again.repetition_count, 0);
        assert_eq!(again.current_stage, Stage::Unknown);
    }

    #[tokio::test]
    async fn concurrent_edges_on_one_session_are_never_lost() {
        let store = Arc::new(SessionStore::new());
        let n = 64;

        let mut tasks = Vec::new();
        for _ in 0..n {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store
                    .update(DEFAULT_SESSION, |s| {
                        advance(s, &ClassificationResult::new("down", 0.95), 0.7);
                        advance(s, &ClassificationResult::new("up", 0.95), 0.7)
                    })
                    .await
            }));
        }
        for task in tasks {
            let (_, fired) = task.await.unwrap();
            assert!(fired);
        }

        let state = store.get(DEFAULT_SESSION).await;
        assert_eq!(state.repetition_count, n);
    }

    #[tokio::test]
    async fn distinct_sessions_do_not_interfere() {
        let store = Arc::new(SessionStore::new());

        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let key = format!("user-{i}");
                for _ in 0..10 {
                    store
                        .update(&key, |s| {
                            advance(s, &ClassificationResult::new("down", 0.9), 0.7);
                            advance(s, &ClassificationResult::new("up", 0.9), 0.7);
                        })
                        .await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        for i in 0..8 {
            let state = store.get(&format!("user-{i}")).await;
            assert_eq!(state.repetition_count, 10);
        }
        assert_eq!(store.len().await, 8);
    }

    #[tokio::test]
    async fn set_counter_rolls_every_reps_per_set() {
        let store = SessionStore::new();
        for _ in 0..7 {
            store
                .update("a", |s| {
                    advance(s, &ClassificationResult::new("down", 0.9), 0.7);
                    if advance(s, &ClassificationResult::new("up", 0.9), 0.7) {
                        s.roll_set(3);
                    }
                })
                .await;
        }
        let state = store.get("a").await;
        assert_eq!(state.repetition_count, 7);
        assert_eq!(state.set_count, 2);
    }
}

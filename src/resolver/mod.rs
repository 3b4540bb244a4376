//! Conversational query resolution.
//!
//! Invoked only when [`heuristics::needs_resolution`] flags the query. A
//! query that does not trip the heuristic passes through unchanged even if
//! it is ambiguous. Timeouts and backend errors fall back to the original
//! text; they are reported as a [`ResolutionOutcome`], never as errors.

pub mod heuristics;
pub mod rewriter;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::models::{KnownNames, Turn};

pub use rewriter::{RewriteBackend, RuleBasedRewriter};

/// What the resolver did with a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResolutionOutcome {
    /// Heuristic did not flag the query (or resolution is disabled).
    NotNeeded,
    /// Backend ran but produced no change.
    Unchanged,
    Rewritten { text: String },
    /// Backend exceeded its time budget; original text used.
    TimedOut,
    /// Backend failed; original text used.
    Failed { reason: String },
}

impl ResolutionOutcome {
    /// Text to carry forward.
    pub fn text<'a>(&'a self, original: &'a str) -> &'a str {
        match self {
            ResolutionOutcome::Rewritten { text } => text,
            _ => original,
        }
    }

    pub fn is_rewritten(&self) -> bool {
        matches!(self, ResolutionOutcome::Rewritten { .. })
    }
}

/// Heuristic gate plus a bounded, time-limited rewrite backend.
pub struct QueryResolver {
    backend: Arc<dyn RewriteBackend>,
    enabled: bool,
    history_window: usize,
    timeout: Duration,
}

impl QueryResolver {
    pub fn new(backend: Arc<dyn RewriteBackend>, config: &ResolverConfig) -> Self {
        Self {
            backend,
            enabled: config.enabled,
            history_window: config.history_window,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn needs_resolution(&self, text: &str) -> bool {
        self.enabled && heuristics::needs_resolution(text)
    }

    /// Rewrite `text` against the last `history_window` turns.
    ///
    /// Callers should check [`Self::needs_resolution`] first; this method
    /// always consults the backend.
    pub async fn resolve(&self, text: &str, history: &[Turn], known: &KnownNames) -> ResolutionOutcome {
        let window = &history[history.len().saturating_sub(self.history_window)..];
        let rewrite = self.backend.rewrite(text, window, known);

        match tokio::time::timeout(self.timeout, rewrite).await {
            Ok(Ok(rewritten)) if rewritten.trim().is_empty() || rewritten == text => {
                debug!(backend = self.backend.name(), "Resolver left query unchanged");
                ResolutionOutcome::Unchanged
            }
            Ok(Ok(rewritten)) => {
                debug!(backend = self.backend.name(), "Resolver rewrote query");
                ResolutionOutcome::Rewritten { text: rewritten }
            }
            Ok(Err(e)) => {
                warn!(backend = self.backend.name(), "Query resolution failed: {}", e);
                ResolutionOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Err(_) => {
                warn!(
                    backend = self.backend.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Query resolution timed out, using original text"
                );
                ResolutionOutcome::TimedOut
            }
        }
    }
}

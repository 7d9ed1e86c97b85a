//! Cooperative pause control.
//!
//! An operator pauses the batch by creating a sentinel file and resumes it
//! by removing the file; no process restart involved. Pipelines poll the
//! gate at step boundaries only, so work already inside a step always runs
//! that step to completion.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

/// Externally-toggleable signal that suspends further work start without
/// killing in-flight work.
#[derive(Debug, Clone)]
pub struct PauseGate {
    sentinel: Option<PathBuf>,
    poll: Duration,
}

impl PauseGate {
    /// Creates a gate watching the given sentinel file.
    pub fn new(sentinel: Option<PathBuf>, poll: Duration) -> Self {
        Self { sentinel, poll }
    }

    /// Creates a gate that is never paused.
    pub fn disabled() -> Self {
        Self {
            sentinel: None,
            poll: Duration::from_secs(60),
        }
    }

    /// Whether the pause sentinel currently exists.
    pub fn is_paused(&self) -> bool {
        self.sentinel.as_ref().is_some_and(|p| p.exists())
    }

    /// Blocks until the sentinel is absent, polling at the configured
    /// interval. Returns immediately when unpaused.
    pub async fn wait_if_paused(&self) {
        let Some(sentinel) = &self.sentinel else {
            return;
        };

        let mut announced = false;
        while sentinel.exists() {
            if !announced {
                info!(sentinel = %sentinel.display(), "paused; waiting for sentinel removal");
                announced = true;
            }
            tokio::time::sleep(self.poll).await;
        }
        if announced {
            info!("pause sentinel removed; resuming");
        }
    }
}

//! Batch migration orchestrator.
//!
//! Computes the pending work set against the remote completion listing,
//! dispatches session pipelines across a bounded worker pool, isolates
//! per-session failure, and reclaims stale workspaces before each session
//! starts. No ordering is guaranteed between sessions; each one's state
//! lives entirely in its own workspace subtree.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tracing::{error, info, warn};

use crate::config::{ConfigError, MigrationConfig};
use crate::convert::SessionConverter;
use crate::error::RegistryError;
use crate::fetch::{BlobSource, InputFetcher};
use crate::pause::PauseGate;
use crate::registry::{ArtifactPublisher, CompletionRegistry, PublishResult};
use crate::session::{sort_sessions, SessionId};
use crate::workspace;

use super::session::{write_failure_log, PipelineError, SessionPipeline};

/// Errors that abort a batch before or during setup.
///
/// Per-session failures never surface here; they are absorbed into the
/// batch report.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Configuration or missing-credential precondition failure.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The completion listing could not be read, so the work set cannot be
    /// safely computed.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Terminal status of one session within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// The session's artifact is published and its workspace removed.
    Completed,
    /// The session failed; its error is in the outcome and the logs dir.
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Completed => write!(f, "completed"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one session's pipeline run within a batch.
#[derive(Debug)]
pub struct SessionOutcome {
    /// The session this outcome belongs to.
    pub session: SessionId,
    /// Terminal status.
    pub status: SessionStatus,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Error message if the session failed.
    pub error: Option<String>,
    /// Failure-report file, when one was written.
    pub log_file: Option<PathBuf>,
}

impl SessionOutcome {
    fn completed(session: SessionId, duration: Duration) -> Self {
        Self {
            session,
            status: SessionStatus::Completed,
            duration,
            error: None,
            log_file: None,
        }
    }

    fn failed(
        session: SessionId,
        duration: Duration,
        error: impl Into<String>,
        log_file: Option<PathBuf>,
    ) -> Self {
        Self {
            session,
            status: SessionStatus::Failed,
            duration,
            error: Some(error.into()),
            log_file,
        }
    }
}

/// Aggregate statistics for a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    /// Sessions dispatched to a pipeline.
    pub total: u64,
    /// Sessions that reached publish and cleanup.
    pub completed: u64,
    /// Sessions that failed and were logged.
    pub failed: u64,
    /// Average session duration.
    pub average_duration: Duration,
}

impl BatchStats {
    fn record_success(&mut self, duration: Duration) {
        self.total += 1;
        self.completed += 1;
        self.update_average_duration(duration);
    }

    fn record_failure(&mut self, duration: Duration) {
        self.total += 1;
        self.failed += 1;
        self.update_average_duration(duration);
    }

    fn update_average_duration(&mut self, duration: Duration) {
        if self.total == 1 {
            self.average_duration = duration;
        } else {
            // Incremental average: avg = avg + (new - avg) / n
            let n = self.total as f64;
            let old_avg = self.average_duration.as_secs_f64();
            let new_val = duration.as_secs_f64();
            self.average_duration = Duration::from_secs_f64(old_avg + (new_val - old_avg) / n);
        }
    }
}

/// Result of a whole batch run.
#[derive(Debug)]
pub struct BatchReport {
    /// One outcome per dispatched session.
    pub outcomes: Vec<SessionOutcome>,
    /// Aggregate counters.
    pub stats: BatchStats,
}

impl BatchReport {
    /// Sessions that failed in this batch.
    pub fn failed_sessions(&self) -> Vec<&SessionId> {
        self.outcomes
            .iter()
            .filter(|o| o.status == SessionStatus::Failed)
            .map(|o| &o.session)
            .collect()
    }
}

/// Coordinates the migration of many sessions on one host.
pub struct BatchOrchestrator {
    config: MigrationConfig,
    registry: Arc<dyn CompletionRegistry>,
    publisher: Arc<dyn ArtifactPublisher>,
    fetcher: Arc<InputFetcher>,
    converter: Arc<dyn SessionConverter>,
    pause: PauseGate,
    limiter: Arc<Semaphore>,
    stats: Arc<RwLock<BatchStats>>,
}

impl BatchOrchestrator {
    /// Creates an orchestrator over the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Config` if the configuration is invalid.
    pub fn new(
        config: MigrationConfig,
        registry: Arc<dyn CompletionRegistry>,
        publisher: Arc<dyn ArtifactPublisher>,
        source: Arc<dyn BlobSource>,
        converter: Arc<dyn SessionConverter>,
    ) -> Result<Self, BatchError> {
        config.validate()?;

        let fetcher = Arc::new(InputFetcher::new(source, config.input_templates.clone()));
        let pause = PauseGate::new(config.pause_file.clone(), config.pause_poll);
        let limiter = Arc::new(Semaphore::new(config.concurrency));

        Ok(Self {
            config,
            registry,
            publisher,
            fetcher,
            converter,
            pause,
            limiter,
            stats: Arc::new(RwLock::new(BatchStats::default())),
        })
    }

    /// Migrates every pending session among `all_sessions`.
    ///
    /// The work set is recomputed from the registry at the start of each
    /// call — completion state can change externally between runs.
    /// `skip`/`take` slice the sorted pending set, for sharding a large
    /// migration across invocations.
    ///
    /// # Errors
    ///
    /// Returns `BatchError` only for setup failures (configuration,
    /// completion listing). Individual session failures are reported in
    /// the returned `BatchReport`, never propagated.
    pub async fn run_batch(
        &self,
        all_sessions: Vec<SessionId>,
        skip: usize,
        take: Option<usize>,
    ) -> Result<BatchReport, BatchError> {
        let known = all_sessions.len();
        let completed = self.registry.completed().await?;
        let pending = work_set(all_sessions, &completed);
        let pending: Vec<SessionId> = pending
            .into_iter()
            .skip(skip)
            .take(take.unwrap_or(usize::MAX))
            .collect();

        info!(
            known,
            completed = completed.len(),
            pending = pending.len(),
            concurrency = self.config.concurrency,
            "computed work set"
        );

        // Counters are per batch; a fresh call starts from zero.
        *self.stats.write().await = BatchStats::default();

        let in_flight: HashSet<SessionId> = pending.iter().cloned().collect();
        let completed = &completed;
        let in_flight = &in_flight;
        let futures: Vec<_> = pending
            .into_iter()
            .map(|session| async move { self.run_worker(session, completed, in_flight).await })
            .collect();
        let outcomes = futures::future::join_all(futures).await;

        let stats = self.stats.read().await.clone();
        info!(
            total = stats.total,
            completed = stats.completed,
            failed = stats.failed,
            "batch finished"
        );
        Ok(BatchReport { outcomes, stats })
    }

    /// Migrates a single session, propagating any pipeline error to the
    /// caller instead of logging it.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError` for any fetch, convert, or publish failure.
    pub async fn run_session(&self, session: &SessionId) -> Result<PublishResult, PipelineError> {
        self.pipeline().run(session).await
    }

    /// Snapshot of the aggregate statistics so far.
    pub async fn stats(&self) -> BatchStats {
        self.stats.read().await.clone()
    }

    /// The orchestrator's configuration.
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    async fn run_worker(
        &self,
        session: SessionId,
        completed: &HashSet<SessionId>,
        in_flight: &HashSet<SessionId>,
    ) -> SessionOutcome {
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                return SessionOutcome::failed(
                    session,
                    Duration::ZERO,
                    format!("worker pool closed: {e}"),
                    None,
                )
            }
        };

        // Reclaim disk from sessions completed on earlier runs before
        // staging more large files. The current batch's sessions are
        // exempt so a sibling worker mid-acquire is never swept.
        if let Err(e) =
            workspace::reap_completed(&self.config.base_dir, completed, in_flight).await
        {
            warn!(error = %e, "workspace reap failed");
        }

        self.pause.wait_if_paused().await;

        let start = Instant::now();
        match self.pipeline().run(&session).await {
            Ok(result) => {
                let duration = start.elapsed();
                info!(%session, ?result, ?duration, "session migrated");
                self.stats.write().await.record_success(duration);
                SessionOutcome::completed(session, duration)
            }
            Err(e) => {
                let duration = start.elapsed();
                error!(%session, error = %e, "session failed; continuing batch");
                let log_file = match write_failure_log(&self.config.base_dir, &session, &e).await {
                    Ok(path) => Some(path),
                    Err(log_err) => {
                        warn!(%session, error = %log_err, "could not write failure log");
                        None
                    }
                };
                self.stats.write().await.record_failure(duration);
                SessionOutcome::failed(session, duration, e.to_string(), log_file)
            }
        }
    }

    fn pipeline(&self) -> SessionPipeline {
        SessionPipeline::new(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.converter),
            Arc::clone(&self.publisher),
            self.pause.clone(),
            self.config.base_dir.clone(),
        )
    }
}

/// Pending sessions: all known ids minus the completed set, deduplicated
/// and sorted.
fn work_set(all_sessions: Vec<SessionId>, completed: &HashSet<SessionId>) -> Vec<SessionId> {
    let mut seen = HashSet::new();
    let mut pending: Vec<SessionId> = all_sessions
        .into_iter()
        .filter(|s| !completed.contains(s) && seen.insert(s.clone()))
        .collect();
    sort_sessions(&mut pending);
    pending
}

//! Single-session migration pipeline.
//!
//! Sequences Fetch -> Convert -> Publish -> Cleanup for one session, with
//! pause checks at each step boundary and a short-circuit straight to
//! publish when the expected artifact is already staged from an earlier
//! run. Workspace teardown happens on every exit path; a failed session
//! leaves nothing behind but its failure log.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::convert::{SessionConverter, StagedOutput};
use crate::error::{ConvertError, FetchError, PublishError, WorkspaceError};
use crate::fetch::InputFetcher;
use crate::pause::PauseGate;
use crate::registry::{ArtifactPublisher, PublishResult};
use crate::session::SessionId;
use crate::workspace::{SessionWorkspace, LOGS_DIR};

/// Errors terminating a single session's pipeline run.
///
/// In batch mode these are absorbed at the orchestrator boundary and
/// logged; in single-session mode they propagate to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("conversion failed: {0}")]
    Convert(#[from] ConvertError),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
}

impl PipelineError {
    /// Short name of the failed step, used in failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "FetchError",
            PipelineError::Convert(_) => "ConvertError",
            PipelineError::Publish(_) => "PublishError",
            PipelineError::Workspace(_) => "WorkspaceError",
        }
    }
}

/// Runs one session end to end: stage inputs, convert, publish, clean up.
pub struct SessionPipeline {
    fetcher: Arc<InputFetcher>,
    converter: Arc<dyn SessionConverter>,
    publisher: Arc<dyn ArtifactPublisher>,
    pause: PauseGate,
    base_dir: PathBuf,
}

impl SessionPipeline {
    /// Creates a pipeline over the given collaborators.
    pub fn new(
        fetcher: Arc<InputFetcher>,
        converter: Arc<dyn SessionConverter>,
        publisher: Arc<dyn ArtifactPublisher>,
        pause: PauseGate,
        base_dir: PathBuf,
    ) -> Self {
        Self {
            fetcher,
            converter,
            publisher,
            pause,
            base_dir,
        }
    }

    /// Migrates one session.
    ///
    /// The workspace subtree is deleted before returning regardless of
    /// outcome, so a failed run can be retried from scratch and a
    /// successful one leaves no disk footprint.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError` for any fetch, convert, or publish failure.
    pub async fn run(&self, session: &SessionId) -> Result<PublishResult, PipelineError> {
        let workspace = SessionWorkspace::acquire(&self.base_dir, session).await?;
        let result = self.run_staged(session, &workspace).await;
        workspace.release().await;
        result
    }

    async fn run_staged(
        &self,
        session: &SessionId,
        workspace: &SessionWorkspace,
    ) -> Result<PublishResult, PipelineError> {
        self.pause.wait_if_paused().await;

        // A staged artifact from a crashed-after-convert run resumes
        // straight at publish; nothing is re-fetched or re-converted.
        let artifact = workspace.artifact_path(&self.converter.artifact_name(session));
        if artifact.exists() {
            info!(%session, "staged artifact found; resuming at publish");
            let output = StagedOutput { path: artifact };
            return Ok(self.publisher.publish(session, &output).await?);
        }

        let input = self.fetcher.ensure_fetched(session, workspace).await?;

        self.pause.wait_if_paused().await;

        let output = self.converter.convert(session, &input, workspace).await?;
        // The large sources are no longer needed; free the disk before the
        // upload starts.
        workspace.clear_sources().await?;

        self.pause.wait_if_paused().await;

        Ok(self.publisher.publish(session, &output).await?)
    }
}

/// Writes a per-session failure report under `<base>/logs/`.
///
/// The report carries the failed step, the error message, and the full
/// source chain. A non-empty logs directory after a batch run is the
/// operator's signal of partial completion.
pub async fn write_failure_log(
    base_dir: &Path,
    session: &SessionId,
    error: &PipelineError,
) -> std::io::Result<PathBuf> {
    let log_dir = base_dir.join(LOGS_DIR);
    tokio::fs::create_dir_all(&log_dir).await?;
    let log_path = log_dir.join(format!("logs_{session}.txt"));

    let mut report = format!(
        "{}\n{}: {}\n",
        Utc::now().to_rfc3339(),
        error.kind(),
        error
    );
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        report.push_str(&format!("caused by: {cause}\n"));
        source = cause.source();
    }

    let mut file = tokio::fs::File::create(&log_path).await?;
    file.write_all(report.as_bytes()).await?;
    file.flush().await?;
    Ok(log_path)
}

//! Per-session workspace lifecycle.
//!
//! Each in-flight session owns one subtree under the configured base
//! directory: an input-staging directory for the downloaded legacy files and
//! an output-staging directory for the converted artifact. A workspace
//! exists on disk only while its pipeline is fetching, converting, or
//! publishing; teardown is unconditional on every exit path.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::WorkspaceError;
use crate::session::SessionId;

/// Reserved base-directory entry receiving per-session failure reports.
/// Never treated as a session workspace by the reaper.
pub const LOGS_DIR: &str = "logs";

/// Name of the input-staging directory inside a session workspace.
pub const SOURCE_DIR: &str = "source_data";

/// Name of the output-staging directory inside a session workspace.
pub const OUTPUT_DIR: &str = "artifact";

/// On-disk scratch area owned by exactly one session's pipeline run.
#[derive(Debug)]
pub struct SessionWorkspace {
    session: SessionId,
    root: PathBuf,
    source_dir: PathBuf,
    output_dir: PathBuf,
}

impl SessionWorkspace {
    /// Creates the workspace directories for a session if absent.
    ///
    /// Idempotent: acquiring an already-present workspace is not an error,
    /// which is what lets a restarted process resume a half-finished
    /// session.
    ///
    /// # Errors
    ///
    /// Returns `WorkspaceError` if directory creation fails.
    pub async fn acquire(base_dir: &Path, session: &SessionId) -> Result<Self, WorkspaceError> {
        let root = base_dir.join(session.as_str());
        let source_dir = root.join(SOURCE_DIR);
        let output_dir = root.join(OUTPUT_DIR);

        fs::create_dir_all(&source_dir).await?;
        fs::create_dir_all(&output_dir).await?;
        debug!(%session, root = %root.display(), "workspace acquired");

        Ok(Self {
            session: session.clone(),
            root,
            source_dir,
            output_dir,
        })
    }

    /// The session this workspace belongs to.
    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Root of the session subtree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Input-staging directory.
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Output-staging directory.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Expected staged path for a source file name.
    pub fn input_path(&self, file_name: &str) -> PathBuf {
        self.source_dir.join(file_name)
    }

    /// Expected staged path for the output artifact name.
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Deletes the input-staging directory.
    ///
    /// Called after a successful conversion to free the large source files
    /// before the upload starts.
    pub async fn clear_sources(&self) -> Result<(), WorkspaceError> {
        remove_tree(&self.source_dir).await?;
        Ok(())
    }

    /// Recursively deletes the whole session subtree.
    ///
    /// Silently ignores an already-absent subtree so that repeated cleanup
    /// calls on different exit paths are safe. Failures are logged and
    /// swallowed; a leftover workspace is reclaimed by a later reap pass.
    pub async fn release(&self) {
        if let Err(e) = remove_tree(&self.root).await {
            warn!(session = %self.session, error = %e, "workspace teardown failed");
        } else {
            debug!(session = %self.session, "workspace released");
        }
    }
}

/// Deletes leftover workspaces for sessions now known to be complete.
///
/// Removes any top-level subfolder named after a completed session id, then
/// sweeps away empty base-directory entries. Guards against orphaned
/// workspaces from sessions that finished on a different run and were
/// recorded complete only in the remote registry. Individual delete
/// failures are logged, not propagated.
///
/// Sessions in `in_flight` are never touched: a sibling worker may be
/// mid-acquire, and its momentarily empty root must not be swept.
///
/// # Errors
///
/// Returns `WorkspaceError` only if the base directory itself cannot be
/// read.
pub async fn reap_completed(
    base_dir: &Path,
    completed: &HashSet<SessionId>,
    in_flight: &HashSet<SessionId>,
) -> Result<usize, WorkspaceError> {
    if !base_dir.exists() {
        return Ok(0);
    }

    let mut reaped = 0;
    let mut entries = fs::read_dir(base_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == LOGS_DIR {
            continue;
        }

        let id = SessionId::new(name);
        if in_flight.contains(&id) {
            continue;
        }

        let is_completed = completed.contains(&id);
        let is_empty = dir_is_empty(&path).await;
        if is_completed || is_empty {
            match remove_tree(&path).await {
                Ok(()) => {
                    reaped += 1;
                    debug!(session = name, "reaped leftover workspace");
                }
                Err(e) => warn!(session = name, error = %e, "failed to reap workspace"),
            }
        }
    }

    Ok(reaped)
}

/// `remove_dir_all` that treats an already-absent path as success.
async fn remove_tree(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

async fn dir_is_empty(path: &Path) -> bool {
    match fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_acquire_is_idempotent() {
        let base = TempDir::new().unwrap();
        let session = SessionId::new("100");

        let ws = SessionWorkspace::acquire(base.path(), &session)
            .await
            .unwrap();
        assert!(ws.source_dir().is_dir());
        assert!(ws.output_dir().is_dir());

        // Second acquire over the same directories succeeds.
        let again = SessionWorkspace::acquire(base.path(), &session)
            .await
            .unwrap();
        assert_eq!(again.root(), ws.root());
    }

    #[tokio::test]
    async fn test_release_removes_subtree_and_is_repeat_safe() {
        let base = TempDir::new().unwrap();
        let session = SessionId::new("100");

        let ws = SessionWorkspace::acquire(base.path(), &session)
            .await
            .unwrap();
        tokio::fs::write(ws.input_path("100.nwb"), b"data")
            .await
            .unwrap();

        ws.release().await;
        assert!(!ws.root().exists());

        // Releasing an already-absent workspace is fine.
        ws.release().await;
    }

    #[tokio::test]
    async fn test_clear_sources_keeps_output() {
        let base = TempDir::new().unwrap();
        let session = SessionId::new("100");

        let ws = SessionWorkspace::acquire(base.path(), &session)
            .await
            .unwrap();
        tokio::fs::write(ws.input_path("100.nwb"), b"in").await.unwrap();
        tokio::fs::write(ws.artifact_path("out.tar.gz"), b"out")
            .await
            .unwrap();

        ws.clear_sources().await.unwrap();
        assert!(!ws.source_dir().exists());
        assert!(ws.artifact_path("out.tar.gz").exists());
    }

    #[tokio::test]
    async fn test_reap_removes_completed_and_empty_but_keeps_logs() {
        let base = TempDir::new().unwrap();
        let completed: HashSet<SessionId> = [SessionId::new("101")].into_iter().collect();

        // Leftover workspace from a session completed on another run.
        let done = SessionWorkspace::acquire(base.path(), &SessionId::new("101"))
            .await
            .unwrap();
        tokio::fs::write(done.input_path("101.nwb"), b"stale")
            .await
            .unwrap();

        // Active session not in the completed set, with content.
        let active = SessionWorkspace::acquire(base.path(), &SessionId::new("100"))
            .await
            .unwrap();
        tokio::fs::write(active.input_path("100.nwb"), b"busy")
            .await
            .unwrap();

        // Empty orphan directory and the reserved logs directory.
        tokio::fs::create_dir(base.path().join("999")).await.unwrap();
        tokio::fs::create_dir(base.path().join(LOGS_DIR)).await.unwrap();

        let reaped = reap_completed(base.path(), &completed, &HashSet::new())
            .await
            .unwrap();
        assert_eq!(reaped, 2);
        assert!(!base.path().join("101").exists());
        assert!(!base.path().join("999").exists());
        assert!(base.path().join("100").exists());
        assert!(base.path().join(LOGS_DIR).exists());
    }

    #[tokio::test]
    async fn test_reap_spares_in_flight_sessions() {
        let base = TempDir::new().unwrap();
        let in_flight: HashSet<SessionId> = [SessionId::new("7")].into_iter().collect();

        // A sibling worker mid-acquire: root created, subdirs not yet.
        tokio::fs::create_dir(base.path().join("7")).await.unwrap();
        // An orphaned empty directory from no known session.
        tokio::fs::create_dir(base.path().join("999")).await.unwrap();

        let reaped = reap_completed(base.path(), &HashSet::new(), &in_flight)
            .await
            .unwrap();
        assert_eq!(reaped, 1);
        assert!(base.path().join("7").exists());
        assert!(!base.path().join("999").exists());
    }

    #[tokio::test]
    async fn test_reap_missing_base_dir_is_noop() {
        let base = TempDir::new().unwrap();
        let missing = base.path().join("nope");
        let reaped = reap_completed(&missing, &HashSet::new(), &HashSet::new())
            .await
            .unwrap();
        assert_eq!(reaped, 0);
    }
}

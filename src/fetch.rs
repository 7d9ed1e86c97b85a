//! Source file staging from the remote blob store.
//!
//! Each session needs one or two large legacy files. A file already present
//! at its staged path is never re-downloaded; existence is the sole
//! idempotency signal, which is safe because downloads land under a `.part`
//! name and are renamed into place only once complete.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::convert::StagedInput;
use crate::error::FetchError;
use crate::session::SessionId;
use crate::workspace::SessionWorkspace;

/// Read-only store of legacy source files, keyed by deterministic names.
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Downloads one object to `dest`. The file must not become visible at
    /// `dest` until it is complete.
    async fn fetch(&self, key: &str, dest: &Path) -> Result<(), FetchError>;
}

/// Anonymous HTTP(S) object store client with streaming downloads.
pub struct HttpBlobSource {
    client: Client,
    base_url: String,
}

impl HttpBlobSource {
    /// Creates a client for the store rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl BlobSource for HttpBlobSource {
    async fn fetch(&self, key: &str, dest: &Path) -> Result<(), FetchError> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), key);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Api {
                code: response.status().as_u16(),
                key: key.to_string(),
            });
        }

        // Stream to a .part name so a crash mid-download can never leave a
        // truncated file masquerading as already fetched.
        let tmp = part_path(dest);
        let mut file = fs::File::create(&tmp).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);
        fs::rename(&tmp, dest).await?;

        info!(key, dest = %dest.display(), "source file staged");
        Ok(())
    }
}

/// Stages a session's required source files into its workspace.
pub struct InputFetcher {
    source: Arc<dyn BlobSource>,
    templates: Vec<String>,
}

impl InputFetcher {
    /// Creates a fetcher resolving session ids through the given key
    /// templates (`{session}` is substituted).
    pub fn new(source: Arc<dyn BlobSource>, templates: Vec<String>) -> Self {
        Self { source, templates }
    }

    /// Expected staged paths for a session, whether or not they exist yet.
    pub fn staged_paths(&self, session: &SessionId, workspace: &SessionWorkspace) -> Vec<PathBuf> {
        self.templates
            .iter()
            .map(|t| workspace.input_path(key_file_name(&render(t, session))))
            .collect()
    }

    /// Ensures every required source file is staged, downloading only the
    /// absent ones.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` on network or filesystem failure; the error is
    /// retryable and no partial file is left under a final name.
    pub async fn ensure_fetched(
        &self,
        session: &SessionId,
        workspace: &SessionWorkspace,
    ) -> Result<StagedInput, FetchError> {
        let mut files = Vec::with_capacity(self.templates.len());
        for template in &self.templates {
            let key = render(template, session);
            let dest = workspace.input_path(key_file_name(&key));
            if dest.exists() {
                debug!(%session, file = %dest.display(), "source file already staged");
            } else {
                self.source.fetch(&key, &dest).await?;
            }
            files.push(dest);
        }
        Ok(StagedInput { files })
    }
}

/// Renders a key template for a session.
fn render(template: &str, session: &SessionId) -> String {
    template.replace("{session}", session.as_str())
}

/// Local file name for a remote key: its last path segment.
fn key_file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Sibling temp name used while a file is being written.
pub(crate) fn part_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    dest.with_file_name(format!("{name}.part"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct MemoryBlobSource {
        fetches: AtomicUsize,
    }

    impl MemoryBlobSource {
        fn new() -> Self {
            Self {
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BlobSource for MemoryBlobSource {
        async fn fetch(&self, key: &str, dest: &Path) -> Result<(), FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            fs::write(dest, key.as_bytes()).await?;
            Ok(())
        }
    }

    #[test]
    fn test_render_and_file_name() {
        let session = SessionId::new("712919679");
        let key = render("ophys_movies/ophys_experiment_{session}.h5", &session);
        assert_eq!(key, "ophys_movies/ophys_experiment_712919679.h5");
        assert_eq!(key_file_name(&key), "ophys_experiment_712919679.h5");
        assert_eq!(key_file_name("flat.nwb"), "flat.nwb");
    }

    #[test]
    fn test_part_path_is_sibling() {
        let part = part_path(Path::new("/base/100/source_data/100.nwb"));
        assert_eq!(part, Path::new("/base/100/source_data/100.nwb.part"));
    }

    #[tokio::test]
    async fn test_ensure_fetched_downloads_missing_files() {
        let base = TempDir::new().unwrap();
        let session = SessionId::new("100");
        let ws = SessionWorkspace::acquire(base.path(), &session)
            .await
            .unwrap();

        let source = Arc::new(MemoryBlobSource::new());
        let fetcher = InputFetcher::new(
            source.clone(),
            vec![
                "data/{session}.nwb".to_string(),
                "movies/movie_{session}.h5".to_string(),
            ],
        );

        let input = fetcher.ensure_fetched(&session, &ws).await.unwrap();
        assert_eq!(input.files.len(), 2);
        assert!(input.files.iter().all(|p| p.exists()));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ensure_fetched_skips_already_staged() {
        let base = TempDir::new().unwrap();
        let session = SessionId::new("100");
        let ws = SessionWorkspace::acquire(base.path(), &session)
            .await
            .unwrap();

        let source = Arc::new(MemoryBlobSource::new());
        let fetcher = InputFetcher::new(source.clone(), vec!["data/{session}.nwb".to_string()]);

        // Pre-stage the file with its final name.
        fs::write(ws.input_path("100.nwb"), b"already here")
            .await
            .unwrap();

        let input = fetcher.ensure_fetched(&session, &ws).await.unwrap();
        assert_eq!(input.files.len(), 1);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(fs::read(&input.files[0]).await.unwrap(), b"already here");
    }

    #[tokio::test]
    async fn test_staged_paths_match_templates() {
        let base = TempDir::new().unwrap();
        let session = SessionId::new("55");
        let ws = SessionWorkspace::acquire(base.path(), &session)
            .await
            .unwrap();

        let fetcher = InputFetcher::new(
            Arc::new(MemoryBlobSource::new()),
            vec!["data/{session}.nwb".to_string()],
        );
        let paths = fetcher.staged_paths(&session, &ws);
        assert_eq!(paths, vec![ws.input_path("55.nwb")]);
    }
}

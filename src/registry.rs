//! Dataset registry client.
//!
//! The remote registry is the single source of truth for "has this
//! session's artifact already been published": there is no local completion
//! ledger, so independent orchestrator hosts converge without coordination.
//! One HTTP client serves both roles — the read-only completion listing and
//! the artifact upload.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::convert::StagedOutput;
use crate::error::{PublishError, RegistryError};
use crate::session::SessionId;

/// Read-only view of which sessions already have a published artifact.
#[async_trait]
pub trait CompletionRegistry: Send + Sync {
    /// Session ids with a published artifact. Transient network failure
    /// surfaces as a retryable error and aborts batch setup, never an
    /// individual session.
    async fn completed(&self) -> Result<HashSet<SessionId>, RegistryError>;
}

/// Write side of the registry: uploads one staged artifact.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Publishes the staged artifact under the dataset namespace. Must be
    /// safe to call repeatedly for an already-published session.
    async fn publish(
        &self,
        session: &SessionId,
        output: &StagedOutput,
    ) -> Result<PublishResult, PublishError>;
}

/// Outcome of a publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishResult {
    /// The artifact was uploaded by this call.
    Uploaded,
    /// The registry already held this session's artifact.
    AlreadyPublished,
}

#[derive(Debug, Deserialize)]
struct AssetPage {
    results: Vec<Asset>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Asset {
    path: String,
}

/// HTTP client for the dataset registry API.
pub struct RegistryClient {
    client: Client,
    base_url: String,
    dataset_id: String,
    class_marker: String,
    token: String,
}

impl RegistryClient {
    /// Creates a registry client for one dataset namespace.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Http` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        dataset_id: impl Into<String>,
        class_marker: impl Into<String>,
        token: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, RegistryError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            dataset_id: dataset_id.into(),
            class_marker: class_marker.into(),
            token: token.into(),
        })
    }

    /// Enumerates every asset path in the dataset, following pagination.
    async fn list_asset_paths(&self) -> Result<Vec<String>, RegistryError> {
        let mut url = format!(
            "{}/datasets/{}/assets",
            self.base_url.trim_end_matches('/'),
            self.dataset_id
        );
        let mut paths = Vec::new();

        loop {
            let response = self
                .client
                .get(&url)
                .bearer_auth(&self.token)
                .send()
                .await?;
            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(RegistryError::Api {
                    code: status.as_u16(),
                    message,
                });
            }

            let page: AssetPage = response.json().await?;
            paths.extend(page.results.into_iter().map(|a| a.path));
            match page.next {
                Some(next) => url = next,
                None => break,
            }
        }

        Ok(paths)
    }

    /// Every session id known to the registry, enumerated through the
    /// companion asset class (paths containing the marker). Used when no
    /// local session list is supplied.
    pub async fn known_sessions(&self) -> Result<HashSet<SessionId>, RegistryError> {
        let paths = self.list_asset_paths().await?;
        Ok(sessions_from_paths(&paths, &self.class_marker, true))
    }
}

#[async_trait]
impl CompletionRegistry for RegistryClient {
    async fn completed(&self) -> Result<HashSet<SessionId>, RegistryError> {
        let paths = self.list_asset_paths().await?;
        let completed = sessions_from_paths(&paths, &self.class_marker, false);
        info!(
            dataset = %self.dataset_id,
            completed = completed.len(),
            "fetched completion listing"
        );
        Ok(completed)
    }
}

#[async_trait]
impl ArtifactPublisher for RegistryClient {
    async fn publish(
        &self,
        session: &SessionId,
        output: &StagedOutput,
    ) -> Result<PublishResult, PublishError> {
        let file_name = output
            .file_name()
            .ok_or_else(|| PublishError::MissingArtifact(output.path.clone()))?;
        if !output.path.exists() {
            return Err(PublishError::MissingArtifact(output.path.clone()));
        }

        let url = format!(
            "{}/datasets/{}/assets?path={}",
            self.base_url.trim_end_matches('/'),
            self.dataset_id,
            file_name
        );
        let body = tokio::fs::read(&output.path).await?;

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .header("content-type", "application/octet-stream")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(%session, asset = file_name, "artifact published");
            return Ok(PublishResult::Uploaded);
        }

        let message = response.text().await.unwrap_or_default();
        if status.as_u16() == 409 || message.contains("already exists") {
            info!(%session, asset = file_name, "artifact was already published");
            return Ok(PublishResult::AlreadyPublished);
        }

        Err(PublishError::Api {
            code: status.as_u16(),
            message,
        })
    }
}

/// Extracts session ids from asset paths belonging to one asset class.
///
/// With `with_marker` false this yields the completed migrations (assets
/// whose path lacks the marker substring); with it true, the companion
/// class that enumerates the full session universe.
fn sessions_from_paths(paths: &[String], marker: &str, with_marker: bool) -> HashSet<SessionId> {
    paths
        .iter()
        .filter(|path| path.contains(marker) == with_marker)
        .filter_map(|path| {
            let id = parse_session_id(path);
            if id.is_none() {
                warn!(path, "asset path does not follow the session naming convention");
            }
            id
        })
        .collect()
}

/// Parses the session id out of an asset path.
///
/// Asset file names follow `..._ses-<id>_desc-<class>.<ext>`; the id is
/// the `ses-` segment with any extension stripped.
fn parse_session_id(path: &str) -> Option<SessionId> {
    let file_name = Path::new(path).file_name()?.to_str()?;
    let segment = file_name
        .split('_')
        .find_map(|s| s.strip_prefix("ses-"))?;
    let id = segment.split('.').next()?;
    if id.is_empty() {
        None
    } else {
        Some(SessionId::new(id))
    }
}

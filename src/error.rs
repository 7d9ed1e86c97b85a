//! Error types for sessionforge operations.
//!
//! Defines error types for the major subsystems:
//! - Completion registry reads and artifact publication
//! - Source file staging from the remote blob store
//! - Workspace lifecycle on the local filesystem
//! - Session conversion (the external collaborator seam)

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading the remote dataset registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registry API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Malformed asset listing: {0}")]
    MalformedListing(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur while staging source files from the blob store.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Blob store returned {code} for key '{key}'")]
    Api { code: u16, key: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while publishing a staged artifact.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Registry API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Staged artifact missing: {0}")]
    MissingArtifact(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during workspace directory management.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a session converter implementation.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Required input missing: {0}")]
    MissingInput(PathBuf),

    #[error("Conversion failed: {0}")]
    Failed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

//! sessionforge: batch migration of archived recording sessions.
//!
//! Migrates a large, fixed population of independent recording sessions
//! from a legacy archival container to a new one and publishes each
//! completed artifact to a remote dataset registry. The registry is the
//! single source of truth for completed work, so interrupted or repeated
//! runs converge without local bookkeeping.

// Core modules
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod fetch;
pub mod pause;
pub mod pipeline;
pub mod registry;
pub mod repack;
pub mod session;
pub mod workspace;

// Re-export commonly used error types
pub use error::{ConvertError, FetchError, PublishError, RegistryError, WorkspaceError};

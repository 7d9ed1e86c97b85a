//! Migration pipeline orchestration.
//!
//! Two layers:
//!
//! - **SessionPipeline**: migrates one session — stage inputs, convert,
//!   publish, guaranteed cleanup — with pause checks at each boundary.
//! - **BatchOrchestrator**: computes the pending work set against the
//!   remote completion listing and fans session pipelines out over a
//!   bounded worker pool, isolating per-session failure.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sessionforge::config::MigrationConfig;
//! use sessionforge::fetch::HttpBlobSource;
//! use sessionforge::pipeline::BatchOrchestrator;
//! use sessionforge::registry::RegistryClient;
//! use sessionforge::repack::RepackConverter;
//!
//! let config = MigrationConfig::from_env()?;
//! let token = config.require_credential()?;
//! let registry = Arc::new(RegistryClient::new(
//!     &config.registry_url,
//!     &config.dataset_id,
//!     &config.class_marker,
//!     token,
//!     config.http_timeout,
//! )?);
//! let source = Arc::new(HttpBlobSource::new(&config.blob_url, config.http_timeout)?);
//!
//! let orchestrator = BatchOrchestrator::new(
//!     config,
//!     registry.clone(),
//!     registry,
//!     source,
//!     Arc::new(RepackConverter::new()),
//! )?;
//!
//! let report = orchestrator.run_batch(all_sessions, 0, None).await?;
//! println!("completed: {}, failed: {}", report.stats.completed, report.stats.failed);
//! ```

pub mod orchestrator;
pub mod session;

// Re-export main types for convenience
pub use orchestrator::{
    BatchError, BatchOrchestrator, BatchReport, BatchStats, SessionOutcome, SessionStatus,
};
pub use session::{write_failure_log, PipelineError, SessionPipeline};

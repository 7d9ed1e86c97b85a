//! Session conversion seam.
//!
//! Transforming one session's legacy container into the new artifact is
//! irreducibly domain-specific, so the orchestrator only ever talks to the
//! `SessionConverter` trait. The pipeline never inspects conversion
//! internals; it checks for the expected artifact path to decide whether to
//! invoke conversion at all, which is what makes a crashed-after-convert
//! run resume straight at publish.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::ConvertError;
use crate::session::SessionId;
use crate::workspace::SessionWorkspace;

/// Source files staged into a session's input directory.
#[derive(Debug, Clone)]
pub struct StagedInput {
    /// Staged file paths, in the order the input templates define them.
    pub files: Vec<PathBuf>,
}

impl StagedInput {
    /// The first (primary) source file.
    pub fn primary(&self) -> Option<&Path> {
        self.files.first().map(PathBuf::as_path)
    }
}

/// The single converted artifact staged in a session's output directory.
#[derive(Debug, Clone)]
pub struct StagedOutput {
    /// Path of the staged artifact file.
    pub path: PathBuf,
}

impl StagedOutput {
    /// Final artifact file name, as published to the registry.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Artifact header metadata extracted from the staged input.
pub type Metadata = serde_json::Value;

/// External collaborator that turns staged legacy inputs into the new
/// artifact format.
///
/// Implementations must be deterministic given identical inputs and must
/// stage the artifact under the exact name `artifact_name` reports, since
/// that name doubles as the pipeline's resume signal.
#[async_trait]
pub trait SessionConverter: Send + Sync {
    /// Canonical artifact file name for a session.
    fn artifact_name(&self, session: &SessionId) -> String;

    /// Extracts artifact header metadata from the staged input.
    fn metadata(&self, input: &StagedInput) -> Result<Metadata, ConvertError>;

    /// Consumes the staged inputs and produces the staged output artifact.
    async fn convert(
        &self,
        session: &SessionId,
        input: &StagedInput,
        workspace: &SessionWorkspace,
    ) -> Result<StagedOutput, ConvertError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_input_primary() {
        let input = StagedInput {
            files: vec![PathBuf::from("/w/s/100.nwb"), PathBuf::from("/w/s/m.h5")],
        };
        assert_eq!(input.primary(), Some(Path::new("/w/s/100.nwb")));

        let empty = StagedInput { files: Vec::new() };
        assert!(empty.primary().is_none());
    }

    #[test]
    fn test_staged_output_file_name() {
        let output = StagedOutput {
            path: PathBuf::from("/w/artifact/ses-100_desc-raw.tar.gz"),
        };
        assert_eq!(output.file_name(), Some("ses-100_desc-raw.tar.gz"));
    }
}

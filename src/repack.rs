//! Built-in container repacker.
//!
//! The scientific field-by-field conversion is a separate concern supplied
//! by the domain team; this converter is the seam where it plugs in. It
//! bundles the staged source files plus a JSON manifest into a single
//! gzipped tar artifact so the full pipeline is runnable end to end.

use async_trait::async_trait;
use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::json;
use tracing::info;

use crate::convert::{Metadata, SessionConverter, StagedInput, StagedOutput};
use crate::error::ConvertError;
use crate::fetch::part_path;
use crate::session::SessionId;
use crate::workspace::SessionWorkspace;

/// Converter that repacks the legacy source files into the new container.
#[derive(Debug, Default)]
pub struct RepackConverter;

impl RepackConverter {
    /// Creates a new repack converter.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionConverter for RepackConverter {
    fn artifact_name(&self, session: &SessionId) -> String {
        format!("ses-{session}_desc-raw.tar.gz")
    }

    fn metadata(&self, input: &StagedInput) -> Result<Metadata, ConvertError> {
        let mut sources = Vec::with_capacity(input.files.len());
        for file in &input.files {
            let info = std::fs::metadata(file)
                .map_err(|_| ConvertError::MissingInput(file.clone()))?;
            sources.push(json!({
                "name": file.file_name().and_then(|n| n.to_str()),
                "bytes": info.len(),
            }));
        }

        Ok(json!({
            "sources": sources,
            "created": Utc::now().to_rfc3339(),
            "generator": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        }))
    }

    async fn convert(
        &self,
        session: &SessionId,
        input: &StagedInput,
        workspace: &SessionWorkspace,
    ) -> Result<StagedOutput, ConvertError> {
        for file in &input.files {
            if !file.exists() {
                return Err(ConvertError::MissingInput(file.clone()));
            }
        }

        let mut manifest = self.metadata(input)?;
        manifest["session"] = json!(session.as_str());
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;

        let dest = workspace.artifact_path(&self.artifact_name(session));
        let tmp = part_path(&dest);
        let files = input.files.clone();

        // Archive building is CPU and blocking IO; keep it off the runtime.
        let tmp_for_task = tmp.clone();
        tokio::task::spawn_blocking(move || -> Result<(), ConvertError> {
            let file = std::fs::File::create(&tmp_for_task)?;
            let encoder = GzEncoder::new(file, Compression::default());
            let mut builder = tar::Builder::new(encoder);

            let mut header = tar::Header::new_gnu();
            header.set_size(manifest_bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, "manifest.json", manifest_bytes.as_slice())?;

            for path in &files {
                let name = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| ConvertError::MissingInput(path.clone()))?;
                builder.append_path_with_name(path, name)?;
            }

            let encoder = builder.into_inner()?;
            encoder.finish()?;
            Ok(())
        })
        .await
        .map_err(|e| ConvertError::Failed(format!("repack task panicked: {e}")))??;

        // Same temp-then-rename discipline as downloads: the artifact name
        // is the resume signal, so it must only appear once complete.
        tokio::fs::rename(&tmp, &dest).await?;
        info!(%session, artifact = %dest.display(), "session repacked");

        Ok(StagedOutput { path: dest })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    async fn staged_session(base: &TempDir, session: &SessionId) -> (SessionWorkspace, StagedInput) {
        let ws = SessionWorkspace::acquire(base.path(), session).await.unwrap();
        let a = ws.input_path("100.nwb");
        let b = ws.input_path("ophys_experiment_100.h5");
        tokio::fs::write(&a, b"legacy container").await.unwrap();
        tokio::fs::write(&b, b"movie data").await.unwrap();
        (ws, StagedInput { files: vec![a, b] })
    }

    #[tokio::test]
    async fn test_convert_produces_named_artifact() {
        let base = TempDir::new().unwrap();
        let session = SessionId::new("100");
        let (ws, input) = staged_session(&base, &session).await;

        let converter = RepackConverter::new();
        let output = converter.convert(&session, &input, &ws).await.unwrap();

        assert_eq!(output.file_name(), Some("ses-100_desc-raw.tar.gz"));
        assert!(output.path.exists());
        // No temp file left behind.
        assert!(!part_path(&output.path).exists());
    }

    #[tokio::test]
    async fn test_artifact_contains_manifest_and_sources() {
        let base = TempDir::new().unwrap();
        let session = SessionId::new("100");
        let (ws, input) = staged_session(&base, &session).await;

        let converter = RepackConverter::new();
        let output = converter.convert(&session, &input, &ws).await.unwrap();

        let file = std::fs::File::open(&output.path).unwrap();
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let mut names = Vec::new();
        let mut manifest = String::new();
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            if name == "manifest.json" {
                entry.read_to_string(&mut manifest).unwrap();
            }
            names.push(name);
        }

        assert_eq!(
            names,
            vec!["manifest.json", "100.nwb", "ophys_experiment_100.h5"]
        );
        let manifest: serde_json::Value = serde_json::from_str(&manifest).unwrap();
        assert_eq!(manifest["session"], "100");
        assert_eq!(manifest["sources"][0]["name"], "100.nwb");
        assert_eq!(manifest["sources"][1]["bytes"], 10);
    }

    #[tokio::test]
    async fn test_convert_rejects_missing_input() {
        let base = TempDir::new().unwrap();
        let session = SessionId::new("100");
        let ws = SessionWorkspace::acquire(base.path(), &session)
            .await
            .unwrap();
        let input = StagedInput {
            files: vec![ws.input_path("100.nwb")],
        };

        let converter = RepackConverter::new();
        let err = converter.convert(&session, &input, &ws).await.unwrap_err();
        assert!(matches!(err, ConvertError::MissingInput(_)));
    }

    #[tokio::test]
    async fn test_metadata_lists_sources() {
        let base = TempDir::new().unwrap();
        let session = SessionId::new("100");
        let (_ws, input) = staged_session(&base, &session).await;

        let metadata = RepackConverter::new().metadata(&input).unwrap();
        assert_eq!(metadata["sources"].as_array().unwrap().len(), 2);
        assert_eq!(metadata["generator"]["name"], "sessionforge");
    }
}

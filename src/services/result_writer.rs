//! Persists partition documents and the run summary to the output directory

use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};
use crate::pipeline::RunSummary;

/// File name of the machine-readable run summary
pub const SUMMARY_FILE_NAME: &str = "summary.json";

pub struct ResultWriter {
    output_dir: PathBuf,
}

impl ResultWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write every document, then the summary listing them.
    ///
    /// `summary.files` is replaced by the names actually written.
    pub async fn write_all(
        &self,
        documents: &[(String, String)],
        summary: &mut RunSummary,
    ) -> AppResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| AppError::output(self.output_dir.display().to_string(), e))?;

        let mut written = Vec::with_capacity(documents.len() + 1);
        summary.files.clear();

        for (file_name, contents) in documents {
            let path = self.write_file(file_name, contents.as_bytes()).await?;
            summary.files.push(file_name.clone());
            written.push(path);
        }

        let json = serde_json::to_string_pretty(summary)?;
        written.push(self.write_file(SUMMARY_FILE_NAME, json.as_bytes()).await?);

        info!(
            "Saved {} files to {}",
            written.len(),
            self.output_dir.display()
        );
        Ok(written)
    }

    async fn write_file(&self, file_name: &str, contents: &[u8]) -> AppResult<PathBuf> {
        let path = self.output_dir.join(file_name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| AppError::output(path.display().to_string(), e))?;
        debug!("Wrote {} bytes to {}", contents.len(), path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PlaylistEntry, ProbeOutcome};
    use crate::pipeline::ResultAccumulator;
    use std::time::Duration;

    #[tokio::test]
    async fn writes_documents_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ResultWriter::new(dir.path().join("out"));

        let mut acc = ResultAccumulator::new();
        acc.record(
            &PlaylistEntry::new(0, Some("#EXTINF:-1,One".to_string()), "http://10.0.0.1/a.ts"),
            &ProbeOutcome::Working {
                response_time: Duration::from_millis(20),
                status_code: 200,
                content_type: "video/mp2t".to_string(),
            },
        );
        let mut summary = acc.summary(Duration::from_secs(1), false, 0);

        let written = writer
            .write_all(&acc.documents(false), &mut summary)
            .await
            .unwrap();
        assert_eq!(written.len(), 5);
        assert_eq!(
            summary.files,
            vec![
                "all_working_1.m3u",
                "all_failing_0.m3u",
                "ipv4_working_1.m3u",
                "ipv4_failing_0.m3u",
            ]
        );

        let working = std::fs::read_to_string(dir.path().join("out/all_working_1.m3u")).unwrap();
        assert_eq!(working, "#EXTM3U\n#EXTINF:-1,One\nhttp://10.0.0.1/a.ts\n");

        let json: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("out").join(SUMMARY_FILE_NAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(json["total"], 1);
        assert_eq!(json["ipv4"]["working"], 1);
        assert!(json.get("epg_matches").is_none());
    }

    #[tokio::test]
    async fn unwritable_directory_is_an_output_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        // A regular file cannot act as the output directory
        let writer = ResultWriter::new(file.path());
        let mut summary = ResultAccumulator::new().summary(Duration::ZERO, false, 0);
        let err = writer.write_all(&[], &mut summary).await.unwrap_err();
        assert!(matches!(err, AppError::Output { .. }));
    }
}

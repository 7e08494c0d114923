//! Local recording export: the "download" path.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::media::RecordingBlob;
use crate::services::{RecordingLocation, RecordingMetadata, RecordingSink, ServiceError};

/// Writes recordings into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct FileExporter {
    dir: PathBuf,
}

impl FileExporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }
}

#[async_trait]
impl RecordingSink for FileExporter {
    async fn export(
        &self,
        blob: &RecordingBlob,
        metadata: &RecordingMetadata,
    ) -> Result<RecordingLocation, ServiceError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        // Only the final path component of the suggested name is honoured.
        let file_name = std::path::Path::new(&metadata.file_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| format!("{}.rec", metadata.session_id).into());

        let path = self.dir.join(file_name);
        let copied = tokio::fs::copy(blob.path(), &path).await?;
        log::info!("recording exported: {} ({copied} bytes)", path.display());
        Ok(RecordingLocation::File(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::recorder::CONTAINER_MIME;
    use tempfile::tempdir;

    fn metadata(file_name: &str) -> RecordingMetadata {
        RecordingMetadata {
            session_id: "s-1".into(),
            subject: "React".into(),
            file_name: file_name.into(),
            mime_type: CONTAINER_MIME.into(),
        }
    }

    #[tokio::test]
    async fn writes_blob_into_nested_dir() {
        let dir = tempdir().expect("temp dir");
        let exporter = FileExporter::new(dir.path().join("a").join("b"));
        let blob = RecordingBlob::from_bytes(&[1, 2, 3], CONTAINER_MIME).unwrap();

        let location = exporter
            .export(&blob, &metadata("interview.rec"))
            .await
            .expect("export");

        let RecordingLocation::File(path) = location else {
            panic!("expected a file location");
        };
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert!(path.ends_with("interview.rec"));
    }

    #[tokio::test]
    async fn path_components_in_file_name_are_dropped() {
        let dir = tempdir().expect("temp dir");
        let exporter = FileExporter::new(dir.path());
        let blob = RecordingBlob::from_bytes(&[0], CONTAINER_MIME).unwrap();

        let location = exporter
            .export(&blob, &metadata("../../escape.rec"))
            .await
            .expect("export");
        assert_eq!(
            location,
            RecordingLocation::File(dir.path().join("escape.rec"))
        );
    }
}

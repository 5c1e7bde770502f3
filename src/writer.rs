//! Snapshot writer
//!
//! Snapshots are written to a sibling temp file and renamed over the target,
//! so a failed write leaves the previous snapshot readable.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::snapshot::Snapshot;

/// Common interface for snapshot sinks
#[async_trait]
pub trait SnapshotWriter: Send + Sync {
    /// Persist the snapshot, replacing any previous one
    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()>;
}

/// Pretty-printed JSON file writer
pub struct JsonFileWriter {
    path: PathBuf,
}

impl JsonFileWriter {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Temp file next to the target, so the rename stays on one filesystem
    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snapshot.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }

    async fn write_temp(&self, temp: &Path, body: &[u8]) -> Result<()> {
        let mut file = fs::File::create(temp)
            .await
            .context(format!("Failed to create temp file: {:?}", temp))?;
        file.write_all(body)
            .await
            .context(format!("Failed to write temp file: {:?}", temp))?;
        file.sync_all()
            .await
            .context(format!("Failed to sync temp file: {:?}", temp))?;
        Ok(())
    }
}

/// Stable, human-diffable rendering of a snapshot
pub fn render(snapshot: &Snapshot) -> Result<String> {
    let mut body = serde_json::to_string_pretty(snapshot)
        .context("Failed to serialize snapshot to JSON")?;
    body.push('\n');
    Ok(body)
}

#[async_trait]
impl SnapshotWriter for JsonFileWriter {
    async fn write_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let body = render(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create directory: {:?}", parent))?;
        }

        let temp = self.temp_path();
        let written = match self.write_temp(&temp, body.as_bytes()).await {
            Ok(()) => fs::rename(&temp, &self.path)
                .await
                .context(format!("Failed to move {:?} into place at {:?}", temp, self.path)),
            Err(e) => Err(e),
        };

        if written.is_err() {
            if let Err(e) = fs::remove_file(&temp).await {
                warn!("Failed to remove temp file {:?}: {}", temp, e);
            }
        }
        written?;

        debug!("Wrote {} bytes to {:?}", body.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Indicator, SeriesPoint};
    use chrono::{TimeZone, Utc};

    fn sample() -> Snapshot {
        let t = Utc.with_ymd_and_hms(2024, 11, 25, 6, 0, 0).unwrap();
        let mut usdtry = Indicator::new("usdtry");
        usdtry.name = "USD/TRY".to_string();
        usdtry.series.push(SeriesPoint { t, v: 34.2 });
        Snapshot { generated_at: t, items: vec![usdtry] }
    }

    #[tokio::test]
    async fn test_write_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("market.json");
        let writer = JsonFileWriter::new(&path);

        writer.write_snapshot(&sample()).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Snapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, sample());
        assert!(!writer.temp_path().exists());
    }

    #[tokio::test]
    async fn test_layout_is_indented_with_stable_field_order() {
        let body = render(&sample()).unwrap();
        let generated = body.find("\"generated_at\"").unwrap();
        let items = body.find("\"items\"").unwrap();
        assert!(generated < items);

        let fields = ["\"key\"", "\"name\"", "\"unit\"", "\"format\"", "\"source_url\"", "\"series\""];
        let positions: Vec<usize> = fields.iter().map(|f| body.find(f).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(body.contains("\n  \"items\": ["));
    }

    #[tokio::test]
    async fn test_failed_write_keeps_prior_file() {
        let dir = tempfile::tempdir().unwrap();
        // The target path is a directory, so the final rename must fail
        let path = dir.path().join("market.json");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep.txt"), "prior").unwrap();

        let writer = JsonFileWriter::new(&path);
        assert!(writer.write_snapshot(&sample()).await.is_err());
        assert_eq!(std::fs::read_to_string(path.join("keep.txt")).unwrap(), "prior");
        assert!(!writer.temp_path().exists());
    }
}

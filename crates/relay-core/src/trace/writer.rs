//! TraceWriter — persists one JSON file per trace.
//!
//! Storage path: `<data_root>/traces/trace-{traceId}.json`
//!
//! Features:
//! - Whole-file replacement via temp file + rename (readers never see a torn file)
//! - Automatic directory creation
//! - Graceful error handling (`write_safe` never fails the main flow)

use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::TraceEntry;

/// TraceWriter manages the per-trace JSON files.
#[derive(Clone)]
pub struct TraceWriter {
    /// Base directory for trace files (e.g., "~/.relay/traces")
    base_dir: PathBuf,
}

impl TraceWriter {
    /// Create a TraceWriter with a custom base directory.
    pub fn with_base_dir(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, trace_id: &str) -> PathBuf {
        self.base_dir.join(format!("trace-{}.json", trace_id))
    }

    /// Replace the stored copy of `entry`.
    pub async fn write(&self, entry: &TraceEntry) -> Result<PathBuf, TraceWriteError> {
        fs::create_dir_all(&self.base_dir)
            .await
            .map_err(|e| TraceWriteError::Io(format!("Failed to create trace dir: {}", e)))?;

        let json = serde_json::to_vec_pretty(entry)
            .map_err(|e| TraceWriteError::Serialization(e.to_string()))?;

        let path = self.path_for(&entry.trace_id);
        let tmp = self
            .base_dir
            .join(format!(".trace-{}.json.{}.tmp", entry.trace_id, uuid::Uuid::new_v4()));

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| TraceWriteError::Io(e.to_string()))?;
        file.write_all(&json)
            .await
            .map_err(|e| TraceWriteError::Io(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| TraceWriteError::Io(e.to_string()))?;
        drop(file);

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(TraceWriteError::Io(format!("Failed to replace trace file: {}", e)));
        }
        Ok(path)
    }

    /// Write a trace, logging errors but never failing.
    ///
    /// Use this in production code paths where trace failures
    /// should not impact the main flow.
    pub async fn write_safe(&self, entry: &TraceEntry) {
        if let Err(e) = self.write(entry).await {
            tracing::warn!("[TraceWriter] Failed to write trace {}: {}", entry.trace_id, e);
        }
    }

    pub async fn remove(&self, trace_id: &str) -> Result<(), TraceWriteError> {
        match fs::remove_file(self.path_for(trace_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TraceWriteError::Io(e.to_string())),
        }
    }

    /// Get the base directory for traces.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

/// Error type for trace writing operations.
#[derive(Debug, thiserror::Error)]
pub enum TraceWriteError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceContext;

    #[tokio::test]
    async fn test_write_replaces_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::with_base_dir(dir.path().join("traces"));

        let mut entry = TraceEntry::new("t1", TraceContext::default());
        writer.write(&entry).await.unwrap();
        entry.error = Some("boom".into());
        let path = writer.write(&entry).await.unwrap();

        let loaded: TraceEntry =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(loaded.error.as_deref(), Some("boom"));

        let names: Vec<String> = std::fs::read_dir(writer.base_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["trace-t1.json".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::with_base_dir(dir.path());
        writer.remove("nope").await.unwrap();
    }
}

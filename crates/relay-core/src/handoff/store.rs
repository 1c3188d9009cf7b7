//! HandoffStore — durable, write-once handoff documents.
//!
//! Layout under `<data_root>/campaigns/<campaign_id>/handoffs/`:
//!
//! - `archive/<seq>-<handoff_id>.json` — every document ever written, never modified
//! - `<from>-to-<to>.json` — the most recent document for that stage pair
//!
//! Both files are written through a temp file and renamed into place. The
//! archive rename is the commit point; if the canonical copy cannot be
//! replaced afterwards, the archive file is removed again.

use dashmap::DashMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::types::{HandoffDocument, HandoffReceipt, HandoffSelector};
use super::validate::{check_document, is_safe_id, parse_document};
use crate::error::{FieldError, RelayError};
use crate::models::stage::Stage;
use crate::trace::{StepRecord, TraceRecorder};

pub struct HandoffStore {
    campaigns_dir: PathBuf,
    recorder: Arc<TraceRecorder>,
    /// One entry per campaign with a write in flight.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl HandoffStore {
    /// `campaigns_dir` is usually `<data_root>/campaigns`.
    pub fn new(campaigns_dir: impl AsRef<Path>, recorder: Arc<TraceRecorder>) -> Self {
        Self {
            campaigns_dir: campaigns_dir.as_ref().to_path_buf(),
            recorder,
            locks: DashMap::new(),
        }
    }

    pub fn campaign_dir(&self, campaign_id: &str) -> PathBuf {
        self.campaigns_dir.join(campaign_id)
    }

    fn handoff_dir(&self, campaign_id: &str) -> PathBuf {
        self.campaign_dir(campaign_id).join("handoffs")
    }

    fn archive_dir(&self, campaign_id: &str) -> PathBuf {
        self.handoff_dir(campaign_id).join("archive")
    }

    fn canonical_path(&self, campaign_id: &str, from: Stage, to: Stage) -> PathBuf {
        self.handoff_dir(campaign_id)
            .join(format!("{}-to-{}.json", from.as_str(), to.as_str()))
    }

    fn campaign_lock(&self, campaign_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(campaign_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the campaign's entry unless another writer still holds a handle.
    fn release_lock(&self, campaign_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(campaign_id, |_, held| Arc::strong_count(held) == 1);
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.len()
    }

    /// Validate and persist a typed document.
    pub async fn write(&self, doc: &HandoffDocument) -> Result<HandoffReceipt, RelayError> {
        let value = serde_json::to_value(doc)?;
        self.write_value(value).await
    }

    /// Validate and persist a raw JSON document.
    pub async fn write_value(&self, value: Value) -> Result<HandoffReceipt, RelayError> {
        let doc = parse_document(value)?;
        let errors = check_document(&doc);
        if !errors.is_empty() {
            return Err(RelayError::Validation(errors));
        }

        let campaign_id = doc.handoff_info.campaign_id.clone();
        let lock = self.campaign_lock(&campaign_id);
        let result = {
            let _guard = lock.lock().await;
            self.commit(&campaign_id, &doc).await
        };
        self.release_lock(&campaign_id, lock);
        result
    }

    async fn commit(&self, campaign_id: &str, doc: &HandoffDocument) -> Result<HandoffReceipt, RelayError> {
        let info = &doc.handoff_info;
        let archive = self.archive_files(campaign_id).await?;
        if archive.iter().any(|(_, id, _)| id == &info.handoff_id) {
            return Err(RelayError::Validation(vec![FieldError::new(
                "handoff_info.handoff_id",
                format!("'{}' already exists in campaign {}", info.handoff_id, campaign_id),
            )]));
        }
        let seq = archive.last().map(|(seq, _, _)| seq + 1).unwrap_or(1);

        let bytes = serde_json::to_vec_pretty(doc)?;
        let archive_path = self
            .archive_dir(campaign_id)
            .join(format!("{:04}-{}.json", seq, info.handoff_id));
        let path = self.canonical_path(campaign_id, info.from_stage, info.to_stage);

        write_atomic(&archive_path, &bytes).await?;
        if let Err(e) = write_atomic(&path, &bytes).await {
            let _ = fs::remove_file(&archive_path).await;
            return Err(e);
        }

        tracing::info!(
            "[HandoffStore] {} {} -> {} written as {}",
            campaign_id,
            info.from_stage,
            info.to_stage,
            info.handoff_id
        );

        if self.recorder.is_active(&info.trace_id).await {
            self.recorder
                .add_step(
                    &info.trace_id,
                    StepRecord::new("handoff", "write")
                        .params(serde_json::json!({
                            "campaignId": campaign_id,
                            "fromStage": info.from_stage,
                            "toStage": info.to_stage,
                        }))
                        .result(serde_json::json!({
                            "handoffId": info.handoff_id,
                            "path": path.to_string_lossy(),
                        })),
                )
                .await;
        }

        Ok(HandoffReceipt {
            handoff_id: info.handoff_id.clone(),
            path,
            archive_path,
        })
    }

    pub async fn read(
        &self,
        campaign_id: &str,
        selector: &HandoffSelector,
    ) -> Result<HandoffDocument, RelayError> {
        ensure_safe_campaign_id(campaign_id)?;
        let path = match selector {
            HandoffSelector::Id(handoff_id) => self
                .archive_files(campaign_id)
                .await?
                .into_iter()
                .rev()
                .find(|(_, id, _)| id == handoff_id)
                .map(|(_, _, path)| path)
                .ok_or_else(|| {
                    RelayError::NotFound(format!(
                        "Handoff {} not found in campaign {}",
                        handoff_id, campaign_id
                    ))
                })?,
            HandoffSelector::Stages { from, to } => {
                let path = self.canonical_path(campaign_id, *from, *to);
                if !fs::try_exists(&path).await.unwrap_or(false) {
                    return Err(RelayError::NotFound(format!(
                        "No {} -> {} handoff in campaign {}",
                        from, to, campaign_id
                    )));
                }
                path
            }
        };
        read_document(&path).await
    }

    /// Every document of the campaign in creation order.
    pub async fn list(&self, campaign_id: &str) -> Result<Vec<HandoffDocument>, RelayError> {
        ensure_safe_campaign_id(campaign_id)?;
        let mut docs = Vec::new();
        for (_, _, path) in self.archive_files(campaign_id).await? {
            match read_document(&path).await {
                Ok(doc) => docs.push(doc),
                Err(e) => tracing::warn!("[HandoffStore] Skipping {}: {}", path.display(), e),
            }
        }
        Ok(docs)
    }

    /// The most recently written document, if any.
    pub async fn latest(&self, campaign_id: &str) -> Result<Option<HandoffDocument>, RelayError> {
        ensure_safe_campaign_id(campaign_id)?;
        match self.archive_files(campaign_id).await?.pop() {
            Some((_, _, path)) => Ok(Some(read_document(&path).await?)),
            None => Ok(None),
        }
    }

    /// Archive entries as (seq, handoff_id, path), ordered by seq.
    async fn archive_files(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<(u64, String, PathBuf)>, RelayError> {
        let dir = self.archive_dir(campaign_id);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        let mut read_dir = fs::read_dir(&dir).await?;
        while let Some(item) = read_dir.next_entry().await? {
            let name = item.file_name().to_string_lossy().to_string();
            if let Some((seq, id)) = parse_archive_name(&name) {
                files.push((seq, id, item.path()));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }
}

fn ensure_safe_campaign_id(campaign_id: &str) -> Result<(), RelayError> {
    if is_safe_id(campaign_id) {
        Ok(())
    } else {
        Err(RelayError::validation(
            "campaign_id",
            "may only contain letters, digits, '-' and '_'",
        ))
    }
}

/// `0007-<handoff_id>.json` → (7, handoff_id)
fn parse_archive_name(name: &str) -> Option<(u64, String)> {
    let stem = name.strip_suffix(".json")?;
    let (seq, id) = stem.split_once('-')?;
    let seq = seq.parse().ok()?;
    if id.is_empty() {
        return None;
    }
    Some((seq, id.to_string()))
}

async fn read_document(path: &Path) -> Result<HandoffDocument, RelayError> {
    let bytes = fs::read(path).await?;
    let value: Value = serde_json::from_slice(&bytes)?;
    parse_document(value)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RelayError> {
    let dir = path
        .parent()
        .ok_or_else(|| RelayError::Internal(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(dir).await?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

    let mut file = fs::File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

//! LogBuffer — bounded in-memory ring of structured log lines.
//!
//! Storage path: `<data_root>/logs/agent-{datetime}.log` (JSON lines)
//!
//! - Fixed capacity, oldest entry evicted first
//! - Entries not yet flushed are tracked separately so `clear` never loses them
//! - Every recorded entry is mirrored to `tracing`

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tokio::io::AsyncWriteExt;

use crate::error::RelayError;

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_EXPORT_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub const ALL: [LogLevel; 4] = [Self::Debug, Self::Info, Self::Warn, Self::Error];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LogEntry {
    /// Single-line plain text rendering used by text export.
    pub fn to_text(&self) -> String {
        let mut line = format!(
            "{} [{}] {}",
            self.timestamp.to_rfc3339(),
            self.level.as_str().to_uppercase(),
            self.message
        );
        if let Some(tool) = &self.tool {
            line.push_str(&format!(" tool={}", tool));
        }
        if let Some(error) = &self.error {
            line.push_str(&format!(" error={}", error));
        }
        line
    }
}

/// Optional context attached to a log line.
#[derive(Debug, Clone, Default)]
pub struct LogContext {
    pub tool: Option<String>,
    pub error: Option<String>,
}

impl LogContext {
    pub fn tool(tool: impl Into<String>) -> Self {
        Self {
            tool: Some(tool.into()),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Filters for the live buffer. `level: None` means all levels.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub level: Option<LogLevel>,
    pub limit: Option<usize>,
    pub since: Option<DateTime<Utc>>,
    pub tool: Option<String>,
}

impl LogQuery {
    fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(level) = self.level {
            if entry.level != level {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(tool) = &self.tool {
            if entry.tool.as_deref() != Some(tool.as_str()) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Text,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" | "txt" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Render entries in the requested export format.
pub fn render_entries(entries: &[LogEntry], format: ExportFormat) -> Result<String, RelayError> {
    match format {
        ExportFormat::Json => Ok(serde_json::to_string_pretty(entries)?),
        ExportFormat::Text => Ok(entries
            .iter()
            .map(LogEntry::to_text)
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogSummary {
    pub total: usize,
    pub by_level: BTreeMap<LogLevel, usize>,
    pub min_level: LogLevel,
    pub unflushed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<DateTime<Utc>>,
}

struct Inner {
    entries: VecDeque<LogEntry>,
    unflushed: VecDeque<LogEntry>,
    min_level: LogLevel,
    next_seq: u64,
}

pub struct LogBuffer {
    inner: Mutex<Inner>,
    /// Held across the disk side of `flush` and `export`.
    io: tokio::sync::Mutex<()>,
    capacity: usize,
    export_limit: usize,
    log_dir: Option<PathBuf>,
}

impl LogBuffer {
    /// Buffer with no durable storage. `flush` keeps entries pending.
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, DEFAULT_EXPORT_LIMIT, None)
    }

    /// Buffer flushing to `<log_dir>/agent-{datetime}.log`.
    pub fn with_log_dir(capacity: usize, export_limit: usize, log_dir: impl AsRef<Path>) -> Self {
        Self::build(capacity, export_limit, Some(log_dir.as_ref().to_path_buf()))
    }

    fn build(capacity: usize, export_limit: usize, log_dir: Option<PathBuf>) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity),
                unflushed: VecDeque::new(),
                min_level: LogLevel::Info,
                next_seq: 1,
            }),
            io: tokio::sync::Mutex::new(()),
            capacity,
            export_limit: export_limit.max(1),
            log_dir,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    /// Append an entry if `level` passes the current minimum.
    ///
    /// Returns the entry's sequence number, or `None` if it was filtered.
    pub fn log(&self, level: LogLevel, message: impl Into<String>, ctx: LogContext) -> Option<u64> {
        let entry = {
            let mut inner = self.lock();
            if level < inner.min_level {
                return None;
            }
            let entry = LogEntry {
                seq: inner.next_seq,
                level,
                message: message.into(),
                timestamp: Utc::now(),
                tool: ctx.tool,
                error: ctx.error,
            };
            inner.next_seq += 1;

            if inner.entries.len() == self.capacity {
                inner.entries.pop_front();
            }
            inner.entries.push_back(entry.clone());

            if inner.unflushed.len() == self.export_limit {
                inner.unflushed.pop_front();
            }
            inner.unflushed.push_back(entry.clone());
            entry
        };

        mirror_to_tracing(&entry);
        Some(entry.seq)
    }

    pub fn debug(&self, message: impl Into<String>, ctx: LogContext) -> Option<u64> {
        self.log(LogLevel::Debug, message, ctx)
    }

    pub fn info(&self, message: impl Into<String>, ctx: LogContext) -> Option<u64> {
        self.log(LogLevel::Info, message, ctx)
    }

    pub fn warn(&self, message: impl Into<String>, ctx: LogContext) -> Option<u64> {
        self.log(LogLevel::Warn, message, ctx)
    }

    pub fn error(&self, message: impl Into<String>, ctx: LogContext) -> Option<u64> {
        self.log(LogLevel::Error, message, ctx)
    }

    /// Matching live entries, newest first. The limit is clamped to capacity.
    pub fn query(&self, query: &LogQuery) -> Vec<LogEntry> {
        let limit = query.limit.unwrap_or(self.capacity).min(self.capacity);
        let inner = self.lock();
        inner
            .entries
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn level(&self) -> LogLevel {
        self.lock().min_level
    }

    /// Minimum level for subsequent `log` calls. Existing entries are kept.
    pub fn set_level(&self, level: LogLevel) {
        let previous = {
            let mut inner = self.lock();
            std::mem::replace(&mut inner.min_level, level)
        };
        tracing::info!("[LogBuffer] Level changed: {} -> {}", previous, level);
    }

    /// Empty the live buffer. Pending entries still reach disk on the next flush.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        removed
    }

    pub fn summary(&self) -> LogSummary {
        let inner = self.lock();
        let mut by_level: BTreeMap<LogLevel, usize> =
            LogLevel::ALL.iter().map(|l| (*l, 0)).collect();
        for entry in &inner.entries {
            *by_level.entry(entry.level).or_insert(0) += 1;
        }
        LogSummary {
            total: inner.entries.len(),
            by_level,
            min_level: inner.min_level,
            unflushed: inner.unflushed.len(),
            oldest: inner.entries.front().map(|e| e.timestamp),
            newest: inner.entries.back().map(|e| e.timestamp),
        }
    }

    /// Write pending entries to a new JSON-lines file and mark them flushed.
    ///
    /// Returns the number of entries written. Without a log directory this
    /// is a no-op and entries stay pending.
    pub async fn flush(&self) -> Result<usize, RelayError> {
        let Some(dir) = &self.log_dir else {
            return Ok(0);
        };

        let _io = self.io.lock().await;
        let pending: Vec<LogEntry> = {
            let mut inner = self.lock();
            inner.unflushed.drain(..).collect()
        };
        if pending.is_empty() {
            return Ok(0);
        }

        match write_log_file(dir, &pending).await {
            Ok(path) => {
                tracing::debug!(
                    "[LogBuffer] Flushed {} entries to {}",
                    pending.len(),
                    path.display()
                );
                Ok(pending.len())
            }
            Err(e) => {
                // Put entries back ahead of anything logged meanwhile.
                let mut inner = self.lock();
                let newer: Vec<LogEntry> = inner.unflushed.drain(..).collect();
                inner.unflushed.extend(pending);
                inner.unflushed.extend(newer);
                while inner.unflushed.len() > self.export_limit {
                    inner.unflushed.pop_front();
                }
                Err(e)
            }
        }
    }

    /// Up to `export_limit` entries from disk plus pending ones, oldest first.
    pub async fn export(&self) -> Result<Vec<LogEntry>, RelayError> {
        // An entry is either on disk or pending, never neither.
        let _io = self.io.lock().await;
        let mut entries = match &self.log_dir {
            Some(dir) => read_log_files(dir).await?,
            None => Vec::new(),
        };
        entries.extend(self.lock().unflushed.iter().cloned());
        entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));

        let skip = entries.len().saturating_sub(self.export_limit);
        Ok(entries.into_iter().skip(skip).collect())
    }
}

fn mirror_to_tracing(entry: &LogEntry) {
    let tool = entry.tool.as_deref().unwrap_or("-");
    match (entry.level, &entry.error) {
        (LogLevel::Debug, _) => tracing::debug!(tool = %tool, "{}", entry.message),
        (LogLevel::Info, _) => tracing::info!(tool = %tool, "{}", entry.message),
        (LogLevel::Warn, None) => tracing::warn!(tool = %tool, "{}", entry.message),
        (LogLevel::Warn, Some(err)) => tracing::warn!(tool = %tool, error = %err, "{}", entry.message),
        (LogLevel::Error, None) => tracing::error!(tool = %tool, "{}", entry.message),
        (LogLevel::Error, Some(err)) => tracing::error!(tool = %tool, error = %err, "{}", entry.message),
    }
}

async fn write_log_file(dir: &Path, entries: &[LogEntry]) -> Result<PathBuf, RelayError> {
    tokio::fs::create_dir_all(dir).await?;
    let name = format!("agent-{}.log", Utc::now().format("%Y%m%d-%H%M%S"));
    let path = dir.join(name);

    let mut body = String::new();
    for entry in entries {
        body.push_str(&serde_json::to_string(entry)?);
        body.push('\n');
    }

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    file.write_all(body.as_bytes()).await?;
    file.flush().await?;
    Ok(path)
}

async fn read_log_files(dir: &Path) -> Result<Vec<LogEntry>, RelayError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(item) = read_dir.next_entry().await? {
        let path = item.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("agent-") && n.ends_with(".log"))
            .unwrap_or(false);
        if is_log {
            files.push(path);
        }
    }
    files.sort();

    let mut entries = Vec::new();
    for file in files {
        let content = tokio::fs::read_to_string(&file).await?;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(
                    "[LogBuffer] Skipping unreadable line in {}: {}",
                    file.display(),
                    e
                ),
            }
        }
    }
    Ok(entries)
}

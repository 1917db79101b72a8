use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::gate::Outcome;
use crate::hash::format_hash;

const AUDIT_FILE: &str = "access.log.jsonl";

/// One line of the access log. Only the length and digest of the input are
/// kept, never the bytes themselves.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp_ms: u64,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl AuditRecord {
    pub fn new(outcome: Outcome, input_len: Option<usize>, hash: Option<u32>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        Self {
            timestamp_ms,
            outcome: outcome.label(),
            input_len,
            hash: hash.map(format_hash),
        }
    }
}

/// Append-only JSONL log of access decisions.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub async fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("failed to create audit log directory {}", dir.display()))?;
        Ok(Self {
            path: dir.join(AUDIT_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record).context("failed to serialize audit record")?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("failed to open audit log {}", self.path.display()))?;
        file.write_all(&line)
            .await
            .with_context(|| format!("failed to append to audit log {}", self.path.display()))?;
        file.flush().await.context("failed to flush audit log")?;
        Ok(())
    }
}

//! Processed-id ledger: the persistent set of mailbox ids already relayed.
//!
//! Backed by a newline-delimited, append-only file that is read fully into
//! memory at startup. Ids are never removed, so a relayed email is never
//! delivered twice, even across restarts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::LedgerError;

/// Append-only set of processed message ids.
#[derive(Debug)]
pub struct ProcessedLedger {
    path: PathBuf,
    seen: HashSet<String>,
}

impl ProcessedLedger {
    /// Load the ledger from `path`. A missing or empty file is an empty set.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();

        let seen: HashSet<String> = match fs::read_to_string(&path).await {
            Ok(contents) => contents
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(io_error(&path, e)),
        };

        info!(path = %path.display(), count = seen.len(), "Loaded processed email ids");
        Ok(Self { path, seen })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Record `id` as processed and append it to the backing file.
    ///
    /// Returns `Ok(false)` if the id was already present. The id is kept
    /// in memory even when the append fails, so it is not re-delivered
    /// while this process lives.
    pub async fn mark_seen(&mut self, id: &str) -> Result<bool, LedgerError> {
        if id.is_empty() || id.contains(['\n', '\r']) {
            return Err(LedgerError::InvalidId(id.to_string()));
        }
        if !self.seen.insert(id.to_string()) {
            return Ok(false);
        }

        self.append(id).await?;
        debug!(id, "Marked email as processed");
        Ok(true)
    }

    async fn append(&self, id: &str) -> Result<(), LedgerError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(&self.path, e))?;
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;

        // One write per line keeps each record intact under append.
        file.write_all(format!("{id}\n").as_bytes())
            .await
            .map_err(|e| io_error(&self.path, e))?;
        file.flush().await.map_err(|e| io_error(&self.path, e))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

fn io_error(path: &Path, source: std::io::Error) -> LedgerError {
    LedgerError::Io {
        path: path.display().to_string(),
        source,
    }
}

//! Durable failure ledger for quarantining failed jobs.
//!
//! The ledger is a newline-delimited text file of job keys, one per failed
//! conversion. The dispatcher reads and rotates it at run start; the failure
//! collector is its only writer during a run. These two access windows never
//! overlap in time, so no file locking is needed.

use chrono::Utc;
use snafu::prelude::*;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::error::{AppendLedgerSnafu, LedgerError, ReadLedgerSnafu, RotateLedgerSnafu};

/// File-backed set of job keys that failed in a prior run.
#[derive(Debug, Clone)]
pub struct FailureLedger {
    path: PathBuf,
}

impl FailureLedger {
    /// Create a ledger handle for the given file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the live ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a ledger file currently exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the ledger into a set of job keys.
    ///
    /// Blank lines are ignored; keys are trimmed of surrounding whitespace.
    pub async fn load(&self) -> Result<HashSet<String>, LedgerError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .context(ReadLedgerSnafu { path: &self.path })?;

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Archive the live ledger so a new run starts clean.
    ///
    /// The file is renamed to a timestamped sibling (rename is atomic on the
    /// same filesystem), so the previous run's record is preserved and two
    /// runs' failures never mix in one file. Returns the archive path.
    pub async fn rotate(&self) -> Result<PathBuf, LedgerError> {
        let archive = self.archive_path();
        tokio::fs::rename(&self.path, &archive)
            .await
            .context(RotateLedgerSnafu {
                from: &self.path,
                to: &archive,
            })?;
        Ok(archive)
    }

    /// Append one job key as a single line.
    ///
    /// Opens, writes, and flushes per record so every recorded failure is
    /// durable immediately.
    pub async fn append(&self, key: &str) -> Result<(), LedgerError> {
        debug_assert!(!key.contains('\n'), "job keys must not contain newlines");

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context(AppendLedgerSnafu { path: &self.path })?;

        file.write_all(format!("{key}\n").as_bytes())
            .await
            .context(AppendLedgerSnafu { path: &self.path })?;
        file.flush()
            .await
            .context(AppendLedgerSnafu { path: &self.path })
    }

    /// Timestamped sibling path used by [`rotate`](Self::rotate).
    fn archive_path(&self) -> PathBuf {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("fail_list");
        let name = match self.path.extension().and_then(|s| s.to_str()) {
            Some(ext) => format!("{stem}.{timestamp}.{ext}"),
            None => format!("{stem}.{timestamp}"),
        };
        self.path.with_file_name(name)
    }
}

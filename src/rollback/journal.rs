//! `JournalEntry` (spec §3, §4.4) and the on-disk journal directory layout
//! (`.sb_journal/pending/`, `.sb_journal/committed/`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::ChangeRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JournalStatus {
    Pending,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub session_id: String,
    pub created_at: i64,
    pub workspace_root: PathBuf,
    /// Inverse change sequence being applied (spec §4.4 step 2).
    pub changes: Vec<ChangeRecord>,
    /// `(original, backup)` absolute-path pairs already renamed aside.
    pub backups: Vec<(PathBuf, PathBuf)>,
    pub status: JournalStatus,
}

impl JournalEntry {
    pub fn new(session_id: impl Into<String>, workspace_root: PathBuf, changes: Vec<ChangeRecord>, created_at: i64) -> Self {
        Self {
            session_id: session_id.into(),
            created_at,
            workspace_root,
            changes,
            backups: Vec::new(),
            status: JournalStatus::Pending,
        }
    }
}

pub struct JournalDirs {
    pub pending: PathBuf,
    pub committed: PathBuf,
}

impl JournalDirs {
    pub fn under(data_dir: &Path) -> Self {
        let base = data_dir.join(".sb_journal");
        Self {
            pending: base.join("pending"),
            committed: base.join("committed"),
        }
    }

    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.pending)?;
        std::fs::create_dir_all(&self.committed)?;
        Ok(())
    }

    pub fn pending_path(&self, session_id: &str) -> PathBuf {
        self.pending.join(format!("{session_id}.json"))
    }

    pub fn committed_path(&self, session_id: &str) -> PathBuf {
        self.committed.join(format!("{session_id}.json"))
    }
}

pub fn write_journal(path: &Path, entry: &JournalEntry) -> std::io::Result<()> {
    let bytes = serde_json::to_vec_pretty(entry)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn read_journal(path: &Path) -> std::io::Result<JournalEntry> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

//! Wire-level data model: `ChangeOp`, `ChangeRecord`, `SessionManifest`.
//!
//! These types cross the BlobStore / catalog / rollback boundary, so they
//! stay plain data — no behavior beyond small accessors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const SESSION_SCHEMA: &str = "session.v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Created,
    Modified,
    Deleted,
    Renamed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EolKind {
    Lf,
    Crlf,
    Cr,
    Mixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    Filewatch,
    PreCommit,
    Manual,
    IdleFinalize,
    Blur,
    Task,
    MaxDuration,
}

/// One file event within a session. `digestBefore`/`digestAfter` are left
/// empty until `SessionManager::finalize` runs deferred digesting (§4.3.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub path: String,
    pub op: ChangeOp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_before: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest_after: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_before: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime_before: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime_after: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode_before: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode_after: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eol_before: Option<EolKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eol_after: Option<EolKind>,
}

impl ChangeRecord {
    pub fn new(path: impl Into<String>, op: ChangeOp) -> Self {
        Self {
            path: path.into(),
            op,
            from_path: None,
            digest_before: None,
            digest_after: None,
            size_before: None,
            size_after: None,
            mtime_before: None,
            mtime_after: None,
            mode_before: None,
            mode_after: None,
            eol_before: None,
            eol_after: None,
        }
    }

    /// Fingerprint contribution for this change, per §4.3.2:
    /// `path || ":" || op || ":" || (digestBefore or "") || ":" || (digestAfter or "")`.
    pub fn fingerprint_line(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.path,
            op_token(self.op),
            self.digest_before.as_deref().unwrap_or(""),
            self.digest_after.as_deref().unwrap_or(""),
        )
    }
}

fn op_token(op: ChangeOp) -> &'static str {
    match op {
        ChangeOp::Created => "created",
        ChangeOp::Modified => "modified",
        ChangeOp::Deleted => "deleted",
        ChangeOp::Renamed => "renamed",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub schema: String,
    pub session_id: String,
    pub workspace_key: String,
    pub started_at: i64,
    pub ended_at: i64,
    pub triggers: BTreeSet<Trigger>,
    pub name: String,
    pub tags: Vec<String>,
    pub changes: Vec<ChangeRecord>,
}

impl SessionManifest {
    pub fn change_count(&self) -> usize {
        self.changes.len()
    }
}

/// Lightweight listing projection over a manifest, for `SessionManager::list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: i64,
    pub ended_at: i64,
    pub name: String,
    pub tags: Vec<String>,
    pub change_count: usize,
}

impl From<&SessionManifest> for SessionSummary {
    fn from(m: &SessionManifest) -> Self {
        Self {
            session_id: m.session_id.clone(),
            started_at: m.started_at,
            ended_at: m.ended_at,
            name: m.name.clone(),
            tags: m.tags.clone(),
            change_count: m.change_count(),
        }
    }
}

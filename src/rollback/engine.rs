//! Rollback engine (spec §4.4): inverts a session's changes and applies
//! them with a crash-safe staging + per-file atomic swap protocol. The
//! `.sb_journal/` directory is the authoritative crash-recovery state —
//! `RecoverySweeper` reads it directly rather than through `Catalog`, so
//! recovery never depends on the catalog itself being consistent.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tracing::{info_span, warn};

use crate::blob::BlobStore;
use crate::core::{ChangeOp, ChangeRecord, Result, SessionManifest};
use crate::rollback::journal::{self, JournalDirs, JournalEntry, JournalStatus};
use crate::workspace::{backup_path, to_absolute};

#[derive(Debug, Clone, Default)]
pub struct RollbackOptions {
    pub dry_run: bool,
    pub skip_verification: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RollbackResult {
    pub success: bool,
    pub files_reverted: Vec<String>,
    pub files_skipped: Vec<(String, String)>,
    pub errors: Vec<String>,
    pub journal_path: Option<PathBuf>,
}

enum PlannedOp {
    Stage { path: String, digest: String },
    Delete { path: String },
}

pub struct RollbackEngine<'a> {
    blob_store: &'a BlobStore,
    data_dir: PathBuf,
}

impl<'a> RollbackEngine<'a> {
    pub fn new(blob_store: &'a BlobStore, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            blob_store,
            data_dir: data_dir.into(),
        }
    }

    pub fn rollback(
        &self,
        manifest: &SessionManifest,
        workspace_root: &Path,
        options: RollbackOptions,
    ) -> Result<RollbackResult> {
        let _span = info_span!("rollback", session_id = %manifest.session_id).entered();

        let dirs = JournalDirs::under(&self.data_dir);
        dirs.ensure()?;

        let inverse = invert_changes(&manifest.changes);
        let mut entry = JournalEntry::new(
            manifest.session_id.clone(),
            workspace_root.to_path_buf(),
            inverse.clone(),
            now_ms(),
        );
        let pending_path = dirs.pending_path(&manifest.session_id);
        journal::write_journal(&pending_path, &entry)?;

        let staging = staging_dir(workspace_root, &manifest.session_id);
        fs::create_dir_all(&staging)?;

        let ops = planned_ops(&inverse);

        let mut result = RollbackResult {
            journal_path: Some(pending_path.clone()),
            ..Default::default()
        };

        // Staging + validation.
        for op in &ops {
            if let PlannedOp::Stage { path, digest } = op {
                match self.blob_store.get(digest) {
                    Ok(bytes) => {
                        let dest = staging.join(path);
                        if let Some(parent) = dest.parent() {
                            fs::create_dir_all(parent)?;
                        }
                        fs::write(&dest, &bytes)?;

                        if !options.skip_verification {
                            let actual = hex_sha256(&bytes);
                            if &actual != digest {
                                entry.status = JournalStatus::RolledBack;
                                journal::write_journal(&pending_path, &entry)?;
                                let _ = fs::remove_dir_all(&staging);
                                return Ok(RollbackResult {
                                    success: false,
                                    errors: vec![format!(
                                        "integrity check failed for {path}: expected {digest}, got {actual}"
                                    )],
                                    journal_path: Some(pending_path),
                                    ..Default::default()
                                });
                            }
                        }
                    }
                    Err(e) => {
                        entry.status = JournalStatus::RolledBack;
                        journal::write_journal(&pending_path, &entry)?;
                        let _ = fs::remove_dir_all(&staging);
                        return Ok(RollbackResult {
                            success: false,
                            errors: vec![format!("failed to fetch blob for {path}: {e}")],
                            journal_path: Some(pending_path),
                            ..Default::default()
                        });
                    }
                }
            }
        }

        if options.dry_run {
            for op in &ops {
                match op {
                    PlannedOp::Stage { path, .. } => result.files_reverted.push(path.clone()),
                    PlannedOp::Delete { path } => result.files_reverted.push(path.clone()),
                }
            }
            result.success = true;
            entry.status = JournalStatus::RolledBack;
            journal::write_journal(&pending_path, &entry)?;
            let _ = fs::remove_file(&pending_path);
            let _ = fs::remove_dir_all(&staging);
            return Ok(result);
        }

        // Swap phase.
        for op in &ops {
            match op {
                PlannedOp::Stage { path, .. } => {
                    let target = to_absolute(workspace_root, path);
                    if let Some(parent) = target.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    let backup = backup_path(workspace_root, path, &manifest.session_id);

                    let had_original = target.exists();
                    if had_original {
                        if let Err(e) = rename_or_copy(&target, &backup) {
                            result.files_skipped.push((path.clone(), e.to_string()));
                            continue;
                        }
                        entry.backups.push((target.clone(), backup.clone()));
                        journal::write_journal(&pending_path, &entry)?;
                    }

                    let staged = staging.join(path);
                    match rename_or_copy(&staged, &target) {
                        Ok(()) => result.files_reverted.push(path.clone()),
                        Err(e) => {
                            if had_original {
                                let _ = rename_or_copy(&backup, &target);
                            }
                            result.files_skipped.push((path.clone(), e.to_string()));
                        }
                    }
                }
                PlannedOp::Delete { path } => {
                    let target = to_absolute(workspace_root, path);
                    if !target.exists() {
                        result.files_reverted.push(path.clone());
                        continue;
                    }
                    let backup = backup_path(workspace_root, path, &manifest.session_id);
                    match rename_or_copy(&target, &backup) {
                        Ok(()) => {
                            entry.backups.push((target.clone(), backup.clone()));
                            journal::write_journal(&pending_path, &entry)?;
                            result.files_reverted.push(path.clone());
                        }
                        Err(e) => result.files_skipped.push((path.clone(), e.to_string())),
                    }
                }
            }
        }

        // Commit phase.
        let committed_path = dirs.committed_path(&manifest.session_id);
        entry.status = JournalStatus::Committed;
        journal::write_journal(&pending_path, &entry)?;
        if let Err(e) = fs::rename(&pending_path, &committed_path) {
            warn!(error = %e, "failed to move journal to committed/, leaving it pending for recovery");
        } else {
            result.journal_path = Some(committed_path);
        }

        for (_original, backup) in &entry.backups {
            let _ = fs::remove_file(backup);
        }
        let _ = fs::remove_dir_all(&staging);

        result.success = result.files_skipped.is_empty();
        Ok(result)
    }
}

fn invert_changes(changes: &[ChangeRecord]) -> Vec<ChangeRecord> {
    changes.iter().rev().map(invert_one).collect()
}

fn invert_one(c: &ChangeRecord) -> ChangeRecord {
    match c.op {
        ChangeOp::Created => ChangeRecord {
            path: c.path.clone(),
            op: ChangeOp::Deleted,
            from_path: None,
            digest_before: c.digest_after.clone(),
            digest_after: None,
            size_before: c.size_after,
            size_after: None,
            mtime_before: c.mtime_after,
            mtime_after: None,
            mode_before: c.mode_after,
            mode_after: None,
            eol_before: c.eol_after,
            eol_after: None,
        },
        ChangeOp::Modified => ChangeRecord {
            path: c.path.clone(),
            op: ChangeOp::Modified,
            from_path: None,
            digest_before: c.digest_after.clone(),
            digest_after: c.digest_before.clone(),
            size_before: c.size_after,
            size_after: c.size_before,
            mtime_before: c.mtime_after,
            mtime_after: c.mtime_before,
            mode_before: c.mode_after,
            mode_after: c.mode_before,
            eol_before: c.eol_after,
            eol_after: c.eol_before,
        },
        ChangeOp::Deleted => ChangeRecord {
            path: c.path.clone(),
            op: ChangeOp::Created,
            from_path: None,
            digest_before: None,
            digest_after: c.digest_before.clone(),
            size_before: None,
            size_after: c.size_before,
            mtime_before: None,
            mtime_after: c.mtime_before,
            mode_before: None,
            mode_after: c.mode_before,
            eol_before: None,
            eol_after: c.eol_before,
        },
        ChangeOp::Renamed => {
            let mut rec = ChangeRecord::new(
                c.from_path.clone().unwrap_or_else(|| c.path.clone()),
                ChangeOp::Renamed,
            );
            rec.from_path = Some(c.path.clone());
            rec.digest_before = c.digest_after.clone();
            rec.digest_after = c.digest_before.clone();
            rec.size_before = c.size_after;
            rec.size_after = c.size_before;
            rec.mtime_before = c.mtime_after;
            rec.mtime_after = c.mtime_before;
            rec.mode_before = c.mode_after;
            rec.mode_after = c.mode_before;
            rec.eol_before = c.eol_after;
            rec.eol_after = c.eol_before;
            rec
        }
    }
}

fn planned_ops(inverse: &[ChangeRecord]) -> Vec<PlannedOp> {
    let mut ops = Vec::with_capacity(inverse.len());
    for c in inverse {
        match c.op {
            ChangeOp::Deleted => ops.push(PlannedOp::Delete { path: c.path.clone() }),
            ChangeOp::Created | ChangeOp::Modified => {
                if let Some(digest) = &c.digest_after {
                    ops.push(PlannedOp::Stage {
                        path: c.path.clone(),
                        digest: digest.clone(),
                    });
                }
            }
            ChangeOp::Renamed => {
                if let Some(digest) = &c.digest_after {
                    ops.push(PlannedOp::Stage {
                        path: c.path.clone(),
                        digest: digest.clone(),
                    });
                }
                if let Some(from) = &c.from_path {
                    ops.push(PlannedOp::Delete { path: from.clone() });
                }
            }
        }
    }
    ops
}

fn staging_dir(workspace_root: &Path, session_id: &str) -> PathBuf {
    match workspace_root.parent() {
        Some(parent) if parent != Path::new("") => {
            parent.join(format!(".sessionvault-staging-{session_id}"))
        }
        _ => workspace_root.join(format!(".sessionvault-staging-{session_id}")),
    }
}

/// `rename`, falling back to copy+remove on `EXDEV` (cross-device rename).
fn rename_or_copy(from: &Path, to: &Path) -> std::io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            fs::copy(from, to)?;
            fs::remove_file(from)?;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn libc_exdev() -> i32 {
    18 // EXDEV on Linux/macOS
}

#[cfg(not(unix))]
fn libc_exdev() -> i32 {
    -1
}

fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

//! Recovery sweeper (spec §4.5): runs at startup and completes or undoes
//! whatever a crashed rollback left behind, then prunes old committed
//! journals. Operates directly on `.sb_journal/` — it must work even if
//! the catalog itself failed to open.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::core::Result;
use crate::rollback::journal::{self, JournalDirs, JournalStatus};

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub resumed_commits: Vec<String>,
    pub undone_rollbacks: Vec<String>,
    pub discarded_empty: Vec<String>,
    pub pruned_committed: Vec<String>,
    pub orphans_removed: Vec<PathBuf>,
}

pub struct RecoverySweeper {
    dirs: JournalDirs,
    journal_retention_ms: u64,
}

impl RecoverySweeper {
    pub fn new(data_dir: impl Into<PathBuf>, journal_retention_ms: u64) -> Self {
        Self {
            dirs: JournalDirs::under(&data_dir.into()),
            journal_retention_ms,
        }
    }

    /// Scans `.sb_journal/pending/` and repairs each leftover entry, then
    /// prunes `.sb_journal/committed/` past the retention window.
    pub fn sweep(&self) -> Result<SweepReport> {
        self.dirs.ensure()?;
        let mut report = SweepReport::default();

        let mut entries: Vec<PathBuf> = fs::read_dir(&self.dirs.pending)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        entries.sort();

        for path in entries {
            let entry = match journal::read_journal(&path) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "dropping unreadable pending journal");
                    let _ = fs::remove_file(&path);
                    continue;
                }
            };

            match entry.status {
                JournalStatus::Committed => {
                    for (_original, backup) in &entry.backups {
                        let _ = fs::remove_file(backup);
                    }
                    let dest = self.dirs.committed_path(&entry.session_id);
                    if fs::rename(&path, &dest).is_err() {
                        let _ = fs::remove_file(&path);
                    }
                    info!(session_id = %entry.session_id, "resumed crash-interrupted commit");
                    report.resumed_commits.push(entry.session_id.clone());
                }
                JournalStatus::RolledBack => {
                    let _ = fs::remove_file(&path);
                    report.discarded_empty.push(entry.session_id.clone());
                }
                JournalStatus::Pending => {
                    let mut any_backup = false;
                    for (original, backup) in &entry.backups {
                        if backup.exists() {
                            any_backup = true;
                            if let Some(parent) = original.parent() {
                                let _ = fs::create_dir_all(parent);
                            }
                            if let Err(e) = fs::rename(backup, original) {
                                warn!(
                                    original = %original.display(),
                                    backup = %backup.display(),
                                    error = %e,
                                    "failed to restore backup during recovery"
                                );
                            }
                        }
                    }
                    let _ = fs::remove_file(&path);
                    if any_backup {
                        info!(session_id = %entry.session_id, "undid crash-interrupted rollback");
                        report.undone_rollbacks.push(entry.session_id.clone());
                    } else {
                        report.discarded_empty.push(entry.session_id.clone());
                    }
                }
            }
        }

        let now = now_ms();
        for entry in fs::read_dir(&self.dirs.committed)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Ok(journal_entry) = journal::read_journal(&path) else {
                continue;
            };
            if now - journal_entry.created_at >= self.journal_retention_ms as i64 {
                let _ = fs::remove_file(&path);
                report.pruned_committed.push(journal_entry.session_id);
            }
        }

        Ok(report)
    }

    /// Walks `workspace_root` once and deletes `*.bak-<sessionId>` files
    /// whose session has no journal (pending or committed) and is not the
    /// live session — spec §4.5's optional orphan cleanup. Run after
    /// `sweep()` so a crash-interrupted rollback has already been resolved
    /// one way or the other before this classifies anything as orphaned.
    pub fn sweep_orphans(
        &self,
        workspace_root: &Path,
        live_session_id: Option<&str>,
    ) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        self.walk_for_orphans(workspace_root, live_session_id, &mut removed)?;
        Ok(removed)
    }

    fn walk_for_orphans(
        &self,
        dir: &Path,
        live_session_id: Option<&str>,
        removed: &mut Vec<PathBuf>,
    ) -> Result<()> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Ok(());
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                self.walk_for_orphans(&path, live_session_id, removed)?;
                continue;
            }
            let Some(session_id) = backup_session_id(&path) else {
                continue;
            };
            if Some(session_id.as_str()) == live_session_id {
                continue;
            }
            let has_journal = self.dirs.pending_path(&session_id).exists()
                || self.dirs.committed_path(&session_id).exists();
            if !has_journal {
                if fs::remove_file(&path).is_ok() {
                    info!(path = %path.display(), "removed orphan backup file");
                    removed.push(path);
                }
            }
        }
        Ok(())
    }
}

/// Extracts the `<sessionId>` suffix from a `<name>.bak-<sessionId>` file
/// name, if the name matches that shape.
fn backup_session_id(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.rsplit_once(".bak-").map(|(_, id)| id.to_string())
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ChangeOp, ChangeRecord};
    use crate::rollback::journal::JournalEntry;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn undoes_partial_swap_on_crash() {
        let data_dir = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let dirs = JournalDirs::under(data_dir.path());
        dirs.ensure().unwrap();

        let original = workspace.path().join("a.txt");
        let backup = workspace.path().join("a.txt.bak-sess1");
        fs::write(&original, b"restored-content-already-swapped-in").unwrap();
        fs::write(&backup, b"pre-rollback-content").unwrap();

        let mut entry = JournalEntry::new(
            "sess1",
            workspace.path().to_path_buf(),
            vec![ChangeRecord::new("a.txt", ChangeOp::Modified)],
            0,
        );
        entry.backups.push((original.clone(), backup.clone()));
        journal::write_journal(&dirs.pending_path("sess1"), &entry).unwrap();

        let sweeper = RecoverySweeper::new(data_dir.path(), 1_000_000);
        let report = sweeper.sweep().unwrap();

        assert_eq!(report.undone_rollbacks, vec!["sess1".to_string()]);
        assert_eq!(fs::read(&original).unwrap(), b"pre-rollback-content");
        assert!(!backup.exists());
        assert!(!dirs.pending_path("sess1").exists());
    }

    #[test]
    fn discards_untouched_pending_journal() {
        let data_dir = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let dirs = JournalDirs::under(data_dir.path());
        dirs.ensure().unwrap();

        let entry = JournalEntry::new(
            "sess2",
            workspace.path().to_path_buf(),
            vec![ChangeRecord::new("a.txt", ChangeOp::Modified)],
            0,
        );
        journal::write_journal(&dirs.pending_path("sess2"), &entry).unwrap();

        let sweeper = RecoverySweeper::new(data_dir.path(), 1_000_000);
        let report = sweeper.sweep().unwrap();

        assert_eq!(report.discarded_empty, vec!["sess2".to_string()]);
        assert!(!dirs.pending_path("sess2").exists());
    }

    #[test]
    fn resumes_interrupted_commit() {
        let data_dir = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let dirs = JournalDirs::under(data_dir.path());
        dirs.ensure().unwrap();

        let mut entry = JournalEntry::new(
            "sess3",
            workspace.path().to_path_buf(),
            vec![ChangeRecord::new("a.txt", ChangeOp::Modified)],
            0,
        );
        entry.status = JournalStatus::Committed;
        journal::write_journal(&dirs.pending_path("sess3"), &entry).unwrap();

        let sweeper = RecoverySweeper::new(data_dir.path(), 1_000_000);
        let report = sweeper.sweep().unwrap();

        assert_eq!(report.resumed_commits, vec!["sess3".to_string()]);
        assert!(dirs.committed_path("sess3").exists());
        assert!(!dirs.pending_path("sess3").exists());
    }

    #[test]
    fn prunes_committed_journals_past_retention() {
        let data_dir = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let dirs = JournalDirs::under(data_dir.path());
        dirs.ensure().unwrap();

        let entry = JournalEntry::new(
            "sess4",
            workspace.path().to_path_buf(),
            vec![ChangeRecord::new("a.txt", ChangeOp::Modified)],
            0,
        );
        journal::write_journal(&dirs.committed_path("sess4"), &entry).unwrap();

        let sweeper = RecoverySweeper::new(data_dir.path(), 0);
        let report = sweeper.sweep().unwrap();

        assert_eq!(report.pruned_committed, vec!["sess4".to_string()]);
        assert!(!dirs.committed_path("sess4").exists());
    }

    #[test]
    fn orphan_backup_with_no_journal_is_removed() {
        let data_dir = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let dirs = JournalDirs::under(data_dir.path());
        dirs.ensure().unwrap();

        let orphan = workspace.path().join("a.txt.bak-gone");
        fs::write(&orphan, b"leftover").unwrap();

        let sweeper = RecoverySweeper::new(data_dir.path(), 1_000_000);
        let removed = sweeper.sweep_orphans(workspace.path(), None).unwrap();

        assert_eq!(removed, vec![orphan.clone()]);
        assert!(!orphan.exists());
    }

    #[test]
    fn backup_with_committed_journal_is_kept() {
        let data_dir = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let dirs = JournalDirs::under(data_dir.path());
        dirs.ensure().unwrap();

        let backup = workspace.path().join("a.txt.bak-sess5");
        fs::write(&backup, b"leftover").unwrap();
        let entry = JournalEntry::new(
            "sess5",
            workspace.path().to_path_buf(),
            vec![ChangeRecord::new("a.txt", ChangeOp::Modified)],
            0,
        );
        journal::write_journal(&dirs.committed_path("sess5"), &entry).unwrap();

        let sweeper = RecoverySweeper::new(data_dir.path(), 1_000_000);
        let removed = sweeper.sweep_orphans(workspace.path(), None).unwrap();

        assert!(removed.is_empty());
        assert!(backup.exists());
    }

    #[test]
    fn backup_matching_live_session_is_kept() {
        let data_dir = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        let dirs = JournalDirs::under(data_dir.path());
        dirs.ensure().unwrap();

        let backup = workspace.path().join("a.txt.bak-live1");
        fs::write(&backup, b"in flight").unwrap();

        let sweeper = RecoverySweeper::new(data_dir.path(), 1_000_000);
        let removed = sweeper.sweep_orphans(workspace.path(), Some("live1")).unwrap();

        assert!(removed.is_empty());
        assert!(backup.exists());
    }
}

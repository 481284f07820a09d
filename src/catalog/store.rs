//! `Catalog`: durable storage for sessions, journals, and the writer lock
//! (spec §4.2). Blob metadata is owned by `BlobStore` itself rather than
//! duplicated here — see DESIGN.md "blob metadata ownership" for why.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use crate::catalog::lock::{lock_path, WriterLock};
use crate::catalog::schema::{CatalogOp, CatalogTables};
use crate::catalog::snapshot::CatalogSnapshot;
use crate::catalog::wal::CatalogWal;
use crate::core::{Result, SessionManifest, SessionSummary};
use crate::rollback::journal::JournalEntry;

const CHECKPOINT_THRESHOLD: usize = 200;

pub struct Catalog {
    tables: RwLock<CatalogTables>,
    wal: CatalogWal,
    snapshot: CatalogSnapshot,
    writer_lock: WriterLock,
    ops_since_checkpoint: AtomicUsize,
}

impl Catalog {
    pub fn open(catalog_dir: impl Into<PathBuf>) -> Result<Self> {
        let catalog_dir = catalog_dir.into();
        std::fs::create_dir_all(&catalog_dir)?;

        let snapshot = CatalogSnapshot::new(catalog_dir.join("catalog.snapshot"));
        let wal = CatalogWal::open(catalog_dir.join("catalog.wal"))?;
        let writer_lock = WriterLock::new(lock_path(&catalog_dir), Duration::from_secs(5));

        let mut tables = snapshot.load()?.unwrap_or_default();
        let ops = wal.read_all()?;
        let op_count = ops.len();
        for op in ops {
            apply_op(&mut tables, op);
        }

        Ok(Self {
            tables: RwLock::new(tables),
            wal,
            snapshot,
            writer_lock,
            ops_since_checkpoint: AtomicUsize::new(op_count),
        })
    }

    fn write_op(&self, op: CatalogOp) -> Result<()> {
        let _guard = self.writer_lock.acquire()?;
        self.wal.append(&op)?;
        {
            let mut tables = self.tables.write()?;
            apply_op(&mut tables, op);
        }
        if self.ops_since_checkpoint.fetch_add(1, Ordering::SeqCst) + 1 >= CHECKPOINT_THRESHOLD {
            drop(_guard);
            self.checkpoint()?;
        }
        Ok(())
    }

    pub fn put_session(&self, manifest: SessionManifest) -> Result<()> {
        self.write_op(CatalogOp::PutSession(Box::new(manifest)))
    }

    pub fn delete_session(&self, session_id: &str) -> Result<()> {
        self.write_op(CatalogOp::DeleteSession(session_id.to_string()))
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionManifest>> {
        Ok(self.tables.read()?.sessions.get(session_id).cloned())
    }

    pub fn list_sessions(&self, workspace_key: &str, limit: usize) -> Result<Vec<SessionSummary>> {
        let tables = self.tables.read()?;
        let mut summaries: Vec<SessionSummary> = tables
            .sessions
            .values()
            .filter(|m| m.workspace_key == workspace_key)
            .map(SessionSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        summaries.truncate(limit);
        Ok(summaries)
    }

    pub fn put_journal(&self, entry: JournalEntry) -> Result<()> {
        self.write_op(CatalogOp::PutJournal(Box::new(entry)))
    }

    pub fn delete_journal(&self, session_id: &str) -> Result<()> {
        self.write_op(CatalogOp::DeleteJournal(session_id.to_string()))
    }

    pub fn get_journal(&self, session_id: &str) -> Result<Option<JournalEntry>> {
        Ok(self.tables.read()?.journals.get(session_id).cloned())
    }

    pub fn list_pending_journals(&self) -> Result<Vec<JournalEntry>> {
        Ok(self
            .tables
            .read()?
            .journals
            .values()
            .filter(|j| j.status == crate::rollback::journal::JournalStatus::Pending)
            .cloned()
            .collect())
    }

    pub fn checkpoint(&self) -> Result<()> {
        let _guard = self.writer_lock.acquire()?;
        let tables = self.tables.read()?;
        self.snapshot.save(&tables)?;
        drop(tables);
        self.wal.clear()?;
        self.ops_since_checkpoint.store(0, Ordering::SeqCst);
        Ok(())
    }

    pub fn wal_path(&self) -> &Path {
        self.wal.path()
    }
}

fn apply_op(tables: &mut CatalogTables, op: CatalogOp) {
    match op {
        CatalogOp::PutSession(manifest) => {
            tables.sessions.insert(manifest.session_id.clone(), *manifest);
        }
        CatalogOp::DeleteSession(id) => {
            tables.sessions.remove(&id);
        }
        CatalogOp::PutJournal(entry) => {
            tables.journals.insert(entry.session_id.clone(), *entry);
        }
        CatalogOp::DeleteJournal(id) => {
            tables.journals.remove(&id);
        }
    }
}

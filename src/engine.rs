//! Top-level facade wiring the four subsystems together: `BlobStore`,
//! `Catalog`, `SessionManager`, and the rollback engine/sweeper pair.
//! Mirrors the shape of the teacher's `facade::InMemoryDB`, generalized
//! from one shared store to one store per workspace root.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::blob::{BlobStats, BlobStore};
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::core::{EngineError, Result, SessionManifest, SessionSummary};
use crate::rollback::{RecoverySweeper, RollbackOptions, RollbackResult, SweepReport};
use crate::session::clock::{Clock, SystemClock};
use crate::session::SessionManager;

pub struct Engine {
    data_dir: PathBuf,
    config: EngineConfig,
    blob_store: Arc<BlobStore>,
    catalog: Arc<Catalog>,
    session: SessionManager,
}

impl Engine {
    pub fn open(
        data_dir: impl Into<PathBuf>,
        workspace_root: impl Into<PathBuf>,
        workspace_key: impl Into<String>,
        config: EngineConfig,
    ) -> Result<Self> {
        Self::open_with_clock(data_dir, workspace_root, workspace_key, config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        data_dir: impl Into<PathBuf>,
        workspace_root: impl Into<PathBuf>,
        workspace_key: impl Into<String>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let blob_store = Arc::new(BlobStore::open(&data_dir)?);
        let catalog = Arc::new(Catalog::open(data_dir.join("catalog"))?);
        let session = SessionManager::new(
            workspace_root,
            workspace_key,
            config.clone(),
            clock,
            catalog.clone(),
            blob_store.clone(),
        );

        info!(data_dir = %data_dir.display(), "engine opened");
        Ok(Self {
            data_dir,
            config,
            blob_store,
            catalog,
            session,
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn get_manifest(&self, session_id: &str) -> Result<SessionManifest> {
        self.catalog
            .get_session(session_id)?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    pub fn list_sessions(&self, workspace_key: &str, limit: usize) -> Result<Vec<SessionSummary>> {
        self.catalog.list_sessions(workspace_key, limit)
    }

    pub fn rollback(&self, session_id: &str, options: RollbackOptions) -> Result<RollbackResult> {
        self.session.rollback(session_id, &self.blob_store, &self.data_dir, options)
    }

    /// Editor/IDE loses focus (spec §4.3/§6 `onBlur`).
    pub fn on_blur(&self) -> Result<Option<SessionManifest>> {
        self.session.on_blur()
    }

    /// A VCS commit just happened (spec §4.3/§6 `onCommit`).
    pub fn on_commit(&self) -> Result<Option<SessionManifest>> {
        self.session.on_commit()
    }

    /// A VCS commit is about to happen (spec §4.3/§6 `onPreCommit`).
    pub fn on_pre_commit(&self) -> Result<Option<SessionManifest>> {
        self.session.on_pre_commit()
    }

    /// A collaborator marks its unit of work done (spec §4.3/§6
    /// `onTaskComplete`).
    pub fn on_task_complete(&self) -> Result<Option<SessionManifest>> {
        self.session.on_task_complete()
    }

    /// Explicit caller-requested finalize (spec §4.3/§6 `onManualFinalize`).
    pub fn on_manual_finalize(&self) -> Result<Option<SessionManifest>> {
        self.session.on_manual_finalize()
    }

    /// Deletes a persisted manifest, releasing every digest it referenced
    /// back toward GC eligibility (spec §4.6, P7).
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        self.session.delete_session(session_id)
    }

    /// Startup/on-demand crash recovery (spec §4.5): replays pending
    /// journals, prunes expired committed ones, then sweeps the workspace
    /// once for orphaned `*.bak-<sessionId>` files.
    pub fn recover(&self) -> Result<SweepReport> {
        let sweeper = RecoverySweeper::new(&self.data_dir, self.config.journal_retention_ms);
        let mut report = sweeper.sweep()?;
        report.orphans_removed = sweeper.sweep_orphans(
            self.session.workspace_root(),
            self.session.current_session_id().as_deref(),
        )?;
        Ok(report)
    }

    /// Reclaims zero-refcount blobs past the grace window (spec §4.6).
    pub fn gc(&self) -> Result<Vec<String>> {
        self.blob_store.gc(self.config.blob_grace_ms)
    }

    pub fn blob_stats(&self) -> Result<BlobStats> {
        self.blob_store.stats()
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.catalog.checkpoint()
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

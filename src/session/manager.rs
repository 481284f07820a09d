//! `SessionManager` (spec §4.3): the session buffer and lifecycle.
//! Tracks change events under a single active session, merges repeat
//! touches to the same path (I4), and finalizes into a persisted
//! `SessionManifest` on a boundary trigger.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::core::{ChangeOp, ChangeRecord, Result, SessionManifest, SessionSummary, Trigger, SESSION_SCHEMA};
use crate::rollback::{RollbackEngine, RollbackOptions, RollbackResult};
use crate::session::boundary::BoundaryDetector;
use crate::session::clock::Clock;
use crate::session::dedup::{session_fingerprint, Deduplicator};
use crate::session::digest::{self, ShadowMap};
use crate::session::summarizer;
use crate::workspace::normalize_relative;

struct SessionBuffer {
    session_id: String,
    triggers: BTreeSet<Trigger>,
    order: Vec<String>,
    changes: std::collections::HashMap<String, ChangeRecord>,
    shadows: ShadowMap,
    boundary: BoundaryDetector,
}

impl SessionBuffer {
    fn new(config: &EngineConfig, started_at: i64) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            triggers: BTreeSet::new(),
            order: Vec::new(),
            changes: std::collections::HashMap::new(),
            shadows: ShadowMap::new(),
            boundary: BoundaryDetector::new(config, started_at),
        }
    }

    fn record(&mut self, op: ChangeOp, path: String, from_path: Option<String>) {
        if !self.changes.contains_key(&path) {
            self.order.push(path.clone());
        }
        let merged = match self.changes.remove(&path) {
            Some(existing) => merge(existing, op, from_path),
            None => {
                let mut rec = ChangeRecord::new(path.clone(), op);
                rec.from_path = from_path;
                rec
            }
        };
        self.changes.insert(path, merged);
    }

    fn ordered_changes(&self) -> Vec<ChangeRecord> {
        self.order
            .iter()
            .filter_map(|p| self.changes.get(p).cloned())
            .collect()
    }
}

/// Collapses a repeat touch of the same path within one session (I4):
/// the buffer keeps a single record describing the net start→end state.
fn merge(existing: ChangeRecord, new_op: ChangeOp, new_from: Option<String>) -> ChangeRecord {
    use ChangeOp::*;
    let merged_op = match (existing.op, new_op) {
        (Created, Modified) => Created,
        (Created, Deleted) => Created, // net no-op; caller drops zero-length results
        (Modified, Modified) => Modified,
        (Modified, Deleted) => Deleted,
        (Deleted, Created) => Modified, // delete-then-recreate reads as an edit
        (Renamed, Modified) => Renamed,
        (_, latest) => latest,
    };
    let mut rec = existing;
    rec.op = merged_op;
    if new_from.is_some() {
        rec.from_path = new_from;
    }
    rec
}

pub struct SessionManager {
    workspace_root: std::path::PathBuf,
    workspace_key: String,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    catalog: Arc<Catalog>,
    blob_store: Arc<BlobStore>,
    dedup: Deduplicator,
    state: Mutex<Option<SessionBuffer>>,
}

impl SessionManager {
    pub fn new(
        workspace_root: impl Into<std::path::PathBuf>,
        workspace_key: impl Into<String>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
        catalog: Arc<Catalog>,
        blob_store: Arc<BlobStore>,
    ) -> Self {
        let dedup = Deduplicator::new(config.dedup_cache_size);
        Self {
            workspace_root: workspace_root.into(),
            workspace_key: workspace_key.into(),
            config,
            clock,
            catalog,
            blob_store,
            dedup,
            state: Mutex::new(None),
        }
    }

    fn is_ignored(&self, relative: &str) -> bool {
        self.config
            .ignore_patterns
            .iter()
            .any(|pattern| matches_ignore_pattern(pattern, relative))
    }

    /// Record one observed file-change event under the active session,
    /// starting a new session if none is active.
    #[instrument(skip(self, absolute_path, from_absolute))]
    pub fn track(
        &self,
        op: ChangeOp,
        absolute_path: &Path,
        from_absolute: Option<&Path>,
    ) -> Result<()> {
        let relative = normalize_relative(&self.workspace_root, absolute_path)?;
        if self.is_ignored(&relative) {
            return Ok(());
        }
        let from_relative = from_absolute
            .map(|p| normalize_relative(&self.workspace_root, p))
            .transpose()?;

        let now = self.clock.now_ms();
        let mut guard = self.state.lock().unwrap();
        let buffer = guard.get_or_insert_with(|| SessionBuffer::new(&self.config, now));
        buffer.boundary.record_activity(now);

        digest::capture_shadow(&mut buffer.shadows, &self.workspace_root, &relative);
        if let Some(from) = &from_relative {
            digest::capture_shadow(&mut buffer.shadows, &self.workspace_root, from);
        }
        buffer.record(op, relative, from_relative);
        Ok(())
    }

    /// Checks idle/max-duration boundaries against the current clock and
    /// finalizes the active session if one has been crossed.
    pub fn check_boundaries(&self) -> Result<Option<SessionManifest>> {
        let now = self.clock.now_ms();
        let trigger = {
            let guard = self.state.lock().unwrap();
            match guard.as_ref() {
                Some(buffer) if buffer.boundary.is_idle(now) => Some(Trigger::IdleFinalize),
                Some(buffer) if buffer.boundary.exceeded_max_duration(now) => {
                    Some(Trigger::MaxDuration)
                }
                _ => None,
            }
        };
        match trigger {
            Some(trigger) => self.finalize(trigger),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub fn finalize(&self, trigger: Trigger) -> Result<Option<SessionManifest>> {
        let now = self.clock.now_ms();
        let buffer = {
            let mut guard = self.state.lock().unwrap();
            guard.take()
        };
        let Some(mut buffer) = buffer else {
            return Ok(None);
        };
        buffer.triggers.insert(trigger);

        if buffer.changes.is_empty() {
            debug!("discarding empty session");
            return Ok(None);
        }

        let mut changes = buffer.ordered_changes();
        digest::finalize_digests(&self.blob_store, &self.workspace_root, &buffer.shadows, &mut changes)?;

        if changes.len() >= self.config.min_files_for_dedup {
            let fingerprint = session_fingerprint(&changes);
            if let Some(existing_id) =
                self.dedup
                    .check(&fingerprint, &buffer.session_id, now, self.config.dedup_window_ms)
            {
                debug!(existing_session_id = %existing_id, "discarding session as a duplicate of a recent one");
                release_refs(&self.blob_store, &changes);
                return self.catalog.get_session(&existing_id);
            }
        }

        let (name, tags) = summarizer::summarize(&changes);
        let manifest = SessionManifest {
            schema: SESSION_SCHEMA.to_string(),
            session_id: buffer.session_id.clone(),
            workspace_key: self.workspace_key.clone(),
            started_at: buffer.boundary.started_at(),
            ended_at: now,
            triggers: buffer.triggers.clone(),
            name,
            tags,
            changes,
        };

        self.catalog.put_session(manifest.clone())?;
        info!(session_id = %manifest.session_id, changes = manifest.change_count(), "session finalized");
        Ok(Some(manifest))
    }

    /// Editor/IDE loses focus (spec §4.3/§6 `onBlur`): finalizes the
    /// active session.
    pub fn on_blur(&self) -> Result<Option<SessionManifest>> {
        self.finalize(Trigger::Blur)
    }

    /// A VCS commit just happened (spec §4.3/§6 `onCommit`): finalizes
    /// the active session.
    pub fn on_commit(&self) -> Result<Option<SessionManifest>> {
        self.finalize(Trigger::PreCommit)
    }

    /// A VCS commit is about to happen (spec §4.3/§6 `onPreCommit`):
    /// finalizes the active session before the commit proceeds.
    pub fn on_pre_commit(&self) -> Result<Option<SessionManifest>> {
        self.finalize(Trigger::PreCommit)
    }

    /// A collaborator marks its unit of work done (spec §4.3/§6
    /// `onTaskComplete`): finalizes the active session.
    pub fn on_task_complete(&self) -> Result<Option<SessionManifest>> {
        self.finalize(Trigger::Task)
    }

    /// Explicit caller-requested finalize (spec §4.3/§6
    /// `onManualFinalize`).
    pub fn on_manual_finalize(&self) -> Result<Option<SessionManifest>> {
        self.finalize(Trigger::Manual)
    }

    pub fn current_session_id(&self) -> Option<String> {
        self.state.lock().unwrap().as_ref().map(|b| b.session_id.clone())
    }

    pub fn get_manifest(&self, session_id: &str) -> Result<Option<SessionManifest>> {
        self.catalog.get_session(session_id)
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    /// Deletes a persisted manifest and releases the refcounts it held
    /// (spec §4.6 "On manifest deletion: `decRef` likewise", P7). Returns
    /// `false` if no such session exists.
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let Some(manifest) = self.catalog.get_session(session_id)? else {
            return Ok(false);
        };
        self.catalog.delete_session(session_id)?;
        release_refs(&self.blob_store, &manifest.changes);
        Ok(true)
    }

    pub fn list(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        self.catalog.list_sessions(&self.workspace_key, limit)
    }

    pub fn rollback(
        &self,
        session_id: &str,
        blob_store: &BlobStore,
        data_dir: &Path,
        options: RollbackOptions,
    ) -> Result<RollbackResult> {
        let manifest = self
            .catalog
            .get_session(session_id)?
            .ok_or_else(|| crate::core::EngineError::SessionNotFound(session_id.to_string()))?;
        let engine = RollbackEngine::new(blob_store, data_dir);
        engine.rollback(&manifest, &self.workspace_root, options)
    }
}

fn release_refs(blob_store: &BlobStore, changes: &[ChangeRecord]) {
    for change in changes {
        if let Some(d) = &change.digest_before {
            let _ = blob_store.dec_ref(d, 1);
        }
        if let Some(d) = &change.digest_after {
            let _ = blob_store.dec_ref(d, 1);
        }
    }
}

/// Matches the restricted `**/<name>/**` shape used by `ignore_patterns`
/// (no general glob engine — file-protection policy is out of scope).
fn matches_ignore_pattern(pattern: &str, relative: &str) -> bool {
    if let Some(name) = pattern.strip_prefix("**/").and_then(|p| p.strip_suffix("/**")) {
        return relative.split('/').any(|segment| segment == name);
    }
    pattern == relative
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::session::clock::FakeClock;
    use std::fs;
    use tempfile::TempDir;

    fn manager(workspace: &TempDir, data_dir: &TempDir, clock: Arc<FakeClock>) -> SessionManager {
        let catalog = Arc::new(Catalog::open(data_dir.path().join("catalog")).unwrap());
        let blobs = Arc::new(BlobStore::open(data_dir.path()).unwrap());
        let mut config = EngineConfig::default();
        config.idle_ms = 100;
        config.min_session_duration_ms = 0;
        config.max_session_duration_ms = 10_000;
        SessionManager::new(workspace.path(), "ws1", config, clock, catalog, blobs)
    }

    #[test]
    fn track_then_finalize_persists_manifest() {
        let workspace = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let mgr = manager(&workspace, &data_dir, clock);

        fs::write(workspace.path().join("a.txt"), b"hello").unwrap();
        mgr.track(ChangeOp::Created, &workspace.path().join("a.txt"), None)
            .unwrap();

        let manifest = mgr.finalize(Trigger::Manual).unwrap().unwrap();
        assert_eq!(manifest.change_count(), 1);
        assert_eq!(manifest.changes[0].path, "a.txt");
        assert!(manifest.changes[0].digest_after.is_some());
    }

    #[test]
    fn empty_session_is_discarded() {
        let workspace = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let mgr = manager(&workspace, &data_dir, clock);
        assert!(mgr.finalize(Trigger::Manual).unwrap().is_none());
    }

    #[test]
    fn repeated_touches_merge_into_one_record() {
        let workspace = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let mgr = manager(&workspace, &data_dir, clock);

        let path = workspace.path().join("a.txt");
        fs::write(&path, b"v1").unwrap();
        mgr.track(ChangeOp::Created, &path, None).unwrap();
        fs::write(&path, b"v2").unwrap();
        mgr.track(ChangeOp::Modified, &path, None).unwrap();

        let manifest = mgr.finalize(Trigger::Manual).unwrap().unwrap();
        assert_eq!(manifest.change_count(), 1);
        assert_eq!(manifest.changes[0].op, ChangeOp::Created);
    }

    #[test]
    fn ignored_paths_are_never_tracked() {
        let workspace = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let mgr = manager(&workspace, &data_dir, clock);

        fs::create_dir_all(workspace.path().join("target")).unwrap();
        let path = workspace.path().join("target").join("a.txt");
        fs::write(&path, b"v1").unwrap();
        mgr.track(ChangeOp::Created, &path, None).unwrap();
        assert!(mgr.finalize(Trigger::Manual).unwrap().is_none());
    }

    #[test]
    fn non_empty_session_below_min_duration_still_persists() {
        let workspace = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let catalog = Arc::new(Catalog::open(data_dir.path().join("catalog")).unwrap());
        let blobs = Arc::new(BlobStore::open(data_dir.path()).unwrap());
        let mut config = EngineConfig::default();
        config.min_session_duration_ms = 60_000;
        let mgr = SessionManager::new(workspace.path(), "ws1", config, clock, catalog, blobs);

        fs::write(workspace.path().join("a.txt"), b"hello").unwrap();
        mgr.track(ChangeOp::Created, &workspace.path().join("a.txt"), None)
            .unwrap();

        let manifest = mgr.on_blur().unwrap().unwrap();
        assert!(manifest.triggers.contains(&Trigger::Blur));
    }

    #[test]
    fn on_commit_finalizes_active_session() {
        let workspace = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let mgr = manager(&workspace, &data_dir, clock);

        fs::write(workspace.path().join("a.txt"), b"hello").unwrap();
        mgr.track(ChangeOp::Created, &workspace.path().join("a.txt"), None)
            .unwrap();

        let manifest = mgr.on_commit().unwrap().unwrap();
        assert!(manifest.triggers.contains(&Trigger::PreCommit));
    }

    #[test]
    fn on_pre_commit_finalizes_active_session() {
        let workspace = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let mgr = manager(&workspace, &data_dir, clock);

        fs::write(workspace.path().join("a.txt"), b"hello").unwrap();
        mgr.track(ChangeOp::Created, &workspace.path().join("a.txt"), None)
            .unwrap();

        let manifest = mgr.on_pre_commit().unwrap().unwrap();
        assert!(manifest.triggers.contains(&Trigger::PreCommit));
    }

    #[test]
    fn on_task_complete_finalizes_active_session() {
        let workspace = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let mgr = manager(&workspace, &data_dir, clock);

        fs::write(workspace.path().join("a.txt"), b"hello").unwrap();
        mgr.track(ChangeOp::Created, &workspace.path().join("a.txt"), None)
            .unwrap();

        let manifest = mgr.on_task_complete().unwrap().unwrap();
        assert!(manifest.triggers.contains(&Trigger::Task));
    }

    #[test]
    fn on_manual_finalize_finalizes_active_session() {
        let workspace = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let mgr = manager(&workspace, &data_dir, clock);

        fs::write(workspace.path().join("a.txt"), b"hello").unwrap();
        mgr.track(ChangeOp::Created, &workspace.path().join("a.txt"), None)
            .unwrap();

        let manifest = mgr.on_manual_finalize().unwrap().unwrap();
        assert!(manifest.triggers.contains(&Trigger::Manual));
    }

    #[test]
    fn idle_boundary_finalizes_via_check_boundaries() {
        let workspace = TempDir::new().unwrap();
        let data_dir = TempDir::new().unwrap();
        let clock = Arc::new(FakeClock::new(0));
        let mgr = manager(&workspace, &data_dir, clock.clone());

        fs::write(workspace.path().join("a.txt"), b"hello").unwrap();
        mgr.track(ChangeOp::Created, &workspace.path().join("a.txt"), None)
            .unwrap();

        assert!(mgr.check_boundaries().unwrap().is_none());
        clock.advance(150);
        let manifest = mgr.check_boundaries().unwrap().unwrap();
        assert!(manifest.triggers.contains(&Trigger::IdleFinalize));
    }
}

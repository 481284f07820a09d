//! Deferred content digesting (spec §4.3.1): a session only records paths
//! and operations as they happen. Blob digests are computed once, at
//! finalize time, from a shadow snapshot taken on first touch (for the
//! "before" side) and the live file (for the "after" side) — this avoids
//! hashing on every keystroke-driven event.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::blob::BlobStore;
use crate::core::{ChangeOp, ChangeRecord, Result};
use crate::workspace::to_absolute;

/// Bytes captured the first time a session touches a path, keyed by the
/// normalized relative path the snapshot was taken under.
pub type ShadowMap = HashMap<String, Vec<u8>>;

pub fn capture_shadow(shadows: &mut ShadowMap, workspace_root: &Path, relative: &str) {
    if shadows.contains_key(relative) {
        return;
    }
    if let Ok(bytes) = fs::read(to_absolute(workspace_root, relative)) {
        shadows.insert(relative.to_string(), bytes);
    }
}

/// Fills in `digest_before`/`digest_after`/size fields for every change,
/// storing referenced content into `blob_store` and bumping refcounts.
pub fn finalize_digests(
    blob_store: &BlobStore,
    workspace_root: &Path,
    shadows: &ShadowMap,
    changes: &mut [ChangeRecord],
) -> Result<()> {
    for change in changes.iter_mut() {
        match change.op {
            ChangeOp::Created => {
                if let Ok(bytes) = fs::read(to_absolute(workspace_root, &change.path)) {
                    store_after(blob_store, change, &bytes)?;
                }
            }
            ChangeOp::Modified => {
                if let Some(before) = shadows.get(&change.path) {
                    store_before(blob_store, change, before)?;
                }
                if let Ok(after) = fs::read(to_absolute(workspace_root, &change.path)) {
                    store_after(blob_store, change, &after)?;
                }
            }
            ChangeOp::Deleted => {
                if let Some(before) = shadows.get(&change.path) {
                    store_before(blob_store, change, before)?;
                }
            }
            ChangeOp::Renamed => {
                let shadow_key = change.from_path.clone().unwrap_or_else(|| change.path.clone());
                if let Some(before) = shadows.get(&shadow_key) {
                    store_before(blob_store, change, before)?;
                    // A pure rename keeps the same bytes unless a later
                    // merge in the session buffer also modified content.
                    if change.digest_after.is_none() {
                        let digest = change.digest_before.clone().unwrap();
                        blob_store.inc_ref(&digest, 1)?;
                        change.digest_after = Some(digest);
                        change.size_after = change.size_before;
                    }
                }
            }
        }
    }
    Ok(())
}

fn store_before(blob_store: &BlobStore, change: &mut ChangeRecord, bytes: &[u8]) -> Result<()> {
    let digest = blob_store.put(bytes)?;
    blob_store.inc_ref(&digest, 1)?;
    change.digest_before = Some(digest);
    change.size_before = Some(bytes.len() as u64);
    Ok(())
}

fn store_after(blob_store: &BlobStore, change: &mut ChangeRecord, bytes: &[u8]) -> Result<()> {
    let digest = blob_store.put(bytes)?;
    blob_store.inc_ref(&digest, 1)?;
    change.digest_after = Some(digest);
    change.size_after = Some(bytes.len() as u64);
    Ok(())
}

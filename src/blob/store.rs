//! Content-addressable blob store (spec §4.1).
//!
//! Blob bytes live under `<root>/blobs/sha256/<aa>/<bb>/<digest>.lz4`
//! (two-level sharding, as spec.md prescribes). Metadata (size,
//! compressed size, refcount, createdAt) is the store's own small
//! index file, snapshotted with write-then-rename the same way the
//! teacher's `SnapshotManager::save` publishes a checkpoint — this keeps
//! refcount bookkeeping under a single owner (see DESIGN.md "blob
//! metadata ownership").

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::blob::compress;
use crate::core::{EngineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobMeta {
    pub digest: String,
    pub size: u64,
    pub compressed_size: u64,
    pub algo: &'static str,
    pub ref_count: u64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BlobIndex {
    blobs: HashMap<String, BlobMeta>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BlobStats {
    pub total_blobs: usize,
    pub total_uncompressed: u64,
    pub total_compressed: u64,
}

impl BlobStats {
    pub fn compression_ratio(&self) -> f64 {
        if self.total_uncompressed == 0 {
            1.0
        } else {
            self.total_compressed as f64 / self.total_uncompressed as f64
        }
    }
}

pub struct BlobStore {
    root: PathBuf,
    index_path: PathBuf,
    index: RwLock<BlobIndex>,
}

impl BlobStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("blobs").join("sha256"))?;
        let index_path = root.join("blobs_index.msgpack");
        let index = if index_path.exists() {
            let bytes = fs::read(&index_path)?;
            rmp_serde::from_slice(&bytes)
                .map_err(|e| EngineError::ManifestCorrupt(format!("blob index: {e}")))?
        } else {
            BlobIndex::default()
        };
        Ok(Self {
            root,
            index_path,
            index: RwLock::new(index),
        })
    }

    fn shard_path(&self, digest: &str) -> PathBuf {
        let aa = &digest[0..2];
        let bb = &digest[2..4];
        self.root
            .join("blobs")
            .join("sha256")
            .join(aa)
            .join(bb)
            .join(format!("{digest}.lz4"))
    }

    fn persist_index(&self) -> Result<()> {
        let index = self.index.read()?;
        let bytes = rmp_serde::to_vec(&*index)
            .map_err(|e| EngineError::ManifestCorrupt(format!("blob index: {e}")))?;
        let tmp = self.index_path.with_extension("msgpack.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.index_path)?;
        Ok(())
    }

    /// Idempotent: if `digest` already exists, returns it unchanged without
    /// touching disk again (P2, P3).
    pub fn put(&self, bytes: &[u8]) -> Result<String> {
        let digest = hex_sha256(bytes);
        if self.has(&digest)? {
            return Ok(digest);
        }

        let compressed = compress::compress(bytes)?;
        let path = self.shard_path(&digest);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("lz4.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&compressed)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        let meta = BlobMeta {
            digest: digest.clone(),
            size: bytes.len() as u64,
            compressed_size: compressed.len() as u64,
            algo: "sha256",
            ref_count: 0,
            created_at: now_ms(),
        };
        {
            let mut index = self.index.write()?;
            index.blobs.entry(digest.clone()).or_insert(meta);
        }
        self.persist_index()?;
        Ok(digest)
    }

    pub fn get(&self, digest: &str) -> Result<Vec<u8>> {
        let path = self.shard_path(digest);
        if !path.exists() {
            return Err(EngineError::BlobNotFound(digest.to_string()));
        }
        let mut compressed = Vec::new();
        File::open(&path)?.read_to_end(&mut compressed)?;
        let bytes = compress::decompress(&compressed)?;
        let actual = hex_sha256(&bytes);
        if actual != digest {
            return Err(EngineError::HashMismatch {
                expected: digest.to_string(),
                actual,
            });
        }
        Ok(bytes)
    }

    pub fn has(&self, digest: &str) -> Result<bool> {
        Ok(self.index.read()?.blobs.contains_key(digest))
    }

    pub fn inc_ref(&self, digest: &str, n: u64) -> Result<()> {
        {
            let mut index = self.index.write()?;
            let meta = index
                .blobs
                .get_mut(digest)
                .ok_or_else(|| EngineError::BlobNotFound(digest.to_string()))?;
            meta.ref_count += n;
        }
        self.persist_index()
    }

    pub fn dec_ref(&self, digest: &str, n: u64) -> Result<()> {
        {
            let mut index = self.index.write()?;
            let meta = index
                .blobs
                .get_mut(digest)
                .ok_or_else(|| EngineError::BlobNotFound(digest.to_string()))?;
            meta.ref_count = meta.ref_count.saturating_sub(n);
        }
        self.persist_index()
    }

    /// Physically deletes blobs whose refcount is zero and older than
    /// `grace_ms` (spec §4.6). Returns the digests collected.
    pub fn gc(&self, grace_ms: u64) -> Result<Vec<String>> {
        let now = now_ms();
        let collectable: Vec<String> = {
            let index = self.index.read()?;
            index
                .blobs
                .values()
                .filter(|m| m.ref_count == 0 && now - m.created_at >= grace_ms as i64)
                .map(|m| m.digest.clone())
                .collect()
        };

        for digest in &collectable {
            let path = self.shard_path(digest);
            let _ = fs::remove_file(path);
        }

        {
            let mut index = self.index.write()?;
            for digest in &collectable {
                index.blobs.remove(digest);
            }
        }
        self.persist_index()?;
        Ok(collectable)
    }

    pub fn stats(&self) -> Result<BlobStats> {
        let index = self.index.read()?;
        let mut stats = BlobStats::default();
        for meta in index.blobs.values() {
            stats.total_blobs += 1;
            stats.total_uncompressed += meta.size;
            stats.total_compressed += meta.compressed_size;
        }
        Ok(stats)
    }

    pub fn meta(&self, digest: &str) -> Result<BlobMeta> {
        self.index
            .read()?
            .blobs
            .get(digest)
            .cloned()
            .ok_or_else(|| EngineError::BlobNotFound(digest.to_string()))
    }
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

/// Used by tests elsewhere that need a throwaway store rooted at a tempdir.
pub fn open_in(dir: &Path) -> Result<BlobStore> {
    BlobStore::open(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn put_get_round_trip_p1() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        let data = b"hello, world!".to_vec();
        let digest = store.put(&data).unwrap();
        assert_eq!(store.get(&digest).unwrap(), data);
    }

    #[test]
    fn digest_is_deterministic_sha256_p2() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        let digest = store.put(b"hello, world!").unwrap();
        assert_eq!(
            digest,
            "68e656b251e67e8358bef8483ab0d51c6619f3e7a1a9f0e75838d41ff368f728"
        );
    }

    #[test]
    fn put_is_idempotent_p3() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        let d1 = store.put(b"same bytes").unwrap();
        let d2 = store.put(b"same bytes").unwrap();
        assert_eq!(d1, d2);
        assert_eq!(store.stats().unwrap().total_blobs, 1);
        assert_eq!(store.meta(&d1).unwrap().ref_count, 0);
    }

    #[test]
    fn get_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.get("deadbeef"),
            Err(EngineError::BlobNotFound(_))
        ));
    }

    #[test]
    fn ref_counting_round_trips_p7() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        let digest = store.put(b"data").unwrap();
        store.inc_ref(&digest, 2).unwrap();
        assert_eq!(store.meta(&digest).unwrap().ref_count, 2);
        store.dec_ref(&digest, 2).unwrap();
        assert_eq!(store.meta(&digest).unwrap().ref_count, 0);
    }

    #[test]
    fn gc_only_collects_zero_ref_past_grace() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        let live = store.put(b"live").unwrap();
        let dead = store.put(b"dead").unwrap();
        store.inc_ref(&live, 1).unwrap();

        let collected = store.gc(0).unwrap();
        assert_eq!(collected, vec![dead.clone()]);
        assert!(store.get(&dead).is_err());
        assert!(store.get(&live).is_ok());
    }

    #[test]
    fn gc_respects_grace_window() {
        let dir = TempDir::new().unwrap();
        let store = BlobStore::open(dir.path()).unwrap();
        store.put(b"dead").unwrap();
        let collected = store.gc(86_400_000).unwrap();
        assert!(collected.is_empty());
    }

    #[test]
    fn metadata_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let digest = {
            let store = BlobStore::open(dir.path()).unwrap();
            let digest = store.put(b"persisted").unwrap();
            store.inc_ref(&digest, 3).unwrap();
            digest
        };
        let reopened = BlobStore::open(dir.path()).unwrap();
        assert_eq!(reopened.meta(&digest).unwrap().ref_count, 3);
        assert_eq!(reopened.get(&digest).unwrap(), b"persisted");
    }
}

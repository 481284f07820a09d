//! Single-writer advisory lock over the catalog (spec §4.2 `writer_lock`,
//! §5 "Writer discipline"). Readers never take this lock; writers take it
//! with bounded exponential backoff before mutating the catalog and
//! release it immediately after.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::core::{EngineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockRow {
    holder_id: String,
    acquired_at: i64,
    expires_at: i64,
}

pub struct WriterLock {
    path: PathBuf,
    timeout: Duration,
    lease: Duration,
}

pub struct LockGuard<'a> {
    lock: &'a WriterLock,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock.path);
    }
}

impl WriterLock {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            lease: Duration::from_secs(30),
        }
    }

    pub fn acquire(&self) -> Result<LockGuard<'_>> {
        let deadline = Instant::now() + self.timeout;
        let mut backoff = Duration::from_millis(5);

        loop {
            if self.try_write_lock_file()? {
                return Ok(LockGuard { lock: self });
            }

            if self.is_stale()? {
                let _ = fs::remove_file(&self.path);
                continue;
            }

            if Instant::now() >= deadline {
                return Err(EngineError::LockTimeout(self.timeout));
            }

            thread::sleep(backoff.min(deadline.saturating_duration_since(Instant::now())));
            backoff = (backoff * 2).min(Duration::from_millis(250));
        }
    }

    fn try_write_lock_file(&self) -> Result<bool> {
        let now = now_ms();
        let row = LockRow {
            holder_id: format!("pid-{}", std::process::id()),
            acquired_at: now,
            expires_at: now + self.lease.as_millis() as i64,
        };
        let bytes = serde_json::to_vec(&row)
            .map_err(|e| EngineError::ManifestCorrupt(e.to_string()))?;

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                file.write_all(&bytes)?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn is_stale(&self) -> Result<bool> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let row: LockRow = match serde_json::from_slice(&bytes) {
            Ok(r) => r,
            Err(_) => return Ok(true),
        };
        Ok(now_ms() > row.expires_at)
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn lock_path(catalog_dir: &Path) -> PathBuf {
    catalog_dir.join("writer.lock")
}

//! Periodic full checkpoint of the catalog's in-memory tables, mirroring
//! `storage::persistence::SnapshotManager`: write to a temp file, fsync,
//! rename into place.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;

use crate::catalog::schema::CatalogTables;
use crate::core::{EngineError, Result};

pub struct CatalogSnapshot {
    path: PathBuf,
}

impl CatalogSnapshot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn save(&self, tables: &CatalogTables) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = rmp_serde::to_vec(tables)
            .map_err(|e| EngineError::ManifestCorrupt(format!("encode snapshot: {e}")))?;
        let tmp = self.path.with_extension("snapshot.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<CatalogTables>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let mut bytes = Vec::new();
        File::open(&self.path)?.read_to_end(&mut bytes)?;
        let tables = rmp_serde::from_slice(&bytes)
            .map_err(|e| EngineError::ManifestCorrupt(format!("decode snapshot: {e}")))?;
        Ok(Some(tables))
    }
}

//! Catalog write-ahead log: length-prefixed, `rmp_serde`-encoded
//! `CatalogOp` records, appended synchronously and fsynced on every
//! write. Generalizes `storage::persistence::WalManager` from "SQL
//! mutation log" to "catalog mutation log"; unlike the teacher's WAL,
//! this one has no async writer thread — session finalization is rare
//! enough relative to SQL row writes that synchronous, always-fsynced
//! appends are simpler and safer here (see DESIGN.md).

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};

use crate::catalog::schema::CatalogOp;
use crate::core::{EngineError, Result};

pub struct CatalogWal {
    path: PathBuf,
}

impl CatalogWal {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    pub fn append(&self, op: &CatalogOp) -> Result<()> {
        let encoded = rmp_serde::to_vec(op)
            .map_err(|e| EngineError::ManifestCorrupt(format!("encode catalog op: {e}")))?;
        let len = (encoded.len() as u32).to_le_bytes();

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(&len)?;
        file.write_all(&encoded)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<CatalogOp>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = BufReader::new(File::open(&self.path)?);
        let mut ops = Vec::new();
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut body = vec![0u8; len];
            reader.read_exact(&mut body)?;
            let op: CatalogOp = rmp_serde::from_slice(&body)
                .map_err(|e| EngineError::ManifestCorrupt(format!("decode catalog op: {e}")))?;
            ops.push(op);
        }
        Ok(ops)
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            let file = OpenOptions::new().write(true).truncate(true).open(&self.path)?;
            file.sync_all()?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

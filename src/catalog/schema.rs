//! Logical catalog rows (spec §4.2). `Catalog` keeps these in memory,
//! durable via the WAL + snapshot pair in `catalog::wal` / `catalog::snapshot`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::SessionManifest;
use crate::rollback::journal::JournalEntry;

/// In-memory projection of the catalog's tables. This is what gets
/// checkpointed into `catalog.snapshot` and rebuilt by replaying
/// `catalog.wal` on top of the last checkpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogTables {
    pub sessions: HashMap<String, SessionManifest>,
    pub journals: HashMap<String, JournalEntry>,
}

/// One entry in the catalog's write-ahead log: a single durable mutation
/// to the logical tables (spec §4.2), generalized from the teacher's
/// `storage::persistence::WalEntry` (there: SQL table mutations; here:
/// session / journal mutations).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CatalogOp {
    PutSession(Box<SessionManifest>),
    DeleteSession(String),
    PutJournal(Box<JournalEntry>),
    DeleteJournal(String),
}

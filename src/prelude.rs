//! Convenience re-exports for callers embedding the engine.

pub use crate::blob::{BlobMeta, BlobStats, BlobStore};
pub use crate::catalog::Catalog;
pub use crate::config::EngineConfig;
pub use crate::core::{
    ChangeOp, ChangeRecord, EngineError, EolKind, Result, SessionManifest, SessionSummary,
    Trigger,
};
pub use crate::engine::Engine;
pub use crate::rollback::{RollbackEngine, RollbackOptions, RollbackResult, SweepReport};
pub use crate::session::{Clock, SessionManager, SystemClock};

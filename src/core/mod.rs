pub mod error;
pub mod types;

pub use error::{EngineError, Result};
pub use types::{
    ChangeOp, ChangeRecord, EolKind, SessionManifest, SessionSummary, Trigger, SESSION_SCHEMA,
};

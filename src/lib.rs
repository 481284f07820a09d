//! sessionvault: a local code-history engine.
//!
//! Records fine-grained editing activity as bounded sessions, stores the
//! content those sessions touch in a content-addressable blob store, and
//! supports crash-safe selective rollback of any past session.

extern crate self as sessionvault;

pub mod blob;
pub mod catalog;
pub mod config;
pub mod core;
pub mod engine;
pub mod prelude;
pub mod rollback;
pub mod session;
pub mod workspace;

pub use blob::BlobStore;
pub use config::EngineConfig;
pub use core::{
    ChangeOp, ChangeRecord, EngineError, EolKind, Result, SessionManifest, SessionSummary,
    Trigger, SESSION_SCHEMA,
};
pub use engine::Engine;

pub mod engine;
pub mod journal;
pub mod sweeper;

pub use engine::{RollbackEngine, RollbackOptions, RollbackResult};
pub use journal::{JournalDirs, JournalEntry, JournalStatus};
pub use sweeper::{RecoverySweeper, SweepReport};

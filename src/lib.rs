//! # Rankmigrator
//!
//! Moves per-user rank data (experience and level) out of a flat
//! key-value file and into a relational users table.
//!
//! Rankmigrator provides:
//! - A flat store for the `<key> = <value>` file format with typed values
//! - Reassembly of per-user records from `<id>.xp` / `<id>.level` keys
//! - A transactional record sink backed by SQLite

pub mod flat;
pub mod record;
pub mod storage;
pub mod migrator;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use flat::{FlatStore, Scalar};
pub use record::{Attribute, CompoundKey, UserRecord};
pub use storage::{RecordSink, SinkTransaction, SqliteSink};
pub use migrator::{MigrateOptions, MigrationReport, Migrator};

/// Result type alias for Rankmigrator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Rankmigrator operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid entry: {0}")]
    InvalidEntry(String),
}

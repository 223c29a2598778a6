//! Storage Layer - the record sink
//!
//! Migrated users end up in a relational table:
//! - users(id, level, experience)
//!
//! The migrator only sees the [`RecordSink`] and [`SinkTransaction`]
//! traits; [`SqliteSink`] is the SQLite implementation.

pub mod schema;
pub mod sink;
pub mod sqlite;

pub use sink::{RecordSink, SinkTransaction};
pub use sqlite::{SqliteSink, UserTransaction};

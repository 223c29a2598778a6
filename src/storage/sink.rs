//! Traits the migrator writes through

use crate::Result;
use crate::record::UserRecord;

/// A relational store receiving migrated users.
pub trait RecordSink {
    /// Scoped transaction handle. Dropping it without calling
    /// [`SinkTransaction::commit`] rolls back.
    type Transaction<'a>: SinkTransaction
    where
        Self: 'a;

    /// Create missing tables
    fn ensure_schema(&mut self) -> Result<()>;

    /// Delete every existing user, returning how many were removed
    fn clear_users(&mut self) -> Result<usize>;

    /// Start a transaction
    fn begin(&mut self) -> Result<Self::Transaction<'_>>;
}

pub trait SinkTransaction {
    /// Insert a new user; fails if the id already exists
    fn create_user(&mut self, user: &UserRecord) -> Result<()>;

    fn commit(self) -> Result<()>;
}

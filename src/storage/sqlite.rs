//! SQLite sink implementation

use std::path::Path;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use crate::Result;
use crate::record::UserRecord;
use super::schema;
use super::sink::{RecordSink, SinkTransaction};

/// SQLite-backed users table
pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        tracing::info!("Connected to database {}", path.display());
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Get a user by id
    pub fn get_user(&self, id: i64) -> Result<Option<UserRecord>> {
        self.conn
            .query_row(
                "SELECT id, experience, level FROM users WHERE id = ?1",
                [id],
                |row| Ok(UserRecord::new(row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Count all users
    pub fn count_users(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl RecordSink for SqliteSink {
    type Transaction<'a> = UserTransaction<'a>
    where
        Self: 'a;

    fn ensure_schema(&mut self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    fn clear_users(&mut self) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM users", [])?;
        tx.commit()?;
        Ok(removed)
    }

    fn begin(&mut self) -> Result<UserTransaction<'_>> {
        Ok(UserTransaction {
            tx: self.conn.transaction()?,
        })
    }
}

/// Open transaction on a [`SqliteSink`]; rolls back when dropped uncommitted
pub struct UserTransaction<'a> {
    tx: Transaction<'a>,
}

impl SinkTransaction for UserTransaction<'_> {
    fn create_user(&mut self, user: &UserRecord) -> Result<()> {
        self.tx.execute(
            "INSERT INTO users (id, level, experience) VALUES (?1, ?2, ?3)",
            params![user.id, user.level, user.experience],
        )?;
        Ok(())
    }

    fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

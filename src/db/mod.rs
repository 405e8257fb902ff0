//! SQLite-backed record store.
//!
//! One `Store` per process, shared behind a mutex in `AppState`. Each public
//! method is a single atomic unit: either one statement, or a sequence
//! wrapped in `with_transaction`. Cross-row invariants (version-selection
//! exclusivity, usage-period lookup-or-create, cascading deletes) live here,
//! never in callers.

use std::path::PathBuf;

use rusqlite::Connection;

pub mod types;
pub use types::*;

mod analytics;
mod briefs;
mod content;
mod knowledge;
mod organizations;
mod schedules;
mod usage;

pub use analytics::{AggregateDeltas, EventFilter, NewEngagementEvent};
pub use briefs::{BriefDetail, BriefOverview, NewBrief, RequestWithLatest};
pub use content::{CommentWithAuthor, NewMedia, RequestDetail, VersionDetail};
pub use knowledge::{FileOverview, NewChunk, NewFile};
pub use schedules::{NewConnection, NewSchedule, ScheduleOverview};
pub use usage::USAGE_PERIOD_MS;

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default path and apply the schema.
    pub fn open() -> Result<Self, DbError> {
        Self::open_at(Self::default_db_path()?)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL for concurrent readers while one writer holds the lock.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// In-memory store with the full schema applied. Used by tests.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.copydesk/copydesk.db`.
    fn default_db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".copydesk").join("copydesk.db"))
    }
}

//! SQLite access layer.
//!
//! A `Database` wraps a single connection. The HTTP layer opens one per
//! request; the ingestion pipeline runs its whole batch inside one
//! IMMEDIATE transaction taken from it. Query functions in the submodules
//! take a plain `&Connection` so they work the same on a connection, a
//! transaction or a savepoint.

mod schema;
pub mod locations;
pub mod photos;
pub mod trips;
pub mod users;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

pub use locations::{Location, LocationSummary, LocationUpdate};
pub use photos::{NewPhoto, Photo};
pub use schema::{MIGRATIONS, REQUIRED_TABLES, SCHEMA};
pub use trips::{NewTrip, Trip};
pub use users::{NewUser, User};

/// How long a writer waits on SQLite's lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::configure(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        self.run_migrations()?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        for migration in MIGRATIONS {
            let _ = self.conn.execute(migration, []);
        }
        Ok(())
    }

    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Start a transaction that takes the write lock immediately, so
    /// read-then-write sequences inside it cannot interleave with another
    /// writer.
    pub fn begin_immediate(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}

/// Current time as unix seconds, the unit every timestamp column uses.
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// In-memory database with the schema, one user and one trip (ids 1/1).
    pub fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db
    }

    /// Create the schema, one user and one trip (ids 1/1) in `db`.
    pub fn seed(db: &Database) {
        db.initialize().unwrap();
        let user = db
            .create_user(&NewUser {
                email: "traveler@example.com".to_string(),
                name: "Traveler".to_string(),
            })
            .unwrap();
        db.create_trip(&NewTrip {
            user_id: user.id,
            title: "Tokyo".to_string(),
            city: Some("Tokyo".to_string()),
            country: Some("Japan".to_string()),
            start_date: None,
            end_date: None,
        })
        .unwrap();
    }
}

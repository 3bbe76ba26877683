//! The partition store's SQLite handle.
//!
//! One database file holds every partition of every version. It runs in WAL
//! mode so a kiosk that loses power mid-write keeps the last committed
//! partitions, and foreign keys are on so deleting a partition removes its
//! entries.

use super::migrations;
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA foreign_keys=ON;";

/// Handle to the partition store.
///
/// Clones share one tokio-rusqlite connection thread, so partition
/// operations from concurrent requests are serialized and each one is
/// atomic.
#[derive(Clone, Debug)]
pub struct CacheDb {
    pub(crate) conn: Connection,
}

/// Breakage a test can inject into the entry store.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheFault {
    /// Every entry insert or overwrite fails; reads keep working.
    RejectWrites,
    /// The entry table is gone: every read and write fails.
    DropEntries,
}

impl CacheDb {
    /// Open (or create) the partition store at `path` and migrate it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::prepare(conn).await
    }

    /// In-memory store with the same pragmas and schema.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::prepare(conn).await
    }

    async fn prepare(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| {
            conn.execute_batch(PRAGMAS)?;
            Ok(())
        })
        .await
        .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn })
    }

    /// Break the entry store so callers can exercise their failure paths.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn inject_fault(&self, fault: CacheFault) -> Result<(), Error> {
        let sql = match fault {
            CacheFault::RejectWrites => {
                "CREATE TRIGGER IF NOT EXISTS reject_entry_writes BEFORE INSERT ON entries
                 BEGIN SELECT RAISE(FAIL, 'entry store is read-only'); END;"
            }
            CacheFault::DropEntries => "DROP TABLE IF EXISTS entries;",
        };
        self.conn
            .call(move |conn| {
                conn.execute_batch(sql)?;
                Ok(())
            })
            .await
            .map_err(Error::Database)
    }
}

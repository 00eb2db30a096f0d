//! SQLite check storage reader.
//!
//! Reads the `checks` table written by the checker's SQL storage:
//! one row per check file holding its name, timestamp and JSON results.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Result as SqlResult};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{Index, StorageError, StorageReader};
use crate::model::CheckFile;

/// Thread-safe, read-only handle on a checks database.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open an existing database read-only.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run a query on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn read_index(conn: &Connection) -> Result<Index, StorageError> {
    let mut stmt = conn.prepare("SELECT name, timestamp FROM checks")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<SqlResult<Vec<_>>>()?;
    Ok(rows.into_iter().collect())
}

fn read_results(conn: &Connection, name: &str) -> Result<Option<String>, StorageError> {
    let results = conn
        .query_row(
            "SELECT results FROM checks WHERE name = ?1 LIMIT 1",
            params![name],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(results.flatten())
}

impl StorageReader for SqliteStorage {
    async fn get_index(&self) -> Result<Index, StorageError> {
        self.with_conn(read_index).await
    }

    async fn fetch(&self, name: &str) -> Result<CheckFile, StorageError> {
        let owned = name.to_string();
        let body = self.with_conn(move |conn| read_results(conn, &owned)).await?;
        match body {
            Some(body) => Ok(CheckFile::parse(name, body.as_bytes())?),
            None => Err(StorageError::NotFound(name.to_string())),
        }
    }
}

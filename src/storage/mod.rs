//! Storage readers for check files.
//!
//! Supports a local directory, a static HTTP location and a SQLite table.

mod fs;
mod http;
mod sqlite;

pub use fs::*;
pub use http::*;
pub use sqlite::*;

use crate::config::StorageConfig;
use crate::model::CheckFile;

use regex::Regex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::OnceLock;
use thiserror::Error;

/// Name of the index file listing every check file.
pub const INDEX_NAME: &str = "index.json";

/// Suffix shared by all check files.
pub const CHECK_FILE_SUFFIX: &str = "-check.json";

/// Storage error types.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("check file not found: {0}")]
    NotFound(String),
    #[error("invalid storage configuration: {0}")]
    Config(String),
    #[error("background task failed: {0}")]
    Task(String),
}

/// Index mapping check file names to their timestamps (ns).
pub type Index = HashMap<String, i64>;

/// Read access to stored check files.
pub trait StorageReader: Send + Sync {
    /// Load the index of all check files.
    fn get_index(&self) -> impl Future<Output = Result<Index, StorageError>> + Send;

    /// Download and parse one check file.
    fn fetch(&self, name: &str) -> impl Future<Output = Result<CheckFile, StorageError>> + Send;

    /// Names of check files whose index timestamp is at or after `since`,
    /// oldest first. Index entries that are not `<unix-nano>-check.json`
    /// files are ignored.
    fn list_files(&self, since: i64) -> impl Future<Output = Result<Vec<String>, StorageError>> + Send {
        async move {
            let index = self.get_index().await?;
            Ok(filter_index(&index, since))
        }
    }
}

fn filter_index(index: &Index, since: i64) -> Vec<String> {
    let mut names: Vec<(&String, i64)> = index
        .iter()
        .filter(|(name, &ts)| {
            ts >= since
                && name.ends_with(CHECK_FILE_SUFFIX)
                && check_file_timestamp(name).is_some()
        })
        .map(|(name, &ts)| (name, ts))
        .collect();
    names.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    names.into_iter().map(|(name, _)| name.clone()).collect()
}

/// Timestamp encoded in a check file name (`<unix-nano>-check.json`).
pub fn check_file_timestamp(name: &str) -> Option<i64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^(\d+)-").unwrap());

    re.captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Tracks the newest check file fetched so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct Watermark {
    newest: Option<i64>,
}

impl Watermark {
    /// Timestamp of the newest fetched file, if any.
    pub fn newest_fetched_timestamp(&self) -> Option<i64> {
        self.newest
    }

    /// Record a fetched file. Names without a timestamp prefix are ignored.
    pub fn observe(&mut self, name: &str) {
        if let Some(ts) = check_file_timestamp(name) {
            if self.newest.map_or(true, |n| ts > n) {
                self.newest = Some(ts);
            }
        }
    }

    /// Whether `name` is newer than everything fetched so far. Names without
    /// a timestamp prefix can never be tracked, so they are never new.
    pub fn is_new(&self, name: &str) -> bool {
        match (check_file_timestamp(name), self.newest) {
            (Some(ts), Some(newest)) => ts > newest,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// The configured storage backend.
pub enum Storage {
    Fs(FsStorage),
    Http(HttpStorage),
    Sqlite(SqliteStorage),
}

impl Storage {
    pub fn from_config(cfg: &StorageConfig) -> Result<Self, StorageError> {
        match cfg.kind.as_str() {
            "fs" => {
                let dir = cfg
                    .dir
                    .as_deref()
                    .ok_or_else(|| StorageError::Config("fs storage requires a dir".to_string()))?;
                Ok(Storage::Fs(FsStorage::new(dir)))
            }
            "http" => {
                let url = cfg
                    .url
                    .as_deref()
                    .ok_or_else(|| StorageError::Config("http storage requires a url".to_string()))?;
                Ok(Storage::Http(HttpStorage::new(url, cfg.timeout())?))
            }
            "sqlite" => {
                let path = cfg.sqlite_db_file.as_deref().ok_or_else(|| {
                    StorageError::Config("sqlite storage requires sqlite_db_file".to_string())
                })?;
                Ok(Storage::Sqlite(SqliteStorage::open(path)?))
            }
            other => Err(StorageError::Config(format!("unknown storage type: {}", other))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Storage::Fs(_) => "fs",
            Storage::Http(_) => "http",
            Storage::Sqlite(_) => "sqlite",
        }
    }
}

impl StorageReader for Storage {
    async fn get_index(&self) -> Result<Index, StorageError> {
        match self {
            Storage::Fs(s) => s.get_index().await,
            Storage::Http(s) => s.get_index().await,
            Storage::Sqlite(s) => s.get_index().await,
        }
    }

    async fn fetch(&self, name: &str) -> Result<CheckFile, StorageError> {
        match self {
            Storage::Fs(s) => s.fetch(name).await,
            Storage::Http(s) => s.fetch(name).await,
            Storage::Sqlite(s) => s.fetch(name).await,
        }
    }
}

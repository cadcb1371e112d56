//! Persistent history of trending-repository snapshots.
//!
//! One logical table keyed by `(capture date, window, author, repo_name)`,
//! written one transaction per snapshot and queried by window, date range,
//! language or repository.

mod record;
mod schema;
mod store;

use rusqlite::ErrorCode;
use thiserror::Error;

pub use record::{SnapshotInfo, TrendingRecord, Window};
pub use schema::SCHEMA_VERSION;
pub use store::SnapshotStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("invalid value for column {column}: {value}")]
    InvalidRow { column: &'static str, value: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(message.unwrap_or_else(|| code.to_string()))
            }
            other => StoreError::Sqlite(other),
        }
    }
}

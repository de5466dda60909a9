//! Document store seam.
//!
//! The document store is the system of record for sessions and, under the
//! dual-write topology, for memory content. Operations are typed by record
//! kind; `find_memories` returns records in no particular order and callers
//! re-order them.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Memory, Session};

#[cfg(feature = "sqlite")]
mod migrations;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDocumentStore;

/// Document store failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Newest-first session range: ids strictly older than `before`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionRange {
    pub before: Option<String>,
    pub limit: usize,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_session(&self, session: &Session) -> StoreResult<()>;

    /// Fails with `StoreError::NotFound` when absent.
    async fn find_session(&self, id: &str) -> StoreResult<Session>;

    /// Sessions ordered by id descending.
    async fn find_sessions(&self, range: &SessionRange) -> StoreResult<Vec<Session>>;

    /// Replace name and tags. Returns the number of records changed.
    async fn update_session(&self, session: &Session) -> StoreResult<u64>;

    /// Returns the number of records removed.
    async fn delete_session(&self, id: &str) -> StoreResult<u64>;

    /// Insert a batch atomically.
    async fn insert_memories(&self, memories: &[Memory]) -> StoreResult<()>;

    /// Records whose key is in `keys`, unordered. Missing keys are skipped.
    async fn find_memories(&self, keys: &[String]) -> StoreResult<Vec<Memory>>;

    /// Returns the number of records removed.
    async fn delete_memories(&self, session_id: &str, keys: &[String]) -> StoreResult<u64>;

    /// Remove every memory record of a session.
    async fn delete_session_memories(&self, session_id: &str) -> StoreResult<u64>;
}

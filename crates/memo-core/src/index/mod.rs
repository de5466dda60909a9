//! Vector index seam.
//!
//! One collection per session, named by the session id. Points carry a
//! [`MemoryPayload`] decoded at this boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::MemoryPayload;

#[cfg(feature = "qdrant")]
mod qdrant;

#[cfg(feature = "qdrant")]
pub use qdrant::QdrantIndex;

/// Vector index failures
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("collection not found: {0}")]
    NotFound(String),

    #[error("collection already exists: {0}")]
    AlreadyExists(String),

    #[error("index request failed: {0}")]
    Transport(String),

    #[error("index returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("cannot decode index response: {0}")]
    Decode(String),
}

impl IndexError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Similarity metric of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionInfo {
    pub name: String,
    pub points_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: MemoryPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: MemoryPayload,
}

/// A stored point without its vector.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadPoint {
    pub id: String,
    pub payload: MemoryPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub score_threshold: Option<f32>,
}

/// One page of a scroll. `next_offset` is `None` on the last page.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollPage {
    pub points: Vec<PayloadPoint>,
    pub next_offset: Option<String>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Fails with `IndexError::NotFound` when the collection is absent.
    async fn collection_info(&self, name: &str) -> IndexResult<CollectionInfo>;

    /// Fails with `IndexError::AlreadyExists` when the collection is present.
    async fn create_collection(&self, name: &str, dimension: usize, distance: Distance) -> IndexResult<()>;

    async fn delete_collection(&self, name: &str) -> IndexResult<()>;

    /// Insert or replace points; with `wait` the call returns once the
    /// points are searchable.
    async fn upsert(&self, name: &str, points: Vec<Point>, wait: bool) -> IndexResult<()>;

    /// Hits ordered by descending score, without vectors.
    async fn search(&self, name: &str, request: SearchRequest) -> IndexResult<Vec<ScoredPoint>>;

    /// Points in index order starting at `offset` (inclusive).
    async fn scroll(&self, name: &str, offset: Option<&str>, limit: usize) -> IndexResult<ScrollPage>;

    /// The subset of `ids` present in the collection.
    async fn existing_points(&self, name: &str, ids: &[String]) -> IndexResult<Vec<String>>;

    async fn delete_points(&self, name: &str, ids: &[String], wait: bool) -> IndexResult<()>;
}

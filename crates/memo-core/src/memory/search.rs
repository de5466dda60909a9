//! Similarity search.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::MemoryCoordinator;
use crate::error::{Error, OpContext, Result};
use crate::index::{PayloadPoint, SearchRequest};
use crate::providers::align_embeddings;
use crate::timeout::bounded;
use crate::types::{Memory, parse_id};

/// Per-request overrides; unset fields fall back to configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub score_threshold: Option<f32>,
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_score_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }
}

/// Search results, most similar first. `scores[i]` belongs to `memories[i]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHits {
    pub memories: Vec<Memory>,
    pub scores: Vec<f32>,
}

impl SearchHits {
    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Memory, f32)> {
        self.memories.iter().zip(self.scores.iter().copied())
    }
}

impl MemoryCoordinator {
    /// Memories of a session most similar to `query`.
    pub async fn search(&self, session_id: &str, query: &str, options: SearchOptions) -> Result<SearchHits> {
        parse_id("session id", session_id)?;
        if query.trim().is_empty() {
            return Err(Error::validation("query must not be empty"));
        }
        let limit = self.resolve_limit(options.limit)?;
        let score_threshold = options.score_threshold.or(self.score_threshold);

        let inputs = vec![query.to_string()];
        let ctx = OpContext::new("embed", session_id, 1);
        let vector = bounded(self.timeout, &ctx, async {
            let embeddings = self
                .embedder
                .embed(&inputs)
                .await
                .map_err(|e| Error::provider(ctx.clone(), e))?;
            align_embeddings(1, embeddings, self.dimension)
                .map_err(|e| Error::provider(ctx.clone(), e))
        })
        .await?
        .into_iter()
        .next()
        .unwrap_or_default();

        let request = SearchRequest {
            vector,
            limit,
            score_threshold,
        };
        let ctx = OpContext::new("search", session_id, limit);
        let hits = bounded(self.timeout, &ctx, async {
            self.index
                .search(session_id, request)
                .await
                .map_err(|e| Self::index_error(&ctx, e))
        })
        .await?;

        debug!(session = session_id, hits = hits.len(), "Search returned");
        if hits.is_empty() {
            return Ok(SearchHits::default());
        }

        let (points, scores): (Vec<PayloadPoint>, Vec<f32>) = hits
            .into_iter()
            .map(|hit| {
                (
                    PayloadPoint {
                        id: hit.id,
                        payload: hit.payload,
                    },
                    hit.score,
                )
            })
            .unzip();

        let joined = self.join(session_id, points, true).await?;
        let scores = joined.positions.iter().map(|&i| scores[i]).collect();

        Ok(SearchHits {
            memories: joined.memories,
            scores,
        })
    }
}

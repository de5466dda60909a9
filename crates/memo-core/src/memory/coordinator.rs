//! Memory coordinator state and deletion.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::MemoConfig;
use crate::error::{Error, OpContext, Result};
use crate::importance::ImportanceAnnotator;
use crate::index::{IndexError, VectorIndex};
use crate::providers::EmbeddingProvider;
use crate::store::DocumentStore;
use crate::timeout::bounded;
use crate::types::{ContentTopology, parse_id};

/// Writes memories to both backends and reads them back in index order.
pub struct MemoryCoordinator {
    pub(super) store: Arc<dyn DocumentStore>,
    pub(super) index: Arc<dyn VectorIndex>,
    pub(super) embedder: Arc<dyn EmbeddingProvider>,
    pub(super) annotator: Option<ImportanceAnnotator>,
    pub(super) topology: ContentTopology,
    pub(super) dimension: usize,
    pub(super) default_limit: usize,
    pub(super) score_threshold: Option<f32>,
    pub(super) timeout: Duration,
    pub(super) orphans: AtomicU64,
}

impl MemoryCoordinator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &MemoConfig,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            annotator: None,
            topology: config.memory.topology,
            dimension: config.vector.dimension,
            default_limit: config.memory.default_limit,
            score_threshold: config.memory.score_threshold,
            timeout: config.memory.timeout(),
            orphans: AtomicU64::new(0),
        }
    }

    /// Score importance of every ingested batch before it is written.
    pub fn with_annotator(mut self, annotator: ImportanceAnnotator) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn topology(&self) -> ContentTopology {
        self.topology
    }

    /// Points seen without a matching record, or records written without
    /// their point, since startup.
    pub fn orphan_count(&self) -> u64 {
        self.orphans.load(Ordering::Relaxed)
    }

    pub(super) fn record_orphans(&self, session_id: &str, count: usize, reason: &str) {
        if count == 0 {
            return;
        }
        let total = self.orphans.fetch_add(count as u64, Ordering::Relaxed) + count as u64;
        warn!(session = session_id, count, total, reason, "Consistency warning");
    }

    pub(super) fn resolve_limit(&self, limit: Option<usize>) -> Result<usize> {
        let limit = limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Err(Error::validation("limit must be greater than 0"));
        }
        Ok(limit)
    }

    /// Map an index failure, turning a missing collection into a missing
    /// session.
    pub(super) fn index_error(ctx: &OpContext, e: IndexError) -> Error {
        if e.is_not_found() {
            Error::not_found("session", &ctx.session_id)
        } else {
            Error::index(ctx.clone(), e)
        }
    }

    /// Remove memories from the document store and the vector index.
    ///
    /// Returns the number of memories removed: matching records under the
    /// dual-write topology, matching points under the payload topology. No
    /// match at all is `NotFound`.
    pub async fn delete_memories(&self, session_id: &str, ids: &[String]) -> Result<u64> {
        parse_id("session id", session_id)?;
        if ids.is_empty() {
            return Err(Error::validation("at least one memory id is required"));
        }
        for id in ids {
            parse_id("memory id", id)?;
        }
        let ids: Vec<String> = ids
            .iter()
            .map(|id| id.trim().to_string())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let deleted = match self.topology {
            ContentTopology::DualWrite => {
                let ctx = OpContext::new("delete_memories", session_id, ids.len());
                bounded(self.timeout, &ctx, async {
                    self.store
                        .delete_memories(session_id, &ids)
                        .await
                        .map_err(|e| Error::store(ctx.clone(), e))
                })
                .await?
            }
            ContentTopology::Payload => {
                let ctx = OpContext::new("existing_points", session_id, ids.len());
                let existing = bounded(self.timeout, &ctx, async {
                    self.index
                        .existing_points(session_id, &ids)
                        .await
                        .map_err(|e| Self::index_error(&ctx, e))
                })
                .await?;
                if existing.is_empty() {
                    return Err(Error::not_found("memory", ids.join(",")));
                }
                existing.len() as u64
            }
        };

        let ctx = OpContext::new("delete_points", session_id, ids.len());
        bounded(self.timeout, &ctx, async {
            self.index
                .delete_points(session_id, &ids, true)
                .await
                .map_err(|e| Self::index_error(&ctx, e))
        })
        .await?;

        if deleted == 0 {
            return Err(Error::not_found("memory", ids.join(",")));
        }
        if (deleted as usize) < ids.len() {
            warn!(
                session = session_id,
                requested = ids.len(),
                deleted,
                "Consistency warning: some memories had no record"
            );
        }

        info!(session = session_id, deleted, "Deleted memories");
        Ok(deleted)
    }
}

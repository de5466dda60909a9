//! Batch ingestion.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::MemoryCoordinator;
use crate::error::{Error, OpContext, Result};
use crate::index::Point;
use crate::providers::align_embeddings;
use crate::timeout::bounded;
use crate::types::{ContentTopology, Memory, MemoryPayload, NewMemory, parse_id};

impl MemoryCoordinator {
    /// Embed and store a batch of memories for a session.
    ///
    /// One embedding call and one upsert per batch, regardless of size.
    /// Returns the new memory ids in input order. A failure before the
    /// upsert writes nothing; a document-store failure after it leaves the
    /// points in place and is returned as `Error::Store`.
    pub async fn add_memories(&self, session_id: &str, batch: Vec<NewMemory>) -> Result<Vec<String>> {
        parse_id("session id", session_id)?;
        if batch.is_empty() {
            return Err(Error::validation("at least one memory is required"));
        }
        if batch.iter().any(|m| m.content.trim().is_empty()) {
            return Err(Error::validation("memory content must not be empty"));
        }

        let size = batch.len();

        let ctx = OpContext::new("collection_info", session_id, size);
        bounded(self.timeout, &ctx, async {
            self.index
                .collection_info(session_id)
                .await
                .map_err(|e| Self::index_error(&ctx, e))
        })
        .await?;

        let contents: Vec<String> = batch.iter().map(|m| m.content.clone()).collect();

        let ctx = OpContext::new("embed", session_id, size);
        let vectors = bounded(self.timeout, &ctx, async {
            let embeddings = self
                .embedder
                .embed(&contents)
                .await
                .map_err(|e| Error::provider(ctx.clone(), e))?;
            align_embeddings(size, embeddings, self.dimension)
                .map_err(|e| Error::provider(ctx.clone(), e))
        })
        .await?;

        let importance: Vec<Option<u8>> = match &self.annotator {
            Some(annotator) => annotator
                .score(&[], &contents)
                .await?
                .into_iter()
                .map(Some)
                .collect(),
            None => vec![None; size],
        };

        let created_at = Utc::now();
        let memories: Vec<Memory> = batch
            .into_iter()
            .zip(importance)
            .map(|(new, importance)| Memory {
                id: Uuid::new_v4().to_string(),
                session_id: session_id.to_string(),
                content: new.content,
                kind: new.kind,
                importance,
                created_at,
            })
            .collect();

        let points: Vec<Point> = memories
            .iter()
            .zip(vectors)
            .map(|(memory, vector)| Point {
                id: memory.id.clone(),
                vector,
                payload: MemoryPayload::for_memory(memory, self.topology),
            })
            .collect();

        let ctx = OpContext::new("upsert", session_id, size);
        bounded(self.timeout, &ctx, async {
            self.index
                .upsert(session_id, points, true)
                .await
                .map_err(|e| Self::index_error(&ctx, e))
        })
        .await?;
        debug!(session = session_id, batch = size, "Upserted points");

        if self.topology == ContentTopology::DualWrite {
            let ctx = OpContext::new("insert_memories", session_id, size);
            let inserted = bounded(self.timeout, &ctx, async {
                self.store
                    .insert_memories(&memories)
                    .await
                    .map_err(|e| Error::store(ctx.clone(), e))
            })
            .await;

            if let Err(e) = inserted {
                warn!(session = session_id, error = %e, "Points written without document records");
                self.record_orphans(session_id, size, "index points without a document record");
                return Err(e);
            }
        }

        info!(session = session_id, batch = size, "Added memories");
        Ok(memories.into_iter().map(|m| m.id).collect())
    }
}

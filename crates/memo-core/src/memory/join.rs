//! Rank-preserving join of index points with document records.

use std::collections::HashMap;

use super::MemoryCoordinator;
use crate::error::{Error, OpContext, Result};
use crate::index::PayloadPoint;
use crate::timeout::bounded;
use crate::types::Memory;

/// Memories in point order, with the point positions they came from.
pub(super) struct Joined {
    pub memories: Vec<Memory>,
    pub positions: Vec<usize>,
}

impl MemoryCoordinator {
    /// Resolve points to memories without reordering them.
    ///
    /// Content carried in the payload is used directly; document keys are
    /// fetched in one call. Points that resolve to nothing are dropped. With
    /// `strict`, dropping every point is `Error::Inconsistent`.
    pub(super) async fn join(
        &self,
        session_id: &str,
        points: Vec<PayloadPoint>,
        strict: bool,
    ) -> Result<Joined> {
        let keys: Vec<String> = points
            .iter()
            .filter(|p| p.payload.content.is_none())
            .filter_map(|p| p.payload.document_key.clone())
            .collect();

        let records: HashMap<String, Memory> = if keys.is_empty() {
            HashMap::new()
        } else {
            let ctx = OpContext::new("find_memories", session_id, keys.len());
            bounded(self.timeout, &ctx, async {
                self.store
                    .find_memories(&keys)
                    .await
                    .map_err(|e| Error::store(ctx.clone(), e))
            })
            .await?
            .into_iter()
            .filter(|m| m.session_id == session_id)
            .map(|m| (m.id.clone(), m))
            .collect()
        };

        let total = points.len();
        let mut memories = Vec::with_capacity(total);
        let mut positions = Vec::with_capacity(total);

        for (position, point) in points.into_iter().enumerate() {
            let payload = point.payload;
            let memory = match (payload.content, payload.document_key) {
                (Some(content), _) => Some(Memory {
                    id: point.id,
                    session_id: session_id.to_string(),
                    content,
                    kind: payload.kind,
                    importance: payload.importance,
                    created_at: payload.created_at,
                }),
                (None, Some(key)) => records.get(&key).cloned(),
                (None, None) => None,
            };

            if let Some(memory) = memory {
                memories.push(memory);
                positions.push(position);
            }
        }

        let orphans = total - memories.len();
        self.record_orphans(session_id, orphans, "index points without a document record");
        if strict && memories.is_empty() && orphans > 0 {
            return Err(Error::Inconsistent {
                session_id: session_id.to_string(),
                orphans,
            });
        }

        Ok(Joined {
            memories,
            positions,
        })
    }
}

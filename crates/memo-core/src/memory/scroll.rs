//! Cursor pagination over a session's memories.

use serde::{Deserialize, Serialize};

use super::MemoryCoordinator;
use crate::error::{OpContext, Result};
use crate::timeout::bounded;
use crate::types::{Memory, parse_id};

/// One page of memories in index order.
///
/// `next_cursor` is `None` once the listing is exhausted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryPage {
    pub memories: Vec<Memory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl MemoryCoordinator {
    /// List memories starting at `cursor`.
    ///
    /// Following `next_cursor` from an absent cursor visits every memory
    /// present for the whole walk exactly once. A page whose points all lack
    /// records comes back empty with its cursor intact.
    pub async fn list(&self, session_id: &str, cursor: Option<&str>, limit: Option<usize>) -> Result<MemoryPage> {
        parse_id("session id", session_id)?;
        let cursor = cursor.map(str::trim).filter(|c| !c.is_empty());
        if let Some(cursor) = cursor {
            parse_id("memory cursor", cursor)?;
        }
        let limit = self.resolve_limit(limit)?;

        let ctx = OpContext::new("scroll", session_id, limit);
        let page = bounded(self.timeout, &ctx, async {
            self.index
                .scroll(session_id, cursor, limit)
                .await
                .map_err(|e| Self::index_error(&ctx, e))
        })
        .await?;

        let next_cursor = page.next_offset.filter(|c| !c.is_empty());
        if page.points.is_empty() {
            return Ok(MemoryPage {
                memories: Vec::new(),
                next_cursor,
            });
        }

        let joined = self.join(session_id, page.points, false).await?;
        Ok(MemoryPage {
            memories: joined.memories,
            next_cursor,
        })
    }
}

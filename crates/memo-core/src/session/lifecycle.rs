//! Session lifecycle manager.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MemoConfig;
use crate::error::{Error, OpContext, Result};
use crate::index::{Distance, VectorIndex};
use crate::store::{DocumentStore, SessionRange};
use crate::timeout::bounded;
use crate::types::{Session, parse_id};

/// Input for session creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NewSession {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Changes to a session record. Absent fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Creates, lists and destroys sessions together with their collections.
pub struct SessionLifecycleManager {
    store: Arc<dyn DocumentStore>,
    index: Arc<dyn VectorIndex>,
    dimension: usize,
    distance: Distance,
    default_limit: usize,
    timeout: Duration,
}

impl SessionLifecycleManager {
    pub fn new(store: Arc<dyn DocumentStore>, index: Arc<dyn VectorIndex>, config: &MemoConfig) -> Self {
        Self {
            store,
            index,
            dimension: config.vector.dimension,
            distance: config.vector.distance,
            default_limit: config.memory.default_limit,
            timeout: config.memory.timeout(),
        }
    }

    /// Make sure the session's collection exists.
    ///
    /// Returns `true` when this call created it. Losing a creation race to a
    /// concurrent caller counts as success.
    pub async fn ensure_collection(&self, session_id: &str) -> Result<bool> {
        parse_id("session id", session_id)?;

        let ctx = OpContext::new("collection_info", session_id, 0);
        let exists = bounded(self.timeout, &ctx, async {
            match self.index.collection_info(session_id).await {
                Ok(_) => Ok(true),
                Err(e) if e.is_not_found() => Ok(false),
                Err(e) => Err(Error::index(ctx.clone(), e)),
            }
        })
        .await?;

        if exists {
            debug!(session = session_id, "Collection already present");
            return Ok(false);
        }

        let ctx = OpContext::new("create_collection", session_id, 0);
        bounded(self.timeout, &ctx, async {
            match self
                .index
                .create_collection(session_id, self.dimension, self.distance)
                .await
            {
                Ok(()) => {
                    info!(session = session_id, dimension = self.dimension, "Created collection");
                    Ok(true)
                }
                Err(e) if e.is_already_exists() => {
                    debug!(session = session_id, "Collection created concurrently");
                    Ok(false)
                }
                Err(e) => Err(Error::index(ctx.clone(), e)),
            }
        })
        .await
    }

    /// Create a session record, then its collection.
    ///
    /// If the collection cannot be created the record is kept and
    /// `Error::IndexNotReady` carries the new session.
    pub async fn create_session(&self, new: NewSession) -> Result<Session> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(Error::validation("session name must not be empty"));
        }

        let session = Session {
            id: Uuid::now_v7().to_string(),
            name: name.to_string(),
            tags: new.tags,
            created_at: Utc::now(),
        };

        let ctx = OpContext::new("insert_session", &session.id, 1);
        bounded(self.timeout, &ctx, async {
            self.store
                .insert_session(&session)
                .await
                .map_err(|e| Error::store(ctx.clone(), e))
        })
        .await?;

        if let Err(e) = self.ensure_collection(&session.id).await {
            warn!(session = %session.id, error = %e, "Session created without a collection");
            return Err(Error::IndexNotReady {
                session: Box::new(session),
                source: Box::new(e),
            });
        }

        info!(session = %session.id, name = %session.name, "Created session");
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        parse_id("session id", session_id)?;

        let ctx = OpContext::new("find_session", session_id, 1);
        bounded(self.timeout, &ctx, async {
            self.store.find_session(session_id).await.map_err(|e| {
                if e.is_not_found() {
                    Error::not_found("session", session_id)
                } else {
                    Error::store(ctx.clone(), e)
                }
            })
        })
        .await
    }

    /// Rename or retag a session. The collection is not touched.
    pub async fn update_session(&self, session_id: &str, update: SessionUpdate) -> Result<Session> {
        let name = match update.name.as_deref().map(str::trim) {
            Some("") => return Err(Error::validation("session name must not be empty")),
            other => other.map(str::to_string),
        };

        let mut session = self.get_session(session_id).await?;
        if let Some(name) = name {
            session.name = name;
        }
        if let Some(tags) = update.tags {
            session.tags = tags;
        }

        let ctx = OpContext::new("update_session", session_id, 1);
        let updated = bounded(self.timeout, &ctx, async {
            self.store
                .update_session(&session)
                .await
                .map_err(|e| Error::store(ctx.clone(), e))
        })
        .await?;

        // deleted between the read and the write
        if updated == 0 {
            return Err(Error::not_found("session", session_id));
        }

        info!(session = session_id, name = %session.name, "Updated session");
        Ok(session)
    }

    /// Sessions strictly older than `cursor`, newest first.
    ///
    /// The last session's id is the cursor for the next page; an empty page
    /// means the listing is exhausted.
    pub async fn list_sessions(&self, cursor: Option<&str>, limit: Option<usize>) -> Result<Vec<Session>> {
        let cursor = cursor.map(str::trim).filter(|c| !c.is_empty());
        if let Some(cursor) = cursor {
            parse_id("session cursor", cursor)?;
        }
        let limit = limit.unwrap_or(self.default_limit);
        if limit == 0 {
            return Err(Error::validation("limit must be greater than 0"));
        }

        let range = SessionRange {
            before: cursor.map(str::to_string),
            limit,
        };
        let ctx = OpContext::new("find_sessions", cursor.unwrap_or("-"), limit);
        bounded(self.timeout, &ctx, async {
            self.store
                .find_sessions(&range)
                .await
                .map_err(|e| Error::store(ctx.clone(), e))
        })
        .await
    }

    /// Delete the session record, its memory records and its collection.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        parse_id("session id", session_id)?;

        let ctx = OpContext::new("delete_session", session_id, 1);
        let deleted = bounded(self.timeout, &ctx, async {
            self.store
                .delete_session(session_id)
                .await
                .map_err(|e| Error::store(ctx.clone(), e))
        })
        .await?;

        if deleted == 0 {
            return Err(Error::not_found("session", session_id));
        }

        let ctx = OpContext::new("delete_session_memories", session_id, 0);
        let cascade = bounded(self.timeout, &ctx, async {
            self.store
                .delete_session_memories(session_id)
                .await
                .map_err(|e| Error::store(ctx.clone(), e))
        })
        .await;
        match cascade {
            Ok(count) => debug!(session = session_id, count, "Removed memory records"),
            Err(e) => warn!(session = session_id, error = %e, "Orphaned memory records left behind"),
        }

        let ctx = OpContext::new("delete_collection", session_id, 0);
        let dropped = bounded(self.timeout, &ctx, async {
            self.index
                .delete_collection(session_id)
                .await
                .map_err(|e| Error::index(ctx.clone(), e))
        })
        .await;

        match dropped {
            Ok(()) => {}
            Err(Error::Index { source, .. }) if source.is_not_found() => {
                debug!(session = session_id, "Collection was already gone");
            }
            Err(e) => {
                warn!(session = session_id, error = %e, "Orphaned collection left behind");
                return Err(Error::OrphanedCollection {
                    session_id: session_id.to_string(),
                    source: Box::new(e),
                });
            }
        }

        info!(session = session_id, "Deleted session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteDocumentStore;
    use crate::testing::{FlakyStore, InMemoryVectorIndex};
    use std::sync::atomic::Ordering;

    struct Fixture {
        index: Arc<InMemoryVectorIndex>,
        store: Arc<FlakyStore>,
        manager: SessionLifecycleManager,
    }

    fn fixture() -> Fixture {
        let index = Arc::new(InMemoryVectorIndex::new());
        let store = Arc::new(FlakyStore::new(Arc::new(
            SqliteDocumentStore::open_in_memory().unwrap(),
        )));
        let config = MemoConfig::default().with_dimension(4);
        let manager = SessionLifecycleManager::new(store.clone(), index.clone(), &config);
        Fixture {
            index,
            store,
            manager,
        }
    }

    #[tokio::test]
    async fn test_create_session_creates_collection() {
        let f = fixture();
        let session = f.manager.create_session(NewSession::named("May")).await.unwrap();

        assert!(f.index.has_collection(&session.id));
        let fetched = f.manager.get_session(&session.id).await.unwrap();
        assert_eq!(fetched.name, "May");
    }

    #[tokio::test]
    async fn test_create_session_rejects_blank_name() {
        let f = fixture();
        let err = f.manager.create_session(NewSession::named("  ")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_session_index_not_ready() {
        let f = fixture();
        f.index.fail_create.store(true, Ordering::SeqCst);

        let err = f.manager.create_session(NewSession::named("May")).await.unwrap_err();
        let session = match err {
            Error::IndexNotReady { session, .. } => session,
            other => panic!("expected IndexNotReady, got {other:?}"),
        };

        // record survives; ensure can be retried
        assert!(f.manager.get_session(&session.id).await.is_ok());
        assert!(!f.index.has_collection(&session.id));

        f.index.fail_create.store(false, Ordering::SeqCst);
        assert!(f.manager.ensure_collection(&session.id).await.unwrap());
        assert!(f.index.has_collection(&session.id));
    }

    #[tokio::test]
    async fn test_ensure_collection_is_idempotent() {
        let f = fixture();
        let id = Uuid::now_v7().to_string();

        assert!(f.manager.ensure_collection(&id).await.unwrap());
        assert!(!f.manager.ensure_collection(&id).await.unwrap());
        assert_eq!(f.index.create_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ensure_collection_tolerates_race() {
        let f = fixture();
        let id = Uuid::now_v7().to_string();
        f.manager.ensure_collection(&id).await.unwrap();

        // lookup misses, create then reports AlreadyExists
        f.index.hide_collections.store(true, Ordering::SeqCst);
        assert!(!f.manager.ensure_collection(&id).await.unwrap());
        assert_eq!(f.index.create_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_ensure_collection_rejects_malformed_id() {
        let f = fixture();
        let err = f.manager.ensure_collection("../etc").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(f.index.create_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_list_sessions_pagination() {
        let f = fixture();
        let mut created = Vec::new();
        for i in 0..7 {
            let s = f
                .manager
                .create_session(NewSession::named(format!("s{i}")))
                .await
                .unwrap();
            created.push(s.id);
        }

        let mut seen = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = f.manager.list_sessions(cursor.as_deref(), Some(3)).await.unwrap();
            if page.is_empty() {
                break;
            }
            assert!(page.len() <= 3);
            // newest first within a page
            assert!(page.windows(2).all(|w| w[0].id > w[1].id));
            cursor = page.last().map(|s| s.id.clone());
            seen.extend(page.into_iter().map(|s| s.id));
        }

        // every session exactly once
        let mut expected = created.clone();
        expected.sort();
        let mut got = seen.clone();
        got.sort();
        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn test_list_sessions_default_limit() {
        let f = fixture();
        for i in 0..7 {
            f.manager
                .create_session(NewSession::named(format!("s{i}")))
                .await
                .unwrap();
        }
        assert_eq!(f.manager.list_sessions(None, None).await.unwrap().len(), 5);
        assert!(f.manager.list_sessions(Some("nope"), None).await.is_err());
        assert!(f.manager.list_sessions(None, Some(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_list_sessions_trims_cursor() {
        let f = fixture();
        let mut ids = Vec::new();
        for i in 0..3 {
            let s = f
                .manager
                .create_session(NewSession::named(format!("s{i}")))
                .await
                .unwrap();
            ids.push(s.id);
        }
        ids.sort();

        let padded = format!("  {} ", ids[2]);
        let page = f.manager.list_sessions(Some(&padded), None).await.unwrap();
        let got: Vec<_> = page.into_iter().map(|s| s.id).collect();
        assert_eq!(got, vec![ids[1].clone(), ids[0].clone()]);

        // blank cursor is the first page
        assert_eq!(f.manager.list_sessions(Some("  "), None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_session() {
        let f = fixture();
        let session = f
            .manager
            .create_session(NewSession::named("May").with_tags(vec!["npc".into()]))
            .await
            .unwrap();
        let creates = f.index.create_calls.load(Ordering::SeqCst);

        let updated = f
            .manager
            .update_session(
                &session.id,
                SessionUpdate {
                    name: Some(" June ".into()),
                    tags: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "June");
        assert_eq!(updated.tags, vec!["npc".to_string()]);
        assert_eq!(
            updated.created_at.timestamp_millis(),
            session.created_at.timestamp_millis()
        );

        let fetched = f.manager.get_session(&session.id).await.unwrap();
        assert_eq!(fetched.name, "June");
        assert_eq!(f.index.create_calls.load(Ordering::SeqCst), creates);
        assert!(f.index.has_collection(&session.id));
    }

    #[tokio::test]
    async fn test_update_session_errors() {
        let f = fixture();
        let missing = Uuid::now_v7().to_string();
        let err = f
            .manager
            .update_session(&missing, SessionUpdate::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let session = f.manager.create_session(NewSession::named("May")).await.unwrap();
        let err = f
            .manager
            .update_session(
                &session.id,
                SessionUpdate {
                    name: Some("   ".into()),
                    tags: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = f
            .manager
            .update_session("not-a-uuid", SessionUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_session() {
        let f = fixture();
        let session = f.manager.create_session(NewSession::named("May")).await.unwrap();

        f.manager.delete_session(&session.id).await.unwrap();
        assert!(!f.index.has_collection(&session.id));
        assert!(f.manager.get_session(&session.id).await.unwrap_err().is_not_found());

        let err = f.manager.delete_session(&session.id).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_session_orphaned_collection() {
        let f = fixture();
        let session = f.manager.create_session(NewSession::named("May")).await.unwrap();
        f.index.fail_delete_collection.store(true, Ordering::SeqCst);

        let err = f.manager.delete_session(&session.id).await.unwrap_err();
        assert!(matches!(err, Error::OrphanedCollection { .. }));
        // the record is gone even though the collection remains
        assert!(f.manager.get_session(&session.id).await.unwrap_err().is_not_found());
        assert!(f.index.has_collection(&session.id));
    }

    #[tokio::test]
    async fn test_delete_session_cascade_failure_is_tolerated() {
        let f = fixture();
        let session = f.manager.create_session(NewSession::named("May")).await.unwrap();
        f.store.fail_delete_session_memories.store(true, Ordering::SeqCst);

        f.manager.delete_session(&session.id).await.unwrap();
        assert!(!f.index.has_collection(&session.id));
    }
}

//! SQLite document store.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tokio::sync::Mutex;
use tracing::info;

use super::migrations::run_migrations;
use super::{DocumentStore, SessionRange, StoreError, StoreResult};
use crate::types::{Memory, MemoryKind, Session};

/// Document store backed by a single SQLite connection.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteDocumentStore {
    /// Open (or create) the database file and run migrations.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("{}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        run_migrations(&conn)?;

        info!("Opened document store at {}", path.display());
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
        }
    }
}

fn timestamp(millis: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {millis}")))
}

struct SessionRow {
    id: String,
    name: String,
    tags_json: String,
    created_at: i64,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            tags_json: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn into_session(self) -> StoreResult<Session> {
        Ok(Session {
            id: self.id,
            name: self.name,
            tags: serde_json::from_str(&self.tags_json)?,
            created_at: timestamp(self.created_at)?,
        })
    }
}

struct MemoryRow {
    id: String,
    session_id: String,
    content: String,
    kind: String,
    importance: Option<i64>,
    created_at: i64,
}

impl MemoryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            session_id: row.get(1)?,
            content: row.get(2)?,
            kind: row.get(3)?,
            importance: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_memory(self) -> StoreResult<Memory> {
        let kind: MemoryKind = self
            .kind
            .parse()
            .map_err(|_| StoreError::Corrupt(format!("memory {} has kind {:?}", self.id, self.kind)))?;
        let importance = self
            .importance
            .map(|v| {
                u8::try_from(v).map_err(|_| {
                    StoreError::Corrupt(format!("memory {} has importance {v}", self.id))
                })
            })
            .transpose()?;

        Ok(Memory {
            id: self.id,
            session_id: self.session_id,
            content: self.content,
            kind,
            importance,
            created_at: timestamp(self.created_at)?,
        })
    }
}

fn placeholders(count: usize, first: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO sessions (id, name, tags_json, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                &session.id,
                &session.name,
                serde_json::to_string(&session.tags)?,
                session.created_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    async fn find_session(&self, id: &str) -> StoreResult<Session> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                "SELECT id, name, tags_json, created_at FROM sessions WHERE id = ?1",
                params![id],
                SessionRow::from_row,
            )
            .optional()?;

        row.ok_or_else(|| StoreError::NotFound {
            entity: "session",
            id: id.to_string(),
        })?
        .into_session()
    }

    async fn find_sessions(&self, range: &SessionRange) -> StoreResult<Vec<Session>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, name, tags_json, created_at FROM sessions
             WHERE ?1 IS NULL OR id < ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![&range.before, range.limit as i64], SessionRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    async fn update_session(&self, session: &Session) -> StoreResult<u64> {
        let db = self.db.lock().await;
        let updated = db.execute(
            "UPDATE sessions SET name = ?2, tags_json = ?3 WHERE id = ?1",
            params![
                &session.id,
                &session.name,
                serde_json::to_string(&session.tags)?,
            ],
        )?;
        Ok(updated as u64)
    }

    async fn delete_session(&self, id: &str) -> StoreResult<u64> {
        let db = self.db.lock().await;
        let deleted = db.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(deleted as u64)
    }

    async fn insert_memories(&self, memories: &[Memory]) -> StoreResult<()> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO memories (id, session_id, content, kind, importance, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for memory in memories {
                stmt.execute(params![
                    &memory.id,
                    &memory.session_id,
                    &memory.content,
                    memory.kind.as_str(),
                    memory.importance.map(i64::from),
                    memory.created_at.timestamp_millis(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    async fn find_memories(&self, keys: &[String]) -> StoreResult<Vec<Memory>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let db = self.db.lock().await;
        let sql = format!(
            "SELECT id, session_id, content, kind, importance, created_at FROM memories
             WHERE id IN ({})",
            placeholders(keys.len(), 1)
        );
        let mut stmt = db.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(keys.iter()), MemoryRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(MemoryRow::into_memory).collect()
    }

    async fn delete_memories(&self, session_id: &str, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let db = self.db.lock().await;
        let sql = format!(
            "DELETE FROM memories WHERE session_id = ?1 AND id IN ({})",
            placeholders(keys.len(), 2)
        );
        let values = std::iter::once(session_id).chain(keys.iter().map(String::as_str));
        let deleted = db.execute(&sql, params_from_iter(values))?;
        Ok(deleted as u64)
    }

    async fn delete_session_memories(&self, session_id: &str) -> StoreResult<u64> {
        let db = self.db.lock().await;
        let deleted = db.execute(
            "DELETE FROM memories WHERE session_id = ?1",
            params![session_id],
        )?;
        Ok(deleted as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn session(id: &str, name: &str) -> Session {
        Session {
            id: id.to_string(),
            name: name.to_string(),
            tags: vec!["npc".into()],
            created_at: DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap(),
        }
    }

    fn memory(session_id: &str, content: &str) -> Memory {
        Memory {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            content: content.to_string(),
            kind: MemoryKind::Basic,
            importance: Some(4),
            created_at: DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let s = session("0190a000-0000-7000-8000-000000000001", "May");

        store.insert_session(&s).await.unwrap();
        assert_eq!(store.find_session(&s.id).await.unwrap(), s);

        let err = store.find_session("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_session_rejected() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let s = session("0190a000-0000-7000-8000-000000000001", "May");
        store.insert_session(&s).await.unwrap();
        assert!(store.insert_session(&s).await.is_err());
    }

    #[tokio::test]
    async fn test_find_sessions_range() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        for i in 1..=5 {
            let id = format!("0190a000-0000-7000-8000-00000000000{i}");
            store.insert_session(&session(&id, &format!("s{i}"))).await.unwrap();
        }

        let page = store
            .find_sessions(&SessionRange { before: None, limit: 2 })
            .await
            .unwrap();
        let names: Vec<_> = page.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["s5", "s4"]);

        let page = store
            .find_sessions(&SessionRange {
                before: Some(page[1].id.clone()),
                limit: 10,
            })
            .await
            .unwrap();
        let names: Vec<_> = page.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["s3", "s2", "s1"]);
    }

    #[tokio::test]
    async fn test_update_session() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let mut s = session("0190a000-0000-7000-8000-000000000001", "May");
        store.insert_session(&s).await.unwrap();

        s.name = "June".into();
        s.tags = vec![];
        assert_eq!(store.update_session(&s).await.unwrap(), 1);
        let found = store.find_session(&s.id).await.unwrap();
        assert_eq!(found.name, "June");
        assert!(found.tags.is_empty());
        assert_eq!(found.created_at, s.created_at);

        let ghost = session("0190a000-0000-7000-8000-000000000009", "ghost");
        assert_eq!(store.update_session(&ghost).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_session_counts() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let s = session("0190a000-0000-7000-8000-000000000001", "May");
        store.insert_session(&s).await.unwrap();

        assert_eq!(store.delete_session(&s.id).await.unwrap(), 1);
        assert_eq!(store.delete_session(&s.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memories_by_keys() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let a = memory("s-1", "My name is May.");
        let b = memory("s-1", "I am 30 years old.");
        store.insert_memories(&[a.clone(), b.clone()]).await.unwrap();

        let found = store
            .find_memories(&[b.id.clone(), "missing".into(), a.id.clone()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.contains(&a));
        assert!(found.contains(&b));

        assert!(store.find_memories(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_memories_is_atomic() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let a = memory("s-1", "first");
        store.insert_memories(&[a.clone()]).await.unwrap();

        // second batch collides on `a` and must leave `b` unwritten
        let b = memory("s-1", "second");
        assert!(store.insert_memories(&[b.clone(), a.clone()]).await.is_err());
        assert!(store.find_memories(&[b.id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_memories_scoped_to_session() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let a = memory("s-1", "mine");
        let b = memory("s-2", "theirs");
        store.insert_memories(&[a.clone(), b.clone()]).await.unwrap();

        let deleted = store
            .delete_memories("s-1", &[a.id.clone(), b.id.clone()])
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.find_memories(&[b.id.clone()]).await.unwrap().len(), 1);

        assert_eq!(store.delete_session_memories("s-2").await.unwrap(), 1);
        assert!(store.find_memories(&[b.id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_file_backed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("memo.db");
        let s = session("0190a000-0000-7000-8000-000000000001", "May");

        {
            let store = SqliteDocumentStore::open(&path).unwrap();
            store.insert_session(&s).await.unwrap();
        }

        let reopened = SqliteDocumentStore::open(&path).unwrap();
        assert_eq!(reopened.find_session(&s.id).await.unwrap().name, "May");
    }
}

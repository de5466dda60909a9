//! Deterministic in-process backends for tests.
//!
//! Enabled with the `testing` feature. Every double counts its calls so tests
//! can assert batching, and exposes switches to inject failures.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::index::{
    CollectionInfo, Distance, IndexError, IndexResult, PayloadPoint, Point, ScoredPoint,
    ScrollPage, SearchRequest, VectorIndex,
};
use crate::providers::{ChatMessage, CompletionProvider, Embedding, EmbeddingProvider, ProviderError};
use crate::store::{DocumentStore, SessionRange, StoreError, StoreResult};
use crate::types::{Memory, MemoryPayload, Session};

/// Cosine similarity; 0 for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ─────────────────────────────────────────────────────────────────────────────
// Vector index
// ─────────────────────────────────────────────────────────────────────────────

struct Collection {
    dimension: usize,
    points: BTreeMap<String, (Vec<f32>, MemoryPayload)>,
}

/// Brute-force vector index. Scroll order is ascending point id.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    collections: Mutex<HashMap<String, Collection>>,
    pub fail_create: AtomicBool,
    pub fail_delete_collection: AtomicBool,
    pub fail_upsert: AtomicBool,
    /// Report `NotFound` on lookup even when the collection exists, so
    /// a create races with an existing collection.
    pub hide_collections: AtomicBool,
    pub upsert_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub scroll_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn point_count(&self, name: &str) -> usize {
        self.lock().get(name).map(|c| c.points.len()).unwrap_or(0)
    }

    pub fn payload(&self, name: &str, id: &str) -> Option<MemoryPayload> {
        self.lock()
            .get(name)
            .and_then(|c| c.points.get(id))
            .map(|(_, payload)| payload.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Collection>> {
        self.collections.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn injected(flag: &AtomicBool, what: &str) -> IndexResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(IndexError::Transport(format!("injected {what} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn collection_info(&self, name: &str) -> IndexResult<CollectionInfo> {
        if self.hide_collections.load(Ordering::SeqCst) {
            return Err(IndexError::NotFound(name.to_string()));
        }
        let collections = self.lock();
        let collection = collections
            .get(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;
        Ok(CollectionInfo {
            name: name.to_string(),
            points_count: Some(collection.points.len() as u64),
        })
    }

    async fn create_collection(&self, name: &str, dimension: usize, _distance: Distance) -> IndexResult<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_create, "create")?;

        let mut collections = self.lock();
        if collections.contains_key(name) {
            return Err(IndexError::AlreadyExists(name.to_string()));
        }
        collections.insert(
            name.to_string(),
            Collection {
                dimension,
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> IndexResult<()> {
        Self::injected(&self.fail_delete_collection, "delete collection")?;
        self.lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| IndexError::NotFound(name.to_string()))
    }

    async fn upsert(&self, name: &str, points: Vec<Point>, _wait: bool) -> IndexResult<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_upsert, "upsert")?;

        let mut collections = self.lock();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != collection.dimension) {
            return Err(IndexError::Status {
                status: 400,
                message: format!("point {} has wrong dimension", bad.id),
            });
        }
        for point in points {
            collection.points.insert(point.id, (point.vector, point.payload));
        }
        Ok(())
    }

    async fn search(&self, name: &str, request: SearchRequest) -> IndexResult<Vec<ScoredPoint>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        let collections = self.lock();
        let collection = collections
            .get(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;

        let mut hits: Vec<ScoredPoint> = collection
            .points
            .iter()
            .map(|(id, (vector, payload))| ScoredPoint {
                id: id.clone(),
                score: cosine_similarity(&request.vector, vector),
                payload: payload.clone(),
            })
            .filter(|hit| request.score_threshold.is_none_or(|t| hit.score >= t))
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(request.limit);
        Ok(hits)
    }

    async fn scroll(&self, name: &str, offset: Option<&str>, limit: usize) -> IndexResult<ScrollPage> {
        self.scroll_calls.fetch_add(1, Ordering::SeqCst);

        let collections = self.lock();
        let collection = collections
            .get(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;

        let mut remaining = collection
            .points
            .iter()
            .filter(|(id, _)| offset.is_none_or(|o| id.as_str() >= o));

        let points: Vec<PayloadPoint> = remaining
            .by_ref()
            .take(limit)
            .map(|(id, (_, payload))| PayloadPoint {
                id: id.clone(),
                payload: payload.clone(),
            })
            .collect();
        let next_offset = remaining.next().map(|(id, _)| id.clone());

        Ok(ScrollPage { points, next_offset })
    }

    async fn existing_points(&self, name: &str, ids: &[String]) -> IndexResult<Vec<String>> {
        let collections = self.lock();
        let collection = collections
            .get(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;
        Ok(ids
            .iter()
            .filter(|id| collection.points.contains_key(id.as_str()))
            .cloned()
            .collect())
    }

    async fn delete_points(&self, name: &str, ids: &[String], _wait: bool) -> IndexResult<()> {
        let mut collections = self.lock();
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;
        for id in ids {
            collection.points.remove(id);
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Providers
// ─────────────────────────────────────────────────────────────────────────────

/// Embedder with fixed vectors per text.
///
/// Unknown texts get a deterministic vector derived from their bytes.
pub struct ScriptedEmbedder {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
    /// Return response items in reverse input order.
    pub reverse: AtomicBool,
    pub fail: AtomicBool,
    /// Sleep before answering.
    pub delay: Mutex<Option<Duration>>,
    pub calls: AtomicUsize,
    pub inputs: Mutex<Vec<Vec<String>>>,
}

impl ScriptedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
            reverse: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(v) = self.vectors.get(text) {
            return v.clone();
        }
        let mut v = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            v[i % self.dimension] += byte as f32 / 255.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Embedding>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(inputs.to_vec());

        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                status: 503,
                body: "injected embedding failure".into(),
            });
        }

        let mut out: Vec<Embedding> = inputs
            .iter()
            .enumerate()
            .map(|(index, text)| Embedding {
                index,
                vector: self.vector_for(text),
            })
            .collect();
        if self.reverse.load(Ordering::SeqCst) {
            out.reverse();
        }
        Ok(out)
    }
}

/// Completion model that replays queued replies.
#[derive(Default)]
pub struct ScriptedCompleter {
    replies: Mutex<VecDeque<Result<String, String>>>,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedCompleter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    pub fn fail_next(self, message: impl Into<String>) -> Self {
        self.push(Err(message.into()));
        self
    }

    fn push(&self, reply: Result<String, String>) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<Vec<ChatMessage>> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompleter {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());

        let next = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(ProviderError::Transport(message)),
            None => Err(ProviderError::Malformed("no scripted reply left".into())),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Document store
// ─────────────────────────────────────────────────────────────────────────────

/// Wraps a document store and fails selected operations on demand.
pub struct FlakyStore {
    inner: Arc<dyn DocumentStore>,
    pub fail_insert_memories: AtomicBool,
    pub fail_find_memories: AtomicBool,
    pub fail_delete_session_memories: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self {
            inner,
            fail_insert_memories: AtomicBool::new(false),
            fail_find_memories: AtomicBool::new(false),
            fail_delete_session_memories: AtomicBool::new(false),
        }
    }

    fn injected(flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(format!("injected {what} failure")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn insert_session(&self, session: &Session) -> StoreResult<()> {
        self.inner.insert_session(session).await
    }

    async fn find_session(&self, id: &str) -> StoreResult<Session> {
        self.inner.find_session(id).await
    }

    async fn find_sessions(&self, range: &SessionRange) -> StoreResult<Vec<Session>> {
        self.inner.find_sessions(range).await
    }

    async fn update_session(&self, session: &Session) -> StoreResult<u64> {
        self.inner.update_session(session).await
    }

    async fn delete_session(&self, id: &str) -> StoreResult<u64> {
        self.inner.delete_session(id).await
    }

    async fn insert_memories(&self, memories: &[Memory]) -> StoreResult<()> {
        Self::injected(&self.fail_insert_memories, "insert")?;
        self.inner.insert_memories(memories).await
    }

    async fn find_memories(&self, keys: &[String]) -> StoreResult<Vec<Memory>> {
        Self::injected(&self.fail_find_memories, "find")?;
        self.inner.find_memories(keys).await
    }

    async fn delete_memories(&self, session_id: &str, keys: &[String]) -> StoreResult<u64> {
        self.inner.delete_memories(session_id, keys).await
    }

    async fn delete_session_memories(&self, session_id: &str) -> StoreResult<u64> {
        Self::injected(&self.fail_delete_session_memories, "cascade")?;
        self.inner.delete_session_memories(session_id).await
    }
}

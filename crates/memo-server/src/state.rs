//! Application state.

use std::sync::Arc;
use std::time::Instant;

use memo_core::index::{QdrantIndex, VectorIndex};
use memo_core::providers::{CompletionProvider, EmbeddingProvider, OpenAiClient};
use memo_core::store::{DocumentStore, SqliteDocumentStore};
use memo_core::{ImportanceAnnotator, MemoConfig, MemoryCoordinator, SessionLifecycleManager};

/// Shared application state
pub struct AppState {
    /// Immutable configuration
    pub config: Arc<MemoConfig>,
    pub sessions: SessionLifecycleManager,
    pub memories: MemoryCoordinator,
    /// Standalone scorer, also used by ingestion when enabled
    pub annotator: ImportanceAnnotator,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Wire the components over the given backends.
    pub fn new(
        config: MemoConfig,
        store: Arc<dyn DocumentStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        completer: Arc<dyn CompletionProvider>,
    ) -> Arc<Self> {
        let annotator = ImportanceAnnotator::new(completer, &config);
        let sessions = SessionLifecycleManager::new(store.clone(), index.clone(), &config);
        let mut memories = MemoryCoordinator::new(store, index, embedder, &config);
        if config.memory.score_importance {
            memories = memories.with_annotator(annotator.clone());
        }

        Arc::new(Self {
            config: Arc::new(config),
            sessions,
            memories,
            annotator,
            start_time: Instant::now(),
        })
    }

    /// Open the SQLite store and connect the Qdrant and OpenAI clients.
    pub fn from_config(config: MemoConfig) -> anyhow::Result<Arc<Self>> {
        let timeout = config.memory.timeout();
        let store = Arc::new(SqliteDocumentStore::open(&config.store.database_path)?);
        let index = Arc::new(QdrantIndex::new(&config.vector, timeout)?);
        let openai = Arc::new(OpenAiClient::new(&config.provider, timeout)?);

        Ok(Self::new(config, store, index, openai.clone(), openai))
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use memo_core::testing::{InMemoryVectorIndex, ScriptedCompleter, ScriptedEmbedder};

    pub struct TestState {
        pub state: Arc<AppState>,
        pub index: Arc<InMemoryVectorIndex>,
        pub completer: Arc<ScriptedCompleter>,
    }

    /// State over in-process backends with 4-dimensional vectors.
    pub fn test_state(completer: ScriptedCompleter) -> TestState {
        let config = MemoConfig::default().with_dimension(4);
        let store = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
        let index = Arc::new(InMemoryVectorIndex::new());
        let embedder = Arc::new(
            ScriptedEmbedder::new(4)
                .with_vector("My name is May.", vec![1.0, 0.0, 0.0, 0.0])
                .with_vector("I am 14 years old.", vec![0.0, 1.0, 0.0, 0.0])
                .with_vector("your age", vec![0.05, 0.98, 0.1, 0.02]),
        );
        let completer = Arc::new(completer);

        let state = AppState::new(config, store, index.clone(), embedder, completer.clone());
        TestState {
            state,
            index,
            completer,
        }
    }
}

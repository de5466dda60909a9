//! memo-core - Core library for Memo
//!
//! Stores short text memories on behalf of sessions and retrieves them by
//! recency or by semantic similarity. Two independently failing backends are
//! kept in step:
//!
//! - **store**: the canonical document store (sessions, memory records)
//! - **index**: the vector index, one collection per session
//! - **providers**: embedding and completion model clients
//! - **session**: session lifecycle (record + collection created and destroyed together)
//! - **memory**: ingestion, similarity search and scroll pagination
//! - **importance**: importance scoring of memories through a completion model
//! - **config**: TOML + environment configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use memo_core::{MemoConfig, MemoryCoordinator, SessionLifecycleManager};
//! use memo_core::index::QdrantIndex;
//! use memo_core::providers::OpenAiClient;
//! use memo_core::session::NewSession;
//! use memo_core::store::SqliteDocumentStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MemoConfig::load()?;
//!     let store = Arc::new(SqliteDocumentStore::open(&config.store.database_path)?);
//!     let index = Arc::new(QdrantIndex::new(&config.vector, config.memory.timeout())?);
//!     let openai = Arc::new(OpenAiClient::new(&config.provider, config.memory.timeout())?);
//!
//!     let sessions = SessionLifecycleManager::new(store.clone(), index.clone(), &config);
//!     let memories = MemoryCoordinator::new(store, index, openai, &config);
//!
//!     let session = sessions.create_session(NewSession::named("May")).await?;
//!     memories.add_memories(&session.id, vec!["My name is May.".into()]).await?;
//!     let _hits = memories.search(&session.id, "What is your name?", Default::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod importance;
pub mod index;
pub mod memory;
pub mod providers;
pub mod session;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

mod timeout;

// Re-export commonly used types
pub use config::MemoConfig;
pub use error::{Error, ErrorClass, OpContext, Result};
pub use importance::ImportanceAnnotator;
pub use memory::MemoryCoordinator;
pub use session::SessionLifecycleManager;
pub use types::{ContentTopology, Memory, MemoryKind, NewMemory, Session};

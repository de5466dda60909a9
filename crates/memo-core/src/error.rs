//! Error types for memo-core.
//!
//! Backend failures are wrapped with an [`OpContext`] naming the operation,
//! the session and the batch size, so a failure can be diagnosed from the log
//! line alone.

use std::fmt;

use thiserror::Error;

use crate::config::ConfigValidationError;
use crate::index::IndexError;
use crate::providers::ProviderError;
use crate::store::StoreError;
use crate::types::Session;

/// Result type alias using memo-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Where an external call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpContext {
    pub op: &'static str,
    pub session_id: String,
    pub batch: usize,
}

impl OpContext {
    pub fn new(op: &'static str, session_id: impl Into<String>, batch: usize) -> Self {
        Self {
            op,
            session_id: session_id.into(),
            batch,
        }
    }
}

impl fmt::Display for OpContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (session {}, batch {})",
            self.op, self.session_id, self.batch
        )
    }
}

/// Coarse classification used at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Malformed input. Never retried.
    Client,
    /// Session or memory absent.
    NotFound,
    /// Backend unavailable or misbehaving.
    Server,
}

/// Core error types for memo operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The session record was written but its collection could not be
    /// created. The session exists; `ensure_collection` must succeed before
    /// first use.
    #[error("session {} created but its vector collection is not ready: {source}", session.id)]
    IndexNotReady {
        session: Box<Session>,
        #[source]
        source: Box<Error>,
    },

    /// The session record is gone but its collection is still there.
    #[error("session {session_id} deleted but its vector collection was left behind: {source}")]
    OrphanedCollection {
        session_id: String,
        #[source]
        source: Box<Error>,
    },

    #[error("model provider failed during {ctx}: {source}")]
    Provider {
        ctx: OpContext,
        #[source]
        source: ProviderError,
    },

    #[error("document store failed during {ctx}: {source}")]
    Store {
        ctx: OpContext,
        #[source]
        source: StoreError,
    },

    #[error("vector index failed during {ctx}: {source}")]
    Index {
        ctx: OpContext,
        #[source]
        source: IndexError,
    },

    #[error("cannot parse importance scores: {0}")]
    Parse(String),

    #[error("all {orphans} hits in session {session_id} lack a document record")]
    Inconsistent { session_id: String, orphans: usize },

    #[error("{ctx} timed out after {duration_ms}ms")]
    Timeout { ctx: OpContext, duration_ms: u64 },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigValidationError),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn provider(ctx: OpContext, source: ProviderError) -> Self {
        Self::Provider { ctx, source }
    }

    pub fn store(ctx: OpContext, source: StoreError) -> Self {
        Self::Store { ctx, source }
    }

    pub fn index(ctx: OpContext, source: IndexError) -> Self {
        Self::Index { ctx, source }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Validation(_) => ErrorClass::Client,
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::IndexNotReady { .. }
            | Self::OrphanedCollection { .. }
            | Self::Provider { .. }
            | Self::Store { .. }
            | Self::Index { .. }
            | Self::Parse(_)
            | Self::Inconsistent { .. }
            | Self::Timeout { .. }
            | Self::Config(_) => ErrorClass::Server,
        }
    }
}

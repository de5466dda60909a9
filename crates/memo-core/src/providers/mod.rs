//! Model provider seams.
//!
//! Two capabilities are consumed: batch text embedding and chat completion.
//! Both are external, slow and failure-prone; callers bound every call with
//! the configured timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "openai")]
mod openai;

#[cfg(feature = "openai")]
pub use openai::OpenAiClient;

/// Provider failures
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(String),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("provider is not configured: {0}")]
    NotConfigured(String),
}

/// One embedding from a batch response.
///
/// `index` is the position of the input it belongs to. Providers may return
/// items in any order.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub index: usize,
    pub vector: Vec<f32>,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every input in a single request.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Embedding>, ProviderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Chat message sent to a completion model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Return the text of the first choice.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError>;
}

/// Put a batch embedding response back into input order.
///
/// Every input position must be covered exactly once and every vector must
/// have `dimension` components.
pub fn align_embeddings(
    inputs: usize,
    embeddings: Vec<Embedding>,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    if embeddings.len() != inputs {
        return Err(ProviderError::Malformed(format!(
            "expected {inputs} embeddings, got {}",
            embeddings.len()
        )));
    }

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; inputs];
    for embedding in embeddings {
        if embedding.vector.len() != dimension {
            return Err(ProviderError::Malformed(format!(
                "embedding {} has {} dimensions, expected {dimension}",
                embedding.index,
                embedding.vector.len()
            )));
        }
        let slot = slots.get_mut(embedding.index).ok_or_else(|| {
            ProviderError::Malformed(format!("embedding index {} out of range", embedding.index))
        })?;
        if slot.replace(embedding.vector).is_some() {
            return Err(ProviderError::Malformed(format!(
                "duplicate embedding index {}",
                embedding.index
            )));
        }
    }

    // Lengths match and no index repeats, so every slot is filled.
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(index: usize, v: f32) -> Embedding {
        Embedding {
            index,
            vector: vec![v, v],
        }
    }

    #[test]
    fn test_align_restores_input_order() {
        let aligned = align_embeddings(3, vec![emb(2, 2.0), emb(0, 0.0), emb(1, 1.0)], 2).unwrap();
        assert_eq!(aligned, vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 2.0]]);
    }

    #[test]
    fn test_align_rejects_bad_responses() {
        assert!(align_embeddings(2, vec![emb(0, 0.0)], 2).is_err());
        assert!(align_embeddings(2, vec![emb(0, 0.0), emb(0, 1.0)], 2).is_err());
        assert!(align_embeddings(2, vec![emb(0, 0.0), emb(5, 1.0)], 2).is_err());
        assert!(align_embeddings(1, vec![emb(0, 0.0)], 3).is_err());
    }

    #[test]
    fn test_message_roles_serialize_lowercase() {
        let value = serde_json::to_value(ChatMessage::system("rate")).unwrap();
        assert_eq!(value["role"], "system");
        assert_eq!(value["content"], "rate");
    }
}

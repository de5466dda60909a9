//! OpenAI-compatible HTTP client for embeddings and chat completions.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

use super::{ChatMessage, CompletionProvider, Embedding, EmbeddingProvider, ProviderError};
use crate::config::ProviderConfig;

/// Client for `/embeddings` and `/chat/completions`.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    embedding_model: String,
    completion_model: String,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: &ProviderConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            embedding_model: config.embedding_model.clone(),
            completion_model: config.completion_model.clone(),
            client,
        })
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ProviderError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("missing API key".into()))?;

        let url = format!("{}{}", self.base_url, path);
        debug!("Provider request: POST {}", url);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            resp.json()
                .await
                .map_err(|e| ProviderError::Malformed(e.to_string()))
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiClient {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Embedding>, ProviderError> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: inputs,
        };
        let response: EmbeddingResponse = self.post("/embeddings", &request).await?;

        Ok(response
            .data
            .into_iter()
            .map(|item| Embedding {
                index: item.index,
                vector: item.embedding,
            })
            .collect())
    }
}

#[async_trait]
impl CompletionProvider for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.completion_model,
            messages,
        };
        let response: ChatResponse = self.post("/chat/completions", &request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Malformed("completion has no content".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_response_decoding() {
        let response: EmbeddingResponse = serde_json::from_str(
            r#"{"object":"list","data":[
                {"object":"embedding","index":1,"embedding":[0.5,0.25]},
                {"object":"embedding","index":0,"embedding":[1.0,0.0]}
            ],"model":"text-embedding-ada-002"}"#,
        )
        .unwrap();
        assert_eq!(response.data.len(), 2);
        assert_eq!(response.data[0].index, 1);
        assert_eq!(response.data[1].embedding, vec![1.0, 0.0]);
    }

    #[test]
    fn test_chat_request_shape() {
        let messages = vec![ChatMessage::system("rate"), ChatMessage::user("a;b")];
        let value = serde_json::to_value(ChatRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
        })
        .unwrap();
        assert_eq!(value["model"], "gpt-3.5-turbo");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "a;b");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let client = OpenAiClient::new(&ProviderConfig::default(), Duration::from_secs(1)).unwrap();
        let err = client.embed(&["hello".to_string()]).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}

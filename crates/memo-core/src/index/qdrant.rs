//! Qdrant REST client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::debug;

use super::{
    CollectionInfo, Distance, IndexError, IndexResult, PayloadPoint, Point, ScoredPoint,
    ScrollPage, SearchRequest, VectorIndex,
};
use crate::config::VectorConfig;
use crate::types::MemoryPayload;

/// Vector index backed by a Qdrant server.
#[derive(Clone)]
pub struct QdrantIndex {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl QdrantIndex {
    pub fn new(config: &VectorConfig, timeout: Duration) -> IndexResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        collection: &str,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> IndexResult<T> {
        let url = format!("{}/collections/{}{}", self.base_url, collection, path);
        debug!("Index request: {} {}", method, url);

        let mut req = self.client.request(method, &url);
        if let Some(ref key) = self.api_key {
            req = req.header("api-key", key);
        }
        if let Some(ref b) = body {
            req = req.json(b);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| IndexError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            let envelope: Envelope<T> = resp
                .json()
                .await
                .map_err(|e| IndexError::Decode(e.to_string()))?;
            return Ok(envelope.result);
        }

        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&text)
            .ok()
            .and_then(|e| e.status.error)
            .unwrap_or(text);

        if status == StatusCode::NOT_FOUND {
            Err(IndexError::NotFound(collection.to_string()))
        } else if status == StatusCode::CONFLICT || message.contains("already exists") {
            Err(IndexError::AlreadyExists(collection.to_string()))
        } else {
            Err(IndexError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    status: ErrorStatus,
}

#[derive(Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    error: Option<String>,
}

/// Qdrant accepts unsigned integers and UUIDs as point ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum PointId {
    Num(u64),
    Uuid(String),
}

impl PointId {
    fn into_string(self) -> String {
        match self {
            Self::Num(n) => n.to_string(),
            Self::Uuid(s) => s,
        }
    }
}

#[derive(Deserialize)]
struct CollectionDescription {
    #[serde(default)]
    points_count: Option<u64>,
}

#[derive(Deserialize)]
struct WireScoredPoint {
    id: PointId,
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct WireRecord {
    id: PointId,
    #[serde(default)]
    payload: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct WireScroll {
    points: Vec<WireRecord>,
    #[serde(default)]
    next_page_offset: Option<PointId>,
}

fn decode_payload(id: &str, payload: Option<serde_json::Value>) -> IndexResult<MemoryPayload> {
    let payload = payload.ok_or_else(|| IndexError::Decode(format!("point {id} has no payload")))?;
    serde_json::from_value(payload)
        .map_err(|e| IndexError::Decode(format!("point {id} has a malformed payload: {e}")))
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn collection_info(&self, name: &str) -> IndexResult<CollectionInfo> {
        let info: CollectionDescription = self.request(Method::GET, name, "", None).await?;
        Ok(CollectionInfo {
            name: name.to_string(),
            points_count: info.points_count,
        })
    }

    async fn create_collection(&self, name: &str, dimension: usize, distance: Distance) -> IndexResult<()> {
        let body = json!({
            "vectors": { "size": dimension, "distance": distance }
        });
        let _: bool = self.request(Method::PUT, name, "", Some(body)).await?;
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> IndexResult<()> {
        let _: bool = self.request(Method::DELETE, name, "", None).await?;
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<Point>, wait: bool) -> IndexResult<()> {
        let points: Vec<serde_json::Value> = points
            .into_iter()
            .map(|p| json!({ "id": p.id, "vector": p.vector, "payload": p.payload }))
            .collect();
        let path = format!("/points?wait={wait}");
        let _: serde_json::Value = self
            .request(Method::PUT, name, &path, Some(json!({ "points": points })))
            .await?;
        Ok(())
    }

    async fn search(&self, name: &str, request: SearchRequest) -> IndexResult<Vec<ScoredPoint>> {
        let mut body = json!({
            "vector": request.vector,
            "limit": request.limit,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(threshold) = request.score_threshold {
            body["score_threshold"] = json!(threshold);
        }

        let hits: Vec<WireScoredPoint> = self
            .request(Method::POST, name, "/points/search", Some(body))
            .await?;

        hits.into_iter()
            .map(|hit| {
                let id = hit.id.into_string();
                let payload = decode_payload(&id, hit.payload)?;
                Ok(ScoredPoint {
                    id,
                    score: hit.score,
                    payload,
                })
            })
            .collect()
    }

    async fn scroll(&self, name: &str, offset: Option<&str>, limit: usize) -> IndexResult<ScrollPage> {
        let mut body = json!({
            "limit": limit,
            "with_payload": true,
            "with_vector": false,
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }

        let page: WireScroll = self
            .request(Method::POST, name, "/points/scroll", Some(body))
            .await?;

        let points = page
            .points
            .into_iter()
            .map(|record| {
                let id = record.id.into_string();
                let payload = decode_payload(&id, record.payload)?;
                Ok(PayloadPoint { id, payload })
            })
            .collect::<IndexResult<Vec<_>>>()?;

        Ok(ScrollPage {
            points,
            next_offset: page.next_page_offset.map(PointId::into_string),
        })
    }

    async fn existing_points(&self, name: &str, ids: &[String]) -> IndexResult<Vec<String>> {
        let body = json!({
            "ids": ids,
            "with_payload": false,
            "with_vector": false,
        });
        let records: Vec<WireRecord> = self
            .request(Method::POST, name, "/points", Some(body))
            .await?;
        Ok(records.into_iter().map(|r| r.id.into_string()).collect())
    }

    async fn delete_points(&self, name: &str, ids: &[String], wait: bool) -> IndexResult<()> {
        let path = format!("/points/delete?wait={wait}");
        let _: serde_json::Value = self
            .request(Method::POST, name, &path, Some(json!({ "points": ids })))
            .await?;
        Ok(())
    }
}

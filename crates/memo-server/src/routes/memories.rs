//! Memory routes, scoped to one session.
//!
//! - GET/PUT/DELETE /m/{session} - List, add and delete memories
//! - POST /m/{session}/search - Similarity search
//! - POST /m/{session}/score - Importance scores, nothing stored

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use memo_core::memory::{MemoryPage, SearchHits, SearchOptions};
use memo_core::providers::ChatMessage;
use memo_core::{MemoryKind, NewMemory};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

/// Create memory router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/m/{session}",
            get(list_memories).put(add_memories).delete(delete_memories),
        )
        .route("/m/{session}/search", post(search_memories))
        .route("/m/{session}/score", post(score_memories))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A memory as plain text or with its kind.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MemoryInput {
    Text(String),
    Tagged {
        content: String,
        #[serde(default)]
        kind: MemoryKind,
    },
}

impl From<MemoryInput> for NewMemory {
    fn from(input: MemoryInput) -> Self {
        match input {
            MemoryInput::Text(content) => NewMemory::from(content),
            MemoryInput::Tagged { content, kind } => NewMemory::new(content, kind),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddMemoriesRequest {
    pub memories: Vec<MemoryInput>,
}

#[derive(Debug, Serialize)]
pub struct AddMemoriesResponse {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(flatten)]
    pub options: SearchOptions,
}

#[derive(Debug, Deserialize)]
pub struct ListMemoriesQuery {
    /// Cursor returned by the previous page
    pub offset: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMemoriesRequest {
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteMemoriesResponse {
    pub deleted: u64,
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    #[serde(default)]
    pub context: Vec<ChatMessage>,
    pub memories: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub scores: Vec<u8>,
}

// ============================================================================
// Route Handlers
// ============================================================================

pub async fn add_memories(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(req): Json<AddMemoriesRequest>,
) -> ApiResult<(StatusCode, Json<AddMemoriesResponse>)> {
    let batch = req.memories.into_iter().map(NewMemory::from).collect();
    let ids = state.memories.add_memories(&session, batch).await?;
    Ok((StatusCode::CREATED, Json(AddMemoriesResponse { ids })))
}

pub async fn search_memories(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(req): Json<SearchRequest>,
) -> ApiResult<Json<SearchHits>> {
    Ok(Json(
        state
            .memories
            .search(&session, &req.query, req.options)
            .await?,
    ))
}

pub async fn list_memories(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Query(query): Query<ListMemoriesQuery>,
) -> ApiResult<Json<MemoryPage>> {
    Ok(Json(
        state
            .memories
            .list(&session, query.offset.as_deref(), query.limit)
            .await?,
    ))
}

pub async fn delete_memories(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(req): Json<DeleteMemoriesRequest>,
) -> ApiResult<Json<DeleteMemoriesResponse>> {
    let deleted = state.memories.delete_memories(&session, &req.ids).await?;
    Ok(Json(DeleteMemoriesResponse { deleted }))
}

/// Scores are returned only; the session must exist but nothing is written.
pub async fn score_memories(
    State(state): State<Arc<AppState>>,
    Path(session): Path<String>,
    Json(req): Json<ScoreRequest>,
) -> ApiResult<Json<ScoreResponse>> {
    state.sessions.get_session(&session).await?;
    let scores = state.annotator.score(&req.context, &req.memories).await?;
    Ok(Json(ScoreResponse { scores }))
}

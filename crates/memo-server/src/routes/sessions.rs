//! Session routes.
//!
//! - GET/POST /s - List and create sessions
//! - GET/PATCH/DELETE /s/{id} - Fetch, update and delete a session
//! - POST /s/{id}/ensure - Retry collection creation

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use memo_core::session::{NewSession, SessionUpdate};
use memo_core::{Error, Session};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiResult;
use crate::state::AppState;

/// Create session router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/s", get(list_sessions).post(create_session))
        .route("/s/{id}", get(get_session).patch(update_session).delete(delete_session))
        .route("/s/{id}/ensure", post(ensure_collection))
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    /// Id of the last session of the previous page
    pub offset: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListSessionsResponse {
    pub sessions: Vec<Session>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session: Session,
    pub index_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnsureResponse {
    pub created: bool,
}

// ============================================================================
// Route Handlers
// ============================================================================

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListSessionsQuery>,
) -> ApiResult<Json<ListSessionsResponse>> {
    let offset = query.offset.as_deref().filter(|o| !o.is_empty());
    let sessions = state.sessions.list_sessions(offset, query.limit).await?;
    let next_offset = sessions.last().map(|s| s.id.clone());

    Ok(Json(ListSessionsResponse {
        sessions,
        next_offset,
    }))
}

/// 201 when the collection is ready, 202 when only the record was written.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewSession>,
) -> ApiResult<(StatusCode, Json<CreateSessionResponse>)> {
    match state.sessions.create_session(req).await {
        Ok(session) => Ok((
            StatusCode::CREATED,
            Json(CreateSessionResponse {
                session,
                index_ready: true,
                warning: None,
            }),
        )),
        Err(Error::IndexNotReady { session, source }) => Ok((
            StatusCode::ACCEPTED,
            Json(CreateSessionResponse {
                session: *session,
                index_ready: false,
                warning: Some(source.to_string()),
            }),
        )),
        Err(e) => Err(e.into()),
    }
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    Ok(Json(state.sessions.get_session(&id).await?))
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SessionUpdate>,
) -> ApiResult<Json<Session>> {
    Ok(Json(state.sessions.update_session(&id, req).await?))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.sessions.delete_session(&id).await?;
    info!(session = %id, "Session deleted via API");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ensure_collection(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<EnsureResponse>> {
    // the record must exist; collections are never created for unknown ids
    state.sessions.get_session(&id).await?;
    let created = state.sessions.ensure_collection(&id).await?;
    Ok(Json(EnsureResponse { created }))
}

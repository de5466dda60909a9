//! API route modules.

pub mod health;
pub mod memories;
pub mod sessions;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use crate::state::AppState;

/// Create the main router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .merge(sessions::router())
        .merge(memories::router());

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1", api_routes)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::{TestState, test_state};
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use memo_core::testing::ScriptedCompleter;
    use serde_json::{Value, json};
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn app(completer: ScriptedCompleter) -> (Router, TestState) {
        let t = test_state(completer);
        (create_router(t.state.clone()), t)
    }

    async fn create(app: &Router, name: &str) -> String {
        let (status, body) = call(app, Method::POST, "/api/v1/s", Some(json!({ "name": name }))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["index_ready"], true);
        body["session"]["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app(ScriptedCompleter::new());
        let (status, body) = call(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["topology"], "dual_write");
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (app, t) = app(ScriptedCompleter::new());
        let id = create(&app, "May").await;
        assert!(t.index.has_collection(&id));

        let (status, body) = call(&app, Method::GET, &format!("/api/v1/s/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "May");

        let (status, body) = call(&app, Method::GET, "/api/v1/s?limit=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessions"].as_array().unwrap().len(), 1);
        assert_eq!(body["next_offset"], id.as_str());

        let (status, _) = call(&app, Method::DELETE, &format!("/api/v1/s/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(&app, Method::DELETE, &format!("/api/v1/s/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], 404);
    }

    #[tokio::test]
    async fn test_update_session_route() {
        let (app, t) = app(ScriptedCompleter::new());
        let id = create(&app, "May").await;
        let creates = t.index.create_calls.load(Ordering::SeqCst);

        let (status, body) = call(
            &app,
            Method::PATCH,
            &format!("/api/v1/s/{id}"),
            Some(json!({ "name": "June", "tags": ["npc"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "June");
        assert_eq!(body["tags"], json!(["npc"]));
        assert_eq!(t.index.create_calls.load(Ordering::SeqCst), creates);

        let (status, body) = call(&app, Method::GET, &format!("/api/v1/s/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "June");

        let (status, _) = call(
            &app,
            Method::PATCH,
            &format!("/api/v1/s/{id}"),
            Some(json!({ "name": " " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing = uuid::Uuid::now_v7().to_string();
        let (status, _) = call(
            &app,
            Method::PATCH,
            &format!("/api/v1/s/{missing}"),
            Some(json!({ "name": "June" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_session_without_collection() {
        let (app, t) = app(ScriptedCompleter::new());
        t.index.fail_create.store(true, Ordering::SeqCst);

        let (status, body) = call(&app, Method::POST, "/api/v1/s", Some(json!({ "name": "May" }))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["index_ready"], false);
        let id = body["session"]["id"].as_str().unwrap().to_string();

        t.index.fail_create.store(false, Ordering::SeqCst);
        let (status, body) = call(&app, Method::POST, &format!("/api/v1/s/{id}/ensure"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], true);
    }

    #[tokio::test]
    async fn test_ensure_unknown_session() {
        let (app, t) = app(ScriptedCompleter::new());
        let id = uuid::Uuid::now_v7().to_string();
        let (status, _) = call(&app, Method::POST, &format!("/api/v1/s/{id}/ensure"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(!t.index.has_collection(&id));
    }

    #[tokio::test]
    async fn test_malformed_ids_are_client_errors() {
        let (app, _) = app(ScriptedCompleter::new());
        let (status, body) = call(&app, Method::GET, "/api/v1/s/not-a-uuid", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/v1/m/not-a-uuid",
            Some(json!({ "memories": ["hello"] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_memory_routes() {
        let (app, _) = app(ScriptedCompleter::new());
        let id = create(&app, "May").await;

        let (status, body) = call(
            &app,
            Method::PUT,
            &format!("/api/v1/m/{id}"),
            Some(json!({ "memories": [
                "My name is May.",
                { "content": "I am 14 years old.", "kind": "interact" }
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let ids = body["ids"].as_array().unwrap().clone();
        assert_eq!(ids.len(), 2);

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/v1/m/{id}/search"),
            Some(json!({ "query": "your age", "limit": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["memories"][0]["content"], "I am 14 years old.");
        assert_eq!(body["memories"][0]["kind"], "interact");
        assert_eq!(body["scores"].as_array().unwrap().len(), 1);

        let (status, body) = call(&app, Method::GET, &format!("/api/v1/m/{id}?limit=1"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["memories"].as_array().unwrap().len(), 1);
        let cursor = body["next_cursor"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            Method::GET,
            &format!("/api/v1/m/{id}?limit=1&offset={cursor}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["memories"].as_array().unwrap().len(), 1);
        assert!(body.get("next_cursor").is_none());

        let (status, body) = call(
            &app,
            Method::DELETE,
            &format!("/api/v1/m/{id}"),
            Some(json!({ "ids": ids })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], 2);
    }

    #[tokio::test]
    async fn test_memories_of_unknown_session() {
        let (app, _) = app(ScriptedCompleter::new());
        let id = uuid::Uuid::now_v7().to_string();
        let (status, _) = call(&app, Method::GET, &format!("/api/v1/m/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_score_route() {
        let (app, t) = app(ScriptedCompleter::new().reply("3, 8").reply("3"));
        let id = create(&app, "May").await;

        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/v1/m/{id}/score"),
            Some(json!({ "memories": ["I ate toast.", "I got married."] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["scores"], json!([3, 8]));

        // count mismatch
        let (status, body) = call(
            &app,
            Method::POST,
            &format!("/api/v1/m/{id}/score"),
            Some(json!({ "memories": ["a", "b"] })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["message"].as_str().unwrap().contains("expected 2 scores"));
        assert_eq!(t.completer.call_count(), 2);
    }
}

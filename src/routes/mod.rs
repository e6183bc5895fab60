//! Router assembly: HTTP endpoints, WebSocket event stream, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::state::AppState;

pub mod context;
pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket mutation events at `/ws`
/// - JSON API under `/api/v1/...`
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_upgrade))
        .route("/api/v1/health", get(http::http_health))
        // Catalog
        .route("/api/v1/colleges", get(http::http_list_colleges).post(http::http_create_college))
        .route(
            "/api/v1/colleges/:id",
            get(http::http_get_college_by_id)
                .put(http::http_update_college)
                .delete(http::http_delete_college),
        )
        .route("/api/v1/colleges/slug/:slug", get(http::http_get_college))
        .route("/api/v1/colleges/slug/:slug/courses", get(http::http_list_courses))
        .route("/api/v1/colleges/slug/:slug/nav", get(http::http_sidebar_nav))
        .route("/api/v1/courses", post(http::http_create_course))
        .route(
            "/api/v1/courses/:id",
            put(http::http_update_course).delete(http::http_delete_course),
        )
        .route("/api/v1/courses/:id/knowledge-points", get(http::http_list_knowledge_points))
        .route("/api/v1/knowledge-points", post(http::http_create_knowledge_point))
        .route(
            "/api/v1/knowledge-points/:id",
            get(http::http_get_knowledge_point).put(http::http_update_knowledge_point),
        )
        // Exercises
        .route(
            "/api/v1/exercises",
            get(http::http_get_exercise_list).post(http::http_create_exercise),
        )
        .route(
            "/api/v1/exercises/:id",
            get(http::http_get_exercise)
                .put(http::http_update_exercise)
                .delete(http::http_delete_exercise),
        )
        .route("/api/v1/exercises/:id/bookmark", post(http::http_toggle_bookmark))
        .route("/api/v1/bookmarks", get(http::http_list_bookmarks))
        // Rules
        .route(
            "/api/v1/rules",
            get(http::http_list_rules)
                .post(http::http_create_rule)
                .put(http::http_replace_rules)
                .delete(http::http_clear_rules),
        )
        .route(
            "/api/v1/rules/:id",
            put(http::http_update_rule).delete(http::http_delete_rule),
        )
        // Papers
        .route("/api/v1/papers", get(http::http_list_papers).post(http::http_create_paper))
        .route("/api/v1/papers/assemble", post(http::http_assemble))
        .route("/api/v1/papers/current", get(http::http_current_paper))
        .route("/api/v1/papers/:id", get(http::http_get_paper))
        .route(
            "/api/v1/papers/:id/exercises/:exercise_id",
            put(http::http_add_exercise_to_paper).delete(http::http_remove_exercise_from_paper),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn request(method: &str, uri: &str, user: Option<(&str, &str)>, body: Option<Value>) -> Request<Body> {
        let mut b = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = user {
            b = b.header(context::USER_HEADER, id).header(context::ROLE_HEADER, role);
        }
        match body {
            Some(v) => b
                .header("content-type", "application/json")
                .body(Body::from(v.to_string()))
                .unwrap(),
            None => b.body(Body::empty()).unwrap(),
        }
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, value)
    }

    const ADMIN: Option<(&str, &str)> = Some(("admin-1", "admin"));
    const ALICE: Option<(&str, &str)> = Some(("alice", "user"));

    /// college → course → knowledge point; returns the knowledge point id.
    async fn seed_catalog(app: &Router) -> String {
        let (s, _) = call(app, request("POST", "/api/v1/colleges", ADMIN, Some(json!({"name": "软件学院", "collegeSlug": "sse"})))).await;
        assert_eq!(s, StatusCode::CREATED);
        let (s, course) = call(app, request("POST", "/api/v1/courses", ADMIN, Some(json!({"collegeSlug": "sse", "name": "编译原理"})))).await;
        assert_eq!(s, StatusCode::CREATED);
        let (s, kp) = call(
            app,
            request("POST", "/api/v1/knowledge-points", ADMIN, Some(json!({"courseId": course["id"], "name": "Token"}))),
        )
        .await;
        assert_eq!(s, StatusCode::CREATED);
        kp["id"].as_str().unwrap().to_string()
    }

    async fn seed_exercise(app: &Router, kp: &str, kind: &str, question: &str) -> String {
        let (s, e) = call(
            app,
            request(
                "POST",
                "/api/v1/exercises",
                ALICE,
                Some(json!({"type": kind, "difficulty": "EASY", "question": question, "answer": "42", "knowledgePointId": kp})),
            ),
        )
        .await;
        assert_eq!(s, StatusCode::CREATED);
        e["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_router(Arc::new(AppState::in_memory()));
        let (s, body) = call(&app, request("GET", "/api/v1/health", None, None)).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn protected_routes_need_identity() {
        let app = build_router(Arc::new(AppState::in_memory()));
        let (s, body) = call(&app, request("GET", "/api/v1/rules", None, None)).await;
        assert_eq!(s, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["type"], "unauthorized");
    }

    #[tokio::test]
    async fn non_admin_cannot_create_college() {
        let app = build_router(Arc::new(AppState::in_memory()));
        let (s, _) = call(&app, request("POST", "/api/v1/colleges", ALICE, Some(json!({"name": "x", "slug": "x"})))).await;
        assert_eq!(s, StatusCode::FORBIDDEN);
        let (s, body) = call(&app, request("GET", "/api/v1/colleges", None, None)).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(body, json!([]));
    }

    #[tokio::test]
    async fn duplicate_slug_is_409() {
        let app = build_router(Arc::new(AppState::in_memory()));
        seed_catalog(&app).await;
        let (s, body) = call(&app, request("POST", "/api/v1/colleges", ADMIN, Some(json!({"name": "again", "slug": "sse"})))).await;
        assert_eq!(s, StatusCode::CONFLICT);
        assert_eq!(body["error"]["type"], "conflict");
    }

    #[tokio::test]
    async fn invalid_rule_type_is_400() {
        let app = build_router(Arc::new(AppState::in_memory()));
        let (s, body) = call(&app, request("POST", "/api/v1/rules", ALICE, Some(json!({"type": "INVALID", "difficulty": "ANY", "amount": 1})))).await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "validation_error");
    }

    #[tokio::test]
    async fn paginated_exercise_list_follows_cursor() {
        let app = build_router(Arc::new(AppState::in_memory()));
        let kp = seed_catalog(&app).await;
        let mut created = Vec::new();
        for i in 0..5 {
            created.push(seed_exercise(&app, &kp, "BIG_QUESTION", &format!("q{}", i)).await);
        }
        created.reverse();

        let mut seen: Vec<String> = Vec::new();
        let mut uri = format!("/api/v1/exercises?knowledgePointId={}&type=ALL_QUESTION&difficulty=ANY&limit=2", kp);
        loop {
            let (s, page) = call(&app, request("GET", &uri, ALICE, None)).await;
            assert_eq!(s, StatusCode::OK);
            for e in page["exerciseList"].as_array().unwrap() {
                seen.push(e["id"].as_str().unwrap().to_string());
            }
            match page.get("nextCursor").and_then(Value::as_str) {
                Some(c) => uri = format!("/api/v1/exercises?knowledgePointId={}&limit=2&cursor={}", kp, c),
                None => break,
            }
        }
        assert_eq!(seen, created);
    }

    #[tokio::test]
    async fn rules_to_paper_end_to_end() {
        let app = build_router(Arc::new(AppState::in_memory()));
        let kp = seed_catalog(&app).await;
        let choice = seed_exercise(&app, &kp, "CHOICE_QUESTION", "pick one").await;
        let big = seed_exercise(&app, &kp, "BIG_QUESTION", "essay").await;

        let (s, _) = call(
            &app,
            request("POST", "/api/v1/rules", ALICE, Some(json!({"type": "ALL_QUESTION", "difficulty": "ANY", "knowledgePointId": kp, "amount": 3}))),
        )
        .await;
        assert_eq!(s, StatusCode::CREATED);
        call(
            &app,
            request("POST", "/api/v1/rules", ALICE, Some(json!({"type": "CHOICE_QUESTION", "difficulty": "EASY", "knowledgePointId": kp, "amount": 2}))),
        )
        .await;

        let (s, out) = call(&app, request("POST", "/api/v1/papers/assemble", ALICE, None)).await;
        assert_eq!(s, StatusCode::OK);
        let paper_id = out["paperId"].as_str().unwrap().to_string();
        let ids: Vec<&str> = out["paper"]["exercises"].as_array().unwrap().iter().map(|e| e["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec![big.as_str(), choice.as_str()]);

        // Manual removal, twice; then re-add twice.
        let path = format!("/api/v1/papers/{}/exercises/{}", paper_id, choice);
        for _ in 0..2 {
            let (s, _) = call(&app, request("DELETE", &path, ALICE, None)).await;
            assert_eq!(s, StatusCode::NO_CONTENT);
        }
        for _ in 0..2 {
            let (s, _) = call(&app, request("PUT", &path, ALICE, None)).await;
            assert_eq!(s, StatusCode::NO_CONTENT);
        }
        let (_, current) = call(&app, request("GET", "/api/v1/papers/current", ALICE, None)).await;
        assert_eq!(current["id"], json!(paper_id));
        assert_eq!(current["exercises"].as_array().unwrap().len(), 2);

        // Someone else cannot see it.
        let (s, _) = call(&app, request("GET", &format!("/api/v1/papers/{}", paper_id), Some(("bob", "user")), None)).await;
        assert_eq!(s, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_assemble_body_is_400_and_creates_nothing() {
        let app = build_router(Arc::new(AppState::in_memory()));
        let (s, body) = call(
            &app,
            request("POST", "/api/v1/papers/assemble", ALICE, Some(json!({"paperId": "does-not-exist", "mode": "BOGUS"}))),
        )
        .await;
        assert_eq!(s, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "validation_error");

        let (s, papers) = call(&app, request("GET", "/api/v1/papers", ALICE, None)).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(papers, json!([]));
    }

    #[tokio::test]
    async fn college_lookup_by_id() {
        let app = build_router(Arc::new(AppState::in_memory()));
        seed_catalog(&app).await;
        let (_, by_slug) = call(&app, request("GET", "/api/v1/colleges/slug/sse", None, None)).await;
        let id = by_slug["id"].as_str().unwrap().to_string();

        let (s, by_id) = call(&app, request("GET", &format!("/api/v1/colleges/{}", id), None, None)).await;
        assert_eq!(s, StatusCode::OK);
        assert_eq!(by_id, by_slug);

        let (s, _) = call(&app, request("GET", "/api/v1/colleges/ghost", None, None)).await;
        assert_eq!(s, StatusCode::NOT_FOUND);
    }
}

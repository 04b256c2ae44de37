pub mod control;
pub mod policy;
pub mod session;
pub mod sources;

use crate::auth;
use crate::state::AppState;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Main API router. Every route above the auth layer goes through the
/// operation allow-list; the session endpoint is unauthenticated.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/sources", get(sources::list_sources))
        .route("/api/v1/sources/delete", post(sources::delete_source))
        .route("/api/v1/snapshots", post(sources::record_snapshot))
        .route("/api/v1/policy", get(policy::get_policy).put(policy::set_policy))
        .route("/api/v1/control/status", get(control::status))
        .route("/api/v1/control/refresh", post(control::refresh))
        .route("/api/v1/control/shutdown", post(control::shutdown))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::authorize))
        .route("/api/v1/session", get(session::issue_session))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::{NewSnapshot, SnapshotStats, SourceInfo};
    use crate::policy::{Policy, PolicyTarget};
    use crate::repository::Repository;
    use crate::services::refresh::refresh;
    use crate::state::AppState;
    use crate::test_support::{
        basic, state_with_config, state_with_repo, test_config, MemoryRepository, CONTROL,
        CONTROL_PASSWORD, USER, USER_PASSWORD,
    };
    use axum::body::Body;
    use axum::http::{header, HeaderMap, Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    fn request(method: &str, uri: &str, auth: Option<(&str, &str)>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user, pass)) = auth {
            builder = builder.header(header::AUTHORIZATION, basic(user, pass));
        }
        match body {
            Some(b) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(b.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn ordinary() -> Option<(&'static str, &'static str)> {
        Some((USER, USER_PASSWORD))
    }

    fn control() -> Option<(&'static str, &'static str)> {
        Some((CONTROL, CONTROL_PASSWORD))
    }

    fn snapshot_body(path: &str) -> Value {
        json!({
            "source": { "host": "fake-hostname", "userName": "fake-username", "path": path },
            "startTime": "2026-05-01T10:00:00Z",
            "endTime": "2026-05-01T10:01:00Z",
            "stats": { "totalDirs": 4, "totalFiles": 9, "totalBytes": 1024 }
        })
    }

    /// Start a session and return (cookie header, csrf token).
    async fn open_session(app: &Router) -> (String, String) {
        let (status, headers, body) = send(app, request("GET", "/api/v1/session", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        let cookie = headers
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();
        (cookie, body["csrfToken"].as_str().unwrap().to_string())
    }

    fn with_session(mut req: Request<Body>, cookie: &str, token: &str) -> Request<Body> {
        req.headers_mut().insert(header::COOKIE, cookie.parse().unwrap());
        req.headers_mut().insert("x-snapshot-csrf-token", token.parse().unwrap());
        req
    }

    /// Send `req` while a refresh is paused after taking its listing, then
    /// let the refresh finish.
    async fn send_during_refresh(
        state: &Arc<AppState>,
        repo: &MemoryRepository,
        app: &Router,
        req: Request<Body>,
    ) -> StatusCode {
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel();
        repo.gate_next_load(entered_tx, release_rx);

        let refreshing = tokio::spawn({
            let state = state.clone();
            async move { refresh(&state).await }
        });
        tokio::task::spawn_blocking(move || entered_rx.recv())
            .await
            .unwrap()
            .unwrap();

        let write = tokio::spawn({
            let app = app.clone();
            async move { send(&app, req).await.0 }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        release_tx.send(()).unwrap();

        refreshing.await.unwrap().unwrap();
        write.await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_credentials_are_rejected() {
        let app = create_router(state_with_repo(Arc::new(MemoryRepository::default())));
        let (status, headers, _) = send(&app, request("GET", "/api/v1/sources", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(headers.contains_key(header::WWW_AUTHENTICATE));

        let (status, _, _) = send(
            &app,
            request("GET", "/api/v1/sources", Some((USER, CONTROL_PASSWORD)), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_control_credential_rejected_on_ordinary_endpoints() {
        let state = state_with_repo(Arc::new(MemoryRepository::default()));
        let app = create_router(state.clone());

        let (status, _, _) = send(&app, request("GET", "/api/v1/sources", control(), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _, body) = send(
            &app,
            request("POST", "/api/v1/snapshots", control(), Some(snapshot_body("/a"))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().contains("record-snapshot"));
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn test_ordinary_credential_rejected_on_control_endpoints() {
        let state = state_with_repo(Arc::new(MemoryRepository::default()));
        let app = create_router(state.clone());

        for path in ["/api/v1/control/refresh", "/api/v1/control/shutdown"] {
            let (status, _, _) = send(&app, request("POST", path, ordinary(), None)).await;
            assert_eq!(status, StatusCode::FORBIDDEN, "{path}");
        }
        let (status, _, _) =
            send(&app, request("GET", "/api/v1/control/status", ordinary(), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!state.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_mutations_require_csrf_token() {
        let state = state_with_repo(Arc::new(MemoryRepository::default()));
        let app = create_router(state.clone());

        let (status, _, _) = send(
            &app,
            request("POST", "/api/v1/snapshots", ordinary(), Some(snapshot_body("/a"))),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (cookie, token) = open_session(&app).await;
        let mut req = request("POST", "/api/v1/snapshots", ordinary(), Some(snapshot_body("/a")));
        req.headers_mut().insert(header::COOKIE, cookie.parse().unwrap());
        req.headers_mut()
            .insert("x-snapshot-csrf-token", "not-the-token".parse().unwrap());
        let (status, _, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(state.registry.is_empty());

        let mut req = request("POST", "/api/v1/snapshots", ordinary(), Some(snapshot_body("/a")));
        req.headers_mut().insert(header::COOKIE, cookie.parse().unwrap());
        req.headers_mut()
            .insert("x-snapshot-csrf-token", token.parse().unwrap());
        let (status, _, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["stats"]["totalDirs"], 4);

        let (status, _, body) = send(&app, request("GET", "/api/v1/sources", ordinary(), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sources"].as_array().unwrap().len(), 1);
        assert_eq!(body["sources"][0]["source"]["path"], "/a");
    }

    #[tokio::test]
    async fn test_refresh_reflects_out_of_band_changes() {
        let repo = Arc::new(MemoryRepository::default());
        let state = state_with_repo(repo.clone());
        let app = create_router(state.clone());

        for path in ["/a", "/b"] {
            repo.record_snapshot(&NewSnapshot {
                source: SourceInfo::new("fake-hostname", "fake-username", path),
                start_time: chrono::Utc::now(),
                end_time: chrono::Utc::now(),
                stats: SnapshotStats::default(),
            })
            .unwrap();
        }

        let (status, _, body) =
            send(&app, request("POST", "/api/v1/control/refresh", control(), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["added"], 2);

        repo.delete_source(&SourceInfo::new("fake-hostname", "fake-username", "/b"))
            .unwrap();
        let (_, _, body) = send(&app, request("GET", "/api/v1/sources", ordinary(), None)).await;
        assert_eq!(body["sources"].as_array().unwrap().len(), 2);

        let (status, _, body) =
            send(&app, request("POST", "/api/v1/control/refresh", control(), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["removed"], 1);

        let (_, _, body) = send(&app, request("GET", "/api/v1/sources", ordinary(), None)).await;
        assert_eq!(body["sources"].as_array().unwrap().len(), 1);
        assert!(!state.metrics.render().unwrap().contains("path=\"/b\""));
    }

    #[tokio::test]
    async fn test_recorded_snapshot_survives_concurrent_refresh() {
        let repo = Arc::new(MemoryRepository::default());
        let state = state_with_repo(repo.clone());
        let app = create_router(state.clone());
        let (cookie, token) = open_session(&app).await;

        let req = with_session(
            request("POST", "/api/v1/snapshots", ordinary(), Some(snapshot_body("/new"))),
            &cookie,
            &token,
        );
        let status = send_during_refresh(&state, &repo, &app, req).await;
        assert_eq!(status, StatusCode::CREATED);

        let source = SourceInfo::new("fake-hostname", "fake-username", "/new");
        assert!(state.registry.get(&source).is_some());
        assert!(state.metrics.render().unwrap().contains("path=\"/new\""));
    }

    #[tokio::test]
    async fn test_deleted_source_stays_deleted_after_concurrent_refresh() {
        let repo = Arc::new(MemoryRepository::default());
        let source = SourceInfo::new("fake-hostname", "fake-username", "/old");
        repo.record_snapshot(&NewSnapshot {
            source: source.clone(),
            start_time: chrono::Utc::now(),
            end_time: chrono::Utc::now(),
            stats: SnapshotStats::default(),
        })
        .unwrap();
        let state = state_with_repo(repo.clone());
        refresh(&state).await.unwrap();
        let app = create_router(state.clone());
        let (cookie, token) = open_session(&app).await;

        let req = with_session(
            request(
                "POST",
                "/api/v1/sources/delete",
                ordinary(),
                Some(json!({ "source": { "host": "fake-hostname", "userName": "fake-username", "path": "/old" } })),
            ),
            &cookie,
            &token,
        );
        let status = send_during_refresh(&state, &repo, &app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.registry.get(&source).is_none());
    }

    #[tokio::test]
    async fn test_policy_update_survives_concurrent_refresh() {
        let repo = Arc::new(MemoryRepository::default());
        let state = state_with_repo(repo.clone());
        let app = create_router(state.clone());
        let (cookie, token) = open_session(&app).await;

        let req = with_session(
            request(
                "PUT",
                "/api/v1/policy",
                ordinary(),
                Some(json!({ "policy": { "exposeMetrics": false } })),
            ),
            &cookie,
            &token,
        );
        let status = send_during_refresh(&state, &repo, &app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            state.registry.policy(&PolicyTarget::Global),
            Some(Policy {
                expose_metrics: Some(false)
            })
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_is_reported() {
        let repo = Arc::new(MemoryRepository::default());
        let state = state_with_repo(repo.clone());
        let app = create_router(state);

        repo.fail(true);
        let (status, _, body) =
            send(&app, request("POST", "/api/v1/control/refresh", control(), None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("repository unavailable"));
    }

    #[tokio::test]
    async fn test_policy_update_changes_exposure() {
        let state = state_with_repo(Arc::new(MemoryRepository::default()));
        let app = create_router(state.clone());
        let (cookie, token) = open_session(&app).await;

        let mut req = request("POST", "/api/v1/snapshots", ordinary(), Some(snapshot_body("/a")));
        req.headers_mut().insert(header::COOKIE, cookie.parse().unwrap());
        req.headers_mut().insert("x-snapshot-csrf-token", token.parse().unwrap());
        assert_eq!(send(&app, req).await.0, StatusCode::CREATED);
        assert!(state.metrics.render().unwrap().contains("path=\"/a\""));

        let mut req = request(
            "PUT",
            "/api/v1/policy",
            ordinary(),
            Some(json!({ "policy": { "exposeMetrics": false } })),
        );
        req.headers_mut().insert(header::COOKIE, cookie.parse().unwrap());
        req.headers_mut().insert("x-snapshot-csrf-token", token.parse().unwrap());
        let (status, _, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["effective"]["exposeMetrics"], false);
        assert!(!state.metrics.render().unwrap().contains("path=\"/a\""));

        let (status, _, body) = send(
            &app,
            request(
                "GET",
                "/api/v1/policy?host=fake-hostname&userName=fake-username&path=/a",
                ordinary(),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["policy"], json!({}));
        assert_eq!(body["effective"]["exposeMetrics"], false);

        let (status, _, _) =
            send(&app, request("GET", "/api/v1/policy?host=only", ordinary(), None)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_anonymous_sessions_stay_within_capacity() {
        let mut config = test_config();
        config.session_capacity = 8;
        let state = state_with_config(Arc::new(MemoryRepository::default()), config);
        let app = create_router(state.clone());

        for _ in 0..50 {
            open_session(&app).await;
        }
        assert_eq!(state.sessions.len(), 8);

        let (cookie, token) = open_session(&app).await;
        let (status, _, _) = send(
            &app,
            with_session(
                request("POST", "/api/v1/snapshots", ordinary(), Some(snapshot_body("/fresh"))),
                &cookie,
                &token,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_shutdown_and_status() {
        let state = state_with_repo(Arc::new(MemoryRepository::default()));
        let app = create_router(state.clone());

        let (status, _, body) =
            send(&app, request("GET", "/api/v1/control/status", control(), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sources"], 0);

        let (status, _, _) =
            send(&app, request("POST", "/api/v1/control/shutdown", control(), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.shutdown.is_cancelled());
    }
}

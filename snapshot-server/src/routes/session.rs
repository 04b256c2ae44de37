use crate::auth::session::{session_cookie, SESSION_COOKIE};
use crate::state::AppState;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

/// Hand out the CSRF token bound to the caller's session, starting a
/// session when the request has none.
pub async fn issue_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let existing = session_cookie(&headers);
    let (session_id, token) = state.sessions.issue(existing.as_deref());

    let cookie = format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; Secure; SameSite=Strict");
    ([(header::SET_COOKIE, cookie)], Json(json!({ "csrfToken": token })))
}

//! Authentication and authorization for the main API.

pub mod credentials;
pub mod operation;
pub mod session;

use crate::error::AppError;
use crate::state::AppState;
use axum::extract::{MatchedPath, Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use credentials::CredentialClass;
use operation::Operation;
use std::sync::Arc;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("authentication required")]
    MissingCredentials,

    #[error("malformed credentials")]
    MalformedCredentials,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("{class:?} credentials may not call {operation}")]
    WrongClass {
        class: CredentialClass,
        operation: &'static str,
    },

    #[error("operation not permitted")]
    UnknownOperation,

    #[error("missing CSRF token")]
    MissingCsrfToken,

    #[error("invalid CSRF token")]
    InvalidCsrfToken,
}

impl AuthError {
    /// True when the caller failed to prove an identity at all.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::MissingCredentials | Self::MalformedCredentials | Self::InvalidCredentials
        )
    }
}

/// The authenticated caller of the current request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub class: CredentialClass,
    pub username: String,
    pub operation: Operation,
}

/// Route layer for every authenticated endpoint: basic auth, class check
/// against the operation allow-list, then CSRF for ordinary mutations.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let headers = request.headers();

    let (class, username) = state.auth.authenticate_header(
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
    )?;

    let operation =
        Operation::resolve(request.method(), &path).ok_or(AuthError::UnknownOperation)?;

    if !operation.permits(class) {
        tracing::warn!(
            "Rejected {} call from {} ({:?} credentials)",
            operation.name(),
            username,
            class
        );
        return Err(AuthError::WrongClass {
            class,
            operation: operation.name(),
        }
        .into());
    }

    if class == CredentialClass::Ordinary && operation.is_mutating() {
        state.sessions.verify(
            session::session_cookie(headers).as_deref(),
            session::csrf_header(headers).as_deref(),
        )?;
    }

    tracing::debug!("Authorized {} for {}", operation.name(), username);
    request.extensions_mut().insert(Caller {
        class,
        username,
        operation,
    });
    Ok(next.run(request).await)
}

//! Session-bound anti-forgery tokens.
//!
//! `GET /api/v1/session` hands out a session cookie and the CSRF token bound
//! to it. Ordinary mutating calls must echo the token in a header alongside
//! the cookie.

use super::AuthError;
use axum::http::{header, HeaderMap};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::RngCore;
use std::collections::VecDeque;
use std::sync::Arc;
use subtle::ConstantTimeEq;

pub const SESSION_COOKIE: &str = "Snapshot-Session";
pub const CSRF_HEADER: &str = "x-snapshot-csrf-token";

struct Session {
    csrf_token: String,
    issued_at: DateTime<Utc>,
}

/// Sessions keyed by id. All sessions share one TTL, so issue order is
/// also expiry order: `order` holds ids oldest first and expiry or eviction
/// only ever touches its front.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Session>>,
    order: Arc<Mutex<VecDeque<String>>>,
    ttl: Duration,
    capacity: usize,
}

impl SessionStore {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            order: Arc::new(Mutex::new(VecDeque::new())),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Return the token of a live session, or start a new one. When the
    /// store is full the oldest session is evicted.
    pub fn issue(&self, existing: Option<&str>) -> (String, String) {
        if let Some(id) = existing {
            if let Some(session) = self.sessions.get(id) {
                if !self.is_expired(&session) {
                    return (id.to_string(), session.csrf_token.clone());
                }
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let token = random_token();

        let mut order = self.order.lock();
        self.expire_oldest(&mut order);
        while order.len() >= self.capacity {
            match order.pop_front() {
                Some(oldest) => {
                    self.sessions.remove(&oldest);
                }
                None => break,
            }
        }
        self.sessions.insert(
            id.clone(),
            Session {
                csrf_token: token.clone(),
                issued_at: Utc::now(),
            },
        );
        order.push_back(id.clone());
        (id, token)
    }

    pub fn verify(&self, session_id: Option<&str>, token: Option<&str>) -> Result<(), AuthError> {
        let (session_id, token) = match (session_id, token) {
            (Some(s), Some(t)) => (s, t),
            _ => return Err(AuthError::MissingCsrfToken),
        };

        let session = self
            .sessions
            .get(session_id)
            .ok_or(AuthError::InvalidCsrfToken)?;
        if self.is_expired(&session) {
            return Err(AuthError::InvalidCsrfToken);
        }
        if bool::from(session.csrf_token.as_bytes().ct_eq(token.as_bytes())) {
            Ok(())
        } else {
            Err(AuthError::InvalidCsrfToken)
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_expired(&self, session: &Session) -> bool {
        Utc::now() - session.issued_at > self.ttl
    }

    // Drops expired sessions from the front of the queue; stops at the
    // first live one.
    fn expire_oldest(&self, order: &mut VecDeque<String>) {
        while let Some(oldest) = order.front() {
            let live = self
                .sessions
                .get(oldest)
                .map(|s| !self.is_expired(&s))
                .unwrap_or(false);
            if live {
                break;
            }
            if let Some(id) = order.pop_front() {
                self.sessions.remove(&id);
            }
        }
    }
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Value of the session cookie, if the request carries one.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
}

pub fn csrf_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

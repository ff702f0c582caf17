// src/auth/session.rs
use axum::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::{Mutex, RwLock};

use crate::storage::StoreError;

pub const SESSION_COOKIE: &str = "session_id";
pub const AUTH_USER_KEY: &str = "auth_user";
const CSRF_TOKEN_LENGTH: usize = 40;
const SESSION_LIFETIME_HOURS: i64 = 24;

fn generate_session_id() -> String {
    let mut random_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut random_bytes);
    hex::encode(random_bytes)
}

fn generate_csrf_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(CSRF_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// The user a session is logged in as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    pub two_factor_secret: Option<String>,
}

impl AuthenticatedUser {
    pub fn has_two_factor(&self) -> bool {
        self.two_factor_secret
            .as_deref()
            .map(|secret| !secret.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Server-side session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &str, key: &str) -> Result<Option<Value>, StoreError>;
    async fn put(&self, id: &str, key: &str, value: Value) -> Result<(), StoreError>;
    /// Drops every value of the session and rotates its CSRF token.
    async fn flush(&self, id: &str) -> Result<(), StoreError>;
    async fn verify_csrf_token(&self, id: &str, token: &str) -> Result<bool, StoreError>;
}

/// A request's view of its session.
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    store: Arc<dyn SessionStore>,
}

impl SessionHandle {
    pub fn new(id: impl Into<String>, store: Arc<dyn SessionStore>) -> Self {
        Self { id: id.into(), store }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.store.get(&self.id, key).await
    }

    pub async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.store.put(&self.id, key, value).await
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.store.flush(&self.id).await
    }

    pub async fn verify_csrf_token(&self, token: &str) -> Result<bool, StoreError> {
        self.store.verify_csrf_token(&self.id, token).await
    }

    pub async fn user(&self) -> Result<Option<AuthenticatedUser>, StoreError> {
        match self.get(AUTH_USER_KEY).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| StoreError::Malformed(e.to_string())),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone)]
struct SessionData {
    values: HashMap<String, Value>,
    csrf_token: String,
    expires_at: DateTime<Utc>,
}

impl SessionData {
    fn fresh() -> Self {
        Self {
            values: HashMap::new(),
            csrf_token: generate_csrf_token(),
            expires_at: Utc::now() + Duration::hours(SESSION_LIFETIME_HOURS),
        }
    }
}

// In-memory session store (in production, use Redis or database)
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionData>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn create_session(&self) -> String {
        let session_id = generate_session_id();
        self.sessions.write().await.insert(session_id.clone(), SessionData::fresh());
        session_id
    }

    pub async fn exists(&self, id: &str) -> bool {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|session| session.expires_at > Utc::now())
            .unwrap_or(false)
    }

    pub async fn csrf_token(&self, id: &str) -> Option<String> {
        self.sessions.read().await.get(id).map(|s| s.csrf_token.clone())
    }

    pub async fn login(&self, id: &str, user: &AuthenticatedUser) -> Result<(), StoreError> {
        let value = serde_json::to_value(user).map_err(|e| StoreError::Malformed(e.to_string()))?;
        self.put(id, AUTH_USER_KEY, value).await
    }

    /// Stores a session the current request started, once that request has been allowed.
    pub async fn adopt(&self, pending: &PendingSession) {
        let data = pending.data.lock().await.clone();
        self.sessions.write().await.insert(pending.id.clone(), data);
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn cleanup_expired(&self) {
        let now = Utc::now();
        self.sessions.write().await.retain(|_, session| session.expires_at > now);
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id)
            .filter(|session| session.expires_at > Utc::now())
            .and_then(|session| session.values.get(key).cloned()))
    }

    async fn put(&self, id: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(id).filter(|session| session.expires_at > Utc::now()) {
            Some(session) => {
                session.values.insert(key.to_string(), value);
                Ok(())
            }
            None => Err(StoreError::UnknownSession(id.to_string())),
        }
    }

    async fn flush(&self, id: &str) -> Result<(), StoreError> {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.values.clear();
            session.csrf_token = generate_csrf_token();
        }
        Ok(())
    }

    async fn verify_csrf_token(&self, id: &str, token: &str) -> Result<bool, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(id)
            .map(|session| session.csrf_token.as_bytes().ct_eq(token.as_bytes()).into())
            .unwrap_or(false))
    }
}

/// A session started by the request in flight. It lives only as long as that request
/// and reaches the shared store through [`MemorySessionStore::adopt`].
pub struct PendingSession {
    id: String,
    data: Mutex<SessionData>,
}

impl PendingSession {
    pub fn start() -> Self {
        Self {
            id: generate_session_id(),
            data: Mutex::new(SessionData::fresh()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl SessionStore for PendingSession {
    async fn get(&self, id: &str, key: &str) -> Result<Option<Value>, StoreError> {
        if id != self.id {
            return Ok(None);
        }
        Ok(self.data.lock().await.values.get(key).cloned())
    }

    async fn put(&self, id: &str, key: &str, value: Value) -> Result<(), StoreError> {
        if id != self.id {
            return Err(StoreError::UnknownSession(id.to_string()));
        }
        self.data.lock().await.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn flush(&self, id: &str) -> Result<(), StoreError> {
        if id == self.id {
            let mut data = self.data.lock().await;
            data.values.clear();
            data.csrf_token = generate_csrf_token();
        }
        Ok(())
    }

    async fn verify_csrf_token(&self, id: &str, token: &str) -> Result<bool, StoreError> {
        if id != self.id {
            return Ok(false);
        }
        Ok(self.data.lock().await.csrf_token.as_bytes().ct_eq(token.as_bytes()).into())
    }
}

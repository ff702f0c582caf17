// src/firewall/testing.rs - fixtures shared by the firewall tests
use axum::async_trait;
use axum::body::Bytes;
use axum::http::{HeaderName, HeaderValue, Method, Uri};
use serde_json::Value;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::context::{RequestContext, UploadedFile};
use super::verdict::{LayerId, Reason, Verdict};
use crate::auth::{AuthenticatedUser, SessionHandle, SessionStore};
use crate::middleware::cache::CacheStore;
use crate::storage::{GeoResolver, IpListStore, RateCounter, StoreError};

pub const CLIENT_IP: &str = "203.0.113.10";
pub const BROWSER_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Builds a request that looks like an ordinary browser until told otherwise.
pub struct RequestBuilder {
    ctx: RequestContext,
}

impl RequestBuilder {
    pub fn new(method: Method, path: &str) -> Self {
        let uri: Uri = path.parse().expect("valid test uri");
        let ip: IpAddr = CLIENT_IP.parse().expect("valid test ip");
        let mut ctx = RequestContext::new(ip, method, uri);

        if let Some(query) = ctx.uri.query().map(str::to_string) {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                ctx.inputs.insert(key.to_string(), Value::String(value.to_string()));
                ctx.query.push((key.into_owned(), value.into_owned()));
            }
        }

        Self { ctx }
            .header("user-agent", BROWSER_UA)
            .header("accept-language", "en-US,en;q=0.9")
            .header("accept-encoding", "gzip, deflate, br")
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: &str) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: &str) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn ip(mut self, ip: &str) -> Self {
        self.ctx.ip = ip.parse().expect("valid test ip");
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        let name = HeaderName::from_bytes(name.as_bytes()).expect("valid header name");
        let value = HeaderValue::from_str(value).expect("valid header value");
        self.ctx.headers.insert(name, value);
        self
    }

    pub fn without_header(mut self, name: &str) -> Self {
        let name = HeaderName::from_bytes(name.as_bytes()).expect("valid header name");
        self.ctx.headers.remove(name);
        self
    }

    pub fn input(mut self, key: &str, value: Value) -> Self {
        self.ctx.inputs.insert(key.to_string(), value);
        self
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.ctx.query.push((key.to_string(), value.to_string()));
        self.ctx
            .inputs
            .entry(key.to_string())
            .or_insert_with(|| Value::String(value.to_string()));
        self
    }

    pub fn route_param(mut self, key: &str, value: &str) -> Self {
        self.ctx.route_params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn file(mut self, file: UploadedFile) -> Self {
        self.ctx.files.push(file);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.ctx.body = body.into();
        self
    }

    pub fn secure(mut self) -> Self {
        self.ctx.secure = true;
        self
    }

    pub fn trusted_proxy(mut self) -> Self {
        self.ctx.forwarded_trusted = true;
        self
    }

    pub fn user(mut self, user: AuthenticatedUser) -> Self {
        self.ctx.user = Some(user);
        self
    }

    pub fn session(mut self, session: SessionHandle) -> Self {
        self.ctx.session = Some(session);
        self
    }

    pub fn build(self) -> RequestContext {
        self.ctx
    }
}

/// Wraps a collaborator and counts every call made through it.
pub struct Spy<T> {
    pub inner: T,
    calls: AtomicUsize,
}

impl<T> Spy<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) -> &T {
        self.calls.fetch_add(1, Ordering::SeqCst);
        &self.inner
    }
}

#[async_trait]
impl<T: IpListStore> IpListStore for Spy<T> {
    async fn is_whitelisted(&self, ip: IpAddr) -> Result<bool, StoreError> {
        self.hit().is_whitelisted(ip).await
    }

    async fn is_blacklisted(&self, ip: IpAddr) -> Result<bool, StoreError> {
        self.hit().is_blacklisted(ip).await
    }
}

#[async_trait]
impl<T: RateCounter> RateCounter for Spy<T> {
    async fn check_and_increment(&self, key: &str, max_attempts: u32, decay: Duration) -> Result<bool, StoreError> {
        self.hit().check_and_increment(key, max_attempts, decay).await
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.hit().clear(key).await
    }

    async fn available_in(&self, key: &str) -> Result<u64, StoreError> {
        self.hit().available_in(key).await
    }
}

#[async_trait]
impl<T: GeoResolver> GeoResolver for Spy<T> {
    async fn country_code(&self, ip: IpAddr) -> Result<String, StoreError> {
        self.hit().country_code(ip).await
    }
}

#[async_trait]
impl<T: CacheStore> CacheStore for Spy<T> {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.hit().get(key).await
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError> {
        self.hit().put(key, value, ttl).await
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        self.hit().increment(key, ttl).await
    }
}

#[async_trait]
impl<T: SessionStore> SessionStore for Spy<T> {
    async fn get(&self, id: &str, key: &str) -> Result<Option<Value>, StoreError> {
        self.hit().get(id, key).await
    }

    async fn put(&self, id: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.hit().put(id, key, value).await
    }

    async fn flush(&self, id: &str) -> Result<(), StoreError> {
        self.hit().flush(id).await
    }

    async fn verify_csrf_token(&self, id: &str, token: &str) -> Result<bool, StoreError> {
        self.hit().verify_csrf_token(id, token).await
    }
}

/// A collaborator whose backend is down.
pub struct Unavailable;

fn down<T>() -> Result<T, StoreError> {
    Err(StoreError::Unavailable("connection refused".into()))
}

#[async_trait]
impl IpListStore for Unavailable {
    async fn is_whitelisted(&self, _: IpAddr) -> Result<bool, StoreError> {
        down()
    }

    async fn is_blacklisted(&self, _: IpAddr) -> Result<bool, StoreError> {
        down()
    }
}

#[async_trait]
impl SessionStore for Unavailable {
    async fn get(&self, _: &str, _: &str) -> Result<Option<Value>, StoreError> {
        down()
    }

    async fn put(&self, _: &str, _: &str, _: Value) -> Result<(), StoreError> {
        down()
    }

    async fn flush(&self, _: &str) -> Result<(), StoreError> {
        down()
    }

    async fn verify_csrf_token(&self, _: &str, _: &str) -> Result<bool, StoreError> {
        down()
    }
}

/// A collaborator that never answers.
pub struct Stalled;

#[async_trait]
impl RateCounter for Stalled {
    async fn check_and_increment(&self, _: &str, _: u32, _: Duration) -> Result<bool, StoreError> {
        std::future::pending().await
    }

    async fn clear(&self, _: &str) -> Result<(), StoreError> {
        std::future::pending().await
    }

    async fn available_in(&self, _: &str) -> Result<u64, StoreError> {
        std::future::pending().await
    }
}

#[async_trait]
impl GeoResolver for Stalled {
    async fn country_code(&self, _: IpAddr) -> Result<String, StoreError> {
        std::future::pending().await
    }
}

/// A stand-in gate that records whether the pipeline reached it.
pub struct ProbeLayer {
    pub id: LayerId,
    deny: bool,
    calls: Arc<AtomicUsize>,
}

impl ProbeLayer {
    pub fn allowing(id: LayerId) -> (Self, Arc<AtomicUsize>) {
        Self::with(id, false)
    }

    pub fn denying(id: LayerId) -> (Self, Arc<AtomicUsize>) {
        Self::with(id, true)
    }

    fn with(id: LayerId, deny: bool) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (Self { id, deny, calls: calls.clone() }, calls)
    }

    pub fn evaluate(&self) -> Verdict {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.deny {
            Verdict::deny(self.id, Reason::Blacklisted, axum::http::StatusCode::FORBIDDEN, "probe")
        } else {
            Verdict::allow(self.id)
        }
    }
}

// src/middleware/firewall.rs - runs every request through the firewall pipeline
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, FromRequest, FromRequestParts, Multipart, RawPathParams, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde_json::{json, Map, Value};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::auth::session::SESSION_COOKIE;
use crate::auth::{MemorySessionStore, PendingSession, SessionHandle};
use crate::config::FirewallConfig;
use crate::firewall::{CspNonce, Decision, Firewall, LayerId, Reason, RequestContext, UploadedFile, Verdict, VerdictData};
use crate::utils::patterns::RouteMatcher;

/// Request inputs after the sanitization layer ran, for handlers to read.
#[derive(Debug, Clone, Default)]
pub struct SanitizedInput(pub Map<String, Value>);

impl SanitizedInput {
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Parses a scalar input, whether it arrived as a JSON number or as text.
    pub fn parse<T: FromStr>(&self, key: &str) -> Option<T> {
        match self.0.get(key)? {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => n.to_string().parse().ok(),
            _ => None,
        }
    }
}

/// Descriptors of the files that passed the upload layer.
#[derive(Debug, Clone, Default)]
pub struct Uploads(pub Vec<UploadedFile>);

#[derive(Clone)]
pub struct FirewallState {
    pub firewall: Arc<Firewall>,
    pub sessions: Arc<MemorySessionStore>,
    stateless: Arc<RouteMatcher>,
}

impl FirewallState {
    pub fn new(firewall: Arc<Firewall>, sessions: Arc<MemorySessionStore>) -> Self {
        let stateless = Arc::new(RouteMatcher::new(&firewall.config().session_exempt_routes));
        Self {
            firewall,
            sessions,
            stateless,
        }
    }
}

pub async fn firewall_guard(State(state): State<FirewallState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    let firewall = &state.firewall;
    let config = firewall.config();

    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let trusted = peer.map_or(false, |ip| config.trusted_proxies.iter().any(|range| range.contains(&ip)));

    let mut ctx = RequestContext::new(client_ip(&parts.headers, peer, trusted), parts.method.clone(), parts.uri.clone());
    ctx.headers = parts.headers.clone();
    ctx.forwarded_trusted = trusted;
    // Origin-form URIs carry no scheme; a TLS-fronted listener is declared in config.
    ctx.secure = config.assume_https || parts.uri.scheme_str() == Some("https");
    read_query(&mut ctx);
    read_route_params(&mut ctx, &mut parts).await;

    let bytes = match axum::body::to_bytes(body, body_limit(config)).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(ip = %ctx.ip, "Request body rejected while buffering: {}", e);
            return refuse(
                firewall,
                &ctx,
                Verdict::deny(
                    LayerId::RequestValidation,
                    Reason::PayloadTooLarge,
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "Request payload too large",
                ),
            );
        }
    };
    ctx.body = bytes.clone();
    if let Err(e) = read_body(&mut ctx, &parts).await {
        warn!(ip = %ctx.ip, path = %ctx.route, "Unreadable multipart body: {}", e);
        return refuse(
            firewall,
            &ctx,
            Verdict::deny(
                LayerId::RequestValidation,
                Reason::MalformedMultipart,
                StatusCode::BAD_REQUEST,
                "Malformed multipart body",
            ),
        );
    }

    let pending = attach_session(&state, &mut ctx).await;

    let decision = firewall.run(&mut ctx).await;
    if let Decision::Deny(verdict) = &decision {
        let mut response = deny_response(verdict);
        firewall.apply_response(response.headers_mut(), &decision, None);
        return response;
    }

    // A session this request started is only stored once the request got through.
    if let Some(pending) = &pending {
        state.sessions.adopt(pending).await;
    }

    let RequestContext {
        inputs,
        files,
        session,
        user,
        ..
    } = ctx;
    let session = match &pending {
        Some(pending) => Some(SessionHandle::new(pending.id(), state.sessions.clone())),
        None => session,
    };

    let mut request = Request::from_parts(parts, Body::from(bytes));
    let extensions = request.extensions_mut();
    extensions.insert(SanitizedInput(inputs));
    extensions.insert(Uploads(files));
    extensions.insert(CspNonce::generate());
    if let Some(session) = session {
        extensions.insert(session);
    }
    if let Some(user) = user {
        extensions.insert(user);
    }

    let mut response = next.run(request).await;

    // A handler that used the nonce hands it back so the policy can allow it.
    let nonce = response.extensions().get::<CspNonce>().cloned();
    if let Some(pending) = pending {
        let cookie = Cookie::build((SESSION_COOKIE, pending.id().to_string())).path("/").build();
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => warn!("Session cookie is not a valid header value: {}", e),
        }
    }
    firewall.apply_response(response.headers_mut(), &decision, nonce.as_ref());
    response
}

/// Denies a request the adapter could not even hand to the pipeline.
fn refuse(firewall: &Firewall, ctx: &RequestContext, verdict: Verdict) -> Response {
    let mut response = deny_response(&verdict);
    let decision = firewall.reject(ctx, verdict);
    firewall.apply_response(response.headers_mut(), &decision, None);
    response
}

/// The peer address, or the forwarded client address when the peer is a trusted proxy.
fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trusted: bool) -> IpAddr {
    let peer = peer.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    if !trusted {
        return peer;
    }

    let header_ip = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    };
    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .unwrap_or(peer)
}

fn body_limit(config: &FirewallConfig) -> usize {
    let limit = if config.layer_enabled(LayerId::RequestValidation) {
        config.max_payload_bytes
    } else {
        config.max_payload_bytes.max(config.max_file_bytes)
    };
    usize::try_from(limit).unwrap_or(usize::MAX)
}

fn read_query(ctx: &mut RequestContext) {
    let Some(query) = ctx.uri.query().map(str::to_string) else {
        return;
    };
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        ctx.inputs.insert(key.to_string(), Value::String(value.to_string()));
        ctx.query.push((key.into_owned(), value.into_owned()));
    }
}

/// Captures of the matched route, so the injection filters see them too.
async fn read_route_params(ctx: &mut RequestContext, parts: &mut Parts) {
    if let Ok(params) = RawPathParams::from_request_parts(parts, &()).await {
        for (key, value) in params.iter() {
            ctx.route_params.insert(key.to_string(), value.to_string());
        }
    }
}

/// Merges the body into the inputs; body fields replace query fields of the same name.
async fn read_body(ctx: &mut RequestContext, parts: &Parts) -> anyhow::Result<()> {
    if ctx.body.is_empty() {
        return Ok(());
    }
    let content_type = ctx.header("content-type").unwrap_or("").to_ascii_lowercase();

    if ctx.is_json() {
        // Invalid JSON is left for the request validation layer to reject.
        if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(&ctx.body) {
            ctx.inputs.extend(map);
        }
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(&ctx.body).into_owned().collect();
        for (key, value) in pairs {
            ctx.inputs.insert(key, Value::String(value));
        }
    } else if content_type.starts_with("multipart/form-data") {
        read_multipart(ctx, parts).await?;
    }
    Ok(())
}

async fn read_multipart(ctx: &mut RequestContext, parts: &Parts) -> anyhow::Result<()> {
    let mut request = Request::new(Body::from(ctx.body.clone()));
    *request.headers_mut() = parts.headers.clone();
    *request.extensions_mut() = parts.extensions.clone();
    let mut multipart = Multipart::from_request(request, &()).await?;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let declared = field.content_type().map(str::to_string);
                let data: Bytes = field.bytes().await?;
                ctx.files.push(UploadedFile::from_bytes(name, file_name, declared, &data));
            }
            None => {
                let text = field.text().await?;
                ctx.inputs.insert(name, Value::String(text));
            }
        }
    }
    Ok(())
}

/// Joins the request to its session. A visitor without one gets a pending session that
/// the layers can use but that is stored only if the request is allowed.
async fn attach_session(state: &FirewallState, ctx: &mut RequestContext) -> Option<Arc<PendingSession>> {
    let jar = CookieJar::from_headers(&ctx.headers);
    let known = match jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        Some(id) if state.sessions.exists(&id).await => Some(id),
        _ => None,
    };

    if let Some(id) = known {
        let handle = SessionHandle::new(id, state.sessions.clone());
        ctx.user = match handle.user().await {
            Ok(user) => user,
            Err(e) => {
                warn!("Could not read session user: {}", e);
                None
            }
        };
        ctx.session = Some(handle);
        return None;
    }
    if state.stateless.matches(&ctx.route) {
        return None;
    }

    let pending = Arc::new(PendingSession::start());
    ctx.session = Some(SessionHandle::new(pending.id(), pending.clone()));
    Some(pending)
}

pub fn deny_response(verdict: &Verdict) -> Response {
    let status = verdict.status().unwrap_or(StatusCode::FORBIDDEN);
    let mut body = json!({
        "error": status.canonical_reason().unwrap_or("Request Blocked"),
        "message": verdict.message().unwrap_or_default(),
        "code": "FIREWALL_BLOCKED",
        "layer": verdict.layer,
        "reason": verdict.reason,
    });

    let mut headers = HeaderMap::new();
    match &verdict.data {
        Some(VerdictData::RetryAfter(seconds)) => {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(*seconds));
        }
        Some(VerdictData::Redirect(url)) => {
            if let Ok(location) = HeaderValue::from_str(url) {
                headers.insert(header::LOCATION, location);
            }
            body["redirect"] = Value::String(url.clone());
        }
        _ => {}
    }

    (status, headers, Json(body)).into_response()
}

// src/handlers/firewall_admin.rs - operator endpoints for the firewall
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Extension, Json,
};
use serde_json::{json, Value};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::middleware::SanitizedInput;
use crate::services::audit::{AuditEntry, FirewallStatistics};
use crate::storage::ip_list::TemporaryBlock;
use crate::AppState;

const DEFAULT_STATS_HOURS: i64 = 24;
const MAX_STATS_HOURS: i64 = 24 * 30;
const DEFAULT_EVENTS: usize = 50;
const MAX_EVENTS: usize = 500;
const MAX_BLOCK_MINUTES: u64 = 7 * 24 * 60;

/// Bearer-token check. Without a configured token the endpoints do not exist.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(StatusCode::NOT_FOUND);
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    if bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        tracing::warn!("Rejected firewall admin request with a bad token");
        Err(StatusCode::UNAUTHORIZED)
    }
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(input): Extension<SanitizedInput>,
) -> Result<Json<FirewallStatistics>, StatusCode> {
    authorize(&state, &headers)?;
    let hours = input
        .parse::<i64>("hours")
        .unwrap_or(DEFAULT_STATS_HOURS).clamp(1, MAX_STATS_HOURS);
    Ok(Json(state.firewall.audit().statistics(chrono::Duration::hours(hours))))
}

pub async fn recent_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(input): Extension<SanitizedInput>,
) -> Result<Json<Vec<AuditEntry>>, StatusCode> {
    authorize(&state, &headers)?;
    let limit = input.parse::<usize>("limit").unwrap_or(DEFAULT_EVENTS).min(MAX_EVENTS);
    Ok(Json(state.firewall.audit().recent(limit)))
}

pub async fn list_blocks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<TemporaryBlock>>, StatusCode> {
    authorize(&state, &headers)?;
    Ok(Json(state.ip_list.active_blocks().await))
}

pub async fn block_ip(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(input): Extension<SanitizedInput>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    authorize(&state, &headers)?;

    let ip: IpAddr = input.parse("ip").ok_or(StatusCode::BAD_REQUEST)?;
    let minutes = input
        .parse::<u64>("minutes")
        .filter(|m| (1..=MAX_BLOCK_MINUTES).contains(m))
        .ok_or(StatusCode::UNPROCESSABLE_ENTITY)?;
    let reason = input
        .str("reason")
        .filter(|r| !r.is_empty())
        .unwrap_or("Blocked by administrator")
        .to_string();

    state
        .ip_list
        .block_ip(ip, Duration::from_secs(minutes * 60), reason)
        .await;

    Ok((StatusCode::CREATED, Json(json!({ "ip": ip, "minutes": minutes }))))
}

pub async fn unblock_ip(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(ip): Path<String>,
) -> Result<StatusCode, StatusCode> {
    authorize(&state, &headers)?;

    let ip: IpAddr = ip.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
    if state.ip_list.unblock_ip(ip).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

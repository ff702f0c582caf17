// src/handlers/web.rs
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::SessionHandle;
use crate::firewall::CspNonce;
use crate::middleware::{SanitizedInput, Uploads};
use crate::models::*;
use crate::templates;
use crate::AppState;

pub async fn index(
    State(state): State<Arc<AppState>>,
    Extension(nonce): Extension<CspNonce>,
    session: Option<Extension<SessionHandle>>,
) -> Result<Response, StatusCode> {
    let notes = state.db.search_notes("", 20).await.map_err(|e| {
        tracing::error!("Failed to load notes: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let token = match session {
        Some(Extension(session)) => state.sessions.csrf_token(session.id()).await.unwrap_or_default(),
        None => String::new(),
    };

    let mut response = Html(templates::index::render(&notes, &token, &nonce)).into_response();
    // Hand the nonce back so the CSP layer admits the page's inline script.
    response.extensions_mut().insert(nonce);
    Ok(response)
}

pub async fn csrf_token(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
) -> Result<Json<Value>, StatusCode> {
    let token = state
        .sessions
        .csrf_token(session.id())
        .await
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "token": token })))
}

pub async fn echo(Extension(input): Extension<SanitizedInput>) -> Json<Value> {
    Json(Value::Object(input.0))
}

pub async fn upload(Extension(Uploads(files)): Extension<Uploads>) -> Result<Json<Vec<UploadSummary>>, StatusCode> {
    if files.is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }

    let summaries = files
        .into_iter()
        .map(|file| UploadSummary {
            mime: file.mime().map(str::to_string),
            field: file.field,
            name: file.name,
            size: file.size,
        })
        .collect();
    Ok(Json(summaries))
}

pub async fn create_note(
    State(state): State<Arc<AppState>>,
    Extension(input): Extension<SanitizedInput>,
) -> Result<(StatusCode, Json<Note>), StatusCode> {
    let body = input.str("body").unwrap_or("");
    if body.is_empty() || body.chars().count() > MAX_NOTE_LEN {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    let author = input.str("author").filter(|a| !a.is_empty()).unwrap_or("anonymous");

    let note = state.db.create_note(author, body).await.map_err(|e| {
        tracing::error!("Failed to create note: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn search_notes(
    State(state): State<Arc<AppState>>,
    Extension(input): Extension<SanitizedInput>,
) -> Result<Json<Vec<Note>>, StatusCode> {
    let term: String = input
        .str("q")
        .unwrap_or_default()
        .chars()
        .take(MAX_SEARCH_QUERY_LEN)
        .collect();

    let notes = state
        .db
        .search_notes(&term, 50)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(notes))
}

// src/models.rs
use serde::{Deserialize, Serialize};

pub const MAX_NOTE_LEN: usize = 2000;
pub const MAX_SEARCH_QUERY_LEN: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Note {
    pub id: i64,
    pub author: String,
    pub body: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct UploadSummary {
    pub field: String,
    pub name: String,
    pub size: u64,
    pub mime: Option<String>,
}

// src/db.rs
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;

use crate::firewall::{QueryEvent, QueryObserverRegistry};
use crate::models::*;

/// SQLite access. Every statement is timed and announced to the query observers.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    observers: Arc<QueryObserverRegistry>,
}

impl Database {
    pub async fn new(database_url: &str, observers: Arc<QueryObserverRegistry>) -> Result<Self, sqlx::Error> {
        // An in-memory database lives and dies with its connection.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool, observers })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    pub fn observers(&self) -> &Arc<QueryObserverRegistry> {
        &self.observers
    }

    fn observe(&self, sql: &str, bindings: Vec<String>, started: Instant) {
        self.observers.dispatch(&QueryEvent {
            sql: sql.to_string(),
            bindings,
            elapsed: started.elapsed(),
        });
    }

    pub async fn create_note(&self, author: &str, body: &str) -> Result<Note, sqlx::Error> {
        const SQL: &str = "INSERT INTO notes (author, body) VALUES (?, ?)";
        let started = Instant::now();
        let result = sqlx::query(SQL).bind(author).bind(body).execute(&self.pool).await;
        self.observe(SQL, vec![author.to_string(), body.to_string()], started);

        self.get_note(result?.last_insert_rowid()).await
    }

    pub async fn get_note(&self, id: i64) -> Result<Note, sqlx::Error> {
        const SQL: &str = "SELECT id, author, body, created_at FROM notes WHERE id = ?";
        let started = Instant::now();
        let note = sqlx::query_as::<_, Note>(SQL).bind(id).fetch_one(&self.pool).await;
        self.observe(SQL, vec![id.to_string()], started);
        note
    }

    pub async fn search_notes(&self, term: &str, limit: i64) -> Result<Vec<Note>, sqlx::Error> {
        const SQL: &str = "SELECT id, author, body, created_at FROM notes
             WHERE body LIKE ? ORDER BY id DESC LIMIT ?";
        let pattern = format!("%{}%", term);
        let started = Instant::now();
        let notes = sqlx::query_as::<_, Note>(SQL)
            .bind(&pattern)
            .bind(limit)
            .fetch_all(&self.pool)
            .await;
        self.observe(SQL, vec![pattern, limit.to_string()], started);
        notes
    }
}

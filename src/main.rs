// src/main.rs
mod auth;
mod config;
mod db;
mod firewall;
mod handlers;
mod middleware;
mod models;
mod routes;
mod services;
mod storage;
mod templates;
mod utils;

use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::auth::MemorySessionStore;
use crate::config::Config;
use crate::db::Database;
use crate::firewall::{Collaborators, Firewall, QueryObserverRegistry};
use crate::middleware::CacheService;
use crate::routes::create_router;
use crate::services::audit::AuditLog;
use crate::storage::{GeoResolver, HttpGeoResolver, MemoryIpList, MemoryRateCounter, StaticGeoResolver};

const CACHE_CAPACITY: u64 = 100_000;

pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub firewall: Arc<Firewall>,
    pub ip_list: Arc<MemoryIpList>,
    pub sessions: Arc<MemorySessionStore>,
    rate_counter: Arc<MemoryRateCounter>,
}

impl AppState {
    /// Opens the database, wires the collaborators into the firewall and attaches
    /// the injection monitor to the query stream.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let observers = Arc::new(QueryObserverRegistry::new());
        let db = Database::new(&config.database_url, observers)
            .await
            .with_context(|| format!("connecting to {}", config.database_url))?;
        db.migrate().await.context("running migrations")?;

        let firewall_config = Arc::new(config.firewall.clone());
        let ip_list = Arc::new(MemoryIpList::new(
            firewall_config.ip_whitelist.clone(),
            firewall_config.ip_blacklist.clone(),
        ));
        let rate_counter = Arc::new(MemoryRateCounter::new());
        let geo: Arc<dyn GeoResolver> = match &firewall_config.geo_endpoint {
            Some(endpoint) => Arc::new(HttpGeoResolver::new(endpoint.clone(), firewall_config.collaborator_timeout)?),
            None => Arc::new(StaticGeoResolver::new()),
        };

        let audit = Arc::new(AuditLog::new(firewall_config.audit_retention));
        let collaborators = Collaborators {
            ip_list: ip_list.clone(),
            rate_counter: rate_counter.clone(),
            geo,
            cache: Arc::new(CacheService::new(CACHE_CAPACITY)),
        };
        let firewall = Arc::new(Firewall::new(firewall_config, collaborators, audit));
        if firewall.install_query_monitor(db.observers()) {
            tracing::info!("Database injection monitor attached");
        }

        Ok(Self {
            config,
            db,
            firewall,
            ip_list,
            sessions: Arc::new(MemorySessionStore::new()),
            rate_counter,
        })
    }
}

fn spawn_cleanup_tasks(state: Arc<AppState>) {
    let session_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            session_state.sessions.cleanup_expired().await;
            let live = session_state.sessions.session_count().await;
            tracing::debug!(live, "Session cleanup completed");
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            state.ip_list.cleanup_expired().await;
            state.rate_counter.cleanup().await;
            let pruned = state.firewall.audit().prune();
            tracing::debug!(pruned, "Firewall store cleanup completed");
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bulwark=debug")))
        .with_target(true)
        .with_line_number(true)
        .init();

    tracing::info!("Starting bulwark...");

    let config = Config::from_env()?;
    let addr = config.server_addr()?;

    tracing::info!("Connecting to database: {}", config.database_url);
    let state = Arc::new(AppState::build(config).await?);

    let gates = state.firewall.gate_ids();
    tracing::info!(
        environment = ?state.config.firewall.environment,
        layers = gates.len(),
        "Firewall ready: {:?}",
        gates
    );
    if state.config.admin_token.is_none() {
        tracing::warn!("FIREWALL_ADMIN_TOKEN is not set; admin endpoints are disabled");
    }

    spawn_cleanup_tasks(state.clone());

    let app: Router = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

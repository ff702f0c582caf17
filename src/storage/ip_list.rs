// src/storage/ip_list.rs
use axum::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::StoreError;
use crate::utils::patterns::IpRange;

#[async_trait]
pub trait IpListStore: Send + Sync {
    async fn is_whitelisted(&self, ip: IpAddr) -> Result<bool, StoreError>;
    async fn is_blacklisted(&self, ip: IpAddr) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct TemporaryBlock {
    pub ip: IpAddr,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    #[serde(skip)]
    expires_at: Instant,
}

/// Static CIDR lists from configuration plus expiring blocks added at runtime.
pub struct MemoryIpList {
    whitelist: Vec<IpRange>,
    blacklist: Vec<IpRange>,
    temporary: RwLock<HashMap<IpAddr, TemporaryBlock>>,
}

impl MemoryIpList {
    pub fn new(whitelist: Vec<IpRange>, blacklist: Vec<IpRange>) -> Self {
        Self {
            whitelist,
            blacklist,
            temporary: RwLock::new(HashMap::new()),
        }
    }

    pub async fn block_ip(&self, ip: IpAddr, duration: Duration, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(%ip, ?duration, %reason, "IP temporarily blocked");

        self.temporary.write().await.insert(
            ip,
            TemporaryBlock {
                ip,
                reason,
                blocked_at: Utc::now(),
                expires_at: Instant::now() + duration,
            },
        );
    }

    /// Returns whether a block was actually lifted.
    pub async fn unblock_ip(&self, ip: IpAddr) -> bool {
        let removed = self.temporary.write().await.remove(&ip).is_some();
        if removed {
            tracing::info!(%ip, "IP unblocked");
        }
        removed
    }

    pub async fn active_blocks(&self) -> Vec<TemporaryBlock> {
        let now = Instant::now();
        self.temporary
            .read()
            .await
            .values()
            .filter(|block| block.expires_at > now)
            .cloned()
            .collect()
    }

    pub async fn cleanup_expired(&self) {
        let now = Instant::now();
        self.temporary.write().await.retain(|_, block| block.expires_at > now);
    }
}

#[async_trait]
impl IpListStore for MemoryIpList {
    async fn is_whitelisted(&self, ip: IpAddr) -> Result<bool, StoreError> {
        Ok(self.whitelist.iter().any(|range| range.contains(&ip)))
    }

    async fn is_blacklisted(&self, ip: IpAddr) -> Result<bool, StoreError> {
        if self.blacklist.iter().any(|range| range.contains(&ip)) {
            return Ok(true);
        }

        let temporary = self.temporary.read().await;
        Ok(temporary
            .get(&ip)
            .map(|block| block.expires_at > Instant::now())
            .unwrap_or(false))
    }
}

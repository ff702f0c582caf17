// src/firewall/layers/ip_filter.rs
use axum::http::StatusCode;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{FailPolicy, FirewallConfig};
use crate::firewall::context::RequestContext;
use crate::firewall::guard::guarded;
use crate::firewall::verdict::{LayerId, Reason, Verdict};
use crate::storage::IpListStore;

const LAYER: LayerId = LayerId::IpFilter;

/// Whitelist wins over blacklist, so a bad blacklist entry cannot lock out trusted hosts.
pub struct IpFilter {
    store: Arc<dyn IpListStore>,
    policy: FailPolicy,
    timeout: Duration,
}

impl IpFilter {
    pub fn new(config: &FirewallConfig, store: Arc<dyn IpListStore>) -> Self {
        Self {
            store,
            policy: config.ip_fail_policy,
            timeout: config.collaborator_timeout,
        }
    }

    pub async fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        match guarded(LAYER, self.policy, self.timeout, self.store.is_whitelisted(ctx.ip)).await {
            Ok(true) => return Verdict::allow_because(LAYER, Reason::Whitelisted),
            Ok(false) => {}
            Err(verdict) => return verdict,
        }

        match guarded(LAYER, self.policy, self.timeout, self.store.is_blacklisted(ctx.ip)).await {
            Ok(true) => {
                tracing::warn!(ip = %ctx.ip, path = %ctx.route, "Blocked blacklisted IP");
                Verdict::deny(LAYER, Reason::Blacklisted, StatusCode::FORBIDDEN, "Your IP address has been blocked")
            }
            Ok(false) => Verdict::allow(LAYER),
            Err(verdict) => verdict,
        }
    }
}

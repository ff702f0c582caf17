// src/firewall/layers/user_agent.rs
use axum::http::StatusCode;

use crate::config::FirewallConfig;
use crate::firewall::context::RequestContext;
use crate::firewall::verdict::{LayerId, Reason, Verdict};

const LAYER: LayerId = LayerId::UserAgent;

pub struct UserAgentFilter {
    /// Lowercased scanner signatures.
    signatures: Vec<String>,
}

impl UserAgentFilter {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            signatures: config.blocked_user_agents.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    pub fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        let user_agent = ctx.user_agent();
        if user_agent.trim().is_empty() {
            return Verdict::deny(LAYER, Reason::EmptyUserAgent, StatusCode::BAD_REQUEST, "User agent required");
        }

        let lowered = user_agent.to_lowercase();
        if let Some(signature) = self.signatures.iter().find(|s| lowered.contains(s.as_str())) {
            tracing::warn!(ip = %ctx.ip, user_agent, signature = %signature, "Blocked scanner user agent");
            return Verdict::deny(LAYER, Reason::BlockedUserAgent, StatusCode::FORBIDDEN, "Access denied");
        }

        Verdict::allow(LAYER)
    }
}

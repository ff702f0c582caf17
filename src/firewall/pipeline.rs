// src/firewall/pipeline.rs - runs the gates in order and rewrites the response
use axum::http::HeaderMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::context::RequestContext;
use super::db_monitor::{DbInjectionMonitor, QueryObserverRegistry};
use super::layers::*;
use super::response::{apply_cors, ContentSecurityPolicy, CookieHardener, CspNonce, ResponseLayer, SecurityHeaders};
use super::verdict::{LayerId, Verdict, VerdictData};
use crate::config::FirewallConfig;
use crate::middleware::cache::CacheStore;
use crate::services::audit::{AuditAction, AuditEntry, AuditLog};
use crate::storage::{GeoResolver, IpListStore, RateCounter};

/// Backing stores the gates consult.
#[derive(Clone)]
pub struct Collaborators {
    pub ip_list: Arc<dyn IpListStore>,
    pub rate_counter: Arc<dyn RateCounter>,
    pub geo: Arc<dyn GeoResolver>,
    pub cache: Arc<dyn CacheStore>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allow { cors_origin: Option<String> },
    Deny(Verdict),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

pub struct Firewall {
    config: Arc<FirewallConfig>,
    gates: Vec<GateLayer>,
    responders: Vec<ResponseLayer>,
    monitor: Arc<DbInjectionMonitor>,
    audit: Arc<AuditLog>,
}

impl Firewall {
    pub fn new(config: Arc<FirewallConfig>, collaborators: Collaborators, audit: Arc<AuditLog>) -> Self {
        let gates = vec![
            GateLayer::IpFilter(IpFilter::new(&config, collaborators.ip_list)),
            GateLayer::RateLimiter(RateLimiter::new(config.clone(), collaborators.rate_counter)),
            GateLayer::UserAgent(UserAgentFilter::new(&config)),
            GateLayer::GeoBlocking(GeoBlocker::new(config.clone(), collaborators.geo)),
            GateLayer::BotDetection(BotDetector::new(config.clone(), collaborators.cache)),
            GateLayer::SqlInjection(SqlInjectionFilter::new(&config)),
            GateLayer::Xss(XssFilter::new(&config)),
            GateLayer::Csrf(CsrfGuard::new(config.clone())),
            GateLayer::SessionSecurity(SessionSecurity::new(config.clone())),
            GateLayer::TwoFactor(TwoFactorGate::new(config.clone())),
            GateLayer::RequestValidation(RequestValidator::new(&config)),
            GateLayer::FileUpload(FileUploadGuard::new(&config)),
            GateLayer::InputSanitization(InputSanitizer::new(&config)),
            GateLayer::Cors(CorsPolicy::new(&config)),
            GateLayer::Https(HttpsEnforcer::new(&config)),
        ];
        let responders = vec![
            ResponseLayer::Csp(ContentSecurityPolicy::new(&config)),
            ResponseLayer::Headers(SecurityHeaders::new(&config)),
            ResponseLayer::Cookies(CookieHardener::new(&config)),
        ];
        Self::from_layers(config, gates, responders, audit)
    }

    /// Assembles a firewall from explicit layers, dropping the ones the config disables.
    pub fn from_layers(
        config: Arc<FirewallConfig>,
        gates: Vec<GateLayer>,
        responders: Vec<ResponseLayer>,
        audit: Arc<AuditLog>,
    ) -> Self {
        let gates = gates.into_iter().filter(|g| config.layer_enabled(g.id())).collect();
        let responders = responders
            .into_iter()
            .filter(|r| config.layer_enabled(r.id()))
            .collect();
        let monitor = Arc::new(DbInjectionMonitor::new(&config, audit.clone()));

        Self {
            config,
            gates,
            responders,
            monitor,
            audit,
        }
    }

    pub fn config(&self) -> &Arc<FirewallConfig> {
        &self.config
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    pub fn gate_ids(&self) -> Vec<LayerId> {
        self.gates.iter().map(GateLayer::id).collect()
    }

    /// Evaluates the gates in order and stops at the first deny.
    pub async fn run(&self, ctx: &mut RequestContext) -> Decision {
        let mut cors_origin = None;

        for gate in &self.gates {
            let verdict = gate.evaluate(ctx).await;
            if !verdict.is_allowed() {
                return self.reject(ctx, verdict);
            }
            if let Some(VerdictData::Origin(origin)) = verdict.data {
                cors_origin = Some(origin);
            }
        }

        self.audit.count_request(false);
        debug!(ip = %ctx.ip, route = %ctx.route, "Request passed firewall");
        Decision::Allow { cors_origin }
    }

    /// Applies the CORS grant and the response layers to an outgoing response.
    pub fn apply_response(&self, headers: &mut HeaderMap, decision: &Decision, nonce: Option<&CspNonce>) {
        if let Decision::Allow {
            cors_origin: Some(origin),
        } = decision
        {
            apply_cors(headers, origin);
        }
        for layer in &self.responders {
            layer.mutate(headers, nonce);
        }
    }

    /// Hooks the query monitor into the database; a no-op when the layer is disabled.
    pub fn install_query_monitor(&self, registry: &QueryObserverRegistry) -> bool {
        if !self.config.layer_enabled(LayerId::DbInjectionMonitor) {
            return false;
        }
        self.monitor.install(registry)
    }

    /// Logs and audits a deny exactly once, whichever stage produced it.
    pub fn reject(&self, ctx: &RequestContext, verdict: Verdict) -> Decision {
        let reason = verdict.reason.map(|r| r.as_str()).unwrap_or("");
        warn!(
            layer = %verdict.layer,
            reason,
            ip = %ctx.ip,
            method = %ctx.method,
            url = %ctx.full_url(),
            user_agent = ctx.user_agent(),
            "Request blocked by firewall"
        );

        self.audit.count_request(true);
        self.audit.record(
            AuditEntry::new(verdict.layer, AuditAction::Blocked)
                .ip(ctx.ip)
                .request(&ctx.method, &ctx.route)
                .reason(verdict.reason)
                .payload(&ctx.uri.to_string()),
        );
        Decision::Deny(verdict)
    }
}

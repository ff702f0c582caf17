// src/firewall/layers/mod.rs - the gating layers, in pipeline order
pub mod bot_detection;
pub mod cors;
pub mod csrf;
pub mod file_upload;
pub mod geo_block;
pub mod https;
pub mod input_sanitization;
pub mod ip_filter;
pub mod rate_limit;
pub mod request_validation;
pub mod session_security;
pub mod sql_injection;
pub mod two_factor;
pub mod user_agent;
pub mod xss;

pub use bot_detection::BotDetector;
pub use cors::CorsPolicy;
pub use csrf::CsrfGuard;
pub use file_upload::FileUploadGuard;
pub use geo_block::GeoBlocker;
pub use https::HttpsEnforcer;
pub use input_sanitization::InputSanitizer;
pub use ip_filter::IpFilter;
pub use rate_limit::RateLimiter;
pub use request_validation::RequestValidator;
pub use session_security::SessionSecurity;
pub use sql_injection::SqlInjectionFilter;
pub use two_factor::TwoFactorGate;
pub use user_agent::UserAgentFilter;
pub use xss::XssFilter;

use crate::config::FirewallConfig;
use crate::utils::patterns::RouteMatcher;

use super::context::RequestContext;
use super::verdict::{LayerId, Verdict};

/// One gating layer. The set is closed; the pipeline holds them in a fixed order.
pub enum GateLayer {
    IpFilter(IpFilter),
    RateLimiter(RateLimiter),
    UserAgent(UserAgentFilter),
    GeoBlocking(GeoBlocker),
    BotDetection(BotDetector),
    SqlInjection(SqlInjectionFilter),
    Xss(XssFilter),
    Csrf(CsrfGuard),
    SessionSecurity(SessionSecurity),
    TwoFactor(TwoFactorGate),
    RequestValidation(RequestValidator),
    FileUpload(FileUploadGuard),
    InputSanitization(InputSanitizer),
    Cors(CorsPolicy),
    Https(HttpsEnforcer),
    #[cfg(test)]
    Probe(crate::firewall::testing::ProbeLayer),
}

impl GateLayer {
    pub fn id(&self) -> LayerId {
        match self {
            GateLayer::IpFilter(_) => LayerId::IpFilter,
            GateLayer::RateLimiter(_) => LayerId::RateLimiter,
            GateLayer::UserAgent(_) => LayerId::UserAgent,
            GateLayer::GeoBlocking(_) => LayerId::GeoBlocking,
            GateLayer::BotDetection(_) => LayerId::BotDetection,
            GateLayer::SqlInjection(_) => LayerId::SqlInjection,
            GateLayer::Xss(_) => LayerId::XssFilter,
            GateLayer::Csrf(_) => LayerId::Csrf,
            GateLayer::SessionSecurity(_) => LayerId::SessionSecurity,
            GateLayer::TwoFactor(_) => LayerId::TwoFactor,
            GateLayer::RequestValidation(_) => LayerId::RequestValidation,
            GateLayer::FileUpload(_) => LayerId::FileUpload,
            GateLayer::InputSanitization(_) => LayerId::InputSanitization,
            GateLayer::Cors(_) => LayerId::Cors,
            GateLayer::Https(_) => LayerId::HttpsEnforcement,
            #[cfg(test)]
            GateLayer::Probe(probe) => probe.id,
        }
    }

    pub async fn evaluate(&self, ctx: &mut RequestContext) -> Verdict {
        match self {
            GateLayer::IpFilter(layer) => layer.evaluate(ctx).await,
            GateLayer::RateLimiter(layer) => layer.evaluate(ctx).await,
            GateLayer::UserAgent(layer) => layer.evaluate(ctx),
            GateLayer::GeoBlocking(layer) => layer.evaluate(ctx).await,
            GateLayer::BotDetection(layer) => layer.evaluate(ctx).await,
            GateLayer::SqlInjection(layer) => layer.evaluate(ctx),
            GateLayer::Xss(layer) => layer.evaluate(ctx),
            GateLayer::Csrf(layer) => layer.evaluate(ctx).await,
            GateLayer::SessionSecurity(layer) => layer.evaluate(ctx).await,
            GateLayer::TwoFactor(layer) => layer.evaluate(ctx).await,
            GateLayer::RequestValidation(layer) => layer.evaluate(ctx),
            GateLayer::FileUpload(layer) => layer.evaluate(ctx),
            GateLayer::InputSanitization(layer) => layer.evaluate(ctx),
            GateLayer::Cors(layer) => layer.evaluate(ctx),
            GateLayer::Https(layer) => layer.evaluate(ctx),
            #[cfg(test)]
            GateLayer::Probe(probe) => probe.evaluate(),
        }
    }
}

/// Routes and field names the injection filters and the sanitizer leave alone.
#[derive(Debug, Clone, Default)]
pub struct InputExemptions {
    routes: RouteMatcher,
    fields: Vec<String>,
}

impl InputExemptions {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            routes: RouteMatcher::new(&config.injection_exempt_routes),
            fields: config.injection_exempt_fields.clone(),
        }
    }

    pub fn route_exempt(&self, route: &str) -> bool {
        self.routes.matches(route)
    }

    /// Matches the full dotted key or its last segment, so `user.password` counts as `password`.
    pub fn field_exempt(&self, key: &str) -> bool {
        let leaf = key.rsplit('.').next().unwrap_or(key);
        self.fields.iter().any(|f| f == key || f == leaf)
    }
}

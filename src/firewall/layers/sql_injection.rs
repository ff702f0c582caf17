// src/firewall/layers/sql_injection.rs
use axum::http::StatusCode;
use lazy_static::lazy_static;
use regex::Regex;

use super::InputExemptions;
use crate::config::FirewallConfig;
use crate::firewall::context::RequestContext;
use crate::firewall::verdict::{LayerId, Reason, Verdict};
use crate::utils::patterns::{truncate, LOG_SAMPLE_LEN};

const LAYER: LayerId = LayerId::SqlInjection;

lazy_static! {
    static ref SQL_PATTERNS: Vec<Regex> = [
        r"\bUNION\s+(ALL\s+)?SELECT\b",
        r"\bINSERT\s+INTO\b[\s\S]*\bVALUES\b",
        r#"\bUPDATE\s+[\w`"\[\]\.]+\s+SET\b"#,
        r"\bDELETE\s+FROM\b",
        r"\bDROP\s+(TABLE|DATABASE|SCHEMA)\b",
        r"\bEXEC(UTE)?\s*\(|\bEXEC(UTE)?\s+(xp_|sp_|@|master\b)",
        r";\s*(SELECT|INSERT|UPDATE|DELETE|DROP|ALTER|CREATE|TRUNCATE|EXEC|SHUTDOWN)\b",
        r#"['"`]\s*(;|--|#|/\*)"#,
        r"/\*[\s\S]*?\*/",
        r"\b(xp|sp)_\w+",
        r#"\b(OR|AND)\s+['"`]?\d+['"`]?\s*=\s*['"`]?\d+"#,
        r#"['"`]\s*(OR|AND)\s+['"`][^'"`]*['"`]\s*=\s*['"`]"#,
        r"\bOR\s+TRUE\b",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).expect("valid SQL pattern"))
    .collect();
}

pub fn looks_like_sql_injection(value: &str) -> bool {
    SQL_PATTERNS.iter().any(|p| p.is_match(value))
}

pub struct SqlInjectionFilter {
    exemptions: InputExemptions,
}

impl SqlInjectionFilter {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            exemptions: InputExemptions::new(config),
        }
    }

    pub fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        if self.exemptions.route_exempt(&ctx.route) {
            return Verdict::allow_because(LAYER, Reason::ExcludedRoute);
        }

        for (field, value) in ctx.inspected_inputs() {
            if self.exemptions.field_exempt(&field) || !looks_like_sql_injection(value) {
                continue;
            }
            tracing::warn!(
                ip = %ctx.ip,
                user_agent = ctx.user_agent(),
                field = %field,
                sample = %truncate(value, LOG_SAMPLE_LEN),
                "SQL injection attempt blocked"
            );
            return Verdict::deny(LAYER, Reason::SqlInjectionDetected, StatusCode::BAD_REQUEST, "Invalid input detected");
        }

        Verdict::allow(LAYER)
    }
}

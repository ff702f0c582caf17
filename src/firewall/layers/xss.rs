// src/firewall/layers/xss.rs
use axum::http::StatusCode;
use lazy_static::lazy_static;
use regex::Regex;

use super::InputExemptions;
use crate::config::FirewallConfig;
use crate::firewall::context::RequestContext;
use crate::firewall::encoding::encode_html;
use crate::firewall::verdict::{LayerId, Reason, Verdict};
use crate::utils::patterns::{truncate, LOG_SAMPLE_LEN};

const LAYER: LayerId = LayerId::XssFilter;

lazy_static! {
    static ref XSS_PATTERNS: Vec<Regex> = [
        r"<script\b",
        r"<iframe\b",
        r"javascript\s*:",
        r"<[^>]*\bon[a-z]+\s*=",
        r"<embed\b",
        r"<object\b",
        r"\beval\s*\(",
        r"\bexpression\s*\(",
        r"vbscript\s*:",
        r"data:text/html",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).expect("valid XSS pattern"))
    .collect();
}

pub fn looks_like_xss(value: &str) -> bool {
    XSS_PATTERNS.iter().any(|p| p.is_match(value))
}

pub struct XssFilter {
    exemptions: InputExemptions,
}

impl XssFilter {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            exemptions: InputExemptions::new(config),
        }
    }

    /// HTML-entity encodes a value for rendering. Independent of the blocking check.
    pub fn sanitize(value: &str) -> String {
        encode_html(value)
    }

    pub fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        if self.exemptions.route_exempt(&ctx.route) {
            return Verdict::allow_because(LAYER, Reason::ExcludedRoute);
        }

        let hit = ctx
            .inspected_inputs()
            .into_iter()
            .find(|(field, value)| !self.exemptions.field_exempt(field) && looks_like_xss(value));

        match hit {
            Some((field, value)) => {
                tracing::warn!(
                    ip = %ctx.ip,
                    field = %field,
                    sample = %truncate(value, LOG_SAMPLE_LEN),
                    "XSS attempt blocked"
                );
                Verdict::deny(LAYER, Reason::XssDetected, StatusCode::BAD_REQUEST, "Invalid input detected")
            }
            None => Verdict::allow(LAYER),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::testing::RequestBuilder;
    use serde_json::json;

    #[test]
    fn test_malicious_corpus_is_detected() {
        let corpus = [
            "<script>alert(1)</script>",
            "<IFRAME src=//evil>",
            "<a href=\"javascript:alert(1)\">x</a>",
            "<img src=x onerror=alert(1)>",
            "<embed src=x.swf>",
            "<object data=x>",
            "eval(atob('...'))",
            "width: expression(alert(1))",
            "vbscript:msgbox",
            "data:text/html;base64,PHNjcmlwdD4=",
        ];
        for sample in corpus {
            assert!(looks_like_xss(sample), "missed: {}", sample);
        }
    }

    #[test]
    fn test_benign_corpus_passes() {
        let corpus = [
            "I love scripting in Rust",
            "money=5&currency=usd",
            "The evaluation (draft) is attached",
            "a < b and c > d",
            "Contact: person@example.com",
        ];
        for sample in corpus {
            assert!(!looks_like_xss(sample), "false positive: {}", sample);
        }
    }

    #[test]
    fn test_filter_denies_script_input() {
        let filter = XssFilter::new(&FirewallConfig::default());
        let ctx = RequestBuilder::post("/comments")
            .input("body", json!("<script>alert(1)</script>"))
            .build();
        let verdict = filter.evaluate(&ctx);
        assert_eq!(verdict.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(verdict.reason, Some(Reason::XssDetected));
    }

    #[test]
    fn test_sanitize_encodes_markup() {
        assert_eq!(
            XssFilter::sanitize("<b>\"Tom\" & 'Jerry'</b>"),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#039;Jerry&#039;&lt;/b&gt;"
        );
    }
}

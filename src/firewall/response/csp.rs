// src/firewall/response/csp.rs
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use base64::{engine::general_purpose, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use std::borrow::Cow;

use crate::config::FirewallConfig;

const NONCE_DIRECTIVES: [&str; 2] = ["script-src", "style-src"];

/// A per-response nonce. Handlers that emit inline scripts return it as a response extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CspNonce(String);

impl CspNonce {
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(general_purpose::STANDARD.encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Ordered directive map. The shared default is never mutated; nonces go on a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct CspPolicy {
    directives: Vec<(String, Vec<String>)>,
}

impl CspPolicy {
    pub fn new(directives: Vec<(String, Vec<String>)>) -> Self {
        Self { directives }
    }

    /// Appends `'nonce-<value>'` to script-src and style-src, creating them if absent.
    pub fn add_nonce(&mut self, nonce: &str) {
        let token = format!("'nonce-{}'", nonce);
        for name in NONCE_DIRECTIVES {
            match self.directives.iter_mut().find(|(directive, _)| directive == name) {
                Some((_, sources)) => sources.push(token.clone()),
                None => self.directives.push((name.to_string(), vec![token.clone()])),
            }
        }
    }

    pub fn with_nonce(&self, nonce: &str) -> CspPolicy {
        let mut scoped = self.clone();
        scoped.add_nonce(nonce);
        scoped
    }

    pub fn header_value(&self) -> String {
        self.directives
            .iter()
            .map(|(directive, sources)| {
                if sources.is_empty() {
                    directive.clone()
                } else {
                    format!("{} {}", directive, sources.join(" "))
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub struct ContentSecurityPolicy {
    policy: CspPolicy,
    report_only: bool,
}

impl ContentSecurityPolicy {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            policy: CspPolicy::new(config.csp_directives.clone()),
            report_only: !config.environment.is_production(),
        }
    }

    pub fn policy(&self) -> &CspPolicy {
        &self.policy
    }

    pub fn mutate(&self, headers: &mut HeaderMap, nonce: Option<&CspNonce>) {
        let policy = match nonce {
            Some(nonce) => Cow::Owned(self.policy.with_nonce(nonce.as_str())),
            None => Cow::Borrowed(&self.policy),
        };

        let value = match HeaderValue::from_str(&policy.header_value()) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("CSP directives produce an invalid header value: {}", e);
                return;
            }
        };

        if self.report_only {
            headers.insert(
                HeaderName::from_static("content-security-policy-report-only"),
                value.clone(),
            );
        }
        headers.insert(HeaderName::from_static("content-security-policy"), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{default_csp_directives, Environment};
    use std::sync::Arc;

    fn layer(environment: Environment) -> ContentSecurityPolicy {
        ContentSecurityPolicy::new(&FirewallConfig {
            environment,
            ..FirewallConfig::default()
        })
    }

    #[test]
    fn test_default_header() {
        let policy = CspPolicy::new(default_csp_directives());
        let header = policy.header_value();
        assert!(header.starts_with("default-src 'self'; script-src 'self' 'unsafe-inline'; "));
        assert!(header.contains("frame-ancestors 'none'"));
        assert!(header.ends_with("form-action 'self'"));
    }

    #[test]
    fn test_report_only_outside_production() {
        let mut headers = HeaderMap::new();
        layer(Environment::Production).mutate(&mut headers, None);
        assert!(headers.contains_key("content-security-policy"));
        assert!(!headers.contains_key("content-security-policy-report-only"));

        let mut headers = HeaderMap::new();
        layer(Environment::Other).mutate(&mut headers, None);
        assert_eq!(
            headers.get("content-security-policy"),
            headers.get("content-security-policy-report-only")
        );
    }

    #[test]
    fn test_with_nonce_leaves_original_untouched() {
        let base = CspPolicy::new(default_csp_directives());
        let scoped = base.with_nonce("abc123");

        assert!(scoped.header_value().contains("script-src 'self' 'unsafe-inline' 'nonce-abc123'"));
        assert!(scoped.header_value().contains("style-src 'self' 'unsafe-inline' 'nonce-abc123'"));
        assert!(!base.header_value().contains("nonce"));
    }

    #[tokio::test]
    async fn test_concurrent_nonces_do_not_leak() {
        let layer = Arc::new(layer(Environment::Production));
        let default_header = layer.policy().header_value();

        let mut tasks = Vec::new();
        for i in 0..32 {
            let layer = layer.clone();
            tasks.push(tokio::spawn(async move {
                let nonce = (i % 2 == 0).then(CspNonce::generate);
                let mut headers = HeaderMap::new();
                tokio::task::yield_now().await;
                layer.mutate(&mut headers, nonce.as_ref());
                let header = headers["content-security-policy"].to_str().unwrap().to_string();
                (nonce, header)
            }));
        }

        for task in tasks {
            let (nonce, header) = task.await.unwrap();
            match nonce {
                Some(nonce) => {
                    assert_eq!(header.matches("'nonce-").count(), 2);
                    assert!(header.contains(&format!("'nonce-{}'", nonce.as_str())));
                }
                None => assert_eq!(header, default_header),
            }
        }
        assert_eq!(layer.policy().header_value(), default_header);
    }
}

// src/config.rs
use axum_extra::extract::cookie::SameSite;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::firewall::LayerId;
use crate::utils::patterns::IpRange;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("invalid server address {0}")]
    Address(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Production,
    Other,
}

impl Environment {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "dev" | "development" => Environment::Local,
            "production" | "prod" => Environment::Production,
            _ => Environment::Other,
        }
    }

    pub fn is_local(self) -> bool {
        self == Environment::Local
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// What a layer does when the collaborator it depends on times out or errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPolicy {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub decay: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            decay: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Bearer token for the firewall admin endpoints; they are closed when unset.
    pub admin_token: Option<String>,
    pub firewall: FirewallConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT", 3000)?,
            database_url: std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://bulwark.db?mode=rwc".to_string()),
            admin_token: std::env::var("FIREWALL_ADMIN_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            firewall: FirewallConfig::from_env()?,
        })
    }

    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::Address(addr))
    }
}

/// Immutable firewall settings, shared behind an `Arc` by every layer.
#[derive(Debug, Clone)]
pub struct FirewallConfig {
    pub environment: Environment,
    pub app_url: String,
    pub disabled_layers: HashSet<LayerId>,
    pub collaborator_timeout: Duration,

    pub ip_whitelist: Vec<IpRange>,
    pub ip_blacklist: Vec<IpRange>,
    /// Peers whose forwarding headers are believed. Loopback only unless configured.
    pub trusted_proxies: Vec<IpRange>,
    pub ip_fail_policy: FailPolicy,
    /// The listener itself sits behind TLS, so direct requests count as secure.
    pub assume_https: bool,

    pub rate_limits: Vec<(String, RateLimitPolicy)>,
    pub default_rate_limit: RateLimitPolicy,
    pub rate_fail_policy: FailPolicy,

    pub blocked_user_agents: Vec<String>,

    pub geo_enabled: bool,
    pub geo_allowed_countries: Vec<String>,
    pub geo_home_country: String,
    pub geo_endpoint: Option<String>,
    pub geo_fail_policy: FailPolicy,

    pub allowed_bots: Vec<String>,
    pub bot_threshold: f64,
    pub bot_request_limit: u64,
    pub bot_window: Duration,
    pub bot_fail_policy: FailPolicy,

    pub injection_exempt_routes: Vec<String>,
    pub injection_exempt_fields: Vec<String>,

    pub csrf_exempt_routes: Vec<String>,
    pub csrf_fail_policy: FailPolicy,

    pub session_exempt_routes: Vec<String>,
    pub session_fail_policy: FailPolicy,

    pub two_factor_routes: Vec<String>,
    pub two_factor_fail_policy: FailPolicy,

    pub max_payload_bytes: u64,
    pub max_file_bytes: u64,
    pub dangerous_extensions: Vec<String>,
    pub allowed_mime_types: Vec<String>,

    pub cors_allowed_origins: Vec<String>,

    pub csp_directives: Vec<(String, Vec<String>)>,
    pub same_site: SameSite,

    pub slow_query_threshold: Duration,
    pub audit_retention: Duration,
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Production,
            app_url: "http://localhost:3000".to_string(),
            disabled_layers: HashSet::new(),
            collaborator_timeout: Duration::from_millis(250),

            ip_whitelist: Vec::new(),
            ip_blacklist: Vec::new(),
            trusted_proxies: ["127.0.0.0/8", "::1"].iter().filter_map(|r| r.parse().ok()).collect(),
            ip_fail_policy: FailPolicy::Closed,
            assume_https: false,

            rate_limits: vec![
                ("login".to_string(), RateLimitPolicy { max_attempts: 5, decay: Duration::from_secs(15 * 60) }),
                ("password/*".to_string(), RateLimitPolicy { max_attempts: 5, decay: Duration::from_secs(15 * 60) }),
                ("api/*".to_string(), RateLimitPolicy { max_attempts: 100, decay: Duration::from_secs(60) }),
            ],
            default_rate_limit: RateLimitPolicy::default(),
            rate_fail_policy: FailPolicy::Open,

            blocked_user_agents: strings(&["sqlmap", "nikto", "nmap", "masscan", "metasploit", "burp", "acunetix"]),

            geo_enabled: false,
            geo_allowed_countries: Vec::new(),
            geo_home_country: "ID".to_string(),
            geo_endpoint: None,
            geo_fail_policy: FailPolicy::Open,

            allowed_bots: strings(&["Googlebot", "Bingbot", "Slackbot", "facebookexternalhit"]),
            bot_threshold: 0.7,
            bot_request_limit: 100,
            bot_window: Duration::from_secs(5 * 60),
            bot_fail_policy: FailPolicy::Open,

            injection_exempt_routes: Vec::new(),
            injection_exempt_fields: strings(&["password", "password_confirmation", "current_password"]),

            csrf_exempt_routes: strings(&["api/*", "webhooks/*"]),
            csrf_fail_policy: FailPolicy::Closed,

            session_exempt_routes: strings(&["api/*"]),
            session_fail_policy: FailPolicy::Closed,

            two_factor_routes: strings(&["admin/*", "api/admin/*", "internal/*"]),
            two_factor_fail_policy: FailPolicy::Closed,

            max_payload_bytes: 10 * 1024 * 1024,
            max_file_bytes: 50 * 1024 * 1024,
            dangerous_extensions: strings(&[
                "php", "phtml", "php3", "php4", "php5", "php7", "exe", "bat", "cmd", "com", "pif", "sh",
                "bash", "js", "vbs", "jar",
            ]),
            allowed_mime_types: strings(&[
                "image/jpeg",
                "image/png",
                "image/gif",
                "image/webp",
                "application/pdf",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                "application/vnd.ms-excel",
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ]),

            cors_allowed_origins: strings(&["http://localhost:3000"]),

            csp_directives: default_csp_directives(),
            same_site: SameSite::Lax,

            slow_query_threshold: Duration::from_millis(1000),
            audit_retention: Duration::from_secs(24 * 3600),
        }
    }
}

impl FirewallConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let app_url = std::env::var("APP_URL").unwrap_or(defaults.app_url);

        Ok(Self {
            environment: std::env::var("APP_ENV")
                .map(|v| Environment::parse(&v))
                .unwrap_or(defaults.environment),
            disabled_layers: match std::env::var("FIREWALL_DISABLED_LAYERS") {
                Ok(raw) => parse_list(&raw)
                    .iter()
                    .map(|name| {
                        LayerId::from_str(name).map_err(|_| ConfigError::Invalid {
                            key: "FIREWALL_DISABLED_LAYERS",
                            value: name.clone(),
                        })
                    })
                    .collect::<Result<_, _>>()?,
                Err(_) => defaults.disabled_layers,
            },
            collaborator_timeout: Duration::from_millis(env_parse(
                "FIREWALL_COLLABORATOR_TIMEOUT_MS",
                defaults.collaborator_timeout.as_millis() as u64,
            )?),

            ip_whitelist: env_ranges("FIREWALL_IP_WHITELIST", defaults.ip_whitelist)?,
            ip_blacklist: env_ranges("FIREWALL_IP_BLACKLIST", defaults.ip_blacklist)?,
            trusted_proxies: env_ranges("FIREWALL_TRUSTED_PROXIES", defaults.trusted_proxies)?,
            ip_fail_policy: env_policy("FIREWALL_IP_FAIL", defaults.ip_fail_policy)?,
            assume_https: env_parse("FIREWALL_ASSUME_HTTPS", defaults.assume_https)?,

            rate_limits: match std::env::var("FIREWALL_RATE_LIMITS") {
                Ok(raw) => parse_rate_limits(&raw)?,
                Err(_) => defaults.rate_limits,
            },
            default_rate_limit: defaults.default_rate_limit,
            rate_fail_policy: env_policy("FIREWALL_RATE_FAIL", defaults.rate_fail_policy)?,

            blocked_user_agents: env_list("FIREWALL_BLOCKED_USER_AGENTS", defaults.blocked_user_agents),

            geo_enabled: env_parse("FIREWALL_GEO_ENABLED", defaults.geo_enabled)?,
            geo_allowed_countries: env_list("FIREWALL_GEO_ALLOWED_COUNTRIES", defaults.geo_allowed_countries)
                .into_iter()
                .map(|c| c.to_ascii_uppercase())
                .collect(),
            geo_home_country: std::env::var("FIREWALL_GEO_HOME_COUNTRY").unwrap_or(defaults.geo_home_country),
            geo_endpoint: std::env::var("FIREWALL_GEO_ENDPOINT").ok(),
            geo_fail_policy: env_policy("FIREWALL_GEO_FAIL", defaults.geo_fail_policy)?,

            allowed_bots: env_list("FIREWALL_ALLOWED_BOTS", defaults.allowed_bots),
            bot_threshold: env_parse("FIREWALL_BOT_THRESHOLD", defaults.bot_threshold)?,
            bot_request_limit: env_parse("FIREWALL_BOT_REQUEST_LIMIT", defaults.bot_request_limit)?,
            bot_window: defaults.bot_window,
            bot_fail_policy: env_policy("FIREWALL_BOT_FAIL", defaults.bot_fail_policy)?,

            injection_exempt_routes: env_list("FIREWALL_INJECTION_EXEMPT_ROUTES", defaults.injection_exempt_routes),
            injection_exempt_fields: env_list("FIREWALL_INJECTION_EXEMPT_FIELDS", defaults.injection_exempt_fields),

            csrf_exempt_routes: env_list("FIREWALL_CSRF_EXEMPT_ROUTES", defaults.csrf_exempt_routes),
            csrf_fail_policy: env_policy("FIREWALL_CSRF_FAIL", defaults.csrf_fail_policy)?,

            session_exempt_routes: env_list("FIREWALL_SESSION_EXEMPT_ROUTES", defaults.session_exempt_routes),
            session_fail_policy: env_policy("FIREWALL_SESSION_FAIL", defaults.session_fail_policy)?,

            two_factor_routes: env_list("FIREWALL_2FA_ROUTES", defaults.two_factor_routes),
            two_factor_fail_policy: env_policy("FIREWALL_2FA_FAIL", defaults.two_factor_fail_policy)?,

            max_payload_bytes: defaults.max_payload_bytes,
            max_file_bytes: defaults.max_file_bytes,
            dangerous_extensions: env_list("FIREWALL_DANGEROUS_EXTENSIONS", defaults.dangerous_extensions)
                .into_iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            allowed_mime_types: env_list("FIREWALL_ALLOWED_MIME_TYPES", defaults.allowed_mime_types),

            cors_allowed_origins: env_list("FIREWALL_CORS_ORIGINS", vec![app_url.clone()]),

            csp_directives: defaults.csp_directives,
            same_site: match std::env::var("FIREWALL_SAME_SITE") {
                Ok(raw) => parse_same_site(&raw)?,
                Err(_) => defaults.same_site,
            },

            slow_query_threshold: Duration::from_millis(env_parse(
                "FIREWALL_SLOW_QUERY_MS",
                defaults.slow_query_threshold.as_millis() as u64,
            )?),
            audit_retention: Duration::from_secs(
                env_parse("FIREWALL_AUDIT_RETENTION_HOURS", defaults.audit_retention.as_secs() / 3600)? * 3600,
            ),
            app_url,
        })
    }

    pub fn layer_enabled(&self, layer: LayerId) -> bool {
        !self.disabled_layers.contains(&layer)
    }

    /// First matching route policy, or the default one.
    pub fn rate_limit_for(&self, route: &str) -> &RateLimitPolicy {
        self.rate_limits
            .iter()
            .find(|(pattern, _)| crate::utils::patterns::glob_match(pattern, route))
            .map(|(_, policy)| policy)
            .unwrap_or(&self.default_rate_limit)
    }
}

pub fn default_csp_directives() -> Vec<(String, Vec<String>)> {
    [
        ("default-src", &["'self'"][..]),
        ("script-src", &["'self'", "'unsafe-inline'"][..]),
        ("style-src", &["'self'", "'unsafe-inline'"][..]),
        ("img-src", &["'self'", "data:", "https:"][..]),
        ("font-src", &["'self'", "data:"][..]),
        ("connect-src", &["'self'"][..]),
        ("frame-ancestors", &["'none'"][..]),
        ("base-uri", &["'self'"][..]),
        ("form-action", &["'self'"][..]),
    ]
    .iter()
    .map(|(name, sources)| (name.to_string(), strings(sources)))
    .collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_list(key: &str, default: Vec<String>) -> Vec<String> {
    std::env::var(key).map(|raw| parse_list(&raw)).unwrap_or(default)
}

fn env_parse<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

fn env_ranges(key: &'static str, default: Vec<IpRange>) -> Result<Vec<IpRange>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_list(&raw)
            .into_iter()
            .map(|r| r.parse().map_err(|_| ConfigError::Invalid { key, value: r }))
            .collect(),
        Err(_) => Ok(default),
    }
}

fn env_policy(key: &'static str, default: FailPolicy) -> Result<FailPolicy, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailPolicy::Open),
            "closed" => Ok(FailPolicy::Closed),
            _ => Err(ConfigError::Invalid { key, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

/// Parses `glob=max/minutes` pairs, e.g. `login=5/15,api/*=100/1`.
fn parse_rate_limits(raw: &str) -> Result<Vec<(String, RateLimitPolicy)>, ConfigError> {
    parse_list(raw)
        .into_iter()
        .map(|entry| {
            let invalid = || ConfigError::Invalid {
                key: "FIREWALL_RATE_LIMITS",
                value: entry.clone(),
            };
            let (pattern, limit) = entry.rsplit_once('=').ok_or_else(invalid)?;
            let (max, minutes) = limit.split_once('/').ok_or_else(invalid)?;
            let max_attempts = max.trim().parse().map_err(|_| invalid())?;
            let minutes: u64 = minutes.trim().parse().map_err(|_| invalid())?;
            Ok((
                pattern.trim().trim_start_matches('/').to_string(),
                RateLimitPolicy {
                    max_attempts,
                    decay: Duration::from_secs(minutes * 60),
                },
            ))
        })
        .collect()
}

fn parse_same_site(raw: &str) -> Result<SameSite, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "lax" => Ok(SameSite::Lax),
        "strict" => Ok(SameSite::Strict),
        "none" => Ok(SameSite::None),
        _ => Err(ConfigError::Invalid {
            key: "FIREWALL_SAME_SITE",
            value: raw.to_string(),
        }),
    }
}

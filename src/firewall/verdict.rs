// src/firewall/verdict.rs
use axum::http::StatusCode;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Identifies one layer of the firewall, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerId {
    IpFilter,
    RateLimiter,
    UserAgent,
    GeoBlocking,
    BotDetection,
    SqlInjection,
    XssFilter,
    Csrf,
    SessionSecurity,
    TwoFactor,
    RequestValidation,
    FileUpload,
    InputSanitization,
    OutputEncoding,
    Cors,
    HttpsEnforcement,
    ContentSecurityPolicy,
    SecurityHeaders,
    CookieSecurity,
    DbInjectionMonitor,
}

impl LayerId {
    pub const ALL: [LayerId; 20] = [
        LayerId::IpFilter,
        LayerId::RateLimiter,
        LayerId::UserAgent,
        LayerId::GeoBlocking,
        LayerId::BotDetection,
        LayerId::SqlInjection,
        LayerId::XssFilter,
        LayerId::Csrf,
        LayerId::SessionSecurity,
        LayerId::TwoFactor,
        LayerId::RequestValidation,
        LayerId::FileUpload,
        LayerId::InputSanitization,
        LayerId::OutputEncoding,
        LayerId::Cors,
        LayerId::HttpsEnforcement,
        LayerId::ContentSecurityPolicy,
        LayerId::SecurityHeaders,
        LayerId::CookieSecurity,
        LayerId::DbInjectionMonitor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LayerId::IpFilter => "ip_filter",
            LayerId::RateLimiter => "rate_limiter",
            LayerId::UserAgent => "user_agent",
            LayerId::GeoBlocking => "geo_blocking",
            LayerId::BotDetection => "bot_detection",
            LayerId::SqlInjection => "sql_injection",
            LayerId::XssFilter => "xss_filter",
            LayerId::Csrf => "csrf",
            LayerId::SessionSecurity => "session_security",
            LayerId::TwoFactor => "two_factor",
            LayerId::RequestValidation => "request_validation",
            LayerId::FileUpload => "file_upload",
            LayerId::InputSanitization => "input_sanitization",
            LayerId::OutputEncoding => "output_encoding",
            LayerId::Cors => "cors",
            LayerId::HttpsEnforcement => "https_enforcement",
            LayerId::ContentSecurityPolicy => "content_security_policy",
            LayerId::SecurityHeaders => "security_headers",
            LayerId::CookieSecurity => "cookie_security",
            LayerId::DbInjectionMonitor => "db_injection_monitor",
        }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LayerId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        LayerId::ALL
            .into_iter()
            .find(|layer| layer.as_str() == wanted)
            .ok_or(())
    }
}

/// Symbolic code explaining a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Whitelisted,
    Blacklisted,
    RateLimitExceeded,
    EmptyUserAgent,
    BlockedUserAgent,
    Disabled,
    CountryBlocked,
    AllowedBot,
    SuspiciousBot,
    BotBehavior,
    ExcludedRoute,
    SqlInjectionDetected,
    XssDetected,
    MissingCsrfToken,
    InvalidCsrfToken,
    ApiRoute,
    FingerprintMismatch,
    NotRequired,
    NotAuthenticated,
    #[serde(rename = "2fa_not_enabled")]
    TwoFactorNotEnabled,
    #[serde(rename = "2fa_required")]
    TwoFactorRequired,
    PayloadTooLarge,
    InvalidJson,
    MalformedMultipart,
    NullBytesDetected,
    FileTooLarge,
    DangerousExtension,
    InvalidMimeType,
    DoubleExtension,
    SameOrigin,
    OriginNotAllowed,
    LocalEnv,
    HttpsRequired,
    LayerError,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::Whitelisted => "whitelisted",
            Reason::Blacklisted => "blacklisted",
            Reason::RateLimitExceeded => "rate_limit_exceeded",
            Reason::EmptyUserAgent => "empty_user_agent",
            Reason::BlockedUserAgent => "blocked_user_agent",
            Reason::Disabled => "disabled",
            Reason::CountryBlocked => "country_blocked",
            Reason::AllowedBot => "allowed_bot",
            Reason::SuspiciousBot => "suspicious_bot",
            Reason::BotBehavior => "bot_behavior",
            Reason::ExcludedRoute => "excluded_route",
            Reason::SqlInjectionDetected => "sql_injection_detected",
            Reason::XssDetected => "xss_detected",
            Reason::MissingCsrfToken => "missing_csrf_token",
            Reason::InvalidCsrfToken => "invalid_csrf_token",
            Reason::ApiRoute => "api_route",
            Reason::FingerprintMismatch => "fingerprint_mismatch",
            Reason::NotRequired => "not_required",
            Reason::NotAuthenticated => "not_authenticated",
            Reason::TwoFactorNotEnabled => "2fa_not_enabled",
            Reason::TwoFactorRequired => "2fa_required",
            Reason::PayloadTooLarge => "payload_too_large",
            Reason::InvalidJson => "invalid_json",
            Reason::MalformedMultipart => "malformed_multipart",
            Reason::NullBytesDetected => "null_bytes_detected",
            Reason::FileTooLarge => "file_too_large",
            Reason::DangerousExtension => "dangerous_extension",
            Reason::InvalidMimeType => "invalid_mime_type",
            Reason::DoubleExtension => "double_extension",
            Reason::SameOrigin => "same_origin",
            Reason::OriginNotAllowed => "origin_not_allowed",
            Reason::LocalEnv => "local_env",
            Reason::HttpsRequired => "https_required",
            Reason::LayerError => "layer_error",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Allow,
    /// A deny always carries the status the client will see.
    Deny { status: StatusCode, message: String },
}

/// Side-channel data a layer hands to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum VerdictData {
    Origin(String),
    Redirect(String),
    RiskScore(f64),
    RetryAfter(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub layer: LayerId,
    pub reason: Option<Reason>,
    pub outcome: Outcome,
    pub data: Option<VerdictData>,
}

impl Verdict {
    pub fn allow(layer: LayerId) -> Self {
        Self {
            layer,
            reason: None,
            outcome: Outcome::Allow,
            data: None,
        }
    }

    pub fn allow_because(layer: LayerId, reason: Reason) -> Self {
        Self {
            reason: Some(reason),
            ..Self::allow(layer)
        }
    }

    pub fn deny(layer: LayerId, reason: Reason, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            layer,
            reason: Some(reason),
            outcome: Outcome::Deny {
                status,
                message: message.into(),
            },
            data: None,
        }
    }

    pub fn with_data(mut self, data: VerdictData) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self.outcome, Outcome::Allow)
    }

    pub fn status(&self) -> Option<StatusCode> {
        match &self.outcome {
            Outcome::Allow => None,
            Outcome::Deny { status, .. } => Some(*status),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Allow => None,
            Outcome::Deny { message, .. } => Some(message),
        }
    }
}

// src/firewall/context.rs - the per-request view every layer reads
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, Method, Uri};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::IpAddr;

use crate::auth::{AuthenticatedUser, SessionHandle};

/// Owned by one request; layers receive it by reference and never keep it.
pub struct RequestContext {
    pub ip: IpAddr,
    /// Path without its leading slash; the root stays `/`.
    pub route: String,
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Query merged with the body, body keys winning.
    pub inputs: Map<String, Value>,
    /// Raw query pairs, kept so values shadowed by body keys are still inspected.
    pub query: Vec<(String, String)>,
    pub route_params: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
    pub body: Bytes,
    pub secure: bool,
    /// Set when the peer is a trusted proxy whose forwarding headers may be believed.
    pub forwarded_trusted: bool,
    pub user: Option<AuthenticatedUser>,
    pub session: Option<SessionHandle>,
}

impl RequestContext {
    pub fn new(ip: IpAddr, method: Method, uri: Uri) -> Self {
        Self {
            ip,
            route: route_of(uri.path()),
            method,
            uri,
            headers: HeaderMap::new(),
            inputs: Map::new(),
            query: Vec::new(),
            route_params: HashMap::new(),
            files: Vec::new(),
            body: Bytes::new(),
            secure: false,
            forwarded_trusted: false,
            user: None,
            session: None,
        }
    }

    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        let name = HeaderName::from_bytes(name.as_ref().as_bytes()).ok()?;
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The User-Agent, or an empty string when absent.
    pub fn user_agent(&self) -> &str {
        self.headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
    }

    pub fn is_json(&self) -> bool {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| {
                let ct = ct.to_ascii_lowercase();
                ct.starts_with("application/json") || ct.contains("+json")
            })
            .unwrap_or(false)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.trim().parse().ok())
    }

    /// Every string input as `(dotted.key, value)`, nested objects and arrays included,
    /// followed by route parameters.
    pub fn string_inputs(&self) -> Vec<(String, &str)> {
        let mut out = Vec::new();
        for (key, value) in &self.inputs {
            collect_strings(key.clone(), value, &mut out);
        }
        for (key, value) in &self.route_params {
            out.push((key.clone(), value.as_str()));
        }
        out
    }

    /// What the injection filters inspect: every string input plus the raw query.
    pub fn inspected_inputs(&self) -> Vec<(String, &str)> {
        let mut out = self.string_inputs();
        for (key, value) in &self.query {
            if !out.iter().any(|(k, v)| k == key && *v == value.as_str()) {
                out.push((key.clone(), value.as_str()));
            }
        }
        out
    }

    pub fn full_url(&self) -> String {
        self.url_with_scheme(if self.secure { "https" } else { "http" })
    }

    pub fn https_url(&self) -> String {
        self.url_with_scheme("https")
    }

    fn url_with_scheme(&self, scheme: &str) -> String {
        let host = self
            .uri
            .authority()
            .map(|a| a.as_str())
            .or_else(|| self.header("host"))
            .unwrap_or("localhost");
        let path = self.uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        format!("{}://{}{}", scheme, host, path)
    }
}

pub fn route_of(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn collect_strings<'a>(key: String, value: &'a Value, out: &mut Vec<(String, &'a str)>) {
    match value {
        Value::String(s) => out.push((key, s.as_str())),
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                collect_strings(format!("{}.{}", key, i), item, out);
            }
        }
        Value::Object(map) => {
            for (k, v) in map {
                collect_strings(format!("{}.{}", key, k), v, out);
            }
        }
        _ => {}
    }
}

/// An uploaded file as the upload layer sees it; the content itself is not retained.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub field: String,
    pub name: String,
    pub size: u64,
    pub declared_mime: Option<String>,
    /// MIME type sniffed from the leading bytes, when recognised.
    pub resolved_mime: Option<String>,
}

impl UploadedFile {
    pub fn new(field: impl Into<String>, name: impl Into<String>, size: u64, declared_mime: Option<String>) -> Self {
        Self {
            field: field.into(),
            name: name.into(),
            size,
            declared_mime,
            resolved_mime: None,
        }
    }

    /// Builds the descriptor from the raw upload, sniffing its real type.
    pub fn from_bytes(field: impl Into<String>, name: impl Into<String>, declared_mime: Option<String>, data: &[u8]) -> Self {
        let mut file = Self::new(field, name, data.len() as u64, declared_mime);
        file.resolved_mime = sniff_mime(data, &file.extension()).map(str::to_string);
        file
    }

    pub fn mime(&self) -> Option<&str> {
        self.resolved_mime.as_deref().or(self.declared_mime.as_deref())
    }

    /// Lowercased final extension, empty when the name has none.
    pub fn extension(&self) -> String {
        match self.segments().as_slice() {
            [_, .., last] => last.to_ascii_lowercase(),
            _ => String::new(),
        }
    }

    /// Lowercased second-to-last segment of `name.a.b`, if the name has one.
    pub fn inner_extension(&self) -> Option<String> {
        let segments = self.segments();
        if segments.len() > 2 {
            Some(segments[segments.len() - 2].to_ascii_lowercase())
        } else {
            None
        }
    }

    fn segments(&self) -> Vec<&str> {
        let base = self.name.rsplit(['/', '\\']).next().unwrap_or(&self.name);
        base.split('.').collect()
    }
}

/// Magic-byte detection for the formats uploads are checked against.
pub fn sniff_mime(data: &[u8], extension: &str) -> Option<&'static str> {
    const OLE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else if data.starts_with(b"%PDF-") {
        Some("application/pdf")
    } else if data.starts_with(OLE) {
        match extension {
            "xls" => Some("application/vnd.ms-excel"),
            _ => Some("application/msword"),
        }
    } else if data.starts_with(b"PK\x03\x04") {
        match extension {
            "docx" => Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
            "xlsx" => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
            "jar" => Some("application/java-archive"),
            _ => Some("application/zip"),
        }
    } else if data.starts_with(b"MZ") {
        Some("application/x-msdownload")
    } else if data.starts_with(b"\x7FELF") {
        Some("application/x-executable")
    } else if data.starts_with(b"#!") {
        Some("text/x-shellscript")
    } else if data.starts_with(b"<?php") {
        Some("text/x-php")
    } else {
        None
    }
}

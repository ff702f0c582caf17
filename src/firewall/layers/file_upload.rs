// src/firewall/layers/file_upload.rs
use axum::http::StatusCode;

use crate::config::FirewallConfig;
use crate::firewall::context::{RequestContext, UploadedFile};
use crate::firewall::verdict::{LayerId, Reason, Verdict};

const LAYER: LayerId = LayerId::FileUpload;

pub struct FileUploadGuard {
    max_file_bytes: u64,
    dangerous_extensions: Vec<String>,
    allowed_mime_types: Vec<String>,
}

impl FileUploadGuard {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            max_file_bytes: config.max_file_bytes,
            dangerous_extensions: config.dangerous_extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            allowed_mime_types: config.allowed_mime_types.iter().map(|m| m.to_ascii_lowercase()).collect(),
        }
    }

    pub fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        ctx.files
            .iter()
            .find_map(|file| self.check_file(ctx, file))
            .unwrap_or_else(|| Verdict::allow(LAYER))
    }

    fn check_file(&self, ctx: &RequestContext, file: &UploadedFile) -> Option<Verdict> {
        if file.size > self.max_file_bytes {
            return Some(Verdict::deny(
                LAYER,
                Reason::FileTooLarge,
                StatusCode::PAYLOAD_TOO_LARGE,
                "File size exceeds maximum allowed",
            ));
        }

        let extension = file.extension();
        if self.is_dangerous(&extension) {
            tracing::warn!(ip = %ctx.ip, filename = %file.name, extension = %extension, "Dangerous file upload blocked");
            return Some(Verdict::deny(
                LAYER,
                Reason::DangerousExtension,
                StatusCode::BAD_REQUEST,
                "File type not allowed",
            ));
        }

        let mime_allowed = file
            .mime()
            .map(|m| self.allowed_mime_types.iter().any(|a| a.eq_ignore_ascii_case(m)))
            .unwrap_or(false);
        if !mime_allowed {
            tracing::warn!(ip = %ctx.ip, filename = %file.name, mime = ?file.mime(), "Upload with disallowed MIME type");
            return Some(Verdict::deny(
                LAYER,
                Reason::InvalidMimeType,
                StatusCode::BAD_REQUEST,
                "File type not supported",
            ));
        }

        if file.inner_extension().map_or(false, |inner| self.is_dangerous(&inner)) {
            tracing::warn!(ip = %ctx.ip, filename = %file.name, "Double extension upload blocked");
            return Some(Verdict::deny(LAYER, Reason::DoubleExtension, StatusCode::BAD_REQUEST, "Invalid filename"));
        }

        None
    }

    fn is_dangerous(&self, extension: &str) -> bool {
        self.dangerous_extensions.iter().any(|d| d == extension)
    }
}

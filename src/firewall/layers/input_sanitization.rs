// src/firewall/layers/input_sanitization.rs
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};

use super::InputExemptions;
use crate::config::FirewallConfig;
use crate::firewall::context::RequestContext;
use crate::firewall::verdict::{LayerId, Verdict};

const LAYER: LayerId = LayerId::InputSanitization;

lazy_static! {
    static ref CONTROL_CHARS: Regex = Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid control regex");
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").expect("valid whitespace regex");
}

/// Strips control characters, collapses whitespace runs to one space and trims.
/// Applying it twice gives the same result as applying it once.
pub fn sanitize_string(value: &str) -> String {
    let stripped = CONTROL_CHARS.replace_all(value, "");
    WHITESPACE_RUN.replace_all(&stripped, " ").trim().to_string()
}

pub struct InputSanitizer {
    exemptions: InputExemptions,
}

impl InputSanitizer {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            exemptions: InputExemptions::new(config),
        }
    }

    /// Never denies; rewrites `ctx.inputs` in place.
    pub fn evaluate(&self, ctx: &mut RequestContext) -> Verdict {
        self.sanitize_map(&mut ctx.inputs);
        Verdict::allow(LAYER)
    }

    pub fn sanitize_map(&self, inputs: &mut Map<String, Value>) {
        for (key, value) in inputs.iter_mut() {
            if !self.exemptions.field_exempt(key) {
                self.sanitize_value(value);
            }
        }
    }

    fn sanitize_value(&self, value: &mut Value) {
        match value {
            Value::String(s) => *s = sanitize_string(s),
            Value::Array(items) => items.iter_mut().for_each(|item| self.sanitize_value(item)),
            Value::Object(map) => self.sanitize_map(map),
            _ => {}
        }
    }
}

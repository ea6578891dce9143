// src/waf.rs
// Extraction of the upstream WAF's (Coraza) per-request decision from
// Envoy dynamic metadata, with a response-header fallback for setups
// that export headers instead of metadata.

use crate::logger::Logger;
use crate::types::WafDecision;

/// Attribute source on the response path: response headers plus proxy
/// metadata properties.
pub trait ResponseAttrs {
    fn response_header(&self, name: &str) -> Option<String>;
    fn property(&self, path: &[&str]) -> Option<Vec<u8>>;
}

const METADATA_PATHS: &[&[&str]] = &[
    &["metadata", "filter_metadata", "envoy.filters.http.wasm", "coraza"],
    &["metadata", "filter_metadata", "coraza"],
    &["metadata", "filter_metadata", "envoy.filters.http.coraza"],
];

/// Walks the known metadata paths, then falls back to response headers.
/// Returns nothing when no source yields a decision with an action.
pub fn extract(attrs: &impl ResponseAttrs, logger: &dyn Logger) -> Option<WafDecision> {
    for path in METADATA_PATHS {
        let value = match attrs.property(path) {
            Some(value) if !value.is_empty() => value,
            _ => continue,
        };

        if let Some(decision) = parse_metadata(&value, logger) {
            return Some(decision);
        }
    }

    extract_from_headers(attrs)
}

/// Metadata is JSON in most deployments; some emit a flat
/// `action=block;rule_id=930120;severity=high` string instead.
fn parse_metadata(value: &[u8], logger: &dyn Logger) -> Option<WafDecision> {
    if let Ok(decision) = serde_json::from_slice::<WafDecision>(value) {
        if !decision.action.is_empty() {
            return Some(decision);
        }
    }

    let raw = match std::str::from_utf8(value) {
        Ok(raw) => raw,
        Err(_) => {
            logger.debug("waf metadata is not valid utf-8");
            return None;
        }
    };

    parse_kv_metadata(raw)
}

fn parse_kv_metadata(value: &str) -> Option<WafDecision> {
    let mut decision = WafDecision::default();

    for part in value.split(';') {
        let (key, val) = match part.split_once('=') {
            Some(pair) => pair,
            None => continue,
        };

        let val = val.trim().to_string();
        match key.trim() {
            "action" => decision.action = val,
            "rule_id" => decision.rule_id = val,
            "severity" => decision.severity = val,
            "message" => decision.message = val,
            "matched_data" => decision.matched_data = val,
            _ => {}
        }
    }

    if decision.action.is_empty() {
        return None;
    }

    Some(decision)
}

fn extract_from_headers(attrs: &impl ResponseAttrs) -> Option<WafDecision> {
    let action = attrs.response_header("x-coraza-action")?;
    if action.is_empty() {
        return None;
    }

    Some(WafDecision {
        action,
        rule_id: attrs.response_header("x-coraza-rule-id").unwrap_or_default(),
        severity: attrs.response_header("x-coraza-severity").unwrap_or_default(),
        message: attrs.response_header("x-coraza-message").unwrap_or_default(),
        ..WafDecision::default()
    })
}

/// Upstream response status, 0 when unavailable.
pub fn response_status(attrs: &impl ResponseAttrs) -> u32 {
    attrs
        .response_header(":status")
        .and_then(|status| status.trim().parse().ok())
        .unwrap_or(0)
}

/// Decision synthesized when the WAF exported nothing but the upstream
/// answered 403: Coraza's own deny responses look exactly like this.
pub fn fallback_403() -> WafDecision {
    WafDecision {
        action: "block".to_string(),
        rule_id: "waf-403".to_string(),
        severity: "medium".to_string(),
        ..WafDecision::default()
    }
}

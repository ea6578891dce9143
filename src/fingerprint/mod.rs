// src/fingerprint/mod.rs
// Composite client identity. A fingerprint is the hex SHA-256 of
// labeled request attributes joined in a fixed order, so identical
// clients hash identically on every proxy instance in the fleet.

use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::config::{FingerprintMode, PluginConfig};

/// Attribute source for fingerprinting: request headers plus proxy
/// connection/TLS properties.
pub trait RequestAttrs {
    fn header(&self, name: &str) -> Option<String>;
    fn property(&self, path: &[&str]) -> Option<Vec<u8>>;
}

/// A derived fingerprint plus the attributes it was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintOutcome {
    pub fingerprint: String,
    pub client_ip: String,
    pub user_agent: String,
    pub ja3: String,
    pub cookie_value: String,
    /// Set when no tracking cookie was present and injection is on; the
    /// caller emits it as a Set-Cookie on the response.
    pub generated_cookie: Option<String>,
}

const JA3_PROPERTY_PATHS: &[&[&str]] = &[
    &["connection", "tls", "ja3"],
    &["connection", "tls", "ja3_fingerprint"],
    &["request", "tls", "ja3"],
    &["upstream", "tls", "ja3"],
];

const SOURCE_ADDRESS_PATHS: &[&[&str]] = &[
    &["source", "address"],
    &["connection", "source", "address"],
    &["downstream", "remote_address"],
];

const IP_HEADERS: &[&str] = &["x-real-ip", "true-client-ip", "cf-connecting-ip"];

/// Derives the fingerprint for the current request per the configured
/// mode.
pub fn derive(attrs: &impl RequestAttrs, config: &PluginConfig) -> FingerprintOutcome {
    match config.fingerprint_mode() {
        FingerprintMode::IpOnly => derive_ip_only(attrs),
        FingerprintMode::Partial => derive_composite(attrs, config, false),
        FingerprintMode::Full => derive_composite(attrs, config, true),
    }
}

/// Composite modes: label each present component, join with `|` in the
/// fixed ja3/ua/ip/cookie order, hash. With nothing to go on, the
/// fingerprint degrades to the hash of "unknown".
fn derive_composite(
    attrs: &impl RequestAttrs,
    config: &PluginConfig,
    with_ja3: bool,
) -> FingerprintOutcome {
    let mut outcome = FingerprintOutcome::default();
    let mut components: Vec<String> = Vec::new();

    if with_ja3 {
        let ja3 = ja3_fingerprint(attrs);
        if !ja3.is_empty() {
            components.push(format!("ja3:{}", ja3));
            outcome.ja3 = ja3;
        }
    }

    let ua = attrs.header("user-agent").unwrap_or_default();
    if !ua.is_empty() {
        components.push(format!("ua:{}", ua));
        outcome.user_agent = ua;
    }

    let ip = client_ip(attrs);
    if !ip.is_empty() {
        components.push(format!("ip:{}", ip_prefix(&ip)));
        outcome.client_ip = ip;
    }

    let cookie = tracking_cookie(attrs, &config.cookie_name);
    if !cookie.is_empty() {
        components.push(format!("cookie:{}", cookie));
        outcome.cookie_value = cookie;
    } else if config.inject_cookie {
        let generated = generate_cookie_value();
        components.push(format!("cookie:{}", generated));
        outcome.generated_cookie = Some(generated);
    }

    outcome.fingerprint = if components.is_empty() {
        sha256_hex("unknown")
    } else {
        sha256_hex(&components.join("|"))
    };

    outcome
}

// The raw address is hashed here, not the prefix: existing ip-only bans
// were issued against raw addresses and must keep matching.
fn derive_ip_only(attrs: &impl RequestAttrs) -> FingerprintOutcome {
    let mut outcome = FingerprintOutcome::default();

    let ip = client_ip(attrs);
    outcome.fingerprint = if ip.is_empty() {
        sha256_hex("unknown")
    } else {
        outcome.client_ip = ip.clone();
        sha256_hex(&format!("ip:{}", ip))
    };

    outcome
}

fn ja3_fingerprint(attrs: &impl RequestAttrs) -> String {
    for path in JA3_PROPERTY_PATHS {
        if let Some(value) = attrs.property(path) {
            if !value.is_empty() {
                if let Ok(ja3) = String::from_utf8(value) {
                    return ja3;
                }
            }
        }
    }

    attrs.header("x-ja3-fingerprint").unwrap_or_default()
}

fn client_ip(attrs: &impl RequestAttrs) -> String {
    if let Some(xff) = attrs.header("x-forwarded-for") {
        let first = leftmost_forwarded(&xff);
        if !first.is_empty() {
            return first;
        }
    }

    for name in IP_HEADERS {
        if let Some(value) = attrs.header(name) {
            if !value.is_empty() {
                return value;
            }
        }
    }

    for path in SOURCE_ADDRESS_PATHS {
        if let Some(value) = attrs.property(path) {
            if value.is_empty() {
                continue;
            }
            if let Ok(addr) = String::from_utf8(value) {
                return strip_port(&addr);
            }
        }
    }

    String::new()
}

/// Leftmost entry of a comma-separated forwarded chain is the original
/// client.
fn leftmost_forwarded(value: &str) -> String {
    value.split(',').next().unwrap_or("").trim().to_string()
}

/// Strips a trailing `:port` from an `ip:port` source address. More
/// than one colon means a bare IPv6 address, kept verbatim.
fn strip_port(addr: &str) -> String {
    match addr.rfind(':') {
        Some(idx) if idx > 0 => {
            if addr.matches(':').count() > 1 {
                addr.to_string()
            } else {
                addr[..idx].to_string()
            }
        }
        _ => addr.to_string(),
    }
}

/// Prefixes an address so nearby clients share an identity: /24 for
/// IPv4 (first three octets), /48 for IPv6 (first three groups).
/// `::ffff:`-mapped IPv4 is unwrapped first.
pub fn ip_prefix(ip: &str) -> String {
    let ip = ip.strip_prefix("::ffff:").unwrap_or(ip);

    let octets: Vec<&str> = ip.split('.').collect();
    if octets.len() == 4 {
        return octets[..3].join(".");
    }

    let groups: Vec<&str> = ip.split(':').collect();
    if groups.len() >= 3 {
        return groups[..3].join(":");
    }

    ip.to_string()
}

fn tracking_cookie(attrs: &impl RequestAttrs, name: &str) -> String {
    let header = attrs.header("cookie").unwrap_or_default();
    cookie_value(&header, name).unwrap_or_default()
}

/// Pulls one cookie out of a semicolon-separated Cookie header.
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    for cookie in header.split(';') {
        let cookie = cookie.trim();
        if let Some(value) = cookie.strip_prefix(name) {
            if let Some(value) = value.strip_prefix('=') {
                return Some(value.to_string());
            }
        }
    }
    None
}

pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex_lower(&digest)
}

fn hex_lower(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let hi = byte >> 4;
        let lo = byte & 0x0f;
        out.push(char::from_digit(hi as u32, 16).unwrap_or('0'));
        out.push(char::from_digit(lo as u32, 16).unwrap_or('0'));
    }
    out
}

/// Tracking cookie values are 16 hex chars derived from the wall clock;
/// the WASM sandbox offers no better entropy source and the value only
/// needs to be unique per client, not unguessable.
pub fn generate_cookie_value() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut hash = sha256_hex(&nanos.to_string());
    hash.truncate(16);
    hash
}

#[cfg(test)]
mod tests;

use super::*;
use crate::config::PluginConfig;
use crate::test_support::MapAttrs;

fn config_with_mode(mode: &str) -> PluginConfig {
    let mut config = PluginConfig::default();
    config.fingerprint_mode = mode.to_string();
    config
}

#[test]
fn test_partial_mode_reference_vector() {
    let attrs = MapAttrs::new()
        .with_header("user-agent", "Mozilla/5.0")
        .with_header("x-forwarded-for", "10.0.0.5")
        .with_header("cookie", "__bm=c1");

    let outcome = derive(&attrs, &config_with_mode("partial"));
    assert_eq!(
        outcome.fingerprint,
        sha256_hex("ua:Mozilla/5.0|ip:10.0.0|cookie:c1")
    );
    assert_eq!(outcome.client_ip, "10.0.0.5");
    assert_eq!(outcome.user_agent, "Mozilla/5.0");
    assert_eq!(outcome.cookie_value, "c1");
    assert!(outcome.generated_cookie.is_none());
}

#[test]
fn test_fingerprint_is_deterministic() {
    let attrs = MapAttrs::new()
        .with_header("user-agent", "Mozilla/5.0")
        .with_header("x-forwarded-for", "10.0.0.5")
        .with_header("cookie", "__bm=c1");
    let config = config_with_mode("partial");

    let first = derive(&attrs, &config);
    let second = derive(&attrs, &config);
    assert_eq!(first.fingerprint, second.fingerprint);
}

#[test]
fn test_no_attributes_hashes_unknown() {
    let attrs = MapAttrs::new();
    for mode in ["full", "partial", "ip-only"] {
        let outcome = derive(&attrs, &config_with_mode(mode));
        assert_eq!(outcome.fingerprint, sha256_hex("unknown"), "mode {}", mode);
    }
}

#[test]
fn test_full_mode_includes_ja3_from_property() {
    let attrs = MapAttrs::new()
        .with_property(&["connection", "tls", "ja3"], b"abc123")
        .with_header("user-agent", "Mozilla/5.0")
        .with_header("x-forwarded-for", "10.0.0.5");

    let outcome = derive(&attrs, &config_with_mode("full"));
    assert_eq!(
        outcome.fingerprint,
        sha256_hex("ja3:abc123|ua:Mozilla/5.0|ip:10.0.0")
    );
    assert_eq!(outcome.ja3, "abc123");
}

#[test]
fn test_ja3_header_fallback() {
    let attrs = MapAttrs::new()
        .with_header("x-ja3-fingerprint", "deadbeef")
        .with_header("user-agent", "Mozilla/5.0");

    let outcome = derive(&attrs, &config_with_mode("full"));
    assert_eq!(outcome.ja3, "deadbeef");
    assert_eq!(outcome.fingerprint, sha256_hex("ja3:deadbeef|ua:Mozilla/5.0"));
}

#[test]
fn test_partial_mode_ignores_ja3() {
    let attrs = MapAttrs::new()
        .with_property(&["connection", "tls", "ja3"], b"abc123")
        .with_header("user-agent", "Mozilla/5.0");

    let outcome = derive(&attrs, &config_with_mode("partial"));
    assert_eq!(outcome.fingerprint, sha256_hex("ua:Mozilla/5.0"));
    assert!(outcome.ja3.is_empty());
}

#[test]
fn test_xff_leftmost_wins() {
    let attrs = MapAttrs::new()
        .with_header("x-forwarded-for", " 203.0.113.7 , 10.0.0.1, 10.0.0.2")
        .with_header("x-real-ip", "198.51.100.1");

    let outcome = derive(&attrs, &config_with_mode("ip-only"));
    assert_eq!(outcome.client_ip, "203.0.113.7");
}

#[test]
fn test_ip_header_priority_order() {
    let attrs = MapAttrs::new()
        .with_header("true-client-ip", "198.51.100.2")
        .with_header("cf-connecting-ip", "198.51.100.3");

    let outcome = derive(&attrs, &config_with_mode("ip-only"));
    assert_eq!(outcome.client_ip, "198.51.100.2");
}

#[test]
fn test_source_address_property_strips_port() {
    let attrs = MapAttrs::new().with_property(&["source", "address"], b"192.0.2.4:51522");
    let outcome = derive(&attrs, &config_with_mode("ip-only"));
    assert_eq!(outcome.client_ip, "192.0.2.4");
}

#[test]
fn test_source_address_ipv6_kept_verbatim() {
    let attrs = MapAttrs::new().with_property(&["source", "address"], b"2001:db8::1");
    let outcome = derive(&attrs, &config_with_mode("ip-only"));
    assert_eq!(outcome.client_ip, "2001:db8::1");
}

#[test]
fn test_ip_only_hashes_raw_ip_not_prefix() {
    let attrs = MapAttrs::new().with_header("x-forwarded-for", "10.0.0.5");
    let outcome = derive(&attrs, &config_with_mode("ip-only"));
    assert_eq!(outcome.fingerprint, sha256_hex("ip:10.0.0.5"));
}

#[test]
fn test_ip_prefix_rules() {
    assert_eq!(ip_prefix("192.168.1.100"), "192.168.1");
    assert_eq!(ip_prefix("2001:db8:85a3:1:2:3:4:5"), "2001:db8:85a3");
    assert_eq!(ip_prefix("::ffff:192.168.1.100"), "192.168.1");
    assert_eq!(ip_prefix("not-an-ip"), "not-an-ip");
}

#[test]
fn test_cookie_parsing() {
    assert_eq!(cookie_value("__bm=c1", "__bm"), Some("c1".to_string()));
    assert_eq!(
        cookie_value("a=1; __bm=c1; b=2", "__bm"),
        Some("c1".to_string())
    );
    assert_eq!(cookie_value("__bmx=c1", "__bm"), None);
    assert_eq!(cookie_value("", "__bm"), None);
}

#[test]
fn test_cookie_injection_generates_component() {
    let attrs = MapAttrs::new().with_header("user-agent", "Mozilla/5.0");
    let mut config = config_with_mode("partial");
    config.inject_cookie = true;

    let outcome = derive(&attrs, &config);
    let generated = outcome.generated_cookie.expect("cookie should be generated");
    assert_eq!(generated.len(), 16);
    assert!(generated.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(
        outcome.fingerprint,
        sha256_hex(&format!("ua:Mozilla/5.0|cookie:{}", generated))
    );
}

#[test]
fn test_existing_cookie_suppresses_injection() {
    let attrs = MapAttrs::new().with_header("cookie", "__bm=c1");
    let mut config = config_with_mode("partial");
    config.inject_cookie = true;

    let outcome = derive(&attrs, &config);
    assert!(outcome.generated_cookie.is_none());
    assert_eq!(outcome.cookie_value, "c1");
}

#[test]
fn test_stable_under_unrelated_header_presence() {
    // Extra headers must not disturb the labeled fixed-order composition.
    let base = MapAttrs::new()
        .with_header("user-agent", "Mozilla/5.0")
        .with_header("x-forwarded-for", "10.0.0.5")
        .with_header("cookie", "__bm=c1");
    let noisy = MapAttrs::new()
        .with_header("accept", "text/html")
        .with_header("cookie", "__bm=c1")
        .with_header("x-forwarded-for", "10.0.0.5")
        .with_header("referer", "https://example.com/")
        .with_header("user-agent", "Mozilla/5.0");
    let config = config_with_mode("partial");

    assert_eq!(
        derive(&base, &config).fingerprint,
        derive(&noisy, &config).fingerprint
    );
}

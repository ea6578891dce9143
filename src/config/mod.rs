// src/config/mod.rs
// Plugin configuration, parsed from JSON at plugin start. Soft issues
// (missing keys, non-positive numbers) fall back to defaults with a
// warning; hard bound violations fail startup with one consolidated
// error so operators see every offending field at once.

use std::collections::HashMap;

use serde::Deserialize;

use crate::logger::{LogLevel, Logger};

pub const DEFAULT_BAN_TTL: i64 = 600;
pub const DEFAULT_SCORE_THRESHOLD: i64 = 100;
pub const DEFAULT_SCORE_DECAY: i64 = 60;
pub const DEFAULT_SCORE_TTL: i64 = 3600;
pub const DEFAULT_REDIS_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_COOKIE_NAME: &str = "__bm";

const DEFAULT_SCORE_INCREMENT: i64 = 10;

/// How the client fingerprint is composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintMode {
    /// JA3 + User-Agent + IP prefix + tracking cookie.
    Full,
    /// User-Agent + IP prefix + tracking cookie.
    Partial,
    /// Raw client IP only.
    IpOnly,
}

impl FingerprintMode {
    fn parse(value: &str) -> Option<FingerprintMode> {
        match value {
            "full" => Some(FingerprintMode::Full),
            "partial" => Some(FingerprintMode::Partial),
            "ip-only" => Some(FingerprintMode::IpOnly),
            _ => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PluginConfig {
    /// Envoy cluster name for the Redis HTTP gateway; empty disables
    /// the remote store entirely.
    #[serde(default)]
    pub redis_cluster: String,

    #[serde(default = "default_ban_ttl")]
    pub ban_ttl_default: i64,

    /// Per-severity ban TTLs, e.g. {"critical": 3600, "high": 1800}.
    #[serde(default)]
    pub ban_ttl_by_severity: HashMap<String, i64>,

    /// Behavioral scoring instead of immediate bans.
    #[serde(default)]
    pub scoring_enabled: bool,

    #[serde(default = "default_score_threshold")]
    pub score_threshold: i64,

    /// Seconds per one point of score decay.
    #[serde(default = "default_score_decay")]
    pub score_decay_seconds: i64,

    /// TTL for score keys in the remote store.
    #[serde(default = "default_score_ttl")]
    pub score_ttl: i64,

    /// Per-rule score increments, e.g. {"930120": 40}.
    #[serde(default)]
    pub score_rules: HashMap<String, i64>,

    /// Per-severity score increments, used when the rule has no
    /// specific entry.
    #[serde(default = "default_score_by_severity")]
    pub score_by_severity: HashMap<String, i64>,

    #[serde(default = "default_fingerprint_mode")]
    pub fingerprint_mode: String,

    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    #[serde(default)]
    pub inject_cookie: bool,

    #[serde(default = "default_ban_response_code")]
    pub ban_response_code: u32,

    #[serde(default = "default_ban_response_body")]
    pub ban_response_body: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Compute and log decisions without ever denying.
    #[serde(default)]
    pub dry_run: bool,

    #[serde(default = "default_events_enabled")]
    pub events_enabled: bool,

    /// Upper bound for each remote-store dispatch.
    #[serde(default = "default_redis_timeout_ms")]
    pub redis_timeout_ms: u64,
}

impl Default for PluginConfig {
    fn default() -> Self {
        PluginConfig {
            redis_cluster: String::new(),
            ban_ttl_default: DEFAULT_BAN_TTL,
            ban_ttl_by_severity: HashMap::new(),
            scoring_enabled: false,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            score_decay_seconds: DEFAULT_SCORE_DECAY,
            score_ttl: DEFAULT_SCORE_TTL,
            score_rules: HashMap::new(),
            score_by_severity: default_score_by_severity(),
            fingerprint_mode: "full".to_string(),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            inject_cookie: false,
            ban_response_code: 403,
            ban_response_body: "Forbidden".to_string(),
            log_level: "info".to_string(),
            dry_run: false,
            events_enabled: true,
            redis_timeout_ms: DEFAULT_REDIS_TIMEOUT_MS,
        }
    }
}

impl PluginConfig {
    /// TTL for a new ban: severity-specific when mapped, default
    /// otherwise.
    pub fn ban_ttl_for(&self, severity: &str) -> i64 {
        self.ban_ttl_by_severity
            .get(severity)
            .copied()
            .unwrap_or(self.ban_ttl_default)
    }

    /// Score increment for a rule hit: rule-specific first, then
    /// severity-based, then the flat default.
    pub fn score_for(&self, rule_id: &str, severity: &str) -> i64 {
        if let Some(score) = self.score_rules.get(rule_id) {
            return *score;
        }
        self.score_by_severity
            .get(severity)
            .copied()
            .unwrap_or(DEFAULT_SCORE_INCREMENT)
    }

    pub fn fingerprint_mode(&self) -> FingerprintMode {
        FingerprintMode::parse(&self.fingerprint_mode).unwrap_or(FingerprintMode::Full)
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::parse(&self.log_level).unwrap_or(LogLevel::Info)
    }

    /// Corrects recoverable problems to defaults, warning per field.
    fn normalize(&mut self, logger: &dyn Logger) {
        if self.ban_ttl_default <= 0 {
            warn_default(logger, "ban_ttl_default", DEFAULT_BAN_TTL);
            self.ban_ttl_default = DEFAULT_BAN_TTL;
        }
        if self.score_threshold <= 0 {
            warn_default(logger, "score_threshold", DEFAULT_SCORE_THRESHOLD);
            self.score_threshold = DEFAULT_SCORE_THRESHOLD;
        }
        if self.score_decay_seconds <= 0 {
            warn_default(logger, "score_decay_seconds", DEFAULT_SCORE_DECAY);
            self.score_decay_seconds = DEFAULT_SCORE_DECAY;
        }
        if self.score_ttl <= 0 {
            warn_default(logger, "score_ttl", DEFAULT_SCORE_TTL);
            self.score_ttl = DEFAULT_SCORE_TTL;
        }
        if self.cookie_name.is_empty() {
            logger.warn("invalid cookie_name, using default __bm");
            self.cookie_name = DEFAULT_COOKIE_NAME.to_string();
        }
        if self.ban_response_code == 0 {
            logger.warn("invalid ban_response_code, using default 403");
            self.ban_response_code = 403;
        }
        if self.ban_response_body.is_empty() {
            self.ban_response_body = "Forbidden".to_string();
        }
        if self.redis_timeout_ms == 0 {
            warn_default(logger, "redis_timeout_ms", DEFAULT_REDIS_TIMEOUT_MS as i64);
            self.redis_timeout_ms = DEFAULT_REDIS_TIMEOUT_MS;
        }
    }

    /// Hard bounds. Collects every violation so a bad rollout reads as
    /// one actionable error.
    fn validate(&self) -> Result<(), String> {
        let mut errors: Vec<String> = Vec::new();

        if !(1..=86400).contains(&self.ban_ttl_default) {
            errors.push("ban_ttl_default must be between 1-86400 seconds".to_string());
        }
        for (severity, ttl) in &self.ban_ttl_by_severity {
            if !(1..=86400).contains(ttl) {
                errors.push(format!(
                    "ban_ttl_by_severity[{}] must be between 1-86400 seconds",
                    severity
                ));
            }
        }

        if self.scoring_enabled && !(1..=10000).contains(&self.score_threshold) {
            errors.push("score_threshold must be between 1-10000".to_string());
        }
        if !(1..=3600).contains(&self.score_decay_seconds) {
            errors.push("score_decay_seconds must be between 1-3600 seconds".to_string());
        }
        if !(1..=86400).contains(&self.score_ttl) {
            errors.push("score_ttl must be between 1-86400 seconds".to_string());
        }
        for (rule_id, score) in &self.score_rules {
            if !(1..=1000).contains(score) {
                errors.push(format!("score_rules[{}] must be between 1-1000", rule_id));
            }
        }
        for (severity, score) in &self.score_by_severity {
            if !(1..=1000).contains(score) {
                errors.push(format!(
                    "score_by_severity[{}] must be between 1-1000",
                    severity
                ));
            }
        }

        if FingerprintMode::parse(&self.fingerprint_mode).is_none() {
            errors.push("fingerprint_mode must be one of: full, partial, ip-only".to_string());
        }
        if !(400..=599).contains(&self.ban_response_code) {
            errors.push("ban_response_code must be between 400-599".to_string());
        }
        if LogLevel::parse(&self.log_level).is_none() {
            errors.push("log_level must be one of: debug, info, warn, error".to_string());
        }
        if self.inject_cookie && self.cookie_name.is_empty() {
            errors.push("cookie_name is required when inject_cookie is true".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "configuration validation failed: {}",
                errors.join("; ")
            ))
        }
    }
}

fn warn_default(logger: &dyn Logger, field: &str, fallback: i64) {
    logger.warn(&format!("invalid {}, using default {}", field, fallback));
}

/// Parses and validates the plugin configuration; absent configuration
/// means all defaults.
pub fn parse(data: Option<&[u8]>, logger: &dyn Logger) -> Result<PluginConfig, String> {
    let data = match data {
        Some(data) if !data.is_empty() => data,
        _ => {
            logger.info("no configuration provided, using defaults");
            return Ok(PluginConfig::default());
        }
    };

    let mut config: PluginConfig = serde_json::from_slice(data)
        .map_err(|err| format!("failed to parse configuration: {}", err))?;

    config.normalize(logger);
    config.validate()?;

    Ok(config)
}

fn default_ban_ttl() -> i64 {
    DEFAULT_BAN_TTL
}

fn default_score_threshold() -> i64 {
    DEFAULT_SCORE_THRESHOLD
}

fn default_score_decay() -> i64 {
    DEFAULT_SCORE_DECAY
}

fn default_score_ttl() -> i64 {
    DEFAULT_SCORE_TTL
}

fn default_score_by_severity() -> HashMap<String, i64> {
    HashMap::from([
        ("critical".to_string(), 50),
        ("high".to_string(), 40),
        ("medium".to_string(), 20),
        ("low".to_string(), 10),
    ])
}

fn default_fingerprint_mode() -> String {
    "full".to_string()
}

fn default_cookie_name() -> String {
    DEFAULT_COOKIE_NAME.to_string()
}

fn default_ban_response_code() -> u32 {
    403
}

fn default_ban_response_body() -> String {
    "Forbidden".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_events_enabled() -> bool {
    true
}

fn default_redis_timeout_ms() -> u64 {
    DEFAULT_REDIS_TIMEOUT_MS
}

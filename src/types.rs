// src/types.rs
// Ban and score records, WAF decisions, and storage key helpers.
// Records are stored as JSON (UTF-8) under `ban:<fp>` / `score:<fp>` in
// both the local shared-data cache and the remote store.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Upper bound on retained rule hits per score record. Without a cap the
/// hit list grows for as long as the record lives and inflates every
/// subsequent read-modify-write of the JSON payload.
pub const MAX_RULE_HITS: usize = 64;

pub(crate) fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// A ban record for a client fingerprint.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BanRecord {
    pub fingerprint: String,
    pub reason: String,
    pub rule_id: String,
    pub severity: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub ttl: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
}

impl BanRecord {
    pub fn new(fingerprint: &str, reason: String, rule_id: &str, severity: &str, ttl: i64) -> Self {
        let now = now_ts();
        BanRecord {
            fingerprint: fingerprint.to_string(),
            reason,
            rule_id: rule_id.to_string(),
            severity: severity.to_string(),
            created_at: now,
            expires_at: now + ttl,
            ttl,
            score: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        now_ts() > self.expires_at
    }
}

/// A behavioral score record. Scores accumulate on WAF rule hits and
/// decay over time; a ban is issued once the configured threshold is hit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScoreRecord {
    pub fingerprint: String,
    pub score: i64,
    pub last_updated: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_hits: Vec<RuleHit>,
}

/// One WAF rule trigger contributing to a score.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RuleHit {
    pub rule_id: String,
    pub severity: String,
    pub score: i64,
    pub timestamp: i64,
}

impl ScoreRecord {
    pub fn new(fingerprint: &str) -> Self {
        ScoreRecord {
            fingerprint: fingerprint.to_string(),
            score: 0,
            last_updated: now_ts(),
            rule_hits: Vec::new(),
        }
    }

    /// Adds a rule hit: bumps the score, stamps `last_updated`, and
    /// records the hit (bounded by `MAX_RULE_HITS`, oldest dropped).
    pub fn add_hit(&mut self, rule_id: &str, severity: &str, score: i64) {
        let now = now_ts();
        self.score += score;
        self.last_updated = now;
        self.rule_hits.push(RuleHit {
            rule_id: rule_id.to_string(),
            severity: severity.to_string(),
            score,
            timestamp: now,
        });
        if self.rule_hits.len() > MAX_RULE_HITS {
            let excess = self.rule_hits.len() - MAX_RULE_HITS;
            self.rule_hits.drain(..excess);
        }
    }

    /// Applies time-based decay: one point per elapsed `decay_seconds`
    /// interval, floored at zero. `last_updated` moves only when at
    /// least one full interval has elapsed, so reads between intervals
    /// do not reset the decay clock.
    pub fn decay(&mut self, decay_seconds: i64) {
        if decay_seconds <= 0 {
            return;
        }

        let now = now_ts();
        let elapsed = now - self.last_updated;

        let decay = elapsed / decay_seconds;
        if decay > 0 {
            self.score -= decay;
            if self.score < 0 {
                self.score = 0;
            }
            self.last_updated = now;
        }
    }
}

/// The upstream WAF's verdict for a request, read from dynamic metadata
/// or fallback response headers.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct WafDecision {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub rule_id: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub matched_data: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl WafDecision {
    /// True when the action denotes an actual block, case-insensitively.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self.action.to_ascii_lowercase().as_str(),
            "block" | "deny" | "drop"
        )
    }
}

const BAN_KEY_PREFIX: &str = "ban:";
const SCORE_KEY_PREFIX: &str = "score:";

pub fn ban_key(fingerprint: &str) -> String {
    format!("{}{}", BAN_KEY_PREFIX, fingerprint)
}

pub fn score_key(fingerprint: &str) -> String {
    format!("{}{}", SCORE_KEY_PREFIX, fingerprint)
}

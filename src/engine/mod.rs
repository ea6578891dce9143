// src/engine/mod.rs
// The decision core: is this client banned, and should it be banned
// now. Works purely against the store and sink capabilities so the
// same engine drives production shared data and in-memory test stores.

use crate::config::PluginConfig;
use crate::events::{BanEvent, BanEventType, EventSink, EventSource};
use crate::logger::Logger;
use crate::store::{BanStore, ScoreStore};
use crate::types::{BanRecord, WafDecision};

pub struct CheckOutcome {
    pub banned: bool,
    pub record: Option<BanRecord>,
}

pub struct IssueOutcome {
    pub issued: bool,
    pub record: Option<BanRecord>,
    /// Post-increment score when scoring is enabled.
    pub score: Option<i64>,
    /// The increment that was applied, for mirroring into the remote
    /// store.
    pub score_increment: Option<i64>,
}

impl IssueOutcome {
    fn not_issued() -> Self {
        IssueOutcome {
            issued: false,
            record: None,
            score: None,
            score_increment: None,
        }
    }
}

pub struct BanEngine<'a, B: BanStore, S: ScoreStore> {
    config: &'a PluginConfig,
    logger: &'a dyn Logger,
    bans: B,
    scores: S,
    events: &'a dyn EventSink,
}

impl<'a, B: BanStore, S: ScoreStore> BanEngine<'a, B, S> {
    pub fn new(
        config: &'a PluginConfig,
        logger: &'a dyn Logger,
        bans: B,
        scores: S,
        events: &'a dyn EventSink,
    ) -> Self {
        BanEngine {
            config,
            logger,
            bans,
            scores,
            events,
        }
    }

    /// Consults the local store. A hit emits an enforced event; the
    /// caller decides how to deny.
    pub fn check(&self, fingerprint: &str) -> CheckOutcome {
        if fingerprint.is_empty() {
            self.logger.warn("no fingerprint available, skipping ban check");
            return CheckOutcome {
                banned: false,
                record: None,
            };
        }

        match self.bans.check_ban(fingerprint) {
            Some(record) => {
                self.logger.info(&format!(
                    "ban found in local cache for {} (rule={}, expires={})",
                    fingerprint, record.rule_id, record.expires_at
                ));

                self.events.on_event(&BanEvent::new(
                    BanEventType::Enforced,
                    fingerprint,
                    &record.rule_id,
                    &record.severity,
                    EventSource::Local,
                ));

                CheckOutcome {
                    banned: true,
                    record: Some(record),
                }
            }
            None => CheckOutcome {
                banned: false,
                record: None,
            },
        }
    }

    /// Turns a blocking WAF decision into a ban, directly or through
    /// the behavioral score, depending on configuration.
    pub fn issue(&self, fingerprint: &str, decision: &WafDecision) -> IssueOutcome {
        if fingerprint.is_empty() {
            self.logger.warn("no fingerprint available, cannot issue ban");
            return IssueOutcome::not_issued();
        }

        let severity = if decision.severity.is_empty() {
            "medium"
        } else {
            decision.severity.as_str()
        };
        let rule_id = if decision.rule_id.is_empty() {
            "unknown"
        } else {
            decision.rule_id.as_str()
        };

        if self.config.scoring_enabled {
            self.issue_scored(fingerprint, rule_id, severity)
        } else {
            self.issue_direct(fingerprint, rule_id, severity)
        }
    }

    fn issue_direct(&self, fingerprint: &str, rule_id: &str, severity: &str) -> IssueOutcome {
        let ttl = self.config.ban_ttl_for(severity);
        let reason = format!("waf-rule:{}", rule_id);

        let record = BanRecord::new(fingerprint, reason, rule_id, severity, ttl);
        if let Err(err) = self.bans.set_ban(&record) {
            self.logger
                .error(&format!("failed to store ban in local cache: {:?}", err));
            return IssueOutcome::not_issued();
        }

        self.logger.info(&format!(
            "ban issued: fingerprint={}, rule={}, severity={}, ttl={}",
            fingerprint, rule_id, severity, ttl
        ));

        let mut event = BanEvent::new(
            BanEventType::Issued,
            fingerprint,
            rule_id,
            severity,
            EventSource::Local,
        );
        event.ttl = Some(ttl);
        self.events.on_event(&event);

        IssueOutcome {
            issued: true,
            record: Some(record),
            score: None,
            score_increment: None,
        }
    }

    fn issue_scored(&self, fingerprint: &str, rule_id: &str, severity: &str) -> IssueOutcome {
        let increment = self.config.score_for(rule_id, severity);

        let new_score = match self.scores.incr_score(fingerprint, rule_id, severity, increment) {
            Ok(score) => score,
            Err(err) => {
                self.logger
                    .error(&format!("failed to update score: {:?}", err));
                return IssueOutcome::not_issued();
            }
        };

        self.logger.info(&format!(
            "score updated: fingerprint={}, rule={}, score={}/{}",
            fingerprint, rule_id, new_score, self.config.score_threshold
        ));

        let mut score_event = BanEvent::new(
            BanEventType::ScoreUpdated,
            fingerprint,
            rule_id,
            severity,
            EventSource::Local,
        );
        score_event.score = Some(new_score);
        score_event.threshold = Some(self.config.score_threshold);
        self.events.on_event(&score_event);

        if new_score < self.config.score_threshold {
            return IssueOutcome {
                issued: false,
                record: None,
                score: Some(new_score),
                score_increment: Some(increment),
            };
        }

        self.logger.info("score threshold exceeded, issuing ban");

        let ttl = self.config.ban_ttl_for(severity);
        let reason = format!("score-threshold:{}", new_score);

        let mut record = BanRecord::new(fingerprint, reason, rule_id, severity, ttl);
        record.score = Some(new_score);

        if let Err(err) = self.bans.set_ban(&record) {
            self.logger
                .error(&format!("failed to store ban in local cache: {:?}", err));
            return IssueOutcome {
                issued: false,
                record: None,
                score: Some(new_score),
                score_increment: Some(increment),
            };
        }

        let mut issued_event = BanEvent::new(
            BanEventType::Issued,
            fingerprint,
            rule_id,
            severity,
            EventSource::Local,
        );
        issued_event.ttl = Some(ttl);
        issued_event.score = Some(new_score);
        self.events.on_event(&issued_event);

        IssueOutcome {
            issued: true,
            record: Some(record),
            score: Some(new_score),
            score_increment: Some(increment),
        }
    }

    /// Persists a record received from the remote store. No event: the
    /// remote copy is authoritative for that hit and the enforced event
    /// fires on the local re-check.
    pub fn sync_from_remote(&self, record: &BanRecord) {
        if let Err(err) = self.bans.set_ban(record) {
            self.logger
                .error(&format!("failed to sync ban to local cache: {:?}", err));
        }
    }
}

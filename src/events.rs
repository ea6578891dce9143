// src/events.rs
// Ban lifecycle events for observability. Events are emitted
// synchronously from the ban engine; the sink decides what to do with
// them (the default logs, webhooks could hang off the same trait).

use serde::Serialize;

use crate::logger::Logger;
use crate::types::now_ts;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BanEventType {
    /// A new ban was created.
    Issued,
    /// An existing ban blocked a request.
    Enforced,
    /// A ban lapsed and was removed on read.
    Expired,
    /// A behavioral score changed (scoring mode).
    ScoreUpdated,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    Local,
    Remote,
}

impl EventSource {
    fn as_str(&self) -> &'static str {
        match self {
            EventSource::Local => "local",
            EventSource::Remote => "remote",
        }
    }
}

/// A single ban lifecycle event.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct BanEvent {
    #[serde(rename = "type")]
    pub event_type: BanEventType,
    pub fingerprint: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rule_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub severity: String,
    pub timestamp: i64,
    pub source: EventSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
}

impl BanEvent {
    pub fn new(
        event_type: BanEventType,
        fingerprint: &str,
        rule_id: &str,
        severity: &str,
        source: EventSource,
    ) -> Self {
        BanEvent {
            event_type,
            fingerprint: fingerprint.to_string(),
            rule_id: rule_id.to_string(),
            severity: severity.to_string(),
            timestamp: now_ts(),
            source,
            score: None,
            threshold: None,
            ttl: None,
        }
    }
}

/// Consumes ban events.
pub trait EventSink {
    fn on_event(&self, event: &BanEvent);
}

/// Default sink: structured log lines through the plugin logger.
pub struct LogEventSink<L: Logger> {
    logger: L,
}

impl<L: Logger> LogEventSink<L> {
    pub fn new(logger: L) -> Self {
        LogEventSink { logger }
    }
}

impl<L: Logger> EventSink for LogEventSink<L> {
    fn on_event(&self, event: &BanEvent) {
        match event.event_type {
            BanEventType::Issued => self.logger.info(&format!(
                "ban_event: type=issued fingerprint={} rule={} severity={} ttl={} source={}",
                event.fingerprint,
                event.rule_id,
                event.severity,
                event.ttl.unwrap_or(0),
                event.source.as_str(),
            )),
            BanEventType::Enforced => self.logger.info(&format!(
                "ban_event: type=enforced fingerprint={} source={}",
                event.fingerprint, event.source.as_str(),
            )),
            BanEventType::ScoreUpdated => self.logger.info(&format!(
                "ban_event: type=score_updated fingerprint={} rule={} score={}/{} source={}",
                event.fingerprint,
                event.rule_id,
                event.score.unwrap_or(0),
                event.threshold.unwrap_or(0),
                event.source.as_str(),
            )),
            BanEventType::Expired => self.logger.debug(&format!(
                "ban_event: type=expired fingerprint={} source={}",
                event.fingerprint, event.source.as_str(),
            )),
        }
    }
}

/// Discards all events; used when events are disabled.
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn on_event(&self, _event: &BanEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::CapturingLogger;
    use crate::logger::LogLevel;

    #[test]
    fn test_event_serialization_omits_empty_fields() {
        let event = BanEvent::new(BanEventType::Enforced, "fp", "", "", EventSource::Local);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"enforced\""));
        assert!(json.contains("\"source\":\"local\""));
        assert!(!json.contains("rule_id"));
        assert!(!json.contains("severity"));
        assert!(!json.contains("score"));
        assert!(!json.contains("ttl"));
    }

    #[test]
    fn test_event_serialization_full() {
        let mut event =
            BanEvent::new(BanEventType::ScoreUpdated, "fp", "941100", "medium", EventSource::Local);
        event.score = Some(40);
        event.threshold = Some(60);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"score_updated\""));
        assert!(json.contains("\"rule_id\":\"941100\""));
        assert!(json.contains("\"score\":40"));
        assert!(json.contains("\"threshold\":60"));
    }

    #[test]
    fn test_log_sink_levels() {
        let logger = CapturingLogger::default();
        let sink = LogEventSink::new(&logger);

        let mut issued = BanEvent::new(BanEventType::Issued, "fp", "930120", "high", EventSource::Local);
        issued.ttl = Some(1800);
        sink.on_event(&issued);

        let expired = BanEvent::new(BanEventType::Expired, "fp", "", "", EventSource::Local);
        sink.on_event(&expired);

        let lines = logger.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].0, LogLevel::Info);
        assert!(lines[0].1.contains("type=issued"));
        assert!(lines[0].1.contains("ttl=1800"));
        assert_eq!(lines[1].0, LogLevel::Debug);
        assert!(lines[1].1.contains("type=expired"));
    }

    #[test]
    fn test_noop_sink_is_silent() {
        let event = BanEvent::new(BanEventType::Issued, "fp", "1", "low", EventSource::Local);
        NoopEventSink.on_event(&event);
    }
}

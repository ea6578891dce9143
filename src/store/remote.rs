// src/store/remote.rs
// Remote fleet store adapter speaking the webdis HTTP flavor of Redis
// (GET-method commands, JSON envelopes). The proxy delivers HTTP-call
// replies through a context entry point rather than a closure, so this
// module splits each operation into a pure request builder and a pure
// reply parser; the filter dispatches the call and routes the reply by
// its pending tag.
//
// Expected endpoints:
// - /GET/<key>                     -> {"GET": "<value>"} | {"GET": null}
// - /SETEX/<key>/<ttl>/<payload>   -> {"SETEX": [true, "OK"]}
// - /DEL/<key>                     -> {"DEL": 1}
// - /INCRBY/<key>/<n>              -> {"INCRBY": <new value>}
// - /EXPIRE/<key>/<ttl>            -> {"EXPIRE": 1}

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};

use crate::config::PluginConfig;
use crate::logger::Logger;
use crate::types::{ban_key, score_key, BanRecord};

/// Tag identifying what a dispatched HTTP call was for, kept by the
/// filter until the reply arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingKind {
    BanCheck,
    BanSet,
    BanDelete,
    ScoreIncr { fingerprint: String, ttl: i64 },
    ScoreExpire,
    ScoreGet,
}

/// A ready-to-dispatch remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    pub path: String,
    pub kind: PendingKind,
}

/// Outcome of a remote ban lookup. An expired record must be deleted by
/// the caller (async, fire-and-forget) and treated as absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteBanLookup {
    Absent,
    Active(BanRecord),
    Expired,
}

/// Client-side view of the remote store. Unconfigured (empty cluster)
/// means every operation is skipped and reads report absent.
pub struct RemoteStore {
    cluster: String,
    timeout: Duration,
}

impl RemoteStore {
    pub fn from_config(config: &PluginConfig) -> Self {
        RemoteStore {
            cluster: config.redis_cluster.clone(),
            timeout: Duration::from_millis(config.redis_timeout_ms),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.cluster.is_empty()
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn ban_check(&self, fingerprint: &str) -> RemoteCall {
        RemoteCall {
            path: format!("/GET/{}", ban_key(fingerprint)),
            kind: PendingKind::BanCheck,
        }
    }

    /// Ban writes go through SETEX so the remote store owns expiry. The
    /// JSON payload rides in the path and is percent-escaped.
    pub fn ban_set(&self, record: &BanRecord) -> Option<RemoteCall> {
        let payload = serde_json::to_string(record).ok()?;
        let escaped = utf8_percent_encode(&payload, NON_ALPHANUMERIC);
        Some(RemoteCall {
            path: format!("/SETEX/{}/{}/{}", ban_key(&record.fingerprint), record.ttl, escaped),
            kind: PendingKind::BanSet,
        })
    }

    pub fn ban_delete(&self, fingerprint: &str) -> RemoteCall {
        RemoteCall {
            path: format!("/DEL/{}", ban_key(fingerprint)),
            kind: PendingKind::BanDelete,
        }
    }

    /// INCRBY returns the new fleet-wide count; the TTL is applied by a
    /// chained EXPIRE once the reply lands. The pair is not atomic and
    /// a freshly incremented score may briefly lack a TTL.
    pub fn score_incr(&self, fingerprint: &str, increment: i64, ttl: i64) -> RemoteCall {
        RemoteCall {
            path: format!("/INCRBY/{}/{}", score_key(fingerprint), increment),
            kind: PendingKind::ScoreIncr {
                fingerprint: fingerprint.to_string(),
                ttl,
            },
        }
    }

    pub fn score_expire(&self, fingerprint: &str, ttl: i64) -> RemoteCall {
        RemoteCall {
            path: format!("/EXPIRE/{}/{}", score_key(fingerprint), ttl),
            kind: PendingKind::ScoreExpire,
        }
    }

    #[allow(dead_code)]
    pub fn score_get(&self, fingerprint: &str) -> RemoteCall {
        RemoteCall {
            path: format!("/GET/{}", score_key(fingerprint)),
            kind: PendingKind::ScoreGet,
        }
    }
}

fn envelope_value(logger: &dyn Logger, body: Option<&[u8]>, command: &str) -> Option<serde_json::Value> {
    let body = body?;
    if body.is_empty() {
        return None;
    }

    let mut envelope: serde_json::Map<String, serde_json::Value> =
        match serde_json::from_slice(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                logger.error(&format!("failed to parse remote {} response: {}", command, err));
                return None;
            }
        };

    envelope.remove(command)
}

/// Parses a `/GET/ban:<fp>` reply. Non-200, missing key, and null all
/// mean absent.
pub fn parse_ban_lookup(logger: &dyn Logger, status: u32, body: Option<&[u8]>) -> RemoteBanLookup {
    if status != 200 {
        logger.debug(&format!("remote store returned status {}", status));
        return RemoteBanLookup::Absent;
    }

    let value = match envelope_value(logger, body, "GET") {
        Some(value) => value,
        None => return RemoteBanLookup::Absent,
    };

    let raw = match value.as_str() {
        Some(raw) => raw,
        None => return RemoteBanLookup::Absent,
    };

    let record: BanRecord = match serde_json::from_str(raw) {
        Ok(record) => record,
        Err(err) => {
            logger.error(&format!("failed to parse remote ban record: {}", err));
            return RemoteBanLookup::Absent;
        }
    };

    if record.is_expired() {
        logger.debug("remote ban is expired");
        return RemoteBanLookup::Expired;
    }

    RemoteBanLookup::Active(record)
}

/// Parses an `/INCRBY` reply into the new score.
pub fn parse_incr(logger: &dyn Logger, status: u32, body: Option<&[u8]>) -> Option<i64> {
    if status != 200 {
        logger.debug(&format!("remote INCRBY returned status {}", status));
        return None;
    }

    envelope_value(logger, body, "INCRBY")?.as_i64()
}

/// Parses a `/GET/score:<fp>` reply. Scores live in the remote store as
/// strings, except right after an INCRBY when they may echo as numbers.
#[allow(dead_code)]
pub fn parse_score(logger: &dyn Logger, status: u32, body: Option<&[u8]>) -> Option<i64> {
    if status != 200 {
        return None;
    }

    let value = envelope_value(logger, body, "GET")?;
    match value {
        serde_json::Value::String(raw) => raw.trim().parse().ok(),
        serde_json::Value::Number(num) => num.as_i64(),
        _ => None,
    }
}

// src/store/local.rs
// Process-local ban and score stores over the shared-data substrate.
// Expiry is enforced lazily at read time; every mutation goes through
// CAS with a single retry so worst-case request latency stays bounded.

use crate::logger::Logger;
use crate::store::{BanStore, ScoreStore, SharedData, StoreError};
use crate::types::{ban_key, score_key, BanRecord, ScoreRecord};

fn set_with_retry(
    data: &impl SharedData,
    key: &str,
    value: &[u8],
    cas: Option<u32>,
) -> Result<(), StoreError> {
    match data.set(key, value, cas) {
        Err(StoreError::CasMismatch) => {
            let (_, fresh_cas) = data.get(key)?;
            data.set(key, value, fresh_cas)
        }
        other => other,
    }
}

pub struct LocalBanStore<'a, D: SharedData> {
    data: D,
    logger: &'a dyn Logger,
}

impl<'a, D: SharedData> LocalBanStore<'a, D> {
    pub fn new(data: D, logger: &'a dyn Logger) -> Self {
        LocalBanStore { data, logger }
    }
}

impl<D: SharedData> BanStore for LocalBanStore<'_, D> {
    fn check_ban(&self, fingerprint: &str) -> Option<BanRecord> {
        let key = ban_key(fingerprint);

        let data = match self.data.get(&key) {
            Ok((data, _)) => data?,
            Err(err) => {
                self.logger.error(&format!(
                    "failed to read ban cache for {}: {:?}",
                    fingerprint, err
                ));
                return None;
            }
        };

        if data.is_empty() {
            return None;
        }

        let record: BanRecord = match serde_json::from_slice(&data) {
            Ok(record) => record,
            Err(err) => {
                self.logger.error(&format!(
                    "failed to parse ban record for {}: {}",
                    fingerprint, err
                ));
                return None;
            }
        };

        if record.is_expired() {
            self.logger.debug(&format!("ban expired for {}", fingerprint));
            self.delete_ban(fingerprint);
            return None;
        }

        Some(record)
    }

    fn set_ban(&self, record: &BanRecord) -> Result<(), StoreError> {
        let key = ban_key(&record.fingerprint);
        let value = match serde_json::to_vec(record) {
            Ok(value) => value,
            Err(err) => {
                self.logger
                    .error(&format!("failed to encode ban record: {}", err));
                return Ok(());
            }
        };

        let (_, cas) = self.data.get(&key)?;
        set_with_retry(&self.data, &key, &value, cas)
    }

    fn delete_ban(&self, fingerprint: &str) {
        let key = ban_key(fingerprint);
        let cas = match self.data.get(&key) {
            Ok((_, cas)) => cas,
            Err(_) => None,
        };
        if let Err(err) = self.data.set(&key, &[], cas) {
            self.logger.debug(&format!(
                "failed to delete local ban for {}: {:?}",
                fingerprint, err
            ));
        }
    }
}

pub struct LocalScoreStore<'a, D: SharedData> {
    data: D,
    logger: &'a dyn Logger,
    decay_seconds: i64,
}

impl<'a, D: SharedData> LocalScoreStore<'a, D> {
    pub fn new(data: D, logger: &'a dyn Logger, decay_seconds: i64) -> Self {
        LocalScoreStore {
            data,
            logger,
            decay_seconds,
        }
    }
}

impl<D: SharedData> ScoreStore for LocalScoreStore<'_, D> {
    fn get_score(&self, fingerprint: &str) -> Option<ScoreRecord> {
        let key = score_key(fingerprint);

        let data = match self.data.get(&key) {
            Ok((data, _)) => data?,
            Err(err) => {
                self.logger.error(&format!(
                    "failed to read score cache for {}: {:?}",
                    fingerprint, err
                ));
                return None;
            }
        };

        if data.is_empty() {
            return None;
        }

        match serde_json::from_slice(&data) {
            Ok(record) => Some(record),
            Err(err) => {
                self.logger.error(&format!(
                    "failed to parse score record for {}: {}",
                    fingerprint, err
                ));
                None
            }
        }
    }

    fn set_score(&self, record: &ScoreRecord) -> Result<(), StoreError> {
        let key = score_key(&record.fingerprint);
        let value = match serde_json::to_vec(record) {
            Ok(value) => value,
            Err(err) => {
                self.logger
                    .error(&format!("failed to encode score record: {}", err));
                return Ok(());
            }
        };

        let (_, cas) = self.data.get(&key)?;
        set_with_retry(&self.data, &key, &value, cas)
    }

    fn incr_score(
        &self,
        fingerprint: &str,
        rule_id: &str,
        severity: &str,
        increment: i64,
    ) -> Result<i64, StoreError> {
        let mut record = self
            .get_score(fingerprint)
            .unwrap_or_else(|| ScoreRecord::new(fingerprint));

        record.decay(self.decay_seconds);
        record.add_hit(rule_id, severity, increment);

        self.set_score(&record)?;
        Ok(record.score)
    }
}

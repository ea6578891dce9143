// src/store/mod.rs
// Storage seams: the proxy shared-data substrate, the process-local ban
// and score stores built on it, and the remote webdis adapter.

pub mod local;
pub mod remote;

use proxy_wasm::hostcalls;
use proxy_wasm::types::Status;

use crate::types::{BanRecord, ScoreRecord};

#[derive(Debug)]
pub enum StoreError {
    /// The CAS token was stale; the caller may retry with a fresh one.
    CasMismatch,
    /// Any other host-side failure.
    Host(Status),
}

/// The proxy's shared-data primitive: versioned get/set, no delete.
/// Writing empty bytes under the current token is the deletion idiom.
pub trait SharedData {
    fn get(&self, key: &str) -> Result<(Option<Vec<u8>>, Option<u32>), StoreError>;
    fn set(&self, key: &str, value: &[u8], cas: Option<u32>) -> Result<(), StoreError>;
}

impl<D: SharedData + ?Sized> SharedData for &D {
    fn get(&self, key: &str) -> Result<(Option<Vec<u8>>, Option<u32>), StoreError> {
        (**self).get(key)
    }
    fn set(&self, key: &str, value: &[u8], cas: Option<u32>) -> Result<(), StoreError> {
        (**self).set(key, value, cas)
    }
}

/// Shared data backed by the proxy host. Shared across all worker
/// threads of the proxy process; a missing key reads as `(None, None)`.
pub struct HostSharedData;

impl SharedData for HostSharedData {
    fn get(&self, key: &str) -> Result<(Option<Vec<u8>>, Option<u32>), StoreError> {
        hostcalls::get_shared_data(key).map_err(StoreError::Host)
    }

    fn set(&self, key: &str, value: &[u8], cas: Option<u32>) -> Result<(), StoreError> {
        match hostcalls::set_shared_data(key, Some(value), cas) {
            Ok(()) => Ok(()),
            Err(Status::CasMismatch) => Err(StoreError::CasMismatch),
            Err(status) => Err(StoreError::Host(status)),
        }
    }
}

/// Ban persistence capability.
pub trait BanStore {
    fn check_ban(&self, fingerprint: &str) -> Option<BanRecord>;
    fn set_ban(&self, record: &BanRecord) -> Result<(), StoreError>;
    fn delete_ban(&self, fingerprint: &str);
}

/// Behavioral score persistence capability.
pub trait ScoreStore {
    fn get_score(&self, fingerprint: &str) -> Option<ScoreRecord>;
    fn set_score(&self, record: &ScoreRecord) -> Result<(), StoreError>;
    fn incr_score(
        &self,
        fingerprint: &str,
        rule_id: &str,
        severity: &str,
        increment: i64,
    ) -> Result<i64, StoreError>;
}

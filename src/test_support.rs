// src/test_support.rs
// In-memory doubles for the host-bound seams: shared data with CAS,
// request/response attributes, event sinks, and a capturing logger.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use crate::events::{BanEvent, EventSink};
use crate::fingerprint::RequestAttrs;
use crate::logger::{LogLevel, Logger};
use crate::store::{SharedData, StoreError};
use crate::waf::ResponseAttrs;

/// Shared data with host-like CAS semantics: versions start at 1 on
/// first write, `None` means unconditional.
#[derive(Default)]
pub(crate) struct InMemoryData {
    map: RefCell<HashMap<String, (Vec<u8>, u32)>>,
}

impl SharedData for InMemoryData {
    fn get(&self, key: &str) -> Result<(Option<Vec<u8>>, Option<u32>), StoreError> {
        let map = self.map.borrow();
        Ok(match map.get(key) {
            Some((value, version)) => (Some(value.clone()), Some(*version)),
            None => (None, None),
        })
    }

    fn set(&self, key: &str, value: &[u8], cas: Option<u32>) -> Result<(), StoreError> {
        let mut map = self.map.borrow_mut();
        let current = map.get(key).map(|(_, version)| *version).unwrap_or(0);
        if let Some(token) = cas {
            if token != current {
                return Err(StoreError::CasMismatch);
            }
        }
        map.insert(key.to_string(), (value.to_vec(), current + 1));
        Ok(())
    }
}

/// Wraps `InMemoryData` and fails the first N writes with a CAS
/// mismatch, for exercising the retry path.
pub(crate) struct ContentiousData {
    inner: InMemoryData,
    remaining_conflicts: Cell<u32>,
}

impl ContentiousData {
    pub(crate) fn conflicts(count: u32) -> Self {
        ContentiousData {
            inner: InMemoryData::default(),
            remaining_conflicts: Cell::new(count),
        }
    }
}

impl SharedData for ContentiousData {
    fn get(&self, key: &str) -> Result<(Option<Vec<u8>>, Option<u32>), StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8], cas: Option<u32>) -> Result<(), StoreError> {
        let remaining = self.remaining_conflicts.get();
        if remaining > 0 {
            self.remaining_conflicts.set(remaining - 1);
            return Err(StoreError::CasMismatch);
        }
        self.inner.set(key, value, cas)
    }
}

/// Records every event it sees.
#[derive(Default)]
pub(crate) struct RecordingSink {
    events: RefCell<Vec<BanEvent>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<BanEvent> {
        self.events.borrow().clone()
    }
}

impl EventSink for RecordingSink {
    fn on_event(&self, event: &BanEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

/// Captures log lines with their levels.
#[derive(Default)]
pub(crate) struct CapturingLogger {
    lines: RefCell<Vec<(LogLevel, String)>>,
}

impl CapturingLogger {
    pub(crate) fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.borrow().clone()
    }

    fn push(&self, level: LogLevel, msg: &str) {
        self.lines.borrow_mut().push((level, msg.to_string()));
    }
}

impl Logger for CapturingLogger {
    fn debug(&self, msg: &str) {
        self.push(LogLevel::Debug, msg);
    }
    fn info(&self, msg: &str) {
        self.push(LogLevel::Info, msg);
    }
    fn warn(&self, msg: &str) {
        self.push(LogLevel::Warn, msg);
    }
    fn error(&self, msg: &str) {
        self.push(LogLevel::Error, msg);
    }
}

/// Request/response attribute source backed by plain maps. Property
/// paths are keyed by joining segments with '.'.
#[derive(Default)]
pub(crate) struct MapAttrs {
    headers: HashMap<String, String>,
    response_headers: HashMap<String, String>,
    properties: HashMap<String, Vec<u8>>,
}

impl MapAttrs {
    pub(crate) fn new() -> Self {
        MapAttrs::default()
    }

    pub(crate) fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub(crate) fn with_response_header(mut self, name: &str, value: &str) -> Self {
        self.response_headers
            .insert(name.to_string(), value.to_string());
        self
    }

    pub(crate) fn with_property(mut self, path: &[&str], value: &[u8]) -> Self {
        self.properties.insert(path.join("."), value.to_vec());
        self
    }
}

impl RequestAttrs for MapAttrs {
    fn header(&self, name: &str) -> Option<String> {
        self.headers.get(name).cloned()
    }

    fn property(&self, path: &[&str]) -> Option<Vec<u8>> {
        self.properties.get(&path.join(".")).cloned()
    }
}

impl ResponseAttrs for MapAttrs {
    fn response_header(&self, name: &str) -> Option<String> {
        self.response_headers.get(name).cloned()
    }

    fn property(&self, path: &[&str]) -> Option<Vec<u8>> {
        self.properties.get(&path.join(".")).cloned()
    }
}

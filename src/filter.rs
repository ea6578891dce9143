// src/filter.rs
// Per-request controller. Drives the fingerprint, the local ban check,
// the asynchronous remote check (the only suspension point: the
// request-headers hook pauses until the reply resumes it), WAF decision
// extraction on the response path, and ban issuance.

use std::collections::HashMap;
use std::rc::Rc;

use proxy_wasm::hostcalls;
use proxy_wasm::traits::{Context, HttpContext};
use proxy_wasm::types::{Action, MapType};

use crate::config::PluginConfig;
use crate::engine::BanEngine;
use crate::events::{EventSink, LogEventSink, NoopEventSink};
use crate::fingerprint::{self, RequestAttrs};
use crate::logger::{HostLogger, Logger};
use crate::store::local::{LocalBanStore, LocalScoreStore};
use crate::store::remote::{self, PendingKind, RemoteBanLookup, RemoteCall, RemoteStore};
use crate::store::HostSharedData;
use crate::types::BanRecord;
use crate::waf::{self, ResponseAttrs};

pub struct BanFilter {
    config: Rc<PluginConfig>,
    logger: HostLogger,
    remote: RemoteStore,
    events: Box<dyn EventSink>,

    fingerprint: String,
    client_ip: String,
    generated_cookie: Option<String>,
    is_banned: bool,
    pending_remote: bool,
    pending_calls: HashMap<u32, PendingKind>,
}

impl BanFilter {
    pub fn new(context_id: u32, config: Rc<PluginConfig>) -> Self {
        let logger = HostLogger::new(config.level(), context_id);
        let events: Box<dyn EventSink> = if config.events_enabled {
            Box::new(LogEventSink::new(logger))
        } else {
            Box::new(NoopEventSink)
        };

        BanFilter {
            remote: RemoteStore::from_config(&config),
            config,
            logger,
            events,
            fingerprint: String::new(),
            client_ip: String::new(),
            generated_cookie: None,
            is_banned: false,
            pending_remote: false,
            pending_calls: HashMap::new(),
        }
    }

    fn engine(&self) -> BanEngine<'_, LocalBanStore<'_, HostSharedData>, LocalScoreStore<'_, HostSharedData>> {
        BanEngine::new(
            &self.config,
            &self.logger,
            LocalBanStore::new(HostSharedData, &self.logger),
            LocalScoreStore::new(HostSharedData, &self.logger, self.config.score_decay_seconds),
            self.events.as_ref(),
        )
    }

    /// Sends the configured deny response, or only logs it in dry-run
    /// mode. Always returns Continue: by the time this runs the local
    /// reply (if any) has been dispatched.
    fn deny_request(&self) -> Action {
        if self.config.dry_run {
            self.logger.info(&format!(
                "dry-run: would deny request for fingerprint {}",
                self.fingerprint
            ));
            return Action::Continue;
        }

        self.logger.info(&format!(
            "denying request for banned fingerprint {}",
            self.fingerprint
        ));

        if let Err(status) = hostcalls::send_http_response(
            self.config.ban_response_code,
            vec![
                ("content-type", "text/plain"),
                ("x-ban-reason", crate::PLUGIN_NAME),
            ],
            Some(self.config.ban_response_body.as_bytes()),
        ) {
            self.logger
                .error(&format!("failed to send deny response: {:?}", status));
        }

        Action::Continue
    }

    fn dispatch_remote(&mut self, call: RemoteCall) -> bool {
        let result = self.dispatch_http_call(
            self.remote.cluster(),
            vec![
                (":method", "GET"),
                (":path", &call.path),
                (":authority", self.remote.cluster()),
                ("accept", "application/json"),
            ],
            None,
            vec![],
            self.remote.timeout(),
        );

        match result {
            Ok(token) => {
                self.pending_calls.insert(token, call.kind);
                true
            }
            Err(status) => {
                self.logger.error(&format!(
                    "failed to dispatch remote call {}: {:?}",
                    call.path, status
                ));
                false
            }
        }
    }

    /// Kicks off the async remote ban check; on success the hook pauses
    /// the request until the reply arrives.
    fn dispatch_remote_check(&mut self) {
        let call = self.remote.ban_check(&self.fingerprint);
        if self.dispatch_remote(call) {
            self.pending_remote = true;
        }
    }

    /// Completion of the remote ban check. Syncing to the local store
    /// first means the enforced event carries source=local, which is
    /// what downstream event consumers expect.
    fn finish_remote_check(&mut self, record: Option<BanRecord>) {
        self.pending_remote = false;

        if let Some(record) = record {
            self.logger.info(&format!(
                "ban found in remote store for {}",
                self.fingerprint
            ));
            self.engine().sync_from_remote(&record);

            let outcome = self.engine().check(&self.fingerprint);
            if let Some(synced) = outcome.record {
                self.logger
                    .debug(&format!("enforcing synced ban (rule={})", synced.rule_id));
                self.is_banned = true;
                self.deny_request();
            }
        }

        if let Err(status) = hostcalls::resume_http_request() {
            self.logger
                .error(&format!("failed to resume request: {:?}", status));
        }
    }

    fn http_call_status(&self) -> u32 {
        self.get_http_call_response_headers()
            .into_iter()
            .find(|(name, _)| name == ":status")
            .and_then(|(_, value)| value.trim().parse().ok())
            .unwrap_or(0)
    }

    fn inject_cookie(&self) {
        if let Some(value) = &self.generated_cookie {
            let cookie = format!(
                "{}={}; Path=/; HttpOnly; SameSite=Strict",
                self.config.cookie_name, value
            );
            if let Err(status) =
                hostcalls::add_map_value(MapType::HttpResponseHeaders, "Set-Cookie", &cookie)
            {
                self.logger
                    .error(&format!("failed to inject cookie: {:?}", status));
            }
        }
    }
}

impl RequestAttrs for BanFilter {
    fn header(&self, name: &str) -> Option<String> {
        self.get_http_request_header(name)
    }

    fn property(&self, path: &[&str]) -> Option<Vec<u8>> {
        self.get_property(path.to_vec())
    }
}

impl ResponseAttrs for BanFilter {
    fn response_header(&self, name: &str) -> Option<String> {
        self.get_http_response_header(name)
    }

    fn property(&self, path: &[&str]) -> Option<Vec<u8>> {
        self.get_property(path.to_vec())
    }
}

impl HttpContext for BanFilter {
    fn on_http_request_headers(&mut self, _num_headers: usize, _end_of_stream: bool) -> Action {
        self.logger.debug("processing request headers");

        let config = Rc::clone(&self.config);
        let derived = fingerprint::derive(self, config.as_ref());
        self.fingerprint = derived.fingerprint;
        self.client_ip = derived.client_ip;
        self.generated_cookie = derived.generated_cookie;
        self.logger.debug(&format!(
            "fingerprint calculated: {} (mode={}, ip={}, ua={}, ja3={}, cookie={})",
            self.fingerprint,
            config.fingerprint_mode,
            self.client_ip,
            derived.user_agent,
            derived.ja3,
            derived.cookie_value
        ));

        let outcome = self.engine().check(&self.fingerprint);
        if outcome.banned {
            self.is_banned = true;
            return self.deny_request();
        }

        if self.remote.is_configured() && !self.fingerprint.is_empty() {
            self.dispatch_remote_check();
        }
        if self.pending_remote {
            return Action::Pause;
        }

        Action::Continue
    }

    fn on_http_response_headers(&mut self, _num_headers: usize, _end_of_stream: bool) -> Action {
        if self.is_banned {
            // The request was already answered with the deny response.
            return Action::Continue;
        }

        self.logger.debug("processing response headers");

        let mut decision = waf::extract(self, &self.logger);
        if decision.is_none() && waf::response_status(self) == 403 {
            self.logger
                .debug("403 response without WAF metadata, treating as block");
            decision = Some(waf::fallback_403());
        }

        if let Some(decision) = decision {
            if decision.is_blocking() {
                self.logger.info(&format!(
                    "WAF block detected: rule={}, severity={}, action={}",
                    decision.rule_id, decision.severity, decision.action
                ));

                let outcome = self.engine().issue(&self.fingerprint, &decision);

                if self.remote.is_configured() {
                    if outcome.issued {
                        if let Some(record) = &outcome.record {
                            if let Some(call) = self.remote.ban_set(record) {
                                self.dispatch_remote(call);
                            }
                        }
                    }
                    if let (Some(increment), Some(score)) =
                        (outcome.score_increment, outcome.score)
                    {
                        self.logger.debug(&format!(
                            "mirroring score increment {} to remote store (local total {})",
                            increment, score
                        ));
                        let call = self.remote.score_incr(
                            &self.fingerprint,
                            increment,
                            self.config.score_ttl,
                        );
                        self.dispatch_remote(call);
                    }
                }
            }
        }

        if self.config.inject_cookie {
            self.inject_cookie();
        }

        Action::Continue
    }

    fn on_log(&mut self) {
        self.logger.debug("request completed");
    }
}

impl Context for BanFilter {
    fn on_http_call_response(
        &mut self,
        token_id: u32,
        _num_headers: usize,
        body_size: usize,
        _num_trailers: usize,
    ) {
        let kind = match self.pending_calls.remove(&token_id) {
            Some(kind) => kind,
            None => {
                self.logger
                    .debug(&format!("reply for unknown call token {}", token_id));
                return;
            }
        };

        let status = self.http_call_status();
        let body = self.get_http_call_response_body(0, body_size);

        match kind {
            PendingKind::BanCheck => {
                match remote::parse_ban_lookup(&self.logger, status, body.as_deref()) {
                    RemoteBanLookup::Active(record) => self.finish_remote_check(Some(record)),
                    RemoteBanLookup::Expired => {
                        let call = self.remote.ban_delete(&self.fingerprint);
                        self.dispatch_remote(call);
                        self.finish_remote_check(None);
                    }
                    RemoteBanLookup::Absent => self.finish_remote_check(None),
                }
            }
            PendingKind::BanSet => {
                if status == 200 {
                    self.logger.debug(&format!(
                        "ban stored in remote store for {}",
                        self.fingerprint
                    ));
                } else {
                    self.logger.error(&format!(
                        "failed to store ban in remote store for {} (status {})",
                        self.fingerprint, status
                    ));
                }
            }
            PendingKind::BanDelete => {
                self.logger.debug("expired ban deleted from remote store");
            }
            PendingKind::ScoreIncr { fingerprint, ttl } => {
                match remote::parse_incr(&self.logger, status, body.as_deref()) {
                    Some(new_score) => {
                        self.logger.debug(&format!(
                            "remote score synced for {}: {}",
                            fingerprint, new_score
                        ));
                        let call = self.remote.score_expire(&fingerprint, ttl);
                        self.dispatch_remote(call);
                    }
                    None => self
                        .logger
                        .warn(&format!("remote score sync failed for {}", fingerprint)),
                }
            }
            PendingKind::ScoreExpire => {
                self.logger.debug("remote score TTL applied");
            }
            PendingKind::ScoreGet => {
                if let Some(score) = remote::parse_score(&self.logger, status, body.as_deref()) {
                    self.logger.debug(&format!("remote score read: {}", score));
                }
            }
        }
    }
}

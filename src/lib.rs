// src/lib.rs
// banshee: adaptive banning filter for Envoy (proxy-wasm).
// Runs behind a WAF filter in the HTTP chain, fingerprints clients,
// and bans fingerprints the WAF keeps flagging. Ban state lives in the
// proxy's shared data and, when configured, a Redis HTTP gateway shared
// by the whole fleet.

use std::rc::Rc;

use proxy_wasm::hostcalls;
use proxy_wasm::traits::{Context, HttpContext, RootContext};
use proxy_wasm::types::{ContextType, LogLevel};

mod config; // plugin configuration with startup validation
mod engine; // ban check/issue orchestration
mod events; // ban lifecycle events
mod filter; // per-request HTTP filter state machine
mod fingerprint; // composite client identity
mod logger; // leveled logging over the proxy log hostcall
mod store; // local shared-data stores and the remote webdis adapter
mod types; // ban/score records and WAF decisions
mod waf; // WAF decision extraction

#[cfg(test)]
mod test_support;

pub(crate) const PLUGIN_NAME: &str = "banshee";

use crate::config::{FingerprintMode, PluginConfig};
use crate::filter::BanFilter;
use crate::logger::{HostLogger, Logger};

proxy_wasm::main! {{
    proxy_wasm::set_log_level(LogLevel::Info);
    proxy_wasm::set_root_context(|_| -> Box<dyn RootContext> {
        Box::new(BansheeRoot::default())
    });
}}

#[derive(Default)]
struct BansheeRoot {
    config: Option<Rc<PluginConfig>>,
}

impl Context for BansheeRoot {}

impl RootContext for BansheeRoot {
    fn on_configure(&mut self, _plugin_configuration_size: usize) -> bool {
        let data = self.get_plugin_configuration();
        let boot_logger = HostLogger::new(logger::LogLevel::Info, 0);

        let config = match config::parse(data.as_deref(), &boot_logger) {
            Ok(config) => config,
            Err(err) => {
                let _ = hostcalls::log(
                    LogLevel::Critical,
                    &format!("{}: {}", PLUGIN_NAME, err),
                );
                return false;
            }
        };

        let logger = HostLogger::new(config.level(), 0);
        logger.info(&format!(
            "plugin started: redis_cluster={}, ban_ttl={}, scoring={}, fingerprint_mode={}, dry_run={}",
            if config.redis_cluster.is_empty() { "<disabled>" } else { &config.redis_cluster },
            config.ban_ttl_default,
            config.scoring_enabled,
            config.fingerprint_mode,
            config.dry_run,
        ));

        if config.fingerprint_mode() == FingerprintMode::IpOnly {
            // The raw address is hashed in this mode, so bans do not
            // aggregate across an IP prefix the way full/partial do.
            logger.warn("fingerprint_mode=ip-only bans exact client addresses only");
        }

        self.config = Some(Rc::new(config));
        true
    }

    fn create_http_context(&self, context_id: u32) -> Option<Box<dyn HttpContext>> {
        let config = self.config.as_ref()?;
        Some(Box::new(BanFilter::new(context_id, Rc::clone(config))))
    }

    fn get_type(&self) -> Option<ContextType> {
        Some(ContextType::HttpContext)
    }
}

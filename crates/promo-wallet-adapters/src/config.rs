use std::time::Duration;

use alloy::primitives::Address;
use promo_wallet_core::{ActorConfig, EngineConfig, PortError, SurfaceConfig};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuntimeProfile {
    #[default]
    Development,
    Production,
}

impl RuntimeProfile {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Some(Self::Development),
            "prod" | "production" => Some(Self::Production),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub runtime_profile: RuntimeProfile,
    pub rpc_url: Option<String>,
    pub signer_proxy_url: Option<String>,
    pub chain_id: u64,
    pub vault_address: Address,
    pub request_timeout_ms: u64,
    pub approval_timeout_ms: u64,
    pub verify_poll_interval_ms: u64,
    pub verify_max_attempts: u32,
    pub verify_block_lookback: u64,
    pub allowance_poll_interval_ms: u64,
    pub allowance_poll_max_attempts: u32,
    pub receipt_poll_interval_ms: u64,
    pub surface_width: u32,
    pub surface_height: u32,
    pub surface_margin: u32,
    pub surface_top_offset: u32,
    pub event_buffer: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            runtime_profile: RuntimeProfile::Development,
            rpc_url: None,
            signer_proxy_url: None,
            chain_id: 8453,
            vault_address: Address::ZERO,
            request_timeout_ms: 15_000,
            approval_timeout_ms: 120_000,
            verify_poll_interval_ms: 2_000,
            verify_max_attempts: 90,
            verify_block_lookback: 500,
            allowance_poll_interval_ms: 2_000,
            allowance_poll_max_attempts: 30,
            receipt_poll_interval_ms: 1_000,
            surface_width: 380,
            surface_height: 640,
            surface_margin: 20,
            surface_top_offset: 80,
            event_buffer: 256,
        }
    }
}

impl WalletConfig {
    /// Defaults overridden by `PROMO_WALLET_*` variables. Unparseable values keep the
    /// default and are logged.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(raw) = get("PROMO_WALLET_PROFILE") {
            match RuntimeProfile::parse(&raw) {
                Some(p) => cfg.runtime_profile = p,
                None => warn!(value = %raw, "unknown PROMO_WALLET_PROFILE, using development"),
            }
        }
        cfg.rpc_url = get("PROMO_WALLET_RPC_URL");
        cfg.signer_proxy_url = get("PROMO_WALLET_SIGNER_URL");
        if let Some(raw) = get("PROMO_WALLET_VAULT") {
            match raw.trim().parse() {
                Ok(addr) => cfg.vault_address = addr,
                Err(e) => warn!(value = %raw, error = %e, "invalid PROMO_WALLET_VAULT"),
            }
        }

        parse_into(&get, "PROMO_WALLET_CHAIN_ID", &mut cfg.chain_id);
        parse_into(&get, "PROMO_WALLET_REQUEST_TIMEOUT_MS", &mut cfg.request_timeout_ms);
        parse_into(&get, "PROMO_WALLET_APPROVAL_TIMEOUT_MS", &mut cfg.approval_timeout_ms);
        parse_into(&get, "PROMO_WALLET_VERIFY_POLL_MS", &mut cfg.verify_poll_interval_ms);
        parse_into(&get, "PROMO_WALLET_VERIFY_MAX_ATTEMPTS", &mut cfg.verify_max_attempts);
        parse_into(&get, "PROMO_WALLET_VERIFY_LOOKBACK", &mut cfg.verify_block_lookback);
        parse_into(&get, "PROMO_WALLET_ALLOWANCE_POLL_MS", &mut cfg.allowance_poll_interval_ms);
        parse_into(
            &get,
            "PROMO_WALLET_ALLOWANCE_MAX_ATTEMPTS",
            &mut cfg.allowance_poll_max_attempts,
        );
        parse_into(&get, "PROMO_WALLET_RECEIPT_POLL_MS", &mut cfg.receipt_poll_interval_ms);
        parse_into(&get, "PROMO_WALLET_EVENT_BUFFER", &mut cfg.event_buffer);
        cfg
    }

    pub fn strict_runtime_required(&self) -> bool {
        self.runtime_profile == RuntimeProfile::Production
    }

    /// Production needs real endpoints; development falls back to the dev chain.
    pub fn validate(&self) -> Result<(), PortError> {
        if !self.strict_runtime_required() {
            return Ok(());
        }
        if self.rpc_url.is_none() {
            return Err(PortError::Policy(
                "rpc url not configured in production runtime profile".to_owned(),
            ));
        }
        if self.signer_proxy_url.is_none() {
            return Err(PortError::Policy(
                "signer proxy url not configured in production runtime profile".to_owned(),
            ));
        }
        if self.vault_address == Address::ZERO {
            return Err(PortError::Policy(
                "vault address not configured in production runtime profile".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            verify_poll_interval: Duration::from_millis(self.verify_poll_interval_ms),
            verify_max_attempts: self.verify_max_attempts,
            verify_block_lookback: self.verify_block_lookback,
            allowance_poll_interval: Duration::from_millis(self.allowance_poll_interval_ms),
            allowance_poll_max_attempts: self.allowance_poll_max_attempts,
        }
    }

    pub fn surface_config(&self) -> SurfaceConfig {
        SurfaceConfig {
            width: self.surface_width,
            height: self.surface_height,
            margin: self.surface_margin,
            top_offset: self.surface_top_offset,
        }
    }

    pub fn actor_config(&self) -> ActorConfig {
        ActorConfig {
            contract: self.vault_address,
            surface: self.surface_config(),
            event_buffer: self.event_buffer,
            grant_ttl: self.approval_timeout(),
            ..ActorConfig::default()
        }
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_millis(self.approval_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

fn parse_into<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T)
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = get(key) {
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(e) => warn!(key, value = %raw, error = %e, "ignoring invalid config value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_to_development_without_env() {
        let cfg = WalletConfig::from_lookup(|_| None);
        assert_eq!(cfg.runtime_profile, RuntimeProfile::Development);
        assert!(!cfg.strict_runtime_required());
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.approval_timeout(), Duration::from_secs(120));
        assert_eq!(cfg.engine_config(), EngineConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let cfg = WalletConfig::from_lookup(lookup(&[
            ("PROMO_WALLET_PROFILE", "Production"),
            ("PROMO_WALLET_RPC_URL", "http://127.0.0.1:8545"),
            ("PROMO_WALLET_SIGNER_URL", "http://127.0.0.1:9545"),
            ("PROMO_WALLET_VAULT", "0x000000000000000000000000000000000000BEEF"),
            ("PROMO_WALLET_VERIFY_POLL_MS", "500"),
            ("PROMO_WALLET_VERIFY_MAX_ATTEMPTS", "12"),
            ("PROMO_WALLET_EVENT_BUFFER", "32"),
            ("PROMO_WALLET_APPROVAL_TIMEOUT_MS", "30000"),
        ]));
        assert!(cfg.strict_runtime_required());
        assert!(cfg.validate().is_ok());

        let engine = cfg.engine_config();
        assert_eq!(engine.verify_poll_interval, Duration::from_millis(500));
        assert_eq!(engine.verify_max_attempts, 12);

        let actor = cfg.actor_config();
        assert_eq!(actor.contract, cfg.vault_address);
        assert_eq!(actor.event_buffer, 32);
        assert_eq!(actor.grant_ttl, Duration::from_secs(30));
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let cfg = WalletConfig::from_lookup(lookup(&[
            ("PROMO_WALLET_PROFILE", "staging"),
            ("PROMO_WALLET_CHAIN_ID", "base"),
            ("PROMO_WALLET_VAULT", "not-an-address"),
            ("PROMO_WALLET_RPC_URL", "   "),
        ]));
        assert_eq!(cfg.runtime_profile, RuntimeProfile::Development);
        assert_eq!(cfg.chain_id, 8453);
        assert_eq!(cfg.vault_address, Address::ZERO);
        assert_eq!(cfg.rpc_url, None);
    }

    #[test]
    fn production_requires_endpoints() {
        let cfg = WalletConfig::from_lookup(lookup(&[("PROMO_WALLET_PROFILE", "prod")]));
        assert!(matches!(cfg.validate(), Err(PortError::Policy(msg)) if msg.contains("rpc url")));

        let cfg = WalletConfig::from_lookup(lookup(&[
            ("PROMO_WALLET_PROFILE", "prod"),
            ("PROMO_WALLET_RPC_URL", "http://127.0.0.1:8545"),
            ("PROMO_WALLET_SIGNER_URL", "http://127.0.0.1:9545"),
        ]));
        assert!(matches!(cfg.validate(), Err(PortError::Policy(msg)) if msg.contains("vault")));
    }
}

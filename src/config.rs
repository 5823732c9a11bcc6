use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult};

pub const DEFAULT_POOL_WALLET: &str = "5DSFYPkB2b6auEwZxqbkAWa213EbBfDtRuaRrnivA3RvoMyg";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub bind_address: String,
    /// JSON file holding the local user id -> external account id mapping
    pub registry_path: PathBuf,
    /// Base URL of the account authentication service (wallet resolution)
    pub auth_api_url: String,
    /// Base URL of the ledger REST API (balances, transfers)
    pub ledger_api_url: String,
    pub ledger_network: String,
    /// API key sent as `x-dw-api-key` to the authentication service
    pub dw_token: String,
    /// Bearer token for the ledger API
    pub bear_token: String,
    /// Wallet that funds every distribution
    pub pool_wallet: String,
    /// Shared secret expected in `x-admin-token` on admin routes
    pub admin_token: String,
    pub cooldown_secs: u64,
    pub submission_timeout_secs: u64,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::load(config::Environment::default().try_parsing(true))
    }

    fn load<S>(source: S) -> AppResult<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config: Self = config::Config::builder()
            .set_default("bind_address", "0.0.0.0:8080")?
            .set_default("registry_path", "epic_ids.json")?
            .set_default("auth_api_url", "https://api.staging.deverse.world/api")?
            .set_default(
                "ledger_api_url",
                "https://api.helpers.testnet.thxnet.org/rest/v0.5",
            )?
            .set_default("ledger_network", "testnet_leafchain_aether")?
            .set_default("pool_wallet", DEFAULT_POOL_WALLET)?
            .set_default("cooldown_secs", 10)?
            .set_default("submission_timeout_secs", 60)?
            .set_default("http_timeout_secs", 30)?
            .add_source(source)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Secrets must be present and non-blank
    fn validate(&self) -> AppResult<()> {
        let secrets = [
            ("DW_TOKEN", &self.dw_token),
            ("BEAR_TOKEN", &self.bear_token),
            ("ADMIN_TOKEN", &self.admin_token),
        ];
        for (name, value) in secrets {
            if value.trim().is_empty() {
                return Err(AppError::Config(format!("{} must not be empty", name)));
            }
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn submission_timeout(&self) -> Duration {
        Duration::from_secs(self.submission_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
impl Config {
    pub fn for_test(registry_path: PathBuf) -> Self {
        Self {
            bind_address: "127.0.0.1:0".to_string(),
            registry_path,
            auth_api_url: "http://127.0.0.1:1/api".to_string(),
            ledger_api_url: "http://127.0.0.1:1/rest/v0.5".to_string(),
            ledger_network: "testnet_leafchain_aether".to_string(),
            dw_token: "dw-test".to_string(),
            bear_token: "bear-test".to_string(),
            pool_wallet: DEFAULT_POOL_WALLET.to_string(),
            admin_token: "admin-test".to_string(),
            cooldown_secs: 10,
            submission_timeout_secs: 60,
            http_timeout_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Environment, Map};

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::default().try_parsing(true).source(Some(map))
    }

    const SECRETS: [(&str, &str); 3] = [
        ("DW_TOKEN", "dw"),
        ("BEAR_TOKEN", "bear"),
        ("ADMIN_TOKEN", "admin"),
    ];

    #[test]
    fn test_load_applies_defaults() {
        let config = Config::load(env(&SECRETS)).unwrap();

        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.pool_wallet, DEFAULT_POOL_WALLET);
        assert_eq!(config.admin_token, "admin");
        assert_eq!(config.cooldown(), Duration::from_secs(10));
        assert_eq!(config.submission_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_missing_admin_token_rejected() {
        let result = Config::load(env(&SECRETS[..2]));
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_blank_secrets_rejected() {
        for blank in ["", "   "] {
            for i in 0..SECRETS.len() {
                let mut vars = SECRETS.to_vec();
                vars[i].1 = blank;

                match Config::load(env(&vars)) {
                    Err(AppError::Config(message)) => assert!(message.contains(SECRETS[i].0)),
                    other => panic!("expected config error, got {:?}", other.map(|_| ())),
                }
            }
        }
    }
}

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tracing::{debug, info};

use crate::{
    api::handler::AppState,
    config::Config,
    distribution::Distributor,
    error::AppResult,
    identity::{CooldownTracker, IdentityRegistry, JsonFileStore, SessionManager},
    ledger::{models::WalletHandle, LedgerApi, LedgerClient, LedgerConfig},
};

/// How often timed-out submissions and stale cooldowns are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(15);

pub async fn initialize_app_state(config: &Config) -> AppResult<AppState> {
    info!("Initializing application components ...");

    let store = Arc::new(JsonFileStore::new(config.registry_path.clone()));
    let registry = Arc::new(IdentityRegistry::load(store)?);
    info!(
        "✅ Identity registry loaded from {} ({} entries)",
        config.registry_path.display(),
        registry.len().await
    );

    let ledger: Arc<dyn LedgerApi> = Arc::new(LedgerClient::new(LedgerConfig::from(config))?);
    info!(
        "✅ Ledger client initialized for network: {}",
        config.ledger_network
    );

    let pool_wallet = WalletHandle::new(config.pool_wallet.clone());
    info!("🏦 Pool wallet: {}", pool_wallet);
    let distributor = Arc::new(Distributor::new(ledger.clone(), pool_wallet));

    let sessions = Arc::new(SessionManager::new(config.submission_timeout()));
    let cooldowns = Arc::new(CooldownTracker::new(config.cooldown()));

    let state = AppState {
        registry,
        ledger,
        distributor,
        sessions: sessions.clone(),
        cooldowns: cooldowns.clone(),
        admin_token: Arc::from(config.admin_token.as_str()),
    };

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let now = Utc::now();

            let expired = sessions.sweep(now);
            if expired > 0 {
                debug!("⌛ Timed out {} idle submissions", expired);
            }
            cooldowns.purge(now);
        }
    });
    info!("✅ Session sweeper started (every {:?})", SWEEP_INTERVAL);

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_with_missing_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_test(dir.path().join("epic_ids.json"));

        let state = initialize_app_state(&config).await.unwrap();
        assert_eq!(state.registry.len().await, 0);
        assert_eq!(&*state.admin_token, "admin-test");
        assert_eq!(
            state.distributor.pool_wallet().as_str(),
            crate::config::DEFAULT_POOL_WALLET
        );
    }

    #[tokio::test]
    async fn test_initialize_rejects_corrupt_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("epic_ids.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = initialize_app_state(&Config::for_test(path)).await;
        assert!(result.is_err());
    }
}

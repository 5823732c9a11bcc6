use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::error::LedgerError;
use crate::ledger::models::{
    AuthenticateResponse, FtsResponse, PoolBalance, ResourceKind, TransferRequest, WalletHandle,
};

/// Remote wallet/ledger operations used by the distributor.
///
/// Every call is a single attempt. Retrying a transfer is never safe
/// because the remote service does not guarantee idempotence.
#[async_trait]
pub trait LedgerApi: Send + Sync {
    /// Resolve the custodial wallet linked to an external account id
    async fn resolve_wallet(&self, external_account_id: &str) -> Result<WalletHandle, LedgerError>;

    /// Fungible balances of a wallet
    async fn fetch_balance(&self, wallet: &WalletHandle) -> Result<PoolBalance, LedgerError>;

    /// Non-native fungible token transfer from the pool to `wallet`
    async fn transfer(
        &self,
        wallet: &WalletHandle,
        amount: Decimal,
        kind: ResourceKind,
    ) -> Result<(), LedgerError>;
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub auth_api_url: String,
    pub ledger_api_url: String,
    pub network: String,
    pub api_key: String,
    pub bearer_token: String,
    pub timeout: Duration,
}

impl From<&Config> for LedgerConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth_api_url: config.auth_api_url.trim_end_matches('/').to_string(),
            ledger_api_url: config.ledger_api_url.trim_end_matches('/').to_string(),
            network: config.ledger_network.clone(),
            api_key: config.dw_token.clone(),
            bearer_token: config.bear_token.clone(),
            timeout: config.http_timeout(),
        }
    }
}

/// reqwest-backed client for the authentication and ledger REST APIs
pub struct LedgerClient {
    client: Client,
    config: LedgerConfig,
}

impl LedgerClient {
    pub fn new(config: LedgerConfig) -> Result<Self, LedgerError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn authenticate_url(&self, external_account_id: &str) -> Result<Url, LedgerError> {
        endpoint(&self.config.auth_api_url, &["authenticate", external_account_id])
    }

    fn balance_url(&self, wallet: &WalletHandle) -> Result<Url, LedgerError> {
        endpoint(
            &self.config.ledger_api_url,
            &["id_wallet", wallet.as_str(), &self.config.network, "fts"],
        )
    }

    fn transfer_url(&self) -> Result<Url, LedgerError> {
        endpoint(
            &self.config.ledger_api_url,
            &["me", &self.config.network, "ft", "transfer"],
        )
    }

    /// Turns a non-success response into `LedgerError::Remote`, keeping the body
    async fn remote_error(response: Response) -> LedgerError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        warn!("Ledger API responded with {}: {}", status, body);
        LedgerError::Remote { status, body }
    }
}

/// Appends `segments` to `base`, percent-encoding each one so remote
/// values can never add path components or a query string
fn endpoint(base: &str, segments: &[&str]) -> Result<Url, LedgerError> {
    let mut url = Url::parse(base)
        .map_err(|e| LedgerError::Transport(format!("Invalid base URL {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| LedgerError::Transport(format!("Base URL {} cannot take a path", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait]
impl LedgerApi for LedgerClient {
    #[instrument(skip(self))]
    async fn resolve_wallet(&self, external_account_id: &str) -> Result<WalletHandle, LedgerError> {
        let response = self
            .client
            .get(self.authenticate_url(external_account_id)?)
            .header("x-dw-api-key", &self.config.api_key)
            .send()
            .await?;

        if !matches!(response.status(), StatusCode::OK | StatusCode::CREATED) {
            return Err(Self::remote_error(response).await);
        }

        let body: AuthenticateResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        let wallet = body
            .id_wallet()
            .map(WalletHandle::new)
            .ok_or(LedgerError::WalletNotFound)?;

        debug!("Resolved wallet {} for {}", wallet, external_account_id);
        Ok(wallet)
    }

    #[instrument(skip(self), fields(wallet = %wallet))]
    async fn fetch_balance(&self, wallet: &WalletHandle) -> Result<PoolBalance, LedgerError> {
        let response = self
            .client
            .get(self.balance_url(wallet)?)
            .bearer_auth(&self.config.bearer_token)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::remote_error(response).await);
        }

        let body: FtsResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Decode(e.to_string()))?;

        let balance = PoolBalance::from_entries(&body.result.non_native_ft_balances);
        debug!("Wallet {} balance: {}", wallet, balance);
        Ok(balance)
    }

    #[instrument(skip(self), fields(wallet = %wallet, asset_id = kind.asset_id()))]
    async fn transfer(
        &self,
        wallet: &WalletHandle,
        amount: Decimal,
        kind: ResourceKind,
    ) -> Result<(), LedgerError> {
        let payload = TransferRequest {
            receiver_id_wallet_address: wallet.as_str(),
            transfer_value_human: amount,
            native: false,
            asset_id: kind.asset_id(),
        };

        let response = self
            .client
            .post(self.transfer_url()?)
            .bearer_auth(&self.config.bearer_token)
            .json(&payload)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::remote_error(response).await);
        }

        info!("✓ Transferred {} {} to {}", amount, kind, wallet);
        Ok(())
    }
}

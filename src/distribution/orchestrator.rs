use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::distribution::batch::{Batch, BatchEntry, BatchRow};
use crate::distribution::outcome::{DistributionOutcome, DistributionReport};
use crate::error::DistributionError;
use crate::identity::registry::{RegisteredUser, RegistrySnapshot};
use crate::ledger::client::LedgerApi;
use crate::ledger::models::{PoolBalance, ResourceKind, WalletHandle};

/// Runs batch distributions out of the pool wallet.
///
/// A run is a single sequential pass: one ledger call in flight at a
/// time, no cross-row atomicity and no rollback of partially fulfilled
/// rows. The pool balance is read once and then tracked in memory so a
/// run never commits more than the pool held when it started.
pub struct Distributor {
    ledger: Arc<dyn LedgerApi>,
    pool_wallet: WalletHandle,
}

impl Distributor {
    pub fn new(ledger: Arc<dyn LedgerApi>, pool_wallet: WalletHandle) -> Self {
        Self { ledger, pool_wallet }
    }

    pub fn pool_wallet(&self) -> &WalletHandle {
        &self.pool_wallet
    }

    /// Current pool balance straight from the ledger
    pub async fn pool_balance(&self) -> Result<PoolBalance, DistributionError> {
        self.ledger
            .fetch_balance(&self.pool_wallet)
            .await
            .map_err(DistributionError::PoolBalance)
    }

    pub async fn run(
        &self,
        batch: &Batch,
        registry: &RegistrySnapshot,
    ) -> Result<DistributionReport, DistributionError> {
        self.execute(Uuid::new_v4(), batch, registry).await
    }

    #[instrument(skip(self, batch, registry), fields(entries = batch.len(), identities = registry.len()))]
    async fn execute(
        &self,
        run_id: Uuid,
        batch: &Batch,
        registry: &RegistrySnapshot,
    ) -> Result<DistributionReport, DistributionError> {
        let started_at = Utc::now();

        if registry.is_empty() {
            return Err(DistributionError::EmptyRegistry);
        }

        let pool_before = self.pool_balance().await?;
        if !pool_before.is_funded() {
            warn!("Pool wallet underfunded: {}", pool_before);
            return Err(DistributionError::InsufficientPoolBalance(pool_before));
        }
        info!("🏦 Pool balance at start: {}", pool_before);

        let index = registry.reverse_index();
        let mut pool = pool_before;
        let mut outcomes = Vec::with_capacity(batch.len());

        for entry in batch.entries() {
            match entry {
                BatchEntry::Fault(fault) => outcomes.push(DistributionOutcome::InvalidRow {
                    line: fault.line,
                    external_account_id: fault.external_account_id.clone(),
                    reason: fault.reason.clone(),
                }),
                BatchEntry::Row(row) => {
                    let user = index.get(&row.external_account_id);
                    self.distribute_row(row, user, &mut pool, &mut outcomes).await;
                }
            }
        }

        let report = DistributionReport {
            run_id,
            started_at,
            pool_before,
            pool_after: pool,
            outcomes,
        };
        let summary = report.summary();
        info!(
            "✓ Distribution finished: {} transferred, {} failed, {} skipped",
            summary.transferred, summary.failed, summary.skipped
        );
        Ok(report)
    }

    async fn distribute_row(
        &self,
        row: &BatchRow,
        user: Option<&RegisteredUser>,
        pool: &mut PoolBalance,
        outcomes: &mut Vec<DistributionOutcome>,
    ) {
        let external_account_id = row.external_account_id.clone();

        // Whole row is checked before any of its transfers
        let affordable = ResourceKind::ALL
            .iter()
            .all(|kind| pool.covers(*kind, row.amount(*kind)));
        if !affordable {
            debug!("Line {}: pool cannot cover {}", row.line, external_account_id);
            outcomes.push(DistributionOutcome::InsufficientBalance { external_account_id });
            return;
        }

        let Some(user) = user else {
            outcomes.push(DistributionOutcome::IdentityNotFound { external_account_id });
            return;
        };

        let wallet = match self.ledger.resolve_wallet(&user.external_account_id).await {
            Ok(wallet) => wallet,
            Err(e) => {
                warn!("Wallet resolution failed for {}: {}", external_account_id, e);
                outcomes.push(DistributionOutcome::WalletResolutionFailed {
                    external_account_id,
                    error: e.to_string(),
                });
                return;
            }
        };

        for kind in ResourceKind::ALL {
            let amount = row.amount(kind);
            if amount <= Decimal::ZERO {
                continue;
            }

            match self.ledger.transfer(&wallet, amount, kind).await {
                Ok(()) => {
                    pool.debit(kind, amount);
                    outcomes.push(DistributionOutcome::Transferred {
                        external_account_id: external_account_id.clone(),
                        local_user_id: user.local_user_id.clone(),
                        resource: kind,
                        amount,
                    });
                }
                Err(e) => {
                    warn!(
                        "Transfer of {} {} to {} failed: {}",
                        amount, kind, external_account_id, e
                    );
                    outcomes.push(DistributionOutcome::TransferFailed {
                        external_account_id: external_account_id.clone(),
                        resource: kind,
                        amount,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

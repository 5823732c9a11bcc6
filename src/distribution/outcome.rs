use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use crate::ledger::models::{PoolBalance, ResourceKind};

/// Result of one (row, resource) attempt, or of a whole row when it was
/// skipped before any transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DistributionOutcome {
    Transferred {
        external_account_id: String,
        local_user_id: String,
        resource: ResourceKind,
        amount: Decimal,
    },
    InsufficientBalance {
        external_account_id: String,
    },
    IdentityNotFound {
        external_account_id: String,
    },
    WalletResolutionFailed {
        external_account_id: String,
        error: String,
    },
    TransferFailed {
        external_account_id: String,
        resource: ResourceKind,
        amount: Decimal,
        error: String,
    },
    InvalidRow {
        line: u64,
        external_account_id: String,
        reason: String,
    },
}

impl DistributionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, DistributionOutcome::Transferred { .. })
    }
}

impl fmt::Display for DistributionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistributionOutcome::Transferred {
                external_account_id,
                local_user_id,
                resource,
                amount,
            } => write!(
                f,
                "Successfully distributed {} {} to {} (User: {}).",
                amount, resource, external_account_id, local_user_id
            ),
            DistributionOutcome::InsufficientBalance { external_account_id } => write!(
                f,
                "Not enough resources to distribute to {}.",
                external_account_id
            ),
            DistributionOutcome::IdentityNotFound { external_account_id } => write!(
                f,
                "User with Epic ID {} not found in the server.",
                external_account_id
            ),
            DistributionOutcome::WalletResolutionFailed {
                external_account_id,
                error,
            } => write!(
                f,
                "Failed to retrieve wallet for Epic ID {}. {}",
                external_account_id, error
            ),
            DistributionOutcome::TransferFailed {
                external_account_id,
                resource,
                amount,
                error,
            } => write!(
                f,
                "Failed to distribute {} {} to {}. {}",
                amount, resource, external_account_id, error
            ),
            DistributionOutcome::InvalidRow {
                line,
                external_account_id,
                reason,
            } => write!(
                f,
                "Skipped line {} ({}): {}.",
                line, external_account_id, reason
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeSummary {
    pub transferred: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Everything a finished run reports back
#[derive(Debug, Clone, Serialize)]
pub struct DistributionReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub pool_before: PoolBalance,
    /// In-memory balance after the successful transfers of this run
    pub pool_after: PoolBalance,
    pub outcomes: Vec<DistributionOutcome>,
}

impl DistributionReport {
    pub fn summary(&self) -> OutcomeSummary {
        let mut summary = OutcomeSummary::default();
        for outcome in &self.outcomes {
            match outcome {
                DistributionOutcome::Transferred { .. } => summary.transferred += 1,
                DistributionOutcome::TransferFailed { .. }
                | DistributionOutcome::WalletResolutionFailed { .. } => summary.failed += 1,
                _ => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn lines(&self) -> Vec<String> {
        self.outcomes.iter().map(ToString::to_string).collect()
    }

    /// Text report as shown to the operator
    pub fn render(&self) -> String {
        let mut text = String::from("Distribution process completed:");
        for line in self.lines() {
            text.push('\n');
            text.push_str(&line);
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_outcome_lines() {
        let ok = DistributionOutcome::Transferred {
            external_account_id: "abc".to_string(),
            local_user_id: "42".to_string(),
            resource: ResourceKind::Oil,
            amount: dec!(15),
        };
        assert_eq!(ok.to_string(), "Successfully distributed 15 Oil to abc (User: 42).");

        let failed = DistributionOutcome::TransferFailed {
            external_account_id: "abc".to_string(),
            resource: ResourceKind::Energy,
            amount: dec!(2),
            error: "API responded with status code: 500. Response: ".to_string(),
        };
        assert!(failed.to_string().starts_with("Failed to distribute 2 Energy to abc."));
    }

    #[test]
    fn test_report_summary_and_render() {
        let report = DistributionReport {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            pool_before: PoolBalance::default(),
            pool_after: PoolBalance::default(),
            outcomes: vec![
                DistributionOutcome::IdentityNotFound {
                    external_account_id: "x".to_string(),
                },
                DistributionOutcome::InsufficientBalance {
                    external_account_id: "y".to_string(),
                },
            ],
        };

        assert_eq!(
            report.summary(),
            OutcomeSummary {
                transferred: 0,
                failed: 0,
                skipped: 2
            }
        );
        assert_eq!(
            report.render(),
            "Distribution process completed:\n\
             User with Epic ID x not found in the server.\n\
             Not enough resources to distribute to y."
        );
    }
}

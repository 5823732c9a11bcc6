use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::distribution::{DistributionOutcome, DistributionReport, OutcomeSummary};
use crate::identity::{IdentityRecord, SessionReply, SubmissionKind};
use crate::ledger::models::PoolBalance;

// ========== REQUEST MODELS ==========

/// Open a DM-style submission (`set` or `edit`)
#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub kind: SubmissionKind,
}

/// One message sent by the actor during a submission
#[derive(Debug, Deserialize, Validate)]
pub struct SessionMessageRequest {
    #[validate(length(min = 1, max = 256, message = "content must be 1-256 characters"))]
    pub content: String,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub identities: usize,
}

#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    pub local_user_id: String,
    pub external_account_id: String,
}

impl From<IdentityRecord> for IdentityResponse {
    fn from(record: IdentityRecord) -> Self {
        Self {
            local_user_id: record.local_user_id,
            external_account_id: record.external_account_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IdentityListResponse {
    pub count: usize,
    pub identities: Vec<IdentityResponse>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub kind: SubmissionKind,
    pub reply: SessionReply,
    pub message: String,
    /// True once the session is over (saved, updated or timed out)
    pub finished: bool,
}

impl SessionResponse {
    pub fn new(kind: SubmissionKind, reply: SessionReply) -> Self {
        Self {
            kind,
            reply,
            message: reply.message(kind).to_string(),
            finished: reply.is_terminal(),
        }
    }
}

/// The `view` command: linked wallet and its balances
#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub local_user_id: String,
    pub external_account_id: String,
    pub wallet: String,
    pub balance: PoolBalance,
}

#[derive(Debug, Serialize)]
pub struct PoolResponse {
    pub wallet: String,
    pub balance: PoolBalance,
}

#[derive(Debug, Serialize)]
pub struct DistributionResponse {
    pub run_id: Uuid,
    pub summary: OutcomeSummary,
    pub pool_before: PoolBalance,
    pub pool_after: PoolBalance,
    pub outcomes: Vec<DistributionOutcome>,
    /// One human-readable line per outcome
    pub report: String,
}

impl From<DistributionReport> for DistributionResponse {
    fn from(report: DistributionReport) -> Self {
        Self {
            run_id: report.run_id,
            summary: report.summary(),
            pool_before: report.pool_before,
            pool_after: report.pool_after,
            report: report.render(),
            outcomes: report.outcomes,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub local_user_id: String,
    pub external_account_id: String,
}

// Error taxonomy for the collection ledger
//
// Every error here is either a caller-input problem or a precondition
// violation. Storage failures pass through untouched so the transport layer
// can decide whether to retry them.

use serde::Serialize;
use thiserror::Error;

/// A member that blocks center activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberRef {
    pub member_id: i64,
    pub name: String,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Denomination mismatch: notes total {total_notes}, payments total {total_payments}")]
    ReconciliationMismatch { total_notes: i64, total_payments: i64 },

    #[error("Batch contains no payment with a positive amount")]
    EmptyBatch,

    #[error("No schedule entry for loan {loan_id} week {week_no}")]
    UnknownScheduleEntry { loan_id: i64, week_no: u32 },

    #[error("Loan {loan_id} week {week_no} is already paid")]
    DuplicatePayment { loan_id: i64, week_no: u32 },

    #[error("Center {center_id} cannot activate: {} member(s) without a schedule", .missing.len())]
    ActivationPrecondition {
        center_id: i64,
        missing: Vec<MemberRef>,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Batch not committed: deadline exceeded after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u128 },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        LedgerError::InvalidInput(message.into())
    }

    /// Short machine-readable code used by the CLI and HTTP layers
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidInput(_) => "invalid_input",
            LedgerError::ReconciliationMismatch { .. } => "reconciliation_mismatch",
            LedgerError::EmptyBatch => "empty_batch",
            LedgerError::UnknownScheduleEntry { .. } => "unknown_schedule_entry",
            LedgerError::DuplicatePayment { .. } => "duplicate_payment",
            LedgerError::ActivationPrecondition { .. } => "activation_precondition",
            LedgerError::NotFound { .. } => "not_found",
            LedgerError::Timeout { .. } => "timeout",
            LedgerError::Storage(_) => "storage",
            LedgerError::Serialization(_) => "serialization",
        }
    }

    /// True for errors caused by the caller rather than the store
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            LedgerError::Storage(_) | LedgerError::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;

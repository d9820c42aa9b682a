// 💰 Loan Entity - principal disbursed to a member, repaid weekly
//
// A member's "current" loan is the most recent one in status CREDITED
// (disbursed and under repayment).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// LOAN STATUS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LoanStatus {
    /// Approved, not yet disbursed
    Pending,

    /// Disbursed and under active repayment
    Credited,

    /// Fully repaid
    Closed,

    /// Any other upstream status, kept verbatim
    Other(String),
}

impl LoanStatus {
    pub fn as_str(&self) -> &str {
        match self {
            LoanStatus::Pending => "PENDING",
            LoanStatus::Credited => "CREDITED",
            LoanStatus::Closed => "CLOSED",
            LoanStatus::Other(s) => s.as_str(),
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => LoanStatus::Pending,
            "CREDITED" => LoanStatus::Credited,
            "CLOSED" => LoanStatus::Closed,
            other => LoanStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for LoanStatus {
    fn from(s: String) -> Self {
        LoanStatus::parse(&s)
    }
}

impl From<LoanStatus> for String {
    fn from(status: LoanStatus) -> Self {
        status.as_str().to_string()
    }
}

// ============================================================================
// LOAN ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: i64,
    pub member_id: i64,
    /// Principal, smallest currency unit
    pub amount: i64,
    pub released_date: Option<NaiveDate>,
    #[serde(rename = "loan_start_date")]
    pub start_date: Option<NaiveDate>,
    /// Weekday collections happen on, e.g. "Monday"
    pub repayment_day: Option<String>,
    pub status: LoanStatus,
    pub last_collected: Option<NaiveDate>,
}

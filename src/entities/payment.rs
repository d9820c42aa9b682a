// 🧾 Payments - proposed batch tuples and the immutable records they become

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::schedule_entry::EntryStatus;

/// One line of a submitted collection batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInput {
    pub member_id: i64,
    pub loan_id: i64,
    pub week_no: u32,
    pub amount: i64,
}

/// Append-only cash receipt. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub batch_id: String,
    pub member_id: i64,
    pub loan_id: i64,
    pub week_no: u32,
    pub amount: i64,
    pub status: EntryStatus,
    pub collected_on: NaiveDate,
    pub recorded_at: DateTime<Utc>,
}

// 📅 Schedule Entry - one week of a loan's repayment plan
//
// Keyed by (loan_id, week_no). amount_due starts equal to expected_amount
// and only ever decreases, clamped at zero.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Pending,
    Paid,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EntryStatus::Pending),
            "paid" => Some(EntryStatus::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub loan_id: i64,
    pub week_no: u32,
    pub collection_date: NaiveDate,
    pub expected_amount: i64,
    pub amount_due: i64,
    pub status: EntryStatus,
}

impl ScheduleEntry {
    pub fn paid_amount(&self) -> i64 {
        self.expected_amount - self.amount_due
    }

    pub fn is_outstanding(&self) -> bool {
        self.status != EntryStatus::Paid || self.amount_due > 0
    }

    /// Apply a payment: mark paid and reduce the balance, never below zero
    pub fn apply_payment(&mut self, amount: i64) {
        self.status = EntryStatus::Paid;
        self.amount_due = (self.amount_due - amount).max(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(expected: i64) -> ScheduleEntry {
        ScheduleEntry {
            loan_id: 1,
            week_no: 1,
            collection_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            expected_amount: expected,
            amount_due: expected,
            status: EntryStatus::Pending,
        }
    }

    #[test]
    fn test_apply_full_payment() {
        let mut e = entry(1100);
        e.apply_payment(1100);

        assert_eq!(e.status, EntryStatus::Paid);
        assert_eq!(e.amount_due, 0);
        assert_eq!(e.paid_amount(), 1100);
        assert!(!e.is_outstanding());
    }

    #[test]
    fn test_partial_payment_stays_outstanding() {
        let mut e = entry(1100);
        e.apply_payment(600);

        assert_eq!(e.status, EntryStatus::Paid);
        assert_eq!(e.amount_due, 500);
        assert!(e.is_outstanding());
    }

    #[test]
    fn test_overpayment_clamps_at_zero() {
        let mut e = entry(1080);
        e.apply_payment(2000);
        assert_eq!(e.amount_due, 0);
    }

    #[test]
    fn test_status_text() {
        assert_eq!(EntryStatus::parse("paid"), Some(EntryStatus::Paid));
        assert_eq!(EntryStatus::parse("PAID"), None);
        assert_eq!(EntryStatus::Pending.as_str(), "pending");
    }
}

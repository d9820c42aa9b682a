// 📆 Schedule Generator - weekly repayment plan for a loan
//
// Week n is collected on first_date + 7*(n-1) days. The amount for each week
// comes from a tier ladder, e.g. 4 weeks at 1100, 4 at 1080, 4 at 1070.
//
// Generation is pure: the same loan, date and ladder always produce the same
// entries, so callers can retry freely before persisting.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::entities::{EntryStatus, ScheduleEntry};
use crate::error::{LedgerError, Result};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DAYS_BETWEEN_COLLECTIONS: i64 = 7;

// ============================================================================
// TIER LADDER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub weeks: u32,
    pub amount: i64,
}

/// Ordered weekly amount tiers. Total term = sum of tier weeks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TierLadder {
    tiers: Vec<Tier>,
}

impl TierLadder {
    pub fn new(tiers: Vec<Tier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(LedgerError::invalid("tier ladder must contain at least one tier"));
        }
        for tier in &tiers {
            if tier.weeks == 0 {
                return Err(LedgerError::invalid("tier weeks must be positive"));
            }
            if tier.amount <= 0 {
                return Err(LedgerError::invalid(format!(
                    "tier amount must be positive, got {}",
                    tier.amount
                )));
            }
        }
        Ok(TierLadder { tiers })
    }

    pub fn term_weeks(&self) -> u32 {
        self.tiers.iter().map(|t| t.weeks).sum()
    }

    /// Amount for each week in order, 1-indexed by position + 1
    pub fn weekly_amounts(&self) -> Vec<i64> {
        self.tiers
            .iter()
            .flat_map(|t| std::iter::repeat(t.amount).take(t.weeks as usize))
            .collect()
    }

    /// Re-check invariants after deserializing from config
    pub fn validate(&self) -> Result<()> {
        TierLadder::new(self.tiers.clone()).map(|_| ())
    }
}

impl Default for TierLadder {
    fn default() -> Self {
        TierLadder {
            tiers: vec![
                Tier { weeks: 4, amount: 1100 },
                Tier { weeks: 4, amount: 1080 },
                Tier { weeks: 4, amount: 1070 },
            ],
        }
    }
}

// ============================================================================
// GENERATION
// ============================================================================

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|e| LedgerError::invalid(format!("unparseable date '{}': {}", value, e)))
}

/// Build the full schedule for a loan from its first collection date
pub fn generate_schedule(
    loan_id: i64,
    first_collection_date: Option<&str>,
    ladder: &TierLadder,
) -> Result<Vec<ScheduleEntry>> {
    let raw = first_collection_date
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| LedgerError::invalid("first collection date is required"))?;
    let first = parse_date(raw)?;

    Ok(schedule_from(loan_id, first, ladder))
}

pub fn schedule_from(loan_id: i64, first: NaiveDate, ladder: &TierLadder) -> Vec<ScheduleEntry> {
    ladder
        .weekly_amounts()
        .into_iter()
        .enumerate()
        .map(|(i, amount)| ScheduleEntry {
            loan_id,
            week_no: i as u32 + 1,
            collection_date: first + Duration::days(DAYS_BETWEEN_COLLECTIONS * i as i64),
            expected_amount: amount,
            amount_due: amount,
            status: EntryStatus::Pending,
        })
        .collect()
}

/// Check a schedule is well formed before it is persisted
///
/// The schedule must cover the ladder's full term with the ladder's amount
/// for each week. Week numbers must run 1..=n, dates must step by exactly
/// 7 days, every entry must belong to the same loan and start unpaid.
pub fn validate_schedule(entries: &[ScheduleEntry], ladder: &TierLadder) -> Result<()> {
    let first = entries
        .first()
        .ok_or_else(|| LedgerError::invalid("schedule is empty"))?;

    let amounts = ladder.weekly_amounts();
    if entries.len() != amounts.len() {
        return Err(LedgerError::invalid(format!(
            "loan {}: schedule has {} weeks, term is {}",
            first.loan_id,
            entries.len(),
            ladder.term_weeks()
        )));
    }

    for (i, entry) in entries.iter().enumerate() {
        let expected_week = i as u32 + 1;
        if entry.loan_id != first.loan_id {
            return Err(LedgerError::invalid(format!(
                "schedule mixes loans {} and {}",
                first.loan_id, entry.loan_id
            )));
        }
        if entry.week_no != expected_week {
            return Err(LedgerError::invalid(format!(
                "loan {}: expected week {}, found week {}",
                entry.loan_id, expected_week, entry.week_no
            )));
        }
        if entry.expected_amount != amounts[i] {
            return Err(LedgerError::invalid(format!(
                "loan {} week {}: expected amount {} does not match the ladder ({})",
                entry.loan_id, entry.week_no, entry.expected_amount, amounts[i]
            )));
        }
        if entry.amount_due != entry.expected_amount {
            return Err(LedgerError::invalid(format!(
                "loan {} week {}: amount_due must equal expected_amount",
                entry.loan_id, entry.week_no
            )));
        }
        if entry.status != EntryStatus::Pending {
            return Err(LedgerError::invalid(format!(
                "loan {} week {}: new entries must be pending",
                entry.loan_id, entry.week_no
            )));
        }
        if i > 0 {
            let gap = entry.collection_date - entries[i - 1].collection_date;
            if gap.num_days() != DAYS_BETWEEN_COLLECTIONS {
                return Err(LedgerError::invalid(format!(
                    "loan {} week {}: collections must be {} days apart, got {}",
                    entry.loan_id,
                    entry.week_no,
                    DAYS_BETWEEN_COLLECTIONS,
                    gap.num_days()
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_ladder_amounts() {
        let ladder = TierLadder::default();
        let mut expected = vec![1100; 4];
        expected.extend(vec![1080; 4]);
        expected.extend(vec![1070; 4]);

        assert_eq!(ladder.term_weeks(), 12);
        assert_eq!(ladder.weekly_amounts(), expected);
    }

    #[test]
    fn test_generate_from_new_year() {
        let entries = generate_schedule(42, Some("2024-01-01"), &TierLadder::default()).unwrap();

        assert_eq!(entries.len(), 12);
        assert_eq!(entries[0].collection_date, date(2024, 1, 1));
        assert_eq!(entries[0].expected_amount, 1100);
        assert_eq!(entries[4].collection_date, date(2024, 1, 29));
        assert_eq!(entries[4].expected_amount, 1080);
        assert_eq!(entries[8].collection_date, date(2024, 2, 26));
        assert_eq!(entries[8].expected_amount, 1070);
        assert!(entries.iter().all(|e| e.loan_id == 42));
        assert!(entries.iter().all(|e| e.status == EntryStatus::Pending));
        assert!(entries.iter().all(|e| e.amount_due == e.expected_amount));
    }

    #[test]
    fn test_missing_date_is_invalid() {
        let ladder = TierLadder::default();
        assert!(matches!(
            generate_schedule(1, None, &ladder),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            generate_schedule(1, Some("  "), &ladder),
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            generate_schedule(1, Some("01/01/2024"), &ladder),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_ladder_rejects_bad_tiers() {
        assert!(TierLadder::new(vec![]).is_err());
        assert!(TierLadder::new(vec![Tier { weeks: 0, amount: 100 }]).is_err());
        assert!(TierLadder::new(vec![Tier { weeks: 2, amount: -5 }]).is_err());
    }

    #[test]
    fn test_custom_ladder_changes_term() {
        let ladder = TierLadder::new(vec![
            Tier { weeks: 2, amount: 500 },
            Tier { weeks: 1, amount: 450 },
        ])
        .unwrap();

        let entries = schedule_from(9, date(2024, 3, 4), &ladder);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].expected_amount, 450);
        assert_eq!(entries[2].collection_date, date(2024, 3, 18));
    }

    #[test]
    fn test_validate_rejects_gaps() {
        let ladder = TierLadder::default();
        let mut entries = schedule_from(1, date(2024, 1, 1), &ladder);
        assert!(validate_schedule(&entries, &ladder).is_ok());

        entries[3].collection_date = entries[3].collection_date + Duration::days(1);
        assert!(validate_schedule(&entries, &ladder).is_err());

        let mut renumbered = schedule_from(1, date(2024, 1, 1), &ladder);
        renumbered.remove(5);
        assert!(validate_schedule(&renumbered, &ladder).is_err());

        assert!(validate_schedule(&[], &ladder).is_err());
    }

    #[test]
    fn test_validate_holds_schedule_to_the_ladder() {
        let ladder = TierLadder::default();

        let mut truncated = schedule_from(1, date(2024, 1, 1), &ladder);
        truncated.truncate(1);
        assert!(matches!(
            validate_schedule(&truncated, &ladder),
            Err(LedgerError::InvalidInput(_))
        ));

        let mut tampered = schedule_from(1, date(2024, 1, 1), &ladder);
        tampered[6].expected_amount = 1;
        tampered[6].amount_due = 1;
        assert!(matches!(
            validate_schedule(&tampered, &ladder),
            Err(LedgerError::InvalidInput(_))
        ));

        let short_ladder = TierLadder::new(vec![Tier { weeks: 2, amount: 500 }]).unwrap();
        assert!(validate_schedule(&schedule_from(1, date(2024, 1, 1), &short_ladder), &ladder).is_err());
    }

    #[test]
    fn test_ladder_deserializes_from_list() {
        let ladder: TierLadder =
            serde_json::from_str(r#"[{"weeks": 4, "amount": 1100}, {"weeks": 8, "amount": 1000}]"#)
                .unwrap();
        assert_eq!(ladder.term_weeks(), 12);
        assert!(ladder.validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_schedule_is_deterministic_and_weekly(days in 0i64..20_000) {
            let first = date(2000, 1, 1) + Duration::days(days);
            let text = first.format(DATE_FORMAT).to_string();
            let ladder = TierLadder::default();

            let a = generate_schedule(7, Some(&text), &ladder).unwrap();
            let b = generate_schedule(7, Some(&text), &ladder).unwrap();
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());

            prop_assert_eq!(a[0].collection_date, first);
            for pair in a.windows(2) {
                prop_assert_eq!((pair[1].collection_date - pair[0].collection_date).num_days(), 7);
                prop_assert_eq!(pair[1].week_no, pair[0].week_no + 1);
            }

            let amounts: Vec<i64> = a.iter().map(|e| e.expected_amount).collect();
            prop_assert_eq!(amounts, ladder.weekly_amounts());
            prop_assert!(validate_schedule(&a, &ladder).is_ok());
        }
    }
}

// ⚖️ Denomination Reconciler - cash in hand must equal the payments claimed
//
// Formula:
//   Σ(note_value × count) == Σ(payment amount)
//
// Exact integer equality, no tolerance. A batch that fails is rejected in
// full; nothing reaches the recorder.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entities::PaymentInput;
use crate::error::{LedgerError, Result};

/// Notes the field staff count, largest first
pub const NOTE_VALUES: [i64; 7] = [2000, 500, 200, 100, 50, 20, 10];

// ============================================================================
// DENOMINATION BREAKDOWN
// ============================================================================

/// Count of notes per face value for one batch submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DenominationBreakdown {
    counts: BTreeMap<i64, u32>,
}

impl DenominationBreakdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: &[(i64, u32)]) -> Self {
        let mut breakdown = Self::new();
        for &(note, count) in pairs {
            breakdown.set(note, count);
        }
        breakdown
    }

    pub fn set(&mut self, note: i64, count: u32) {
        self.counts.insert(note, count);
    }

    pub fn count(&self, note: i64) -> u32 {
        self.counts.get(&note).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, u32)> + '_ {
        self.counts.iter().map(|(&note, &count)| (note, count))
    }

    /// Reject face values outside the accepted set
    pub fn validate(&self, accepted: &[i64]) -> Result<()> {
        for (note, count) in self.iter() {
            if count > 0 && !accepted.contains(&note) {
                return Err(LedgerError::invalid(format!(
                    "unknown note value {} (accepted: {:?})",
                    note, accepted
                )));
            }
        }
        Ok(())
    }

    pub fn total(&self) -> Result<i64> {
        self.iter().try_fold(0i64, |acc, (note, count)| {
            note.checked_mul(count as i64)
                .and_then(|v| acc.checked_add(v))
                .ok_or_else(|| LedgerError::invalid("denomination total overflows"))
        })
    }
}

// ============================================================================
// RECONCILED BATCH
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTotals {
    pub total_notes: i64,
    pub total_payments: i64,
}

/// A batch that passed the denomination gate. Only `reconcile` builds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciledBatch {
    entries: Vec<PaymentInput>,
    denomination: DenominationBreakdown,
    totals: BatchTotals,
}

impl ReconciledBatch {
    pub fn entries(&self) -> &[PaymentInput] {
        &self.entries
    }

    pub fn denomination(&self) -> &DenominationBreakdown {
        &self.denomination
    }

    pub fn totals(&self) -> BatchTotals {
        self.totals
    }
}

pub fn payments_total(entries: &[PaymentInput]) -> Result<i64> {
    entries.iter().try_fold(0i64, |acc, e| {
        acc.checked_add(e.amount)
            .ok_or_else(|| LedgerError::invalid("payment total overflows"))
    })
}

/// Gate a batch on its denomination count
///
/// Entries with a non-positive amount are dropped first (members who paid
/// nothing this visit); an empty remainder is `EmptyBatch`.
pub fn reconcile(
    denomination: &DenominationBreakdown,
    entries: &[PaymentInput],
    accepted_notes: &[i64],
) -> Result<ReconciledBatch> {
    denomination.validate(accepted_notes)?;

    let positive: Vec<PaymentInput> = entries.iter().filter(|e| e.amount > 0).cloned().collect();
    if positive.is_empty() {
        return Err(LedgerError::EmptyBatch);
    }

    let total_notes = denomination.total()?;
    let total_payments = payments_total(&positive)?;

    if total_notes != total_payments {
        return Err(LedgerError::ReconciliationMismatch {
            total_notes,
            total_payments,
        });
    }

    Ok(ReconciledBatch {
        entries: positive,
        denomination: denomination.clone(),
        totals: BatchTotals {
            total_notes,
            total_payments,
        },
    })
}

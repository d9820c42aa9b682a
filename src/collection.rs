// 💵 Collection Recorder - apply a reconciled batch to the schedule
//
// The whole batch is one IMMEDIATE transaction: SQLite takes the write lock
// up front, so two batches touching the same loan can never interleave.
// Inside the transaction each tuple succeeds or fails on its own; a tuple
// pointing at a missing (loan_id, week_no) is reported back and the rest
// still apply.

use chrono::NaiveDate;
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::db::{self, BatchRow, Event};
use crate::denomination::{BatchTotals, ReconciledBatch};
use crate::entities::{EntryStatus, PaymentInput, ScheduleEntry};
use crate::error::{LedgerError, Result};

// ============================================================================
// DUPLICATE POLICY
// ============================================================================

/// What to do with a payment for a week that is already marked paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Record it again; amount_due stays clamped at zero
    #[default]
    Accumulate,

    /// Fail the tuple with DuplicatePayment
    Reject,
}

impl DuplicatePolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "accumulate" => Some(DuplicatePolicy::Accumulate),
            "reject" => Some(DuplicatePolicy::Reject),
            _ => None,
        }
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedEntry {
    pub entry: PaymentInput,
    pub code: String,
    pub reason: String,
}

impl FailedEntry {
    fn new(entry: &PaymentInput, error: &LedgerError) -> Self {
        FailedEntry {
            entry: entry.clone(),
            code: error.code().to_string(),
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    /// Passed the denomination gate and was committed
    pub accepted: bool,
    pub recorded_count: usize,
    pub recorded_amount: i64,
    pub failed: Vec<FailedEntry>,
    pub totals: BatchTotals,
    pub fingerprint: String,
    /// Earlier batches with the same fingerprint
    pub duplicate_of: Vec<String>,
}

/// SHA-256 over the canonical batch content and collection date
pub fn batch_fingerprint(batch: &ReconciledBatch, collected_on: NaiveDate) -> String {
    let mut lines: Vec<String> = batch
        .entries()
        .iter()
        .map(|e| format!("{}:{}:{}:{}", e.member_id, e.loan_id, e.week_no, e.amount))
        .collect();
    lines.sort();

    let notes: Vec<String> = batch
        .denomination()
        .iter()
        .filter(|(_, count)| *count > 0)
        .map(|(note, count)| format!("{}x{}", note, count))
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(db::format_date(collected_on));
    hasher.update("|");
    hasher.update(lines.join(","));
    hasher.update("|");
    hasher.update(notes.join(","));
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// RECORDING
// ============================================================================

struct Planner<'c> {
    conn: &'c Connection,
    policy: DuplicatePolicy,
    working: BTreeMap<(i64, u32), ScheduleEntry>,
    loan_owner: HashMap<i64, i64>,
}

impl<'c> Planner<'c> {
    fn new(conn: &'c Connection, policy: DuplicatePolicy) -> Self {
        Planner {
            conn,
            policy,
            working: BTreeMap::new(),
            loan_owner: HashMap::new(),
        }
    }

    fn owner_of(&mut self, loan_id: i64) -> Result<i64> {
        if let Some(&owner) = self.loan_owner.get(&loan_id) {
            return Ok(owner);
        }
        let owner = db::get_loan(self.conn, loan_id)?.member_id;
        self.loan_owner.insert(loan_id, owner);
        Ok(owner)
    }

    /// Apply one tuple to the working copy of its schedule entry
    fn apply(&mut self, input: &PaymentInput) -> Result<()> {
        let key = (input.loan_id, input.week_no);
        let unknown = LedgerError::UnknownScheduleEntry {
            loan_id: input.loan_id,
            week_no: input.week_no,
        };

        if !self.working.contains_key(&key) {
            match db::get_schedule_entry(self.conn, input.loan_id, input.week_no)? {
                Some(entry) => {
                    self.working.insert(key, entry);
                }
                None => return Err(unknown),
            }
        }

        if self.owner_of(input.loan_id)? != input.member_id {
            return Err(unknown);
        }

        let policy = self.policy;
        let entry = self.working.get_mut(&key).ok_or(unknown)?;
        if entry.status == EntryStatus::Paid && policy == DuplicatePolicy::Reject {
            return Err(LedgerError::DuplicatePayment {
                loan_id: input.loan_id,
                week_no: input.week_no,
            });
        }

        entry.apply_payment(input.amount);
        Ok(())
    }
}

/// Record a batch that already passed the denomination gate
///
/// Nothing is visible to other readers until the transaction commits, and
/// the commit only happens if it can finish before `deadline`.
pub fn record_batch(
    conn: &mut Connection,
    batch: &ReconciledBatch,
    collected_on: NaiveDate,
    policy: DuplicatePolicy,
    deadline: Instant,
) -> Result<BatchOutcome> {
    let started = Instant::now();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let batch_id = uuid::Uuid::new_v4().to_string();
    let fingerprint = batch_fingerprint(batch, collected_on);
    let duplicate_of = db::batches_with_fingerprint(&tx, &fingerprint)?;
    if !duplicate_of.is_empty() {
        warn!(
            batch_id = %batch_id,
            previous = ?duplicate_of,
            "identical batch was already recorded"
        );
    }

    let mut planner = Planner::new(&tx, policy);
    let mut applied: Vec<&PaymentInput> = Vec::new();
    let mut failed: Vec<FailedEntry> = Vec::new();

    for input in batch.entries() {
        match planner.apply(input) {
            Ok(()) => applied.push(input),
            Err(e) if e.is_business_error() => {
                debug!(loan_id = input.loan_id, week_no = input.week_no, error = %e, "tuple rejected");
                failed.push(FailedEntry::new(input, &e));
            }
            Err(e) => return Err(e),
        }
    }

    let denomination_json = serde_json::to_string(batch.denomination())?;
    let totals = batch.totals();
    db::insert_batch(
        &tx,
        &BatchRow {
            id: &batch_id,
            fingerprint: &fingerprint,
            collected_on,
            total_notes: totals.total_notes,
            total_payments: totals.total_payments,
            denomination_json: &denomination_json,
            recorded_count: applied.len(),
            failed_count: failed.len(),
        },
    )?;

    let touched: BTreeSet<(i64, u32)> = applied.iter().map(|p| (p.loan_id, p.week_no)).collect();
    for key in &touched {
        if let Some(entry) = planner.working.get(key) {
            db::update_schedule_entry(&tx, entry)?;
        }
    }

    let mut recorded_amount = 0i64;
    for payment in &applied {
        db::insert_payment(
            &tx,
            &batch_id,
            payment.member_id,
            payment.loan_id,
            payment.week_no,
            payment.amount,
            collected_on,
        )?;
        recorded_amount += payment.amount;
    }

    let loans: BTreeSet<i64> = applied.iter().map(|p| p.loan_id).collect();
    for loan_id in &loans {
        db::set_last_collected(&tx, *loan_id, collected_on)?;
    }

    let event = Event::new(
        "collection_recorded",
        "batch",
        &batch_id,
        serde_json::json!({
            "collected_on": db::format_date(collected_on),
            "total_notes": totals.total_notes,
            "total_payments": totals.total_payments,
            "recorded": applied.len(),
            "failed": failed.len(),
            "loans": loans,
        }),
        "collection_recorder",
    );
    db::insert_event(&tx, &event)?;

    if Instant::now() > deadline {
        let elapsed_ms = started.elapsed().as_millis();
        warn!(batch_id = %batch_id, elapsed_ms, "deadline passed, rolling back batch");
        tx.rollback()?;
        return Err(LedgerError::Timeout { elapsed_ms });
    }
    tx.commit()?;

    info!(
        batch_id = %batch_id,
        recorded = applied.len(),
        failed = failed.len(),
        amount = recorded_amount,
        "collection batch committed"
    );

    Ok(BatchOutcome {
        batch_id,
        accepted: true,
        recorded_count: applied.len(),
        recorded_amount,
        failed,
        totals,
        fingerprint,
        duplicate_of,
    })
}

// End-to-end: roster → schedule → activation → collection → reports

use center_collections::{
    db, CollectionLedger, DenominationBreakdown, DuplicatePolicy, EntryStatus, LedgerConfig,
    LedgerError, LoanStatus, NewLoan, PaymentInput,
};
use chrono::NaiveDate;
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

struct Fixture {
    ledger: CollectionLedger,
    center: i64,
    members: Vec<(i64, i64)>,
}

fn center_with(names: &[&str]) -> Fixture {
    let ledger = CollectionLedger::in_memory(LedgerConfig::default()).unwrap();
    let center = ledger.add_center("Velachery").unwrap();
    let members = names
        .iter()
        .map(|name| {
            let member = ledger.add_member(center, name, None, None).unwrap();
            let loan = ledger
                .add_loan(&NewLoan {
                    member_id: member,
                    amount: 12_000,
                    released_date: Some(date(2023, 12, 26)),
                    start_date: Some(date(2024, 1, 1)),
                    repayment_day: Some("Monday".to_string()),
                    status: LoanStatus::Credited,
                })
                .unwrap();
            (member, loan)
        })
        .collect();
    Fixture {
        ledger,
        center,
        members,
    }
}

fn pay(member_id: i64, loan_id: i64, week_no: u32, amount: i64) -> PaymentInput {
    PaymentInput {
        member_id,
        loan_id,
        week_no,
        amount,
    }
}

#[test]
fn test_schedule_collect_and_report() {
    let mut fx = center_with(&["Ranjani"]);
    let (member, loan) = fx.members[0];

    let schedule = fx.ledger.generate_schedule(loan, Some("2024-01-01")).unwrap();
    assert_eq!(schedule.len(), 12);
    assert_eq!(schedule[0].collection_date, date(2024, 1, 1));
    assert_eq!(schedule[0].expected_amount, 1100);
    assert_eq!(schedule[4].collection_date, date(2024, 1, 29));
    assert_eq!(schedule[4].expected_amount, 1080);
    assert_eq!(schedule[8].collection_date, date(2024, 2, 26));
    assert_eq!(schedule[8].expected_amount, 1070);

    // Generating alone persists nothing, so the center cannot activate yet
    assert!(matches!(
        fx.ledger.activate_center(fx.center),
        Err(LedgerError::ActivationPrecondition { .. })
    ));

    fx.ledger.save_schedules(&[schedule]).unwrap();
    let activation = fx.ledger.activate_center(fx.center).unwrap();
    assert!(activation.activated);

    let day = date(2024, 1, 1);
    let sheet = fx.ledger.collection_sheet(fx.center, day).unwrap();
    assert_eq!(sheet.len(), 1);
    assert_eq!(sheet[0].amount_due, 1100);

    let notes = DenominationBreakdown::from_pairs(&[(500, 2), (100, 1)]);
    let outcome = fx
        .ledger
        .submit_collection_batch(&[pay(member, loan, 1, 1100)], &notes, day, None)
        .unwrap();
    assert!(outcome.accepted);
    assert_eq!(outcome.recorded_count, 1);
    assert_eq!(outcome.recorded_amount, 1100);
    assert!(outcome.failed.is_empty());

    let view = fx.ledger.loan_schedule(loan).unwrap();
    assert_eq!(view.entries[0].status, EntryStatus::Paid);
    assert_eq!(view.entries[0].amount_due, 0);
    assert_eq!(view.weeks_paid, 1);

    // Short count is refused and leaves week 1 untouched
    let short = DenominationBreakdown::from_pairs(&[(500, 2), (50, 1)]);
    let rejected =
        fx.ledger
            .submit_collection_batch(&[pay(member, loan, 1, 1100)], &short, day, None);
    assert!(matches!(
        rejected,
        Err(LedgerError::ReconciliationMismatch {
            total_notes: 1050,
            total_payments: 1100
        })
    ));
    let view = fx.ledger.loan_schedule(loan).unwrap();
    assert_eq!(view.entries[0].amount_due, 0);

    assert_eq!(fx.ledger.daily_total(day).unwrap(), 1100);
    assert!(fx.ledger.unpaid_today(day).unwrap().is_empty());
    assert_eq!(fx.ledger.daily_total(date(2024, 1, 8)).unwrap(), 0);
}

#[test]
fn test_bad_entry_does_not_block_the_rest() {
    let mut fx = center_with(&["Anitha", "Bhavani"]);
    let day = date(2024, 1, 1);
    fx.ledger.schedule_and_activate(fx.center, "2024-01-01").unwrap();

    let (a_member, a_loan) = fx.members[0];
    let (b_member, b_loan) = fx.members[1];
    let entries = vec![
        pay(a_member, a_loan, 1, 1100),
        // week 13 does not exist
        pay(b_member, b_loan, 13, 1000),
    ];
    let notes = DenominationBreakdown::from_pairs(&[(2000, 1), (100, 1)]);

    let outcome = fx
        .ledger
        .submit_collection_batch(&entries, &notes, day, None)
        .unwrap();
    assert!(outcome.accepted);
    assert_eq!(outcome.recorded_count, 1);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].entry.week_no, 13);

    let unpaid = fx.ledger.unpaid_today(day).unwrap();
    assert_eq!(unpaid.len(), 1);
    assert_eq!(unpaid[0].member_name, "Bhavani");
    assert_eq!(unpaid[0].amount_due, 1100);
    assert_eq!(fx.ledger.daily_total(day).unwrap(), 1100);
}

#[test]
fn test_partial_payments_and_zero_amount_lines() {
    let mut fx = center_with(&["Chitra", "Deepa"]);
    let day = date(2024, 1, 1);
    fx.ledger.schedule_and_activate(fx.center, "2024-01-01").unwrap();

    let (c_member, c_loan) = fx.members[0];
    let (d_member, d_loan) = fx.members[1];
    let notes = DenominationBreakdown::from_pairs(&[(500, 1), (100, 1)]);
    let entries = vec![pay(c_member, c_loan, 1, 600), pay(d_member, d_loan, 1, 0)];

    let outcome = fx
        .ledger
        .submit_collection_batch(&entries, &notes, day, None)
        .unwrap();
    assert_eq!(outcome.recorded_count, 1);

    let unpaid = fx.ledger.unpaid_today(day).unwrap();
    assert_eq!(unpaid.len(), 2);
    let chitra = unpaid.iter().find(|r| r.member_name == "Chitra").unwrap();
    assert_eq!(chitra.paid_amount, 600);
    assert_eq!(chitra.amount_due, 500);

    // Settle the rest the same day
    let rest = DenominationBreakdown::from_pairs(&[(500, 1)]);
    fx.ledger
        .submit_collection_batch(&[pay(c_member, c_loan, 1, 500)], &rest, day, None)
        .unwrap();
    let unpaid = fx.ledger.unpaid_today(day).unwrap();
    assert_eq!(unpaid.len(), 1);
    assert_eq!(unpaid[0].member_name, "Deepa");
    assert_eq!(fx.ledger.daily_total(day).unwrap(), 1100);
}

#[test]
fn test_empty_batch_and_activation_are_idempotent() {
    let mut fx = center_with(&["Ezhil"]);
    fx.ledger.schedule_and_activate(fx.center, "2024-01-01").unwrap();

    let (member, loan) = fx.members[0];
    let none = DenominationBreakdown::new();
    assert!(matches!(
        fx.ledger
            .submit_collection_batch(&[pay(member, loan, 1, 0)], &none, date(2024, 1, 1), None),
        Err(LedgerError::EmptyBatch)
    ));

    let again = fx.ledger.activate_center(fx.center).unwrap();
    assert!(again.activated);
    assert!(again.already_active);

    let active = fx.ledger.active_loans(fx.center).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].loan_id, loan);
}

#[test]
fn test_tampered_draft_is_refused_at_save() {
    let mut fx = center_with(&["Fathima"]);
    let (_member, loan) = fx.members[0];

    let mut draft = fx.ledger.generate_schedule(loan, Some("2024-01-01")).unwrap();
    draft.truncate(1);
    draft[0].expected_amount = 1;
    draft[0].amount_due = 1;

    assert!(matches!(
        fx.ledger.save_schedules(&[draft]),
        Err(LedgerError::InvalidInput(_))
    ));
    assert!(fx.ledger.loan_schedule(loan).unwrap().entries.is_empty());
    assert!(matches!(
        fx.ledger.activate_center(fx.center),
        Err(LedgerError::ActivationPrecondition { .. })
    ));
}

struct ScratchDb(PathBuf);

impl Drop for ScratchDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut name = self.0.clone().into_os_string();
            name.push(suffix);
            let _ = std::fs::remove_file(PathBuf::from(name));
        }
    }
}

#[test]
fn test_concurrent_batches_for_one_week_record_once() {
    const WRITERS: usize = 8;

    let scratch = ScratchDb(
        std::env::temp_dir().join(format!("collections-{}.db", uuid::Uuid::new_v4())),
    );
    let config = LedgerConfig {
        database_path: scratch.0.clone(),
        duplicate_policy: DuplicatePolicy::Reject,
        busy_timeout_ms: 30_000,
        batch_timeout_ms: 60_000,
        ..LedgerConfig::default()
    };

    let (member, loan) = {
        let mut setup = CollectionLedger::open(config.clone()).unwrap();
        let center = setup.add_center("Adyar").unwrap();
        let member = setup.add_member(center, "Gowri", None, None).unwrap();
        let loan = setup
            .add_loan(&NewLoan {
                member_id: member,
                amount: 12_000,
                released_date: Some(date(2023, 12, 26)),
                start_date: Some(date(2024, 1, 1)),
                repayment_day: None,
                status: LoanStatus::Credited,
            })
            .unwrap();
        setup.schedule_and_activate(center, "2024-01-01").unwrap();
        (member, loan)
    };

    let start = Arc::new(Barrier::new(WRITERS));
    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let config = config.clone();
            let start = Arc::clone(&start);
            thread::spawn(move || {
                let mut ledger = CollectionLedger::open(config).unwrap();
                let notes = DenominationBreakdown::from_pairs(&[(500, 2), (100, 1)]);
                start.wait();
                ledger
                    .submit_collection_batch(&[pay(member, loan, 1, 1100)], &notes, date(2024, 1, 1), None)
                    .unwrap()
            })
        })
        .collect();

    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let recorded: usize = outcomes.iter().map(|o| o.recorded_count).sum();
    assert_eq!(recorded, 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| o.failed.iter().any(|f| f.code == "duplicate_payment"))
            .count(),
        WRITERS - 1
    );

    let mut check = CollectionLedger::open(config).unwrap();
    assert_eq!(db::payments_for_loan(check.connection(), loan).unwrap().len(), 1);
    assert_eq!(check.daily_total(date(2024, 1, 1)).unwrap(), 1100);
}

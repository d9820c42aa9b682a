// 🧭 CollectionLedger - the operations operator tooling calls into
//
// Owns the connection and config. CLI and HTTP server both go through this
// type; neither touches the modules below it directly.

use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use crate::collection::{self, BatchOutcome};
use crate::config::LedgerConfig;
use crate::db::{self, ImportSummary, NewLoan, RosterRow};
use crate::denomination::{self, DenominationBreakdown};
use crate::entities::{Center, CenterFilter, Loan, Member, PaymentInput, ScheduleEntry};
use crate::error::{LedgerError, Result};
use crate::lifecycle::{self, Activation};
use crate::reports::{self, ActiveLoanRow, CollectionSheetRow, LoanScheduleView, UnpaidRow};
use crate::schedule;

#[derive(Debug, Clone, Serialize)]
pub struct MemberDetails {
    pub member: Member,
    pub center_name: String,
    pub loans: Vec<Loan>,
}

/// Result of the generate → persist → activate flow for a whole center
#[derive(Debug, Clone, Serialize)]
pub struct CenterScheduling {
    pub center_id: i64,
    pub schedules: usize,
    pub entries: usize,
    pub activation: Activation,
}

pub struct CollectionLedger {
    conn: Connection,
    config: LedgerConfig,
}

impl CollectionLedger {
    pub fn new(conn: Connection, config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        conn.busy_timeout(config.busy_timeout())?;
        db::setup_database(&conn)?;
        Ok(CollectionLedger { conn, config })
    }

    /// Open (or create) the database named in the config
    pub fn open(config: LedgerConfig) -> Result<Self> {
        config.validate()?;
        let conn = db::open(&config.database_path, config.busy_timeout())?;
        Ok(CollectionLedger { conn, config })
    }

    pub fn in_memory(config: LedgerConfig) -> Result<Self> {
        Self::new(Connection::open_in_memory()?, config)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ========================================================================
    // ROSTER
    // ========================================================================

    pub fn add_center(&self, name: &str) -> Result<i64> {
        db::insert_center(&self.conn, name)
    }

    pub fn add_member(
        &self,
        center_id: i64,
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<i64> {
        db::insert_member(&self.conn, center_id, name, email, phone)
    }

    pub fn add_loan(&self, loan: &NewLoan) -> Result<i64> {
        db::insert_loan(&self.conn, loan)
    }

    pub fn import_roster(&mut self, rows: &[RosterRow]) -> Result<ImportSummary> {
        db::import_roster(&mut self.conn, rows)
    }

    pub fn import_roster_csv(&mut self, path: &Path) -> anyhow::Result<ImportSummary> {
        let rows = db::load_roster_csv(path)?;
        Ok(self.import_roster(&rows)?)
    }

    pub fn list_centers(&self, filter: CenterFilter) -> Result<Vec<Center>> {
        db::list_centers(&self.conn, filter)
    }

    pub fn member_details(&self, member_id: i64) -> Result<MemberDetails> {
        let member = db::get_member(&self.conn, member_id)?;
        let center = db::get_center(&self.conn, member.center_id)?;
        let loans = db::loans_of_member(&self.conn, member_id)?;
        Ok(MemberDetails {
            member,
            center_name: center.name,
            loans,
        })
    }

    pub fn member_loans(&self, member_id: i64) -> Result<Vec<Loan>> {
        db::get_member(&self.conn, member_id)?;
        db::loans_of_member(&self.conn, member_id)
    }

    // ========================================================================
    // SCHEDULING & LIFECYCLE
    // ========================================================================

    /// Generate (not persist) a loan's schedule
    ///
    /// Refuses loans that already have persisted entries.
    #[instrument(skip(self))]
    pub fn generate_schedule(
        &self,
        loan_id: i64,
        first_collection_date: Option<&str>,
    ) -> Result<Vec<ScheduleEntry>> {
        db::get_loan(&self.conn, loan_id)?;
        if db::has_schedule(&self.conn, loan_id)? {
            return Err(LedgerError::invalid(format!(
                "loan {} already has a generated schedule",
                loan_id
            )));
        }
        schedule::generate_schedule(loan_id, first_collection_date, &self.config.tier_ladder)
    }

    pub fn save_schedules(&mut self, schedules: &[Vec<ScheduleEntry>]) -> Result<usize> {
        lifecycle::save_schedules(&mut self.conn, schedules, &self.config.tier_ladder)
    }

    pub fn activate_center(&mut self, center_id: i64) -> Result<Activation> {
        lifecycle::activate_center(&mut self.conn, center_id)
    }

    /// Generate schedules for every member's current loan that lacks one,
    /// persist them, then activate the center
    #[instrument(skip(self))]
    pub fn schedule_and_activate(
        &mut self,
        center_id: i64,
        first_collection_date: &str,
    ) -> Result<CenterScheduling> {
        let center = db::get_center(&self.conn, center_id)?;
        let mut schedules = Vec::new();

        for row in reports::active_loans(&mut self.conn, center.id)? {
            if db::has_schedule(&self.conn, row.loan_id)? {
                continue;
            }
            schedules.push(self.generate_schedule(row.loan_id, Some(first_collection_date))?);
        }

        let entries = if schedules.is_empty() {
            0
        } else {
            self.save_schedules(&schedules)?
        };
        let activation = self.activate_center(center_id)?;
        info!(center_id, schedules = schedules.len(), entries, "center scheduled");

        Ok(CenterScheduling {
            center_id,
            schedules: schedules.len(),
            entries,
            activation,
        })
    }

    // ========================================================================
    // COLLECTIONS
    // ========================================================================

    /// Reconcile a batch against its denomination count, then record it
    ///
    /// A mismatch or empty batch is rejected before anything is written.
    /// `timeout` falls back to the configured batch timeout.
    #[instrument(skip(self, entries, denomination), fields(entry_count = entries.len()))]
    pub fn submit_collection_batch(
        &mut self,
        entries: &[PaymentInput],
        denomination: &DenominationBreakdown,
        collected_on: NaiveDate,
        timeout: Option<Duration>,
    ) -> Result<BatchOutcome> {
        let deadline = Instant::now() + timeout.unwrap_or_else(|| self.config.batch_timeout());

        let batch = match denomination::reconcile(denomination, entries, &self.config.denominations)
        {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "batch rejected at denomination gate");
                return Err(e);
            }
        };

        let outcome = collection::record_batch(
            &mut self.conn,
            &batch,
            collected_on,
            self.config.duplicate_policy,
            deadline,
        )?;

        if !outcome.failed.is_empty() {
            warn!(
                batch_id = %outcome.batch_id,
                failed = outcome.failed.len(),
                "batch applied with per-entry failures"
            );
        }
        Ok(outcome)
    }

    // ========================================================================
    // REPORTS
    // ========================================================================

    pub fn daily_total(&mut self, date: NaiveDate) -> Result<i64> {
        reports::daily_total(&mut self.conn, date)
    }

    pub fn unpaid_today(&mut self, date: NaiveDate) -> Result<Vec<UnpaidRow>> {
        reports::unpaid_today(&mut self.conn, date)
    }

    pub fn active_loans(&mut self, center_id: i64) -> Result<Vec<ActiveLoanRow>> {
        reports::active_loans(&mut self.conn, center_id)
    }

    pub fn collection_sheet(
        &mut self,
        center_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<CollectionSheetRow>> {
        reports::collection_sheet(&mut self.conn, center_id, date)
    }

    pub fn loan_schedule(&mut self, loan_id: i64) -> Result<LoanScheduleView> {
        reports::loan_schedule(&mut self.conn, loan_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::LoanStatus;

    fn ledger_with_member() -> (CollectionLedger, i64, i64, i64) {
        let ledger = CollectionLedger::in_memory(LedgerConfig::default()).unwrap();
        let center = ledger.add_center("Kodambakkam").unwrap();
        let member = ledger
            .add_member(center, "Queen", None, Some("9000000000"))
            .unwrap();
        let loan = ledger
            .add_loan(&NewLoan {
                member_id: member,
                amount: 12_000,
                released_date: NaiveDate::from_ymd_opt(2023, 12, 28),
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                repayment_day: Some("Monday".to_string()),
                status: LoanStatus::Credited,
            })
            .unwrap();
        (ledger, center, member, loan)
    }

    #[test]
    fn test_generate_refuses_existing_schedule() {
        let (mut ledger, _center, _member, loan) = ledger_with_member();
        let entries = ledger.generate_schedule(loan, Some("2024-01-01")).unwrap();
        ledger.save_schedules(&[entries]).unwrap();

        assert!(matches!(
            ledger.generate_schedule(loan, Some("2024-01-01")),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_generate_unknown_loan() {
        let (ledger, ..) = ledger_with_member();
        assert!(matches!(
            ledger.generate_schedule(999, Some("2024-01-01")),
            Err(LedgerError::NotFound { entity: "loan", .. })
        ));
    }

    #[test]
    fn test_schedule_and_activate_whole_center() {
        let (mut ledger, center, _member, loan) = ledger_with_member();

        let result = ledger.schedule_and_activate(center, "2024-01-01").unwrap();
        assert_eq!(result.schedules, 1);
        assert_eq!(result.entries, 12);
        assert!(result.activation.activated);

        let view = ledger.loan_schedule(loan).unwrap();
        assert_eq!(view.entries.len(), 12);

        // Second run has nothing to generate and stays active
        let again = ledger.schedule_and_activate(center, "2024-01-01").unwrap();
        assert_eq!(again.schedules, 0);
        assert!(again.activation.already_active);
    }

    #[test]
    fn test_member_details_includes_loans() {
        let (ledger, _center, member, loan) = ledger_with_member();
        let details = ledger.member_details(member).unwrap();

        assert_eq!(details.center_name, "Kodambakkam");
        assert_eq!(details.member.phone.as_deref(), Some("9000000000"));
        assert_eq!(details.loans.len(), 1);
        assert_eq!(details.loans[0].id, loan);
    }

    #[test]
    fn test_rejected_batch_writes_nothing() {
        let (mut ledger, center, member, loan) = ledger_with_member();
        ledger.schedule_and_activate(center, "2024-01-01").unwrap();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let entries = vec![PaymentInput {
            member_id: member,
            loan_id: loan,
            week_no: 1,
            amount: 1100,
        }];
        let short = DenominationBreakdown::from_pairs(&[(500, 2), (50, 1)]);

        let result = ledger.submit_collection_batch(&entries, &short, day, None);
        assert!(matches!(
            result,
            Err(LedgerError::ReconciliationMismatch {
                total_notes: 1050,
                total_payments: 1100
            })
        ));
        assert_eq!(ledger.daily_total(day).unwrap(), 0);
        assert_eq!(ledger.unpaid_today(day).unwrap().len(), 1);
        assert_eq!(db::count_payments(ledger.connection()).unwrap(), 0);
    }
}

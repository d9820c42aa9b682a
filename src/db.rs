use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::entities::{
    Center, CenterFilter, EntryStatus, Loan, LoanStatus, Member, PaymentRecord, ScheduleEntry,
};
use crate::error::{LedgerError, Result};
use crate::schedule::DATE_FORMAT;

/// Event for audit trail, one row per business state change
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL only applies to file-backed databases
    let file_backed = conn.path().map_or(false, |p| !p.is_empty());
    if file_backed {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(journal_mode = %mode, "journal mode set");
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS centers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS members (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            center_id INTEGER NOT NULL REFERENCES centers(id),
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT
        );

        CREATE TABLE IF NOT EXISTS loans (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_id INTEGER NOT NULL REFERENCES members(id),
            amount INTEGER NOT NULL,
            released_date TEXT,
            start_date TEXT,
            repayment_day TEXT,
            status TEXT NOT NULL DEFAULT 'PENDING',
            last_collected TEXT
        );

        -- One row per (loan, week); ordering by week_no is significant
        CREATE TABLE IF NOT EXISTS schedule_entries (
            loan_id INTEGER NOT NULL REFERENCES loans(id),
            week_no INTEGER NOT NULL,
            collection_date TEXT NOT NULL,
            expected_amount INTEGER NOT NULL,
            amount_due INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            PRIMARY KEY (loan_id, week_no)
        );

        CREATE TABLE IF NOT EXISTS collection_batches (
            id TEXT PRIMARY KEY,
            fingerprint TEXT NOT NULL,
            collected_on TEXT NOT NULL,
            total_notes INTEGER NOT NULL,
            total_payments INTEGER NOT NULL,
            denomination TEXT NOT NULL,
            recorded_count INTEGER NOT NULL,
            failed_count INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        -- Append-only
        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            batch_id TEXT NOT NULL REFERENCES collection_batches(id),
            member_id INTEGER NOT NULL,
            loan_id INTEGER NOT NULL,
            week_no INTEGER NOT NULL,
            amount INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'paid',
            collected_on TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_members_center ON members(center_id);
        CREATE INDEX IF NOT EXISTS idx_loans_member ON loans(member_id, status);
        CREATE INDEX IF NOT EXISTS idx_schedule_date ON schedule_entries(collection_date);
        CREATE INDEX IF NOT EXISTS idx_payments_date ON payments(collected_on);
        CREATE INDEX IF NOT EXISTS idx_batches_fingerprint ON collection_batches(fingerprint);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);",
    )?;

    Ok(())
}

pub fn open(path: &Path, busy_timeout: std::time::Duration) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    setup_database(&conn)?;
    info!(path = %path.display(), "database ready");
    Ok(conn)
}

// ============================================================================
// COLUMN HELPERS
// ============================================================================

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_error(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn date_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn opt_date_col(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let text: Option<String> = row.get(idx)?;
    text.filter(|s| !s.is_empty())
        .map(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

fn timestamp_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn entry_status_col(row: &Row, idx: usize) -> rusqlite::Result<EntryStatus> {
    let text: String = row.get(idx)?;
    EntryStatus::parse(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown entry status '{}'", text).into(),
        )
    })
}

// ============================================================================
// CENTERS / MEMBERS / LOANS
// ============================================================================

fn center_from_row(row: &Row) -> rusqlite::Result<Center> {
    Ok(Center {
        id: row.get(0)?,
        name: row.get(1)?,
        is_active: row.get(2)?,
        created_at: Some(timestamp_col(row, 3)?),
    })
}

pub fn insert_center(conn: &Connection, name: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::invalid("center name is required"));
    }
    conn.execute(
        "INSERT INTO centers (name, is_active, created_at) VALUES (?1, 0, ?2)",
        params![name, Utc::now().to_rfc3339()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_center_by_name(conn: &Connection, name: &str) -> Result<Option<Center>> {
    let center = conn
        .query_row(
            "SELECT id, name, is_active, created_at FROM centers WHERE name = ?1",
            [name.trim()],
            center_from_row,
        )
        .optional()?;
    Ok(center)
}

pub fn get_center(conn: &Connection, center_id: i64) -> Result<Center> {
    conn.query_row(
        "SELECT id, name, is_active, created_at FROM centers WHERE id = ?1",
        [center_id],
        center_from_row,
    )
    .optional()?
    .ok_or(LedgerError::NotFound {
        entity: "center",
        id: center_id,
    })
}

pub fn list_centers(conn: &Connection, filter: CenterFilter) -> Result<Vec<Center>> {
    let mut stmt =
        conn.prepare("SELECT id, name, is_active, created_at FROM centers ORDER BY name")?;
    let centers = stmt
        .query_map([], center_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(centers.into_iter().filter(|c| filter.admits(c)).collect())
}

/// One-way flag flip; returns false if the center was already active
pub fn set_center_active(conn: &Connection, center_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE centers SET is_active = 1 WHERE id = ?1 AND is_active = 0",
        [center_id],
    )?;
    Ok(changed > 0)
}

fn member_from_row(row: &Row) -> rusqlite::Result<Member> {
    Ok(Member {
        id: row.get(0)?,
        center_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
    })
}

pub fn insert_member(
    conn: &Connection,
    center_id: i64,
    name: &str,
    email: Option<&str>,
    phone: Option<&str>,
) -> Result<i64> {
    if name.trim().is_empty() {
        return Err(LedgerError::invalid("member name is required"));
    }
    get_center(conn, center_id)?;
    conn.execute(
        "INSERT INTO members (center_id, name, email, phone) VALUES (?1, ?2, ?3, ?4)",
        params![center_id, name.trim(), email, phone],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_member(conn: &Connection, member_id: i64) -> Result<Member> {
    conn.query_row(
        "SELECT id, center_id, name, email, phone FROM members WHERE id = ?1",
        [member_id],
        member_from_row,
    )
    .optional()?
    .ok_or(LedgerError::NotFound {
        entity: "member",
        id: member_id,
    })
}

pub fn members_of_center(conn: &Connection, center_id: i64) -> Result<Vec<Member>> {
    let mut stmt = conn.prepare(
        "SELECT id, center_id, name, email, phone FROM members
         WHERE center_id = ?1
         ORDER BY name, id",
    )?;
    let members = stmt
        .query_map([center_id], member_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(members)
}

const LOAN_COLUMNS: &str =
    "id, member_id, amount, released_date, start_date, repayment_day, status, last_collected";

fn loan_from_row(row: &Row) -> rusqlite::Result<Loan> {
    let status: String = row.get(6)?;
    Ok(Loan {
        id: row.get(0)?,
        member_id: row.get(1)?,
        amount: row.get(2)?,
        released_date: opt_date_col(row, 3)?,
        start_date: opt_date_col(row, 4)?,
        repayment_day: row.get(5)?,
        status: LoanStatus::parse(&status),
        last_collected: opt_date_col(row, 7)?,
    })
}

/// Loan fields supplied when registering a disbursement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLoan {
    pub member_id: i64,
    pub amount: i64,
    pub released_date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub repayment_day: Option<String>,
    pub status: LoanStatus,
}

pub fn insert_loan(conn: &Connection, loan: &NewLoan) -> Result<i64> {
    if loan.amount <= 0 {
        return Err(LedgerError::invalid(format!(
            "loan amount must be positive, got {}",
            loan.amount
        )));
    }
    get_member(conn, loan.member_id)?;
    conn.execute(
        "INSERT INTO loans (member_id, amount, released_date, start_date, repayment_day, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            loan.member_id,
            loan.amount,
            loan.released_date.map(format_date),
            loan.start_date.map(format_date),
            loan.repayment_day,
            loan.status.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_loan(conn: &Connection, loan_id: i64) -> Result<Loan> {
    conn.query_row(
        &format!("SELECT {} FROM loans WHERE id = ?1", LOAN_COLUMNS),
        [loan_id],
        loan_from_row,
    )
    .optional()?
    .ok_or(LedgerError::NotFound {
        entity: "loan",
        id: loan_id,
    })
}

pub fn loans_of_member(conn: &Connection, member_id: i64) -> Result<Vec<Loan>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM loans WHERE member_id = ?1
         ORDER BY released_date IS NULL, released_date DESC, id DESC",
        LOAN_COLUMNS
    ))?;
    let loans = stmt
        .query_map([member_id], loan_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(loans)
}

/// The member's current loan: most recent CREDITED by released_date, then id
pub fn current_loan(conn: &Connection, member_id: i64) -> Result<Option<Loan>> {
    let loan = conn
        .query_row(
            &format!(
                "SELECT {} FROM loans
                 WHERE member_id = ?1 AND status = 'CREDITED'
                 ORDER BY released_date IS NULL, released_date DESC, id DESC
                 LIMIT 1",
                LOAN_COLUMNS
            ),
            [member_id],
            loan_from_row,
        )
        .optional()?;
    Ok(loan)
}

pub fn set_last_collected(conn: &Connection, loan_id: i64, collected_on: NaiveDate) -> Result<()> {
    conn.execute(
        "UPDATE loans SET last_collected = ?1 WHERE id = ?2",
        params![format_date(collected_on), loan_id],
    )?;
    Ok(())
}

// ============================================================================
// SCHEDULE ENTRIES
// ============================================================================

const ENTRY_COLUMNS: &str = "loan_id, week_no, collection_date, expected_amount, amount_due, status";

fn entry_from_row(row: &Row) -> rusqlite::Result<ScheduleEntry> {
    Ok(ScheduleEntry {
        loan_id: row.get(0)?,
        week_no: row.get(1)?,
        collection_date: date_col(row, 2)?,
        expected_amount: row.get(3)?,
        amount_due: row.get(4)?,
        status: entry_status_col(row, 5)?,
    })
}

pub fn has_schedule(conn: &Connection, loan_id: i64) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM schedule_entries WHERE loan_id = ?1",
        [loan_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_schedule_entry(conn: &Connection, entry: &ScheduleEntry) -> Result<()> {
    let result = conn.execute(
        "INSERT INTO schedule_entries
            (loan_id, week_no, collection_date, expected_amount, amount_due, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.loan_id,
            entry.week_no,
            format_date(entry.collection_date),
            entry.expected_amount,
            entry.amount_due,
            entry.status.as_str(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(LedgerError::invalid(format!(
                "loan {} already has week {} scheduled (or the loan does not exist)",
                entry.loan_id, entry.week_no
            )))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_schedule_entry(
    conn: &Connection,
    loan_id: i64,
    week_no: u32,
) -> Result<Option<ScheduleEntry>> {
    let entry = conn
        .query_row(
            &format!(
                "SELECT {} FROM schedule_entries WHERE loan_id = ?1 AND week_no = ?2",
                ENTRY_COLUMNS
            ),
            params![loan_id, week_no],
            entry_from_row,
        )
        .optional()?;
    Ok(entry)
}

pub fn update_schedule_entry(conn: &Connection, entry: &ScheduleEntry) -> Result<()> {
    conn.execute(
        "UPDATE schedule_entries SET amount_due = ?1, status = ?2
         WHERE loan_id = ?3 AND week_no = ?4",
        params![
            entry.amount_due,
            entry.status.as_str(),
            entry.loan_id,
            entry.week_no
        ],
    )?;
    Ok(())
}

pub fn schedule_for_loan(conn: &Connection, loan_id: i64) -> Result<Vec<ScheduleEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM schedule_entries WHERE loan_id = ?1 ORDER BY week_no",
        ENTRY_COLUMNS
    ))?;
    let entries = stmt
        .query_map([loan_id], entry_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

pub fn count_schedule_entries(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM schedule_entries", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// PAYMENTS & BATCHES
// ============================================================================

/// Header row written once per accepted batch
#[derive(Debug, Clone)]
pub struct BatchRow<'a> {
    pub id: &'a str,
    pub fingerprint: &'a str,
    pub collected_on: NaiveDate,
    pub total_notes: i64,
    pub total_payments: i64,
    pub denomination_json: &'a str,
    pub recorded_count: usize,
    pub failed_count: usize,
}

pub fn insert_batch(conn: &Connection, batch: &BatchRow) -> Result<()> {
    conn.execute(
        "INSERT INTO collection_batches
            (id, fingerprint, collected_on, total_notes, total_payments,
             denomination, recorded_count, failed_count, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            batch.id,
            batch.fingerprint,
            format_date(batch.collected_on),
            batch.total_notes,
            batch.total_payments,
            batch.denomination_json,
            batch.recorded_count as i64,
            batch.failed_count as i64,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn batches_with_fingerprint(conn: &Connection, fingerprint: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM collection_batches WHERE fingerprint = ?1 ORDER BY created_at",
    )?;
    let ids = stmt
        .query_map([fingerprint], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
}

pub fn insert_payment(
    conn: &Connection,
    batch_id: &str,
    member_id: i64,
    loan_id: i64,
    week_no: u32,
    amount: i64,
    collected_on: NaiveDate,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO payments
            (batch_id, member_id, loan_id, week_no, amount, status, collected_on, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            batch_id,
            member_id,
            loan_id,
            week_no,
            amount,
            EntryStatus::Paid.as_str(),
            format_date(collected_on),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn payment_from_row(row: &Row) -> rusqlite::Result<PaymentRecord> {
    Ok(PaymentRecord {
        id: row.get(0)?,
        batch_id: row.get(1)?,
        member_id: row.get(2)?,
        loan_id: row.get(3)?,
        week_no: row.get(4)?,
        amount: row.get(5)?,
        status: entry_status_col(row, 6)?,
        collected_on: date_col(row, 7)?,
        recorded_at: timestamp_col(row, 8)?,
    })
}

pub fn payments_for_loan(conn: &Connection, loan_id: i64) -> Result<Vec<PaymentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, batch_id, member_id, loan_id, week_no, amount, status, collected_on, recorded_at
         FROM payments WHERE loan_id = ?1 ORDER BY id",
    )?;
    let payments = stmt
        .query_map([loan_id], payment_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(payments)
}

pub fn count_payments(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM payments", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: timestamp_col(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(events)
}

// ============================================================================
// ROSTER IMPORT (CSV)
// ============================================================================

/// One CSV line: a member and their loan, grouped by center name
#[derive(Debug, Deserialize, Clone)]
pub struct RosterRow {
    pub center_name: String,
    pub member_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub loan_amount: i64,
    #[serde(default)]
    pub released_date: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub repayment_day: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub centers_created: usize,
    pub members_created: usize,
    pub loans_created: usize,
}

pub fn load_roster_csv(csv_path: &Path) -> anyhow::Result<Vec<RosterRow>> {
    use anyhow::Context;

    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open roster CSV")?;
    let mut rows = Vec::new();

    for result in rdr.deserialize() {
        let row: RosterRow = result.context("Failed to deserialize roster row")?;
        rows.push(row);
    }

    Ok(rows)
}

fn optional_date(value: &Option<String>) -> Result<Option<NaiveDate>> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => crate::schedule::parse_date(text).map(Some),
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Insert roster rows in one transaction. Centers are matched by name,
/// members by (center, name).
pub fn import_roster(conn: &mut Connection, rows: &[RosterRow]) -> Result<ImportSummary> {
    let tx = conn.transaction()?;
    let mut summary = ImportSummary::default();

    for row in rows {
        let center_id = match find_center_by_name(&tx, &row.center_name)? {
            Some(center) => center.id,
            None => {
                summary.centers_created += 1;
                insert_center(&tx, &row.center_name)?
            }
        };

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM members WHERE center_id = ?1 AND name = ?2",
                params![center_id, row.member_name.trim()],
                |r| r.get(0),
            )
            .optional()?;
        let member_id = match existing {
            Some(id) => id,
            None => {
                summary.members_created += 1;
                insert_member(
                    &tx,
                    center_id,
                    &row.member_name,
                    non_empty(&row.email),
                    non_empty(&row.phone),
                )?
            }
        };

        let loan = NewLoan {
            member_id,
            amount: row.loan_amount,
            released_date: optional_date(&row.released_date)?,
            start_date: optional_date(&row.start_date)?,
            repayment_day: non_empty(&row.repayment_day).map(str::to_string),
            status: non_empty(&row.status)
                .map(LoanStatus::parse)
                .unwrap_or(LoanStatus::Pending),
        };
        insert_loan(&tx, &loan)?;
        summary.loans_created += 1;
    }

    tx.commit()?;

    if summary.loans_created == 0 {
        warn!("roster import contained no rows");
    }
    info!(
        centers = summary.centers_created,
        members = summary.members_created,
        loans = summary.loans_created,
        "roster imported"
    );

    Ok(summary)
}

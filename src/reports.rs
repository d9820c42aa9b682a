// 📊 Reporting Aggregator - read-only views over the ledger
//
// Every report runs inside a single read transaction, so it observes one
// consistent prefix of committed batches.

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::db::{self, format_date};
use crate::entities::ScheduleEntry;
use crate::error::Result;

// ============================================================================
// ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpaidRow {
    pub center_name: String,
    pub member_name: String,
    pub loan_id: i64,
    pub week_no: u32,
    pub expected_amount: i64,
    pub paid_amount: i64,
    pub amount_due: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveLoanRow {
    pub member_id: i64,
    pub name: String,
    pub loan_id: i64,
    pub status: String,
}

/// One line of the sheet a field worker collects against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSheetRow {
    pub member_id: i64,
    pub name: String,
    pub loan_id: i64,
    pub week_no: u32,
    pub collection_date: NaiveDate,
    pub expected_amount: i64,
    pub amount_due: i64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanScheduleView {
    pub loan_id: i64,
    pub entries: Vec<ScheduleEntry>,
    pub total_expected: i64,
    pub total_due: i64,
    pub weeks_paid: usize,
}

/// Read snapshot: a deferred transaction that is never written to
fn snapshot<T, F>(conn: &mut Connection, read: F) -> Result<T>
where
    F: FnOnce(&Connection) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = read(&tx)?;
    tx.finish()?;
    Ok(value)
}

// ============================================================================
// DAILY TOTAL
// ============================================================================

/// Σ amount of payments collected on `today`; 0 when nothing was collected
pub fn daily_total(conn: &mut Connection, today: NaiveDate) -> Result<i64> {
    snapshot(conn, |c| {
        let total: i64 = c.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE collected_on = ?1",
            [format_date(today)],
            |row| row.get(0),
        )?;
        Ok(total)
    })
}

// ============================================================================
// UNPAID TODAY
// ============================================================================

fn unpaid_from_row(row: &Row) -> rusqlite::Result<UnpaidRow> {
    let expected_amount: i64 = row.get(4)?;
    let amount_due: i64 = row.get(5)?;
    Ok(UnpaidRow {
        center_name: row.get(0)?,
        member_name: row.get(1)?,
        loan_id: row.get(2)?,
        week_no: row.get(3)?,
        expected_amount,
        paid_amount: expected_amount - amount_due,
        amount_due,
    })
}

/// Entries due on `today` that are not settled, ordered by center then member
pub fn unpaid_today(conn: &mut Connection, today: NaiveDate) -> Result<Vec<UnpaidRow>> {
    snapshot(conn, |c| {
        let mut stmt = c.prepare(
            "SELECT c.name, m.name, s.loan_id, s.week_no, s.expected_amount, s.amount_due
             FROM schedule_entries s
             JOIN loans l ON l.id = s.loan_id
             JOIN members m ON m.id = l.member_id
             JOIN centers c ON c.id = m.center_id
             WHERE s.collection_date = ?1
               AND (s.status != 'paid' OR s.amount_due > 0)
             ORDER BY c.name, m.name, s.loan_id",
        )?;
        let rows = stmt
            .query_map([format_date(today)], unpaid_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    })
}

// ============================================================================
// ACTIVE LOANS
// ============================================================================

/// Each member's most recent CREDITED loan; members without one are omitted
///
/// Ties between several CREDITED loans go to the latest released_date, then
/// the highest loan id.
pub fn active_loans(conn: &mut Connection, center_id: i64) -> Result<Vec<ActiveLoanRow>> {
    snapshot(conn, |c| query_active_loans(c, center_id))
}

fn query_active_loans(c: &Connection, center_id: i64) -> Result<Vec<ActiveLoanRow>> {
    db::get_center(c, center_id)?;
    let mut stmt = c.prepare(
        "SELECT member_id, name, loan_id, status FROM (
            SELECT m.id AS member_id, m.name AS name, l.id AS loan_id, l.status AS status,
                   ROW_NUMBER() OVER (
                       PARTITION BY m.id
                       ORDER BY l.released_date IS NULL, l.released_date DESC, l.id DESC
                   ) AS pick
            FROM members m
            JOIN loans l ON l.member_id = m.id
            WHERE m.center_id = ?1 AND l.status = 'CREDITED'
         )
         WHERE pick = 1
         ORDER BY name, member_id",
    )?;
    let rows = stmt
        .query_map([center_id], |row| {
            Ok(ActiveLoanRow {
                member_id: row.get(0)?,
                name: row.get(1)?,
                loan_id: row.get(2)?,
                status: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ============================================================================
// COLLECTION SHEET / LOAN SCHEDULE
// ============================================================================

/// For a center and date: each current loan's entry due that day
pub fn collection_sheet(
    conn: &mut Connection,
    center_id: i64,
    date: NaiveDate,
) -> Result<Vec<CollectionSheetRow>> {
    snapshot(conn, |c| {
        let mut rows = Vec::new();
        for loan in query_active_loans(c, center_id)? {
            let entry: Option<(u32, i64, i64, String)> = c
                .query_row(
                    "SELECT week_no, expected_amount, amount_due, status
                     FROM schedule_entries
                     WHERE loan_id = ?1 AND collection_date = ?2",
                    params![loan.loan_id, format_date(date)],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
                )
                .optional()?;

            if let Some((week_no, expected_amount, amount_due, status)) = entry {
                rows.push(CollectionSheetRow {
                    member_id: loan.member_id,
                    name: loan.name,
                    loan_id: loan.loan_id,
                    week_no,
                    collection_date: date,
                    expected_amount,
                    amount_due,
                    status,
                });
            }
        }
        Ok(rows)
    })
}

pub fn loan_schedule(conn: &mut Connection, loan_id: i64) -> Result<LoanScheduleView> {
    snapshot(conn, |c| {
        db::get_loan(c, loan_id)?;
        let entries = db::schedule_for_loan(c, loan_id)?;
        Ok(LoanScheduleView {
            loan_id,
            total_expected: entries.iter().map(|e| e.expected_amount).sum(),
            total_due: entries.iter().map(|e| e.amount_due).sum(),
            weeks_paid: entries.iter().filter(|e| !e.is_outstanding()).count(),
            entries,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{insert_center, insert_loan, insert_member, insert_schedule_entry, setup_database, NewLoan};
    use crate::entities::{EntryStatus, LoanStatus};
    use crate::schedule::{schedule_from, TierLadder};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn loan(conn: &Connection, member_id: i64, status: LoanStatus, released: NaiveDate) -> i64 {
        insert_loan(
            conn,
            &NewLoan {
                member_id,
                amount: 12_000,
                released_date: Some(released),
                start_date: None,
                repayment_day: None,
                status,
            },
        )
        .unwrap()
    }

    fn schedule(conn: &Connection, loan_id: i64, first: NaiveDate) {
        for entry in schedule_from(loan_id, first, &TierLadder::default()) {
            insert_schedule_entry(conn, &entry).unwrap();
        }
    }

    #[test]
    fn test_daily_total_is_zero_without_activity() {
        let mut conn = test_conn();
        assert_eq!(daily_total(&mut conn, date(2024, 1, 1)).unwrap(), 0);
    }

    #[test]
    fn test_unpaid_today_orders_by_center_then_member() {
        let mut conn = test_conn();
        let north = insert_center(&conn, "North").unwrap();
        let east = insert_center(&conn, "East").unwrap();
        let zara = insert_member(&conn, north, "Zara", None, None).unwrap();
        let anu = insert_member(&conn, north, "Anu", None, None).unwrap();
        let bala = insert_member(&conn, east, "Bala", None, None).unwrap();

        let first = date(2024, 1, 1);
        for member in [zara, anu, bala] {
            let loan_id = loan(&conn, member, LoanStatus::Credited, date(2023, 12, 1));
            schedule(&conn, loan_id, first);
        }

        // Anu settles week 1 in full
        conn.execute(
            "UPDATE schedule_entries SET status = 'paid', amount_due = 0
             WHERE loan_id = (SELECT id FROM loans WHERE member_id = ?1) AND week_no = 1",
            [anu],
        )
        .unwrap();

        let rows = unpaid_today(&mut conn, first).unwrap();
        let names: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.center_name.as_str(), r.member_name.as_str()))
            .collect();
        assert_eq!(names, vec![("East", "Bala"), ("North", "Zara")]);
        assert_eq!(rows[0].expected_amount, 1100);
        assert_eq!(rows[0].paid_amount, 0);
        assert_eq!(rows[0].amount_due, 1100);

        assert!(unpaid_today(&mut conn, date(2024, 1, 2)).unwrap().is_empty());
    }

    #[test]
    fn test_partially_paid_entry_stays_unpaid() {
        let mut conn = test_conn();
        let center = insert_center(&conn, "South").unwrap();
        let member = insert_member(&conn, center, "Deepa", None, None).unwrap();
        let loan_id = loan(&conn, member, LoanStatus::Credited, date(2023, 12, 1));
        schedule(&conn, loan_id, date(2024, 1, 1));

        conn.execute(
            "UPDATE schedule_entries SET status = ?1, amount_due = 300 WHERE loan_id = ?2 AND week_no = 1",
            params![EntryStatus::Paid.as_str(), loan_id],
        )
        .unwrap();

        let rows = unpaid_today(&mut conn, date(2024, 1, 1)).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].paid_amount, 800);
        assert_eq!(rows[0].amount_due, 300);
    }

    #[test]
    fn test_active_loans_picks_one_credited_loan_per_member() {
        let mut conn = test_conn();
        let center = insert_center(&conn, "West").unwrap();
        let gita = insert_member(&conn, center, "Gita", None, None).unwrap();
        let hema = insert_member(&conn, center, "Hema", None, None).unwrap();
        let indu = insert_member(&conn, center, "Indu", None, None).unwrap();

        loan(&conn, gita, LoanStatus::Credited, date(2023, 1, 1));
        let gita_latest = loan(&conn, gita, LoanStatus::Credited, date(2024, 1, 1));
        loan(&conn, gita, LoanStatus::Closed, date(2024, 6, 1));
        let hema_loan = loan(&conn, hema, LoanStatus::Credited, date(2024, 2, 1));
        loan(&conn, indu, LoanStatus::Pending, date(2024, 2, 1));

        let rows = active_loans(&mut conn, center).unwrap();
        assert_eq!(
            rows,
            vec![
                ActiveLoanRow {
                    member_id: gita,
                    name: "Gita".to_string(),
                    loan_id: gita_latest,
                    status: "CREDITED".to_string(),
                },
                ActiveLoanRow {
                    member_id: hema,
                    name: "Hema".to_string(),
                    loan_id: hema_loan,
                    status: "CREDITED".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_active_loans_same_release_date_prefers_newer_id() {
        let mut conn = test_conn();
        let center = insert_center(&conn, "Central").unwrap();
        let member = insert_member(&conn, center, "Jaya", None, None).unwrap();
        loan(&conn, member, LoanStatus::Credited, date(2024, 1, 1));
        let second = loan(&conn, member, LoanStatus::Credited, date(2024, 1, 1));

        let rows = active_loans(&mut conn, center).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].loan_id, second);
    }

    #[test]
    fn test_collection_sheet_lists_todays_entries() {
        let mut conn = test_conn();
        let center = insert_center(&conn, "Harbour").unwrap();
        let kala = insert_member(&conn, center, "Kala", None, None).unwrap();
        let lata = insert_member(&conn, center, "Lata", None, None).unwrap();
        let kala_loan = loan(&conn, kala, LoanStatus::Credited, date(2023, 12, 1));
        let lata_loan = loan(&conn, lata, LoanStatus::Credited, date(2023, 12, 1));
        schedule(&conn, kala_loan, date(2024, 1, 1));
        schedule(&conn, lata_loan, date(2024, 1, 3));

        let sheet = collection_sheet(&mut conn, center, date(2024, 1, 29)).unwrap();
        assert_eq!(sheet.len(), 1);
        assert_eq!(sheet[0].name, "Kala");
        assert_eq!(sheet[0].week_no, 5);
        assert_eq!(sheet[0].expected_amount, 1080);
    }

    #[test]
    fn test_loan_schedule_totals() {
        let mut conn = test_conn();
        let center = insert_center(&conn, "Lake").unwrap();
        let member = insert_member(&conn, center, "Malar", None, None).unwrap();
        let loan_id = loan(&conn, member, LoanStatus::Credited, date(2023, 12, 1));
        schedule(&conn, loan_id, date(2024, 1, 1));

        let view = loan_schedule(&mut conn, loan_id).unwrap();
        assert_eq!(view.entries.len(), 12);
        assert_eq!(view.total_expected, 13_000);
        assert_eq!(view.total_due, 13_000);
        assert_eq!(view.weeks_paid, 0);
    }
}

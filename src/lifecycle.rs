// 🔁 Center Lifecycle Controller - INACTIVE → ACTIVE, once
//
// A center may only activate after every member's current loan has a
// persisted schedule. Schedules are saved first, in their own transaction;
// activation then re-checks the store, never the caller's draft.

use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{self, Event};
use crate::entities::{CenterState, ScheduleEntry};
use crate::error::{LedgerError, MemberRef, Result};
use crate::schedule::{validate_schedule, TierLadder};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Activation {
    pub center_id: i64,
    pub activated: bool,
    /// The center was already ACTIVE; nothing changed
    pub already_active: bool,
    pub state: CenterState,
}

/// Persist generated schedules, all or nothing
///
/// Every schedule is validated against the ladder before anything is
/// written; a (loan_id, week_no) that already exists rolls back the whole save.
pub fn save_schedules(
    conn: &mut Connection,
    schedules: &[Vec<ScheduleEntry>],
    ladder: &TierLadder,
) -> Result<usize> {
    if schedules.is_empty() {
        return Err(LedgerError::invalid("no schedules to save"));
    }
    for schedule in schedules {
        validate_schedule(schedule, ladder)?;
    }

    let tx = conn.transaction()?;
    let mut saved = 0usize;

    for schedule in schedules {
        let loan_id = schedule[0].loan_id;
        db::get_loan(&tx, loan_id)?;
        if db::has_schedule(&tx, loan_id)? {
            return Err(LedgerError::invalid(format!(
                "loan {} already has a schedule",
                loan_id
            )));
        }
        for entry in schedule {
            db::insert_schedule_entry(&tx, entry)?;
            saved += 1;
        }
        db::insert_event(
            &tx,
            &Event::new(
                "schedule_saved",
                "loan",
                &loan_id.to_string(),
                serde_json::json!({
                    "weeks": schedule.len(),
                    "first_collection_date": db::format_date(schedule[0].collection_date),
                }),
                "lifecycle_controller",
            ),
        )?;
    }

    tx.commit()?;
    info!(loans = schedules.len(), entries = saved, "schedules saved");
    Ok(saved)
}

/// Members of a center whose current loan has no persisted schedule
///
/// A member with no CREDITED loan counts as missing: there is nothing to
/// collect against.
pub fn members_missing_schedule(conn: &Connection, center_id: i64) -> Result<Vec<MemberRef>> {
    let mut missing = Vec::new();
    for member in db::members_of_center(conn, center_id)? {
        let scheduled = match db::current_loan(conn, member.id)? {
            Some(loan) => db::has_schedule(conn, loan.id)?,
            None => false,
        };
        if !scheduled {
            missing.push(member.member_ref());
        }
    }
    Ok(missing)
}

/// Flip a center to ACTIVE once its members' schedules are persisted
///
/// Idempotent: activating an active center succeeds without change.
pub fn activate_center(conn: &mut Connection, center_id: i64) -> Result<Activation> {
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
    let center = db::get_center(&tx, center_id)?;

    if center.is_active {
        tx.finish()?;
        return Ok(Activation {
            center_id,
            activated: true,
            already_active: true,
            state: CenterState::Active,
        });
    }

    if db::members_of_center(&tx, center_id)?.is_empty() {
        warn!(center_id, "center has no members, refusing activation");
        return Err(LedgerError::ActivationPrecondition {
            center_id,
            missing: Vec::new(),
        });
    }

    let missing = members_missing_schedule(&tx, center_id)?;
    if !missing.is_empty() {
        warn!(center_id, missing = missing.len(), "activation blocked by unscheduled members");
        return Err(LedgerError::ActivationPrecondition { center_id, missing });
    }

    db::set_center_active(&tx, center_id)?;
    db::insert_event(
        &tx,
        &Event::new(
            "center_activated",
            "center",
            &center_id.to_string(),
            serde_json::json!({ "name": center.name }),
            "lifecycle_controller",
        ),
    )?;
    tx.commit()?;

    info!(center_id, name = %center.name, "center activated");
    Ok(Activation {
        center_id,
        activated: true,
        already_active: false,
        state: CenterState::Active,
    })
}

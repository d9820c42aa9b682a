// Entity Models
//
// Plain data shapes for the ledger. Identity is the integer row id assigned
// by the store; schedule entries are identified by (loan_id, week_no).

pub mod center;
pub mod member;
pub mod loan;
pub mod schedule_entry;
pub mod payment;

pub use center::{Center, CenterFilter, CenterState};
pub use member::Member;
pub use loan::{Loan, LoanStatus};
pub use schedule_entry::{EntryStatus, ScheduleEntry};
pub use payment::{PaymentInput, PaymentRecord};

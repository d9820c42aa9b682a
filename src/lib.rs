// Center Collections - Core Library
// Group-loan repayment scheduling and cash collection reconciliation.
// Exposes all modules for use in CLI, API server, and tests

pub mod error;
pub mod config;
pub mod entities;
pub mod db;
pub mod schedule;       // Schedule Generator - weekly tiered plan
pub mod denomination;   // Denomination Reconciler - notes must equal payments
pub mod collection;     // Collection Recorder - apply batches to the schedule
pub mod reports;        // Reporting Aggregator - daily / unpaid / active loans
pub mod lifecycle;      // Center Lifecycle Controller - INACTIVE → ACTIVE
pub mod service;

// Re-export commonly used types
pub use error::{LedgerError, MemberRef, Result};
pub use config::LedgerConfig;
pub use entities::{
    Center, CenterFilter, CenterState,
    Member,
    Loan, LoanStatus,
    ScheduleEntry, EntryStatus,
    PaymentInput, PaymentRecord,
};
pub use db::{
    Event, NewLoan, RosterRow, ImportSummary,
    setup_database, insert_event, get_events_for_entity, load_roster_csv,
};
pub use schedule::{Tier, TierLadder, generate_schedule, validate_schedule};
pub use denomination::{
    BatchTotals, DenominationBreakdown, ReconciledBatch, NOTE_VALUES, reconcile,
};
pub use collection::{BatchOutcome, DuplicatePolicy, FailedEntry, record_batch};
pub use reports::{ActiveLoanRow, CollectionSheetRow, LoanScheduleView, UnpaidRow};
pub use lifecycle::Activation;
pub use service::{CenterScheduling, CollectionLedger, MemberDetails};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

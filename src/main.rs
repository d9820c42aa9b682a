use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use center_collections::schedule::parse_date;
use center_collections::{
    CenterFilter, CollectionLedger, DenominationBreakdown, LedgerConfig, LedgerError,
    PaymentInput, ScheduleEntry,
};

#[derive(Parser)]
#[command(name = "center-collections")]
#[command(about = "Weekly group-loan schedules and cash collection reconciliation", long_about = None)]
struct Cli {
    /// JSON config file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database path, overrides config and COLLECTIONS_DB
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum FilterArg {
    All,
    Active,
    Inactive,
}

impl From<FilterArg> for CenterFilter {
    fn from(arg: FilterArg) -> Self {
        match arg {
            FilterArg::All => CenterFilter::All,
            FilterArg::Active => CenterFilter::Active,
            FilterArg::Inactive => CenterFilter::Inactive,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    InitDb,
    /// Import centers, members and loans from a CSV file
    ImportRoster {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List centers
    Centers {
        #[arg(long, value_enum, default_value_t = FilterArg::All)]
        filter: FilterArg,
    },
    /// Members of a center with their current CREDITED loan
    Members {
        #[arg(long)]
        center: i64,
    },
    /// Member details and loan history
    Member {
        #[arg(long)]
        id: i64,
    },
    /// Draft schedules for a center into a local file (nothing is saved)
    Draft {
        #[arg(long)]
        center: i64,
        /// First collection date, YYYY-MM-DD
        #[arg(long)]
        date: String,
        #[arg(long, default_value = "draft.json")]
        out: PathBuf,
    },
    /// Save a drafted schedule file and activate its center
    SaveDraft {
        #[arg(long, default_value = "draft.json")]
        draft: PathBuf,
    },
    /// Activate a center whose schedules are already saved
    Activate {
        #[arg(long)]
        center: i64,
    },
    /// Show a loan's repayment schedule
    Schedule {
        #[arg(long)]
        loan: i64,
    },
    /// Entries due at a center on a date
    Sheet {
        #[arg(long)]
        center: i64,
        #[arg(long)]
        date: Option<String>,
    },
    /// Submit a collection batch from a JSON file
    Pay {
        #[arg(long)]
        batch: PathBuf,
        /// Collection date, defaults to today
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Total collected on a date
    Daily {
        #[arg(long)]
        date: Option<String>,
    },
    /// Members still owing for a date
    Unpaid {
        #[arg(long)]
        date: Option<String>,
    },
}

// ============================================================================
// DRAFT SCHEDULE (held by this tool, never by the ledger)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct DraftMember {
    member_id: i64,
    name: String,
    loan_id: i64,
    schedule: Vec<ScheduleEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DraftSchedule {
    center_id: i64,
    first_collection_date: String,
    members: Vec<DraftMember>,
}

impl DraftSchedule {
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read draft {}", path.display()))?;
        serde_json::from_str(&text).context("draft file is not a valid schedule draft")
    }

    fn store(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("failed to write draft {}", path.display()))
    }
}

/// Payload shape accepted by `pay`, same as the HTTP pay-batch body
#[derive(Debug, Deserialize)]
struct BatchFile {
    collection: Vec<PaymentInput>,
    denomination: DenominationBreakdown,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn date_or_today(value: Option<&str>) -> Result<NaiveDate> {
    match value {
        Some(text) => Ok(parse_date(text)?),
        None => Ok(Utc::now().date_naive()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    let mut config = LedgerConfig::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    let mut ledger = CollectionLedger::open(config).context("failed to open database")?;

    match cli.command {
        Commands::InitDb => {
            println!("✓ Schema ready at {}", ledger.config().database_path.display());
        }
        Commands::ImportRoster { csv } => {
            let summary = ledger.import_roster_csv(&csv)?;
            println!(
                "✓ Imported {} loans ({} new centers, {} new members) from {}",
                summary.loans_created,
                summary.centers_created,
                summary.members_created,
                csv.display()
            );
        }
        Commands::Centers { filter } => {
            print_json(&ledger.list_centers(filter.into())?)?;
        }
        Commands::Members { center } => {
            print_json(&ledger.active_loans(center)?)?;
        }
        Commands::Member { id } => {
            print_json(&ledger.member_details(id)?)?;
        }
        Commands::Draft { center, date, out } => {
            let mut members = Vec::new();
            for row in ledger.active_loans(center)? {
                let schedule = ledger.generate_schedule(row.loan_id, Some(&date))?;
                members.push(DraftMember {
                    member_id: row.member_id,
                    name: row.name,
                    loan_id: row.loan_id,
                    schedule,
                });
            }
            if members.is_empty() {
                bail!("center {} has no members with a CREDITED loan to schedule", center);
            }

            let draft = DraftSchedule {
                center_id: center,
                first_collection_date: date,
                members,
            };
            draft.store(&out)?;
            println!(
                "✓ Drafted {} schedules to {} (not saved yet)",
                draft.members.len(),
                out.display()
            );
        }
        Commands::SaveDraft { draft: path } => {
            let draft = DraftSchedule::load(&path)?;
            if let Some(m) = draft.members.iter().find(|m| m.schedule.is_empty()) {
                bail!("member {} has no generated schedule in the draft", m.name);
            }

            let schedules: Vec<Vec<ScheduleEntry>> =
                draft.members.into_iter().map(|m| m.schedule).collect();
            let saved = ledger.save_schedules(&schedules)?;
            let activation = ledger.activate_center(draft.center_id)?;

            std::fs::remove_file(&path)
                .with_context(|| format!("saved, but failed to remove draft {}", path.display()))?;
            println!(
                "✓ Saved {} schedule entries, center {} active: {}",
                saved, draft.center_id, activation.activated
            );
        }
        Commands::Activate { center } => match ledger.activate_center(center) {
            Ok(activation) => print_json(&activation)?,
            Err(LedgerError::ActivationPrecondition { missing, .. }) => {
                eprintln!("❌ Center {} cannot activate. Members without a schedule:", center);
                for m in &missing {
                    eprintln!("   - {} (member {})", m.name, m.member_id);
                }
                std::process::exit(2);
            }
            Err(e) => return Err(e.into()),
        },
        Commands::Schedule { loan } => {
            print_json(&ledger.loan_schedule(loan)?)?;
        }
        Commands::Sheet { center, date } => {
            let day = date_or_today(date.as_deref())?;
            print_json(&ledger.collection_sheet(center, day)?)?;
        }
        Commands::Pay {
            batch,
            date,
            timeout_ms,
        } => {
            let text = std::fs::read_to_string(&batch)
                .with_context(|| format!("failed to read batch {}", batch.display()))?;
            let file: BatchFile = serde_json::from_str(&text).context("invalid batch file")?;
            let day = date_or_today(date.as_deref())?;

            match ledger.submit_collection_batch(
                &file.collection,
                &file.denomination,
                day,
                timeout_ms.map(Duration::from_millis),
            ) {
                Ok(outcome) => print_json(&outcome)?,
                Err(LedgerError::ReconciliationMismatch {
                    total_notes,
                    total_payments,
                }) => {
                    eprintln!(
                        "❌ Denomination mismatch: notes {} vs collection {}",
                        total_notes, total_payments
                    );
                    std::process::exit(2);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Daily { date } => {
            let day = date_or_today(date.as_deref())?;
            let total = ledger.daily_total(day)?;
            print_json(&serde_json::json!({ "date": day, "total": total }))?;
        }
        Commands::Unpaid { date } => {
            let day = date_or_today(date.as_deref())?;
            print_json(&ledger.unpaid_today(day)?)?;
        }
    }

    Ok(())
}

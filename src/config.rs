// ⚙️ Ledger configuration
//
// Loaded from an optional JSON file, then overridden by environment
// variables. Everything has a default so the CLI works with no file at all.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::collection::DuplicatePolicy;
use crate::denomination::NOTE_VALUES;
use crate::error::{LedgerError, Result};
use crate::schedule::TierLadder;

pub const ENV_DATABASE: &str = "COLLECTIONS_DB";
pub const ENV_BIND_ADDR: &str = "COLLECTIONS_ADDR";
pub const ENV_DUPLICATE_POLICY: &str = "COLLECTIONS_DUPLICATE_POLICY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub database_path: PathBuf,
    pub tier_ladder: TierLadder,
    /// Accepted note face values
    pub denominations: Vec<i64>,
    pub duplicate_policy: DuplicatePolicy,
    /// Default deadline for committing a collection batch
    pub batch_timeout_ms: u64,
    /// How long SQLite waits on a locked database before failing
    pub busy_timeout_ms: u64,
    pub bind_addr: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            database_path: PathBuf::from("collections.db"),
            tier_ladder: TierLadder::default(),
            denominations: NOTE_VALUES.to_vec(),
            duplicate_policy: DuplicatePolicy::default(),
            batch_timeout_ms: 15_000,
            busy_timeout_ms: 5_000,
            bind_addr: "0.0.0.0:5000".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Load config from `path` (if given), apply env overrides, validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p).map_err(|e| {
                    LedgerError::invalid(format!("cannot read config {}: {}", p.display(), e))
                })?;
                serde_json::from_str(&text)?
            }
            None => LedgerConfig::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DATABASE) {
            self.database_path = PathBuf::from(db);
        }
        if let Some(addr) = lookup(ENV_BIND_ADDR) {
            self.bind_addr = addr;
        }
        if let Some(policy) = lookup(ENV_DUPLICATE_POLICY) {
            self.duplicate_policy = DuplicatePolicy::parse(&policy).ok_or_else(|| {
                LedgerError::invalid(format!("unknown duplicate policy '{}'", policy))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.tier_ladder.validate()?;

        if self.denominations.is_empty() {
            return Err(LedgerError::invalid("at least one denomination is required"));
        }
        if let Some(bad) = self.denominations.iter().find(|&&n| n <= 0) {
            return Err(LedgerError::invalid(format!("note value must be positive, got {}", bad)));
        }
        Ok(())
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

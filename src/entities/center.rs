// 🏘️ Center Entity - a group of members collected on the same visit
//
// Lifecycle: created INACTIVE, becomes ACTIVE exactly once, after every
// member's schedule is persisted. There is no path back to INACTIVE.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CENTER STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CenterState {
    Inactive,
    Active,
}

impl CenterState {
    pub fn from_flag(is_active: bool) -> Self {
        if is_active {
            CenterState::Active
        } else {
            CenterState::Inactive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CenterState::Inactive => "INACTIVE",
            CenterState::Active => "ACTIVE",
        }
    }
}

// ============================================================================
// CENTER ENTITY
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Center {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Center {
    pub fn state(&self) -> CenterState {
        CenterState::from_flag(self.is_active)
    }
}

/// Which centers a listing should return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CenterFilter {
    /// Admin view
    #[default]
    All,

    /// Field staff only collect at active centers
    Active,

    /// Centers still waiting for schedules
    Inactive,
}

impl CenterFilter {
    pub fn admits(&self, center: &Center) -> bool {
        match self {
            CenterFilter::All => true,
            CenterFilter::Active => center.is_active,
            CenterFilter::Inactive => !center.is_active,
        }
    }
}

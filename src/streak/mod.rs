pub mod milestones;
pub mod progress;
pub mod thresholds;

use crate::error::VicesError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

pub use milestones::{
    current_milestone_benefit, generate_milestones, next_milestone, update_progress,
};
pub use progress::{ProgressData, calculate_progress, days_ago, encouragement};
pub use thresholds::Benefit;

pub const DEFAULT_GOAL_DAYS: u32 = 66;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum HabitKind {
    Smoking,
    Drinking,
    Porn,
}

impl HabitKind {
    pub const ALL: [HabitKind; 3] = [HabitKind::Smoking, HabitKind::Drinking, HabitKind::Porn];

    pub fn as_str(self) -> &'static str {
        match self {
            HabitKind::Smoking => "smoking",
            HabitKind::Drinking => "drinking",
            HabitKind::Porn => "porn",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            HabitKind::Smoking => "Smoking",
            HabitKind::Drinking => "Drinking",
            HabitKind::Porn => "Pornography",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            HabitKind::Smoking => "🚬",
            HabitKind::Drinking => "🍺",
            HabitKind::Porn => "📱",
        }
    }
}

impl fmt::Display for HabitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HabitKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "smoking" => Ok(HabitKind::Smoking),
            "drinking" => Ok(HabitKind::Drinking),
            "porn" => Ok(HabitKind::Porn),
            other => Err(format!("unknown habit kind: {other}")),
        }
    }
}

/// Target length of a streak in days. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Goal(NonZeroU32);

impl Goal {
    pub const DEFAULT: Goal = match NonZeroU32::new(DEFAULT_GOAL_DAYS) {
        Some(days) => Goal(days),
        None => panic!("default goal must be positive"),
    };

    pub fn new(days: i64) -> Result<Self, VicesError> {
        u32::try_from(days)
            .ok()
            .and_then(NonZeroU32::new)
            .map(Goal)
            .ok_or(VicesError::InvalidGoal(days))
    }

    pub fn days(self) -> u32 {
        self.0.get()
    }
}

impl Default for Goal {
    fn default() -> Self {
        Goal::DEFAULT
    }
}

impl TryFrom<i64> for Goal {
    type Error = VicesError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Goal::new(value)
    }
}

impl From<Goal> for u32 {
    fn from(goal: Goal) -> Self {
        goal.days()
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.days(), f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Streak {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub kind: HabitKind,
    pub current_streak: u32,
    pub goal: Goal,
    pub start_date: DateTime<Utc>,
    pub last_check_in: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub milestones: Vec<Milestone>,
}

impl Streak {
    pub fn progress(&self) -> u8 {
        calculate_progress(self.current_streak, self.goal)
    }
}

/// A checkpoint derived from the threshold table. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Milestone {
    pub id: String,
    pub streak_id: i64,
    pub day_count: u32,
    pub percentage: u32,
    pub title: &'static str,
    pub description: String,
    pub is_goal: bool,
    pub is_reached: bool,
    /// When this process first saw the checkpoint reached. Only meaningful
    /// within one running state, so it is kept out of serialized payloads.
    #[serde(skip_serializing)]
    pub reached_at: Option<DateTime<Utc>>,
    pub benefit: Benefit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub id: i64,
    pub streak_id: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub duration: u32,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
}

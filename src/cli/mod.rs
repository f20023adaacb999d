pub mod onboard;

use crate::streak::HabitKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "vices",
    about = "Abstinence streak tracker for smoking, drinking and pornography"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create or sign in to an account and pick the habits to quit.
    Onboard,
    Signup {
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    Login {
        #[arg(long)]
        email: Option<String>,
    },
    Logout,
    Status,
    /// List active streaks.
    Streaks,
    /// Show one streak with its milestones and recent attempts.
    Show {
        id: i64,
    },
    Create {
        #[arg(value_enum)]
        kind: HabitKind,
        #[arg(long)]
        goal: Option<i64>,
    },
    /// Count today as another day of abstinence.
    Confirm {
        id: i64,
    },
    /// Record a relapse: the current run becomes an attempt and the streak restarts.
    Reset {
        id: i64,
        #[arg(long, short = 'y', default_value_t = false)]
        yes: bool,
    },
    Deactivate {
        id: i64,
    },
    Attempts {
        id: i64,
    },
    Quotes {
        #[arg(long)]
        count: Option<usize>,
        #[arg(long)]
        category: Option<String>,
    },
    Report {
        #[arg(long)]
        date: Option<String>,
    },
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Subscription {
        #[command(subcommand)]
        command: SubscriptionCommands,
    },
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Run the local HTTP API.
    Serve,
    Doctor,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    Set { key: String, value: String },
    Get { key: String },
}

#[derive(Debug, Subcommand)]
pub enum SubscriptionCommands {
    Status,
    Offerings,
    Purchase {
        /// Package identifier, e.g. `$rc_monthly`.
        package: String,
        /// Purchase token issued by the payment provider.
        #[arg(long)]
        token: String,
    },
    Restore,
}

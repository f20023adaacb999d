pub mod report;

use crate::analyzer::report::{ProgressReport, SavedReport};
use crate::auth::Session;
use crate::config::Config;
use crate::db::StreakStore;
use crate::service::{self, User};
use crate::streak::{Attempt, Streak};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct StreakExport {
    pub streak: Streak,
    pub attempts: Vec<Attempt>,
}

/// Everything stored for one owner.
#[derive(Debug, Serialize)]
pub struct UserExport {
    pub exported_at: String,
    pub user: User,
    pub streaks: Vec<StreakExport>,
}

pub fn generate_and_store_report<S: StreakStore + ?Sized>(
    config: &Config,
    store: &S,
    session: &Session,
    date: NaiveDate,
) -> Result<(ProgressReport, SavedReport)> {
    let streaks = streaks_with_attempts(store, session)?;
    let report = report::build_progress_report(date, &session.email, &streaks, Utc::now());
    let saved = report::save_report_files(&report, &config.report_dir)?;

    info!(
        user_id = session.user_id,
        path = %saved.markdown_path.display(),
        "progress report saved"
    );

    Ok((report, saved))
}

pub fn export_user_data<S: StreakStore + ?Sized>(store: &S, session: &Session) -> Result<UserExport> {
    let user = service::user_profile(store, Some(session), session.user_id)?;
    let streaks = streaks_with_attempts(store, session)?
        .into_iter()
        .map(|(streak, attempts)| StreakExport { streak, attempts })
        .collect();

    Ok(UserExport {
        exported_at: Utc::now().to_rfc3339(),
        user,
        streaks,
    })
}

pub fn write_export(export: &UserExport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create export directory: {}", parent.display())
        })?;
    }

    let content = serde_json::to_string_pretty(export).context("Failed to serialize export")?;
    fs::write(path, content)
        .with_context(|| format!("Failed to write export file: {}", path.display()))
}

fn streaks_with_attempts<S: StreakStore + ?Sized>(
    store: &S,
    session: &Session,
) -> Result<Vec<(Streak, Vec<Attempt>)>> {
    service::user_streaks(store, Some(session), session.user_id)?
        .into_iter()
        .map(|streak| {
            let attempts = service::streak_attempts(store, Some(session), streak.id)?;
            Ok((streak, attempts))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NewUser};
    use crate::streak::{Goal, HabitKind};
    use tempfile::tempdir;

    #[test]
    fn export_contains_streaks_and_attempts() {
        let dir = tempdir().expect("tempdir");
        let database = Database::open(&dir.path().join("vices.db")).expect("open db");
        let now = Utc::now();
        let user_id = database
            .insert_user(&NewUser {
                email: "demo@example.com",
                name: "Demo",
                password_hash: "h",
                now,
            })
            .expect("insert user");
        let session = Session {
            access_token: "token".to_string(),
            user_id,
            email: "demo@example.com".to_string(),
            created_at: now,
        };
        let streak = service::create_streak(
            &database,
            Some(&session),
            user_id,
            HabitKind::Smoking,
            Goal::DEFAULT,
        )
        .expect("create streak");
        service::update_streak(&database, Some(&session), streak.id, 9).expect("progress");
        service::reset_streak(&database, Some(&session), streak.id).expect("reset");

        let export = export_user_data(&database, &session).expect("export");
        let path = dir.path().join("out").join("export.json");
        write_export(&export, &path).expect("write export");

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(value["user"]["email"], "demo@example.com");
        assert_eq!(value["streaks"][0]["streak"]["type"], "smoking");
        assert_eq!(value["streaks"][0]["attempts"][0]["duration"], 9);
    }
}

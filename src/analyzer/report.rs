use crate::streak::{
    Attempt, HabitKind, ProgressData, Streak, current_milestone_benefit, days_ago, next_milestone,
};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct NextCheckpoint {
    pub day_count: u32,
    pub title: &'static str,
    pub days_remaining: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreakReportEntry {
    pub streak_id: i64,
    pub kind: HabitKind,
    pub current_streak: u32,
    pub goal: u32,
    pub progress: u8,
    pub encouragement: &'static str,
    pub current_benefit: &'static str,
    pub reached_milestones: usize,
    pub next_milestone: Option<NextCheckpoint>,
    pub last_check_in_days_ago: i64,
    pub attempt_history: Vec<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub date: String,
    pub generated_at: String,
    pub owner: String,
    pub streaks: Vec<StreakReportEntry>,
    pub total_attempts: usize,
    pub longest_attempt: u32,
}

#[derive(Debug)]
pub struct SavedReport {
    pub markdown_path: PathBuf,
    pub json_path: PathBuf,
}

/// `attempts` holds each streak's attempts newest first.
pub fn build_progress_report(
    date: NaiveDate,
    owner: &str,
    streaks: &[(Streak, Vec<Attempt>)],
    now: DateTime<Utc>,
) -> ProgressReport {
    let entries = streaks
        .iter()
        .map(|(streak, attempts)| build_entry(streak, attempts, now))
        .collect::<Vec<_>>();

    let total_attempts = streaks.iter().map(|(_, attempts)| attempts.len()).sum();
    let longest_attempt = streaks
        .iter()
        .flat_map(|(_, attempts)| attempts.iter().map(|attempt| attempt.duration))
        .max()
        .unwrap_or_default();

    ProgressReport {
        date: date.format("%Y-%m-%d").to_string(),
        generated_at: now.to_rfc3339(),
        owner: owner.to_string(),
        streaks: entries,
        total_attempts,
        longest_attempt,
    }
}

fn build_entry(streak: &Streak, attempts: &[Attempt], now: DateTime<Utc>) -> StreakReportEntry {
    let progress = ProgressData::new(streak, attempts);
    let next = next_milestone(&streak.milestones).map(|milestone| NextCheckpoint {
        day_count: milestone.day_count,
        title: milestone.title,
        days_remaining: milestone.day_count.saturating_sub(streak.current_streak),
    });

    StreakReportEntry {
        streak_id: streak.id,
        kind: streak.kind,
        current_streak: streak.current_streak,
        goal: streak.goal.days(),
        progress: progress.progress,
        encouragement: progress.encouragement,
        current_benefit: current_milestone_benefit(streak.current_streak, streak.goal, streak.kind),
        reached_milestones: streak
            .milestones
            .iter()
            .filter(|milestone| milestone.is_reached)
            .count(),
        next_milestone: next,
        last_check_in_days_ago: days_ago(streak.last_check_in, now),
        attempt_history: progress.attempt_history,
    }
}

pub fn render_markdown(report: &ProgressReport) -> String {
    let summary_rows = if report.streaks.is_empty() {
        "| - | - | - | - |".to_string()
    } else {
        report
            .streaks
            .iter()
            .map(|entry| {
                format!(
                    "| {} {} | {} | {} | {}% |",
                    entry.kind.icon(),
                    entry.kind.display_name(),
                    format_days(entry.current_streak),
                    format_days(entry.goal),
                    entry.progress
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let sections = report
        .streaks
        .iter()
        .map(render_entry)
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "# Vices Progress Report - {}\n\n## Summary\n- Owner: {}\n- Active streaks: {}\n- Past attempts: {}\n- Longest past attempt: {}\n\n| Habit | Current | Goal | Progress |\n|-------|---------|------|----------|\n{}\n\n{}",
        report.date,
        report.owner,
        report.streaks.len(),
        report.total_attempts,
        format_days(report.longest_attempt),
        summary_rows,
        sections
    )
}

fn render_entry(entry: &StreakReportEntry) -> String {
    let next = entry
        .next_milestone
        .as_ref()
        .map(|next| {
            format!(
                "{} (day {}, {} to go)",
                next.title,
                next.day_count,
                format_days(next.days_remaining)
            )
        })
        .unwrap_or_else(|| "All milestones reached".to_string());

    let history = if entry.attempt_history.is_empty() {
        "none".to_string()
    } else {
        entry
            .attempt_history
            .iter()
            .map(|days| days.to_string())
            .collect::<Vec<_>>()
            .join(" → ")
    };

    format!(
        "## {} {}\n- {}\n- Milestones reached: {}\n- Next milestone: {}\n- Current benefit: {}\n- Last check-in: {} ago\n- Recent attempts (days): {}\n",
        entry.kind.icon(),
        entry.kind.display_name(),
        entry.encouragement,
        entry.reached_milestones,
        next,
        entry.current_benefit,
        format_days(entry.last_check_in_days_ago.clamp(0, i64::from(u32::MAX)) as u32),
        history
    )
}

pub fn save_report_files(report: &ProgressReport, report_dir: &Path) -> Result<SavedReport> {
    fs::create_dir_all(report_dir).with_context(|| {
        format!(
            "Failed to create report directory: {}",
            report_dir.display()
        )
    })?;

    let markdown_path = report_dir.join(format!("{}.md", report.date));
    let json_path = report_dir.join(format!("{}.json", report.date));

    fs::write(&markdown_path, render_markdown(report)).with_context(|| {
        format!(
            "Failed to write Markdown report: {}",
            markdown_path.display()
        )
    })?;

    let json_content =
        serde_json::to_string_pretty(report).context("Failed to serialize report JSON")?;
    fs::write(&json_path, json_content)
        .with_context(|| format!("Failed to write JSON report: {}", json_path.display()))?;

    Ok(SavedReport {
        markdown_path,
        json_path,
    })
}

pub fn format_days(days: u32) -> String {
    if days == 1 {
        "1 day".to_string()
    } else {
        format!("{days} days")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streak::{Goal, generate_milestones, update_progress};
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
            .single()
            .expect("valid date")
    }

    fn streak(kind: HabitKind, current: u32) -> Streak {
        let goal = Goal::DEFAULT;
        let start = now() - Duration::days(i64::from(current));
        Streak {
            id: 1,
            user_id: 1,
            kind,
            current_streak: current,
            goal,
            start_date: start,
            last_check_in: now() - Duration::hours(30),
            is_active: true,
            created_at: start,
            updated_at: now(),
            milestones: update_progress(&generate_milestones(1, goal), current, now()),
        }
    }

    fn attempt(duration: u32) -> Attempt {
        Attempt {
            id: i64::from(duration),
            streak_id: 1,
            start_date: now(),
            end_date: Some(now()),
            duration,
            is_completed: false,
            created_at: now(),
        }
    }

    #[test]
    fn entry_summarizes_progress_and_next_checkpoint() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).expect("date");
        let report = build_progress_report(
            date,
            "demo@example.com",
            &[(streak(HabitKind::Smoking, 21), vec![attempt(12), attempt(4)])],
            now(),
        );

        let entry = &report.streaks[0];
        assert_eq!(entry.progress, 32);
        assert_eq!(entry.reached_milestones, 2);
        let next = entry.next_milestone.as_ref().expect("next checkpoint");
        assert_eq!((next.day_count, next.days_remaining), (33, 12));
        assert_eq!(entry.attempt_history, vec![4, 12]);
        assert_eq!(entry.last_check_in_days_ago, 2);
        assert_eq!(report.total_attempts, 2);
        assert_eq!(report.longest_attempt, 12);
    }

    #[test]
    fn markdown_lists_each_streak() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).expect("date");
        let report = build_progress_report(
            date,
            "demo@example.com",
            &[
                (streak(HabitKind::Drinking, 66), Vec::new()),
                (streak(HabitKind::Porn, 1), Vec::new()),
            ],
            now(),
        );

        let markdown = render_markdown(&report);

        assert!(markdown.starts_with("# Vices Progress Report - 2025-03-01"));
        assert!(markdown.contains("| 🍺 Drinking | 66 days | 66 days | 100% |"));
        assert!(markdown.contains("All milestones reached"));
        assert!(markdown.contains("| 📱 Pornography | 1 day |"));
        assert!(markdown.contains("Recent attempts (days): none"));
    }

    #[test]
    fn saves_markdown_and_json_by_date() {
        let dir = tempdir().expect("tempdir");
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).expect("date");
        let report = build_progress_report(date, "demo@example.com", &[], now());

        let saved = save_report_files(&report, &dir.path().join("reports")).expect("save");

        assert!(saved.markdown_path.ends_with("2025-03-01.md"));
        let json = fs::read_to_string(&saved.json_path).expect("read json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse json");
        assert_eq!(value["owner"], "demo@example.com");
        assert_eq!(value["total_attempts"], 0);
    }
}

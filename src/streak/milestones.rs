use super::thresholds::{FIXED_CHECKPOINTS, goal_description, goal_threshold, threshold};
use super::{Goal, HabitKind, Milestone};
use chrono::{DateTime, Utc};

/// Fixed checkpoints plus the goal, ascending and deduplicated.
pub fn checkpoints(goal: Goal) -> Vec<u32> {
    let mut days = FIXED_CHECKPOINTS.to_vec();
    days.push(goal.days());
    days.sort_unstable();
    days.dedup();
    days
}

pub fn generate_milestones(streak_id: i64, goal: Goal) -> Vec<Milestone> {
    checkpoints(goal)
        .into_iter()
        .filter_map(|day_count| {
            let is_goal = day_count == goal.days();
            let entry = if is_goal {
                goal_threshold()
            } else {
                threshold(day_count)?
            };
            let description = if is_goal {
                goal_description(day_count)
            } else {
                entry.description.to_string()
            };

            Some(Milestone {
                id: format!("{streak_id}-{day_count}"),
                streak_id,
                day_count,
                percentage: day_percentage(day_count, goal),
                title: entry.title,
                description,
                is_goal,
                is_reached: false,
                reached_at: None,
                benefit: entry.benefit,
            })
        })
        .collect()
}

/// Marks reached checkpoints. `reached_at` is stamped the first time a
/// checkpoint is reached and never cleared, even when the count drops back.
pub fn update_progress(
    milestones: &[Milestone],
    current_days: u32,
    now: DateTime<Utc>,
) -> Vec<Milestone> {
    milestones
        .iter()
        .map(|milestone| {
            let is_reached = current_days >= milestone.day_count;
            let reached_at = if is_reached {
                milestone.reached_at.or(Some(now))
            } else {
                milestone.reached_at
            };

            Milestone {
                is_reached,
                reached_at,
                ..milestone.clone()
            }
        })
        .collect()
}

pub fn next_milestone(milestones: &[Milestone]) -> Option<&Milestone> {
    milestones.iter().find(|milestone| !milestone.is_reached)
}

/// Benefit of the highest reached checkpoint, or the day-7 benefit when
/// nothing is reached yet.
pub fn current_milestone_benefit(current: u32, goal: Goal, kind: HabitKind) -> &'static str {
    let highest = checkpoints(goal)
        .into_iter()
        .filter(|day_count| current >= *day_count)
        .max()
        .unwrap_or(FIXED_CHECKPOINTS[0]);

    let entry = if highest == goal.days() {
        Some(goal_threshold())
    } else {
        threshold(highest)
    };

    entry
        .map(|entry| entry.benefit.for_kind(kind))
        .unwrap_or("Keep going! You're making great progress.")
}

fn day_percentage(day_count: u32, goal: Goal) -> u32 {
    let scaled = u64::from(day_count) * 200 + u64::from(goal.days());
    (scaled / (2 * u64::from(goal.days()))) as u32
}

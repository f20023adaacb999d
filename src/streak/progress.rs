use super::{Attempt, Goal, Streak};
use chrono::{DateTime, Utc};
use serde::Serialize;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
const ATTEMPT_HISTORY_LEN: usize = 5;

/// Encouragement tiers, checked top-down; the first threshold the
/// percentage meets wins.
const ENCOURAGEMENT_TIERS: [(u8, &str); 4] = [
    (100, "🎉 Goal achieved! You're amazing!"),
    (75, "🔥 Almost there! Keep pushing!"),
    (50, "💪 Halfway there! You're doing great!"),
    (25, "🌟 Great progress! Keep it up!"),
];
const DEFAULT_ENCOURAGEMENT: &str = "🚀 You've got this! Every day counts!";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressData {
    pub current_streak: u32,
    pub goal: Goal,
    pub progress: u8,
    pub encouragement: &'static str,
    pub attempt_history: Vec<u32>,
}

impl ProgressData {
    /// `attempts` is expected newest first, as the store returns them.
    pub fn new(streak: &Streak, attempts: &[Attempt]) -> Self {
        let progress = calculate_progress(streak.current_streak, streak.goal);
        let mut attempt_history = attempts
            .iter()
            .take(ATTEMPT_HISTORY_LEN)
            .map(|attempt| attempt.duration)
            .collect::<Vec<_>>();
        attempt_history.reverse();

        Self {
            current_streak: streak.current_streak,
            goal: streak.goal,
            progress,
            encouragement: encouragement(progress),
            attempt_history,
        }
    }
}

/// Percentage of the goal, rounded half up and clamped to 100.
pub fn calculate_progress(current: u32, goal: Goal) -> u8 {
    let goal_days = u64::from(goal.days());
    let rounded = (u64::from(current) * 200 + goal_days) / (2 * goal_days);
    rounded.min(100) as u8
}

pub fn encouragement(percentage: u8) -> &'static str {
    ENCOURAGEMENT_TIERS
        .iter()
        .find(|(threshold, _)| percentage >= *threshold)
        .map(|(_, message)| *message)
        .unwrap_or(DEFAULT_ENCOURAGEMENT)
}

/// Whole days between two instants, rounded up.
pub fn days_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (now - then).num_milliseconds().abs();
    (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streak::{HabitKind, generate_milestones};
    use chrono::Duration;

    fn goal(days: i64) -> Goal {
        Goal::new(days).expect("positive goal")
    }

    #[test]
    fn progress_stays_within_bounds() {
        for goal_days in [1, 7, 30, 66, 365] {
            let goal = goal(goal_days);
            for current in [0, 1, 5, 33, 66, 400, u32::MAX] {
                assert!(calculate_progress(current, goal) <= 100);
            }
            assert_eq!(calculate_progress(goal.days(), goal), 100);
            assert_eq!(calculate_progress(goal.days() + 10, goal), 100);
        }
    }

    #[test]
    fn progress_rounds_half_up() {
        assert_eq!(calculate_progress(0, Goal::DEFAULT), 0);
        assert_eq!(calculate_progress(18, Goal::DEFAULT), 27);
        assert_eq!(calculate_progress(1, goal(8)), 13);
        assert_eq!(calculate_progress(1, goal(3)), 33);
        assert_eq!(calculate_progress(33, Goal::DEFAULT), 50);
    }

    #[test]
    fn encouragement_picks_highest_qualifying_tier() {
        assert_eq!(encouragement(100), "🎉 Goal achieved! You're amazing!");
        assert_eq!(encouragement(80), "🔥 Almost there! Keep pushing!");
        assert_eq!(encouragement(75), "🔥 Almost there! Keep pushing!");
        assert_eq!(encouragement(50), "💪 Halfway there! You're doing great!");
        assert_eq!(encouragement(49), "🌟 Great progress! Keep it up!");
        assert_eq!(encouragement(24), "🚀 You've got this! Every day counts!");
        assert_eq!(encouragement(0), "🚀 You've got this! Every day counts!");
    }

    #[test]
    fn days_ago_rounds_partial_days_up() {
        let now = Utc::now();
        assert_eq!(days_ago(now, now), 0);
        assert_eq!(days_ago(now - Duration::hours(1), now), 1);
        assert_eq!(days_ago(now - Duration::hours(49), now), 3);
        assert_eq!(days_ago(now + Duration::hours(25), now), 2);
    }

    #[test]
    fn progress_data_keeps_last_five_attempts_oldest_first() {
        let now = Utc::now();
        let streak = Streak {
            id: 1,
            user_id: 1,
            kind: HabitKind::Smoking,
            current_streak: 18,
            goal: Goal::DEFAULT,
            start_date: now,
            last_check_in: now,
            is_active: true,
            created_at: now,
            updated_at: now,
            milestones: generate_milestones(1, Goal::DEFAULT),
        };
        let attempts = [22, 15, 8, 12, 30, 4]
            .into_iter()
            .enumerate()
            .map(|(index, duration)| Attempt {
                id: index as i64,
                streak_id: 1,
                start_date: now,
                end_date: Some(now),
                duration,
                is_completed: false,
                created_at: now,
            })
            .collect::<Vec<_>>();

        let data = ProgressData::new(&streak, &attempts);

        assert_eq!(data.progress, 27);
        assert_eq!(data.encouragement, "🌟 Great progress! Keep it up!");
        assert_eq!(data.attempt_history, vec![30, 12, 8, 15, 22]);
    }
}

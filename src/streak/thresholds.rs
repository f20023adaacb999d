use super::HabitKind;
use serde::Serialize;

/// Day counts that every streak gets a checkpoint for, in addition to its goal.
pub const FIXED_CHECKPOINTS: [u32; 4] = [7, 20, 33, 53];

/// Key of the entry used for the goal checkpoint, whatever the configured goal is.
pub const GOAL_KEY: u32 = 66;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Benefit {
    pub smoking: &'static str,
    pub drinking: &'static str,
    pub porn: &'static str,
}

impl Benefit {
    pub fn for_kind(&self, kind: HabitKind) -> &'static str {
        match kind {
            HabitKind::Smoking => self.smoking,
            HabitKind::Drinking => self.drinking,
            HabitKind::Porn => self.porn,
        }
    }
}

#[derive(Debug)]
pub struct Threshold {
    pub day_count: u32,
    pub title: &'static str,
    pub description: &'static str,
    pub benefit: Benefit,
}

pub static THRESHOLDS: [Threshold; 5] = [
    Threshold {
        day_count: 7,
        title: "Day 7",
        description: "You've completed your first week!",
        benefit: Benefit {
            smoking: "Circulation starts to rebound; exercise feels easier",
            drinking: "First full REM-sleep cycles return; anxiety often dips",
            porn: "Early drop-off in cravings reported; mental \"fog\" begins to lift",
        },
    },
    Threshold {
        day_count: 20,
        title: "Day 20",
        description: "You've reached 20 days!",
        benefit: Benefit {
            smoking: "Lung function can improve by up to 30%; coughing eases",
            drinking: "Liver fat already falling and blood-pressure trending down",
            porn: "Higher everyday energy & focus noted in qualitative studies",
        },
    },
    Threshold {
        day_count: 33,
        title: "Day 33",
        description: "You've reached 33 days!",
        benefit: Benefit {
            smoking: "Nicotine receptors down-regulate, cravings noticeably milder",
            drinking: "Better insulin sensitivity and visible skin hydration gains",
            porn: "Many users report return of morning erections & stronger libido",
        },
    },
    Threshold {
        day_count: 53,
        title: "Day 53",
        description: "You've reached 53 days!",
        benefit: Benefit {
            smoking: "Shortness of breath continues to fall; risk of heart attack already ~10% lower",
            drinking: "Resting heart-rate normalises; measurable weight-, BP- and mood improvements keep compounding",
            porn: "Pilot study saw higher life-satisfaction scores and lower fatigue after 7+ weeks abstinence",
        },
    },
    Threshold {
        day_count: GOAL_KEY,
        title: "Goal Achieved",
        description: "Congratulations! You've reached your 66-day goal!",
        benefit: Benefit {
            smoking: "Heart disease risk cut in half; lung cancer risk plummets",
            drinking: "Liver fully regenerated; mental clarity at lifetime peak",
            porn: "Healthy sexuality restored; confidence and energy maximized",
        },
    },
];

pub fn threshold(day_count: u32) -> Option<&'static Threshold> {
    THRESHOLDS.iter().find(|entry| entry.day_count == day_count)
}

pub fn goal_threshold() -> &'static Threshold {
    &THRESHOLDS[THRESHOLDS.len() - 1]
}

pub fn goal_description(goal_days: u32) -> String {
    format!("Congratulations! You've reached your {goal_days}-day goal!")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_fixed_checkpoint_has_an_entry() {
        assert!(FIXED_CHECKPOINTS.iter().all(|day| threshold(*day).is_some()));
        assert_eq!(goal_threshold().day_count, GOAL_KEY);
    }

    #[test]
    fn goal_description_matches_table_for_default_goal() {
        assert_eq!(goal_description(GOAL_KEY), goal_threshold().description);
    }
}

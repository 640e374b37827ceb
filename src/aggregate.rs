use chrono::Local;
use serde::{Deserialize, Serialize};

/// Daily step target used when the profile has none configured
pub const DEFAULT_STEPS_GOAL: u32 = 8000;

// Empirical per-step conversion constants, kept as calibrated
pub const KCAL_PER_STEP: f64 = 0.04;
pub const KM_PER_STEP: f64 = 0.0008;
pub const STEPS_PER_ACTIVE_MINUTE: u32 = 120;

fn default_goal() -> u32 {
    DEFAULT_STEPS_GOAL
}

/// Per-day summary of step-derived metrics for one user.
///
/// The persisted record is keyed on `(user_id, date)`; the goal travels with
/// the user profile rather than the daily record, so it is skipped on
/// serialize and defaulted on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStepAggregate {
    pub user_id: String,
    pub date: String,
    pub steps: u32,
    #[serde(skip_serializing, default = "default_goal")]
    pub goal: u32,
    pub kcal: f64,
    pub distance_km: f64,
    pub active_minutes: u32,
}

impl DailyStepAggregate {
    pub fn new(user_id: &str, date: &str, goal: u32) -> Self {
        Self {
            user_id: user_id.to_string(),
            date: date.to_string(),
            steps: 0,
            goal,
            kcal: 0.0,
            distance_km: 0.0,
            active_minutes: 0,
        }
    }

    /// Count one recognized step and recompute every derived metric from the
    /// new total, so the displayed tuple is always internally consistent.
    /// Totals are recomputed rather than accumulated to keep rounding error
    /// out of the running values.
    pub fn record_step(&mut self) {
        let n = self.steps + 1;
        self.steps = n;
        self.kcal = f64::from(n) * KCAL_PER_STEP;
        self.distance_km = round_to_3dp(f64::from(n) * KM_PER_STEP);
        self.active_minutes = n / STEPS_PER_ACTIVE_MINUTE;
    }

    /// Goal completion in percent, clamped at 100. A zero goal falls back to
    /// the default target instead of dividing by zero.
    pub fn progress_percent(&self) -> f64 {
        let goal = if self.goal == 0 {
            DEFAULT_STEPS_GOAL
        } else {
            self.goal
        };
        (f64::from(self.steps) / f64::from(goal) * 100.0).min(100.0)
    }
}

fn round_to_3dp(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Local calendar day, the natural key for a daily aggregate
pub fn local_date() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_derived_metrics_are_functions_of_the_count() {
        let mut aggregate = DailyStepAggregate::new("user-1", "2026-08-07", 8000);

        for _ in 0..3 {
            aggregate.record_step();
        }
        assert_eq!(aggregate.steps, 3);
        assert_relative_eq!(aggregate.kcal, 0.12, epsilon = 1e-9);
        assert_relative_eq!(aggregate.distance_km, 0.002, epsilon = 1e-9);
        assert_eq!(aggregate.active_minutes, 0);

        for _ in 3..1250 {
            aggregate.record_step();
        }
        assert_eq!(aggregate.steps, 1250);
        assert_relative_eq!(aggregate.kcal, 50.0, epsilon = 1e-9);
        assert_relative_eq!(aggregate.distance_km, 1.0, epsilon = 1e-9);
        assert_eq!(aggregate.active_minutes, 10);
    }

    #[test]
    fn test_active_minutes_floor() {
        let mut aggregate = DailyStepAggregate::new("user-1", "2026-08-07", 8000);
        for _ in 0..239 {
            aggregate.record_step();
        }
        assert_eq!(aggregate.active_minutes, 1);
        aggregate.record_step();
        assert_eq!(aggregate.active_minutes, 2);
    }

    #[test]
    fn test_progress_clamps_at_100() {
        let mut aggregate = DailyStepAggregate::new("user-1", "2026-08-07", 8000);
        assert_relative_eq!(aggregate.progress_percent(), 0.0);

        aggregate.steps = 4000;
        assert_relative_eq!(aggregate.progress_percent(), 50.0);

        aggregate.steps = 9000;
        assert_relative_eq!(aggregate.progress_percent(), 100.0);
    }

    #[test]
    fn test_zero_goal_falls_back_to_default() {
        let mut aggregate = DailyStepAggregate::new("user-1", "2026-08-07", 0);
        aggregate.steps = 4000;
        assert_relative_eq!(aggregate.progress_percent(), 50.0);
    }

    #[test]
    fn test_goal_is_not_part_of_the_persisted_record() {
        let mut aggregate = DailyStepAggregate::new("user-1", "2026-08-07", 9500);
        aggregate.record_step();

        let json = serde_json::to_string(&aggregate).unwrap();
        assert!(!json.contains("goal"));

        let loaded: DailyStepAggregate = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.goal, DEFAULT_STEPS_GOAL);
        assert_eq!(loaded.steps, aggregate.steps);
    }
}

use crate::session::TrackingState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

/// Live snapshot of the tracking session, written as JSON for display
/// surfaces to poll
#[derive(Serialize, Deserialize, Clone)]
pub struct TrackerStatus {
    pub timestamp: f64,
    pub state: TrackingState,
    pub steps: u32,
    pub goal: u32,
    pub kcal: f64,
    pub distance_km: f64,
    pub active_minutes: u32,
    pub progress_percent: f64,
    pub filtered_magnitude: f64,
    pub samples_seen: u64,
    pub uptime_seconds: u64,
}

impl TrackerStatus {
    pub fn new() -> Self {
        Self {
            timestamp: current_timestamp(),
            state: TrackingState::Idle,
            steps: 0,
            goal: 0,
            kcal: 0.0,
            distance_km: 0.0,
            active_minutes: 0,
            progress_percent: 0.0,
            filtered_magnitude: 0.0,
            samples_seen: 0,
            uptime_seconds: 0,
        }
    }

    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl Default for TrackerStatus {
    fn default() -> Self {
        Self::new()
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

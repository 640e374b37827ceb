use crate::aggregate::DailyStepAggregate;
use crate::error::{StepTrackerError, TrackerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

/// Profile settings read by the tracker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub steps_goal: Option<u32>,
}

/// Durable store for daily step records, keyed on `(user_id, date)`.
///
/// `upsert_aggregate` must be idempotent: every write carries the full
/// current record, so replaying or reordering writes converges to the same
/// stored state (last write wins).
pub trait StepStore: Send + Sync {
    fn load_aggregate(
        &self,
        user_id: &str,
        date: &str,
    ) -> TrackerResult<Option<DailyStepAggregate>>;

    fn upsert_aggregate(&self, aggregate: &DailyStepAggregate) -> TrackerResult<()>;

    /// Profile-sourced daily step goal, if one is configured
    fn load_goal(&self, user_id: &str) -> TrackerResult<Option<u32>>;

    /// Daily records in `[from, to]` (inclusive), ordered by date
    fn load_range(
        &self,
        user_id: &str,
        from: &str,
        to: &str,
    ) -> TrackerResult<Vec<DailyStepAggregate>>;
}

/// File-backed store: one JSON document per `(user, date)` under
/// `<root>/<user_id>/<date>.json`, profile settings in `profile.json`.
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.root.join(user_id)
    }

    fn day_path(&self, user_id: &str, date: &str) -> PathBuf {
        self.user_dir(user_id).join(format!("{}.json", date))
    }

    fn profile_path(&self, user_id: &str) -> PathBuf {
        self.user_dir(user_id).join("profile.json")
    }
}

impl StepStore for JsonFileStore {
    fn load_aggregate(
        &self,
        user_id: &str,
        date: &str,
    ) -> TrackerResult<Option<DailyStepAggregate>> {
        let path = self.day_path(user_id, date);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)
            .map_err(|e| StepTrackerError::StorageError(format!("read {}: {}", path.display(), e)))?;
        let aggregate = serde_json::from_str(&json)
            .map_err(|e| StepTrackerError::StorageError(format!("parse {}: {}", path.display(), e)))?;
        Ok(Some(aggregate))
    }

    fn upsert_aggregate(&self, aggregate: &DailyStepAggregate) -> TrackerResult<()> {
        let dir = self.user_dir(&aggregate.user_id);
        fs::create_dir_all(&dir)
            .map_err(|e| StepTrackerError::StorageError(format!("create {}: {}", dir.display(), e)))?;

        let path = self.day_path(&aggregate.user_id, &aggregate.date);
        let json = serde_json::to_string_pretty(aggregate)
            .map_err(|e| StepTrackerError::StorageError(format!("serialize record: {}", e)))?;
        fs::write(&path, json)
            .map_err(|e| StepTrackerError::StorageError(format!("write {}: {}", path.display(), e)))?;
        Ok(())
    }

    fn load_goal(&self, user_id: &str) -> TrackerResult<Option<u32>> {
        let path = self.profile_path(user_id);
        if !path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&path)
            .map_err(|e| StepTrackerError::StorageError(format!("read {}: {}", path.display(), e)))?;
        let profile: UserProfile = serde_json::from_str(&json)
            .map_err(|e| StepTrackerError::StorageError(format!("parse {}: {}", path.display(), e)))?;
        Ok(profile.steps_goal)
    }

    fn load_range(
        &self,
        user_id: &str,
        from: &str,
        to: &str,
    ) -> TrackerResult<Vec<DailyStepAggregate>> {
        let dir = self.user_dir(user_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&dir)
            .map_err(|e| StepTrackerError::StorageError(format!("list {}: {}", dir.display(), e)))?;

        let mut records = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(date) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            // ISO dates compare correctly as strings
            if date < from || date > to || date == "profile" {
                continue;
            }
            if let Some(record) = self.load_aggregate(user_id, date)? {
                records.push(record);
            }
        }

        records.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(records)
    }
}

/// In-memory store for tests and demos
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<(String, String), DailyStepAggregate>>,
    goals: Mutex<HashMap<String, u32>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_goal(&self, user_id: &str, goal: u32) {
        self.goals
            .lock()
            .expect("goal map lock")
            .insert(user_id.to_string(), goal);
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().expect("record map lock").len()
    }
}

impl StepStore for MemoryStore {
    fn load_aggregate(
        &self,
        user_id: &str,
        date: &str,
    ) -> TrackerResult<Option<DailyStepAggregate>> {
        let records = self
            .records
            .lock()
            .map_err(|_| StepTrackerError::Internal("record map lock poisoned".to_string()))?;
        Ok(records
            .get(&(user_id.to_string(), date.to_string()))
            .cloned())
    }

    fn upsert_aggregate(&self, aggregate: &DailyStepAggregate) -> TrackerResult<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StepTrackerError::Internal("record map lock poisoned".to_string()))?;
        records.insert(
            (aggregate.user_id.clone(), aggregate.date.clone()),
            aggregate.clone(),
        );
        Ok(())
    }

    fn load_goal(&self, user_id: &str) -> TrackerResult<Option<u32>> {
        let goals = self
            .goals
            .lock()
            .map_err(|_| StepTrackerError::Internal("goal map lock poisoned".to_string()))?;
        Ok(goals.get(user_id).copied())
    }

    fn load_range(
        &self,
        user_id: &str,
        from: &str,
        to: &str,
    ) -> TrackerResult<Vec<DailyStepAggregate>> {
        let records = self
            .records
            .lock()
            .map_err(|_| StepTrackerError::Internal("record map lock poisoned".to_string()))?;
        let mut matching: Vec<DailyStepAggregate> = records
            .values()
            .filter(|r| r.user_id == user_id && r.date.as_str() >= from && r.date.as_str() <= to)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.date.cmp(&b.date));
        Ok(matching)
    }
}

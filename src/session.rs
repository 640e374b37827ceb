use crate::aggregate::{local_date, DailyStepAggregate, DEFAULT_STEPS_GOAL};
use crate::detector::{StepDetector, StepDetectorConfig};
use crate::error::{StepTrackerError, TrackerResult};
use crate::sampler::AccelSample;
use crate::store::StepStore;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Tracking session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingState {
    /// Session created but not consuming samples
    Idle,
    /// Consuming samples and counting steps
    Tracking,
    /// Sample delivery suspended; filter and debounce state retained
    Paused,
}

/// One active tracking session: detector state, today's aggregate, and the
/// persistence gateway behind it.
///
/// All mutation happens through `handle_sample` on the owning task, so the
/// session itself needs no interior locking.
pub struct TrackingSession {
    user_id: Option<String>,
    state: TrackingState,
    detector: StepDetector,
    aggregate: DailyStepAggregate,
    store: Arc<dyn StepStore>,
    samples_seen: u64,
}

impl TrackingSession {
    /// Start tracking: one profile read for the goal, one read of today's
    /// record. Storage failures degrade to a fresh aggregate rather than
    /// blocking the session.
    pub fn begin(
        user_id: Option<String>,
        store: Arc<dyn StepStore>,
        config: StepDetectorConfig,
    ) -> Self {
        let date = local_date();

        let goal = match user_id.as_deref() {
            Some(uid) => match store.load_goal(uid) {
                Ok(Some(goal)) if goal > 0 => goal,
                Ok(_) => DEFAULT_STEPS_GOAL,
                Err(e) => {
                    warn!("[session] goal lookup failed, using default: {}", e);
                    DEFAULT_STEPS_GOAL
                }
            },
            None => DEFAULT_STEPS_GOAL,
        };

        let aggregate = match user_id.as_deref() {
            Some(uid) => match store.load_aggregate(uid, &date) {
                Ok(Some(mut existing)) => {
                    existing.goal = goal;
                    existing
                }
                Ok(None) => DailyStepAggregate::new(uid, &date, goal),
                Err(e) => {
                    warn!("[session] could not load today's record, starting fresh: {}", e);
                    DailyStepAggregate::new(uid, &date, goal)
                }
            },
            None => DailyStepAggregate::new("", &date, goal),
        };

        Self {
            user_id,
            state: TrackingState::Tracking,
            detector: StepDetector::new(config),
            aggregate,
            store,
            samples_seen: 0,
        }
    }

    /// The single mutation point: run the detector over one sample and, on a
    /// recognized step, update the aggregate and schedule a persistence
    /// write. Returns the updated aggregate for display when a step was
    /// counted.
    pub fn handle_sample(&mut self, sample: &AccelSample) -> Option<DailyStepAggregate> {
        if self.state != TrackingState::Tracking {
            return None;
        }
        self.samples_seen += 1;

        self.detector.process_sample(sample)?;
        self.aggregate.record_step();
        self.persist_current();
        Some(self.aggregate.clone())
    }

    /// Best-effort, non-blocking write of the full current record. Failures
    /// are logged and never surfaced; the in-memory count stays authoritative
    /// for the live session.
    fn persist_current(&self) {
        if self.user_id.is_none() {
            debug!("[session] {}, skipping write", StepTrackerError::MissingIdentity);
            return;
        }

        let store = Arc::clone(&self.store);
        let record = self.aggregate.clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.upsert_aggregate(&record) {
                        warn!("[session] persistence write failed: {}", e);
                    }
                });
            }
            Err(_) => {
                if let Err(e) = store.upsert_aggregate(&record) {
                    warn!("[session] persistence write failed: {}", e);
                }
            }
        }
    }

    /// Suspend sample handling (Tracking → Paused). Detector state is kept,
    /// so resuming continues the same filter and debounce window.
    pub fn pause(&mut self) -> TrackerResult<()> {
        match self.state {
            TrackingState::Tracking => {
                self.state = TrackingState::Paused;
                Ok(())
            }
            TrackingState::Paused => Err(StepTrackerError::InvalidState(
                "Already paused".to_string(),
            )),
            TrackingState::Idle => Err(StepTrackerError::NotTracking),
        }
    }

    /// Resume sample handling (Paused → Tracking)
    pub fn resume(&mut self) -> TrackerResult<()> {
        match self.state {
            TrackingState::Paused => {
                self.state = TrackingState::Tracking;
                Ok(())
            }
            TrackingState::Tracking => Err(StepTrackerError::AlreadyTracking),
            TrackingState::Idle => Err(StepTrackerError::NotTracking),
        }
    }

    /// End the session (Tracking | Paused → Idle). In-flight writes may
    /// complete; no new writes are issued afterwards.
    pub fn stop(&mut self) -> TrackerResult<()> {
        match self.state {
            TrackingState::Tracking | TrackingState::Paused => {
                self.state = TrackingState::Idle;
                Ok(())
            }
            TrackingState::Idle => Err(StepTrackerError::NotTracking),
        }
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn aggregate(&self) -> &DailyStepAggregate {
        &self.aggregate
    }

    pub fn filtered_magnitude(&self) -> f64 {
        self.detector.filtered()
    }

    pub fn total_steps(&self) -> u64 {
        self.detector.total_steps()
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples_seen
    }
}

// Global session registry - at most one tracking session per app instance
lazy_static::lazy_static! {
    static ref ACTIVE_SESSION: Mutex<Option<Arc<Mutex<TrackingSession>>>> = Mutex::new(None);
}

/// Start the app-wide tracking session. Fails with `AlreadyTracking` while a
/// previous session is still live.
pub fn begin_tracking(
    user_id: Option<String>,
    store: Arc<dyn StepStore>,
    config: StepDetectorConfig,
) -> TrackerResult<Arc<Mutex<TrackingSession>>> {
    let mut guard = ACTIVE_SESSION
        .lock()
        .map_err(|_| StepTrackerError::Internal("Failed to acquire session registry lock".to_string()))?;

    if let Some(existing) = guard.as_ref() {
        let state = existing
            .lock()
            .map_err(|_| StepTrackerError::Internal("Failed to acquire session lock".to_string()))?
            .state();
        if state != TrackingState::Idle {
            return Err(StepTrackerError::AlreadyTracking);
        }
    }

    let session = Arc::new(Mutex::new(TrackingSession::begin(user_id, store, config)));
    *guard = Some(Arc::clone(&session));
    Ok(session)
}

/// Stop and release the app-wide tracking session
pub fn end_tracking() -> TrackerResult<()> {
    let mut guard = ACTIVE_SESSION
        .lock()
        .map_err(|_| StepTrackerError::Internal("Failed to acquire session registry lock".to_string()))?;

    match guard.take() {
        Some(session) => {
            let mut session = session
                .lock()
                .map_err(|_| StepTrackerError::Internal("Failed to acquire session lock".to_string()))?;
            match session.stop() {
                Ok(()) | Err(StepTrackerError::NotTracking) => Ok(()),
                Err(e) => Err(e),
            }
        }
        None => Err(StepTrackerError::NotTracking),
    }
}

/// The currently registered session, if any
pub fn active_session() -> Option<Arc<Mutex<TrackingSession>>> {
    ACTIVE_SESSION.lock().ok().and_then(|guard| guard.clone())
}

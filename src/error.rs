use thiserror::Error;

/// Step tracker error types
#[derive(Error, Debug, Clone)]
pub enum StepTrackerError {
    #[error("Tracking session already active")]
    AlreadyTracking,

    #[error("No active tracking session")]
    NotTracking,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("No signed-in user")]
    MissingIdentity,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for tracking operations
pub type TrackerResult<T> = Result<T, StepTrackerError>;

// Step Tracker RS
// Converts a live accelerometer stream into daily step metrics

pub mod aggregate;
pub mod detector;
pub mod error;
pub mod sampler;
pub mod session;
pub mod status;
pub mod store;

// Re-export commonly used types
pub use aggregate::{DailyStepAggregate, DEFAULT_STEPS_GOAL};
pub use detector::{StepDetector, StepDetectorConfig, StepEvent};
pub use error::{StepTrackerError, TrackerResult};
pub use sampler::{AccelSample, MotionSampler, SamplerSubscription};
pub use session::{TrackingSession, TrackingState};
pub use store::{JsonFileStore, MemoryStore, StepStore, UserProfile};

use crate::error::{StepTrackerError, TrackerResult};
use chrono::Utc;
use log::debug;
use serde::{Deserialize, Serialize};
use std::process::Command;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

/// Standard gravity, for converting device readings (m/s²) into g units
const STANDARD_GRAVITY_MS2: f64 = 9.81;

/// Accelerometer sample in g units (resting magnitude ≈ 1.0)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccelSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp_ms: i64,
}

impl AccelSample {
    pub fn new(x: f64, y: f64, z: f64, timestamp_ms: i64) -> Self {
        Self {
            x,
            y,
            z,
            timestamp_ms,
        }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Sensor layers can deliver NaN axes under load; such samples are dropped
    pub fn validate(&self) -> TrackerResult<()> {
        if self.x.is_finite() && self.y.is_finite() && self.z.is_finite() {
            Ok(())
        } else {
            Err(StepTrackerError::InvalidSample(format!(
                "non-finite axes ({}, {}, {})",
                self.x, self.y, self.z
            )))
        }
    }
}

/// Continuous accelerometer sampling at a fixed interval.
///
/// Samples are delivered in arrival order over a bounded channel; when the
/// consumer falls behind, samples are dropped rather than buffered.
pub struct MotionSampler {
    interval_ms: u64,
    mock: bool,
}

impl MotionSampler {
    pub fn new(interval_ms: u64, mock: bool) -> Self {
        Self { interval_ms, mock }
    }

    /// Begin sampling. Fails when no accelerometer source is reachable and
    /// synthetic data is not enabled.
    pub fn start(&self) -> TrackerResult<SamplerSubscription> {
        if !self.mock && read_accelerometer().is_none() {
            return Err(StepTrackerError::SensorUnavailable(
                "termux-sensor returned no accelerometer data".to_string(),
            ));
        }

        let (tx, rx) = mpsc::channel::<AccelSample>(500);
        let task = tokio::spawn(sample_loop(tx, self.interval_ms, self.mock));

        Ok(SamplerSubscription { rx, task })
    }
}

/// Handle owning the live sensor stream. Dropping it stops sampling, so the
/// sensor is released on every exit path of the owning scope.
pub struct SamplerSubscription {
    rx: Receiver<AccelSample>,
    task: JoinHandle<()>,
}

impl SamplerSubscription {
    /// Non-blocking receive of the next sample, if one has arrived
    pub fn try_next(&mut self) -> Option<AccelSample> {
        self.rx.try_recv().ok()
    }

    pub async fn next(&mut self) -> Option<AccelSample> {
        self.rx.recv().await
    }

    /// Stop sampling. No further samples are delivered after this returns.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for SamplerSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn sample_loop(tx: Sender<AccelSample>, interval_ms: u64, mock: bool) {
    let mut interval = interval(Duration::from_millis(interval_ms));
    let mut sample_count = 0u64;

    loop {
        interval.tick().await;

        let sample = if mock {
            mock_walking_sample(Utc::now().timestamp_millis())
        } else {
            match read_accelerometer() {
                Some(sample) => sample,
                // Sensor silent on this tick; treat as a dropped sample
                None => continue,
            }
        };

        match tx.try_send(sample) {
            Ok(_) => {
                sample_count += 1;
                if sample_count % 200 == 0 {
                    debug!("[sampler] {} samples", sample_count);
                }
            }
            Err(TrySendError::Closed(_)) => {
                debug!("[sampler] channel closed after {} samples", sample_count);
                break;
            }
            Err(TrySendError::Full(_)) => {
                // Consumer behind, drop this sample
            }
        }
    }
}

fn read_accelerometer() -> Option<AccelSample> {
    // One-shot read via termux-sensor
    // Format: Accelerometer event: x=X, y=Y, z=Z, accuracy=0, timestamp=TS
    match Command::new("termux-sensor")
        .arg("-n")
        .arg("1")
        .arg("-s")
        .arg("accelerometer")
        .output()
    {
        Ok(output) => {
            let text = String::from_utf8_lossy(&output.stdout);
            parse_accel_output(&text)
        }
        Err(_) => None,
    }
}

fn parse_accel_output(output: &str) -> Option<AccelSample> {
    let mut x = None;
    let mut y = None;
    let mut z = None;

    for part in output.split(',') {
        if let Some(val_str) = part.strip_prefix("x=") {
            x = val_str.trim().parse::<f64>().ok();
        } else if let Some(val_str) = part.strip_prefix("y=") {
            y = val_str.trim().parse::<f64>().ok();
        } else if let Some(val_str) = part.strip_prefix("z=") {
            z = val_str.trim().parse::<f64>().ok();
        }
    }

    // Device reports m/s²; the detector works in g
    Some(AccelSample::new(
        x? / STANDARD_GRAVITY_MS2,
        y? / STANDARD_GRAVITY_MS2,
        z? / STANDARD_GRAVITY_MS2,
        Utc::now().timestamp_millis(),
    ))
}

/// Cadence of the synthetic gait, chosen to stay under the detector's
/// physiological cadence ceiling
const MOCK_STEP_PERIOD_MS: i64 = 600;
const MOCK_PEAK_WINDOW_MS: i64 = 240;
const MOCK_PEAK_AMPLITUDE: f64 = 0.55;

/// Deterministic synthetic walking pattern: a half-sine impact spike at the
/// start of each gait cycle, resting magnitude 1.0 g in between
pub fn mock_walking_sample(t_ms: i64) -> AccelSample {
    let phase_ms = t_ms.rem_euclid(MOCK_STEP_PERIOD_MS);
    let magnitude = if phase_ms < MOCK_PEAK_WINDOW_MS {
        let phase = phase_ms as f64 / MOCK_PEAK_WINDOW_MS as f64;
        1.0 + MOCK_PEAK_AMPLITUDE * (std::f64::consts::PI * phase).sin()
    } else {
        1.0
    };

    // Small lateral sway, dominant component along z
    let x = 0.04 * (t_ms as f64 / 900.0).sin();
    let y = 0.03 * (t_ms as f64 / 1100.0).cos();
    let z = (magnitude * magnitude - x * x - y * y).sqrt();

    AccelSample::new(x, y, z, t_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_magnitude() {
        let sample = AccelSample::new(3.0, 4.0, 0.0, 0);
        assert_eq!(sample.magnitude(), 5.0);
    }

    #[test]
    fn test_validate_rejects_non_finite_axes() {
        assert!(AccelSample::new(0.0, 0.0, 1.0, 0).validate().is_ok());
        assert!(AccelSample::new(f64::NAN, 0.0, 1.0, 0).validate().is_err());
        assert!(AccelSample::new(0.0, f64::INFINITY, 1.0, 0).validate().is_err());
    }

    #[test]
    fn test_parse_accel_output() {
        let text = "Accelerometer event: x=0.0, y=0.0, z=9.81, accuracy=0, timestamp=123";
        let sample = parse_accel_output(text).unwrap();
        assert_relative_eq!(sample.magnitude(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_parse_accel_output_incomplete() {
        assert!(parse_accel_output("").is_none());
        assert!(parse_accel_output("x=1.0, y=2.0").is_none());
    }

    #[test]
    fn test_mock_walking_sample_shape() {
        // Resting magnitude between impacts, spike above 1.35 g at mid-peak
        let resting = mock_walking_sample(MOCK_PEAK_WINDOW_MS + 100);
        assert_relative_eq!(resting.magnitude(), 1.0, epsilon = 1e-9);

        let peak = mock_walking_sample(MOCK_PEAK_WINDOW_MS / 2);
        assert!(peak.magnitude() > 1.5);
    }

    #[tokio::test]
    async fn test_mock_sampler_delivers_samples() {
        let sampler = MotionSampler::new(10, true);
        let mut subscription = sampler.start().unwrap();

        let mut received = 0;
        for _ in 0..5 {
            if subscription.next().await.is_some() {
                received += 1;
            }
        }
        assert_eq!(received, 5);

        subscription.cancel();
    }
}

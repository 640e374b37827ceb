use crate::sampler::AccelSample;
use log::debug;

/// Configuration for step detection.
#[derive(Debug, Clone)]
pub struct StepDetectorConfig {
    /// Weight kept by the previous filtered value (new sample weighs 1 − α).
    pub smoothing_alpha: f64,
    /// Filtered magnitude above which a rising edge arms the detector (g).
    pub threshold_high: f64,
    /// Filtered magnitude below which an armed detector releases (g).
    pub threshold_low: f64,
    /// Minimum time between two counted steps in milliseconds.
    pub debounce_ms: i64,
}

impl Default for StepDetectorConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.6,
            threshold_high: 1.35,
            threshold_low: 1.10,
            debounce_ms: 400, // caps cadence at ~150 steps/minute
        }
    }
}

/// A recognized footstep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepEvent {
    pub timestamp_ms: i64,
    /// Filtered magnitude at the falling edge that released the step
    pub filtered: f64,
}

/// Two-threshold peak detection: a single threshold retriggers on sensor
/// noise hovering near it, so arming and releasing use distinct levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeakState {
    /// No peak pending
    Idle,
    /// Rising edge seen, waiting for the falling edge
    Armed,
}

/// Step detector over a smoothed acceleration magnitude.
///
/// State persists for the whole tracking session; it is only reset when a
/// new session starts.
pub struct StepDetector {
    config: StepDetectorConfig,
    filtered: f64,
    state: PeakState,
    last_step_at_ms: Option<i64>,
    total_steps: u64,
}

impl StepDetector {
    pub fn new(config: StepDetectorConfig) -> Self {
        Self {
            config,
            filtered: 0.0,
            state: PeakState::Idle,
            last_step_at_ms: None,
            total_steps: 0,
        }
    }

    /// Process a single sample. Returns a StepEvent when the sample completes
    /// a debounced peak, None otherwise.
    pub fn process_sample(&mut self, sample: &AccelSample) -> Option<StepEvent> {
        if let Err(e) = sample.validate() {
            // Dropped sample; filter state stays untouched
            debug!("[detector] discarded: {}", e);
            return None;
        }

        let magnitude = sample.magnitude();
        self.filtered = self.config.smoothing_alpha * self.filtered
            + (1.0 - self.config.smoothing_alpha) * magnitude;

        match self.state {
            PeakState::Idle => {
                if self.filtered > self.config.threshold_high {
                    self.state = PeakState::Armed;
                }
                None
            }
            PeakState::Armed => {
                if self.filtered < self.config.threshold_low {
                    self.state = PeakState::Idle;

                    // A peak's oscillation can cross the thresholds twice;
                    // only the first crossing inside the window counts
                    let debounced = self
                        .last_step_at_ms
                        .map_or(true, |t| sample.timestamp_ms - t > self.config.debounce_ms);

                    if debounced {
                        self.last_step_at_ms = Some(sample.timestamp_ms);
                        self.total_steps += 1;
                        return Some(StepEvent {
                            timestamp_ms: sample.timestamp_ms,
                            filtered: self.filtered,
                        });
                    }
                }
                None
            }
        }
    }

    /// Process a batch of samples and return all recognized steps in order.
    pub fn process_batch(&mut self, samples: &[AccelSample]) -> Vec<StepEvent> {
        samples
            .iter()
            .filter_map(|sample| self.process_sample(sample))
            .collect()
    }

    /// Current smoothed magnitude
    pub fn filtered(&self) -> f64 {
        self.filtered
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Return to the initial state (fresh session)
    pub fn reset(&mut self) {
        self.filtered = 0.0;
        self.state = PeakState::Idle;
        self.last_step_at_ms = None;
        self.total_steps = 0;
    }
}

impl Default for StepDetector {
    fn default() -> Self {
        Self::new(StepDetectorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::mock_walking_sample;

    const INTERVAL_MS: i64 = 50;

    fn mag_sample(magnitude: f64, timestamp_ms: i64) -> AccelSample {
        AccelSample::new(0.0, 0.0, magnitude, timestamp_ms)
    }

    /// One gait cycle: impact spike then settle, `gap_samples` of rest after
    fn footstep_pattern(peaks: u32, gap_samples: u32) -> Vec<AccelSample> {
        let mut samples = Vec::new();
        let mut t = 0i64;

        // Settle the filter at resting magnitude first
        for _ in 0..10 {
            samples.push(mag_sample(1.0, t));
            t += INTERVAL_MS;
        }

        for _ in 0..peaks {
            for _ in 0..4 {
                samples.push(mag_sample(1.5, t));
                t += INTERVAL_MS;
            }
            for _ in 0..gap_samples {
                samples.push(mag_sample(1.0, t));
                t += INTERVAL_MS;
            }
        }
        samples
    }

    #[test]
    fn test_resting_signal_emits_nothing() {
        let mut detector = StepDetector::default();

        for i in 0..20 {
            let event = detector.process_sample(&mag_sample(1.0, i * INTERVAL_MS));
            assert!(event.is_none());
        }

        assert_eq!(detector.total_steps(), 0);
        // Exponential average converges toward the resting magnitude
        assert!((detector.filtered() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_three_spaced_peaks_yield_three_steps() {
        let mut detector = StepDetector::default();
        // 4 spike samples + 10 resting samples = 700 ms per cycle
        let events = detector.process_batch(&footstep_pattern(3, 10));

        assert_eq!(events.len(), 3);
        assert_eq!(detector.total_steps(), 3);
    }

    #[test]
    fn test_debounce_suppresses_close_peaks() {
        let mut detector = StepDetector::default();
        // 4 spike samples + 4 resting samples = 400 ms per cycle, under the window
        let events = detector.process_batch(&footstep_pattern(6, 4));

        assert!(events.len() < 6, "expected suppressed peaks, got {}", events.len());
        for pair in events.windows(2) {
            assert!(
                pair[1].timestamp_ms - pair[0].timestamp_ms > 400,
                "steps {} ms apart",
                pair[1].timestamp_ms - pair[0].timestamp_ms
            );
        }
    }

    #[test]
    fn test_oscillation_below_high_threshold_emits_nothing() {
        let mut detector = StepDetector::default();

        for i in 0..100 {
            let magnitude = if i % 2 == 0 { 1.05 } else { 1.30 };
            let event = detector.process_sample(&mag_sample(magnitude, i * INTERVAL_MS));
            assert!(event.is_none());
        }
        assert_eq!(detector.total_steps(), 0);
    }

    #[test]
    fn test_non_finite_sample_is_discarded() {
        let mut detector = StepDetector::default();

        for i in 0..10 {
            detector.process_sample(&mag_sample(1.0, i * INTERVAL_MS));
        }
        let before = detector.filtered();

        let event = detector.process_sample(&AccelSample::new(f64::NAN, 0.0, 1.0, 500));
        assert!(event.is_none());
        assert_eq!(detector.filtered(), before);
    }

    #[test]
    fn test_steps_are_ordered_and_debounced() {
        let mut detector = StepDetector::default();
        let mut events = Vec::new();

        // 30 seconds of synthetic walking at 20 Hz
        for i in 0..600 {
            if let Some(event) = detector.process_sample(&mock_walking_sample(i * INTERVAL_MS)) {
                events.push(event);
            }
        }

        assert!(events.len() > 30, "expected a steady cadence, got {}", events.len());
        assert_eq!(detector.total_steps(), events.len() as u64);
        for pair in events.windows(2) {
            assert!(pair[1].timestamp_ms - pair[0].timestamp_ms > 400);
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let mut detector = StepDetector::default();
        detector.process_batch(&footstep_pattern(2, 10));
        assert!(detector.total_steps() > 0);

        detector.reset();
        assert_eq!(detector.total_steps(), 0);
        assert_eq!(detector.filtered(), 0.0);
    }
}

//! Amplitude-based voice activity detection on the remote audio signal.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadConfig {
    /// RMS at or above which the agent counts as speaking.
    pub start_threshold: f32,
    /// RMS below which silence may end speech. Must be below `start_threshold`.
    pub stop_threshold: f32,
    /// How long RMS must stay below start before speech is considered over.
    pub min_silence: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            start_threshold: 0.04,
            stop_threshold: 0.02,
            min_silence: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEdge {
    SpeechStarted,
    SpeechEnded,
}

/// Root-mean-square amplitude of `samples`, clamped to `[0, 1]`.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    let value = (sum_sq / samples.len() as f32).sqrt();
    if value.is_nan() { 0.0 } else { value.min(1.0) }
}

/// Two-threshold detector: `start_threshold` opens speech, and only a stretch
/// of `min_silence` ending below `stop_threshold` closes it.
#[derive(Debug)]
pub struct VoiceActivityDetector {
    config: VadConfig,
    speaking: bool,
    last_loud: Option<Instant>,
}

impl VoiceActivityDetector {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            speaking: false,
            last_loud: None,
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Feeds one frame's RMS observed at `now`.
    pub fn observe(&mut self, level: f32, now: Instant) -> Option<VadEdge> {
        if level >= self.config.start_threshold {
            self.last_loud = Some(now);
            if !self.speaking {
                self.speaking = true;
                return Some(VadEdge::SpeechStarted);
            }
            return None;
        }

        if self.speaking && level < self.config.stop_threshold {
            let quiet_for = self
                .last_loud
                .map(|t| now.saturating_duration_since(t))
                .unwrap_or(Duration::MAX);
            if quiet_for >= self.config.min_silence {
                self.speaking = false;
                return Some(VadEdge::SpeechEnded);
            }
        }
        None
    }

    pub fn reset(&mut self) {
        self.speaking = false;
        self.last_loud = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rms_values() {
        assert_eq!(rms(&[]), 0.0);
        assert_abs_diff_eq!(rms(&[0.5, -0.5, 0.5, -0.5]), 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(rms(&[3.0, -3.0]), 1.0, epsilon = 1e-6);
        assert_eq!(rms(&[f32::NAN, 0.1]), 0.0);
    }

    #[test]
    fn test_short_dip_keeps_speaking() {
        let start = Instant::now();
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        assert_eq!(vad.observe(0.05, start), Some(VadEdge::SpeechStarted));

        let mut t = 16;
        while t <= 250 {
            assert_eq!(vad.observe(0.01, start + Duration::from_millis(t)), None);
            t += 16;
        }
        assert!(vad.is_speaking());
        assert_eq!(vad.observe(0.01, start + Duration::from_millis(250)), None);

        assert_eq!(
            vad.observe(0.01, start + Duration::from_millis(300)),
            Some(VadEdge::SpeechEnded)
        );
        assert!(!vad.is_speaking());
    }

    #[test]
    fn test_level_between_thresholds_does_not_end_speech() {
        let start = Instant::now();
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        vad.observe(0.08, start);
        assert_eq!(vad.observe(0.03, start + Duration::from_millis(900)), None);
        assert!(vad.is_speaking());
        assert_eq!(
            vad.observe(0.0, start + Duration::from_millis(901)),
            Some(VadEdge::SpeechEnded)
        );
    }

    #[test]
    fn test_renewed_loudness_restarts_silence_window() {
        let start = Instant::now();
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        vad.observe(0.05, start);
        vad.observe(0.01, start + Duration::from_millis(200));
        assert_eq!(vad.observe(0.06, start + Duration::from_millis(250)), None);
        assert_eq!(vad.observe(0.01, start + Duration::from_millis(500)), None);
        assert_eq!(
            vad.observe(0.01, start + Duration::from_millis(550)),
            Some(VadEdge::SpeechEnded)
        );
    }

    #[test]
    fn test_silence_before_speech_emits_nothing() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        assert_eq!(vad.observe(0.0, Instant::now()), None);
        vad.observe(0.5, Instant::now());
        vad.reset();
        assert!(!vad.is_speaking());
    }
}

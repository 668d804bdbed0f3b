use std::collections::VecDeque;

use crate::constants::METRICS_WINDOW;
use crate::engine::frame::FrameDigest;

/// Rolling pipeline observations. The processing-time window is capped at
/// thirty samples; counters are reset by the once-per-second performance
/// log, not by the quality controller.
#[derive(Debug, Default)]
pub struct Metrics {
    processing_times: VecDeque<f64>,
    pub dropped_frames: u64,
    pub frames_sent: u64,
    pub last_frame_sent_ms: Option<u128>,
    pub last_frame_hash: Option<FrameDigest>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_processing_time(&mut self, ms: f64) {
        if self.processing_times.len() == METRICS_WINDOW {
            self.processing_times.pop_front();
        }
        self.processing_times.push_back(ms);
    }

    pub fn avg_processing_ms(&self) -> f64 {
        if self.processing_times.is_empty() {
            return 0.0;
        }
        self.processing_times.iter().sum::<f64>() / self.processing_times.len() as f64
    }

    /// Average over the most recent `n` samples only.
    pub fn recent_avg_ms(&self, n: usize) -> f64 {
        if self.processing_times.is_empty() || n == 0 {
            return 0.0;
        }
        let tail = self.processing_times.len().min(n);
        let sum: f64 = self
            .processing_times
            .iter()
            .rev()
            .take(tail)
            .sum();
        sum / tail as f64
    }

    pub fn drop_rate(&self) -> f64 {
        self.dropped_frames as f64 / (self.dropped_frames + self.frames_sent + 1) as f64
    }

    /// Clears only the rolling window; used when a viewer changes settings.
    pub fn reset_window(&mut self) {
        self.processing_times.clear();
    }

    /// Clears the sent/dropped counters; used by the performance log.
    pub fn reset_counters(&mut self) {
        self.dropped_frames = 0;
        self.frames_sent = 0;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_capped() {
        let mut metrics = Metrics::new();
        for i in 0..100 {
            metrics.push_processing_time(i as f64);
        }
        // Only the last 30 samples remain: 70..=99 averages to 84.5.
        assert!((metrics.avg_processing_ms() - 84.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_recent_avg_uses_tail() {
        let mut metrics = Metrics::new();
        for ms in [10.0, 10.0, 10.0, 50.0, 50.0] {
            metrics.push_processing_time(ms);
        }
        assert!((metrics.recent_avg_ms(2) - 50.0).abs() < f64::EPSILON);
        assert!((metrics.recent_avg_ms(5) - 26.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_drop_rate_denominator_offsets_by_one() {
        let mut metrics = Metrics::new();
        assert_eq!(metrics.drop_rate(), 0.0);
        metrics.dropped_frames = 3;
        metrics.frames_sent = 6;
        assert!((metrics.drop_rate() - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset_window_keeps_counters() {
        let mut metrics = Metrics::new();
        metrics.push_processing_time(12.0);
        metrics.dropped_frames = 2;
        metrics.frames_sent = 5;
        metrics.reset_window();
        assert_eq!(metrics.avg_processing_ms(), 0.0);
        assert_eq!(metrics.dropped_frames, 2);
        assert_eq!(metrics.frames_sent, 5);
    }
}

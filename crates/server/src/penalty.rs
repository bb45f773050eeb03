//! Virus-eat penalty.
//!
//! Eating viruses in quick succession accelerates mass decay for a while.

use crate::config::PenaltyConfig;
use crate::Timestamp;
use std::collections::VecDeque;

/// Sliding window of virus-eat timestamps for one player.
#[derive(Debug, Clone, Default)]
pub struct PenaltyTracker {
    eats: VecDeque<Timestamp>,
}

impl PenaltyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a virus eat at `now`.
    pub fn record(&mut self, now: Timestamp) {
        self.eats.push_back(now);
    }

    /// Eats still inside the window.
    pub fn recent(&mut self, now: Timestamp, cfg: &PenaltyConfig) -> usize {
        let window_ms = cfg.window_secs * 1000;
        while let Some(&oldest) = self.eats.front() {
            if now.saturating_sub(oldest) >= window_ms {
                self.eats.pop_front();
            } else {
                break;
            }
        }
        self.eats.len()
    }

    /// Decay multiplier for the current window: 1 below the threshold, then
    /// one `step` per eat at or past it, capped at `max_multiplier`.
    pub fn multiplier(&mut self, now: Timestamp, cfg: &PenaltyConfig) -> f32 {
        let recent = self.recent(now, cfg);
        if recent < cfg.threshold {
            return 1.0;
        }
        let excess = (recent - cfg.threshold + 1) as f32;
        (1.0 + excess * cfg.step).min(cfg.max_multiplier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_is_neutral() {
        let cfg = PenaltyConfig::default();
        let mut tracker = PenaltyTracker::new();
        for t in 0..(cfg.threshold as u64 - 1) {
            tracker.record(t * 100);
        }
        assert_eq!(tracker.multiplier(1_000, &cfg), 1.0);
    }

    #[test]
    fn test_rises_at_threshold_and_caps() {
        let cfg = PenaltyConfig::default();
        let mut tracker = PenaltyTracker::new();
        for t in 0..cfg.threshold as u64 {
            tracker.record(t);
        }
        assert_eq!(tracker.multiplier(10, &cfg), 1.0 + cfg.step);

        for t in 0..20 {
            tracker.record(100 + t);
        }
        assert_eq!(tracker.multiplier(200, &cfg), cfg.max_multiplier);
    }

    #[test]
    fn test_window_expires() {
        let cfg = PenaltyConfig::default();
        let mut tracker = PenaltyTracker::new();
        for t in 0..10 {
            tracker.record(t);
        }
        assert!(tracker.multiplier(100, &cfg) > 1.0);

        let later = cfg.window_secs * 1000 + 10;
        assert_eq!(tracker.multiplier(later, &cfg), 1.0);
        assert_eq!(tracker.recent(later, &cfg), 0);
    }
}

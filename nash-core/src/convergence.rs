//! Sliding-window convergence detection
//!
//! A run is considered converged once every player's payoff stayed within
//! an interval of width `interval` for the last `size` iterations.

use crate::error::{NashError, Result};
use crate::Payoff;

/// Circular buffer of the most recent payoff vectors
#[derive(Clone, Debug)]
pub struct ConvergenceTracker {
    n_players: usize,
    interval: Payoff,
    size: usize,
    /// Number of payoff vectors recorded since the last reset
    time: usize,
    /// `size` rows of `n_players` payoffs
    window: Vec<Payoff>,
}

impl ConvergenceTracker {
    /// Create a tracker for `n_players` over a window of `size` iterations
    pub fn new(n_players: usize, interval: Payoff, size: usize) -> Result<Self> {
        if n_players == 0 || size == 0 {
            return Err(NashError::precondition(format!(
                "convergence tracker needs players and a window, got {} players and size {}",
                n_players, size
            )));
        }
        if !(interval >= 0.0) {
            return Err(NashError::precondition(format!(
                "convergence interval must be non-negative, got {}",
                interval
            )));
        }
        Ok(Self {
            n_players,
            interval,
            size,
            time: 0,
            window: vec![0.0; n_players * size],
        })
    }

    pub fn n_players(&self) -> usize {
        self.n_players
    }

    pub fn interval(&self) -> Payoff {
        self.interval
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn time(&self) -> usize {
        self.time
    }

    /// Forget every recorded payoff
    pub fn reset(&mut self) {
        self.window.iter_mut().for_each(|v| *v = 0.0);
        self.time = 0;
    }

    /// Record this iteration's payoffs and report convergence
    ///
    /// Always false until the window has been overfilled, i.e. for the first
    /// `size` calls after a reset.
    pub fn check(&mut self, payoffs: &[Payoff]) -> bool {
        let slot = self.time % self.size;
        let start = slot * self.n_players;
        self.window[start..start + self.n_players].copy_from_slice(&payoffs[..self.n_players]);
        self.time += 1;

        if self.time <= self.size {
            return false;
        }

        let stable = (0..self.n_players)
            .filter(|&player| {
                let (min, max) = self
                    .window
                    .iter()
                    .skip(player)
                    .step_by(self.n_players)
                    .fold((Payoff::INFINITY, Payoff::NEG_INFINITY), |(lo, hi), &v| {
                        (lo.min(v), hi.max(v))
                    });
                max - min <= self.interval
            })
            .count();

        stable == self.n_players
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_sequence() {
        let size = 5;
        let mut tracker = ConvergenceTracker::new(2, 0.0, size).unwrap();
        for _ in 0..size {
            assert!(!tracker.check(&[1.0, 2.0]));
        }
        for _ in 0..20 {
            assert!(tracker.check(&[1.0, 2.0]));
        }
        assert_eq!(tracker.time(), size + 20);
    }

    #[test]
    fn test_unstable_player_blocks_convergence() {
        let mut tracker = ConvergenceTracker::new(2, 0.5, 3).unwrap();
        for i in 0..10 {
            let swing = if i % 2 == 0 { 0.0 } else { 1.0 };
            assert!(!tracker.check(&[1.0, swing]));
        }
    }

    #[test]
    fn test_converges_once_old_values_leave_window() {
        let mut tracker = ConvergenceTracker::new(1, 0.1, 3).unwrap();
        assert!(!tracker.check(&[0.0]));
        assert!(!tracker.check(&[10.0]));
        assert!(!tracker.check(&[0.0]));
        // [0.05, 10, 0]
        assert!(!tracker.check(&[0.05]));
        // [0.05, 0, 0]
        assert!(tracker.check(&[0.0]));
    }

    #[test]
    fn test_interval_is_inclusive() {
        let mut tracker = ConvergenceTracker::new(1, 0.5, 2).unwrap();
        tracker.check(&[1.0]);
        tracker.check(&[1.5]);
        assert!(tracker.check(&[1.0]));
    }

    #[test]
    fn test_reset() {
        let mut tracker = ConvergenceTracker::new(2, 0.0, 2).unwrap();
        for _ in 0..5 {
            tracker.check(&[3.0, 3.0]);
        }
        tracker.reset();
        assert_eq!(tracker.time(), 0);
        assert!(!tracker.check(&[3.0, 3.0]));
        assert!(!tracker.check(&[3.0, 3.0]));
        assert!(tracker.check(&[3.0, 3.0]));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(ConvergenceTracker::new(2, 0.1, 0).is_err());
        assert!(ConvergenceTracker::new(0, 0.1, 5).is_err());
        assert!(ConvergenceTracker::new(2, -1.0, 5).is_err());
    }
}

//! Configuration types for the learning engines
//!
//! Level 4 - Utilities and configuration

use nash_core::{NashError, Proba, ProbaMatrix, Result};
use serde::{Deserialize, Serialize};

/// Settings of the control loop shared by every engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Iteration budget (None = run until another stop condition fires)
    pub max_time: Option<u32>,
    /// Checkpoint every `save_interval` iterations (needs a checkpoint store)
    pub save_interval: u32,
    /// Invoke the feedback hook every `feedback_interval` iterations
    pub feedback_interval: u32,
    /// Run seed; every random stream is derived from it
    pub seed: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_time: None,
            save_interval: 1000,
            feedback_interval: 1000,
            seed: 42,
        }
    }
}

impl RunConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_time(mut self, max_time: u32) -> Self {
        self.max_time = Some(max_time);
        self
    }

    pub fn with_save_interval(mut self, save_interval: u32) -> Self {
        self.save_interval = save_interval;
        self
    }

    pub fn with_feedback_interval(mut self, feedback_interval: u32) -> Self {
        self.feedback_interval = feedback_interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.save_interval == 0 || self.feedback_interval == 0 {
            return Err(precondition("save and feedback intervals must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// AUTOMATON
// ============================================================================

/// Reinforcement-learning automaton configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomatonConfig {
    /// Dampening constant in (0, 1]. Smaller values need more iterations
    /// but overshoot equilibria less often.
    pub b: Proba,
    /// Starting rows (None = uniform)
    pub initial: Option<ProbaMatrix>,
    pub run: RunConfig,
}

impl Default for AutomatonConfig {
    fn default() -> Self {
        Self {
            b: 0.01,
            initial: None,
            run: RunConfig::default(),
        }
    }
}

impl AutomatonConfig {
    pub fn new(b: Proba) -> Self {
        Self {
            b,
            ..Default::default()
        }
    }

    pub fn with_initial(mut self, initial: ProbaMatrix) -> Self {
        self.initial = Some(initial);
        self
    }

    pub fn with_run(mut self, run: RunConfig) -> Self {
        self.run = run;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.run.seed = seed;
        self
    }

    pub fn with_max_time(mut self, max_time: u32) -> Self {
        self.run.max_time = Some(max_time);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_b(self.b)?;
        self.run.validate()
    }
}

// ============================================================================
// MONTE-CARLO BEST RESPONSE
// ============================================================================

/// Monte-Carlo best-response configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BestResponseConfig {
    /// Dampening constant in (0, 1]
    pub b: Proba,
    /// Trials per candidate strategy
    pub n_sim: usize,
    /// Worker threads for the per-player estimation
    pub max_threads: usize,
    /// Starting rows (None = uniform)
    pub initial: Option<ProbaMatrix>,
    pub run: RunConfig,
}

impl Default for BestResponseConfig {
    fn default() -> Self {
        Self {
            b: 0.01,
            n_sim: 100,
            max_threads: 4,
            initial: None,
            run: RunConfig::default().with_feedback_interval(10),
        }
    }
}

impl BestResponseConfig {
    pub fn new(b: Proba, n_sim: usize) -> Self {
        Self {
            b,
            n_sim,
            ..Default::default()
        }
    }

    pub fn with_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn with_initial(mut self, initial: ProbaMatrix) -> Self {
        self.initial = Some(initial);
        self
    }

    pub fn with_run(mut self, run: RunConfig) -> Self {
        self.run = run;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.run.seed = seed;
        self
    }

    pub fn with_max_time(mut self, max_time: u32) -> Self {
        self.run.max_time = Some(max_time);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_b(self.b)?;
        if self.n_sim == 0 {
            return Err(precondition("n_sim must be positive"));
        }
        if self.max_threads == 0 {
            return Err(precondition("max_threads must be positive"));
        }
        self.run.validate()
    }
}

// ============================================================================
// FICTITIOUS PLAY
// ============================================================================

/// Stochastic fictitious play configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FictitiousConfig {
    /// Joint actions drawn into the shared opponent pool each iteration
    pub sampling_size: usize,
    /// Worker threads for the per-player estimation
    pub max_threads: usize,
    /// `forbidden[player][strategy]` excludes a strategy for the whole run
    pub forbidden: Option<Vec<Vec<bool>>>,
    /// Starting action counts (None = 1 per allowed strategy)
    pub initial_counts: Option<Vec<Vec<u64>>>,
    pub run: RunConfig,
}

impl Default for FictitiousConfig {
    fn default() -> Self {
        Self {
            sampling_size: 100,
            max_threads: 4,
            forbidden: None,
            initial_counts: None,
            run: RunConfig::default().with_feedback_interval(10),
        }
    }
}

impl FictitiousConfig {
    pub fn new(sampling_size: usize) -> Self {
        Self {
            sampling_size,
            ..Default::default()
        }
    }

    pub fn with_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    pub fn with_forbidden(mut self, forbidden: Vec<Vec<bool>>) -> Self {
        self.forbidden = Some(forbidden);
        self
    }

    pub fn with_initial_counts(mut self, counts: Vec<Vec<u64>>) -> Self {
        self.initial_counts = Some(counts);
        self
    }

    pub fn with_run(mut self, run: RunConfig) -> Self {
        self.run = run;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.run.seed = seed;
        self
    }

    pub fn with_max_time(mut self, max_time: u32) -> Self {
        self.run.max_time = Some(max_time);
        self
    }

    /// True if `strategy` is excluded for `player`
    pub fn is_forbidden(&self, player: usize, strategy: usize) -> bool {
        self.forbidden
            .as_ref()
            .and_then(|mask| mask.get(player))
            .and_then(|row| row.get(strategy))
            .copied()
            .unwrap_or(false)
    }

    /// Check the configuration against a game shape
    pub fn validate(&self, n_players: usize, n_strategies: usize) -> Result<()> {
        if self.sampling_size == 0 {
            return Err(precondition("sampling_size must be positive"));
        }
        if self.max_threads == 0 {
            return Err(precondition("max_threads must be positive"));
        }

        if let Some(mask) = &self.forbidden {
            check_shape(mask, n_players, n_strategies, "forbidden-action mask")?;
            if let Some(player) = mask.iter().position(|row| row.iter().all(|&f| f)) {
                return Err(precondition(format!(
                    "every strategy of player {} is forbidden",
                    player
                )));
            }
        }

        if let Some(counts) = &self.initial_counts {
            check_shape(counts, n_players, n_strategies, "initial counts")?;
            for (player, row) in counts.iter().enumerate() {
                if row.iter().sum::<u64>() == 0 {
                    return Err(precondition(format!(
                        "initial counts of player {} are all zero",
                        player
                    )));
                }
                for (strategy, &count) in row.iter().enumerate() {
                    if count > 0 && self.is_forbidden(player, strategy) {
                        return Err(precondition(format!(
                            "forbidden strategy {} of player {} has initial counts",
                            strategy, player
                        )));
                    }
                }
            }
        }

        self.run.validate()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn precondition(msg: impl Into<String>) -> NashError {
    NashError::PreconditionViolation(msg.into())
}

fn validate_b(b: Proba) -> Result<()> {
    if b > 0.0 && b <= 1.0 {
        Ok(())
    } else {
        Err(precondition(format!("b must be in (0, 1], got {}", b)))
    }
}

fn check_shape<T>(
    rows: &[Vec<T>],
    n_players: usize,
    n_strategies: usize,
    what: &str,
) -> Result<()> {
    if rows.len() != n_players || rows.iter().any(|row| row.len() != n_strategies) {
        return Err(precondition(format!(
            "{} must be {}x{}",
            what, n_players, n_strategies
        )));
    }
    Ok(())
}

//! Monte-Carlo best response
//!
//! Level 2 - Phase-level implementation
//!
//! Each player estimates the value of every strategy still in its support by
//! simulating `n_sim` games against opponents drawn from their current rows,
//! then plays the best estimate. The estimation fans out over players on a
//! bounded rayon pool; the joint action is only used after the join.

use std::path::Path;

use nash_core::{
    sample_strategy, Game, NashError, Payoff, PayoffFunction, ProbaMatrix, Result,
};
use rand::Rng;
use rayon::prelude::*;

use crate::automaton::{reinforce, with_player};
use crate::config::BestResponseConfig;
use crate::engine::{
    drive, thread_pool, unit_rng, worker_index, Hooks, Learner, RunOutcome, RunState, Scratch,
};

/// Best-response engine over a borrowed game
pub struct BestResponse<'a> {
    game: &'a Game,
    config: BestResponseConfig,
    state: RunState,
    hooks: Hooks<'a>,
    pool: rayon::ThreadPool,
    /// One estimation unit per player
    units: Vec<Scratch>,
}

impl<'a> BestResponse<'a> {
    /// Create an engine and its worker pool
    pub fn new(game: &'a Game, config: BestResponseConfig, hooks: Hooks<'a>) -> Result<Self> {
        game.validate()?;
        config.validate()?;
        hooks.validate(game.n_players())?;

        let pool = thread_pool(config.max_threads)?;
        Ok(Self {
            game,
            state: RunState::new(game.n_players(), game.n_strategies()),
            units: Scratch::per_player(game.n_players(), game.n_strategies()),
            config,
            hooks,
            pool,
        })
    }

    pub fn config(&self) -> &BestResponseConfig {
        &self.config
    }

    /// Estimated value of every strategy from the last iteration, per player
    ///
    /// Strategies outside the support are reported as negative infinity.
    pub fn estimates(&self, player: usize) -> &[Payoff] {
        &self.units[player].values
    }
}

impl Learner for BestResponse<'_> {
    fn run(&mut self) -> Result<RunOutcome> {
        let game = self.game;
        let payoff_fn = game.payoff_fn()?;
        if !self.state.is_live() {
            self.state.proba = match &self.config.initial {
                Some(initial) => initial.clone(),
                None => ProbaMatrix::uniform(game.n_players(), game.n_strategies()),
            };
        }
        self.state
            .proba
            .validate(game.n_players(), game.n_strategies())?;

        let b = self.config.b;
        let n_sim = self.config.n_sim;
        let seed = self.config.run.seed;
        let pool = &self.pool;
        let units = &mut self.units;

        drive(
            "best-response",
            &self.config.run,
            &mut self.state,
            &mut self.hooks,
            |iteration, state| {
                let proba = &state.proba;
                let chosen: Vec<usize> = pool.install(|| {
                    units
                        .par_iter_mut()
                        .enumerate()
                        .map(|(player, unit)| {
                            // unit 0 is reserved for control-thread draws
                            let mut rng = unit_rng(seed, iteration, player + 1);
                            estimate_best(payoff_fn, proba, player, n_sim, unit, &mut rng)
                        })
                        .collect::<Result<Vec<usize>>>()
                })?;
                state.actions.copy_from_slice(&chosen);

                payoff_fn.evaluate(&state.actions, 0, &mut state.payoffs);

                for (player, &action) in chosen.iter().enumerate() {
                    reinforce(
                        state.proba.row_mut(player),
                        action,
                        state.payoffs[player],
                        b,
                    )
                    .map_err(|e| with_player(e, player))?;
                }
                state.proba.normalize()
            },
        )
    }

    fn resume_from(&mut self, path: &Path) -> Result<u32> {
        self.state.restore(path)
    }

    fn proba(&self) -> &ProbaMatrix {
        &self.state.proba
    }

    fn last_actions(&self) -> &[usize] {
        &self.state.actions
    }

    fn last_payoffs(&self) -> &[Payoff] {
        &self.state.payoffs
    }

    fn iteration(&self) -> Option<u32> {
        self.state.last
    }
}

// ============================================================================
// Level 3 - Estimation
// ============================================================================

/// First strategy with the highest simulated average payoff for `player`
fn estimate_best<R: Rng>(
    payoff_fn: &dyn PayoffFunction,
    proba: &ProbaMatrix,
    player: usize,
    n_sim: usize,
    unit: &mut Scratch,
    rng: &mut R,
) -> Result<usize> {
    let thread = worker_index();
    let mut best: Option<(usize, Payoff)> = None;

    for strategy in 0..proba.n_strategies() {
        // eliminated strategies stay eliminated
        if proba.row(player)[strategy] <= 0.0 {
            unit.values[strategy] = Payoff::NEG_INFINITY;
            continue;
        }

        let mut total = 0.0;
        for _ in 0..n_sim {
            for other in 0..proba.n_players() {
                unit.actions[other] = if other == player {
                    strategy
                } else {
                    sample_strategy(proba.row(other), rng)?
                };
            }
            payoff_fn.evaluate(&unit.actions, thread, &mut unit.payoffs);
            total += unit.payoffs[player];
        }

        let value = total / n_sim as Payoff;
        unit.values[strategy] = value;
        if best.map_or(true, |(_, best_value)| value > best_value) {
            best = Some((strategy, value));
        }
    }

    best.map(|(strategy, _)| strategy).ok_or_else(|| {
        NashError::InvariantViolation(format!("player {} has no strategy in its support", player))
    })
}

//! Stochastic fictitious play
//!
//! Level 2 - Phase-level implementation
//!
//! Beliefs are empirical action frequencies: every player keeps a count per
//! strategy and its row is `count / total`. Each iteration draws one pool of
//! joint actions from the current rows, every player best-responds to that
//! shared pool (fanned out on the worker pool), and the chosen actions are
//! added to the counts.

use std::path::Path;

use nash_core::{sample_strategy, Game, NashError, Payoff, PayoffFunction, ProbaMatrix, Result};
use rayon::prelude::*;

use crate::config::FictitiousConfig;
use crate::engine::{
    drive, thread_pool, unit_rng, worker_index, Hooks, Learner, RunOutcome, RunState, Scratch,
};

/// Fictitious-play engine over a borrowed game
pub struct FictitiousPlay<'a> {
    game: &'a Game,
    config: FictitiousConfig,
    state: RunState,
    hooks: Hooks<'a>,
    pool: rayon::ThreadPool,
    units: Vec<Scratch>,
    /// `allowed[player * n_strategies + strategy]`
    allowed: Vec<bool>,
    /// Counts before the first iteration, row-major
    initial_counts: Vec<u64>,
    /// Current counts, row-major
    counts: Vec<u64>,
    /// `sampling_size` joint actions, refilled every iteration
    samples: Vec<usize>,
}

impl<'a> FictitiousPlay<'a> {
    /// Create an engine and its worker pool
    pub fn new(game: &'a Game, config: FictitiousConfig, hooks: Hooks<'a>) -> Result<Self> {
        game.validate()?;
        let n_players = game.n_players();
        let n_strategies = game.n_strategies();
        config.validate(n_players, n_strategies)?;
        hooks.validate(n_players)?;

        let allowed: Vec<bool> = (0..n_players)
            .flat_map(|player| (0..n_strategies).map(move |strategy| (player, strategy)))
            .map(|(player, strategy)| !config.is_forbidden(player, strategy))
            .collect();
        let initial_counts: Vec<u64> = match &config.initial_counts {
            Some(rows) => rows.iter().flatten().copied().collect(),
            None => allowed.iter().map(|&a| u64::from(a)).collect(),
        };

        let pool = thread_pool(config.max_threads)?;
        Ok(Self {
            game,
            state: RunState::new(n_players, n_strategies),
            units: Scratch::per_player(n_players, n_strategies),
            samples: vec![0; config.sampling_size * n_players],
            counts: initial_counts.clone(),
            initial_counts,
            allowed,
            config,
            hooks,
            pool,
        })
    }

    pub fn config(&self) -> &FictitiousConfig {
        &self.config
    }

    /// Current action count of every strategy of `player`
    pub fn counts(&self, player: usize) -> &[u64] {
        let n = self.game.n_strategies();
        &self.counts[player * n..(player + 1) * n]
    }

    /// Rebuild counts from restored rows
    ///
    /// After iteration `t` every row has absorbed `t + 1` actions on top of
    /// its initial total, which fixes the scale of the counts.
    fn rebuild_counts(&mut self, iteration: u32) {
        let n = self.game.n_strategies();
        for player in 0..self.game.n_players() {
            let range = player * n..(player + 1) * n;
            let total = self.initial_counts[range.clone()].iter().sum::<u64>()
                + u64::from(iteration)
                + 1;
            let row = self.state.proba.row(player);
            let counts = &mut self.counts[range];
            for (count, &p) in counts.iter_mut().zip(row) {
                *count = (p as f64 * total as f64).round() as u64;
            }
            // rounding drift goes to the most played strategy
            let rounded = counts.iter().sum::<u64>();
            if let Some(largest) = counts.iter_mut().max_by_key(|count| **count) {
                *largest = (*largest + total).saturating_sub(rounded);
            }
        }
    }
}

impl Learner for FictitiousPlay<'_> {
    fn run(&mut self) -> Result<RunOutcome> {
        let game = self.game;
        let payoff_fn = game.payoff_fn()?;
        let n_players = game.n_players();
        let n_strategies = game.n_strategies();

        if !self.state.is_live() {
            self.counts.copy_from_slice(&self.initial_counts);
            frequencies(&self.counts, &mut self.state.proba)?;
        }
        self.state.proba.validate(n_players, n_strategies)?;

        let seed = self.config.run.seed;
        let sampling_size = self.config.sampling_size;
        let pool = &self.pool;
        let units = &mut self.units;
        let allowed = &self.allowed;
        let counts = &mut self.counts;
        let samples = &mut self.samples;

        drive(
            "fictitious",
            &self.config.run,
            &mut self.state,
            &mut self.hooks,
            |iteration, state| {
                let mut rng = unit_rng(seed, iteration, 0);
                for joint in samples.chunks_mut(n_players) {
                    for (player, action) in joint.iter_mut().enumerate() {
                        *action = sample_strategy(state.proba.row(player), &mut rng)?;
                    }
                }

                let shared: &[usize] = &samples[..];
                let chosen: Vec<usize> = pool.install(|| {
                    units
                        .par_iter_mut()
                        .enumerate()
                        .map(|(player, unit)| {
                            let start = player * n_strategies;
                            let candidates = &allowed[start..start + n_strategies];
                            best_against_pool(
                                payoff_fn,
                                shared,
                                sampling_size,
                                player,
                                candidates,
                                unit,
                            )
                        })
                        .collect::<Result<Vec<usize>>>()
                })?;
                state.actions.copy_from_slice(&chosen);

                payoff_fn.evaluate(&state.actions, 0, &mut state.payoffs);

                for (player, &action) in chosen.iter().enumerate() {
                    counts[player * n_strategies + action] += 1;
                }
                frequencies(&counts[..], &mut state.proba)
            },
        )
    }

    fn resume_from(&mut self, path: &Path) -> Result<u32> {
        let iteration = self.state.restore(path)?;
        self.rebuild_counts(iteration);
        Ok(iteration)
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
// Level 3 - Steps
// ============================================================================

/// Rows become `count / total`, then renormalized
fn frequencies(counts: &[u64], proba: &mut ProbaMatrix) -> Result<()> {
    let n = proba.n_strategies();
    for player in 0..proba.n_players() {
        let row_counts = &counts[player * n..(player + 1) * n];
        let total = row_counts.iter().sum::<u64>() as f64;
        for (p, &count) in proba.row_mut(player).iter_mut().zip(row_counts) {
            *p = (count as f64 / total) as nash_core::Proba;
        }
    }
    proba.normalize()
}

/// First allowed strategy with the best average payoff against the pool
fn best_against_pool(
    payoff_fn: &dyn PayoffFunction,
    samples: &[usize],
    sampling_size: usize,
    player: usize,
    candidates: &[bool],
    unit: &mut Scratch,
) -> Result<usize> {
    let thread = worker_index();
    let n_players = unit.actions.len();
    let mut best: Option<(usize, Payoff)> = None;

    for (strategy, &allowed) in candidates.iter().enumerate() {
        if !allowed {
            unit.values[strategy] = Payoff::NEG_INFINITY;
            continue;
        }

        let mut total = 0.0;
        for joint in samples.chunks(n_players).take(sampling_size) {
            unit.actions.copy_from_slice(joint);
            unit.actions[player] = strategy;
            payoff_fn.evaluate(&unit.actions, thread, &mut unit.payoffs);
            total += unit.payoffs[player];
        }

        let value = total / sampling_size as Payoff;
        unit.values[strategy] = value;
        if best.map_or(true, |(_, best_value)| value > best_value) {
            best = Some((strategy, value));
        }
    }

    best.map(|(strategy, _)| strategy).ok_or_else(|| {
        NashError::InvariantViolation(format!("player {} has no allowed strategy", player))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nash_core::PayoffMatrix;
    use std::sync::Arc;

    fn rock_paper_scissors() -> Game {
        let matrix: PayoffMatrix = "2\n3\n0,0;-1,1;1,-1\n1,-1;0,0;-1,1\n-1,1;1,-1;0,0\n"
            .parse()
            .unwrap();
        Game::from_matrix(Arc::new(matrix))
    }

    #[test]
    fn test_frequencies() {
        let mut proba = ProbaMatrix::zeros(2, 2);
        frequencies(&[1, 3, 2, 0], &mut proba).unwrap();
        assert_eq!(proba.row(0), &[0.25, 0.75]);
        assert_eq!(proba.row(1), &[1.0, 0.0]);
    }

    #[test]
    fn test_best_against_pool() {
        let game = rock_paper_scissors();
        // opponent always plays rock
        let samples = vec![0, 0, 0, 0];
        let mut unit = Scratch::per_player(2, 3).remove(0);
        let action = best_against_pool(
            game.payoff_fn().unwrap(),
            &samples,
            2,
            0,
            &[true, true, true],
            &mut unit,
        )
        .unwrap();
        assert_eq!(action, 1);
        assert_eq!(unit.values, vec![0.0, 1.0, -1.0]);
    }

    #[test]
    fn test_forbidden_candidate_is_skipped() {
        let game = rock_paper_scissors();
        let samples = vec![0, 0];
        let mut unit = Scratch::per_player(2, 3).remove(0);
        let action = best_against_pool(
            game.payoff_fn().unwrap(),
            &samples,
            1,
            0,
            &[true, false, true],
            &mut unit,
        )
        .unwrap();
        assert_eq!(action, 0);
    }

    #[test]
    fn test_counts_grow_by_one_per_iteration() {
        let game = rock_paper_scissors();
        let config = FictitiousConfig::new(20).with_threads(2).with_max_time(30);
        let mut engine = FictitiousPlay::new(&game, config, Hooks::new()).unwrap();
        engine.run().unwrap();

        for player in 0..2 {
            // 3 initial counts + 30 iterations
            assert_eq!(engine.counts(player).iter().sum::<u64>(), 33);
        }
        assert!(engine.proba().max_row_error() <= 1e-6);
    }

    #[test]
    fn test_rebuilt_counts_keep_row_totals() {
        let game = rock_paper_scissors();
        let config = FictitiousConfig::new(10).with_max_time(0);
        let mut engine = FictitiousPlay::new(&game, config, Hooks::new()).unwrap();

        // thirds of 4 round down to 1 each
        engine.state.proba = ProbaMatrix::uniform(2, 3);
        engine.rebuild_counts(0);
        assert_eq!(engine.counts(0).iter().sum::<u64>(), 4);
        assert_eq!(engine.counts(0).iter().filter(|&&c| c == 2).count(), 1);

        // halves of 33 round up on both sides
        engine
            .state
            .proba
            .row_mut(1)
            .copy_from_slice(&[0.5, 0.0, 0.5]);
        engine.rebuild_counts(29);
        assert_eq!(engine.counts(1).iter().sum::<u64>(), 33);
        assert_eq!(engine.counts(1)[1], 0);
        for player in 0..2 {
            assert_eq!(engine.counts(player).iter().sum::<u64>(), 33);
        }
    }

    #[test]
    fn test_initial_counts_shape_rows() {
        let game = rock_paper_scissors();
        let config = FictitiousConfig::new(10)
            .with_initial_counts(vec![vec![2, 1, 1], vec![0, 0, 4]])
            .with_max_time(0);
        let mut engine = FictitiousPlay::new(&game, config, Hooks::new()).unwrap();
        let outcome = engine.run().unwrap();

        assert_eq!(outcome.iterations, 0);
        assert_eq!(engine.proba().row(0), &[0.5, 0.25, 0.25]);
        assert_eq!(engine.proba().row(1), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_rejects_fully_forbidden_player() {
        let game = rock_paper_scissors();
        let config = FictitiousConfig::new(10)
            .with_forbidden(vec![vec![true, true, true], vec![false, false, false]]);
        assert!(matches!(
            FictitiousPlay::new(&game, config, Hooks::new()),
            Err(NashError::PreconditionViolation(_))
        ));
    }
}

//! Reinforcement-learning automata
//!
//! Level 2 - Phase-level implementation
//!
//! Every player samples an action from its own row, the joint action is
//! played once, and each row moves towards the sampled action in proportion
//! to the payoff it earned. No parallelism: a player's update only depends on
//! the joint action that was already drawn.

use std::path::Path;

use nash_core::{sample_strategy, Game, NashError, Payoff, Proba, ProbaMatrix, Result};

use crate::config::AutomatonConfig;
use crate::engine::{drive, unit_rng, Hooks, Learner, RunOutcome, RunState};

/// Automaton engine over a borrowed game
pub struct Automaton<'a> {
    game: &'a Game,
    config: AutomatonConfig,
    state: RunState,
    hooks: Hooks<'a>,
}

impl<'a> Automaton<'a> {
    /// Create an engine; rejects bad games and configurations up front
    pub fn new(game: &'a Game, config: AutomatonConfig, hooks: Hooks<'a>) -> Result<Self> {
        game.validate()?;
        config.validate()?;
        hooks.validate(game.n_players())?;

        Ok(Self {
            game,
            state: RunState::new(game.n_players(), game.n_strategies()),
            config,
            hooks,
        })
    }

    pub fn config(&self) -> &AutomatonConfig {
        &self.config
    }

    fn initialize(&mut self) {
        self.state.proba = match &self.config.initial {
            Some(initial) => initial.clone(),
            None => ProbaMatrix::uniform(self.game.n_players(), self.game.n_strategies()),
        };
    }
}

impl Learner for Automaton<'_> {
    fn run(&mut self) -> Result<RunOutcome> {
        let game = self.game;
        let payoff_fn = game.payoff_fn()?;
        if !self.state.is_live() {
            self.initialize();
        }
        self.state
            .proba
            .validate(game.n_players(), game.n_strategies())?;

        let b = self.config.b;
        let seed = self.config.run.seed;
        let n_players = game.n_players();

        drive(
            "automaton",
            &self.config.run,
            &mut self.state,
            &mut self.hooks,
            |iteration, state| {
                let mut rng = unit_rng(seed, iteration, 0);
                for player in 0..n_players {
                    state.actions[player] = sample_strategy(state.proba.row(player), &mut rng)?;
                }

                payoff_fn.evaluate(&state.actions, 0, &mut state.payoffs);

                for player in 0..n_players {
                    reinforce(
                        state.proba.row_mut(player),
                        state.actions[player],
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
// Level 3 - Steps
// ============================================================================

/// Reward-scaled redistribution towards `action`
///
/// `x = b * payoff * (1 - row[action])` is added to the chosen action and
/// `x / c` is taken from every other strategy still in play, where `c` counts
/// the strategies with positive probability. Entries are clamped at 0; the
/// caller renormalizes.
pub(crate) fn reinforce(row: &mut [Proba], action: usize, payoff: Payoff, b: Proba) -> Result<()> {
    let support = row.iter().filter(|&&p| p > 0.0).count();
    if support == 0 {
        return Err(NashError::InvariantViolation(
            "probability row has no positive entry".to_string(),
        ));
    }

    let x = (b as Payoff * payoff * (1.0 - row[action] as Payoff)) as Proba;
    row[action] = (row[action] + x).max(0.0);

    let share = x / support as Proba;
    for (strategy, p) in row.iter_mut().enumerate() {
        if strategy != action && *p > 0.0 {
            *p = (*p - share).max(0.0);
        }
    }
    Ok(())
}

pub(crate) fn with_player(error: NashError, player: usize) -> NashError {
    match error {
        NashError::InvariantViolation(msg) => {
            NashError::InvariantViolation(format!("player {}: {}", player, msg))
        }
        other => other,
    }
}

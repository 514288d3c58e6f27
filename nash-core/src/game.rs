//! Game handle and payoff-function capability

use std::fmt;
use std::sync::Arc;

use crate::error::{NashError, Result};
use crate::matrix::PayoffMatrix;
use crate::Payoff;

// ============================================================================
// PAYOFF FUNCTION
// ============================================================================

/// Evaluates the payoff vector of a joint action
///
/// Implementations must be pure in `actions` and safe to call concurrently
/// from distinct `thread_index` values. `payoffs` holds one slot per player.
pub trait PayoffFunction: Send + Sync {
    fn evaluate(&self, actions: &[usize], thread_index: usize, payoffs: &mut [Payoff]);
}

impl<F> PayoffFunction for F
where
    F: Fn(&[usize], usize, &mut [Payoff]) + Send + Sync,
{
    fn evaluate(&self, actions: &[usize], thread_index: usize, payoffs: &mut [Payoff]) {
        self(actions, thread_index, payoffs)
    }
}

// ============================================================================
// GAME
// ============================================================================

/// Finite normal-form game: every player picks one of `n_strategies`
#[derive(Clone)]
pub struct Game {
    n_players: usize,
    n_strategies: usize,
    payoff_fn: Option<Arc<dyn PayoffFunction>>,
}

impl Game {
    /// Create a game without a payoff function
    ///
    /// The shape is checked by [`Game::validate`], which every engine calls
    /// before its first iteration.
    pub fn new(n_players: usize, n_strategies: usize) -> Self {
        Self {
            n_players,
            n_strategies,
            payoff_fn: None,
        }
    }

    /// Attach the payoff function
    pub fn with_payoff<F>(mut self, payoff_fn: F) -> Self
    where
        F: PayoffFunction + 'static,
    {
        self.payoff_fn = Some(Arc::new(payoff_fn));
        self
    }

    /// Game backed by a payoff matrix shared with the caller
    pub fn from_matrix(matrix: Arc<PayoffMatrix>) -> Self {
        let n_players = matrix.n_players();
        let n_strategies = matrix.n_strategies();
        let payoff_fn: Arc<dyn PayoffFunction> = matrix;
        Self {
            n_players,
            n_strategies,
            payoff_fn: Some(payoff_fn),
        }
    }

    pub fn n_players(&self) -> usize {
        self.n_players
    }

    pub fn n_strategies(&self) -> usize {
        self.n_strategies
    }

    /// Reject games no engine can run
    pub fn validate(&self) -> Result<()> {
        if self.n_players < 2 {
            return Err(NashError::precondition(format!(
                "game needs at least 2 players, got {}",
                self.n_players
            )));
        }
        if self.n_strategies == 0 {
            return Err(NashError::precondition("game needs at least 1 strategy"));
        }
        if self.payoff_fn.is_none() {
            return Err(NashError::precondition("game has no payoff function"));
        }
        Ok(())
    }

    /// Borrow the payoff function
    pub fn payoff_fn(&self) -> Result<&dyn PayoffFunction> {
        self.payoff_fn
            .as_deref()
            .ok_or_else(|| NashError::precondition("game has no payoff function"))
    }

    /// Evaluate a joint action into a fresh payoff vector
    pub fn evaluate(&self, actions: &[usize], thread_index: usize) -> Result<Vec<Payoff>> {
        if actions.len() != self.n_players {
            return Err(NashError::precondition(format!(
                "joint action has {} entries for {} players",
                actions.len(),
                self.n_players
            )));
        }
        let mut payoffs = vec![0.0; self.n_players];
        self.payoff_fn()?.evaluate(actions, thread_index, &mut payoffs);
        Ok(payoffs)
    }
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("n_players", &self.n_players)
            .field("n_strategies", &self.n_strategies)
            .field("has_payoff_fn", &self.payoff_fn.is_some())
            .finish()
    }
}

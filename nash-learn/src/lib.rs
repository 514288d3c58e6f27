//! NASH Learn - Iterative learning engines for mixed equilibria
//!
//! This crate provides the engines that drive a game's probability rows
//! towards an equilibrium:
//! - Reinforcement-learning automata
//! - Monte-Carlo best response (parallel over players)
//! - Stochastic fictitious play (parallel over players)
//!
//! All engines share one control loop: convergence window, periodic
//! checkpoints, a feedback hook and cooperative cancellation.

pub mod automaton;
pub mod best_response;
pub mod config;
pub mod engine;
pub mod fictitious;

// Re-exports for convenient access
pub use automaton::Automaton;
pub use best_response::BestResponse;
pub use config::{AutomatonConfig, BestResponseConfig, FictitiousConfig, RunConfig};
pub use engine::{
    unit_rng, CancelToken, Control, Feedback, FeedbackFn, Hooks, Learner, RunOutcome,
    StopReason, ITERATION_LIMIT,
};
pub use fictitious::FictitiousPlay;

//! NASH Core - Games, probability vectors and run persistence
//!
//! This crate provides the building blocks shared by the learning engines:
//! - Game handle and payoff-function capability
//! - Dense payoff matrices and the 2-player text format
//! - Per-player probability matrices and cumulative sampling
//! - Sliding-window convergence detection
//! - Binary checkpoints of a run

pub mod checkpoint;
pub mod convergence;
pub mod error;
pub mod game;
pub mod matrix;
pub mod proba;

/// Reward of one player for one joint action
pub type Payoff = f64;

/// Probability of one strategy in a player's row
pub type Proba = f32;

// Re-exports for convenient access
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use convergence::ConvergenceTracker;
pub use error::{NashError, Result};
pub use game::{Game, PayoffFunction};
pub use matrix::PayoffMatrix;
pub use proba::{sample_strategy, ProbaMatrix, SAMPLING_ATTEMPTS};

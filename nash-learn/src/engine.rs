//! Control loop shared by the learning engines
//!
//! Level 1 - Orchestration
//!
//! Every engine plugs its per-iteration step into [`drive`], which owns the
//! stop conditions, the checkpoint schedule and the feedback schedule.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nash_core::{
    Checkpoint, CheckpointStore, ConvergenceTracker, NashError, Payoff, ProbaMatrix, Result,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::config::RunConfig;

// ============================================================================
// HOOKS
// ============================================================================

/// What the feedback hook sees after an iteration
#[derive(Debug)]
pub struct Feedback<'s> {
    pub iteration: u32,
    pub actions: &'s [usize],
    pub payoffs: &'s [Payoff],
    pub proba: &'s ProbaMatrix,
}

/// Answer of the feedback hook
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// End the run as if it had converged
    Stop,
}

/// Boxed feedback hook
pub type FeedbackFn<'a> = Box<dyn FnMut(&Feedback<'_>) -> Control + 'a>;

/// Cooperative cancellation, checked between iterations
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Collaborators injected into an engine at construction
#[derive(Default)]
pub struct Hooks<'a> {
    convergence: Option<&'a mut ConvergenceTracker>,
    checkpoints: Option<&'a CheckpointStore>,
    feedback: Option<FeedbackFn<'a>>,
    cancel: Option<CancelToken>,
}

impl<'a> Hooks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_convergence(mut self, tracker: &'a mut ConvergenceTracker) -> Self {
        self.convergence = Some(tracker);
        self
    }

    pub fn with_checkpoints(mut self, store: &'a CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_feedback<F>(mut self, feedback: F) -> Self
    where
        F: FnMut(&Feedback<'_>) -> Control + 'a,
    {
        self.feedback = Some(Box::new(feedback));
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub(crate) fn validate(&self, n_players: usize) -> Result<()> {
        match &self.convergence {
            Some(tracker) if tracker.n_players() != n_players => {
                Err(NashError::PreconditionViolation(format!(
                    "convergence tracker watches {} players, game has {}",
                    tracker.n_players(),
                    n_players
                )))
            }
            _ => Ok(()),
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancelToken::is_cancelled)
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// Why a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StopReason {
    Converged,
    MaxTime,
    FeedbackStop,
    Cancelled,
}

/// Summary of a call to `run`
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    /// Iterations completed since the start of the run (resumed ones included)
    pub iterations: u32,
    pub stop: StopReason,
    /// Checkpoints that could not be written
    pub checkpoint_failures: u32,
}

// ============================================================================
// LEARNER
// ============================================================================

/// Operations every learning engine offers
pub trait Learner {
    /// Iterate until a stop condition fires
    ///
    /// A second call continues from the last completed iteration.
    fn run(&mut self) -> Result<RunOutcome>;

    /// Replace the whole engine state with a checkpoint file
    ///
    /// Fails if the engine already holds live state. Returns the restored
    /// iteration.
    fn resume_from(&mut self, path: &Path) -> Result<u32>;

    fn proba(&self) -> &ProbaMatrix;

    fn last_actions(&self) -> &[usize];

    fn last_payoffs(&self) -> &[Payoff];

    /// Last completed iteration (None before the first one)
    fn iteration(&self) -> Option<u32>;

    /// Resume from the checkpoint of `iteration` in `store`
    fn resume(&mut self, store: &CheckpointStore, iteration: u32) -> Result<u32> {
        self.resume_from(&store.path_for(iteration))
    }

    /// Resume from the most recent checkpoint in `store`
    fn resume_latest(&mut self, store: &CheckpointStore) -> Result<u32> {
        let iteration = store.latest()?.ok_or_else(|| {
            NashError::PreconditionViolation(format!(
                "no checkpoint in {}",
                store.dir().display()
            ))
        })?;
        self.resume(store, iteration)
    }
}

// ============================================================================
// RUN STATE
// ============================================================================

/// Mutable state of a run, written only by the control thread
#[derive(Clone, Debug)]
pub(crate) struct RunState {
    pub proba: ProbaMatrix,
    pub actions: Vec<usize>,
    pub payoffs: Vec<Payoff>,
    /// Last completed iteration
    pub last: Option<u32>,
}

impl RunState {
    pub fn new(n_players: usize, n_strategies: usize) -> Self {
        Self {
            proba: ProbaMatrix::zeros(n_players, n_strategies),
            actions: vec![0; n_players],
            payoffs: vec![0.0; n_players],
            last: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.last.is_some()
    }

    fn next_iteration(&self) -> u32 {
        self.last.map_or(0, |t| t.saturating_add(1))
    }

    fn snapshot(&self, iteration: u32) -> Checkpoint {
        Checkpoint {
            iteration,
            proba: self.proba.clone(),
            actions: self.actions.clone(),
            payoffs: self.payoffs.clone(),
        }
    }

    /// Load a checkpoint file as the new state
    pub fn restore(&mut self, path: &Path) -> Result<u32> {
        if self.is_live() {
            return Err(NashError::PreconditionViolation(
                "cannot resume into an engine that holds live state".to_string(),
            ));
        }

        let n_strategies = self.proba.n_strategies();
        let checkpoint = CheckpointStore::load_path(path, self.actions.len(), n_strategies)?;
        if let Some(&action) = checkpoint.actions.iter().find(|&&a| a >= n_strategies) {
            return Err(NashError::IoFailure {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("action {} out of range", action),
                ),
            });
        }

        tracing::info!(
            "Resuming from {} at iteration {}",
            path.display(),
            checkpoint.iteration
        );
        self.proba = checkpoint.proba;
        self.actions = checkpoint.actions;
        self.payoffs = checkpoint.payoffs;
        self.last = Some(checkpoint.iteration);
        Ok(checkpoint.iteration)
    }
}

// ============================================================================
// RANDOM STREAMS
// ============================================================================

/// Runs end here at the latest; checkpoints store iterations as `i32`
pub const ITERATION_LIMIT: u32 = i32::MAX as u32;

/// Random stream of `unit` at `iteration`
///
/// The key holds the run seed and the iteration, and each unit reads its own
/// ChaCha stream. Streams depend only on those three values, so the outcome
/// of a run does not depend on thread scheduling and a resumed run draws the
/// same numbers as an uninterrupted one.
pub fn unit_rng(seed: u64, iteration: u32, unit: usize) -> ChaCha8Rng {
    let mut key = <ChaCha8Rng as SeedableRng>::Seed::default();
    key[..8].copy_from_slice(&seed.to_le_bytes());
    key[8..12].copy_from_slice(&iteration.to_le_bytes());
    let mut rng = ChaCha8Rng::from_seed(key);
    rng.set_stream(unit as u64);
    rng
}

// ============================================================================
// FAN-OUT SUPPORT
// ============================================================================

/// Scratch buffers owned by one estimation unit
#[derive(Clone, Debug)]
pub(crate) struct Scratch {
    pub actions: Vec<usize>,
    pub payoffs: Vec<Payoff>,
    /// Estimated payoff of every candidate strategy
    pub values: Vec<Payoff>,
}

impl Scratch {
    pub fn per_player(n_players: usize, n_strategies: usize) -> Vec<Self> {
        (0..n_players)
            .map(|_| Self {
                actions: vec![0; n_players],
                payoffs: vec![0.0; n_players],
                values: vec![0.0; n_strategies],
            })
            .collect()
    }
}

/// Bounded worker pool for the per-player fan-out
pub(crate) fn thread_pool(max_threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(max_threads)
        .thread_name(|i| format!("nash-unit-{}", i))
        .build()
        .map_err(|e| NashError::PreconditionViolation(format!("cannot start thread pool: {}", e)))
}

/// Index handed to the payoff function by the current worker
pub(crate) fn worker_index() -> usize {
    rayon::current_thread_index().unwrap_or(0)
}

// ============================================================================
// CONTROL LOOP
// ============================================================================

/// Drive `step` until a stop condition fires
///
/// After each step: checkpoint on the save schedule, feedback on the
/// feedback schedule, then the convergence check.
pub(crate) fn drive<F>(
    engine: &str,
    config: &RunConfig,
    state: &mut RunState,
    hooks: &mut Hooks<'_>,
    mut step: F,
) -> Result<RunOutcome>
where
    F: FnMut(u32, &mut RunState) -> Result<()>,
{
    let mut time = state.next_iteration();
    let mut checkpoint_failures = 0;

    tracing::info!(
        "{} run starting at iteration {} ({} players, {} strategies)",
        engine,
        time,
        state.proba.n_players(),
        state.proba.n_strategies()
    );

    let stop = loop {
        if time >= ITERATION_LIMIT || config.max_time.map_or(false, |max| time >= max) {
            break StopReason::MaxTime;
        }
        if hooks.cancelled() {
            break StopReason::Cancelled;
        }

        step(time, state)?;
        state.last = Some(time);

        if time % config.save_interval == 0 {
            if let Some(store) = hooks.checkpoints {
                match store.save(&state.snapshot(time)) {
                    Ok(path) => tracing::debug!("Saved checkpoint {}", path.display()),
                    Err(e) => {
                        checkpoint_failures += 1;
                        tracing::warn!("Checkpoint of iteration {} failed: {}", time, e);
                    }
                }
            }
        }

        let mut stop = None;
        if time % config.feedback_interval == 0 {
            if let Some(feedback) = hooks.feedback.as_mut() {
                let event = Feedback {
                    iteration: time,
                    actions: &state.actions,
                    payoffs: &state.payoffs,
                    proba: &state.proba,
                };
                if feedback(&event) == Control::Stop {
                    stop = Some(StopReason::FeedbackStop);
                }
            }
        }

        if let Some(tracker) = hooks.convergence.as_deref_mut() {
            if tracker.check(&state.payoffs) {
                stop = Some(StopReason::Converged);
            }
        }

        time += 1;
        if let Some(reason) = stop {
            break reason;
        }
    };

    tracing::info!("{} run stopped after {} iterations: {:?}", engine, time, stop);

    Ok(RunOutcome {
        iterations: time,
        stop,
        checkpoint_failures,
    })
}

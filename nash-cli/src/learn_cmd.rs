//! Learning commands - run one engine on a game file
//!
//! ## Architecture (4-layer granularity)
//!
//! - Level 1: run_automaton(), run_best_response(), run_fictitious()
//! - Level 2: load_game(), execute(), report_results()
//! - Level 3: build_hooks(), resume_engine()
//! - Level 4: configuration and formatting utilities

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Serialize;

use nash_core::{CheckpointStore, ConvergenceTracker, Game, Payoff, PayoffMatrix, Proba};
use nash_learn::{
    Automaton, AutomatonConfig, BestResponse, BestResponseConfig, Control, Feedback,
    FictitiousConfig, FictitiousPlay, Hooks, Learner, RunConfig, RunOutcome,
};

// ============================================================================
// COMMAND ARGUMENTS (Level 4 - Configuration)
// ============================================================================

/// Options shared by every learning command
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Game file in the 2-player text format
    #[arg(value_name = "FILE")]
    pub game: PathBuf,

    /// Run seed
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Stop after this many iterations (default: until convergence)
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Largest payoff spread still considered converged
    #[arg(long, default_value = "0.1")]
    pub interval: Payoff,

    /// Iterations the payoffs must stay within the interval
    #[arg(long, default_value = "50")]
    pub window: usize,

    /// Directory for periodic checkpoints
    #[arg(long, value_name = "DIR")]
    pub checkpoint_dir: Option<PathBuf>,

    /// Iterations between checkpoints
    #[arg(long, default_value = "1000")]
    pub save_interval: u32,

    /// Iterations between progress logs (default depends on the engine)
    #[arg(long)]
    pub feedback_interval: Option<u32>,

    /// Continue from the latest checkpoint in --checkpoint-dir
    #[arg(long)]
    pub resume: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AutomatonArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Dampening constant in (0, 1]
    #[arg(long, default_value = "0.1")]
    pub b: Proba,
}

#[derive(Args, Debug)]
pub struct BestResponseArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Dampening constant in (0, 1]
    #[arg(long, default_value = "0.01")]
    pub b: Proba,

    /// Simulated games per candidate strategy
    #[arg(long, default_value = "100")]
    pub simulations: usize,

    /// Worker threads
    #[arg(long, default_value = "4")]
    pub threads: usize,
}

#[derive(Args, Debug)]
pub struct FictitiousArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Joint actions drawn per iteration
    #[arg(long, default_value = "100")]
    pub sampling_size: usize,

    /// Worker threads
    #[arg(long, default_value = "4")]
    pub threads: usize,
}

impl CommonArgs {
    fn run_config(&self, default_feedback: u32) -> RunConfig {
        let mut run = RunConfig::default()
            .with_seed(self.seed)
            .with_save_interval(self.save_interval)
            .with_feedback_interval(self.feedback_interval.unwrap_or(default_feedback));
        run.max_time = self.max_iterations;
        run
    }
}

/// What a finished run reports
#[derive(Debug, Serialize)]
struct RunSummary {
    engine: &'static str,
    #[serde(flatten)]
    outcome: RunOutcome,
    rows: Vec<Vec<Proba>>,
    actions: Vec<usize>,
    payoffs: Vec<Payoff>,
}

// ============================================================================
// LEVEL 1 - ORCHESTRATION
// ============================================================================

/// Run the automaton command
///
/// Every command reads the same way:
/// 1. Load the game and build the run collaborators
/// 2. Create the engine and optionally resume it
/// 3. Run to a stop condition and report
pub fn run_automaton(args: AutomatonArgs) -> Result<()> {
    let common = &args.common;
    let game = load_game(common)?;
    let mut tracker = ConvergenceTracker::new(game.n_players(), common.interval, common.window)?;
    let store = common.checkpoint_dir.as_ref().map(CheckpointStore::new);

    let config = AutomatonConfig::new(args.b).with_run(common.run_config(1000));
    let hooks = build_hooks(&mut tracker, store.as_ref());
    let mut engine =
        Automaton::new(&game, config, hooks).context("Invalid automaton configuration")?;

    let summary = execute("automaton", &mut engine, store.as_ref(), common.resume)?;
    report_results(&summary, common.json)
}

/// Run the best-response command
pub fn run_best_response(args: BestResponseArgs) -> Result<()> {
    let common = &args.common;
    let game = load_game(common)?;
    let mut tracker = ConvergenceTracker::new(game.n_players(), common.interval, common.window)?;
    let store = common.checkpoint_dir.as_ref().map(CheckpointStore::new);

    let config = BestResponseConfig::new(args.b, args.simulations)
        .with_threads(args.threads)
        .with_run(common.run_config(10));
    let hooks = build_hooks(&mut tracker, store.as_ref());
    let mut engine =
        BestResponse::new(&game, config, hooks).context("Invalid best-response configuration")?;

    let summary = execute("best-response", &mut engine, store.as_ref(), common.resume)?;
    report_results(&summary, common.json)
}

/// Run the fictitious-play command
pub fn run_fictitious(args: FictitiousArgs) -> Result<()> {
    let common = &args.common;
    let game = load_game(common)?;
    let mut tracker = ConvergenceTracker::new(game.n_players(), common.interval, common.window)?;
    let store = common.checkpoint_dir.as_ref().map(CheckpointStore::new);

    let config = FictitiousConfig::new(args.sampling_size)
        .with_threads(args.threads)
        .with_run(common.run_config(10));
    let hooks = build_hooks(&mut tracker, store.as_ref());
    let mut engine = FictitiousPlay::new(&game, config, hooks)
        .context("Invalid fictitious-play configuration")?;

    let summary = execute("fictitious", &mut engine, store.as_ref(), common.resume)?;
    report_results(&summary, common.json)
}

// ============================================================================
// LEVEL 2 - PHASES
// ============================================================================

/// Parse the game file and echo it
fn load_game(common: &CommonArgs) -> Result<Game> {
    let matrix = PayoffMatrix::load(&common.game)
        .with_context(|| format!("Failed to load game: {}", common.game.display()))?;

    if !common.json {
        println!("{}", matrix);
    }
    tracing::info!(
        "Loaded {} ({} players, {} strategies)",
        common.game.display(),
        matrix.n_players(),
        matrix.n_strategies()
    );

    Ok(Game::from_matrix(Arc::new(matrix)))
}

/// Resume if asked, then run the engine to a stop condition
fn execute<L: Learner>(
    engine_name: &'static str,
    engine: &mut L,
    store: Option<&CheckpointStore>,
    resume: bool,
) -> Result<RunSummary> {
    if resume {
        resume_engine(engine, store)?;
    }

    let outcome = engine
        .run()
        .with_context(|| format!("{} run failed", engine_name))?;

    Ok(RunSummary {
        engine: engine_name,
        outcome,
        rows: engine.proba().to_rows(),
        actions: engine.last_actions().to_vec(),
        payoffs: engine.last_payoffs().to_vec(),
    })
}

/// Print the summary as text or JSON
fn report_results(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        print_json_results(summary)
    } else {
        print_text_results(summary);
        Ok(())
    }
}

// ============================================================================
// LEVEL 3 - STEPS
// ============================================================================

/// Tracker, optional checkpoint store and a progress log
fn build_hooks<'a>(
    tracker: &'a mut ConvergenceTracker,
    store: Option<&'a CheckpointStore>,
) -> Hooks<'a> {
    let mut hooks = Hooks::new()
        .with_convergence(tracker)
        .with_feedback(|fb: &Feedback<'_>| {
            tracing::info!(
                "Iteration {}: actions {:?}, payoffs {:?}",
                fb.iteration,
                fb.actions,
                fb.payoffs
            );
            Control::Continue
        });
    if let Some(store) = store {
        hooks = hooks.with_checkpoints(store);
    }
    hooks
}

fn resume_engine<L: Learner>(engine: &mut L, store: Option<&CheckpointStore>) -> Result<()> {
    let Some(store) = store else {
        bail!("--resume needs --checkpoint-dir");
    };
    let iteration = engine
        .resume_latest(store)
        .with_context(|| format!("Failed to resume from {}", store.dir().display()))?;
    tracing::info!("Resumed at iteration {}", iteration);
    Ok(())
}

// ============================================================================
// LEVEL 4 - UTILITIES
// ============================================================================

fn print_json_results(summary: &RunSummary) -> Result<()> {
    let json = serde_json::to_string_pretty(summary).context("Failed to encode results")?;
    println!("{}", json);
    Ok(())
}

fn print_text_results(summary: &RunSummary) {
    println!("\n=== {} ===", summary.engine);
    println!(
        "Stopped after {} iterations ({:?})",
        summary.outcome.iterations, summary.outcome.stop
    );
    if summary.outcome.checkpoint_failures > 0 {
        println!(
            "Checkpoint failures: {}",
            summary.outcome.checkpoint_failures
        );
    }
    for row in &summary.rows {
        let cells: Vec<String> = row.iter().map(|p| format!("{:.3}", p)).collect();
        println!("{}", cells.join(" "));
    }
}

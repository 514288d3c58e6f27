//! NASH CLI - Command-line interface
//!
//! Commands:
//! - automaton: Reinforcement-learning automata
//! - best-response: Monte-Carlo best response
//! - fictitious: Stochastic fictitious play

mod learn_cmd;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use learn_cmd::{AutomatonArgs, BestResponseArgs, FictitiousArgs};

#[derive(Parser)]
#[command(name = "nash")]
#[command(about = "Learn mixed equilibria of finite games")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run reinforcement-learning automata on a game
    Automaton(AutomatonArgs),
    /// Run Monte-Carlo best response on a game
    BestResponse(BestResponseArgs),
    /// Run stochastic fictitious play on a game
    Fictitious(FictitiousArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so --json output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Automaton(args) => learn_cmd::run_automaton(args),
        Commands::BestResponse(args) => learn_cmd::run_best_response(args),
        Commands::Fictitious(args) => learn_cmd::run_fictitious(args),
    }
}

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{replay, resolve, session, ReplayArgs, ResolveArgs, SessionArgs};
use tracing_subscriber::EnvFilter;

/// Inkwell - operational transform for collaborative text
#[derive(Parser, Debug)]
#[command(name = "inkwell")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log engine activity at debug level (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fold a recorded batch of operations onto its base documents
    Replay(ReplayArgs),

    /// Resolve a pair of concurrent operations
    Resolve(ResolveArgs),

    /// Run a recorded batch through live document actors
    Session(SessionArgs),
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|cwd| match cli.command {
            Command::Replay(args) => replay(args, &cwd),
            Command::Resolve(args) => resolve(args, &cwd),
            Command::Session(args) => session(args, &cwd),
        });

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {:#}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}

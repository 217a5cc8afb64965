mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::run::RunArgs;
use commands::sequence::SequenceArgs;
use commands::timeline::TimelineArgs;

/// Priority-of-payments waterfall engine
#[derive(Parser)]
#[command(
    name = "wfe",
    version,
    about = "Priority-of-payments waterfall engine",
    long_about = "Runs structured-finance cash waterfalls with decimal precision: \
                  traditional, turbo, PIK-toggle, claw-back, call-protection, \
                  fee-deferral and distribution-stopper variants, alone or combined."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one period's waterfall
    Run(RunArgs),
    /// Show the step sequence a period would execute
    Sequence(SequenceArgs),
    /// Run consecutive periods for one deal
    Timeline(TimelineArgs),
    /// List registered variants
    Variants,
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

/// Default log filter for a `-v` count; `RUST_LOG` still wins.
fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn init_logging(verbose: u8) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level(verbose)))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Run(args) => commands::run::run_waterfall(args),
        Commands::Sequence(args) => commands::sequence::run_sequence(args),
        Commands::Timeline(args) => commands::timeline::run_timeline(args),
        Commands::Variants => commands::variants::run_variants(),
        Commands::Version => {
            println!("wfe {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}

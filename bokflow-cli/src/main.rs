mod commands;

use std::process::ExitCode;

use bokflow::errors::BokflowError;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bokflow", about = "Bok CCD reduction pipeline driver")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one observing night
    Run(commands::run::RunArgs),
    /// Print the stages a request expands to
    Plan(commands::plan::PlanArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match &cli.command {
        Commands::Run(args) => commands::run::run(args, cli.verbose).await,
        Commands::Plan(args) => commands::plan::run(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::from(exit_code(&err))
        }
    }
}

/// 2 for a bad request, 1 for a failed run.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<BokflowError>() {
        Some(e) if e.is_configuration() => 2,
        _ => 1,
    }
}

fn report(err: &anyhow::Error) {
    eprintln!("error: {err:#}");
    let Some(e) = err.downcast_ref::<BokflowError>() else {
        return;
    };
    if let BokflowError::UnitFailure(failure) = e {
        for unit in &failure.failed_units {
            eprintln!("  failed  {} {}: {}", failure.stage, unit.unit, unit.error);
        }
        if !failure.not_dispatched.is_empty() {
            eprintln!(
                "  {} unit(s) of {} not dispatched",
                failure.not_dispatched.len(),
                failure.stage
            );
        }
    }
    if let Some(hint) = e.info().fix_hint {
        eprintln!("hint: {hint}");
    }
}

use clap::Parser;
use colored::*;
use std::process;
use tracing_subscriber::EnvFilter;
use virosample::cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();

    // VIROSAMPLE_LOG wins over -v
    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let log_level = std::env::var("VIROSAMPLE_LOG").unwrap_or_else(|_| default_level.to_string());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);

        let exit_code = match e.downcast_ref::<virosample::VirosampleError>() {
            Some(virosample::VirosampleError::Config(_)) => 2,
            Some(virosample::VirosampleError::Io(_)) => 3,
            Some(virosample::VirosampleError::Parse(_)) => 4,
            Some(virosample::VirosampleError::InvalidBudget(_))
            | Some(virosample::VirosampleError::UnknownTaxon(_))
            | Some(virosample::VirosampleError::DuplicateTaxon(_))
            | Some(virosample::VirosampleError::InvalidInput(_)) => 5,
            _ => 1,
        };
        process::exit(exit_code);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()?;
    }

    match cli.command {
        Commands::Subsample(mut args) => {
            args.config = cli.config;
            virosample::cli::commands::subsample::run(args)
        }
        Commands::Neighbors(mut args) => {
            args.config = cli.config;
            virosample::cli::commands::neighbors::run(args)
        }
        Commands::Config(args) => virosample::cli::commands::config::run(args),
    }
}

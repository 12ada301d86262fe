pub mod commands;
pub mod formatter;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "virosample",
    version,
    about = "Bounded, representative subsampling of viral genome collections",
    long_about = "Virosample down-samples large public genome collections to a fixed budget \
                  while keeping rare lineages whole, and selects the phylogenetic neighbors \
                  of a set of sequences of interest."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file (TOML)
    #[arg(short = 'c', long, global = true, env = "VIROSAMPLE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of threads to use (0 = all available)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    pub threads: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Down-sample a metadata table (and FASTA) to a budget, lineage by lineage
    Subsample(commands::subsample::SubsampleArgs),

    /// Select the tree leaves nearest to the sequences of interest
    Neighbors(commands::neighbors::NeighborsArgs),

    /// Write the default configuration file
    Config(commands::config::ConfigArgs),
}

pub mod bio;
pub mod cli;
pub mod core;

pub use crate::core::{
    neighbor_selector::NeighborSelector,
    population::{Budget, Member, Population, SelectionResult},
    quota_sampler::QuotaSampler,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VirosampleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid budget: {0} (must be >= 0)")]
    InvalidBudget(i64),

    #[error("Unknown taxon: '{0}'")]
    UnknownTaxon(String),

    #[error("Duplicate taxon: '{0}'")]
    DuplicateTaxon(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

impl From<csv::Error> for VirosampleError {
    fn from(err: csv::Error) -> Self {
        VirosampleError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for VirosampleError {
    fn from(err: serde_json::Error) -> Self {
        VirosampleError::Other(format!("JSON serialization failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, VirosampleError>;

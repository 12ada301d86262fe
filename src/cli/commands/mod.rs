pub mod config;
pub mod neighbors;
pub mod subsample;

use crate::core::config::{load_config, Config};
use std::path::Path;

/// Configuration from `path`, or the defaults when no file is given.
pub fn resolve_config(path: Option<&Path>) -> crate::Result<Config> {
    match path {
        Some(path) => load_config(path),
        None => Ok(Config::default()),
    }
}

/// Split comma-separated CLI values, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

use crate::bio::metadata::FieldMapping;
use crate::core::selection::NeighborPolicyKind;
use crate::VirosampleError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sampling: SamplingConfig,
    pub quality: QualityConfig,
    pub neighbors: NeighborsConfig,
    pub sequence_filter: SequenceFilterConfig,
    /// Column mapping for the Nextstrain metadata output
    pub nextstrain: FieldMapping,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Maximum number of taxa kept by the quota sampler
    pub budget: usize,
    pub group_column: String,
    /// Numeric column with the fraction of N sites (lower is better)
    pub quality_column: String,
    /// RNG seed; a random seed is drawn when unset
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub enabled: bool,
    pub percentile: f64,
    /// Metrics gated jointly; a member must pass every field
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeighborsConfig {
    pub max_taxa: usize,
    pub policy: NeighborPolicyKind,
    /// Reference genome leaf, always kept when present
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceFilterConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub max_ambiguous: usize,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            budget: 10000,
            group_column: "Pango_lineage".to_string(),
            quality_column: "N_Content".to_string(),
            seed: None,
        }
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            percentile: crate::core::quality_filter::DEFAULT_PERCENTILE,
            fields: vec!["seq_n".to_string(), "seq_gap".to_string()],
        }
    }
}

impl Default for NeighborsConfig {
    fn default() -> Self {
        Self {
            max_taxa: 100,
            policy: NeighborPolicyKind::AncestorExpansion,
            reference: "MN908947.3".to_string(),
        }
    }
}

impl Default for SequenceFilterConfig {
    fn default() -> Self {
        Self {
            min_length: 28000,
            max_length: 31000,
            max_ambiguous: 3000,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), VirosampleError> {
        if !(0.0..=100.0).contains(&self.quality.percentile) {
            return Err(VirosampleError::Config(format!(
                "quality.percentile must be within [0, 100], got {}",
                self.quality.percentile
            )));
        }
        if self.sequence_filter.min_length >= self.sequence_filter.max_length {
            return Err(VirosampleError::Config(format!(
                "sequence_filter.min_length ({}) must be below max_length ({})",
                self.sequence_filter.min_length, self.sequence_filter.max_length
            )));
        }
        if self.sampling.group_column.trim().is_empty() {
            return Err(VirosampleError::Config(
                "sampling.group_column must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn default_config() -> Config {
    Config::default()
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, VirosampleError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| VirosampleError::Config(format!("Failed to parse config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<(), VirosampleError> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| VirosampleError::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}

use crate::core::quota_sampler::{SamplingReport, UniformFallback};
use crate::Result;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Summary of one subsampling run, written as JSON next to the outputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SamplingStats {
    pub sample_lineages: BTreeSet<String>,
    pub n_total_sequences: usize,
    pub n_total_lineages: usize,
    pub n_matching_lineage: usize,
    pub matching_lineage_counts: BTreeMap<String, usize>,
    pub n_metadata_filtered_sequences: usize,
    pub n_sequence_filtered: Option<usize>,
    pub n_distinct_sequences: Option<usize>,
    pub n_quality_filtered: Option<usize>,
    pub n_mandatory: usize,
    pub n_final_filtered_sequences: usize,
    pub budget: usize,
    pub seed: u64,
    pub short_circuited: bool,
    pub uniform_fallbacks: Vec<UniformFallback>,
}

impl SamplingStats {
    pub fn record_sampling(&mut self, report: &SamplingReport) {
        self.short_circuited = report.short_circuited;
        self.uniform_fallbacks = report.fallbacks.clone();
        self.n_final_filtered_sequences = report.selection.len();
    }

    pub fn n_fallbacks(&self) -> usize {
        self.uniform_fallbacks.len()
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

/// Length and ambiguity filtering of genome records

use crate::bio::sequence::Sequence;
use crate::core::config::SequenceFilterConfig;
use std::collections::{BTreeSet, HashSet};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceFilter {
    /// Exclusive lower bound on length
    pub min_length: usize,
    /// Inclusive upper bound on length
    pub max_length: usize,
    /// Records must have strictly fewer ambiguous sites than this
    pub max_ambiguous: usize,
}

#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub kept: Vec<Sequence>,
    pub not_requested: usize,
    pub too_short: usize,
    pub too_long: usize,
    pub too_ambiguous: usize,
    pub duplicates: usize,
}

impl SequenceFilter {
    pub fn new(min_length: usize, max_length: usize, max_ambiguous: usize) -> Self {
        Self {
            min_length,
            max_length,
            max_ambiguous,
        }
    }

    pub fn accepts(&self, seq: &Sequence) -> bool {
        self.min_length < seq.len()
            && seq.len() <= self.max_length
            && seq.count_ambiguous() < self.max_ambiguous
    }

    /// Keep passing records, first occurrence of each name only. When `wanted`
    /// is given, records outside it are dropped before any other check.
    pub fn apply<I>(&self, records: I, wanted: Option<&BTreeSet<String>>) -> FilterOutcome
    where
        I: IntoIterator<Item = Sequence>,
    {
        let mut outcome = FilterOutcome::default();
        let mut seen: HashSet<String> = HashSet::new();

        for seq in records {
            if wanted.is_some_and(|w| !w.contains(&seq.id)) {
                outcome.not_requested += 1;
                continue;
            }
            if seq.len() <= self.min_length {
                outcome.too_short += 1;
            } else if seq.len() > self.max_length {
                outcome.too_long += 1;
            } else if seq.count_ambiguous() >= self.max_ambiguous {
                outcome.too_ambiguous += 1;
            } else if !seen.insert(seq.id.clone()) {
                outcome.duplicates += 1;
            } else {
                outcome.kept.push(seq);
            }
        }

        info!(
            "Sequence filter kept {} records ({} too short, {} too long, {} too ambiguous, {} duplicate names)",
            outcome.kept.len(),
            outcome.too_short,
            outcome.too_long,
            outcome.too_ambiguous,
            outcome.duplicates
        );
        outcome
    }
}

impl From<&SequenceFilterConfig> for SequenceFilter {
    fn from(config: &SequenceFilterConfig) -> Self {
        Self::new(config.min_length, config.max_length, config.max_ambiguous)
    }
}

impl Default for SequenceFilter {
    fn default() -> Self {
        Self::from(&SequenceFilterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(id: &str, body: &str) -> Sequence {
        Sequence::new(id.to_string(), body.as_bytes().to_vec())
    }

    #[test]
    fn test_bounds() {
        let filter = SequenceFilter::new(4, 8, 2);
        assert!(!filter.accepts(&seq("a", "ACGT")));
        assert!(filter.accepts(&seq("a", "ACGTA")));
        assert!(filter.accepts(&seq("a", "ACGTACGT")));
        assert!(!filter.accepts(&seq("a", "ACGTACGTA")));
        assert!(filter.accepts(&seq("a", "ACGTNA")));
        assert!(!filter.accepts(&seq("a", "ACGTNN")));
        // gaps are not ambiguous
        assert!(filter.accepts(&seq("a", "AC---T")));
    }

    #[test]
    fn test_apply_counts_and_first_occurrence() {
        let filter = SequenceFilter::new(4, 8, 2);
        let wanted: BTreeSet<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let records = vec![
            seq("a", "ACGTAC"),
            seq("a", "TTTTTT"),
            seq("b", "ACG"),
            seq("c", "NNNNNN"),
            seq("d", "ACGTACGTACGT"),
            seq("e", "ACGTAC"),
        ];
        let outcome = filter.apply(records, Some(&wanted));
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].sequence, b"ACGTAC".to_vec());
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(outcome.too_short, 1);
        assert_eq!(outcome.too_ambiguous, 1);
        assert_eq!(outcome.too_long, 1);
        assert_eq!(outcome.not_requested, 1);
    }
}

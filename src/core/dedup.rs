/// Collapsing of identical genome sequences
///
/// Identical sequences are interchangeable for sampling purposes, so each set
/// of identical records is represented once. A set that contains a mandatory
/// taxon is kept in full instead.

use crate::bio::sequence::Sequence;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::debug;

/// Ids sharing one sequence, sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdenticalSet {
    members: Vec<String>,
}

impl IdenticalSet {
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Smallest id of the set.
    pub fn representative(&self) -> &str {
        &self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Group records whose sequences are identical ignoring case. Sets are
/// returned in order of first appearance.
pub fn collapse_identical(sequences: &[Sequence]) -> Vec<IdenticalSet> {
    let mut by_sequence: IndexMap<Vec<u8>, BTreeSet<String>> = IndexMap::new();
    for seq in sequences {
        by_sequence
            .entry(seq.sequence.to_ascii_uppercase())
            .or_default()
            .insert(seq.id.clone());
    }

    let sets: Vec<IdenticalSet> = by_sequence
        .into_values()
        .map(|ids| IdenticalSet {
            members: ids.into_iter().collect(),
        })
        .collect();
    debug!(
        "{} records collapsed into {} distinct sequences",
        sequences.len(),
        sets.len()
    );
    sets
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Representatives {
    /// One id per set without a mandatory member
    pub candidates: BTreeSet<String>,
    /// The mandatory ids plus every member of a set holding one
    pub mandatory: BTreeSet<String>,
}

pub fn representatives(sets: &[IdenticalSet], mandatory: &BTreeSet<String>) -> Representatives {
    let mut out = Representatives {
        candidates: BTreeSet::new(),
        mandatory: mandatory.clone(),
    };
    for set in sets {
        if set.members.iter().any(|id| mandatory.contains(id)) {
            out.mandatory.extend(set.members.iter().cloned());
        } else if !set.is_empty() {
            out.candidates.insert(set.representative().to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(id: &str, body: &str) -> Sequence {
        Sequence::new(id.to_string(), body.as_bytes().to_vec())
    }

    #[test]
    fn test_collapse_is_case_insensitive() {
        let sets = collapse_identical(&[
            seq("z", "acgt"),
            seq("b", "TTTT"),
            seq("a", "ACGT"),
            seq("c", "ACGA"),
        ]);
        assert_eq!(sets.len(), 3);
        assert_eq!(sets[0].members(), &["a".to_string(), "z".to_string()]);
        assert_eq!(sets[0].representative(), "a");
        assert_eq!(sets[1].representative(), "b");
    }

    #[test]
    fn test_mandatory_sets_are_kept_whole() {
        let sets = collapse_identical(&[
            seq("user1", "ACGT"),
            seq("pub1", "ACGT"),
            seq("pub2", "ACGT"),
            seq("pub3", "TTTT"),
            seq("pub4", "TTTT"),
        ]);
        let mandatory: BTreeSet<String> = ["user1".to_string(), "ref".to_string()].into();
        let reps = representatives(&sets, &mandatory);
        assert_eq!(
            reps.mandatory.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["pub1", "pub2", "ref", "user1"]
        );
        assert_eq!(
            reps.candidates.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["pub3"]
        );
    }
}

/// Population model shared by the quota sampler and the percentile gate

use crate::{Result, VirosampleError};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One taxon of a labelled population.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: String,
    pub group: String,
    /// Fraction of defective sites (e.g. N content); lower is better.
    pub quality: Option<f64>,
    pub metrics: BTreeMap<String, f64>,
}

impl Member {
    pub fn new(id: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group: group.into(),
            quality: None,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_quality(mut self, quality: f64) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Finite value of a named metric, if any.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().filter(|v| v.is_finite())
    }
}

/// A percentile gate already applied to a population.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedGate {
    pub field: String,
    pub percentile: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Population {
    members: Vec<Member>,
    /// Member id -> position in `members`.
    index: HashMap<String, usize>,
    gates: Vec<AppliedGate>,
}

impl Population {
    /// Build a population, rejecting duplicate ids.
    pub fn new(members: Vec<Member>) -> Result<Self> {
        let mut index = HashMap::with_capacity(members.len());
        for (pos, member) in members.iter().enumerate() {
            if index.insert(member.id.clone(), pos).is_some() {
                return Err(VirosampleError::DuplicateTaxon(member.id.clone()));
            }
        }
        Ok(Self {
            members,
            index,
            gates: Vec::new(),
        })
    }

    /// Members are already known to be unique.
    pub(crate) fn derive(&self, members: Vec<Member>, gates: Vec<AppliedGate>) -> Self {
        let index = members
            .iter()
            .enumerate()
            .map(|(pos, m)| (m.id.clone(), pos))
            .collect();
        Self {
            members,
            index,
            gates,
        }
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Member> {
        self.index.get(id).map(|&pos| &self.members[pos])
    }

    pub fn ids(&self) -> BTreeSet<String> {
        self.members.iter().map(|m| m.id.clone()).collect()
    }

    pub fn gates(&self) -> &[AppliedGate] {
        &self.gates
    }

    pub fn gate(&self, field: &str, percentile: f64) -> Option<&AppliedGate> {
        self.gates
            .iter()
            .find(|g| g.field == field && g.percentile == percentile)
    }

    /// Group label -> members, in first-seen label order.
    pub fn groups(&self) -> IndexMap<&str, Vec<&Member>> {
        let mut groups: IndexMap<&str, Vec<&Member>> = IndexMap::new();
        for member in &self.members {
            groups.entry(member.group.as_str()).or_default().push(member);
        }
        groups
    }

    /// Group label -> member count, sorted by label.
    pub fn group_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for member in &self.members {
            *counts.entry(member.group.clone()).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<Member> for Population {
    /// Later duplicates of an id are dropped.
    fn from_iter<I: IntoIterator<Item = Member>>(iter: I) -> Self {
        let mut index = HashMap::new();
        let mut members = Vec::new();
        for member in iter {
            if !index.contains_key(&member.id) {
                index.insert(member.id.clone(), members.len());
                members.push(member);
            }
        }
        Self {
            members,
            index,
            gates: Vec::new(),
        }
    }
}

/// Maximum number of members a selection may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Budget(usize);

impl Budget {
    pub fn new(size: usize) -> Self {
        Self(size)
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl TryFrom<i64> for Budget {
    type Error = VirosampleError;

    fn try_from(value: i64) -> Result<Self> {
        usize::try_from(value)
            .map(Budget)
            .map_err(|_| VirosampleError::InvalidBudget(value))
    }
}

impl From<usize> for Budget {
    fn from(value: usize) -> Self {
        Budget(value)
    }
}

/// Set of retained taxon ids, iterated in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionResult {
    ids: BTreeSet<String>,
}

impl SelectionResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.ids.insert(id.into())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn ids(&self) -> &BTreeSet<String> {
        &self.ids
    }

    pub fn into_ids(self) -> BTreeSet<String> {
        self.ids
    }

    pub fn is_superset_of<'a, I>(&self, ids: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        ids.into_iter().all(|id| self.ids.contains(id))
    }
}

impl<S: Into<String>> FromIterator<S> for SelectionResult {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl<S: Into<String>> Extend<S> for SelectionResult {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.ids.extend(iter.into_iter().map(Into::into));
    }
}

impl IntoIterator for SelectionResult {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

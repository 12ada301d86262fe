/// Trait definitions for neighbor selection
///
/// `TreeView` is the read-only surface the selectors need from a phylogeny;
/// `NeighborPolicy` is the interchangeable strategy that decides which
/// non-seed leaves pad the selection.

use crate::core::population::SelectionResult;
use crate::{Result, VirosampleError};

/// An internal node together with its descendant leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clade<'a> {
    leaves: &'a [String],
}

impl<'a> Clade<'a> {
    pub fn new(leaves: &'a [String]) -> Self {
        Self { leaves }
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn leaf_names(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.leaves.iter().map(String::as_str)
    }
}

/// Read-only structural view of a phylogenetic tree.
pub trait TreeView: Sync {
    /// All leaf names.
    fn leaf_names(&self) -> Vec<&str>;

    fn leaf_count(&self) -> usize {
        self.leaf_names().len()
    }

    fn has_leaf(&self, name: &str) -> bool;

    /// Branch distance between two leaves.
    fn distance(&self, a: &str, b: &str) -> Result<f64>;

    /// Ancestor clades from the leaf's parent up to the root.
    fn ancestor_path(&self, leaf: &str) -> Result<Vec<Clade<'_>>>;

    /// Distance from `leaf` to every leaf (itself included).
    fn distances_from(&self, leaf: &str) -> Result<Vec<(&str, f64)>> {
        if !self.has_leaf(leaf) {
            return Err(VirosampleError::UnknownTaxon(leaf.to_string()));
        }
        self.leaf_names()
            .into_iter()
            .map(|other| Ok((other, self.distance(leaf, other)?)))
            .collect()
    }
}

/// Strategy that pads a seed set with nearby leaves.
pub trait NeighborPolicy: Send + Sync {
    /// Expand `seeds` (validated, sorted, `seeds.len() < budget < leaf_count`).
    fn expand(&self, tree: &dyn TreeView, seeds: &[&str], budget: usize) -> Result<SelectionResult>;

    fn policy_name(&self) -> &str;
}

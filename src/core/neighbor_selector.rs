/// Phylogenetic neighbor selection
///
/// Keeps every seed taxon and pads the selection with the leaves the
/// configured policy considers closest, up to a budget.

use crate::core::population::SelectionResult;
use crate::core::selection::{create_policy, NeighborPolicy, NeighborPolicyKind, TreeView};
use crate::{Result, VirosampleError};
use std::collections::BTreeSet;
use tracing::info;

pub struct NeighborSelector {
    policy: Box<dyn NeighborPolicy>,
}

impl NeighborSelector {
    pub fn new(kind: NeighborPolicyKind) -> Self {
        Self {
            policy: create_policy(kind),
        }
    }

    pub fn policy_name(&self) -> &str {
        self.policy.policy_name()
    }

    /// Seeds plus nearby leaves, at most `budget` unless the seeds alone exceed it.
    pub fn select(
        &self,
        tree: &dyn TreeView,
        seeds: &BTreeSet<String>,
        budget: usize,
    ) -> Result<SelectionResult> {
        if let Some(unknown) = seeds.iter().find(|s| !tree.has_leaf(s)) {
            return Err(VirosampleError::UnknownTaxon(unknown.clone()));
        }

        let leaf_count = tree.leaf_count();
        if seeds.len() >= budget {
            info!(
                "{} seed taxa already meet the budget of {}; no neighbors added",
                seeds.len(),
                budget
            );
            return Ok(seeds.iter().cloned().collect());
        }
        if budget >= leaf_count {
            info!(
                "No pruning required: {} leaves fit within budget of {}",
                leaf_count, budget
            );
            return Ok(tree.leaf_names().into_iter().collect());
        }

        let ordered: Vec<&str> = seeds.iter().map(String::as_str).collect();
        let selection = self.policy.expand(tree, &ordered, budget)?;
        info!(
            "Selected {} of {} leaves around {} seeds ({})",
            selection.len(),
            leaf_count,
            seeds.len(),
            self.policy.policy_name()
        );
        Ok(selection)
    }
}

impl Default for NeighborSelector {
    fn default() -> Self {
        Self::new(NeighborPolicyKind::AncestorExpansion)
    }
}

/// Neighbor policy implementations

use super::traits::{NeighborPolicy, TreeView};
use crate::core::population::SelectionResult;
use crate::Result;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Which neighbor-discovery policy to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NeighborPolicyKind {
    /// Climb each seed's ancestors while whole clades still fit (Policy A).
    AncestorExpansion,
    /// Take nearest leaves by branch distance, one per seed per round (Policy B).
    RoundRobinNearest,
}

impl std::str::FromStr for NeighborPolicyKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ancestor" | "ancestor-expansion" | "ancestor_expansion" | "clade" => {
                Ok(NeighborPolicyKind::AncestorExpansion)
            }
            "nearest" | "round-robin" | "round_robin" | "round-robin-nearest" | "distance" => {
                Ok(NeighborPolicyKind::RoundRobinNearest)
            }
            _ => Err(format!(
                "Unknown neighbor policy: '{}'. Options: ancestor, nearest",
                s
            )),
        }
    }
}

impl std::fmt::Display for NeighborPolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NeighborPolicyKind::AncestorExpansion => write!(f, "ancestor-expansion"),
            NeighborPolicyKind::RoundRobinNearest => write!(f, "round-robin-nearest"),
        }
    }
}

/// Policy A: per seed, add the largest enclosing clades that fit its share.
#[derive(Debug, Clone, Default)]
pub struct AncestorExpansion;

impl NeighborPolicy for AncestorExpansion {
    fn expand(&self, tree: &dyn TreeView, seeds: &[&str], budget: usize) -> Result<SelectionResult> {
        let mut selected: SelectionResult = seeds.iter().copied().collect();

        for (i, seed) in seeds.iter().enumerate() {
            let seeds_left = seeds.len() - i;
            let spare = budget.saturating_sub(selected.len()) / seeds_left;
            // The seed's own slot is already paid for.
            let allowance = spare + 1;

            for clade in tree.ancestor_path(seed)? {
                if clade.leaf_count() > allowance {
                    break;
                }
                selected.extend(clade.leaf_names());
            }
            debug!(
                "Seed '{}': allowance {} leaves, selection now {}",
                seed,
                allowance,
                selected.len()
            );
        }

        Ok(selected)
    }

    fn policy_name(&self) -> &str {
        "ancestor-expansion"
    }
}

/// Policy B: round-robin over seeds, each taking its nearest unselected leaf.
#[derive(Debug, Clone, Default)]
pub struct RoundRobinNearest;

impl RoundRobinNearest {
    /// Every other leaf sorted by (distance, name).
    fn candidates<'t>(tree: &'t dyn TreeView, seed: &str) -> Result<VecDeque<&'t str>> {
        let mut distances: Vec<(&str, f64)> = tree
            .distances_from(seed)?
            .into_iter()
            .filter(|(leaf, _)| *leaf != seed)
            .collect();
        distances.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        Ok(distances.into_iter().map(|(leaf, _)| leaf).collect())
    }
}

impl NeighborPolicy for RoundRobinNearest {
    fn expand(&self, tree: &dyn TreeView, seeds: &[&str], budget: usize) -> Result<SelectionResult> {
        let mut queues: Vec<VecDeque<&str>> = seeds
            .par_iter()
            .map(|seed| Self::candidates(tree, seed))
            .collect::<Result<_>>()?;

        let target = budget.min(tree.leaf_count());
        let mut selected: SelectionResult = seeds.iter().copied().collect();

        while selected.len() < target {
            let mut progressed = false;
            for queue in queues.iter_mut() {
                if selected.len() >= target {
                    break;
                }
                while let Some(leaf) = queue.pop_front() {
                    if selected.insert(leaf) {
                        progressed = true;
                        break;
                    }
                }
            }
            if !progressed {
                break;
            }
        }

        Ok(selected)
    }

    fn policy_name(&self) -> &str {
        "round-robin-nearest"
    }
}

/// Factory for a policy chosen by configuration.
pub fn create_policy(kind: NeighborPolicyKind) -> Box<dyn NeighborPolicy> {
    match kind {
        NeighborPolicyKind::AncestorExpansion => Box::new(AncestorExpansion),
        NeighborPolicyKind::RoundRobinNearest => Box::new(RoundRobinNearest),
    }
}

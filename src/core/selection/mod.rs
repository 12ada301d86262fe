/// Neighbor selection strategies

pub mod impls;
pub mod traits;

pub use traits::{Clade, NeighborPolicy, TreeView};

pub use impls::{create_policy, AncestorExpansion, NeighborPolicyKind, RoundRobinNearest};

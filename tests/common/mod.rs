//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::collections::BTreeSet;
use virosample::{Member, Population};

/// Population with one member per entry of `sizes`, labelled `{group}{index}`.
/// Every member gets the same defect fraction so weighted draws are feasible.
pub fn population(sizes: &[(&str, usize)]) -> Population {
    let members = sizes
        .iter()
        .flat_map(|(group, size)| {
            (0..*size).map(move |i| Member::new(format!("{}{}", group, i), *group).with_quality(0.05))
        })
        .collect();
    Population::new(members).expect("unique ids")
}

pub fn ids(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// ref is the outgroup; s1/s2 and s3/s4 are cherries, s1 is closest to s2,
/// and s3 and s4 are equidistant from s1.
pub const FIVE_LEAF_TREE: &str = "(ref:5,((s1:1,s2:1):1,(s3:1,s4:1):2):1);";

/// Two-level tree with eight leaves in four cherries.
pub const EIGHT_LEAF_TREE: &str =
    "(((a1:1,a2:1):1,(b1:1,b2:1):1):1,((c1:1,c2:1):1,(d1:1,d2:1):1):1);";

/// Caterpillar tree `(((t0:1,t1:1):1,t2:1):1,...,t{n-1}:1);`, nested `n - 1` deep.
pub fn ladder_tree(n: usize) -> String {
    let mut newick = "(".repeat(n.saturating_sub(1));
    newick.push_str("t0:1");
    for i in 1..n {
        newick.push_str(&format!(",t{}:1)", i));
        if i + 1 < n {
            newick.push_str(":1");
        }
    }
    newick.push(';');
    newick
}

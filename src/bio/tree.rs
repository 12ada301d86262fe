/// Newick phylogeny backed by a flat node arena
///
/// Leaves are stored in depth-first order, so the leaves below any node form
/// a contiguous slice of `leaves`. Clades are handed out as borrowed slices.

use crate::core::selection::{Clade, TreeView};
use crate::{Result, VirosampleError};
use flate2::read::GzDecoder;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_until},
    character::complete::{char, multispace0},
    combinator::{map, opt, value},
    multi::many0,
    number::complete::double,
    sequence::{delimited, preceded, terminated},
    IResult,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// `[...]` comment
fn comment(input: &str) -> IResult<&str, &str> {
    delimited(char('['), take_until("]"), char(']'))(input)
}

/// Whitespace and comments
fn ws(input: &str) -> IResult<&str, ()> {
    let (input, _) = multispace0(input)?;
    let (input, _) = many0(terminated(comment, multispace0))(input)?;
    Ok((input, ()))
}

fn quoted_label(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('\''),
            many0(alt((value("'", tag("''")), is_not("'")))),
            char('\''),
        ),
        |parts: Vec<&str>| parts.concat(),
    )(input)
}

fn bare_label(input: &str) -> IResult<&str, String> {
    map(is_not("(),:;[]' \t\r\n"), String::from)(input)
}

fn label(input: &str) -> IResult<&str, String> {
    alt((quoted_label, bare_label))(input)
}

fn branch_length(input: &str) -> IResult<&str, f64> {
    preceded(terminated(char(':'), ws), double)(input)
}

/// Optional label and branch length after a leaf name or a closing `)`.
fn node_suffix(input: &str) -> IResult<&str, (Option<String>, Option<f64>)> {
    let (input, _) = ws(input)?;
    let (input, name) = opt(label)(input)?;
    let (input, _) = ws(input)?;
    let (input, length) = opt(branch_length)(input)?;
    let (input, _) = ws(input)?;
    Ok((input, (name, length)))
}

fn open_clade(input: &str) -> IResult<&str, char> {
    terminated(char('('), ws)(input)
}

fn close_clade(input: &str) -> IResult<&str, char> {
    terminated(char(')'), ws)(input)
}

fn sibling(input: &str) -> IResult<&str, char> {
    terminated(char(','), ws)(input)
}

fn end_of_tree(input: &str) -> IResult<&str, char> {
    terminated(char(';'), ws)(input)
}

fn parse_error(rest: &str, what: &str) -> VirosampleError {
    VirosampleError::Parse(format!(
        "Failed to parse Newick tree: {} at '{}'",
        what,
        rest.trim_start().chars().take(32).collect::<String>()
    ))
}

#[derive(Debug, Clone)]
struct Node {
    name: Option<String>,
    parent: Option<usize>,
    /// Cumulative branch length from the root.
    depth: f64,
    /// Number of edges from the root.
    level: usize,
    /// Half-open range into `PhyloTree::leaves`.
    span: (usize, usize),
}

#[derive(Debug, Clone)]
pub struct PhyloTree {
    nodes: Vec<Node>,
    leaves: Vec<String>,
    leaf_nodes: Vec<usize>,
    leaf_index: HashMap<String, usize>,
}

impl PhyloTree {
    /// Parse the first tree of a Newick string.
    ///
    /// Nesting is tracked with an explicit stack of open clades, so ladder
    /// shaped trees of any depth parse without recursion.
    pub fn parse(input: &str) -> Result<Self> {
        let mut tree = PhyloTree {
            nodes: Vec::new(),
            leaves: Vec::new(),
            leaf_nodes: Vec::new(),
            leaf_index: HashMap::new(),
        };
        let mut open: Vec<usize> = Vec::new();
        let (mut rest, _) = ws(input).map_err(|_| parse_error(input, "invalid comment"))?;

        'subtree: loop {
            while let Ok((r, _)) = open_clade(rest) {
                let id = tree.push_node(None, open.last().copied(), 0.0);
                open.push(id);
                rest = r;
            }

            let (r, (name, length)) =
                node_suffix(rest).map_err(|_| parse_error(rest, "invalid leaf"))?;
            let name = name
                .filter(|n| !n.is_empty())
                .ok_or_else(|| parse_error(rest, "leaf without a name"))?;
            tree.push_leaf(name, open.last().copied(), length.unwrap_or(0.0))?;
            rest = r;

            loop {
                if let Ok((r, _)) = sibling(rest) {
                    if open.is_empty() {
                        return Err(parse_error(rest, "',' outside of a clade"));
                    }
                    rest = r;
                    continue 'subtree;
                }
                if let Ok((r, _)) = close_clade(rest) {
                    let id = open
                        .pop()
                        .ok_or_else(|| parse_error(rest, "unbalanced ')'"))?;
                    let (r, (name, length)) =
                        node_suffix(r).map_err(|_| parse_error(r, "invalid clade label"))?;
                    let end = tree.leaves.len();
                    let node = &mut tree.nodes[id];
                    node.name = name;
                    node.depth = length.unwrap_or(0.0);
                    node.span.1 = end;
                    rest = r;
                    continue;
                }
                break 'subtree;
            }
        }

        if !open.is_empty() {
            return Err(parse_error(rest, "missing ')'"));
        }
        let (rest, _) = end_of_tree(rest).map_err(|_| parse_error(rest, "expected ';'"))?;
        if !rest.trim().is_empty() && !rest.trim_start().starts_with('(') {
            return Err(VirosampleError::Parse(format!(
                "Unexpected trailing Newick content: '{}'",
                rest.trim().chars().take(32).collect::<String>()
            )));
        }

        tree.resolve_depths();
        Ok(tree)
    }

    /// Read a Newick file (supports .gz compression)
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut contents = String::new();
        let file = File::open(path)?;
        if path.extension().and_then(|s| s.to_str()) == Some("gz") {
            GzDecoder::new(file).read_to_string(&mut contents)?;
        } else {
            std::io::BufReader::new(file).read_to_string(&mut contents)?;
        }
        Self::parse(&contents)
    }

    /// Until `resolve_depths` runs, `depth` holds the node's own branch length.
    fn push_node(&mut self, name: Option<String>, parent: Option<usize>, length: f64) -> usize {
        let start = self.leaves.len();
        self.nodes.push(Node {
            name,
            parent,
            depth: length,
            level: 0,
            span: (start, start),
        });
        self.nodes.len() - 1
    }

    fn push_leaf(&mut self, name: String, parent: Option<usize>, length: f64) -> Result<()> {
        if self.leaf_index.contains_key(&name) {
            return Err(VirosampleError::Parse(format!(
                "Duplicate leaf name in tree: '{}'",
                name
            )));
        }
        let id = self.push_node(Some(name.clone()), parent, length);
        self.nodes[id].span.1 += 1;
        self.leaf_index.insert(name.clone(), id);
        self.leaves.push(name);
        self.leaf_nodes.push(id);
        Ok(())
    }

    /// Turn branch lengths into root distances. Parents precede their
    /// children in the arena, so one forward pass suffices.
    fn resolve_depths(&mut self) {
        for id in 0..self.nodes.len() {
            match self.nodes[id].parent {
                Some(p) => {
                    let (depth, level) = (self.nodes[p].depth, self.nodes[p].level);
                    let node = &mut self.nodes[id];
                    node.depth = depth + node.depth.max(0.0);
                    node.level = level + 1;
                }
                // The root's own branch length does not separate any two leaves.
                None => self.nodes[id].depth = 0.0,
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Leaf names in depth-first order.
    pub fn leaves(&self) -> &[String] {
        &self.leaves
    }

    /// Label of the root node, if the Newick string named it.
    pub fn root_name(&self) -> Option<&str> {
        self.nodes.first().and_then(|n| n.name.as_deref())
    }

    fn leaf_node(&self, name: &str) -> Result<usize> {
        self.leaf_index
            .get(name)
            .copied()
            .ok_or_else(|| VirosampleError::UnknownTaxon(name.to_string()))
    }

    fn lowest_common_ancestor(&self, mut a: usize, mut b: usize) -> usize {
        while self.nodes[a].level > self.nodes[b].level {
            a = self.nodes[a].parent.unwrap_or(a);
        }
        while self.nodes[b].level > self.nodes[a].level {
            b = self.nodes[b].parent.unwrap_or(b);
        }
        while a != b {
            match (self.nodes[a].parent, self.nodes[b].parent) {
                (Some(pa), Some(pb)) => {
                    a = pa;
                    b = pb;
                }
                _ => break,
            }
        }
        a
    }
}

impl std::str::FromStr for PhyloTree {
    type Err = VirosampleError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TreeView for PhyloTree {
    fn leaf_names(&self) -> Vec<&str> {
        self.leaves.iter().map(String::as_str).collect()
    }

    fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    fn has_leaf(&self, name: &str) -> bool {
        self.leaf_index.contains_key(name)
    }

    fn distance(&self, a: &str, b: &str) -> Result<f64> {
        let na = self.leaf_node(a)?;
        let nb = self.leaf_node(b)?;
        let lca = self.lowest_common_ancestor(na, nb);
        Ok(self.nodes[na].depth + self.nodes[nb].depth - 2.0 * self.nodes[lca].depth)
    }

    fn ancestor_path(&self, leaf: &str) -> Result<Vec<Clade<'_>>> {
        let mut current = self.nodes[self.leaf_node(leaf)?].parent;
        let mut path = Vec::with_capacity(self.nodes.len().min(64));
        while let Some(id) = current {
            let (start, end) = self.nodes[id].span;
            path.push(Clade::new(&self.leaves[start..end]));
            current = self.nodes[id].parent;
        }
        Ok(path)
    }

    /// Single upward walk: every leaf first reached from ancestor `u` has `u`
    /// as its lowest common ancestor with `leaf`.
    fn distances_from(&self, leaf: &str) -> Result<Vec<(&str, f64)>> {
        let origin = self.leaf_node(leaf)?;
        let origin_depth = self.nodes[origin].depth;
        let mut distances = Vec::with_capacity(self.leaves.len());

        let mut covered = self.nodes[origin].span;
        distances.push((self.leaves[covered.0].as_str(), 0.0));
        let mut current = self.nodes[origin].parent;
        while let Some(id) = current {
            let node = &self.nodes[id];
            let (start, end) = node.span;
            for pos in (start..covered.0).chain(covered.1..end) {
                let other = &self.nodes[self.leaf_nodes[pos]];
                let d = origin_depth + other.depth - 2.0 * node.depth;
                distances.push((self.leaves[pos].as_str(), d));
            }
            covered = node.span;
            current = node.parent;
        }
        Ok(distances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE: &str = "((A:1,B:2)ab:1,(C:1,(D:0.5,E:0.5):1)cde:2)root;";

    #[test]
    fn test_parse_leaves_in_order() {
        let tree = PhyloTree::parse(TREE).unwrap();
        assert_eq!(tree.leaves(), &["A", "B", "C", "D", "E"]);
        assert_eq!(tree.node_count(), 9);
        assert_eq!(tree.root_name(), Some("root"));
    }

    #[test]
    fn test_distance() {
        let tree = PhyloTree::parse(TREE).unwrap();
        assert_eq!(tree.distance("A", "A").unwrap(), 0.0);
        assert_eq!(tree.distance("A", "B").unwrap(), 3.0);
        assert_eq!(tree.distance("D", "E").unwrap(), 1.0);
        assert_eq!(tree.distance("A", "D").unwrap(), 1.0 + 1.0 + 2.0 + 1.0 + 0.5);
        assert_eq!(tree.distance("D", "A").unwrap(), tree.distance("A", "D").unwrap());
        assert!(matches!(
            tree.distance("A", "Z"),
            Err(VirosampleError::UnknownTaxon(name)) if name == "Z"
        ));
    }

    #[test]
    fn test_distances_from_matches_pairwise() {
        let tree = PhyloTree::parse(TREE).unwrap();
        for leaf in tree.leaves() {
            let all = tree.distances_from(leaf).unwrap();
            assert_eq!(all.len(), 5);
            for (other, d) in all {
                assert!((d - tree.distance(leaf, other).unwrap()).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_ancestor_path() {
        let tree = PhyloTree::parse(TREE).unwrap();
        let path = tree.ancestor_path("D").unwrap();
        let counts: Vec<_> = path.iter().map(|c| c.leaf_count()).collect();
        assert_eq!(counts, vec![2, 3, 5]);
        let names: Vec<_> = path[1].leaf_names().collect();
        assert_eq!(names, vec!["C", "D", "E"]);
    }

    #[test]
    fn test_quoted_labels_and_comments() {
        let tree = PhyloTree::parse(
            "('hCoV-19/Canada/ON-1/2021':0.1,[&support=1] 'it''s':0.2, plain_name:1e-3)[root];",
        )
        .unwrap();
        assert_eq!(
            tree.leaves(),
            &["hCoV-19/Canada/ON-1/2021", "it's", "plain_name"]
        );
        assert!((tree.distance("it's", "plain_name").unwrap() - 0.201).abs() < 1e-12);
    }

    #[test]
    fn test_missing_lengths_are_zero() {
        let tree = PhyloTree::parse("(A,(B,C));").unwrap();
        assert_eq!(tree.distance("A", "C").unwrap(), 0.0);
        assert_eq!(tree.ancestor_path("C").unwrap().len(), 2);
    }

    #[test]
    fn test_single_leaf_tree() {
        let tree = PhyloTree::parse("A;").unwrap();
        assert_eq!(tree.leaf_count(), 1);
        assert!(tree.ancestor_path("A").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_bad_trees() {
        assert!(PhyloTree::parse("(A,B").is_err());
        assert!(PhyloTree::parse("(A,B));").is_err());
        assert!(PhyloTree::parse("A,B;").is_err());
        assert!(PhyloTree::parse("(A,A);").is_err());
        assert!(PhyloTree::parse("(A,);").is_err());
        assert!(PhyloTree::parse("").is_err());
    }

    #[test]
    fn test_deep_ladder() {
        let n = 100_000;
        let mut newick = "(".repeat(n - 1);
        newick.push_str("t0:1");
        for i in 1..n {
            newick.push_str(&format!(",t{}:1)", i));
            if i + 1 < n {
                newick.push_str(":1");
            }
        }
        newick.push(';');

        let tree = PhyloTree::parse(&newick).unwrap();
        assert_eq!(tree.leaf_count(), n);
        assert_eq!(tree.node_count(), 2 * n - 1);
        assert_eq!(tree.ancestor_path("t0").unwrap().len(), n - 1);
        assert_eq!(tree.distance("t0", "t1").unwrap(), 2.0);
        assert_eq!(tree.distance("t0", "t2").unwrap(), 3.0);
        assert_eq!(tree.distances_from("t7").unwrap().len(), n);
    }
}

/// End-to-end runs of the subsample and neighbors commands on files
mod common;

use common::FIVE_LEAF_TREE;
use rstest::rstest;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use virosample::bio::fasta::parse_fasta;
use virosample::bio::metadata::MetadataTable;
use virosample::cli::commands::neighbors::{select_neighbors, NeighborsArgs};
use virosample::cli::commands::subsample::{subsample, SubsampleArgs};
use virosample::core::config::Config;
use virosample::core::selection::NeighborPolicyKind;

const BASE: &str = "ACGTACGTACGTACGTACGTACGTACGTACGTACGTACGT";

/// BASE with one substituted site, so every variant is distinct.
fn variant(site: usize) -> String {
    let mut bytes = BASE.as_bytes().to_vec();
    bytes[site] = if bytes[site] == b'A' { b'C' } else { b'A' };
    String::from_utf8(bytes).unwrap()
}

fn with_ns(site: usize, count: usize) -> String {
    let mut bytes = variant(site).into_bytes();
    for b in bytes.iter_mut().take(count) {
        *b = b'N';
    }
    String::from_utf8(bytes).unwrap()
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();

        let mut tsv = String::from("strain\tPango lineage\tN-Content\tCollection date\tLocation\n");
        let rows = [
            ("a1", "A", "0.0", "2021-01-01", "Europe / Germany"),
            ("a2", "A", "0.0", "2021-01-02", "Europe / France"),
            ("b1", "B", "0.01", "2021-02-01", "Europe / Germany"),
            ("b2", "B", "0.02", "2021-02-02", "Europe / Germany"),
            ("b3", "B", "0.01", "2021-02-03", "Europe / Italy"),
            ("b4", "B", "0.03", "2021-02-04", "Europe / Italy"),
            ("b5", "B", "0.01", "2021-02-05", "Europe / Spain"),
            ("b6", "B", "0.02", "2021-02-06", "Europe / Spain"),
            ("b7", "B", "0.05", "2021-02-07", "Europe / Spain"),
            ("b8", "B", "0.06", "2021-02-08", "Europe / Spain"),
            ("b9", "B", "0.08", "2021-02-09", "Europe / Spain"),
            ("b10", "B", "0.01", "2021-02-10", "Europe / Spain"),
            ("short", "B", "0.01", "2021-02-11", "Europe / Spain"),
            ("c1", "C", "0.01", "2021-03-01", "Asia / Japan"),
        ];
        for (id, lineage, n, date, loc) in rows {
            tsv.push_str(&format!("{}\t{}\t{}\t{}\t{}\n", id, lineage, n, date, loc));
        }
        fs::write(dir.path().join("metadata.tsv"), tsv).unwrap();

        let mut fasta = String::new();
        let mut record = |id: &str, seq: &str| fasta.push_str(&format!(">{}\n{}\n", id, seq));
        record("user1", &variant(30));
        record("a1", &variant(1));
        record("a2", &variant(2));
        for i in 1..=6 {
            record(&format!("b{}", i), &variant(10 + i));
        }
        record("b7", &with_ns(20, 1));
        record("b8", &with_ns(21, 2));
        record("b9", &with_ns(22, 3));
        record("b10", &variant(11));
        record("short", "ACGTACGTAC");
        record("c1", &variant(25));
        fs::write(dir.path().join("sequences.fasta"), fasta).unwrap();

        fs::write(dir.path().join("lineage_report.csv"), "taxon,lineage\nuser1,B\n").unwrap();
        fs::write(dir.path().join("tree.nwk"), FIVE_LEAF_TREE).unwrap();

        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn subsample_args(&self, prefix: &str) -> SubsampleArgs {
        SubsampleArgs {
            metadata: self.path("metadata.tsv"),
            fasta: Some(self.path("sequences.fasta")),
            report: Some(self.path("lineage_report.csv")),
            lineages: Some("A".to_string()),
            budget: Some(6),
            seed: Some(2021),
            min_length: Some(30),
            max_length: Some(50),
            max_ambiguous: Some(10),
            output: self.path(&format!("{}.fasta", prefix)),
            output_metadata: self.path(&format!("{}.tsv", prefix)),
            stats: Some(self.path(&format!("{}.json", prefix))),
            ..Default::default()
        }
    }
}

fn fasta_ids(path: &Path) -> BTreeSet<String> {
    parse_fasta(path).unwrap().into_iter().map(|s| s.id).collect()
}

#[test]
fn test_subsample_end_to_end() {
    let fx = Fixture::new();
    let args = SubsampleArgs {
        nextstrain_metadata: Some(fx.path("run1.nextstrain.tsv")),
        ..fx.subsample_args("run1")
    };
    let stats = subsample(&args, &Config::default()).unwrap();

    assert_eq!(stats.n_total_sequences, 14);
    assert_eq!(stats.n_total_lineages, 3);
    assert_eq!(stats.n_matching_lineage, 13);
    assert_eq!(stats.n_sequence_filtered, Some(12));
    assert_eq!(stats.n_distinct_sequences, Some(12));
    assert_eq!(stats.n_quality_filtered, Some(8));
    assert_eq!(stats.n_final_filtered_sequences, 6);

    let kept = fasta_ids(&args.output);
    assert_eq!(kept.len(), 6);
    for id in ["user1", "a1", "a2"] {
        assert!(kept.contains(id), "{} missing from {:?}", id, kept);
    }
    for id in ["b7", "b8", "b9", "b10", "short", "c1"] {
        assert!(!kept.contains(id), "{} should have been dropped", id);
    }

    let metadata = MetadataTable::read(&args.output_metadata).unwrap();
    assert_eq!(metadata.len(), 5);
    assert!(!metadata.contains("user1"));

    let nextstrain = MetadataTable::read(fx.path("run1.nextstrain.tsv")).unwrap();
    assert_eq!(nextstrain.len(), 5);
    assert!(nextstrain.column("Pango_lineage").is_none());
    assert!(nextstrain.column("Location").is_none());
    assert_eq!(nextstrain.value("a1", "country_exposure"), Some("Germany"));
    assert_eq!(nextstrain.value("a2", "region_exposure"), Some("Europe"));

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(args.stats.as_ref().unwrap()).unwrap()).unwrap();
    assert_eq!(json["n_final_filtered_sequences"], 6);
    assert_eq!(json["matching_lineage_counts"]["A"], 2);
}

#[test]
fn test_subsample_is_reproducible_with_seed() {
    let fx = Fixture::new();
    let first = fx.subsample_args("first");
    let second = fx.subsample_args("second");
    subsample(&first, &Config::default()).unwrap();
    subsample(&second, &Config::default()).unwrap();

    assert_eq!(
        fs::read_to_string(&first.output).unwrap(),
        fs::read_to_string(&second.output).unwrap()
    );
}

#[test]
fn test_subsample_without_fasta_fits_budget() {
    let fx = Fixture::new();
    let args = SubsampleArgs {
        fasta: None,
        report: None,
        lineages: None,
        country: Some("Germany, Japan".to_string()),
        budget: Some(10),
        ..fx.subsample_args("meta_only")
    };
    let stats = subsample(&args, &Config::default()).unwrap();

    assert_eq!(stats.n_metadata_filtered_sequences, 4);
    assert_eq!(stats.n_final_filtered_sequences, 4);
    assert!(stats.short_circuited);
    assert!(!args.output.exists());
    let metadata = MetadataTable::read(&args.output_metadata).unwrap();
    let ids: Vec<&str> = metadata.ids().collect();
    assert_eq!(ids, vec!["a1", "b1", "b2", "c1"]);
}

#[test]
fn test_subsample_date_window() {
    let fx = Fixture::new();
    let args = SubsampleArgs {
        fasta: None,
        report: None,
        lineages: None,
        date_start: Some("2021-02-05".to_string()),
        date_end: Some("2021-02-07".to_string()),
        ..fx.subsample_args("dated")
    };
    let stats = subsample(&args, &Config::default()).unwrap();
    assert_eq!(stats.n_final_filtered_sequences, 3);
}

#[test]
fn test_subsample_with_no_matches_fails() {
    let fx = Fixture::new();
    let args = SubsampleArgs {
        fasta: None,
        report: None,
        lineages: None,
        country: Some("Atlantis".to_string()),
        ..fx.subsample_args("empty")
    };
    assert!(subsample(&args, &Config::default()).is_err());
}

#[test]
fn test_neighbors_writes_leaflist_and_metadata() {
    let fx = Fixture::new();
    fs::write(fx.path("report.csv"), "taxon,lineage\ns1,B\n").unwrap();
    fs::write(
        fx.path("tree_meta.tsv"),
        "strain\tPango_lineage\nref\tA\ns1\tB\ns2\tB\ns3\tB\ns4\tB\n",
    )
    .unwrap();

    let args = NeighborsArgs {
        tree: fx.path("tree.nwk"),
        metadata: Some(fx.path("tree_meta.tsv")),
        report: Some(fx.path("report.csv")),
        reference: Some("ref".to_string()),
        max_taxa: Some(3),
        policy: Some(NeighborPolicyKind::AncestorExpansion),
        output: fx.path("leaflist"),
        output_metadata: Some(fx.path("leaflist.tsv")),
        ..Default::default()
    };
    let outcome = select_neighbors(&args, &Config::default()).unwrap();

    assert_eq!(outcome.leaf_count, 5);
    assert_eq!(outcome.outgroup.as_deref(), Some("ref"));
    assert_eq!(outcome.selected, vec!["ref", "s1", "s2"]);
    let leaflist = fs::read_to_string(&args.output).unwrap();
    assert_eq!(leaflist.lines().collect::<Vec<_>>(), vec!["ref", "s1", "s2"]);
    let metadata = MetadataTable::read(fx.path("leaflist.tsv")).unwrap();
    assert_eq!(metadata.len(), 3);
}

#[test]
fn test_neighbors_small_tree_keeps_everything() {
    let fx = Fixture::new();
    let args = NeighborsArgs {
        tree: fx.path("tree.nwk"),
        seeds: vec!["s3".to_string()],
        max_taxa: Some(100),
        output: fx.path("all_leaves"),
        ..Default::default()
    };
    let outcome = select_neighbors(&args, &Config::default()).unwrap();
    assert_eq!(outcome.selected, vec!["ref", "s1", "s2", "s3", "s4"]);
}

/// The outgroup's sister `b1` sits in a cherry that would fit the budget.
const OUTGROUP_TREE: &str = "((ref:1,b1:1):5,(u1:1,(n1:1,(n2:1,n3:1):1):1):5);";

#[rstest]
#[case(NeighborPolicyKind::AncestorExpansion)]
#[case(NeighborPolicyKind::RoundRobinNearest)]
fn test_neighbors_do_not_expand_the_outgroup(#[case] policy: NeighborPolicyKind) {
    let fx = Fixture::new();
    fs::write(fx.path("outgroup.nwk"), OUTGROUP_TREE).unwrap();
    let args = NeighborsArgs {
        tree: fx.path("outgroup.nwk"),
        seeds: vec!["u1".to_string()],
        reference: Some("ref".to_string()),
        max_taxa: Some(5),
        policy: Some(policy),
        output: fx.path("outgroup_leaflist"),
        ..Default::default()
    };
    let outcome = select_neighbors(&args, &Config::default()).unwrap();

    assert_eq!(outcome.seeds.into_iter().collect::<Vec<_>>(), vec!["u1"]);
    assert_eq!(outcome.selected, vec!["ref", "u1", "n1", "n2", "n3"]);
}

#[test]
fn test_neighbors_reference_listed_as_seed_is_expanded() {
    let fx = Fixture::new();
    fs::write(fx.path("outgroup.nwk"), OUTGROUP_TREE).unwrap();
    let args = NeighborsArgs {
        tree: fx.path("outgroup.nwk"),
        seeds: vec!["ref".to_string()],
        reference: Some("ref".to_string()),
        max_taxa: Some(2),
        policy: Some(NeighborPolicyKind::RoundRobinNearest),
        output: fx.path("ref_leaflist"),
        ..Default::default()
    };
    let outcome = select_neighbors(&args, &Config::default()).unwrap();

    assert_eq!(outcome.outgroup, None);
    assert_eq!(outcome.selected, vec!["ref", "b1"]);
}

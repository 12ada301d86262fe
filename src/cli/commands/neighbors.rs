use crate::bio::metadata::{read_id_list, write_id_list, MetadataTable};
use crate::bio::tree::PhyloTree;
use crate::cli::commands::resolve_config;
use crate::cli::formatter::{format_number, print_stats_table, print_success, print_warning, start_spinner};
use crate::core::config::Config;
use crate::core::neighbor_selector::NeighborSelector;
use crate::core::selection::{NeighborPolicyKind, TreeView};
use crate::Result;
use clap::Args;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args, Debug, Default)]
pub struct NeighborsArgs {
    /// Newick tree containing every taxon (optionally gzipped)
    #[arg(short, long, value_name = "FILE")]
    pub tree: PathBuf,

    /// Metadata table to subset to the selected leaves
    #[arg(short, long, value_name = "FILE")]
    pub metadata: Option<PathBuf>,

    /// Lineage report whose first column lists the taxa of interest
    #[arg(short, long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Additional taxa of interest (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub seeds: Vec<String>,

    /// Reference/outgroup leaf, kept when present in the tree
    #[arg(long)]
    pub reference: Option<String>,

    /// Maximum number of leaves to keep
    #[arg(short = 'n', long)]
    pub max_taxa: Option<usize>,

    /// Neighbor policy: ancestor (clade expansion) or nearest (round-robin by distance)
    #[arg(short, long, value_name = "POLICY")]
    pub policy: Option<NeighborPolicyKind>,

    /// Output leaf list, one name per line
    #[arg(short, long, default_value = "leaflist")]
    pub output: PathBuf,

    /// Output metadata for the selected leaves
    #[arg(long, value_name = "FILE")]
    pub output_metadata: Option<PathBuf>,

    /// Configuration file (passed from global)
    #[arg(skip)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NeighborsOutcome {
    pub leaf_count: usize,
    pub seeds: BTreeSet<String>,
    /// Reference leaf added on top of the seeds' neighbors
    pub outgroup: Option<String>,
    /// Selected leaves in tree order
    pub selected: Vec<String>,
}

pub fn run(args: NeighborsArgs) -> anyhow::Result<()> {
    let config = resolve_config(args.config.as_deref())?;
    let outcome = select_neighbors(&args, &config)?;

    print_stats_table(
        "Neighbor selection",
        &[
            ("Leaves in tree", format_number(outcome.leaf_count)),
            ("Taxa of interest", format_number(outcome.seeds.len())),
            ("Selected", format_number(outcome.selected.len())),
        ],
    );
    print_success(&format!(
        "Wrote {} leaves to {}",
        format_number(outcome.selected.len()),
        args.output.display()
    ));
    Ok(())
}

pub fn select_neighbors(args: &NeighborsArgs, config: &Config) -> Result<NeighborsOutcome> {
    let max_taxa = args.max_taxa.unwrap_or(config.neighbors.max_taxa);
    let policy = args.policy.unwrap_or(config.neighbors.policy);
    let reference = args
        .reference
        .clone()
        .unwrap_or_else(|| config.neighbors.reference.clone());

    let spinner = start_spinner("Reading tree...");
    let tree = PhyloTree::from_path(&args.tree)?;
    spinner.finish_with_message(format!(
        "Read tree with {} leaves from {}",
        format_number(tree.leaf_count()),
        args.tree.display()
    ));

    let mut seeds: BTreeSet<String> = args.seeds.iter().cloned().collect();
    if let Some(report) = &args.report {
        seeds.extend(read_id_list(report)?);
    }
    if seeds.is_empty() {
        print_warning("No taxa of interest given; no neighbors will be added");
    }

    // The outgroup is kept but never expanded, so it only costs its own slot.
    let outgroup = if tree.has_leaf(&reference) {
        Some(reference).filter(|r| !seeds.contains(r))
    } else {
        warn!("Reference '{}' is not a leaf of the tree", reference);
        None
    };
    let budget = match &outgroup {
        Some(_) if max_taxa < tree.leaf_count() => max_taxa.saturating_sub(1),
        _ => max_taxa,
    };

    let selector = NeighborSelector::new(policy);
    let mut selection = selector.select(&tree, &seeds, budget)?;
    if let Some(outgroup) = &outgroup {
        selection.insert(outgroup.clone());
    }
    let selected: Vec<String> = tree
        .leaves()
        .iter()
        .filter(|leaf| selection.contains(leaf))
        .cloned()
        .collect();
    write_id_list(&args.output, &selected)?;

    if let (Some(metadata), Some(output)) = (&args.metadata, &args.output_metadata) {
        let table = MetadataTable::read(metadata)?;
        let missing = selected.iter().filter(|id| !table.contains(id)).count();
        if missing > 0 {
            warn!("{} selected leaves have no metadata row", missing);
        }
        table.write(output, Some(selection.ids()))?;
        info!("Wrote metadata for {} leaves to {}", selected.len() - missing, output.display());
    }

    Ok(NeighborsOutcome {
        leaf_count: tree.leaf_count(),
        seeds,
        outgroup,
        selected,
    })
}

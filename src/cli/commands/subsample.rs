use crate::bio::fasta::{parse_fasta, write_fasta};
use crate::bio::metadata::{parse_date, LineageReport, MetadataTable};
use crate::bio::sequence::Sequence;
use crate::cli::commands::{resolve_config, split_list};
use crate::cli::formatter::{format_number, print_stats_table, print_success, start_spinner};
use crate::core::config::Config;
use crate::core::dedup::{collapse_identical, representatives};
use crate::core::population::{Budget, Member, Population};
use crate::core::quality_filter::filter_by_percentiles;
use crate::core::quota_sampler::QuotaSampler;
use crate::core::sequence_filter::SequenceFilter;
use crate::core::stats::SamplingStats;
use crate::{Result, VirosampleError};
use chrono::NaiveDate;
use clap::Args;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use tracing::{info, warn};

pub const SEQ_N: &str = "seq_n";
pub const SEQ_GAP: &str = "seq_gap";
const DEFAULT_DATE_COLUMN: &str = "Collection_date";

#[derive(Args, Debug, Default)]
pub struct SubsampleArgs {
    /// Sample metadata table (TSV or CSV, optionally gzipped)
    #[arg(short, long, value_name = "FILE")]
    pub metadata: PathBuf,

    /// Genome sequences matching the metadata ids
    #[arg(short, long, value_name = "FILE")]
    pub fasta: Option<PathBuf>,

    /// Sequences written to the output first and never filtered
    #[arg(long, value_name = "FILE")]
    pub user_fasta: Option<PathBuf>,

    /// Lineage report (e.g. Pangolin CSV); its ids are always kept and its
    /// lineages select the metadata rows to sample from
    #[arg(short, long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Additional lineages to sample from (comma-separated)
    #[arg(long)]
    pub lineages: Option<String>,

    /// Keep rows whose country contains this text (or matches one of a comma-separated list)
    #[arg(long)]
    pub country: Option<String>,

    /// Keep rows whose region contains this text (or matches one of a comma-separated list)
    #[arg(long)]
    pub region: Option<String>,

    /// Earliest collection date (YYYY-MM-DD)
    #[arg(long)]
    pub date_start: Option<String>,

    /// Latest collection date (YYYY-MM-DD)
    #[arg(long)]
    pub date_end: Option<String>,

    /// Column holding collection dates [default: Collection_date]
    #[arg(long)]
    pub date_column: Option<String>,

    /// Keep every sample from this country when the budget allows
    #[arg(long)]
    pub prefer_country: Option<String>,

    /// Maximum number of sequences to keep
    #[arg(short, long)]
    pub budget: Option<usize>,

    /// Metadata column defining the sampling groups
    #[arg(long)]
    pub group_column: Option<String>,

    /// Metadata column with the fraction of N sites
    #[arg(long)]
    pub quality_column: Option<String>,

    /// Draw uniformly within groups instead of weighting by quality
    #[arg(long)]
    pub uniform: bool,

    /// RNG seed for reproducible sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Percentile for the quality gate (0-100)
    #[arg(long)]
    pub percentile: Option<f64>,

    /// Metrics gated jointly (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub quality_fields: Vec<String>,

    /// Skip the percentile quality gate
    #[arg(long)]
    pub no_quality_filter: bool,

    /// Skip the length and ambiguity filter
    #[arg(long)]
    pub no_sequence_filter: bool,

    #[arg(long)]
    pub min_length: Option<usize>,

    #[arg(long)]
    pub max_length: Option<usize>,

    #[arg(long)]
    pub max_ambiguous: Option<usize>,

    /// Reference genome name, always kept when present
    #[arg(long)]
    pub reference: Option<String>,

    /// Output FASTA
    #[arg(short, long, default_value = "subsampled.fasta")]
    pub output: PathBuf,

    /// Output metadata table for the kept sequences
    #[arg(long, default_value = "metadata.subsampled.tsv")]
    pub output_metadata: PathBuf,

    /// Output metadata reshaped for Nextstrain (column mapping from the config)
    #[arg(long, value_name = "FILE")]
    pub nextstrain_metadata: Option<PathBuf>,

    /// Output statistics JSON
    #[arg(long)]
    pub stats: Option<PathBuf>,

    /// Configuration file (passed from global)
    #[arg(skip)]
    pub config: Option<PathBuf>,
}

/// CLI values layered over the configuration file.
struct Settings {
    budget: usize,
    group_column: String,
    quality_column: String,
    seed: u64,
    gate: Option<(f64, Vec<String>)>,
    filter: Option<SequenceFilter>,
    reference: String,
}

impl Settings {
    fn resolve(args: &SubsampleArgs, config: &Config) -> Result<Self> {
        let percentile = args.percentile.unwrap_or(config.quality.percentile);
        if !(0.0..=100.0).contains(&percentile) {
            return Err(VirosampleError::Config(format!(
                "percentile must be within [0, 100], got {}",
                percentile
            )));
        }
        let fields = if args.quality_fields.is_empty() {
            config.quality.fields.clone()
        } else {
            args.quality_fields.clone()
        };
        let gate = (config.quality.enabled && !args.no_quality_filter).then_some((percentile, fields));

        let filter = (!args.no_sequence_filter).then(|| {
            let cfg = &config.sequence_filter;
            SequenceFilter::new(
                args.min_length.unwrap_or(cfg.min_length),
                args.max_length.unwrap_or(cfg.max_length),
                args.max_ambiguous.unwrap_or(cfg.max_ambiguous),
            )
        });

        Ok(Self {
            budget: args.budget.unwrap_or(config.sampling.budget),
            group_column: args
                .group_column
                .clone()
                .unwrap_or_else(|| config.sampling.group_column.clone()),
            quality_column: args
                .quality_column
                .clone()
                .unwrap_or_else(|| config.sampling.quality_column.clone()),
            seed: args
                .seed
                .or(config.sampling.seed)
                .unwrap_or_else(rand::random::<u64>),
            gate,
            filter,
            reference: args
                .reference
                .clone()
                .unwrap_or_else(|| config.neighbors.reference.clone()),
        })
    }
}

fn parse_bound(value: Option<&str>) -> Option<NaiveDate> {
    let value = value?;
    let date = parse_date(value);
    if date.is_none() {
        warn!("Could not parse date from '{}'; no date filtering applied", value);
    }
    date
}

fn retain_matching(
    table: &MetadataTable,
    candidates: &mut BTreeSet<String>,
    column: &str,
    needle: Option<&str>,
) -> Result<()> {
    if let Some(needle) = needle {
        let matching = table.matching(column, needle)?;
        candidates.retain(|id| matching.contains(id));
        info!(
            "{} sequences after filtering for {} '{}'",
            candidates.len(),
            column,
            needle
        );
    }
    Ok(())
}

/// Records kept by name, first occurrence only.
fn dedup_names(records: Vec<Sequence>) -> Vec<Sequence> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|s| seen.insert(s.id.clone()))
        .collect()
}

pub fn run(args: SubsampleArgs) -> anyhow::Result<()> {
    let config = resolve_config(args.config.as_deref())?;
    let stats = subsample(&args, &config)?;

    print_stats_table(
        "Subsampling summary",
        &[
            ("Metadata rows", format_number(stats.n_total_sequences)),
            ("Lineages", format_number(stats.n_total_lineages)),
            ("After metadata filters", format_number(stats.n_metadata_filtered_sequences)),
            ("Mandatory", format_number(stats.n_mandatory)),
            ("Budget", format_number(stats.budget)),
            ("Kept", format_number(stats.n_final_filtered_sequences)),
            ("Uniform fallbacks", stats.n_fallbacks().to_string()),
            ("Seed", stats.seed.to_string()),
        ],
    );
    print_success(&format!(
        "Wrote {} sequences to {}",
        format_number(stats.n_final_filtered_sequences),
        args.output_metadata.display()
    ));
    Ok(())
}

/// Filter, collapse and down-sample, writing every output. Returns the run
/// statistics.
pub fn subsample(args: &SubsampleArgs, config: &Config) -> Result<SamplingStats> {
    let settings = Settings::resolve(args, config)?;
    let mut rng = StdRng::seed_from_u64(settings.seed);
    info!("Sampling seed: {}", settings.seed);

    let spinner = start_spinner("Reading metadata...");
    let table = MetadataTable::read(&args.metadata)?;
    spinner.finish_with_message(format!(
        "Read {} metadata rows from {}",
        format_number(table.len()),
        args.metadata.display()
    ));

    let report = match &args.report {
        Some(path) => LineageReport::read(path)?,
        None => LineageReport::default(),
    };
    let mut sample_lineages = report.lineages.clone();
    if let Some(extra) = &args.lineages {
        sample_lineages.extend(split_list(extra));
    }

    let group_column = settings.group_column.as_str();
    let mut stats = SamplingStats {
        sample_lineages: sample_lineages.clone(),
        n_total_sequences: table.len(),
        n_total_lineages: table.lineage_counts(group_column)?.len(),
        budget: settings.budget,
        seed: settings.seed,
        ..Default::default()
    };

    // Metadata prefilters
    let mut candidates: BTreeSet<String> = if sample_lineages.is_empty() {
        table.ids().map(str::to_string).collect()
    } else {
        table.in_groups(group_column, &sample_lineages)?
    };
    info!(
        "{} sequences matching {} lineages",
        candidates.len(),
        sample_lineages.len()
    );
    stats.n_matching_lineage = candidates.len();
    stats.matching_lineage_counts = table.subset(&candidates).lineage_counts(group_column)?;

    let start = parse_bound(args.date_start.as_deref());
    let end = parse_bound(args.date_end.as_deref());
    if start.is_some() || end.is_some() {
        let date_column = args.date_column.as_deref().unwrap_or(DEFAULT_DATE_COLUMN);
        let dated = table.collected_between(date_column, start, end)?;
        candidates.retain(|id| dated.contains(id));
        info!("{} sequences within the collection date range", candidates.len());
    }
    retain_matching(&table, &mut candidates, "country", args.country.as_deref())?;
    retain_matching(&table, &mut candidates, "region", args.region.as_deref())?;
    stats.n_metadata_filtered_sequences = candidates.len();

    let mut mandatory: BTreeSet<String> = report.ids.iter().cloned().collect();
    mandatory.insert(settings.reference.clone());

    // Sequence-level filtering and collapsing of identical genomes
    let mut metrics: HashMap<String, (usize, usize)> = HashMap::new();
    let sequences = match &args.fasta {
        Some(path) => {
            let spinner = start_spinner("Reading sequences...");
            let records = parse_fasta(path)?;
            spinner.finish_with_message(format!(
                "Read {} sequences from {}",
                format_number(records.len()),
                path.display()
            ));

            let (mandatory_records, rest): (Vec<Sequence>, Vec<Sequence>) =
                records.into_iter().partition(|s| mandatory.contains(&s.id));
            let mandatory_records = dedup_names(mandatory_records);
            let kept = match &settings.filter {
                Some(filter) => filter.apply(rest, Some(&candidates)).kept,
                None => dedup_names(rest.into_iter().filter(|s| candidates.contains(&s.id)).collect()),
            };
            stats.n_sequence_filtered = Some(kept.len());

            let sequences: Vec<Sequence> = mandatory_records.into_iter().chain(kept).collect();
            let with_sequence: HashSet<&str> = sequences.iter().map(|s| s.id.as_str()).collect();
            let present: BTreeSet<String> = mandatory
                .iter()
                .filter(|id| with_sequence.contains(id.as_str()))
                .cloned()
                .collect();
            let sets = collapse_identical(&sequences);
            stats.n_distinct_sequences = Some(sets.len());
            let reps = representatives(&sets, &present);
            candidates = reps.candidates;
            mandatory = reps.mandatory;

            for seq in &sequences {
                metrics.insert(seq.id.clone(), (seq.count_n(), seq.count_gaps()));
            }
            sequences
        }
        None => {
            mandatory.retain(|id| table.contains(id));
            Vec::new()
        }
    };
    candidates.retain(|id| !mandatory.contains(id));
    info!(
        "{} candidate sequences, {} mandatory",
        candidates.len(),
        mandatory.len()
    );

    if let Some(country) = &args.prefer_country {
        if table.column("country").is_some() {
            let needle = country.to_lowercase();
            let matching: BTreeSet<String> = candidates
                .iter()
                .filter(|id| {
                    table
                        .value(id, "country")
                        .is_some_and(|c| c.to_lowercase().contains(&needle))
                })
                .cloned()
                .collect();
            if matching.len() + mandatory.len() <= settings.budget {
                info!("Keeping {} sequences matching country '{}'", matching.len(), country);
                candidates.retain(|id| !matching.contains(id));
                mandatory.extend(matching);
            } else {
                info!(
                    "{} sequences from '{}' plus {} mandatory exceed the budget of {}; sampling them by quality",
                    matching.len(),
                    country,
                    mandatory.len(),
                    settings.budget
                );
            }
        } else {
            warn!(
                "Preferred country '{}' given but metadata has no 'country' column",
                country
            );
        }
    }

    // Sampling population: candidates plus the mandatory ids with metadata
    let in_population: BTreeSet<String> = candidates.union(&mandatory).cloned().collect();
    let base = table
        .subset(&in_population)
        .to_population(group_column, &settings.quality_column)?;
    let members: Vec<Member> = base
        .members()
        .iter()
        .cloned()
        .map(|m| match metrics.get(&m.id) {
            Some(&(n, gaps)) => m.with_metric(SEQ_N, n as f64).with_metric(SEQ_GAP, gaps as f64),
            None => m,
        })
        .collect();
    let (mandatory_members, candidate_members): (Vec<Member>, Vec<Member>) =
        members.into_iter().partition(|m| mandatory.contains(&m.id));
    let outside = mandatory.len() - mandatory_members.len();

    let mut candidate_pop = Population::new(candidate_members)?;
    let fits = candidate_pop.len() + mandatory.len() <= settings.budget;
    if let Some((percentile, fields)) = settings.gate.as_ref().filter(|_| !fits) {
        let usable: Vec<&str> = fields
            .iter()
            .map(String::as_str)
            .filter(|field| {
                let present = candidate_pop.members().iter().any(|m| m.metric(field).is_some());
                if !present {
                    warn!("No values for quality field '{}'; not gated", field);
                }
                present
            })
            .collect();
        candidate_pop = filter_by_percentiles(&candidate_pop, &usable, *percentile)?;
        stats.n_quality_filtered = Some(candidate_pop.len());
    }

    let population: Population = candidate_pop
        .members()
        .iter()
        .cloned()
        .chain(mandatory_members)
        .collect();
    let mandatory_in_pop: BTreeSet<String> = mandatory
        .iter()
        .filter(|id| population.contains(id))
        .cloned()
        .collect();

    let sampler = QuotaSampler::new().with_quality_weights(!args.uniform);
    let sampling = sampler.sample(
        &population,
        Budget::new(settings.budget.saturating_sub(outside)),
        &mandatory_in_pop,
        &mut rng,
    )?;
    stats.record_sampling(&sampling);

    let mut selected = sampling.selection.into_ids();
    selected.extend(mandatory.iter().cloned());
    stats.n_mandatory = mandatory.len();
    stats.n_final_filtered_sequences = selected.len();
    if selected.is_empty() {
        return Err(VirosampleError::InvalidInput(
            "No sequences found matching filters".to_string(),
        ));
    }

    if args.fasta.is_some() {
        let mut out = match &args.user_fasta {
            Some(path) => parse_fasta(path)?,
            None => Vec::new(),
        };
        let written: HashSet<String> = out.iter().map(|s| s.id.clone()).collect();
        out.extend(
            sequences
                .into_iter()
                .filter(|s| selected.contains(&s.id) && !written.contains(&s.id)),
        );
        write_fasta(&args.output, &out)?;
        info!("Wrote {} sequences to {}", out.len(), args.output.display());
    }
    table.write(&args.output_metadata, Some(&selected))?;
    if let Some(path) = &args.nextstrain_metadata {
        table
            .subset(&selected)
            .mapped(&config.nextstrain)
            .write(path, None)?;
        info!("Wrote Nextstrain metadata to {}", path.display());
    }
    if let Some(path) = &args.stats {
        stats.write_json(path)?;
    }

    Ok(stats)
}

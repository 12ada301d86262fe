/// Delimited sample metadata keyed by taxon id
///
/// Tables are read with the `csv` crate: `.csv` files are comma-separated,
/// everything else is treated as tab-separated. A trailing `.gz` is
/// decompressed transparently. The first column holds the taxon id.
use crate::core::population::{Member, Population};
use crate::{Result, VirosampleError};
use chrono::NaiveDate;
use flate2::read::GzDecoder;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Columns derived from a `region / country / division / city` location field.
pub const LOCATION_PARTS: [&str; 4] = ["region", "country", "division", "city"];

/// Columns GISAID exports that Nextstrain does not use.
const NEXTSTRAIN_DROP: [&str; 18] = [
    "Location",
    "Additional_location_information",
    "Sequence_length",
    "Host",
    "Patient_age",
    "Gender",
    "Clade",
    "Pango_lineage",
    "Pangolin_version",
    "Variant",
    "AA_Substitutions",
    "Submission_date",
    "Is_reference",
    "Is_complete",
    "Is_high_coverage",
    "Is_low_coverage",
    "N_Content",
    "GC_Content",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnCopy {
    pub from: String,
    pub to: String,
}

/// Declarative column mapping applied to metadata handed to downstream tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    /// Columns removed when present
    pub drop: Vec<String>,
    /// Applied in order after `drop`; the target column is created or overwritten
    pub copy: Vec<ColumnCopy>,
}

impl FieldMapping {
    /// Drop GISAID-only columns and use the sampling location as the
    /// exposure location.
    pub fn nextstrain() -> Self {
        Self {
            drop: NEXTSTRAIN_DROP.iter().map(|c| c.to_string()).collect(),
            copy: ["region", "country", "division"]
                .iter()
                .map(|c| ColumnCopy {
                    from: c.to_string(),
                    to: format!("{}_exposure", c),
                })
                .collect(),
        }
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::nextstrain()
    }
}

#[derive(Debug, Clone)]
pub struct MetadataTable {
    delimiter: u8,
    id_column: String,
    columns: Vec<String>,
    rows: IndexMap<String, Vec<String>>,
}

fn open_maybe_gz(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path)?;
    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        Ok(Box::new(GzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Field delimiter implied by the file name, ignoring a `.gz` suffix.
pub fn delimiter_for(path: &Path) -> u8 {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    if name.ends_with(".csv") {
        b','
    } else {
        b'\t'
    }
}

/// Collapse runs of non-word characters to `_` and drop trailing underscores.
pub fn normalize_column_name(name: &str, non_word: &Regex) -> String {
    non_word
        .replace_all(name.trim(), "_")
        .trim_end_matches('_')
        .to_string()
}

fn normalize_id(id: &str, whitespace: &Regex) -> String {
    whitespace.replace_all(id.trim(), "_").into_owned()
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| VirosampleError::Other(format!("Invalid pattern: {}", e)))
}

impl MetadataTable {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let delimiter = delimiter_for(path);
        let table = Self::from_reader(open_maybe_gz(path)?, delimiter)?;
        debug!(
            "Read {} rows and {} columns from {}",
            table.len(),
            table.columns.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let non_word = compile(r"[^\w]+")?;
        let whitespace = compile(r"\s+")?;

        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| normalize_column_name(h, &non_word))
            .collect();
        let (id_column, columns) = match headers.split_first() {
            Some((id, rest)) => (id.clone(), rest.to_vec()),
            None => {
                return Err(VirosampleError::Parse(
                    "Metadata table has no header row".to_string(),
                ))
            }
        };

        let mut rows: IndexMap<String, Vec<String>> = IndexMap::new();
        let mut duplicates = 0usize;
        for record in rdr.records() {
            let record = record?;
            let Some(raw_id) = record.get(0) else {
                continue;
            };
            let id = normalize_id(raw_id, &whitespace);
            if id.is_empty() {
                continue;
            }
            if rows.contains_key(&id) {
                duplicates += 1;
                continue;
            }
            let mut values: Vec<String> = record.iter().skip(1).map(str::to_string).collect();
            values.resize(columns.len(), String::new());
            rows.insert(id, values);
        }
        if duplicates > 0 {
            warn!("Ignored {} duplicate metadata rows (first occurrence kept)", duplicates);
        }

        let mut table = Self {
            delimiter,
            id_column,
            columns,
            rows,
        };
        table.split_location();
        Ok(table)
    }

    /// Derive region/country/division/city from a `Location` column when present.
    fn split_location(&mut self) {
        let Some(location) = self.column("Location") else {
            return;
        };
        if LOCATION_PARTS.iter().any(|p| self.column(p).is_some()) {
            return;
        }
        self.columns
            .extend(LOCATION_PARTS.iter().map(|p| p.to_string()));
        for values in self.rows.values_mut() {
            let loc = values[location].clone();
            let mut parts = loc.splitn(LOCATION_PARTS.len(), '/').map(str::trim);
            for _ in LOCATION_PARTS {
                values.push(parts.next().unwrap_or("").to_string());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    /// Position of a (normalized) column among the value columns.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn require_column(&self, name: &str) -> Result<usize> {
        self.column(name).ok_or_else(|| {
            VirosampleError::InvalidInput(format!("Metadata has no column '{}'", name))
        })
    }

    /// Non-empty cell value.
    pub fn value(&self, id: &str, column: &str) -> Option<&str> {
        let idx = self.column(column)?;
        self.rows
            .get(id)
            .map(|values| values[idx].as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// Build a population grouped by `group_column` with quality from
    /// `quality_column`. Every numeric cell also becomes a member metric.
    /// Rows without a group value are skipped.
    pub fn to_population(&self, group_column: &str, quality_column: &str) -> Result<Population> {
        let group_idx = self.require_column(group_column)?;
        let quality_idx = self.column(quality_column);
        if quality_idx.is_none() {
            warn!(
                "Metadata has no '{}' column; members carry no quality",
                quality_column
            );
        }

        let mut skipped = 0usize;
        let mut members = Vec::with_capacity(self.rows.len());
        for (id, values) in &self.rows {
            let group = values[group_idx].trim();
            if group.is_empty() {
                skipped += 1;
                continue;
            }
            let mut member = Member::new(id.clone(), group);
            if let Some(q) = quality_idx.and_then(|i| values[i].trim().parse::<f64>().ok()) {
                member = member.with_quality(q);
            }
            for (column, value) in self.columns.iter().zip(values) {
                if let Ok(v) = value.trim().parse::<f64>() {
                    member = member.with_metric(column.clone(), v);
                }
            }
            members.push(member);
        }
        if skipped > 0 {
            debug!("{} rows without a '{}' value skipped", skipped, group_column);
        }

        Population::new(members)
    }

    /// Ids whose `column` matches `needle`: exact membership when `needle` is
    /// a comma-separated list, substring match otherwise.
    pub fn matching(&self, column: &str, needle: &str) -> Result<BTreeSet<String>> {
        let idx = self.require_column(column)?;
        let ids = if needle.contains(',') {
            let wanted: BTreeSet<&str> = needle
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect();
            self.rows
                .iter()
                .filter(|(_, values)| wanted.contains(values[idx].trim()))
                .map(|(id, _)| id.clone())
                .collect()
        } else {
            self.rows
                .iter()
                .filter(|(_, values)| values[idx].contains(needle))
                .map(|(id, _)| id.clone())
                .collect()
        };
        Ok(ids)
    }

    /// Ids collected within `[start, end]`; rows with unparseable dates are
    /// excluded once either bound is set.
    pub fn collected_between(
        &self,
        date_column: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<BTreeSet<String>> {
        if start.is_none() && end.is_none() {
            return Ok(self.rows.keys().cloned().collect());
        }
        let idx = self.require_column(date_column)?;
        Ok(self
            .rows
            .iter()
            .filter(|(_, values)| match parse_date(&values[idx]) {
                Some(date) => {
                    start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e)
                }
                None => false,
            })
            .map(|(id, _)| id.clone())
            .collect())
    }

    pub fn in_groups(&self, group_column: &str, groups: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        let idx = self.require_column(group_column)?;
        Ok(self
            .rows
            .iter()
            .filter(|(_, values)| groups.contains(values[idx].trim()))
            .map(|(id, _)| id.clone())
            .collect())
    }

    /// Rows whose id is in `ids`, original order kept.
    pub fn subset(&self, ids: &BTreeSet<String>) -> Self {
        Self {
            delimiter: self.delimiter,
            id_column: self.id_column.clone(),
            columns: self.columns.clone(),
            rows: self
                .rows
                .iter()
                .filter(|(id, _)| ids.contains(id.as_str()))
                .map(|(id, values)| (id.clone(), values.clone()))
                .collect(),
        }
    }

    /// Copy of the table with `mapping` applied. Copies from a missing
    /// column are skipped with a warning.
    pub fn mapped(&self, mapping: &FieldMapping) -> Self {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !mapping.drop.contains(&self.columns[i]))
            .collect();
        let mut columns: Vec<String> = keep.iter().map(|&i| self.columns[i].clone()).collect();
        let mut rows: IndexMap<String, Vec<String>> = self
            .rows
            .iter()
            .map(|(id, values)| (id.clone(), keep.iter().map(|&i| values[i].clone()).collect()))
            .collect();

        for copy in &mapping.copy {
            let Some(src) = columns.iter().position(|c| *c == copy.from) else {
                warn!("Cannot copy missing column '{}' to '{}'", copy.from, copy.to);
                continue;
            };
            let dst = match columns.iter().position(|c| *c == copy.to) {
                Some(dst) => dst,
                None => {
                    columns.push(copy.to.clone());
                    for values in rows.values_mut() {
                        values.push(String::new());
                    }
                    columns.len() - 1
                }
            };
            for values in rows.values_mut() {
                values[dst] = values[src].clone();
            }
        }

        Self {
            delimiter: self.delimiter,
            id_column: self.id_column.clone(),
            columns,
            rows,
        }
    }

    /// Count of rows per value of `group_column`.
    pub fn lineage_counts(&self, group_column: &str) -> Result<BTreeMap<String, usize>> {
        let idx = self.require_column(group_column)?;
        let mut counts = BTreeMap::new();
        for values in self.rows.values() {
            let group = values[idx].trim();
            if !group.is_empty() {
                *counts.entry(group.to_string()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    /// Write the rows in `ids` (all rows when `None`), delimited as the
    /// file name implies.
    pub fn write<P: AsRef<Path>>(&self, path: P, ids: Option<&BTreeSet<String>>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)?;
        self.write_delimited(BufWriter::new(file), ids, delimiter_for(path))
    }

    /// Write with the delimiter the table was read with.
    pub fn write_to<W: Write>(&self, writer: W, ids: Option<&BTreeSet<String>>) -> Result<()> {
        self.write_delimited(writer, ids, self.delimiter)
    }

    fn write_delimited<W: Write>(
        &self,
        writer: W,
        ids: Option<&BTreeSet<String>>,
        delimiter: u8,
    ) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);
        wtr.write_record(std::iter::once(&self.id_column).chain(self.columns.iter()))?;
        for (id, values) in &self.rows {
            if ids.map_or(true, |keep| keep.contains(id.as_str())) {
                wtr.write_record(std::iter::once(id).chain(values.iter()))?;
            }
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Dates as written in sample metadata: `YYYY-MM-DD`, `YYYY/MM/DD` or `YYYYMMDD`.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    ["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

/// Per-sample lineage assignments, e.g. a Pangolin report.
#[derive(Debug, Clone, Default)]
pub struct LineageReport {
    pub ids: Vec<String>,
    pub lineages: BTreeSet<String>,
}

impl LineageReport {
    /// Ids come from the first column; lineages from a `lineage` column if any.
    /// The placeholder lineage `None` is ignored.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(delimiter_for(path))
            .flexible(true)
            .from_reader(open_maybe_gz(path)?);
        let lineage_idx = rdr.headers()?.iter().position(|h| h.trim() == "lineage");

        let mut report = Self::default();
        let mut seen = BTreeSet::new();
        for record in rdr.records() {
            let record = record?;
            if let Some(id) = record.get(0).map(str::trim).filter(|s| !s.is_empty()) {
                if seen.insert(id.to_string()) {
                    report.ids.push(id.to_string());
                }
            }
            if let Some(lineage) = lineage_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != "None")
            {
                report.lineages.insert(lineage.to_string());
            }
        }
        Ok(report)
    }
}

/// First column of a report, in file order without repeats.
pub fn read_id_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    Ok(LineageReport::read(path)?.ids)
}

/// One id per line.
pub fn write_id_list<P: AsRef<Path>, S: AsRef<str>>(path: P, ids: &[S]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for id in ids {
        writeln!(writer, "{}", id.as_ref())?;
    }
    writer.flush()?;
    Ok(())
}

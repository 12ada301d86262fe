/// Percentile gate applied ahead of stratified sampling
///
/// Scores are treated as defect counts (ambiguous bases, alignment gaps), so
/// members at or below the percentile are the ones kept.

use crate::core::population::{AppliedGate, Member, Population};
use crate::{Result, VirosampleError};
use tracing::info;

pub const DEFAULT_PERCENTILE: f64 = 75.0;

/// Linearly interpolated percentile of `values` (need not be sorted).
pub fn percentile(values: &[f64], percentile: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = percentile / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Keep members whose `field` is at or below its `pct`-th percentile.
pub fn filter_by_percentile(population: &Population, field: &str, pct: f64) -> Result<Population> {
    filter_by_percentiles(population, &[field], pct)
}

/// Joint gate: thresholds are all computed on the input population and a
/// member must pass every one of them.
pub fn filter_by_percentiles(
    population: &Population,
    fields: &[&str],
    pct: f64,
) -> Result<Population> {
    if !(0.0..=100.0).contains(&pct) {
        return Err(VirosampleError::InvalidInput(format!(
            "percentile must be within [0, 100], got {}",
            pct
        )));
    }
    if population.is_empty() || fields.is_empty() {
        return Ok(population.clone());
    }

    let mut gates = population.gates().to_vec();
    let mut thresholds = Vec::with_capacity(fields.len());
    for field in fields {
        let threshold = match population.gate(field, pct) {
            Some(existing) => existing.threshold,
            None => {
                let values: Vec<f64> = population
                    .members()
                    .iter()
                    .filter_map(|m| m.metric(field))
                    .collect();
                let Some(threshold) = percentile(&values, pct) else {
                    return Err(VirosampleError::InvalidInput(format!(
                        "no member has a numeric value for '{}'",
                        field
                    )));
                };
                gates.push(AppliedGate {
                    field: field.to_string(),
                    percentile: pct,
                    threshold,
                });
                threshold
            }
        };
        info!("Quality gate on '{}': {}th percentile = {}", field, pct, threshold);
        thresholds.push((*field, threshold));
    }

    let kept: Vec<Member> = population
        .members()
        .iter()
        .filter(|m| {
            thresholds
                .iter()
                .all(|(field, threshold)| m.metric(field).map_or(false, |v| v <= *threshold))
        })
        .cloned()
        .collect();

    info!(
        "Quality gate kept {} of {} members",
        kept.len(),
        population.len()
    );
    Ok(population.derive(kept, gates))
}

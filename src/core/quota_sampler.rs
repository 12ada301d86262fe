/// Quota-based stratified down-sampling
///
/// Groups are visited smallest first. Each group gets an equal share of
/// whatever budget the previous groups left unused, so rare lineages are kept
/// whole while the large ones compete for the remainder. Iteration order
/// (ascending size, then label) is part of the contract: visiting groups in
/// any other order changes the result.

use crate::core::population::{Budget, Member, Population, SelectionResult};
use crate::{Result, VirosampleError};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Why a group was drawn with equal probabilities instead of quality weights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// At least one member has no quality value.
    MissingQuality,
    /// Fewer members with a positive weight than the group quota.
    InfeasibleWeights { positive: usize },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::MissingQuality => write!(f, "quality value missing for some members"),
            FallbackReason::InfeasibleWeights { positive } => {
                write!(f, "only {} members have a positive weight", positive)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UniformFallback {
    pub group: String,
    pub group_size: usize,
    pub quota: usize,
    pub reason: FallbackReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupOutcome {
    pub group: String,
    pub size: usize,
    pub quota: usize,
    pub kept: usize,
}

impl GroupOutcome {
    pub fn subsampled(&self) -> bool {
        self.kept < self.size
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplingReport {
    pub selection: SelectionResult,
    /// Per-group outcome in processing order; empty on the no-op path.
    pub groups: Vec<GroupOutcome>,
    pub fallbacks: Vec<UniformFallback>,
    /// True when the budget already covered the population.
    pub short_circuited: bool,
}

#[derive(Debug, Clone)]
pub struct QuotaSampler {
    use_quality_weights: bool,
}

impl QuotaSampler {
    pub fn new() -> Self {
        Self {
            use_quality_weights: true,
        }
    }

    /// Disable quality weighting; every group is drawn uniformly.
    pub fn with_quality_weights(mut self, enabled: bool) -> Self {
        self.use_quality_weights = enabled;
        self
    }

    /// Select at most `budget` members (plus every mandatory member).
    ///
    /// Mandatory members are always kept and count against the budget before
    /// the group quotas are computed.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        population: &Population,
        budget: Budget,
        mandatory: &BTreeSet<String>,
        rng: &mut R,
    ) -> Result<SamplingReport> {
        let ids: HashSet<&str> = population.members().iter().map(|m| m.id.as_str()).collect();
        if let Some(unknown) = mandatory.iter().find(|id| !ids.contains(id.as_str())) {
            return Err(VirosampleError::UnknownTaxon(unknown.clone()));
        }

        let budget = budget.get();
        if budget >= population.len() {
            info!(
                "No down-sampling needed: {} members fit within budget of {}",
                population.len(),
                budget
            );
            return Ok(SamplingReport {
                selection: population.members().iter().map(|m| m.id.clone()).collect(),
                groups: Vec::new(),
                fallbacks: Vec::new(),
                short_circuited: true,
            });
        }

        let groups = sorted_groups(population, mandatory);
        let mut remaining = budget.saturating_sub(mandatory.len());
        let mut groups_left = groups.len();
        let mut selection: SelectionResult = mandatory.iter().cloned().collect();
        let mut outcomes = Vec::with_capacity(groups.len());
        let mut fallbacks = Vec::new();

        info!(
            "Down-sampling {} members in {} groups to {} ({} mandatory)",
            population.len(),
            groups.len(),
            budget,
            mandatory.len()
        );

        for (group, members) in groups {
            if members.is_empty() {
                groups_left -= 1;
                continue;
            }
            let quota = remaining / groups_left;
            let kept: Vec<&Member> = if members.len() <= quota {
                debug!(
                    "Keeping all {} members of group '{}' (quota {})",
                    members.len(),
                    group,
                    quota
                );
                members.clone()
            } else if quota == 0 {
                Vec::new()
            } else if !self.use_quality_weights {
                members.choose_multiple(rng, quota).copied().collect()
            } else {
                match self.draw_weighted(&members, quota, rng) {
                    Ok(drawn) => drawn,
                    Err(reason) => {
                        warn!(
                            "Using equal probability weights for group '{}' (size {}, quota {}): {}",
                            group,
                            members.len(),
                            quota,
                            reason
                        );
                        fallbacks.push(UniformFallback {
                            group: group.to_string(),
                            group_size: members.len(),
                            quota,
                            reason,
                        });
                        members.choose_multiple(rng, quota).copied().collect()
                    }
                }
            };

            remaining = remaining.saturating_sub(kept.len());
            groups_left -= 1;
            outcomes.push(GroupOutcome {
                group: group.to_string(),
                size: members.len(),
                quota,
                kept: kept.len(),
            });
            selection.extend(kept.into_iter().map(|m| m.id.clone()));
        }

        info!(
            "Selected {} of {} members ({} groups subsampled, {} uniform fallbacks)",
            selection.len(),
            population.len(),
            outcomes.iter().filter(|o| o.subsampled()).count(),
            fallbacks.len()
        );

        Ok(SamplingReport {
            selection,
            groups: outcomes,
            fallbacks,
            short_circuited: false,
        })
    }

    /// Weighted draw without replacement (Efraimidis-Spirakis keys).
    fn draw_weighted<'a, R: Rng + ?Sized>(
        &self,
        members: &[&'a Member],
        quota: usize,
        rng: &mut R,
    ) -> std::result::Result<Vec<&'a Member>, FallbackReason> {
        if members.iter().any(|m| m.quality.is_none()) {
            return Err(FallbackReason::MissingQuality);
        }

        let weights: Vec<f64> = members
            .iter()
            .map(|m| quality_weight(m.quality.unwrap_or(f64::NAN)))
            .collect();
        let positive = weights.iter().filter(|w| **w > 0.0).count();
        if positive < quota {
            return Err(FallbackReason::InfeasibleWeights { positive });
        }

        let mut keyed: Vec<(f64, &'a Member)> = members
            .iter()
            .zip(&weights)
            .filter(|(_, w)| **w > 0.0)
            .map(|(m, w)| (rng.gen::<f64>().powf(1.0 / w), *m))
            .collect();
        keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
        keyed.truncate(quota);
        Ok(keyed.into_iter().map(|(_, m)| m).collect())
    }
}

impl Default for QuotaSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Sampling weight for a defect fraction: `clamp(1 - quality, 0, 1)`, NaN -> 0.
pub fn quality_weight(quality: f64) -> f64 {
    let weight = 1.0 - quality;
    if weight.is_finite() {
        weight.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Non-mandatory members by group, ascending by size then label, members in id order.
fn sorted_groups<'a>(
    population: &'a Population,
    mandatory: &BTreeSet<String>,
) -> Vec<(&'a str, Vec<&'a Member>)> {
    let mut groups: Vec<(&str, Vec<&Member>)> = population
        .groups()
        .into_iter()
        .map(|(group, members)| {
            let mut members: Vec<&Member> = members
                .into_iter()
                .filter(|m| !mandatory.contains(&m.id))
                .collect();
            members.sort_by(|a, b| a.id.cmp(&b.id));
            (group, members)
        })
        .filter(|(_, members)| !members.is_empty())
        .collect();
    groups.sort_by(|a, b| a.1.len().cmp(&b.1.len()).then_with(|| a.0.cmp(b.0)));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn population(groups: &[(&str, usize)]) -> Population {
        let mut members = Vec::new();
        for (group, count) in groups {
            for i in 0..*count {
                members.push(Member::new(format!("{}_{}", group, i), *group).with_quality(0.01));
            }
        }
        Population::new(members).unwrap()
    }

    #[test]
    fn test_quality_weight() {
        assert_eq!(quality_weight(0.25), 0.75);
        assert_eq!(quality_weight(1.5), 0.0);
        assert_eq!(quality_weight(-0.5), 1.0);
        assert_eq!(quality_weight(f64::NAN), 0.0);
    }

    #[test]
    fn test_groups_sorted_by_size_then_label() {
        let pop = population(&[("C", 3), ("B", 1), ("A", 3)]);
        let groups = sorted_groups(&pop, &BTreeSet::new());
        let labels: Vec<_> = groups.iter().map(|(g, _)| *g).collect();
        assert_eq!(labels, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_small_group_kept_and_remainder_carried() {
        let pop = population(&[("A", 1), ("B", 5)]);
        let mut rng = StdRng::seed_from_u64(7);
        let report = QuotaSampler::new()
            .sample(&pop, Budget::new(3), &BTreeSet::new(), &mut rng)
            .unwrap();

        assert_eq!(report.selection.len(), 3);
        assert!(report.selection.contains("A_0"));
        assert_eq!(report.groups[0].quota, 1);
        assert_eq!(report.groups[1].quota, 2);
        assert_eq!(report.groups[1].kept, 2);
        assert!(report.fallbacks.is_empty());
    }

    #[test]
    fn test_missing_quality_falls_back_to_uniform() {
        let members = (0..6)
            .map(|i| Member::new(format!("s{}", i), "B.1"))
            .collect();
        let pop = Population::new(members).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let report = QuotaSampler::new()
            .sample(&pop, Budget::new(2), &BTreeSet::new(), &mut rng)
            .unwrap();

        assert_eq!(report.selection.len(), 2);
        assert_eq!(report.fallbacks.len(), 1);
        assert_eq!(report.fallbacks[0].reason, FallbackReason::MissingQuality);
        assert_eq!(report.fallbacks[0].group, "B.1");
    }

    #[test]
    fn test_all_zero_weights_fall_back_to_uniform() {
        let members = (0..4)
            .map(|i| Member::new(format!("s{}", i), "B.1").with_quality(1.0))
            .collect();
        let pop = Population::new(members).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let report = QuotaSampler::new()
            .sample(&pop, Budget::new(3), &BTreeSet::new(), &mut rng)
            .unwrap();

        assert_eq!(report.selection.len(), 3);
        assert_eq!(
            report.fallbacks[0].reason,
            FallbackReason::InfeasibleWeights { positive: 0 }
        );
    }

    #[test]
    fn test_zero_weight_members_never_drawn_when_feasible() {
        let mut members: Vec<Member> = (0..3)
            .map(|i| Member::new(format!("good{}", i), "A").with_quality(0.0))
            .collect();
        members.extend((0..3).map(|i| Member::new(format!("bad{}", i), "A").with_quality(f64::NAN)));
        let pop = Population::new(members).unwrap();

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let report = QuotaSampler::new()
                .sample(&pop, Budget::new(3), &BTreeSet::new(), &mut rng)
                .unwrap();
            assert!(report.selection.iter().all(|id| id.starts_with("good")));
        }
    }

    #[test]
    fn test_mandatory_counts_against_budget() {
        let pop = population(&[("A", 4), ("B", 4)]);
        let mandatory: BTreeSet<String> = ["A_0".to_string(), "B_0".to_string()].into();
        let mut rng = StdRng::seed_from_u64(3);
        let report = QuotaSampler::new()
            .sample(&pop, Budget::new(4), &mandatory, &mut rng)
            .unwrap();

        assert_eq!(report.selection.len(), 4);
        assert!(report.selection.is_superset_of(&mandatory));
    }

    #[test]
    fn test_unknown_mandatory_rejected() {
        let pop = population(&[("A", 2)]);
        let mandatory: BTreeSet<String> = ["nope".to_string()].into();
        let mut rng = StdRng::seed_from_u64(3);
        let err = QuotaSampler::new()
            .sample(&pop, Budget::new(1), &mandatory, &mut rng)
            .unwrap_err();
        assert!(matches!(err, VirosampleError::UnknownTaxon(id) if id == "nope"));
    }

    #[test]
    fn test_budget_zero() {
        let pop = population(&[("A", 2), ("B", 3)]);
        let mut rng = StdRng::seed_from_u64(3);
        let report = QuotaSampler::new()
            .sample(&pop, Budget::new(0), &BTreeSet::new(), &mut rng)
            .unwrap();
        assert!(report.selection.is_empty());
        assert!(report.fallbacks.is_empty());
    }
}

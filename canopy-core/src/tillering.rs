//! Tiller emission and regression rules.
//!
//! Axes are numbered by cohort: the main stem is cohort 1, and the bud at
//! rank `r` of a cohort-`c` parent yields cohort `c + r + first_child_delay - 1`.
//! Each bud is decided exactly once, from its own random stream.
//!
//! Regression removes tillers between bolting and flowering. Whether a
//! tiller regresses is drawn when it is created, with a probability that
//! increases with stand density. When regression happens is decided once
//! for the whole plant at bolting, latest-emerged tillers first.

use crate::params::TilleringParameters;
use crate::rng::{Purpose, RandomStream, axis_stream, metamer_stream, plant_stream};
use crate::types::{AxisKey, PlantId, ThermalTime};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Cohort of the tiller emitted by the bud at `rank` of a `parent_cohort` axis.
pub fn cohort_of_child(parent_cohort: u32, rank: u32, first_child_delay: u32) -> u32 {
    parent_cohort + rank + first_child_delay - 1
}

/// Probability that a tiller regresses, for an observed stand density
/// (plants per square metre). Non-decreasing in `density`.
pub fn regression_probability(params: &TilleringParameters, density: f64) -> f64 {
    if density <= params.regression_density_threshold {
        return 0.0;
    }
    let excess = density - params.regression_density_threshold;
    (params.regression_base + params.regression_slope * excess).clamp(0.0, 1.0)
}

/// Outcome of a bud decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BudDecision {
    Dormant,
    Tiller {
        appearance: ThermalTime,
        cohort: u32,
        will_regress: bool,
    },
}

/// Tillering rules of one genotype in one stand.
#[derive(Clone, Copy, Debug)]
pub struct TillerDynamics<'a> {
    params: &'a TilleringParameters,
    seed: u64,
    observed_density: f64,
}

impl<'a> TillerDynamics<'a> {
    pub fn new(params: &'a TilleringParameters, seed: u64, observed_density: f64) -> Self {
        Self {
            params,
            seed,
            observed_density,
        }
    }

    pub fn regression_probability(&self) -> f64 {
        regression_probability(self.params, self.observed_density)
    }

    /// Emission probability of a tiller of `cohort`.
    pub fn emission_probability(&self, cohort: u32) -> f64 {
        let p = self
            .params
            .cohort_probabilities
            .iter()
            .find(|c| c.cohort == cohort)
            .map_or(0.0, |c| c.probability);
        (self.params.tillering_potential * p).clamp(0.0, 1.0)
    }

    /// Decides the bud at `rank` of the axis `parent`.
    ///
    /// `leaf_emergence` is the emergence thermal time of the leaf subtending
    /// the bud. Buds of axes at `max_tiller_order` never break.
    pub fn decide_bud(
        &self,
        plant: PlantId,
        parent: &AxisKey,
        parent_cohort: u32,
        rank: u32,
        leaf_emergence: ThermalTime,
    ) -> BudDecision {
        if parent.order() >= self.params.max_tiller_order {
            return BudDecision::Dormant;
        }
        let appearance = leaf_emergence + self.params.tiller_delay;
        if appearance >= self.params.tt_bolting {
            return BudDecision::Dormant;
        }
        let cohort = cohort_of_child(parent_cohort, rank, self.params.first_child_delay);
        let p = self.emission_probability(cohort);

        let mut rng = metamer_stream(self.seed, plant, parent, rank, Purpose::Bud);
        let draw: f64 = rng.random();
        if draw >= p {
            return BudDecision::Dormant;
        }

        let child = parent.child(rank);
        let mut regression_rng = axis_stream(self.seed, plant, &child, Purpose::Regression);
        let will_regress = regression_rng.random::<f64>() < self.regression_probability();
        BudDecision::Tiller {
            appearance,
            cohort,
            will_regress,
        }
    }

    /// Final leaf number of a tiller, from the main-stem one.
    pub fn tiller_final_leaf_number(&self, main_stem_leaves: u32, cohort: u32) -> u32 {
        let n = self.params.tiller_leaf_number_a1 * f64::from(main_stem_leaves)
            - self.params.tiller_leaf_number_a2 * f64::from(cohort);
        n.round().max(1.0) as u32
    }

    /// Stop times of the tillers that will regress, given as
    /// `(identity, appearance)` pairs.
    ///
    /// The latest-emerged tiller stops first (ties: greater identity first).
    /// The k-th of `n` tillers stops at
    /// `tt_bolting + (k + 1) * (tt_flowering - tt_bolting) / n`.
    pub fn schedule_regression<K: Ord + Clone>(
        &self,
        candidates: &[(K, ThermalTime)],
    ) -> Vec<(K, ThermalTime)> {
        let mut ordered = candidates.to_vec();
        ordered.sort_by(|a, b| b.1.total_cmp(&a.1).then(b.0.cmp(&a.0)));
        let n = ordered.len() as f64;
        let span = self.params.tt_flowering - self.params.tt_bolting;
        ordered
            .into_iter()
            .enumerate()
            .map(|(k, (axis, _))| {
                let at = self.params.tt_bolting + (k as f64 + 1.0) * span / n;
                (axis, at)
            })
            .collect()
    }
}

/// How main-stem final leaf numbers are given to plants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeafNumberAssignment {
    /// Independent draw per plant.
    #[default]
    Sampled,
    /// Exact stand-level proportions, assigned in plant order.
    Deterministic,
}

/// Draws a main-stem leaf number from a `(leaves, probability)` distribution.
pub fn main_stem_leaf_number(distribution: &[(u32, f64)], rng: &mut RandomStream) -> u32 {
    let draw: f64 = rng.random();
    let mut acc = 0.0;
    for &(leaves, p) in distribution {
        acc += p;
        if draw < acc {
            return leaves;
        }
    }
    distribution.last().map_or(1, |&(leaves, _)| leaves)
}

/// Splits a fractional mean leaf number into its two neighbouring integers,
/// weighted so that the expectation equals `mean`.
pub fn leaf_number_modalities(mean: f64) -> [(u32, f64); 2] {
    let low = mean.floor().max(0.0);
    let p = low + 1.0 - mean;
    [(low as u32, p), (low as u32 + 1, 1.0 - p)]
}

/// Exact counts for `n` draws from `proba`.
///
/// Every value first gets `floor(p × n)`; the remaining units go to the
/// most probable values. Values with a zero count are dropped.
pub fn cardinalities(proba: &[(u32, f64)], n: usize) -> Vec<(u32, usize)> {
    let mut counts: Vec<(u32, usize)> = proba
        .iter()
        .map(|&(k, p)| (k, (p * n as f64).floor().max(0.0) as usize))
        .collect();
    let assigned: usize = counts.iter().map(|&(_, c)| c).sum();
    let missing = n.saturating_sub(assigned);

    let mut by_probability: Vec<usize> = (0..proba.len()).collect();
    by_probability.sort_by(|&a, &b| proba[b].1.total_cmp(&proba[a].1));
    for &i in by_probability.iter().cycle().take(missing) {
        counts[i].1 += 1;
    }
    counts.retain(|&(_, c)| c > 0);
    counts
}

/// Main-stem leaf numbers for plants `0..n`.
pub fn assign_leaf_numbers(
    distribution: &[(u32, f64)],
    n: usize,
    mode: LeafNumberAssignment,
    seed: u64,
) -> Vec<u32> {
    match mode {
        LeafNumberAssignment::Sampled => (0..n)
            .map(|plant| {
                let mut rng = plant_stream(seed, plant, Purpose::LeafNumber);
                main_stem_leaf_number(distribution, &mut rng)
            })
            .collect(),
        LeafNumberAssignment::Deterministic => cardinalities(distribution, n)
            .into_iter()
            .flat_map(|(leaves, count)| std::iter::repeat_n(leaves, count))
            .collect(),
    }
}

//! Thermal-time phenology of axes and organs.
//!
//! Collars appear one phyllochron apart along an axis (early leaves faster).
//! Every organ follows the same strictly ordered life cycle:
//!
//! `Dormant -> Emerging -> Growing -> Mature -> Senescent -> Dead`
//!
//! Each transition is gated by a thermal-time threshold in
//! [`StageThresholds`]. Stages only move forward and never skip a state:
//! [`advance_stage`] walks the intermediate stages one by one even when a
//! single time step crosses several thresholds.

use crate::params::DevelopmentParameters;
use crate::types::ThermalTime;
use serde::{Deserialize, Serialize};

/// Development stage of an organ, strictly ordered.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DevelopmentStage {
    #[default]
    Dormant,
    Emerging,
    Growing,
    Mature,
    Senescent,
    Dead,
}

impl DevelopmentStage {
    pub const ALL: [DevelopmentStage; 6] = [
        DevelopmentStage::Dormant,
        DevelopmentStage::Emerging,
        DevelopmentStage::Growing,
        DevelopmentStage::Mature,
        DevelopmentStage::Senescent,
        DevelopmentStage::Dead,
    ];

    /// The following stage, or `None` for `Dead`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Dormant => Some(Self::Emerging),
            Self::Emerging => Some(Self::Growing),
            Self::Growing => Some(Self::Mature),
            Self::Mature => Some(Self::Senescent),
            Self::Senescent => Some(Self::Dead),
            Self::Dead => None,
        }
    }

    pub fn is_visible(self) -> bool {
        self > Self::Dormant
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Dormant => "dormant",
            Self::Emerging => "emerging",
            Self::Growing => "growing",
            Self::Mature => "mature",
            Self::Senescent => "senescent",
            Self::Dead => "dead",
        }
    }
}

/// Moves `stage` forward towards `target`, one stage at a time.
///
/// Every intermediate stage is visited and reported to `on_transition` as
/// `(from, to)`. A target behind the current stage is ignored.
///
/// ### Returns
/// The number of transitions applied.
pub fn advance_stage(
    stage: &mut DevelopmentStage,
    target: DevelopmentStage,
    mut on_transition: impl FnMut(DevelopmentStage, DevelopmentStage),
) -> usize {
    let mut count = 0;
    while *stage < target {
        let Some(next) = stage.next() else { break };
        on_transition(*stage, next);
        *stage = next;
        count += 1;
    }
    count
}

/// Thermal-time thresholds of one organ's life cycle.
///
/// Invariant: `emergence <= growth <= maturity <= senescence <= death`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageThresholds {
    pub emergence: ThermalTime,
    pub growth: ThermalTime,
    pub maturity: ThermalTime,
    pub senescence: ThermalTime,
    pub death: ThermalTime,
}

impl StageThresholds {
    /// Stage reached at `tt`. Thresholds are inclusive.
    pub fn stage_at(&self, tt: ThermalTime) -> DevelopmentStage {
        if tt >= self.death {
            DevelopmentStage::Dead
        } else if tt >= self.senescence {
            DevelopmentStage::Senescent
        } else if tt >= self.maturity {
            DevelopmentStage::Mature
        } else if tt >= self.growth {
            DevelopmentStage::Growing
        } else if tt >= self.emergence {
            DevelopmentStage::Emerging
        } else {
            DevelopmentStage::Dormant
        }
    }

    /// Threshold gating entry into `stage`; `Dormant` has none.
    pub fn threshold(&self, stage: DevelopmentStage) -> Option<ThermalTime> {
        match stage {
            DevelopmentStage::Dormant => None,
            DevelopmentStage::Emerging => Some(self.emergence),
            DevelopmentStage::Growing => Some(self.growth),
            DevelopmentStage::Mature => Some(self.maturity),
            DevelopmentStage::Senescent => Some(self.senescence),
            DevelopmentStage::Dead => Some(self.death),
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.emergence <= self.growth
            && self.growth <= self.maturity
            && self.maturity <= self.senescence
            && self.senescence <= self.death
    }

    /// Growth fraction at `tt`: a normalised logistic of the relative time
    /// between emergence and maturity, clipped to `[0, 1]`.
    ///
    /// The curve is 0 at emergence, 1 at maturity and non-decreasing in `tt`.
    pub fn growth_fraction(&self, tt: ThermalTime, steepness: f64) -> f64 {
        let duration = self.maturity - self.emergence;
        if duration <= 0.0 {
            return if tt >= self.emergence { 1.0 } else { 0.0 };
        }
        let x = ((tt - self.emergence) / duration).clamp(0.0, 1.0);
        let logistic = |v: f64| 1.0 / (1.0 + (-steepness * (v - 0.5)).exp());
        let lo = logistic(0.0);
        let hi = logistic(1.0);
        ((logistic(x) - lo) / (hi - lo)).clamp(0.0, 1.0)
    }

    /// Fraction of the organ still green: 1 until senescence, then linear
    /// decline to 0 at death.
    pub fn green_fraction(&self, tt: ThermalTime) -> f64 {
        if tt < self.senescence {
            1.0
        } else if tt >= self.death {
            0.0
        } else {
            let span = self.death - self.senescence;
            if span <= 0.0 {
                0.0
            } else {
                (1.0 - (tt - self.senescence) / span).clamp(0.0, 1.0)
            }
        }
    }
}

/// Phyllochron-driven schedule of metamers and organs along an axis.
#[derive(Clone, Debug, PartialEq)]
pub struct PhenologyModel {
    params: DevelopmentParameters,
}

impl PhenologyModel {
    pub fn new(params: DevelopmentParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DevelopmentParameters {
        &self.params
    }

    /// Phyllochron of the leaf at `rank` (1-based).
    pub fn phyllochron(&self, rank: u32) -> f64 {
        if rank <= self.params.early_leaf_count {
            self.params.phyllochron * self.params.early_leaf_factor
        } else {
            self.params.phyllochron
        }
    }

    /// Collar (maturity) thermal time of leaf `rank` on an axis starting at `t0`.
    pub fn collar_time(&self, t0: ThermalTime, rank: u32) -> ThermalTime {
        let early = rank.min(self.params.early_leaf_count);
        let late = rank - early;
        t0 + f64::from(early) * self.params.phyllochron * self.params.early_leaf_factor
            + f64::from(late) * self.params.phyllochron
    }

    fn extension_duration(&self, rank: u32) -> f64 {
        self.params.leaf_extension_phyllochrons * self.phyllochron(rank)
    }

    fn with_lifespan(&self, emergence: f64, maturity: f64) -> StageThresholds {
        let growth = emergence + self.params.emerging_fraction * (maturity - emergence);
        let senescence = maturity + self.params.mature_lifespan;
        StageThresholds {
            emergence,
            growth,
            maturity,
            senescence,
            death: senescence + 1.0 / self.params.senescence_rate,
        }
    }

    /// Thresholds shared by the blade and sheath of metamer `rank`.
    pub fn leaf_thresholds(&self, t0: ThermalTime, rank: u32) -> StageThresholds {
        let maturity = self.collar_time(t0, rank);
        let emergence = (maturity - self.extension_duration(rank)).max(t0);
        self.with_lifespan(emergence, maturity)
    }

    /// Internodes start elongating at the collar of their own leaf.
    pub fn internode_thresholds(&self, t0: ThermalTime, rank: u32) -> StageThresholds {
        let emergence = self.collar_time(t0, rank);
        self.with_lifespan(emergence, emergence + self.extension_duration(rank))
    }

    /// Ear of an axis with `leaf_number` leaves.
    pub fn ear_thresholds(&self, t0: ThermalTime, leaf_number: u32) -> StageThresholds {
        let last_collar = self.collar_time(t0, leaf_number);
        let emergence =
            last_collar + self.params.ear_delay_phyllochrons * self.params.phyllochron;
        self.with_lifespan(emergence, emergence + self.extension_duration(leaf_number))
    }

    /// Emergence order of the metamers of an axis.
    ///
    /// Sorted by emergence thermal time; identical times keep rank order.
    pub fn emergence_schedule(&self, t0: ThermalTime, leaf_number: u32) -> Vec<(u32, ThermalTime)> {
        let mut schedule: Vec<(u32, ThermalTime)> = (1..=leaf_number)
            .map(|rank| (rank, self.leaf_thresholds(t0, rank).emergence))
            .collect();
        schedule.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        schedule
    }

    /// Number of leaves whose collar has appeared at `tt` (floor rule).
    pub fn emerged_leaf_count(&self, t0: ThermalTime, leaf_number: u32, tt: ThermalTime) -> u32 {
        (1..=leaf_number)
            .take_while(|&rank| tt >= self.collar_time(t0, rank))
            .count() as u32
    }

    /// Fractional leaf stage: collars reached plus progress towards the next.
    pub fn haun_stage(&self, t0: ThermalTime, leaf_number: u32, tt: ThermalTime) -> f64 {
        let n = self.emerged_leaf_count(t0, leaf_number, tt);
        if n >= leaf_number {
            return f64::from(leaf_number);
        }
        let prev = self.collar_time(t0, n);
        let next = self.collar_time(t0, n + 1);
        f64::from(n) + ((tt - prev) / (next - prev)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn model(phyllochron: f64, early_factor: f64) -> PhenologyModel {
        PhenologyModel::new(DevelopmentParameters {
            phyllochron,
            early_leaf_factor: early_factor,
            early_leaf_count: 2,
            emergence_delay: 0.0,
            ..DevelopmentParameters::default()
        })
    }

    #[test]
    fn stage_order_is_strict() {
        for w in DevelopmentStage::ALL.windows(2) {
            assert!(w[0] < w[1]);
            assert_eq!(w[0].next(), Some(w[1]));
        }
        assert_eq!(DevelopmentStage::Dead.next(), None);
    }

    #[test]
    fn advance_never_skips_a_stage() {
        let mut stage = DevelopmentStage::Dormant;
        let mut seen = Vec::new();
        let n = advance_stage(&mut stage, DevelopmentStage::Senescent, |from, to| {
            seen.push((from, to));
        });
        assert_eq!(n, 4);
        assert_eq!(stage, DevelopmentStage::Senescent);
        assert_eq!(
            seen,
            vec![
                (DevelopmentStage::Dormant, DevelopmentStage::Emerging),
                (DevelopmentStage::Emerging, DevelopmentStage::Growing),
                (DevelopmentStage::Growing, DevelopmentStage::Mature),
                (DevelopmentStage::Mature, DevelopmentStage::Senescent),
            ]
        );
    }

    #[test]
    fn advance_ignores_backward_targets() {
        let mut stage = DevelopmentStage::Mature;
        let n = advance_stage(&mut stage, DevelopmentStage::Emerging, |_, _| {});
        assert_eq!(n, 0);
        assert_eq!(stage, DevelopmentStage::Mature);
    }

    #[test]
    fn collars_follow_phyllochron_with_faster_early_leaves() {
        let m = model(100.0, 0.5);
        assert_relative_eq!(m.collar_time(0.0, 1), 50.0);
        assert_relative_eq!(m.collar_time(0.0, 2), 100.0);
        assert_relative_eq!(m.collar_time(0.0, 3), 200.0);
        assert_relative_eq!(m.collar_time(20.0, 5), 420.0);
    }

    #[test]
    fn ten_collars_after_thousand_degree_days() {
        let m = model(100.0, 1.0);
        assert_eq!(m.emerged_leaf_count(0.0, 12, 1000.0), 10);
        assert_eq!(m.emerged_leaf_count(0.0, 12, 999.9), 9);
        // Capped by the final leaf number.
        assert_eq!(m.emerged_leaf_count(0.0, 8, 1000.0), 8);
        assert_relative_eq!(m.haun_stage(0.0, 12, 1050.0), 10.5);
    }

    #[test]
    fn leaf_thresholds_are_ordered_and_clamped_to_axis_start() {
        let m = model(100.0, 1.0);
        let first = m.leaf_thresholds(0.0, 1);
        assert!(first.is_ordered());
        assert_eq!(first.emergence, 0.0);
        assert_relative_eq!(first.maturity, 100.0);

        let third = m.leaf_thresholds(0.0, 3);
        assert_relative_eq!(third.emergence, 300.0 - 160.0);
        assert_relative_eq!(third.growth, third.emergence + 0.2 * 160.0);
        assert_relative_eq!(third.senescence, 300.0 + 500.0);
        assert_relative_eq!(third.death, 800.0 + 250.0);
    }

    #[test]
    fn emergence_ties_keep_rank_order() {
        let mut params = DevelopmentParameters {
            phyllochron: 100.0,
            early_leaf_factor: 1.0,
            leaf_extension_phyllochrons: 4.0,
            emergence_delay: 0.0,
            ..DevelopmentParameters::default()
        };
        params.early_leaf_count = 0;
        let m = PhenologyModel::new(params);
        let schedule = m.emergence_schedule(0.0, 6);
        // Ranks 1..=4 are clamped to the axis start and tie at 0.
        assert_eq!(
            schedule.iter().map(|&(r, _)| r).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5, 6]
        );
        assert!(schedule[..4].iter().all(|&(_, t)| t == 0.0));
    }

    #[test]
    fn growth_fraction_spans_zero_to_one() {
        let th = model(100.0, 1.0).leaf_thresholds(0.0, 5);
        assert_eq!(th.growth_fraction(th.emergence - 1.0, 8.0), 0.0);
        assert_relative_eq!(th.growth_fraction(th.emergence, 8.0), 0.0);
        assert_relative_eq!(th.growth_fraction(th.maturity, 8.0), 1.0);
        assert_eq!(th.growth_fraction(th.maturity + 100.0, 8.0), 1.0);
        let mid = 0.5 * (th.emergence + th.maturity);
        assert_relative_eq!(th.growth_fraction(mid, 8.0), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn green_fraction_declines_after_senescence() {
        let th = model(100.0, 1.0).leaf_thresholds(0.0, 2);
        assert_eq!(th.green_fraction(th.senescence - 1.0), 1.0);
        let mid = 0.5 * (th.senescence + th.death);
        assert_relative_eq!(th.green_fraction(mid), 0.5);
        assert_eq!(th.green_fraction(th.death), 0.0);
    }

    #[test]
    fn ear_appears_after_last_collar() {
        let m = model(100.0, 1.0);
        let ear = m.ear_thresholds(0.0, 10);
        assert_relative_eq!(ear.emergence, 1000.0 + 150.0);
        assert!(ear.is_ordered());
    }

    proptest! {
        #[test]
        fn stage_is_monotonic_in_thermal_time(
            phyllochron in 50.0f64..150.0,
            rank in 1u32..16,
            t1 in 0.0f64..4000.0,
            dt in 0.0f64..2000.0,
        ) {
            let th = model(phyllochron, 0.8).leaf_thresholds(0.0, rank);
            prop_assert!(th.is_ordered());
            prop_assert!(th.stage_at(t1) <= th.stage_at(t1 + dt));
            prop_assert!(th.growth_fraction(t1, 8.0) <= th.growth_fraction(t1 + dt, 8.0));
        }
    }
}

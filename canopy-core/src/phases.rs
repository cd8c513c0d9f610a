//! Per-plant phases of one simulated date.
//!
//! Each date advances every plant independently through:
//! 1. [`phenology_phase`]: applies pending regressions and moves every
//!    organ forward to its stage at the new thermal time.
//! 2. [`tillering_phase`]: decides the buds of newly emerged metamers and
//!    collects the tillers whose appearance time has been reached.
//! 3. [`topology_phase`]: creates those tillers and appends metamers to
//!    every axis that can grow.
//! 4. [`regression_phase`]: schedules regression at bolting and stops the
//!    tillers whose time has come.
//! 5. [`dimension_phase`]: samples dimensions and orientations of the new
//!    organs.
//!
//! Steps 2 and 3 are repeated by [`advance_plant`] until the plant stops
//! changing, so a single large step builds the same structure as many
//! small ones. Tillers scheduled to regress only develop up to their stop
//! time, which keeps that true across bolting too.

use crate::dimensions::OrganDimensionSampler;
use crate::error::{SimError, SimResult};
use crate::params::GenotypeParameters;
use crate::phenology::PhenologyModel;
use crate::tillering::{BudDecision, TillerDynamics};
use crate::topology::{BudState, NewTiller, Plant, Regression};
use crate::types::{AxisId, AxisKey, MetamerId, ThermalTime};

/// Upper bound on tillering/topology rounds within one date.
const MAX_STRUCTURE_ROUNDS: usize = 10_000;

/// Genotype rules and thermal time shared by all plants during one date.
#[derive(Clone, Copy, Debug)]
pub struct StepContext<'a> {
    pub params: &'a GenotypeParameters,
    pub phenology: &'a PhenologyModel,
    pub tillers: TillerDynamics<'a>,
    pub sampler: OrganDimensionSampler<'a>,
    pub tt: ThermalTime,
}

impl<'a> StepContext<'a> {
    pub fn new(
        params: &'a GenotypeParameters,
        phenology: &'a PhenologyModel,
        seed: u64,
        observed_density: f64,
        tt: ThermalTime,
    ) -> Self {
        Self {
            params,
            phenology,
            tillers: TillerDynamics::new(&params.tillering, seed, observed_density),
            sampler: OrganDimensionSampler::new(&params.dimensions, &params.orientation, seed),
            tt,
        }
    }
}

/// What happened to one plant during one date.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhaseReport {
    pub transitions: usize,
    pub metamers_added: usize,
    pub tillers_added: usize,
    pub regressions_marked: usize,
    pub regressions_applied: usize,
    pub organs_sampled: usize,
}

/// A bud ready to grow into a tiller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TillerRequest {
    pub parent: MetamerId,
    pub appearance: ThermalTime,
    pub cohort: u32,
    pub will_regress: bool,
}

/// Applies pending regressions, then advances organ stages to `tt`.
///
/// Axes marked as regressed during the previous date switch to applied
/// regression first, so their organs walk `senescent → dead` here.
/// Transitions are applied in order, one stage at a time.
///
/// ### Returns
/// `(transitions, regressions applied)`.
pub fn phenology_phase(plant: &mut Plant, tt: ThermalTime) -> (usize, usize) {
    let applied = plant.topology.apply_marked_regressions();
    for &axis in &applied {
        tracing::debug!(
            plant = plant.id,
            axis = %plant.topology.axes[axis].key,
            "regression applied"
        );
    }
    let transitions = plant.topology.advance_stages(tt);
    (transitions, applied.len())
}

/// Decides buds and collects the tillers due at `ctx.tt`.
///
/// For every axis, in creation order, and each of its metamers in rank
/// order (times are compared with the axis' growth limit, which is `ctx.tt`
/// unless the axis is scheduled to regress earlier):
///
/// 1. An undecided bud whose leaf has emerged is decided once through
///    [`TillerDynamics::decide_bud`] and becomes `Dormant` or `Pending`.
/// 2. A pending bud whose appearance time has been reached is turned into
///    a [`TillerRequest`]. A pending bud waits for pending buds of lower
///    rank on the same axis, so sibling tillers appear in rank order.
///
/// Buds of regressed axes never break: they are set to `Dormant`.
///
/// ### Returns
/// Requests in axis order, then rank order.
pub fn tillering_phase(plant: &mut Plant, ctx: &StepContext) -> Vec<TillerRequest> {
    let topology = &mut plant.topology;
    let limits = topology.growth_limits(ctx.tt);
    let mut requests = Vec::new();

    for axis_id in 0..topology.axes.len() {
        let axis = &topology.axes[axis_id];
        let regressed = axis.regression.is_regressed();
        let limit = limits[axis_id];
        let (key, cohort) = (axis.key.clone(), axis.cohort);
        let mut blocked = false;

        for i in 0..topology.axes[axis_id].metamers.len() {
            let mid = topology.axes[axis_id].metamers[i];
            let metamer = &topology.metamers[mid];
            let (bud, rank) = (metamer.bud, metamer.rank);
            let leaf_emergence = topology.organs[metamer.blade].thresholds.emergence;
            let emerged = limit >= leaf_emergence;

            let bud = match bud {
                BudState::Undecided | BudState::Pending { .. } if regressed => BudState::Dormant,
                BudState::Undecided if emerged => {
                    match ctx.tillers.decide_bud(plant.id, &key, cohort, rank, leaf_emergence) {
                        BudDecision::Dormant => BudState::Dormant,
                        BudDecision::Tiller {
                            appearance,
                            cohort,
                            will_regress,
                        } => {
                            tracing::debug!(
                                plant = plant.id,
                                axis = %key,
                                rank,
                                cohort,
                                appearance,
                                will_regress,
                                "bud will break"
                            );
                            BudState::Pending {
                                appearance,
                                cohort,
                                will_regress,
                            }
                        }
                    }
                }
                other => other,
            };
            topology.metamers[mid].bud = bud;

            match bud {
                BudState::Undecided => blocked = true,
                BudState::Pending {
                    appearance,
                    cohort,
                    will_regress,
                } => {
                    if !blocked && limit >= appearance {
                        requests.push(TillerRequest {
                            parent: mid,
                            appearance,
                            cohort,
                            will_regress,
                        });
                    } else {
                        blocked = true;
                    }
                }
                BudState::Dormant | BudState::Tillered(_) => {}
            }
        }
    }
    requests
}

/// Creates requested tillers, then grows every axis.
///
/// 1. Each request becomes a tiller axis through
///    [`crate::topology::PlantTopology::add_tiller`], with its final leaf
///    number derived from the main stem and its own sampled orientation.
/// 2. Every axis, new ones included, receives metamers through
///    [`crate::topology::PlantTopology::grow_axis`].
///
/// ### Returns
/// `(tillers added, metamers added)`.
pub fn topology_phase(
    plant: &mut Plant,
    ctx: &StepContext,
    requests: &[TillerRequest],
) -> SimResult<(usize, usize)> {
    let topology = &mut plant.topology;
    let main_stem_leaves = topology.main_stem().final_leaf_number;

    let mut tillers_added = 0;
    for request in requests {
        let Some(parent) = topology.metamers.get(request.parent) else {
            return Err(SimError::topology(
                plant.id,
                format!("tiller requested on unknown metamer {}", request.parent),
            ));
        };
        let key = topology.axes[parent.axis].key.child(parent.rank);
        let orientation = ctx
            .sampler
            .axis_orientation(plant.id, &key, plant.position.azimuth);
        let before = topology.axes.len();
        let axis = topology.add_tiller(NewTiller {
            parent: request.parent,
            appearance: request.appearance,
            cohort: request.cohort,
            final_leaf_number: ctx
                .tillers
                .tiller_final_leaf_number(main_stem_leaves, request.cohort),
            will_regress: request.will_regress,
            orientation,
        })?;
        if topology.axes.len() > before {
            tillers_added += 1;
            tracing::debug!(plant = plant.id, axis = %topology.axes[axis].key, "tiller created");
        }
    }

    let mut metamers_added = 0;
    for axis in 0..topology.axes.len() {
        metamers_added += topology.grow_axis(axis, ctx.phenology, ctx.tt, |rank, n| {
            ctx.params.shape_class(rank, n)
        })?;
    }
    Ok((tillers_added, metamers_added))
}

/// Schedules and marks tiller regression.
///
/// 1. The first time thermal time reaches `tt_bolting`, every tiller drawn
///    to regress receives its stop time from
///    [`TillerDynamics::schedule_regression`].
/// 2. Each scheduled tiller whose stop time has been reached is marked,
///    together with its descendants. Its organs die at the next date.
///
/// ### Returns
/// The number of axes newly marked.
pub fn regression_phase(plant: &mut Plant, ctx: &StepContext) -> usize {
    let topology = &mut plant.topology;
    if !topology.regression_scheduled && ctx.tt >= ctx.params.tillering.tt_bolting {
        let candidates: Vec<((AxisKey, AxisId), ThermalTime)> = topology
            .axes
            .iter()
            .filter(|a| a.will_regress && a.regression == Regression::None)
            .map(|a| ((a.key.clone(), a.id), a.start_tt))
            .collect();
        for ((_, axis), at) in ctx.tillers.schedule_regression(&candidates) {
            topology.axes[axis].regression = Regression::Scheduled { at };
        }
        topology.regression_scheduled = true;
    }

    let due: Vec<(AxisId, ThermalTime)> = topology
        .axes
        .iter()
        .filter_map(|a| match a.regression {
            Regression::Scheduled { at } if ctx.tt >= at => Some((a.id, at)),
            _ => None,
        })
        .collect();
    let mut marked = 0;
    for (axis, at) in due {
        let newly = topology.mark_regression(axis, at);
        tracing::debug!(
            plant = plant.id,
            axis = %topology.axes[axis].key,
            at,
            axes = newly.len(),
            "tiller regressed"
        );
        marked += newly.len();
    }
    marked
}

/// Samples final dimensions and orientations of organs that have none.
///
/// Each organ draws from its own stream, keyed by plant, axis key, rank and
/// organ kind, so the values do not depend on when the organ was created.
///
/// ### Returns
/// The number of organs sampled.
pub fn dimension_phase(plant: &mut Plant, ctx: &StepContext) -> usize {
    let topology = &mut plant.topology;
    let mut sampled = 0;
    for organ in topology.organs.iter_mut().filter(|o| o.dimensions.is_none()) {
        let metamer = &topology.metamers[organ.metamer];
        let axis = &topology.axes[metamer.axis];
        organ.dimensions = Some(ctx.sampler.sample(
            plant.id,
            &axis.key,
            metamer.rank,
            axis.final_leaf_number,
            organ.kind,
        ));
        organ.orientation = Some(ctx.sampler.sample_orientation(
            plant.id,
            &axis.key,
            metamer.rank,
            organ.kind,
            axis.orientation.azimuth,
        ));
        sampled += 1;
    }
    sampled
}

/// Repeats tillering and topology phases until the plant stops changing.
fn settle_structure(
    plant: &mut Plant,
    ctx: &StepContext,
    report: &mut PhaseReport,
) -> SimResult<()> {
    let mut rounds = 0;
    loop {
        let requests = tillering_phase(plant, ctx);
        let (tillers, metamers) = topology_phase(plant, ctx, &requests)?;
        report.tillers_added += tillers;
        report.metamers_added += metamers;
        if requests.is_empty() && metamers == 0 {
            return Ok(());
        }
        rounds += 1;
        if rounds >= MAX_STRUCTURE_ROUNDS {
            return Err(SimError::topology(
                plant.id,
                "structure did not settle within one date",
            ));
        }
    }
}

/// Runs all phases for one plant at `ctx.tt` and checks the topology.
///
/// A date that first reaches `tt_bolting` is split in two: the plant is
/// brought to `tt_bolting`, regression is scheduled among the tillers
/// present then, and only afterwards is the rest of the date simulated.
pub fn advance_plant(plant: &mut Plant, ctx: &StepContext) -> SimResult<PhaseReport> {
    let mut report = PhaseReport::default();
    let bolting = ctx.params.tillering.tt_bolting;
    let crosses_bolting = !plant.topology.regression_scheduled && ctx.tt >= bolting;
    let first = if crosses_bolting {
        StepContext { tt: bolting, ..*ctx }
    } else {
        *ctx
    };

    (report.transitions, report.regressions_applied) = phenology_phase(plant, first.tt);
    settle_structure(plant, &first, &mut report)?;
    if crosses_bolting {
        report.regressions_marked += regression_phase(plant, &first);
        report.transitions += plant.topology.advance_stages(ctx.tt);
        settle_structure(plant, ctx, &mut report)?;
    }

    report.regressions_marked += regression_phase(plant, ctx);
    report.organs_sampled = dimension_phase(plant, ctx);
    plant.topology.verify()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimensions::AxisOrientation;
    use crate::params::CohortProbability;
    use crate::phenology::DevelopmentStage;
    use crate::stand::PlantPosition;
    use crate::topology::PlantTopology;
    use chrono::NaiveDate;

    fn params() -> GenotypeParameters {
        let mut p = GenotypeParameters::reference(
            "test",
            NaiveDate::from_ymd_opt(2010, 10, 15).unwrap(),
        );
        p.development.phyllochron = 100.0;
        p.development.early_leaf_factor = 1.0;
        p.development.emergence_delay = 0.0;
        p.tillering.tillering_potential = 1.0;
        p.tillering.cohort_probabilities = (3..=5)
            .map(|cohort| CohortProbability {
                cohort,
                probability: 1.0,
            })
            .collect();
        p
    }

    fn plant(leaves: u32) -> Plant {
        Plant {
            id: 0,
            genotype: "test".into(),
            position: PlantPosition::default(),
            topology: PlantTopology::new(0, leaves, 0.0, AxisOrientation::default()),
        }
    }

    fn run(plant: &mut Plant, p: &GenotypeParameters, density: f64, times: &[ThermalTime]) {
        let model = PhenologyModel::new(p.development.clone());
        for &tt in times {
            let ctx = StepContext::new(p, &model, 42, density, tt);
            advance_plant(plant, &ctx).unwrap();
        }
    }

    /// Botanical view of a plant, independent of arena indices.
    fn signature(plant: &Plant) -> Vec<(AxisKey, usize, Vec<DevelopmentStage>)> {
        let topo = &plant.topology;
        let mut out: Vec<_> = topo
            .axes
            .iter()
            .map(|a| {
                let stages = a
                    .metamers
                    .iter()
                    .flat_map(|&m| topo.metamers[m].organs())
                    .map(|o| topo.organs[o].stage)
                    .collect();
                (a.key.clone(), a.metamers.len(), stages)
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    #[test]
    fn certain_buds_produce_tillers_in_rank_order() {
        let p = params();
        let mut pl = plant(10);
        run(&mut pl, &p, 100.0, &[800.0]);
        let keys: Vec<String> = pl.topology.axes.iter().map(|a| a.key.to_string()).collect();
        // Cohorts 3..=5 are the buds of leaves 1..=3 of the main stem.
        assert_eq!(keys, vec!["MS", "T1", "T2", "T3"]);
        assert!(pl.topology.axes.iter().all(|a| !a.metamers.is_empty()));
        assert!(pl.topology.organs.iter().all(|o| o.dimensions.is_some()));
    }

    #[test]
    fn structure_does_not_depend_on_step_size() {
        let p = params();
        let mut coarse = plant(10);
        run(&mut coarse, &p, 100.0, &[1200.0]);
        let mut fine = plant(10);
        let steps: Vec<f64> = (1..=120).map(|i| f64::from(i) * 10.0).collect();
        run(&mut fine, &p, 100.0, &steps);
        assert_eq!(signature(&coarse), signature(&fine));
    }

    #[test]
    fn regression_does_not_depend_on_step_size() {
        let mut p = params();
        p.tillering.regression_base = 1.0;
        p.tillering.tt_bolting = 500.0;
        p.tillering.tt_flowering = 700.0;
        // Leaf 4 bud: a tiller appearing at 490, between the coarse dates.
        p.tillering.cohort_probabilities.push(CohortProbability {
            cohort: 6,
            probability: 1.0,
        });

        let mut coarse = plant(20);
        run(&mut coarse, &p, 1000.0, &[400.0, 2500.0, 2600.0]);
        let mut fine = plant(20);
        let steps: Vec<f64> = (1..=260).map(|i| f64::from(i) * 10.0).collect();
        run(&mut fine, &p, 1000.0, &steps);
        assert_eq!(signature(&coarse), signature(&fine));

        let topo = &coarse.topology;
        assert_eq!(topo.axes.len(), 5);
        assert_eq!(topo.living_axis_count(), 1);
        for axis in &topo.axes[1..] {
            let Regression::Applied { at } = axis.regression else {
                panic!("axis {} did not regress", axis.key);
            };
            assert!((500.0..=700.0).contains(&at));
            assert!((axis.metamers.len() as u32) < axis.final_leaf_number);
            // Nothing was appended after the stop time.
            let last = topo.metamers[*axis.metamers.last().unwrap()].blade;
            assert!(topo.organs[last].thresholds.emergence <= at + p.development.phyllochron);
        }
    }

    #[test]
    fn tiller_request_is_applied_once() {
        let p = params();
        let model = PhenologyModel::new(p.development.clone());
        let mut pl = plant(10);
        let ctx = StepContext::new(&p, &model, 42, 100.0, 600.0);
        advance_plant(&mut pl, &ctx).unwrap();
        let axes = pl.topology.axes.len();
        let request = TillerRequest {
            parent: pl.topology.main_stem().metamers[0],
            appearance: 350.0,
            cohort: 3,
            will_regress: false,
        };
        let (added, _) = topology_phase(&mut pl, &ctx, &[request]).unwrap();
        assert_eq!(added, 0);
        assert_eq!(pl.topology.axes.len(), axes);
    }

    #[test]
    fn dense_stands_lose_their_tillers() {
        let mut p = params();
        p.tillering.regression_base = 1.0;
        let times: Vec<f64> = (1..=40).map(|i| f64::from(i) * 50.0).collect();

        let mut sparse = plant(10);
        run(&mut sparse, &p, 100.0, &times);
        let mut dense = plant(10);
        run(&mut dense, &p, 1000.0, &times);

        assert_eq!(sparse.topology.living_axis_count(), 4);
        assert_eq!(dense.topology.living_axis_count(), 1);
        // Regressed axes are kept, their organs dead.
        assert_eq!(dense.topology.axes.len(), 4);
        for axis in &dense.topology.axes[1..] {
            assert!(matches!(axis.regression, Regression::Applied { .. }));
            for &m in &axis.metamers {
                for organ in dense.topology.metamers[m].organs() {
                    assert_eq!(dense.topology.organs[organ].stage, DevelopmentStage::Dead);
                }
            }
        }
    }
}

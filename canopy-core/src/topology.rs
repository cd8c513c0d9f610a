//! Plant → axis → metamer → organ arena.
//!
//! Every plant owns three flat vectors (axes, metamers, organs) and all
//! links between them are plain indices into those vectors. Children point
//! to their parent; a metamer only refers to the tiller grown from its bud
//! through [`BudState::Tillered`]. Nothing is ever removed: dead and
//! regressed axes stay in the arena with their flags set.

use crate::dimensions::{AxisOrientation, OrganDimensions, OrganOrientation};
use crate::error::{SimError, SimResult};
use crate::phenology::{DevelopmentStage, PhenologyModel, StageThresholds, advance_stage};
use crate::stand::PlantPosition;
use crate::types::{AxisId, AxisKey, MetamerId, OrganId, OrganKind, PlantId, ThermalTime};
use serde::{Deserialize, Serialize};

/// Fate of the axillary bud of a metamer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudState {
    /// Not decided yet (the metamer has not emerged).
    Undecided,
    Dormant,
    /// Will produce a tiller once thermal time reaches `appearance`.
    Pending {
        appearance: ThermalTime,
        cohort: u32,
        will_regress: bool,
    },
    Tillered(AxisId),
}

/// Regression state of an axis.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regression {
    #[default]
    None,
    /// Will stop growing at `at`.
    Scheduled { at: ThermalTime },
    /// Stopped at `at`; organs are killed at the next step.
    Marked { at: ThermalTime },
    /// Stopped at `at`; every organ has been driven to `Dead`.
    Applied { at: ThermalTime },
}

impl Regression {
    /// Thermal time at which the axis stopped, if it has.
    pub fn stop_time(self) -> Option<ThermalTime> {
        match self {
            Regression::Marked { at } | Regression::Applied { at } => Some(at),
            Regression::None | Regression::Scheduled { .. } => None,
        }
    }

    pub fn is_regressed(self) -> bool {
        self.stop_time().is_some()
    }

    /// Thermal time the axis will not develop past, once scheduled.
    pub fn growth_limit(self) -> Option<ThermalTime> {
        match self {
            Regression::Scheduled { at } | Regression::Marked { at } | Regression::Applied { at } => {
                Some(at)
            }
            Regression::None => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Organ {
    pub id: OrganId,
    pub metamer: MetamerId,
    pub kind: OrganKind,
    pub stage: DevelopmentStage,
    pub thresholds: StageThresholds,
    /// Final dimensions; filled by the dimension phase.
    pub dimensions: Option<OrganDimensions>,
    pub orientation: Option<OrganOrientation>,
    /// Entry of the blade shape database (blades only).
    pub shape_class: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metamer {
    pub id: MetamerId,
    pub axis: AxisId,
    /// 1-based rank on the axis.
    pub rank: u32,
    pub internode: OrganId,
    pub sheath: OrganId,
    pub blade: OrganId,
    pub ear: Option<OrganId>,
    pub bud: BudState,
}

impl Metamer {
    pub fn organs(&self) -> impl Iterator<Item = OrganId> + '_ {
        [self.internode, self.sheath, self.blade]
            .into_iter()
            .chain(self.ear)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub id: AxisId,
    pub key: AxisKey,
    pub cohort: u32,
    /// Metamer whose bud produced this axis; `None` for the main stem.
    pub parent: Option<MetamerId>,
    /// Appearance thermal time.
    pub start_tt: ThermalTime,
    pub final_leaf_number: u32,
    pub metamers: Vec<MetamerId>,
    /// Drawn at creation; the timing is decided at bolting.
    pub will_regress: bool,
    pub regression: Regression,
    pub orientation: AxisOrientation,
}

impl Axis {
    pub fn is_main_stem(&self) -> bool {
        self.parent.is_none()
    }

    /// Thermal time used for displayed sizes: frozen at the stop time of a
    /// regressed axis.
    pub fn display_time(&self, tt: ThermalTime) -> ThermalTime {
        self.regression.stop_time().map_or(tt, |at| tt.min(at))
    }
}

/// Everything needed to create a tiller axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NewTiller {
    pub parent: MetamerId,
    pub appearance: ThermalTime,
    pub cohort: u32,
    pub final_leaf_number: u32,
    pub will_regress: bool,
    pub orientation: AxisOrientation,
}

/// Topology of one plant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlantTopology {
    pub plant: PlantId,
    pub axes: Vec<Axis>,
    pub metamers: Vec<Metamer>,
    pub organs: Vec<Organ>,
    /// Whether regression times have been assigned (done once, at bolting).
    pub regression_scheduled: bool,
}

impl PlantTopology {
    /// A plant with a bare main stem (axis 0, cohort 1).
    pub fn new(
        plant: PlantId,
        final_leaf_number: u32,
        start_tt: ThermalTime,
        orientation: AxisOrientation,
    ) -> Self {
        let main_stem = Axis {
            id: 0,
            key: AxisKey::main_stem(),
            cohort: 1,
            parent: None,
            start_tt,
            final_leaf_number,
            metamers: Vec::new(),
            will_regress: false,
            regression: Regression::None,
            orientation,
        };
        Self {
            plant,
            axes: vec![main_stem],
            metamers: Vec::new(),
            organs: Vec::new(),
            regression_scheduled: false,
        }
    }

    fn violation(&self, detail: impl Into<String>) -> SimError {
        SimError::topology(self.plant, detail)
    }

    pub fn main_stem(&self) -> &Axis {
        &self.axes[0]
    }

    pub fn axis_of_organ(&self, organ: OrganId) -> &Axis {
        &self.axes[self.metamers[self.organs[organ].metamer].axis]
    }

    pub fn parent_axis(&self, axis: AxisId) -> Option<AxisId> {
        self.axes[axis].parent.map(|m| self.metamers[m].axis)
    }

    /// Thermal time up to which `axis` develops at `tt`: `tt` capped by the
    /// regression time of the axis or of any axis it grew from.
    pub fn growth_limit(&self, axis: AxisId, tt: ThermalTime) -> ThermalTime {
        let mut limit = tt;
        let mut current = Some(axis);
        let mut steps = 0;
        while let Some(a) = current
            && steps <= self.axes.len()
        {
            if let Some(at) = self.axes[a].regression.growth_limit() {
                limit = limit.min(at);
            }
            current = self.parent_axis(a);
            steps += 1;
        }
        limit
    }

    /// [`Self::growth_limit`] of every axis, indexed by axis id.
    pub fn growth_limits(&self, tt: ThermalTime) -> Vec<ThermalTime> {
        (0..self.axes.len())
            .map(|axis| self.growth_limit(axis, tt))
            .collect()
    }

    /// Creates the tiller of `tiller.parent`'s bud.
    ///
    /// A bud creates at most one tiller: a second request returns the
    /// existing axis unchanged.
    pub fn add_tiller(&mut self, tiller: NewTiller) -> SimResult<AxisId> {
        let Some(metamer) = self.metamers.get(tiller.parent) else {
            return Err(self.violation(format!(
                "tiller requested on unknown metamer {}",
                tiller.parent
            )));
        };
        if let BudState::Tillered(existing) = metamer.bud {
            return Ok(existing);
        }
        let (parent_axis, rank) = (metamer.axis, metamer.rank);
        let id = self.axes.len();
        let key = self.axes[parent_axis].key.child(rank);
        self.axes.push(Axis {
            id,
            key,
            cohort: tiller.cohort,
            parent: Some(tiller.parent),
            start_tt: tiller.appearance,
            final_leaf_number: tiller.final_leaf_number,
            metamers: Vec::new(),
            will_regress: tiller.will_regress,
            regression: Regression::None,
            orientation: tiller.orientation,
        });
        self.metamers[tiller.parent].bud = BudState::Tillered(id);
        Ok(id)
    }

    fn push_organ(
        &mut self,
        metamer: MetamerId,
        kind: OrganKind,
        thresholds: StageThresholds,
        shape_class: u32,
        tt: ThermalTime,
    ) -> OrganId {
        let id = self.organs.len();
        let mut stage = DevelopmentStage::Dormant;
        advance_stage(&mut stage, thresholds.stage_at(tt), |_, _| {});
        self.organs.push(Organ {
            id,
            metamer,
            kind,
            stage,
            thresholds,
            dimensions: None,
            orientation: None,
            shape_class,
        });
        id
    }

    /// Appends the next metamer to `axis` and brings its organs up to `tt`.
    ///
    /// The metamer at the final leaf number also carries the ear.
    pub fn append_metamer(
        &mut self,
        axis: AxisId,
        model: &PhenologyModel,
        tt: ThermalTime,
        shape_class: u32,
    ) -> SimResult<MetamerId> {
        let Some(a) = self.axes.get(axis) else {
            return Err(self.violation(format!("unknown axis {axis}")));
        };
        if a.regression.is_regressed() {
            return Err(self.violation(format!("axis {} has regressed", a.key)));
        }
        let rank = a.metamers.len() as u32 + 1;
        if rank > a.final_leaf_number {
            return Err(self.violation(format!(
                "axis {} already has its {} metamers",
                a.key, a.final_leaf_number
            )));
        }
        let (t0, leaf_number) = (a.start_tt, a.final_leaf_number);

        let id = self.metamers.len();
        let leaf = model.leaf_thresholds(t0, rank);
        let internode = self.push_organ(
            id,
            OrganKind::Internode,
            model.internode_thresholds(t0, rank),
            0,
            tt,
        );
        let sheath = self.push_organ(id, OrganKind::Sheath, leaf, 0, tt);
        let blade = self.push_organ(id, OrganKind::Blade, leaf, shape_class, tt);
        let ear = (rank == leaf_number).then(|| {
            self.push_organ(
                id,
                OrganKind::Ear,
                model.ear_thresholds(t0, leaf_number),
                0,
                tt,
            )
        });
        self.metamers.push(Metamer {
            id,
            axis,
            rank,
            internode,
            sheath,
            blade,
            ear,
            bud: BudState::Undecided,
        });
        self.axes[axis].metamers.push(id);
        Ok(id)
    }

    /// Appends metamers to `axis` while the previous one has emerged.
    ///
    /// Growth is evaluated at the axis' [`Self::growth_limit`], so an axis
    /// scheduled to regress never outgrows its stop time, however large the
    /// step to `tt`.
    ///
    /// ### Returns
    /// The number of metamers appended.
    pub fn grow_axis(
        &mut self,
        axis: AxisId,
        model: &PhenologyModel,
        tt: ThermalTime,
        shape_class: impl Fn(u32, u32) -> u32,
    ) -> SimResult<usize> {
        if axis >= self.axes.len() {
            return Err(self.violation(format!("unknown axis {axis}")));
        }
        let limit = self.growth_limit(axis, tt);
        let mut appended = 0;
        loop {
            let a = &self.axes[axis];
            if a.regression.is_regressed()
                || limit < a.start_tt
                || a.metamers.len() as u32 >= a.final_leaf_number
            {
                break;
            }
            if let Some(&last) = a.metamers.last()
                && limit < self.organs[self.metamers[last].blade].thresholds.emergence
            {
                break;
            }
            let class = shape_class(a.metamers.len() as u32 + 1, a.final_leaf_number);
            self.append_metamer(axis, model, limit, class)?;
            appended += 1;
        }
        Ok(appended)
    }

    /// Moves every organ forward to its stage at the growth limit of its
    /// axis; organs of axes whose regression has been applied are driven to
    /// `Dead`.
    ///
    /// ### Returns
    /// The number of stage transitions.
    pub fn advance_stages(&mut self, tt: ThermalTime) -> usize {
        let limits = self.growth_limits(tt);
        let mut transitions = 0;
        for organ in &mut self.organs {
            let axis = &self.axes[self.metamers[organ.metamer].axis];
            let target = match axis.regression {
                Regression::Applied { .. } => DevelopmentStage::Dead,
                _ => organ.thresholds.stage_at(limits[axis.id]),
            };
            transitions += advance_stage(&mut organ.stage, target, |_, _| {});
        }
        transitions
    }

    /// Turns every `Marked` regression into `Applied`.
    pub fn apply_marked_regressions(&mut self) -> Vec<AxisId> {
        let mut applied = Vec::new();
        for axis in &mut self.axes {
            if let Regression::Marked { at } = axis.regression {
                axis.regression = Regression::Applied { at };
                applied.push(axis.id);
            }
        }
        applied
    }

    /// Stops `axis` and all its descendants at `at`.
    ///
    /// ### Returns
    /// Axes newly marked.
    pub fn mark_regression(&mut self, axis: AxisId, at: ThermalTime) -> Vec<AxisId> {
        let mut targets = vec![axis];
        targets.extend(self.descendants(axis));
        targets
            .into_iter()
            .filter(|&a| {
                let regression = &mut self.axes[a].regression;
                if regression.is_regressed() {
                    false
                } else {
                    *regression = Regression::Marked { at };
                    true
                }
            })
            .collect()
    }

    /// All axes grown, directly or not, from buds of `axis`, sorted by id.
    pub fn descendants(&self, axis: AxisId) -> Vec<AxisId> {
        let mut out = Vec::new();
        let mut stack = vec![axis];
        while let Some(a) = stack.pop() {
            if out.len() > self.axes.len() {
                break;
            }
            for &m in &self.axes[a].metamers {
                if let BudState::Tillered(child) = self.metamers[m].bud {
                    out.push(child);
                    stack.push(child);
                }
            }
        }
        out.sort_unstable();
        out
    }

    /// Checks the structural invariants of the arena.
    pub fn verify(&self) -> SimResult<()> {
        let Some(root) = self.axes.first() else {
            return Err(self.violation("plant has no main stem"));
        };
        if root.parent.is_some() || !root.key.is_main_stem() {
            return Err(self.violation("axis 0 must be the main stem"));
        }

        for (id, axis) in self.axes.iter().enumerate() {
            if axis.id != id {
                return Err(self.violation(format!("axis {id} carries id {}", axis.id)));
            }
            if id > 0 {
                let Some(parent) = axis.parent else {
                    return Err(self.violation(format!("axis {} has no parent metamer", axis.key)));
                };
                let Some(pm) = self.metamers.get(parent) else {
                    return Err(self.violation(format!("axis {} has unknown parent", axis.key)));
                };
                if pm.bud != BudState::Tillered(id) {
                    return Err(self.violation(format!(
                        "parent bud of axis {} does not point back to it",
                        axis.key
                    )));
                }
                // Parents are created first, so following parents always terminates.
                if pm.axis >= id {
                    return Err(self.violation(format!("axis {} is its own ancestor", axis.key)));
                }
                if axis.cohort <= self.axes[pm.axis].cohort {
                    return Err(self.violation(format!(
                        "axis {} has cohort {} not above its parent's",
                        axis.key, axis.cohort
                    )));
                }
            }

            for (i, &m) in axis.metamers.iter().enumerate() {
                let Some(metamer) = self.metamers.get(m) else {
                    return Err(self.violation(format!("axis {} lists unknown metamer", axis.key)));
                };
                if metamer.axis != id || metamer.rank != i as u32 + 1 {
                    return Err(self.violation(format!(
                        "metamer ranks on axis {} are not contiguous",
                        axis.key
                    )));
                }
            }

            // Tillers of one parent appear in increasing bud rank.
            let mut children: Vec<(AxisId, u32)> = axis
                .metamers
                .iter()
                .filter_map(|&m| match self.metamers[m].bud {
                    BudState::Tillered(child) => Some((child, self.metamers[m].rank)),
                    _ => None,
                })
                .collect();
            children.sort_unstable();
            if children.windows(2).any(|w| w[0].1 >= w[1].1) {
                return Err(self.violation(format!(
                    "tillers of axis {} did not appear in rank order",
                    axis.key
                )));
            }
        }

        for metamer in &self.metamers {
            for organ in metamer.organs() {
                match self.organs.get(organ) {
                    Some(o) if o.metamer == metamer.id => {}
                    _ => {
                        return Err(self.violation(format!(
                            "organ {organ} is not owned by metamer {}",
                            metamer.id
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Final dimensions scaled by the current growth fraction.
    ///
    /// Length and area follow the growth fraction; width is the final one.
    pub fn displayed_dimensions(
        &self,
        organ: OrganId,
        tt: ThermalTime,
        steepness: f64,
    ) -> Option<OrganDimensions> {
        let o = &self.organs[organ];
        if !o.stage.is_visible() {
            return None;
        }
        let dims = o.dimensions?;
        let t = self.axis_of_organ(organ).display_time(tt);
        let g = o.thresholds.growth_fraction(t, steepness);
        Some(OrganDimensions {
            length: dims.length * g,
            width: dims.width,
            area: dims.area * g,
        })
    }

    /// Green blade area of the plant at `tt`.
    pub fn leaf_area(&self, tt: ThermalTime, steepness: f64) -> f64 {
        self.organs
            .iter()
            .filter(|o| o.kind == OrganKind::Blade && o.stage < DevelopmentStage::Dead)
            .filter_map(|o| {
                let dims = self.displayed_dimensions(o.id, tt, steepness)?;
                Some(dims.area * o.thresholds.green_fraction(tt))
            })
            .sum()
    }

    /// Axes neither regressed nor entirely dead.
    pub fn living_axis_count(&self) -> usize {
        self.axes
            .iter()
            .filter(|axis| {
                if axis.regression.is_regressed() {
                    return false;
                }
                let mut organs = axis
                    .metamers
                    .iter()
                    .flat_map(|&m| self.metamers[m].organs())
                    .peekable();
                organs.peek().is_none()
                    || organs.any(|o| self.organs[o].stage < DevelopmentStage::Dead)
            })
            .count()
    }

    pub fn count_organs_in(&self, stage: DevelopmentStage) -> usize {
        self.organs.iter().filter(|o| o.stage == stage).count()
    }
}

/// One plant of the stand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub id: PlantId,
    pub genotype: String,
    pub position: PlantPosition,
    pub topology: PlantTopology,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::DevelopmentParameters;

    fn model() -> PhenologyModel {
        PhenologyModel::new(DevelopmentParameters {
            phyllochron: 100.0,
            early_leaf_factor: 1.0,
            emergence_delay: 0.0,
            ..DevelopmentParameters::default()
        })
    }

    fn grown(tt: ThermalTime) -> PlantTopology {
        let mut topo = PlantTopology::new(0, 10, 0.0, AxisOrientation::default());
        topo.grow_axis(0, &model(), tt, |_, _| 0).unwrap();
        topo
    }

    fn tiller_on(parent: MetamerId) -> NewTiller {
        NewTiller {
            parent,
            appearance: 300.0,
            cohort: 3,
            final_leaf_number: 6,
            will_regress: false,
            orientation: AxisOrientation::default(),
        }
    }

    #[test]
    fn metamers_append_after_previous_emerges() {
        // Leaf r emerges at 100 r - 160 (clamped at 0).
        let topo = grown(0.0);
        assert_eq!(topo.main_stem().metamers.len(), 2);
        let topo = grown(450.0);
        // Ranks 1..=6 have emerged; rank 7 is appended dormant.
        assert_eq!(topo.main_stem().metamers.len(), 7);
        let last = topo.metamers[6].blade;
        assert_eq!(topo.organs[last].stage, DevelopmentStage::Dormant);
        assert!(topo.verify().is_ok());
    }

    #[test]
    fn axis_stops_at_final_leaf_number_with_an_ear() {
        let topo = grown(5000.0);
        assert_eq!(topo.main_stem().metamers.len(), 10);
        let ears: Vec<_> = topo.metamers.iter().filter_map(|m| m.ear).collect();
        assert_eq!(ears.len(), 1);
        assert_eq!(topo.metamers[9].ear, ears.first().copied());
    }

    #[test]
    fn late_append_walks_every_stage() {
        let topo = grown(5000.0);
        assert!(topo.organs.iter().all(|o| o.stage == DevelopmentStage::Dead));
    }

    #[test]
    fn add_tiller_is_idempotent() {
        let mut topo = grown(450.0);
        let first = topo.add_tiller(tiller_on(0)).unwrap();
        let second = topo.add_tiller(tiller_on(0)).unwrap();
        assert_eq!(first, second);
        assert_eq!(topo.axes.len(), 2);
        assert_eq!(topo.axes[first].key.to_string(), "T1");
        assert!(topo.add_tiller(tiller_on(999)).is_err());
        assert!(topo.verify().is_ok());
    }

    #[test]
    fn regression_marks_descendants_and_kills_organs() {
        let m = model();
        let mut topo = grown(600.0);
        let t1 = topo.add_tiller(tiller_on(0)).unwrap();
        topo.grow_axis(t1, &m, 600.0, |_, _| 0).unwrap();
        let mut nested = tiller_on(topo.axes[t1].metamers[0]);
        nested.cohort = 5;
        let t11 = topo.add_tiller(nested).unwrap();
        assert_eq!(topo.descendants(0), vec![t1, t11]);

        let marked = topo.mark_regression(t1, 600.0);
        assert_eq!(marked, vec![t1, t11]);
        assert_eq!(topo.living_axis_count(), 1);
        // Growing is blocked on regressed axes.
        assert_eq!(topo.grow_axis(t1, &m, 900.0, |_, _| 0).unwrap(), 0);

        assert_eq!(topo.apply_marked_regressions(), vec![t1, t11]);
        topo.advance_stages(650.0);
        for &mid in &topo.axes[t1].metamers {
            for organ in topo.metamers[mid].organs() {
                assert_eq!(topo.organs[organ].stage, DevelopmentStage::Dead);
            }
        }
        assert!(topo.verify().is_ok());
    }

    #[test]
    fn scheduled_axes_stop_at_their_regression_time() {
        let m = model();
        let mut topo = grown(450.0);
        let t1 = topo.add_tiller(tiller_on(0)).unwrap();
        topo.grow_axis(t1, &m, 300.0, |_, _| 0).unwrap();
        let mut nested = tiller_on(topo.axes[t1].metamers[0]);
        nested.cohort = 5;
        let t11 = topo.add_tiller(nested).unwrap();
        topo.axes[t1].regression = Regression::Scheduled { at: 400.0 };
        assert_eq!(topo.growth_limit(t1, 900.0), 400.0);
        assert_eq!(topo.growth_limit(t11, 900.0), 400.0);
        assert_eq!(topo.growth_limit(0, 900.0), 900.0);
        assert_eq!(topo.growth_limit(t1, 350.0), 350.0);

        // One step to 900 grows t1 exactly as far as a step to 400 would.
        let mut reference = topo.clone();
        reference.grow_axis(t1, &m, 400.0, |_, _| 0).unwrap();
        topo.grow_axis(t1, &m, 900.0, |_, _| 0).unwrap();
        assert_eq!(topo.axes[t1].metamers.len(), reference.axes[t1].metamers.len());
        topo.advance_stages(900.0);
        reference.advance_stages(400.0);
        for (&a, &b) in topo.axes[t1].metamers.iter().zip(&reference.axes[t1].metamers) {
            let (blade, expected) = (topo.metamers[a].blade, reference.metamers[b].blade);
            assert_eq!(topo.organs[blade].stage, reference.organs[expected].stage);
        }
    }

    #[test]
    fn verify_rejects_broken_back_links() {
        let mut topo = grown(450.0);
        let t1 = topo.add_tiller(tiller_on(0)).unwrap();
        topo.metamers[0].bud = BudState::Dormant;
        let err = topo.verify().unwrap_err();
        assert!(matches!(err, SimError::TopologyInvariantViolation { plant: 0, .. }));
        topo.metamers[0].bud = BudState::Tillered(t1);
        topo.axes[t1].cohort = 1;
        assert!(topo.verify().is_err());
    }

    #[test]
    fn displayed_size_freezes_on_regressed_axes() {
        let m = model();
        let mut topo = grown(450.0);
        let t1 = topo.add_tiller(tiller_on(0)).unwrap();
        topo.grow_axis(t1, &m, 450.0, |_, _| 0).unwrap();
        let blade = topo.metamers[topo.axes[t1].metamers[0]].blade;
        topo.organs[blade].dimensions = Some(OrganDimensions {
            length: 0.2,
            width: 0.01,
            area: 0.0015,
        });
        topo.mark_regression(t1, 350.0);
        let at_stop = topo.displayed_dimensions(blade, 350.0, 8.0).unwrap();
        let later = topo.displayed_dimensions(blade, 450.0, 8.0).unwrap();
        assert_eq!(at_stop, later);
        assert!(later.length < 0.2);
    }
}

//! Date-by-date driver of the canopy engine.

use crate::config::SimConfig;
use crate::dimensions::OrganDimensionSampler;
use crate::error::{SimError, SimResult};
use crate::params::{GenotypeParameters, ParameterTable};
use crate::phases::{PhaseReport, StepContext, advance_plant};
use crate::phenology::PhenologyModel;
use crate::shapes::ShapeDatabase;
use crate::snapshot::CanopySnapshot;
use crate::stand::{StandLayout, generate_stand};
use crate::thermal::{TemperatureSeries, ThermalTimeClock};
use crate::tillering::assign_leaf_numbers;
use crate::topology::{Plant, PlantTopology};
use crate::types::{AxisKey, ThermalTime};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Owns the canopy state and advances it through the configured dates.
///
/// [`Simulation`] glues together:
/// - The validated inputs: [`SimConfig`], the selected
///   [`GenotypeParameters`] row and the [`ThermalTimeClock`].
/// - The stand: a [`StandLayout`] and one [`Plant`] per position.
/// - The last committed date and its [`CanopySnapshot`].
///
/// A date is computed on a copy of the plants and committed only when
/// every plant succeeded, so a failing date leaves the previous state and
/// snapshot untouched.
///
/// ### Fields
/// - `config` - Run configuration.
/// - `params` - Genotype row shared with the snapshots.
/// - `phenology` - Stage schedule built from `params.development`.
/// - `clock` - Thermal time of each date.
/// - `layout` - Plant positions and border mirrors.
/// - `shapes` - Blade shape classes used by the geometry.
/// - `plants` - Current canopy state, indexed by plant id.
///
/// - `last_date` - Last committed date, if any.
/// - `last_snapshot` - Snapshot of `last_date`.
#[derive(Debug)]
pub struct Simulation {
    config: SimConfig,
    params: Arc<GenotypeParameters>,
    phenology: PhenologyModel,
    clock: ThermalTimeClock,
    layout: Arc<StandLayout>,
    shapes: Arc<ShapeDatabase>,
    plants: Vec<Plant>,

    last_date: Option<NaiveDate>,
    last_snapshot: Option<CanopySnapshot>,
}

/// Date that could not be simulated.
#[derive(Debug)]
pub struct DateFailure {
    pub date: NaiveDate,
    pub error: SimError,
}

/// Outcome of [`Simulation::run`].
#[derive(Debug, Default)]
pub struct RunReport {
    /// One snapshot per committed date, in date order.
    pub snapshots: Vec<CanopySnapshot>,
    pub failure: Option<DateFailure>,
    /// The callback asked to stop before the last date.
    pub stopped_early: bool,
}

impl RunReport {
    pub fn last_snapshot(&self) -> Option<&CanopySnapshot> {
        self.snapshots.last()
    }

    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && !self.stopped_early
    }
}

impl Simulation {
    /// Creates a simulation with the built-in blade shapes.
    ///
    /// See [`Simulation::with_shapes`].
    pub fn new(
        config: SimConfig,
        table: &ParameterTable,
        weather: &TemperatureSeries,
    ) -> SimResult<Self> {
        Self::with_shapes(config, table, weather, ShapeDatabase::builtin())
    }

    /// Validates the inputs and builds the initial canopy.
    ///
    /// The setup is:
    /// 1. Validates `config` and selects the genotype row from `table`.
    /// 2. Checks that every shape class used by the row exists in `shapes`.
    /// 3. Builds the thermal clock from `weather`, using the row's base
    ///    temperature when it has one.
    /// 4. Generates the stand and assigns main-stem leaf numbers.
    /// 5. Creates one plant per position with a bare main stem starting at
    ///    the emergence delay.
    ///
    /// ### Parameters
    /// - `config` - Run configuration.
    /// - `table` - Validated genotype rows.
    /// - `weather` - Temperature series covering the sowing date.
    /// - `shapes` - Blade shape classes available to the geometry.
    ///
    /// ### Returns
    /// A simulation with no committed date, or the first validation error.
    pub fn with_shapes(
        config: SimConfig,
        table: &ParameterTable,
        weather: &TemperatureSeries,
        shapes: ShapeDatabase,
    ) -> SimResult<Self> {
        config.validate()?;
        let params = table
            .select(config.genotype.as_deref(), config.sowing_date, config.density)?
            .clone();
        params.validate()?;

        if let Some(class) = params
            .orientation
            .shape_classes
            .iter()
            .find(|&&class| !shapes.contains(class))
        {
            return Err(SimError::ParameterValidation {
                genotype: params.genotype.clone(),
                field: "orientation.shape_classes".into(),
                reason: format!("shape class {class} is not in the shape database"),
            });
        }

        let base_temperature = params.base_temperature.unwrap_or(config.base_temperature);
        let clock = ThermalTimeClock::new(weather, base_temperature, params.sowing_date)?;

        let seed = config.random_seed;
        let layout = generate_stand(&config.stand_spec(), seed);
        let leaf_numbers = assign_leaf_numbers(
            &params.leaf_number_distribution(),
            layout.plant_count(),
            config.leaf_number_assignment,
            seed,
        );

        let sampler = OrganDimensionSampler::new(&params.dimensions, &params.orientation, seed);
        let main_stem = AxisKey::main_stem();
        let start_tt = params.development.emergence_delay;
        let plants: Vec<Plant> = layout
            .positions
            .iter()
            .zip(leaf_numbers)
            .enumerate()
            .map(|(id, (position, leaf_number))| Plant {
                id,
                genotype: params.genotype.clone(),
                position: *position,
                topology: PlantTopology::new(
                    id,
                    leaf_number,
                    start_tt,
                    sampler.axis_orientation(id, &main_stem, position.azimuth),
                ),
            })
            .collect();

        info!(
            genotype = %params.genotype,
            plants = plants.len(),
            mirrors = layout.mirrors.len(),
            base_temperature,
            dates = config.date_sequence.len(),
            "simulation initialised"
        );

        Ok(Self {
            phenology: PhenologyModel::new(params.development.clone()),
            params: Arc::new(params),
            clock,
            layout: Arc::new(layout),
            shapes: Arc::new(shapes),
            plants,
            config,
            last_date: None,
            last_snapshot: None,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn params(&self) -> &GenotypeParameters {
        &self.params
    }

    pub fn clock(&self) -> &ThermalTimeClock {
        &self.clock
    }

    pub fn layout(&self) -> &StandLayout {
        &self.layout
    }

    pub fn plants(&self) -> &[Plant] {
        &self.plants
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }

    /// Thermal time of the last committed date, 0 before the first one.
    pub fn thermal_time(&self) -> ThermalTime {
        self.last_snapshot
            .as_ref()
            .map_or(0.0, CanopySnapshot::thermal_time)
    }

    pub fn last_snapshot(&self) -> Option<&CanopySnapshot> {
        self.last_snapshot.as_ref()
    }

    /// Advances the canopy to `date` and returns its snapshot.
    ///
    /// The step consists of:
    /// 1. Reading the thermal time of `date` from the clock.
    /// 2. Running [`advance_plant`] on every plant in parallel, on a copy
    ///    of the current state.
    /// 3. Committing the copy and building the snapshot.
    ///
    /// ### Errors
    /// - [`SimError::NonMonotonicDate`] if `date` is not after the last
    ///   committed date.
    /// - [`SimError::DateOutOfRange`] if the weather does not cover `date`.
    /// - [`SimError::TopologyInvariantViolation`] if a plant ends the date
    ///   with a broken topology.
    ///
    /// On error nothing is committed.
    pub fn step_to(&mut self, date: NaiveDate) -> SimResult<CanopySnapshot> {
        if let Some(last) = self.last_date
            && date <= last
        {
            return Err(SimError::NonMonotonicDate { date, last });
        }
        let tt = self.clock.thermal_time_at(date)?;

        let ctx = StepContext::new(
            &self.params,
            &self.phenology,
            self.config.random_seed,
            self.layout.observed_density(),
            tt,
        );
        let mut next = self.plants.clone();
        let reports = next
            .par_iter_mut()
            .map(|plant| advance_plant(plant, &ctx))
            .collect::<SimResult<Vec<PhaseReport>>>()?;

        let total = reports.iter().fold(PhaseReport::default(), |mut acc, r| {
            acc.transitions += r.transitions;
            acc.metamers_added += r.metamers_added;
            acc.tillers_added += r.tillers_added;
            acc.regressions_marked += r.regressions_marked;
            acc.regressions_applied += r.regressions_applied;
            acc.organs_sampled += r.organs_sampled;
            acc
        });
        debug!(
            %date,
            transitions = total.transitions,
            metamers = total.metamers_added,
            tillers = total.tillers_added,
            regressions_marked = total.regressions_marked,
            regressions_applied = total.regressions_applied,
            "phases applied"
        );

        self.plants = next;
        self.last_date = Some(date);
        let snapshot = CanopySnapshot::new(
            date,
            tt,
            self.plants.clone(),
            Arc::clone(&self.layout),
            Arc::clone(&self.params),
            Arc::clone(&self.shapes),
            self.config.geometry,
        );
        info!(
            %date,
            thermal_time = tt,
            axes = snapshot.axis_count(),
            living_axes = snapshot.living_axis_count(),
            lai = snapshot.leaf_area_index(),
            "date simulated"
        );
        self.last_snapshot = Some(snapshot.clone());
        Ok(snapshot)
    }

    /// Runs every configured date. See [`Simulation::run_with`].
    pub fn run(&mut self) -> RunReport {
        self.run_with(|_| ControlFlow::Continue(()))
    }

    /// Runs the configured dates, handing each snapshot to `on_snapshot`.
    ///
    /// Dates already committed are skipped. The run stops at the first
    /// failing date, which is recorded in the report, or when
    /// `on_snapshot` returns [`ControlFlow::Break`].
    pub fn run_with(
        &mut self,
        mut on_snapshot: impl FnMut(&CanopySnapshot) -> ControlFlow<()>,
    ) -> RunReport {
        let dates: Vec<NaiveDate> = self
            .config
            .date_sequence
            .iter()
            .copied()
            .filter(|&d| self.last_date.is_none_or(|last| d > last))
            .collect();
        let mut report = RunReport::default();

        for date in dates {
            match self.step_to(date) {
                Ok(snapshot) => {
                    let flow = on_snapshot(&snapshot);
                    report.snapshots.push(snapshot);
                    if flow.is_break() {
                        report.stopped_early = true;
                        break;
                    }
                }
                Err(error) => {
                    warn!(%date, %error, "date failed, keeping the last valid snapshot");
                    report.failure = Some(DateFailure { date, error });
                    break;
                }
            }
        }

        info!(
            dates = report.snapshots.len(),
            failed = report.failure.is_some(),
            stopped_early = report.stopped_early,
            "simulation finished"
        );
        report
    }
}

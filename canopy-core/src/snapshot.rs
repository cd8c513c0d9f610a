//! Immutable per-date canopy state.

use crate::geometry::{GeometryOptions, PlantGeometry, reconstruct_plant};
use crate::params::GenotypeParameters;
use crate::phenology::{DevelopmentStage, PhenologyModel};
use crate::shapes::ShapeDatabase;
use crate::stand::StandLayout;
use crate::topology::Plant;
use crate::types::{PlantId, ThermalTime};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

#[derive(Debug)]
struct SnapshotData {
    date: NaiveDate,
    thermal_time: ThermalTime,
    plants: Vec<Plant>,
    layout: Arc<StandLayout>,
    params: Arc<GenotypeParameters>,
    shapes: Arc<ShapeDatabase>,
    options: GeometryOptions,
    geometry: OnceLock<Vec<PlantGeometry>>,
}

/// Topology, dimensions and positions of the canopy at one date.
///
/// Snapshots are values: cloning is cheap and nothing mutates them once
/// built. Geometry is reconstructed on first request and cached.
#[derive(Clone, Debug)]
pub struct CanopySnapshot {
    inner: Arc<SnapshotData>,
}

impl CanopySnapshot {
    pub(crate) fn new(
        date: NaiveDate,
        thermal_time: ThermalTime,
        plants: Vec<Plant>,
        layout: Arc<StandLayout>,
        params: Arc<GenotypeParameters>,
        shapes: Arc<ShapeDatabase>,
        options: GeometryOptions,
    ) -> Self {
        Self {
            inner: Arc::new(SnapshotData {
                date,
                thermal_time,
                plants,
                layout,
                params,
                shapes,
                options,
                geometry: OnceLock::new(),
            }),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.inner.date
    }

    pub fn thermal_time(&self) -> ThermalTime {
        self.inner.thermal_time
    }

    pub fn plants(&self) -> &[Plant] {
        &self.inner.plants
    }

    pub fn plant(&self, id: PlantId) -> Option<&Plant> {
        self.inner.plants.get(id)
    }

    pub fn layout(&self) -> &StandLayout {
        &self.inner.layout
    }

    pub fn genotype(&self) -> &GenotypeParameters {
        &self.inner.params
    }

    fn steepness(&self) -> f64 {
        self.inner.params.development.growth_steepness
    }

    /// Organ meshes of every plant, built in parallel on first call.
    pub fn geometry(&self) -> &[PlantGeometry] {
        self.inner.geometry.get_or_init(|| {
            let data = &self.inner;
            let steepness = self.steepness();
            data.plants
                .par_iter()
                .map(|plant| {
                    reconstruct_plant(
                        plant,
                        data.thermal_time,
                        steepness,
                        &data.shapes,
                        &data.options,
                    )
                })
                .collect()
        })
    }

    pub fn geometry_is_built(&self) -> bool {
        self.inner.geometry.get().is_some()
    }

    /// Green blade area of the canopy (m²).
    pub fn leaf_area(&self) -> f64 {
        let steepness = self.steepness();
        self.inner
            .plants
            .iter()
            .map(|p| p.topology.leaf_area(self.inner.thermal_time, steepness))
            .sum()
    }

    /// Leaf area per unit ground area of the plot.
    pub fn leaf_area_index(&self) -> f64 {
        let ground = self.inner.layout.width * self.inner.layout.height;
        if ground > 0.0 {
            self.leaf_area() / ground
        } else {
            0.0
        }
    }

    pub fn axis_count(&self) -> usize {
        self.inner.plants.iter().map(|p| p.topology.axes.len()).sum()
    }

    pub fn living_axis_count(&self) -> usize {
        self.inner
            .plants
            .iter()
            .map(|p| p.topology.living_axis_count())
            .sum()
    }

    /// Mean fractional leaf stage of the main stems.
    pub fn mean_main_stem_leaf_stage(&self) -> f64 {
        let plants = &self.inner.plants;
        if plants.is_empty() {
            return 0.0;
        }
        let model = PhenologyModel::new(self.inner.params.development.clone());
        let total: f64 = plants
            .iter()
            .map(|p| {
                let ms = p.topology.main_stem();
                model.haun_stage(ms.start_tt, ms.final_leaf_number, self.inner.thermal_time)
            })
            .sum();
        total / plants.len() as f64
    }

    /// Mean number of main-stem leaves whose tip has emerged.
    pub fn mean_main_stem_visible_leaves(&self) -> f64 {
        let plants = &self.inner.plants;
        if plants.is_empty() {
            return 0.0;
        }
        let model = PhenologyModel::new(self.inner.params.development.clone());
        let tt = self.inner.thermal_time;
        let total: usize = plants
            .iter()
            .map(|p| {
                let ms = p.topology.main_stem();
                model
                    .emergence_schedule(ms.start_tt, ms.final_leaf_number)
                    .iter()
                    .take_while(|&&(_, emergence)| emergence <= tt)
                    .count()
            })
            .sum();
        total as f64 / plants.len() as f64
    }

    pub fn summary(&self) -> SnapshotSummary {
        let mut organ_stages: BTreeMap<String, usize> = BTreeMap::new();
        let mut metamers = 0;
        for plant in &self.inner.plants {
            metamers += plant.topology.metamers.len();
            for stage in DevelopmentStage::ALL {
                let n = plant.topology.count_organs_in(stage);
                *organ_stages.entry(stage.name().to_string()).or_default() += n;
            }
        }
        SnapshotSummary {
            date: self.date(),
            thermal_time: self.thermal_time(),
            plants: self.inner.plants.len(),
            axes: self.axis_count(),
            living_axes: self.living_axis_count(),
            metamers,
            organ_stages,
            leaf_area: self.leaf_area(),
            leaf_area_index: self.leaf_area_index(),
            main_stem_leaf_stage: self.mean_main_stem_leaf_stage(),
            main_stem_visible_leaves: self.mean_main_stem_visible_leaves(),
        }
    }
}

/// Aggregated view of a snapshot for reports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub date: NaiveDate,
    pub thermal_time: ThermalTime,
    pub plants: usize,
    pub axes: usize,
    pub living_axes: usize,
    pub metamers: usize,
    pub organ_stages: BTreeMap<String, usize>,
    pub leaf_area: f64,
    pub leaf_area_index: f64,
    pub main_stem_leaf_stage: f64,
    pub main_stem_visible_leaves: f64,
}

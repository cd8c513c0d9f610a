//! Thermal-time driven architecture of graminaceous crop canopies.
//!
//! Main components:
//! - [`params`]: validated genotype parameter tables.
//! - [`thermal`]: temperature series and the thermal-time clock.
//! - [`phenology`]: organ development stages and their thresholds.
//! - [`dimensions`]: allometric, noisy organ dimensions and orientations.
//! - [`tillering`]: tiller emission, regression and leaf numbers.
//! - [`topology`]: plant/axis/metamer/organ arena.
//! - [`stand`]: plant positions in the plot.
//! - [`shapes`]: reference blade shapes.
//! - [`geometry`]: triangulated organ meshes.
//! - [`phases`]: per-date update pipeline of a plant.
//! - [`simulation`]: date-by-date driver.
//! - [`snapshot`]: immutable per-date canopy state.
//! - [`scene`]: flat scene export.
//! - [`config`]: run configuration.
//! - [`rng`]: seed-derived random streams.
//! - [`error`]: error type.
//! - [`types`]: shared type aliases and IDs.

pub mod config;
pub mod dimensions;
pub mod error;
pub mod geometry;
pub mod params;
pub mod phases;
pub mod phenology;
pub mod rng;
pub mod scene;
pub mod shapes;
pub mod simulation;
pub mod snapshot;
pub mod stand;
pub mod thermal;
pub mod tillering;
pub mod topology;
pub mod types;

pub use config::SimConfig;
pub use error::{SimError, SimResult};
pub use params::{GenotypeParameters, ParameterTable};
pub use simulation::{RunReport, Simulation};
pub use snapshot::CanopySnapshot;
pub use thermal::TemperatureSeries;

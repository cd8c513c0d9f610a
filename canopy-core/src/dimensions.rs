//! Organ dimensions and orientations.
//!
//! Mean dimensions come from rank-based allometric profiles along the axis.
//! Each organ then receives a multiplicative noise factor, drawn once from
//! its own random stream, so re-running a simulation with the same seed
//! reproduces every organ exactly.

use crate::params::{DimensionParameters, OrientationParameters};
use crate::rng::{Purpose, RandomStream, axis_stream, metamer_stream};
use crate::types::{AxisKey, OrganKind, PlantId};
use rand::Rng;
use rand_distr::{Distribution, LogNormal, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Rejection attempts before a Normal factor is clamped instead.
const MAX_REJECTIONS: usize = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseKind {
    #[default]
    Normal,
    LogNormal,
}

/// Multiplicative noise with mean 1, bounded to `[min_factor, max_factor]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionNoise {
    pub kind: NoiseKind,
    /// Coefficient of variation.
    pub cv: f64,
    pub min_factor: f64,
    pub max_factor: f64,
}

impl Default for DimensionNoise {
    fn default() -> Self {
        Self {
            kind: NoiseKind::Normal,
            cv: 0.1,
            min_factor: 0.7,
            max_factor: 1.3,
        }
    }
}

impl DimensionNoise {
    /// No noise at all.
    pub fn none() -> Self {
        Self {
            cv: 0.0,
            ..Self::default()
        }
    }

    pub fn sample_factor(&self, rng: &mut RandomStream) -> f64 {
        if self.cv <= 0.0 {
            return 1.0;
        }
        let raw = match self.kind {
            NoiseKind::Normal => {
                let Ok(dist) = Normal::new(1.0, self.cv) else {
                    return 1.0;
                };
                let mut draw = dist.sample(rng);
                for _ in 0..MAX_REJECTIONS {
                    if (self.min_factor..=self.max_factor).contains(&draw) {
                        break;
                    }
                    draw = dist.sample(rng);
                }
                draw
            }
            NoiseKind::LogNormal => {
                // Parameters chosen so that the factor has mean 1.
                let sigma2 = (1.0 + self.cv * self.cv).ln();
                let Ok(dist) = LogNormal::new(-0.5 * sigma2, sigma2.sqrt()) else {
                    return 1.0;
                };
                dist.sample(rng)
            }
        };
        raw.clamp(self.min_factor, self.max_factor)
    }
}

/// Final dimensions of an organ, in metres and square metres.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganDimensions {
    pub length: f64,
    pub width: f64,
    /// Blade: one-sided area. Other organs: projected `length × width`.
    pub area: f64,
}

/// Orientation of an organ relative to its axis, in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganOrientation {
    /// Azimuth of insertion around the axis.
    pub azimuth: f64,
    /// Insertion angle from the axis direction.
    pub inclination: f64,
    /// Bending accumulated from base to tip.
    pub curvature: f64,
}

/// Direction of an axis, in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AxisOrientation {
    pub azimuth: f64,
    /// Angle from the vertical.
    pub inclination: f64,
}

fn gaussian(rng: &mut RandomStream, mean: f64, sd: f64) -> f64 {
    match Normal::new(mean, sd) {
        Ok(dist) if sd > 0.0 => dist.sample(rng),
        _ => mean,
    }
}

/// Samples organ dimensions and orientations for one genotype.
#[derive(Clone, Copy, Debug)]
pub struct OrganDimensionSampler<'a> {
    dims: &'a DimensionParameters,
    orient: &'a OrientationParameters,
    seed: u64,
}

impl<'a> OrganDimensionSampler<'a> {
    pub fn new(dims: &'a DimensionParameters, orient: &'a OrientationParameters, seed: u64) -> Self {
        Self { dims, orient, seed }
    }

    /// Mean dimensions of the `kind` organ of metamer `rank` on an axis of
    /// `leaf_number` leaves, before noise.
    pub fn allometric(
        &self,
        key: &AxisKey,
        rank: u32,
        leaf_number: u32,
        kind: OrganKind,
    ) -> OrganDimensions {
        let d = self.dims;
        let n = leaf_number.max(1);
        let x = f64::from(rank) / f64::from(n);
        let scale = if key.is_main_stem() {
            1.0
        } else {
            d.tiller_dimension_factor
        };

        let (length, width) = match kind {
            OrganKind::Blade => {
                let z = (x - d.blade_length_peak) / d.blade_length_spread;
                let length = d.blade_length_max * (-0.5 * z * z).exp();
                let width = d.blade_width_min + (d.blade_width_max - d.blade_width_min) * x;
                (length, width)
            }
            OrganKind::Sheath => (d.sheath_length_max * x, d.stem_diameter),
            OrganKind::Internode => {
                let first_elongated = n.saturating_sub(d.elongated_internodes);
                let length = if rank > first_elongated && d.elongated_internodes > 0 {
                    let k = rank - first_elongated;
                    d.internode_length_max * f64::from(k)
                        / f64::from(d.elongated_internodes.min(n))
                } else {
                    0.0
                };
                (length, d.stem_diameter)
            }
            OrganKind::Ear => (d.ear_length, d.ear_width),
        };
        self.finish(kind, length * scale, width, 1.0, 1.0)
    }

    fn finish(
        &self,
        kind: OrganKind,
        length: f64,
        width: f64,
        length_factor: f64,
        width_factor: f64,
    ) -> OrganDimensions {
        let length = (length * length_factor).max(0.0);
        let width = (width * width_factor).max(0.0);
        let area = match kind {
            OrganKind::Blade => length * width * self.dims.blade_shape_factor,
            _ => length * width,
        };
        OrganDimensions {
            length,
            width,
            area,
        }
    }

    /// Dimensions of one organ, noise included.
    ///
    /// Length and width receive independent factors drawn from the organ's
    /// own stream.
    pub fn sample(
        &self,
        plant: PlantId,
        key: &AxisKey,
        rank: u32,
        leaf_number: u32,
        kind: OrganKind,
    ) -> OrganDimensions {
        let mean = self.allometric(key, rank, leaf_number, kind);
        let mut rng = metamer_stream(self.seed, plant, key, rank, Purpose::Dimension(kind));
        let lf = self.dims.noise.sample_factor(&mut rng);
        let wf = self.dims.noise.sample_factor(&mut rng);
        self.finish(kind, mean.length, mean.width, lf, wf)
    }

    /// Orientation of one organ around an axis whose azimuth is `axis_azimuth`.
    ///
    /// Leaves alternate on opposite sides (distichous phyllotaxy) with a
    /// small angular deviation. Only blades are inclined and curved.
    pub fn sample_orientation(
        &self,
        plant: PlantId,
        key: &AxisKey,
        rank: u32,
        kind: OrganKind,
        axis_azimuth: f64,
    ) -> OrganOrientation {
        let o = self.orient;
        let mut rng = metamer_stream(self.seed, plant, key, rank, Purpose::Orientation(kind));
        let deviation = gaussian(&mut rng, 0.0, o.phyllotaxy_noise.to_radians());
        let azimuth = (axis_azimuth + f64::from(rank) * PI + deviation).rem_euclid(TAU);
        if kind != OrganKind::Blade {
            return OrganOrientation {
                azimuth,
                ..OrganOrientation::default()
            };
        }
        let inclination = gaussian(&mut rng, o.blade_inclination_mean, o.blade_inclination_sd)
            .clamp(o.blade_inclination_min, o.blade_inclination_max)
            .to_radians();
        let curvature = gaussian(&mut rng, o.blade_curvature_mean, o.blade_curvature_sd);
        OrganOrientation {
            azimuth,
            inclination,
            curvature,
        }
    }

    /// Orientation of an axis. The main stem is vertical and faces
    /// `plant_azimuth`; tillers lean outwards in a random direction.
    pub fn axis_orientation(&self, plant: PlantId, key: &AxisKey, plant_azimuth: f64) -> AxisOrientation {
        if key.is_main_stem() {
            return AxisOrientation {
                azimuth: plant_azimuth,
                inclination: 0.0,
            };
        }
        let o = self.orient;
        let mut rng = axis_stream(self.seed, plant, key, Purpose::AxisOrientation);
        let azimuth = rng.random_range(0.0..TAU);
        let inclination = gaussian(&mut rng, o.tiller_inclination_mean, o.tiller_inclination_sd)
            .clamp(0.0, 90.0)
            .to_radians();
        AxisOrientation {
            azimuth,
            inclination,
        }
    }
}

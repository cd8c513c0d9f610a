//! Plant positions in the plot.
//!
//! Plants sit on a row grid sized from the sowing density, each displaced by
//! a seeded jitter and given a random azimuth. Plants near the plot edges can
//! be mirrored across the borders so a scene tiles without gaps.

use crate::rng::{Purpose, plant_stream};
use crate::types::PlantId;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

/// Base of a plant in the plot, in metres; `azimuth` in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PlantPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub azimuth: f64,
}

/// Copy of a border plant shifted by a plot width and/or height.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MirroredPlant {
    pub source: PlantId,
    pub offset: [f64; 2],
}

/// Inputs of the stand generator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StandSpec {
    /// Plants per square metre.
    pub density: f64,
    pub plot_width: f64,
    pub plot_height: f64,
    /// Distance between rows; a square-ish grid when `None`.
    pub row_spacing: Option<f64>,
    /// Jitter amplitude as a fraction of the grid cell.
    pub jitter_fraction: f64,
    pub wrap_borders: bool,
    /// Distance from an edge under which plants are mirrored; one row by default.
    pub border_margin: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StandLayout {
    pub width: f64,
    pub height: f64,
    pub rows: usize,
    pub positions: Vec<PlantPosition>,
    pub mirrors: Vec<MirroredPlant>,
}

impl StandLayout {
    pub fn plant_count(&self) -> usize {
        self.positions.len()
    }

    /// Plants per square metre actually sown.
    pub fn observed_density(&self) -> f64 {
        let area = self.width * self.height;
        if area > 0.0 {
            self.positions.len() as f64 / area
        } else {
            0.0
        }
    }

    pub fn mirror_position(&self, mirror: &MirroredPlant) -> PlantPosition {
        let p = self.positions[mirror.source];
        PlantPosition {
            x: p.x + mirror.offset[0],
            y: p.y + mirror.offset[1],
            ..p
        }
    }

    pub fn contains(&self, p: &PlantPosition) -> bool {
        (0.0..=self.width).contains(&p.x) && (0.0..=self.height).contains(&p.y)
    }
}

/// Number of plants of row `row` when `n` plants are split over `rows` rows.
fn plants_in_row(n: usize, rows: usize, row: usize) -> usize {
    n / rows + usize::from(row < n % rows)
}

/// Lays out `round(density × area)` plants on a jittered grid.
///
/// Rows are spread evenly along `y`, plants evenly along each row. Jitter
/// keeps every plant inside its own grid cell, so the plot bounds always
/// hold. Each plant draws its jitter and azimuth from its own stream.
pub fn generate_stand(spec: &StandSpec, seed: u64) -> StandLayout {
    let (width, height) = (spec.plot_width, spec.plot_height);
    let n = (spec.density * width * height).round().max(0.0) as usize;
    if n == 0 {
        return StandLayout {
            width,
            height,
            ..StandLayout::default()
        };
    }

    let row_spacing = spec.row_spacing.unwrap_or(1.0 / spec.density.sqrt());
    let rows = ((height / row_spacing).round() as usize).clamp(1, n);
    let dy = height / rows as f64;

    let mut positions = Vec::with_capacity(n);
    for row in 0..rows {
        let m = plants_in_row(n, rows, row);
        let dx = width / m as f64;
        for j in 0..m {
            let id = positions.len();
            let mut rng = plant_stream(seed, id, Purpose::Stand);
            let jx = rng.random_range(-0.5..=0.5) * spec.jitter_fraction * dx;
            let jy = rng.random_range(-0.5..=0.5) * spec.jitter_fraction * dy;
            let azimuth = rng.random_range(0.0..TAU);
            positions.push(PlantPosition {
                x: ((j as f64 + 0.5) * dx + jx).clamp(0.0, width),
                y: ((row as f64 + 0.5) * dy + jy).clamp(0.0, height),
                z: 0.0,
                azimuth,
            });
        }
    }

    let mirrors = if spec.wrap_borders {
        let margin = spec.border_margin.unwrap_or(dy);
        mirror_borders(&positions, width, height, margin)
    } else {
        Vec::new()
    };

    tracing::debug!(plants = n, rows, mirrors = mirrors.len(), "stand generated");
    StandLayout {
        width,
        height,
        rows,
        positions,
        mirrors,
    }
}

/// Copies plants within `margin` of an edge across the opposite edge,
/// corners included.
fn mirror_borders(
    positions: &[PlantPosition],
    width: f64,
    height: f64,
    margin: f64,
) -> Vec<MirroredPlant> {
    let shifts = |v: f64, extent: f64| -> Vec<f64> {
        let mut s = vec![0.0];
        if v < margin {
            s.push(extent);
        }
        if v > extent - margin {
            s.push(-extent);
        }
        s
    };
    let mut mirrors = Vec::new();
    for (source, p) in positions.iter().enumerate() {
        for &ox in &shifts(p.x, width) {
            for &oy in &shifts(p.y, height) {
                if ox != 0.0 || oy != 0.0 {
                    mirrors.push(MirroredPlant {
                        source,
                        offset: [ox, oy],
                    });
                }
            }
        }
    }
    mirrors
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn spec(density: f64) -> StandSpec {
        StandSpec {
            density,
            plot_width: 1.0,
            plot_height: 1.0,
            row_spacing: None,
            jitter_fraction: 0.0,
            wrap_borders: false,
            border_margin: None,
        }
    }

    #[test]
    fn exact_grid_without_jitter() {
        let layout = generate_stand(&spec(250.0), 42);
        assert_eq!(layout.plant_count(), 250);
        // 1/sqrt(250) spacing gives 16 rows: ten of 16 plants, six of 15.
        assert_eq!(layout.rows, 16);
        let first = layout.positions[0];
        assert_relative_eq!(first.x, 0.5 / 16.0);
        assert_relative_eq!(first.y, 0.5 / 16.0);
        let last = layout.positions[249];
        assert_relative_eq!(last.x, 14.5 / 15.0);
        assert_relative_eq!(last.y, 15.5 / 16.0);
    }

    #[test]
    fn rows_follow_row_spacing() {
        let mut s = spec(200.0);
        s.row_spacing = Some(0.2);
        let layout = generate_stand(&s, 1);
        assert_eq!(layout.rows, 5);
        assert_eq!(layout.plant_count(), 200);
        assert_relative_eq!(layout.observed_density(), 200.0);
    }

    #[test]
    fn mirrors_cover_borders_and_corners() {
        let mut s = spec(4.0);
        s.wrap_borders = true;
        s.border_margin = Some(0.3);
        let layout = generate_stand(&s, 1);
        // Four plants at the quarter points, each near two edges and a corner.
        assert_eq!(layout.plant_count(), 4);
        assert_eq!(layout.mirrors.len(), 12);
        for m in &layout.mirrors {
            assert!(!layout.contains(&layout.mirror_position(m)));
        }
    }

    #[test]
    fn same_seed_same_stand() {
        let mut s = spec(120.0);
        s.jitter_fraction = 0.5;
        assert_eq!(generate_stand(&s, 9), generate_stand(&s, 9));
        assert_ne!(generate_stand(&s, 9), generate_stand(&s, 10));
    }

    proptest! {
        #[test]
        fn plant_count_is_exact_and_in_bounds(
            density in 1.0f64..400.0,
            width in 0.2f64..3.0,
            height in 0.2f64..3.0,
            jitter in 0.0f64..=1.0,
            row_spacing in proptest::option::of(0.05f64..0.5),
            seed in any::<u64>(),
        ) {
            let s = StandSpec {
                density,
                plot_width: width,
                plot_height: height,
                row_spacing,
                jitter_fraction: jitter,
                wrap_borders: true,
                border_margin: None,
            };
            let layout = generate_stand(&s, seed);
            prop_assert_eq!(layout.plant_count(), (density * width * height).round() as usize);
            for p in &layout.positions {
                prop_assert!(layout.contains(p));
            }
        }
    }
}

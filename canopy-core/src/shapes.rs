//! Reference blade shapes keyed by shape class.
//!
//! A shape is a profile sampled along the normalised blade length `s`
//! (0 at the ligule, 1 at the tip): relative width and the extra bending
//! of the reference midrib. The geometry builder scales the profile to the
//! current blade size and adds the sampled inclination and curvature.

use crate::error::{SimError, SimResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapePoint {
    pub s: f64,
    /// Width relative to the blade width, in `[0, 1]`.
    pub width: f64,
    /// Reference heading change since the ligule, in radians.
    pub bend: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BladeShape {
    pub points: Vec<ShapePoint>,
}

impl BladeShape {
    /// Parametric blade: width rises from `base_width` to its maximum at
    /// `widest`, then tapers to a tip whose sharpness grows with `taper`.
    /// The reference midrib bends by `curl × s²`.
    pub fn parametric(stations: usize, base_width: f64, widest: f64, taper: f64, curl: f64) -> Self {
        let stations = stations.max(2);
        let raw: Vec<(f64, f64)> = (0..stations)
            .map(|i| {
                let s = i as f64 / (stations - 1) as f64;
                let rise = base_width + (1.0 - base_width) * (s / widest).min(1.0);
                let tip = (1.0 - ((s - widest).max(0.0) / (1.0 - widest)).powf(taper)).max(0.0);
                (s, rise * tip)
            })
            .collect();
        let max = raw.iter().map(|&(_, w)| w).fold(0.0, f64::max);
        let points = raw
            .into_iter()
            .map(|(s, w)| ShapePoint {
                s,
                width: if max > 0.0 { w / max } else { 0.0 },
                bend: curl * s * s,
            })
            .collect();
        Self { points }
    }

    fn validate(&self, class: u32) -> SimResult<()> {
        let field = format!("shapes.{class}");
        let first = self.points.first().map(|p| p.s);
        let last = self.points.last().map(|p| p.s);
        if self.points.len() < 2 || first != Some(0.0) || last != Some(1.0) {
            return Err(SimError::config(
                field,
                "a shape needs at least two points spanning s = 0 to s = 1",
            ));
        }
        if self.points.windows(2).any(|w| w[1].s <= w[0].s) {
            return Err(SimError::config(field, "stations must be strictly increasing"));
        }
        if self
            .points
            .iter()
            .any(|p| !p.width.is_finite() || !p.bend.is_finite() || !(0.0..=1.0).contains(&p.width))
        {
            return Err(SimError::config(field, "widths must lie in [0, 1] and bends be finite"));
        }
        Ok(())
    }

    /// Relative width and bend at `s`, interpolated linearly.
    pub fn at(&self, s: f64) -> (f64, f64) {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return (0.0, 0.0);
        };
        let s = s.clamp(0.0, 1.0);
        let i = self.points.partition_point(|p| p.s < s);
        if i == 0 {
            return (first.width, first.bend);
        }
        let Some(&b) = self.points.get(i) else {
            return (last.width, last.bend);
        };
        let a = self.points[i - 1];
        let t = (s - a.s) / (b.s - a.s);
        (a.width + t * (b.width - a.width), a.bend + t * (b.bend - a.bend))
    }
}

/// Shape classes available to the geometry builder.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeDatabase {
    classes: BTreeMap<u32, BladeShape>,
}

impl ShapeDatabase {
    /// Classes 0 to 3, from short curled basal blades to long upper ones.
    pub fn builtin() -> Self {
        let mut classes = BTreeMap::new();
        classes.insert(0, BladeShape::parametric(21, 0.55, 0.25, 1.6, 0.9));
        classes.insert(1, BladeShape::parametric(21, 0.5, 0.3, 1.8, 0.6));
        classes.insert(2, BladeShape::parametric(21, 0.45, 0.35, 2.0, 0.4));
        classes.insert(3, BladeShape::parametric(21, 0.4, 0.4, 2.4, 0.2));
        Self { classes }
    }

    /// Adds or replaces a class.
    pub fn register(&mut self, class: u32, shape: BladeShape) -> SimResult<()> {
        shape.validate(class)?;
        self.classes.insert(class, shape);
        Ok(())
    }

    pub fn get(&self, class: u32) -> Option<&BladeShape> {
        self.classes.get(&class)
    }

    pub fn contains(&self, class: u32) -> bool {
        self.classes.contains_key(&class)
    }

    pub fn classes(&self) -> impl Iterator<Item = u32> + '_ {
        self.classes.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn builtin_shapes_are_valid() {
        let db = ShapeDatabase::builtin();
        assert_eq!(db.classes().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
        for class in db.classes() {
            let shape = db.get(class).unwrap();
            assert!(shape.validate(class).is_ok());
            let (tip, _) = shape.at(1.0);
            assert_relative_eq!(tip, 0.0, epsilon = 1e-12);
            let widest = shape.points.iter().map(|p| p.width).fold(0.0, f64::max);
            assert_relative_eq!(widest, 1.0);
        }
    }

    #[test]
    fn interpolation_is_linear_between_stations() {
        let shape = BladeShape {
            points: vec![
                ShapePoint { s: 0.0, width: 0.0, bend: 0.0 },
                ShapePoint { s: 1.0, width: 1.0, bend: 2.0 },
            ],
        };
        assert_eq!(shape.at(0.25), (0.25, 0.5));
        assert_eq!(shape.at(-1.0), (0.0, 0.0));
        assert_eq!(shape.at(2.0), (1.0, 2.0));
    }

    #[test]
    fn register_rejects_malformed_shapes() {
        let mut db = ShapeDatabase::builtin();
        let bad = BladeShape {
            points: vec![ShapePoint { s: 0.0, width: 1.0, bend: 0.0 }],
        };
        assert!(db.register(7, bad).is_err());
        assert!(!db.contains(7));
        assert!(db.register(7, BladeShape::parametric(5, 0.5, 0.5, 2.0, 0.0)).is_ok());
        assert!(db.contains(7));
    }
}

use crate::error::{SimError, SimResult, read_to_string};
use crate::geometry::GeometryOptions;
use crate::stand::StandSpec;
use crate::tillering::LeafNumberAssignment;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Run configuration: stand, clock and output settings.
///
/// Dates are written as quoted ISO strings in TOML:
///
/// ```toml
/// density = 250.0
/// random_seed = 42
/// date_sequence = ["2010-11-01", "2010-12-01"]
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Sowing density in plants per square metre.
    pub density: f64,
    /// Distance between rows in metres; square-ish grid when absent.
    pub row_spacing: Option<f64>,
    /// Position jitter as a fraction of the grid cell, in `[0, 1]`.
    pub jitter_fraction: f64,
    pub plot_width: f64,
    pub plot_height: f64,
    /// Mirror border plants across the opposite edges.
    pub wrap_borders: bool,
    /// Border distance under which plants are mirrored; one row spacing when absent.
    pub border_margin: Option<f64>,
    /// Seed of every random stream in the run.
    pub random_seed: u64,
    /// Dates to simulate, strictly increasing.
    pub date_sequence: Vec<NaiveDate>,
    /// Base temperature (°C) used when the genotype row has none.
    pub base_temperature: f64,
    /// Genotype row to simulate; optional for single-row tables.
    pub genotype: Option<String>,
    /// Restricts row selection to this sowing date.
    pub sowing_date: Option<NaiveDate>,
    pub leaf_number_assignment: LeafNumberAssignment,
    pub geometry: GeometryOptions,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            density: 250.0,
            row_spacing: Some(0.15),
            jitter_fraction: 0.2,
            plot_width: 1.0,
            plot_height: 1.0,
            wrap_borders: true,
            border_margin: None,
            random_seed: 42,
            date_sequence: Vec::new(),
            base_temperature: 0.0,
            genotype: None,
            sowing_date: None,
            leaf_number_assignment: LeafNumberAssignment::Sampled,
            geometry: GeometryOptions::default(),
        }
    }
}

fn positive(field: &str, value: f64) -> SimResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::config(
            field,
            format!("must be positive and finite (got {value})"),
        ))
    }
}

impl SimConfig {
    pub fn from_toml_str(s: &str) -> SimResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> SimResult<Self> {
        Self::from_toml_str(&read_to_string(path.as_ref())?)
    }

    pub fn to_toml_string(&self) -> SimResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> SimResult<()> {
        self.validate_stand()?;
        self.validate_dates()?;
        self.validate_geometry()?;
        Ok(())
    }

    fn validate_stand(&self) -> SimResult<()> {
        positive("density", self.density)?;
        positive("plot_width", self.plot_width)?;
        positive("plot_height", self.plot_height)?;
        if let Some(spacing) = self.row_spacing {
            positive("row_spacing", spacing)?;
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(SimError::config(
                "jitter_fraction",
                format!("must be within [0, 1] (got {})", self.jitter_fraction),
            ));
        }
        if let Some(margin) = self.border_margin {
            let limit = 0.5 * self.plot_width.min(self.plot_height);
            if !(margin.is_finite() && (0.0..=limit).contains(&margin)) {
                return Err(SimError::config(
                    "border_margin",
                    format!("must be within [0, {limit}] (got {margin})"),
                ));
            }
        }
        Ok(())
    }

    fn validate_dates(&self) -> SimResult<()> {
        if !self.base_temperature.is_finite() {
            return Err(SimError::config("base_temperature", "must be finite"));
        }
        if let Some(w) = self.date_sequence.windows(2).find(|w| w[1] <= w[0]) {
            return Err(SimError::config(
                "date_sequence",
                format!("dates must be strictly increasing ({} then {})", w[0], w[1]),
            ));
        }
        Ok(())
    }

    fn validate_geometry(&self) -> SimResult<()> {
        let g = &self.geometry;
        if g.tube_sides < 3 {
            return Err(SimError::config("geometry.tube_sides", "must be at least 3"));
        }
        if g.blade_stations < 2 {
            return Err(SimError::config("geometry.blade_stations", "must be at least 2"));
        }
        if g.ear_rings < 3 {
            return Err(SimError::config("geometry.ear_rings", "must be at least 3"));
        }
        Ok(())
    }

    pub fn stand_spec(&self) -> StandSpec {
        StandSpec {
            density: self.density,
            plot_width: self.plot_width,
            plot_height: self.plot_height,
            row_spacing: self.row_spacing,
            jitter_fraction: self.jitter_fraction,
            wrap_borders: self.wrap_borders,
            border_margin: self.border_margin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn parses_dates_and_keeps_defaults() {
        let config = SimConfig::from_toml_str(
            r#"
            density = 180.0
            date_sequence = ["2010-11-01", "2010-12-01"]
            leaf_number_assignment = "deterministic"

            [geometry]
            tube_sides = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.density, 180.0);
        assert_eq!(config.date_sequence.len(), 2);
        assert_eq!(config.leaf_number_assignment, LeafNumberAssignment::Deterministic);
        assert_eq!(config.geometry.tube_sides, 6);
        assert_eq!(config.geometry.blade_stations, 12);
        assert_eq!(config.random_seed, 42);
    }

    #[test]
    fn round_trips_through_toml() {
        let mut config = SimConfig::default();
        config.date_sequence = vec![NaiveDate::from_ymd_opt(2011, 3, 1).unwrap()];
        config.genotype = Some("Mercia".into());
        let parsed = SimConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn rejects_non_increasing_dates() {
        let err = SimConfig::from_toml_str(r#"date_sequence = ["2010-12-01", "2010-12-01"]"#)
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidConfig { ref field, .. } if field == "date_sequence"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad = [
            "density = 0.0",
            "jitter_fraction = 1.5",
            "row_spacing = -0.1",
            "border_margin = 0.9",
            "[geometry]\ntube_sides = 2",
        ];
        for src in bad {
            assert!(
                matches!(SimConfig::from_toml_str(src), Err(SimError::InvalidConfig { .. })),
                "{src} should be rejected"
            );
        }
    }
}

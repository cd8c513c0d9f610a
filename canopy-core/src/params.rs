//! Genotype parameter table.
//!
//! The table is produced by the external fitting workflow and consumed as a
//! read-only artifact. Every row is validated eagerly when the table is
//! loaded; nothing downstream re-checks ranges.
//!
//! ```toml
//! [[genotypes]]
//! genotype = "Mercia"
//! sowing_density = 250.0
//! sowing_date = "2010-10-15"
//!
//! [genotypes.development]
//! phyllochron = 110.0
//! ms_leaf_number_probabilities = [
//!     { leaves = 11, probability = 0.3 },
//!     { leaves = 12, probability = 0.7 },
//! ]
//! ```

use crate::dimensions::DimensionNoise;
use crate::error::{SimError, SimResult, read_to_string};
use crate::tillering::leaf_number_modalities;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Probability that the main stem ends with `leaves` leaves.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LeafNumberProbability {
    pub leaves: u32,
    pub probability: f64,
}

/// Probability that an axis of the given cohort is emitted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CohortProbability {
    pub cohort: u32,
    pub probability: f64,
}

/// Leaf appearance, growth and senescence timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevelopmentParameters {
    /// Thermal time between successive leaf collars (°C·day).
    pub phyllochron: f64,
    /// Phyllochron multiplier applied to the first `early_leaf_count` leaves.
    pub early_leaf_factor: f64,
    pub early_leaf_count: u32,
    /// Leaf extension duration, in phyllochrons.
    pub leaf_extension_phyllochrons: f64,
    /// Fraction of the extension duration spent in the `emerging` stage.
    pub emerging_fraction: f64,
    /// Thermal time an organ stays mature before senescence starts.
    pub mature_lifespan: f64,
    /// Fraction of the organ senescing per degree-day.
    pub senescence_rate: f64,
    /// Delay between the last collar and ear appearance, in phyllochrons.
    pub ear_delay_phyllochrons: f64,
    /// Steepness of the normalised logistic growth curve.
    pub growth_steepness: f64,
    /// Thermal time from sowing to the start of main stem development.
    pub emergence_delay: f64,
    pub ms_leaf_number_probabilities: Vec<LeafNumberProbability>,
    /// Fractional mean main-stem leaf number. When set, it replaces
    /// `ms_leaf_number_probabilities` by its two neighbouring integers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms_leaf_number_mean: Option<f64>,
}

impl Default for DevelopmentParameters {
    fn default() -> Self {
        Self {
            phyllochron: 110.0,
            early_leaf_factor: 0.75,
            early_leaf_count: 2,
            leaf_extension_phyllochrons: 1.6,
            emerging_fraction: 0.2,
            mature_lifespan: 500.0,
            senescence_rate: 0.004,
            ear_delay_phyllochrons: 1.5,
            growth_steepness: 8.0,
            emergence_delay: 100.0,
            ms_leaf_number_probabilities: vec![
                LeafNumberProbability {
                    leaves: 11,
                    probability: 0.3,
                },
                LeafNumberProbability {
                    leaves: 12,
                    probability: 0.7,
                },
            ],
            ms_leaf_number_mean: None,
        }
    }
}

/// Tiller emission and regression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilleringParameters {
    /// Global multiplier of the cohort emission probabilities, in [0, 1].
    pub tillering_potential: f64,
    pub cohort_probabilities: Vec<CohortProbability>,
    /// Cohort offset between a parent axis and its first child.
    pub first_child_delay: u32,
    /// Highest branching order allowed (1 = primary tillers only).
    pub max_tiller_order: u32,
    /// Thermal time between parent metamer emergence and tiller appearance.
    pub tiller_delay: f64,
    /// Stand density (plants/m²) above which tillers may regress.
    pub regression_density_threshold: f64,
    pub regression_base: f64,
    /// Increase of regression probability per plant/m² above the threshold.
    pub regression_slope: f64,
    pub tt_bolting: f64,
    pub tt_flowering: f64,
    /// Coefficients of `nff_tiller = a1 * nff_ms - a2 * cohort`.
    pub tiller_leaf_number_a1: f64,
    pub tiller_leaf_number_a2: f64,
}

impl Default for TilleringParameters {
    fn default() -> Self {
        Self {
            tillering_potential: 1.0,
            cohort_probabilities: vec![
                CohortProbability {
                    cohort: 3,
                    probability: 0.95,
                },
                CohortProbability {
                    cohort: 4,
                    probability: 0.9,
                },
                CohortProbability {
                    cohort: 5,
                    probability: 0.7,
                },
                CohortProbability {
                    cohort: 6,
                    probability: 0.4,
                },
                CohortProbability {
                    cohort: 7,
                    probability: 0.1,
                },
            ],
            first_child_delay: 2,
            max_tiller_order: 1,
            tiller_delay: 250.0,
            regression_density_threshold: 150.0,
            regression_base: 0.2,
            regression_slope: 0.004,
            tt_bolting: 900.0,
            tt_flowering: 1450.0,
            tiller_leaf_number_a1: 0.9423,
            tiller_leaf_number_a2: 0.555,
        }
    }
}

/// Allometric envelopes of final organ dimensions (metres).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DimensionParameters {
    pub blade_length_max: f64,
    /// Normalised rank at which blade length peaks.
    pub blade_length_peak: f64,
    /// Width of the bell-shaped length profile, in normalised rank.
    pub blade_length_spread: f64,
    pub blade_width_min: f64,
    pub blade_width_max: f64,
    /// Ratio between blade area and length × width.
    pub blade_shape_factor: f64,
    pub sheath_length_max: f64,
    pub internode_length_max: f64,
    /// Number of elongating internodes at the top of an axis.
    pub elongated_internodes: u32,
    pub stem_diameter: f64,
    pub ear_length: f64,
    pub ear_width: f64,
    /// Length multiplier applied to all organs of tillers.
    pub tiller_dimension_factor: f64,
    pub noise: DimensionNoise,
}

impl Default for DimensionParameters {
    fn default() -> Self {
        Self {
            blade_length_max: 0.25,
            blade_length_peak: 0.85,
            blade_length_spread: 0.35,
            blade_width_min: 0.004,
            blade_width_max: 0.018,
            blade_shape_factor: 0.75,
            sheath_length_max: 0.18,
            internode_length_max: 0.35,
            elongated_internodes: 5,
            stem_diameter: 0.004,
            ear_length: 0.09,
            ear_width: 0.014,
            tiller_dimension_factor: 0.9,
            noise: DimensionNoise::default(),
        }
    }
}

/// Orientation envelopes and shape-class references.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationParameters {
    /// Blade insertion angle from the vertical (degrees).
    pub blade_inclination_mean: f64,
    pub blade_inclination_sd: f64,
    pub blade_inclination_min: f64,
    pub blade_inclination_max: f64,
    /// Extra bending accumulated along the blade (radians over full length).
    pub blade_curvature_mean: f64,
    pub blade_curvature_sd: f64,
    /// Deviation from strict alternate phyllotaxy (degrees).
    pub phyllotaxy_noise: f64,
    /// Tiller inclination from the vertical (degrees).
    pub tiller_inclination_mean: f64,
    pub tiller_inclination_sd: f64,
    /// Shape classes of the blade curve database, from bottom to top leaves.
    pub shape_classes: Vec<u32>,
}

impl Default for OrientationParameters {
    fn default() -> Self {
        Self {
            blade_inclination_mean: 40.0,
            blade_inclination_sd: 10.0,
            blade_inclination_min: 5.0,
            blade_inclination_max: 85.0,
            blade_curvature_mean: 1.2,
            blade_curvature_sd: 0.3,
            phyllotaxy_noise: 15.0,
            tiller_inclination_mean: 15.0,
            tiller_inclination_sd: 5.0,
            shape_classes: vec![0, 1, 2, 3],
        }
    }
}

/// One row of the parameter table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenotypeParameters {
    pub genotype: String,
    /// Density the row was fitted for (plants/m²).
    pub sowing_density: f64,
    pub sowing_date: NaiveDate,
    /// Base temperature of the thermal time clock; falls back to the
    /// configuration value when absent.
    #[serde(default)]
    pub base_temperature: Option<f64>,
    #[serde(default)]
    pub development: DevelopmentParameters,
    #[serde(default)]
    pub tillering: TilleringParameters,
    #[serde(default)]
    pub dimensions: DimensionParameters,
    #[serde(default)]
    pub orientation: OrientationParameters,
}

impl GenotypeParameters {
    /// A winter wheat row with the default envelopes.
    pub fn reference(genotype: &str, sowing_date: NaiveDate) -> Self {
        Self {
            genotype: genotype.to_string(),
            sowing_density: 250.0,
            sowing_date,
            base_temperature: None,
            development: DevelopmentParameters::default(),
            tillering: TilleringParameters::default(),
            dimensions: DimensionParameters::default(),
            orientation: OrientationParameters::default(),
        }
    }

    /// Checks every field; the first offending field is reported.
    pub fn validate(&self) -> SimResult<()> {
        let v = RowValidator { genotype: &self.genotype };
        if self.genotype.trim().is_empty() {
            return Err(v.fail("genotype", "must not be empty"));
        }
        v.positive("sowing_density", self.sowing_density)?;
        if let Some(t) = self.base_temperature {
            v.finite("base_temperature", t)?;
        }
        self.validate_development(&v)?;
        self.validate_tillering(&v)?;
        self.validate_dimensions(&v)?;
        self.validate_orientation(&v)?;
        Ok(())
    }

    fn validate_development(&self, v: &RowValidator) -> SimResult<()> {
        let d = &self.development;
        v.positive("development.phyllochron", d.phyllochron)?;
        v.positive("development.early_leaf_factor", d.early_leaf_factor)?;
        v.positive(
            "development.leaf_extension_phyllochrons",
            d.leaf_extension_phyllochrons,
        )?;
        v.fraction("development.emerging_fraction", d.emerging_fraction)?;
        v.non_negative("development.mature_lifespan", d.mature_lifespan)?;
        v.positive("development.senescence_rate", d.senescence_rate)?;
        v.non_negative("development.ear_delay_phyllochrons", d.ear_delay_phyllochrons)?;
        v.positive("development.growth_steepness", d.growth_steepness)?;
        v.non_negative("development.emergence_delay", d.emergence_delay)?;

        if let Some(mean) = d.ms_leaf_number_mean
            && !(mean.is_finite() && mean >= 1.0)
        {
            return Err(v.fail(
                "development.ms_leaf_number_mean",
                format!("must be a finite number of at least 1 (got {mean})"),
            ));
        }
        let probs = &d.ms_leaf_number_probabilities;
        if probs.is_empty() {
            return Err(v.fail(
                "development.ms_leaf_number_probabilities",
                "at least one leaf number is required",
            ));
        }
        for p in probs {
            if p.leaves == 0 {
                return Err(v.fail(
                    "development.ms_leaf_number_probabilities",
                    "leaf numbers must be at least 1",
                ));
            }
            v.fraction("development.ms_leaf_number_probabilities", p.probability)?;
        }
        let mut leaves: Vec<u32> = probs.iter().map(|p| p.leaves).collect();
        leaves.sort_unstable();
        leaves.dedup();
        if leaves.len() != probs.len() {
            return Err(v.fail(
                "development.ms_leaf_number_probabilities",
                "leaf numbers must be unique",
            ));
        }
        let total: f64 = probs.iter().map(|p| p.probability).sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(v.fail(
                "development.ms_leaf_number_probabilities",
                format!("probabilities must sum to 1 (got {total})"),
            ));
        }
        Ok(())
    }

    fn validate_tillering(&self, v: &RowValidator) -> SimResult<()> {
        let t = &self.tillering;
        v.fraction("tillering.tillering_potential", t.tillering_potential)?;
        for c in &t.cohort_probabilities {
            if c.cohort < 2 {
                return Err(v.fail(
                    "tillering.cohort_probabilities",
                    "cohort 1 is the main stem; tiller cohorts start at 2",
                ));
            }
            v.fraction("tillering.cohort_probabilities", c.probability)?;
        }
        if t.first_child_delay == 0 {
            return Err(v.fail("tillering.first_child_delay", "must be at least 1"));
        }
        v.non_negative("tillering.tiller_delay", t.tiller_delay)?;
        v.non_negative(
            "tillering.regression_density_threshold",
            t.regression_density_threshold,
        )?;
        v.fraction("tillering.regression_base", t.regression_base)?;
        v.non_negative("tillering.regression_slope", t.regression_slope)?;
        v.non_negative("tillering.tt_bolting", t.tt_bolting)?;
        v.non_negative("tillering.tt_flowering", t.tt_flowering)?;
        if t.tt_bolting > t.tt_flowering {
            return Err(v.fail(
                "tillering.tt_bolting",
                "bolting must not happen after flowering",
            ));
        }
        v.positive("tillering.tiller_leaf_number_a1", t.tiller_leaf_number_a1)?;
        v.non_negative("tillering.tiller_leaf_number_a2", t.tiller_leaf_number_a2)?;
        Ok(())
    }

    fn validate_dimensions(&self, v: &RowValidator) -> SimResult<()> {
        let d = &self.dimensions;
        v.non_negative("dimensions.blade_length_max", d.blade_length_max)?;
        v.fraction("dimensions.blade_length_peak", d.blade_length_peak)?;
        v.positive("dimensions.blade_length_spread", d.blade_length_spread)?;
        v.non_negative("dimensions.blade_width_min", d.blade_width_min)?;
        v.non_negative("dimensions.blade_width_max", d.blade_width_max)?;
        if d.blade_width_min > d.blade_width_max {
            return Err(v.fail(
                "dimensions.blade_width_min",
                "must not exceed blade_width_max",
            ));
        }
        v.fraction("dimensions.blade_shape_factor", d.blade_shape_factor)?;
        v.non_negative("dimensions.sheath_length_max", d.sheath_length_max)?;
        v.non_negative("dimensions.internode_length_max", d.internode_length_max)?;
        v.non_negative("dimensions.stem_diameter", d.stem_diameter)?;
        v.non_negative("dimensions.ear_length", d.ear_length)?;
        v.non_negative("dimensions.ear_width", d.ear_width)?;
        v.positive("dimensions.tiller_dimension_factor", d.tiller_dimension_factor)?;

        let n = &d.noise;
        v.non_negative("dimensions.noise.cv", n.cv)?;
        v.non_negative("dimensions.noise.min_factor", n.min_factor)?;
        v.positive("dimensions.noise.max_factor", n.max_factor)?;
        if n.min_factor > 1.0 || n.max_factor < 1.0 {
            return Err(v.fail(
                "dimensions.noise",
                "the envelope [min_factor, max_factor] must contain 1",
            ));
        }
        Ok(())
    }

    fn validate_orientation(&self, v: &RowValidator) -> SimResult<()> {
        let o = &self.orientation;
        v.angle("orientation.blade_inclination_min", o.blade_inclination_min)?;
        v.angle("orientation.blade_inclination_max", o.blade_inclination_max)?;
        if o.blade_inclination_min > o.blade_inclination_max {
            return Err(v.fail(
                "orientation.blade_inclination_min",
                "must not exceed blade_inclination_max",
            ));
        }
        v.angle("orientation.blade_inclination_mean", o.blade_inclination_mean)?;
        v.non_negative("orientation.blade_inclination_sd", o.blade_inclination_sd)?;
        v.finite("orientation.blade_curvature_mean", o.blade_curvature_mean)?;
        v.non_negative("orientation.blade_curvature_sd", o.blade_curvature_sd)?;
        v.non_negative("orientation.phyllotaxy_noise", o.phyllotaxy_noise)?;
        v.angle("orientation.tiller_inclination_mean", o.tiller_inclination_mean)?;
        v.non_negative("orientation.tiller_inclination_sd", o.tiller_inclination_sd)?;
        if o.shape_classes.is_empty() {
            return Err(v.fail(
                "orientation.shape_classes",
                "at least one shape class is required",
            ));
        }
        Ok(())
    }

    /// Main-stem leaf-number distribution as `(leaves, probability)` pairs,
    /// sorted by leaf number.
    pub fn leaf_number_distribution(&self) -> Vec<(u32, f64)> {
        if let Some(mean) = self.development.ms_leaf_number_mean {
            return leaf_number_modalities(mean)
                .into_iter()
                .filter(|&(_, p)| p > 0.0)
                .collect();
        }
        let mut out: Vec<(u32, f64)> = self
            .development
            .ms_leaf_number_probabilities
            .iter()
            .map(|p| (p.leaves, p.probability))
            .collect();
        out.sort_by_key(|&(leaves, _)| leaves);
        out
    }

    /// Shape class of the blade at `rank` on an axis of `leaf_number` leaves.
    pub fn shape_class(&self, rank: u32, leaf_number: u32) -> u32 {
        let classes = &self.orientation.shape_classes;
        if classes.is_empty() {
            return 0;
        }
        let x = f64::from(rank.saturating_sub(1)) / f64::from(leaf_number.max(1));
        let idx = ((x * classes.len() as f64).floor() as usize).min(classes.len() - 1);
        classes[idx]
    }
}

struct RowValidator<'a> {
    genotype: &'a str,
}

impl RowValidator<'_> {
    fn fail(&self, field: &str, reason: impl Into<String>) -> SimError {
        SimError::parameter(self.genotype, field, reason)
    }

    fn finite(&self, field: &str, value: f64) -> SimResult<()> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(self.fail(field, "must be finite"))
        }
    }

    fn positive(&self, field: &str, value: f64) -> SimResult<()> {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(self.fail(field, format!("must be positive and finite (got {value})")))
        }
    }

    fn non_negative(&self, field: &str, value: f64) -> SimResult<()> {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(self.fail(
                field,
                format!("must be non-negative and finite (got {value})"),
            ))
        }
    }

    fn fraction(&self, field: &str, value: f64) -> SimResult<()> {
        if value.is_finite() && (0.0..=1.0).contains(&value) {
            Ok(())
        } else {
            Err(self.fail(field, format!("must be within [0, 1] (got {value})")))
        }
    }

    fn angle(&self, field: &str, value: f64) -> SimResult<()> {
        if value.is_finite() && (0.0..=180.0).contains(&value) {
            Ok(())
        } else {
            Err(self.fail(field, format!("must be within [0, 180] degrees (got {value})")))
        }
    }
}

/// Validated genotype parameter table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterTable {
    pub genotypes: Vec<GenotypeParameters>,
}

impl ParameterTable {
    /// Builds a table from rows, validating each of them.
    pub fn new(genotypes: Vec<GenotypeParameters>) -> SimResult<Self> {
        let table = Self { genotypes };
        table.validate()?;
        Ok(table)
    }

    pub fn from_toml_str(s: &str) -> SimResult<Self> {
        let table: Self = toml::from_str(s)?;
        table.validate()?;
        Ok(table)
    }

    pub fn from_path(path: impl AsRef<Path>) -> SimResult<Self> {
        Self::from_toml_str(&read_to_string(path.as_ref())?)
    }

    pub fn to_toml_string(&self) -> SimResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates every row and the uniqueness of row keys
    /// (genotype, sowing density, sowing date).
    pub fn validate(&self) -> SimResult<()> {
        if self.genotypes.is_empty() {
            return Err(SimError::parameter("<table>", "genotypes", "table is empty"));
        }
        for (i, row) in self.genotypes.iter().enumerate() {
            row.validate()?;
            let duplicate = self.genotypes[..i].iter().any(|other| {
                other.genotype == row.genotype
                    && other.sowing_date == row.sowing_date
                    && other.sowing_density == row.sowing_density
            });
            if duplicate {
                return Err(SimError::parameter(
                    &row.genotype,
                    "genotype",
                    "duplicate row for the same genotype, density and sowing date",
                ));
            }
        }
        Ok(())
    }

    /// Selects the row to simulate.
    ///
    /// With no genotype name the table must contain a single row. A sowing
    /// date narrows the candidates; if several rows remain, the one fitted
    /// for the density closest to `density` is used.
    pub fn select(
        &self,
        genotype: Option<&str>,
        sowing_date: Option<NaiveDate>,
        density: f64,
    ) -> SimResult<&GenotypeParameters> {
        let candidates: Vec<&GenotypeParameters> = self
            .genotypes
            .iter()
            .filter(|row| genotype.is_none_or(|g| row.genotype == g))
            .filter(|row| sowing_date.is_none_or(|d| row.sowing_date == d))
            .collect();

        let name = genotype.unwrap_or("<any>");
        if genotype.is_none() && self.genotypes.len() > 1 {
            return Err(SimError::config(
                "genotype",
                "the parameter table has several rows; a genotype must be selected",
            ));
        }
        candidates
            .into_iter()
            .min_by(|a, b| {
                let da = (a.sowing_density - density).abs();
                let db = (b.sowing_density - density).abs();
                da.total_cmp(&db)
            })
            .ok_or_else(|| {
                SimError::config("genotype", format!("no parameter row matches `{name}`"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2010, 10, 15).unwrap()
    }

    #[test]
    fn reference_row_is_valid() {
        let row = GenotypeParameters::reference("Mercia", date());
        assert!(row.validate().is_ok());
    }

    #[test]
    fn negative_phyllochron_is_rejected() {
        let mut row = GenotypeParameters::reference("Mercia", date());
        row.development.phyllochron = -5.0;
        let err = row.validate().unwrap_err();
        match err {
            SimError::ParameterValidation { field, genotype, .. } => {
                assert_eq!(field, "development.phyllochron");
                assert_eq!(genotype, "Mercia");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn leaf_number_probabilities_must_sum_to_one() {
        let mut row = GenotypeParameters::reference("Mercia", date());
        row.development.ms_leaf_number_probabilities[0].probability = 0.5;
        assert!(matches!(
            row.validate(),
            Err(SimError::ParameterValidation { .. })
        ));
    }

    #[test]
    fn fractional_mean_leaf_number_overrides_the_list() {
        let mut row = GenotypeParameters::reference("Mercia", date());
        row.development.ms_leaf_number_mean = Some(11.25);
        assert!(row.validate().is_ok());
        let distribution = row.leaf_number_distribution();
        assert_eq!(distribution.len(), 2);
        assert_eq!((distribution[0].0, distribution[1].0), (11, 12));
        let mean: f64 = distribution.iter().map(|&(n, p)| f64::from(n) * p).sum();
        assert!((mean - 11.25).abs() < 1e-12);

        // A whole mean gives a single certain leaf number.
        row.development.ms_leaf_number_mean = Some(12.0);
        assert_eq!(row.leaf_number_distribution(), vec![(12, 1.0)]);

        row.development.ms_leaf_number_mean = Some(0.5);
        assert!(row.validate().is_err());
    }

    #[test]
    fn bolting_after_flowering_is_rejected() {
        let mut row = GenotypeParameters::reference("Mercia", date());
        row.tillering.tt_bolting = 2000.0;
        assert!(row.validate().is_err());
    }

    #[test]
    fn noise_envelope_must_contain_one() {
        let mut row = GenotypeParameters::reference("Mercia", date());
        row.dimensions.noise.min_factor = 1.2;
        assert!(row.validate().is_err());
    }

    #[test]
    fn table_parses_minimal_toml_with_defaults() {
        let src = r#"
            [[genotypes]]
            genotype = "Soissons"
            sowing_density = 200.0
            sowing_date = "2011-10-20"

            [genotypes.development]
            phyllochron = 95.0
            ms_leaf_number_probabilities = [
                { leaves = 10, probability = 1.0 },
            ]
        "#;
        let table = ParameterTable::from_toml_str(src).unwrap();
        let row = &table.genotypes[0];
        assert_eq!(row.genotype, "Soissons");
        assert_eq!(row.development.phyllochron, 95.0);
        // Unspecified groups fall back to defaults.
        assert_eq!(row.tillering, TilleringParameters::default());
        assert_eq!(row.development.early_leaf_count, 2);
    }

    #[test]
    fn reference_table_survives_a_toml_dump() {
        let mut row = GenotypeParameters::reference("Mercia", date());
        row.base_temperature = Some(1.5);
        let table = ParameterTable::new(vec![row]).unwrap();
        let parsed = ParameterTable::from_toml_str(&table.to_toml_string().unwrap()).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn table_rejects_invalid_rows_on_load() {
        let src = r#"
            [[genotypes]]
            genotype = "Bad"
            sowing_density = 0.0
            sowing_date = "2011-10-20"
        "#;
        assert!(matches!(
            ParameterTable::from_toml_str(src),
            Err(SimError::ParameterValidation { .. })
        ));
    }

    #[test]
    fn duplicate_rows_are_rejected() {
        let row = GenotypeParameters::reference("Mercia", date());
        assert!(ParameterTable::new(vec![row.clone(), row]).is_err());
    }

    #[test]
    fn select_prefers_closest_density() {
        let mut low = GenotypeParameters::reference("Mercia", date());
        low.sowing_density = 100.0;
        let mut high = GenotypeParameters::reference("Mercia", date());
        high.sowing_density = 400.0;
        let table = ParameterTable::new(vec![low, high]).unwrap();

        let row = table.select(Some("Mercia"), None, 350.0).unwrap();
        assert_eq!(row.sowing_density, 400.0);
        assert!(table.select(Some("Other"), None, 350.0).is_err());
        assert!(table.select(None, None, 350.0).is_err());
    }

    #[test]
    fn shape_classes_span_the_axis() {
        let row = GenotypeParameters::reference("Mercia", date());
        // Four classes over twelve leaves: three leaves per class.
        assert_eq!(row.shape_class(1, 12), 0);
        assert_eq!(row.shape_class(4, 12), 1);
        assert_eq!(row.shape_class(12, 12), 3);
    }
}

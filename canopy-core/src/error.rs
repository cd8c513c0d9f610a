use crate::types::PlantId;
use chrono::NaiveDate;
use thiserror::Error;

/// Error type for the canopy engine.
///
/// Parameter and configuration errors are raised before any simulation
/// state exists. Date and topology errors abort the current simulated date;
/// the driver keeps the last valid snapshot.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("invalid parameter `{field}` for genotype `{genotype}`: {reason}")]
    ParameterValidation {
        genotype: String,
        field: String,
        reason: String,
    },
    #[error("invalid configuration `{field}`: {reason}")]
    InvalidConfig { field: String, reason: String },
    #[error("invalid temperature series: {0}")]
    InvalidWeather(String),
    #[error("date {date} is not covered by the temperature series (covered through {covered_through:?})")]
    DateOutOfRange {
        date: NaiveDate,
        covered_through: Option<NaiveDate>,
    },
    #[error("date {date} is not after the last simulated date {last}")]
    NonMonotonicDate { date: NaiveDate, last: NaiveDate },
    #[error("topology invariant violated on plant {plant}: {detail}")]
    TopologyInvariantViolation { plant: PlantId, detail: String },
    #[error("failed to parse input: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise to TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl SimError {
    pub(crate) fn parameter(
        genotype: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::ParameterValidation {
            genotype: genotype.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn topology(plant: PlantId, detail: impl Into<String>) -> Self {
        Self::TopologyInvariantViolation {
            plant,
            detail: detail.into(),
        }
    }

    /// Whether the error is raised before a simulation can be created.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ParameterValidation { .. }
                | Self::InvalidConfig { .. }
                | Self::InvalidWeather(_)
                | Self::Parse(_)
                | Self::Io { .. }
        )
    }
}

/// Convenience type for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

pub(crate) fn read_to_string(path: &std::path::Path) -> SimResult<String> {
    std::fs::read_to_string(path).map_err(|source| SimError::Io {
        path: path.display().to_string(),
        source,
    })
}

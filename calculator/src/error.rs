//! Error types for each concern of the calculator.

use shared::table::TableError;
use shared::units::UnitError;
use thiserror::Error;

/// Fatal problems found while loading the configuration directory.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("{path}: {source}")]
    Table {
        path: String,
        #[source]
        source: TableError,
    },

    #[error("invalid unit in {field}: {source}")]
    Unit {
        field: String,
        #[source]
        source: UnitError,
    },

    #[error("no {kind} file covers airmass {airmass}, water vapor {water_vapor} mm")]
    MissingCell {
        kind: &'static str,
        airmass: f64,
        water_vapor: f64,
    },

    #[error("{path}: {tag} = {value} is not on the declared index")]
    UnknownTag {
        path: String,
        tag: &'static str,
        value: f64,
    },

    #[error("no {kind} files with prefix '{prefix}' in {directory}")]
    NoFiles {
        kind: &'static str,
        prefix: String,
        directory: String,
    },

    #[error("{path}: {reason}")]
    DataShape { path: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// A rejected parameter value. The calculator state is left unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("{name} = {value} is outside [{min}, {max}]")]
    OutOfBounds {
        name: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("'{value}' is not a valid {name}; options are [{}]", .options.join(", "))]
    InvalidOption {
        name: String,
        value: String,
        options: Vec<String>,
    },

    #[error("invalid unit for {name}: {source}")]
    Unit {
        name: String,
        #[source]
        source: UnitError,
    },
}

impl ParameterError {
    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ParameterError::InvalidValue {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unit(name: impl Into<String>, source: UnitError) -> Self {
        ParameterError::Unit {
            name: name.into(),
            source,
        }
    }
}

/// Throughput curve selection failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InstrumentError {
    #[error("no throughput curve matches {selection}")]
    NoMatchingCurve { selection: String },

    #[error("{count} throughput curves match {selection}")]
    AmbiguousCurve { selection: String, count: usize },
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("template {name}: {reason}")]
    Template { name: String, reason: String },

    #[error(transparent)]
    Unit(#[from] UnitError),
}

#[derive(Debug, Error)]
pub enum CalculatorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("{} parameter(s) failed:\n{}", .0.len(), format_batch(.0))]
    Batch(Vec<(String, CalculatorError)>),
}

fn format_batch(failures: &[(String, CalculatorError)]) -> String {
    failures
        .iter()
        .map(|(name, err)| format!("  {name}: {err}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_lists_every_failure() {
        let err = CalculatorError::Batch(vec![
            (
                "dithers".to_string(),
                ParameterError::invalid("dithers", "must be a positive integer").into(),
            ),
            (
                "bogus".to_string(),
                ParameterError::UnknownParameter("bogus".to_string()).into(),
            ),
        ]);
        let text = err.to_string();
        assert!(text.starts_with("2 parameter(s) failed"));
        assert!(text.contains("dithers: invalid value for dithers"));
        assert!(text.contains("bogus: unknown parameter 'bogus'"));
    }

    #[test]
    fn test_option_error_names_choices() {
        let err = ParameterError::InvalidOption {
            name: "grating".to_string(),
            value: "MEDIUM".to_string(),
            options: vec!["LOW".to_string(), "HIGH".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "'MEDIUM' is not a valid grating; options are [LOW, HIGH]"
        );
    }
}

//! Problem types supported by the search

use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The learning problem a search is configured for.
///
/// Fixed when the search starts; it decides which objectives, splitters,
/// baselines and estimator families are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemType {
    Binary,
    Multiclass,
    Regression,
    TimeSeriesBinary,
    TimeSeriesMulticlass,
    TimeSeriesRegression,
}

impl ProblemType {
    /// All problem types, in declaration order
    pub const ALL: [ProblemType; 6] = [
        ProblemType::Binary,
        ProblemType::Multiclass,
        ProblemType::Regression,
        ProblemType::TimeSeriesBinary,
        ProblemType::TimeSeriesMulticlass,
        ProblemType::TimeSeriesRegression,
    ];

    pub fn is_classification(self) -> bool {
        !self.is_regression()
    }

    pub fn is_regression(self) -> bool {
        matches!(self, ProblemType::Regression | ProblemType::TimeSeriesRegression)
    }

    pub fn is_binary(self) -> bool {
        matches!(self, ProblemType::Binary | ProblemType::TimeSeriesBinary)
    }

    pub fn is_multiclass(self) -> bool {
        matches!(self, ProblemType::Multiclass | ProblemType::TimeSeriesMulticlass)
    }

    pub fn is_time_series(self) -> bool {
        matches!(
            self,
            ProblemType::TimeSeriesBinary
                | ProblemType::TimeSeriesMulticlass
                | ProblemType::TimeSeriesRegression
        )
    }

    /// Human-readable name, e.g. "Time Series Binary"
    pub fn display_name(self) -> &'static str {
        match self {
            ProblemType::Binary => "Binary Classification",
            ProblemType::Multiclass => "Multiclass Classification",
            ProblemType::Regression => "Regression",
            ProblemType::TimeSeriesBinary => "Time Series Binary",
            ProblemType::TimeSeriesMulticlass => "Time Series Multiclass",
            ProblemType::TimeSeriesRegression => "Time Series Regression",
        }
    }
}

impl fmt::Display for ProblemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProblemType {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' || c == '_' { ' ' } else { c })
            .collect();
        let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

        match normalized.as_str() {
            "binary" | "binary classification" => Ok(ProblemType::Binary),
            "multiclass" | "multiclass classification" => Ok(ProblemType::Multiclass),
            "regression" => Ok(ProblemType::Regression),
            "time series binary" => Ok(ProblemType::TimeSeriesBinary),
            "time series multiclass" => Ok(ProblemType::TimeSeriesMulticlass),
            "time series regression" => Ok(ProblemType::TimeSeriesRegression),
            _ => Err(KolosalError::ConfigError(format!(
                "Unknown problem type '{}'",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        assert_eq!("binary".parse::<ProblemType>().unwrap(), ProblemType::Binary);
        assert_eq!(
            "time_series_regression".parse::<ProblemType>().unwrap(),
            ProblemType::TimeSeriesRegression
        );
        assert_eq!(
            "Time Series Multiclass".parse::<ProblemType>().unwrap(),
            ProblemType::TimeSeriesMulticlass
        );
        assert!("clustering".parse::<ProblemType>().is_err());
    }

    #[test]
    fn test_predicates() {
        assert!(ProblemType::TimeSeriesBinary.is_binary());
        assert!(ProblemType::TimeSeriesBinary.is_time_series());
        assert!(ProblemType::TimeSeriesBinary.is_classification());
        assert!(ProblemType::Regression.is_regression());
        assert!(!ProblemType::Regression.is_time_series());
        assert!(ProblemType::Multiclass.is_multiclass());
    }
}

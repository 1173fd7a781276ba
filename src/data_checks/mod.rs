//! Pre-search validation of a dataset.
//!
//! Each [`DataCheck`] inspects the dataset for one class of problem and
//! reports warnings (logged, search continues) and errors (search refuses to
//! start).

mod features;
mod target;
mod time_series;

pub use features::{HighlyNullDataCheck, IdColumnsDataCheck, UnsupportedTypeDataCheck};
pub use target::InvalidTargetDataCheck;
pub use time_series::EqualIntervalDataCheck;

use crate::data::Dataset;
use crate::problem::ProblemType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Machine-readable reason attached to every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataCheckCode {
    TargetHasNonFinite,
    TargetBinaryNotTwoClasses,
    TargetBinaryInvalidLabels,
    TargetMulticlassTooFewClasses,
    TargetClassTooSmallForFolds,
    TargetNotIntegerLabels,
    TargetSingleValue,
    UnsupportedColumnType,
    HighlyNullColumn,
    FullyNullColumn,
    HasIdColumn,
    DatetimeMissing,
    DatetimeNotIncreasing,
    DatetimeUnequalIntervals,
}

impl fmt::Display for DataCheckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| format!("{:?}", self));
        f.write_str(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCheckMessage {
    /// Name of the check that produced the message
    pub check: String,
    pub code: DataCheckCode,
    pub message: String,
    pub details: BTreeMap<String, String>,
}

impl DataCheckMessage {
    pub fn new(check: &str, code: DataCheckCode, message: impl Into<String>) -> Self {
        Self {
            check: check.to_string(),
            code,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

impl fmt::Display for DataCheckMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.check, self.code, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataCheckReport {
    pub warnings: Vec<DataCheckMessage>,
    pub errors: Vec<DataCheckMessage>,
}

impl DataCheckReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: DataCheckMessage) {
        self.warnings.push(message);
    }

    pub fn error(&mut self, message: DataCheckMessage) {
        self.errors.push(message);
    }

    pub fn merge(&mut self, other: DataCheckReport) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty()
    }

    pub fn codes(&self) -> Vec<DataCheckCode> {
        self.errors
            .iter()
            .chain(&self.warnings)
            .map(|m| m.code)
            .collect()
    }
}

/// A single validation rule applied before the search starts
pub trait DataCheck: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn validate(&self, dataset: &Dataset, problem_type: ProblemType) -> DataCheckReport;
}

/// The checks that apply to a problem type
pub fn default_data_checks(problem_type: ProblemType, n_folds: usize) -> Vec<Box<dyn DataCheck>> {
    let mut checks: Vec<Box<dyn DataCheck>> = vec![
        Box::new(InvalidTargetDataCheck::new(n_folds)),
        Box::new(UnsupportedTypeDataCheck),
        Box::new(HighlyNullDataCheck::default()),
        Box::new(IdColumnsDataCheck),
    ];
    if problem_type.is_time_series() {
        checks.push(Box::new(EqualIntervalDataCheck));
    }
    checks
}

/// Runs every check and merges their reports in order
pub fn run_data_checks(
    checks: &[Box<dyn DataCheck>],
    dataset: &Dataset,
    problem_type: ProblemType,
) -> DataCheckReport {
    let mut report = DataCheckReport::new();
    for check in checks {
        report.merge(check.validate(dataset, problem_type));
    }
    report
}

use super::{DataCheck, DataCheckCode, DataCheckMessage, DataCheckReport};
use crate::data::{ColumnKind, Dataset};
use crate::problem::ProblemType;
use std::collections::HashSet;

/// Flags column kinds no component can consume
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedTypeDataCheck;

impl DataCheck for UnsupportedTypeDataCheck {
    fn name(&self) -> &str {
        "UnsupportedTypeDataCheck"
    }

    fn validate(&self, dataset: &Dataset, _problem_type: ProblemType) -> DataCheckReport {
        let mut report = DataCheckReport::new();
        for column in dataset.columns().iter().filter(|c| c.kind == ColumnKind::Text) {
            report.error(
                DataCheckMessage::new(
                    self.name(),
                    DataCheckCode::UnsupportedColumnType,
                    format!("column '{}' holds free text, which no component supports", column.name),
                )
                .with_detail("column", &column.name),
            );
        }
        report
    }
}

/// Warns about columns that are mostly or entirely missing
#[derive(Debug, Clone, Copy)]
pub struct HighlyNullDataCheck {
    pub threshold: f64,
}

impl Default for HighlyNullDataCheck {
    fn default() -> Self {
        Self { threshold: 0.95 }
    }
}

impl HighlyNullDataCheck {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl DataCheck for HighlyNullDataCheck {
    fn name(&self) -> &str {
        "HighlyNullDataCheck"
    }

    fn validate(&self, dataset: &Dataset, _problem_type: ProblemType) -> DataCheckReport {
        let mut report = DataCheckReport::new();
        for (idx, column) in dataset.columns().iter().enumerate() {
            if column.kind == ColumnKind::Text {
                continue;
            }
            let fraction = dataset.null_fraction(idx);
            let message = if fraction >= 1.0 {
                DataCheckMessage::new(
                    self.name(),
                    DataCheckCode::FullyNullColumn,
                    format!("column '{}' is entirely null", column.name),
                )
            } else if fraction >= self.threshold {
                DataCheckMessage::new(
                    self.name(),
                    DataCheckCode::HighlyNullColumn,
                    format!("column '{}' is {:.1}% null", column.name, fraction * 100.0),
                )
            } else {
                continue;
            };
            report.warn(
                message
                    .with_detail("column", &column.name)
                    .with_detail("null_fraction", format!("{:.4}", fraction)),
            );
        }
        report
    }
}

/// Warns about numeric columns that look like row identifiers
#[derive(Debug, Clone, Copy, Default)]
pub struct IdColumnsDataCheck;

fn named_like_id(name: &str) -> bool {
    match name.to_lowercase().strip_suffix("id") {
        Some("") => true,
        Some(prefix) => prefix.ends_with(|c: char| !c.is_alphanumeric()),
        None => false,
    }
}

impl DataCheck for IdColumnsDataCheck {
    fn name(&self) -> &str {
        "IdColumnsDataCheck"
    }

    fn validate(&self, dataset: &Dataset, _problem_type: ProblemType) -> DataCheckReport {
        let mut report = DataCheckReport::new();
        let x = dataset.x();
        for (idx, column) in dataset.columns().iter().enumerate() {
            if column.kind != ColumnKind::Numeric || !named_like_id(&column.name) {
                continue;
            }
            let values = x.column(idx);
            let all_integers = values.iter().all(|v| v.is_finite() && v.fract() == 0.0);
            let distinct: HashSet<i64> = values.iter().map(|v| *v as i64).collect();
            if all_integers && distinct.len() == values.len() {
                report.warn(
                    DataCheckMessage::new(
                        self.name(),
                        DataCheckCode::HasIdColumn,
                        format!("column '{}' is likely an id column", column.name),
                    )
                    .with_detail("column", &column.name),
                );
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureColumn;
    use ndarray::{array, Array1};

    #[test]
    fn test_text_column_is_error() {
        let dataset = Dataset::with_columns(
            array![[1.0, f64::NAN], [2.0, f64::NAN]],
            Array1::zeros(2),
            vec![FeatureColumn::numeric("a"), FeatureColumn::new("notes", ColumnKind::Text)],
        )
        .unwrap();
        let report = UnsupportedTypeDataCheck.validate(&dataset, ProblemType::Regression);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].details["column"], "notes");

        // Text columns are not reported twice
        assert!(HighlyNullDataCheck::default()
            .validate(&dataset, ProblemType::Regression)
            .is_empty());
    }

    #[test]
    fn test_null_columns() {
        let nan = f64::NAN;
        let x = array![[nan, nan, 1.0], [nan, nan, 2.0], [nan, 1.0, 3.0], [nan, nan, 4.0]];
        let dataset = Dataset::new(x, Array1::zeros(4)).unwrap();

        let report = HighlyNullDataCheck::new(0.7).validate(&dataset, ProblemType::Regression);
        assert!(!report.has_errors());
        let codes: Vec<_> = report.warnings.iter().map(|m| m.code).collect();
        assert_eq!(codes, vec![DataCheckCode::FullyNullColumn, DataCheckCode::HighlyNullColumn]);
        assert_eq!(report.warnings[1].details["column"], "feature_1");
    }

    #[test]
    fn test_id_column() {
        let dataset = Dataset::with_columns(
            array![[1.0, 1.0, 0.5], [2.0, 1.0, 1.5], [3.0, 2.0, 2.5]],
            Array1::zeros(3),
            vec![
                FeatureColumn::numeric("customer_id"),
                FeatureColumn::numeric("id"),
                FeatureColumn::numeric("amount"),
            ],
        )
        .unwrap();
        let report = IdColumnsDataCheck.validate(&dataset, ProblemType::Regression);
        // "id" repeats a value, "amount" is not named like an id
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].details["column"], "customer_id");
    }

    #[test]
    fn test_id_names() {
        assert!(named_like_id("ID"));
        assert!(named_like_id("user_id"));
        assert!(named_like_id("order-id"));
        assert!(!named_like_id("paid"));
        assert!(!named_like_id("width"));
    }
}

use super::{DataCheck, DataCheckCode, DataCheckMessage, DataCheckReport};
use crate::data::{unique_sorted, Dataset};
use crate::problem::ProblemType;

const NAME: &str = "InvalidTargetDataCheck";

/// Target sanity for the declared problem type
#[derive(Debug, Clone)]
pub struct InvalidTargetDataCheck {
    n_folds: usize,
}

impl InvalidTargetDataCheck {
    pub fn new(n_folds: usize) -> Self {
        Self { n_folds }
    }

    fn check_classes(&self, y: &[f64], problem_type: ProblemType, report: &mut DataCheckReport) {
        let classes = unique_sorted(y.iter().copied());

        let non_integer: Vec<f64> = classes.iter().copied().filter(|c| c.fract() != 0.0).collect();
        if !non_integer.is_empty() {
            report.error(
                DataCheckMessage::new(
                    NAME,
                    DataCheckCode::TargetNotIntegerLabels,
                    "classification targets must be integer class labels",
                )
                .with_detail("labels", format!("{:?}", non_integer)),
            );
        }

        if problem_type.is_binary() {
            if classes.len() != 2 {
                report.error(
                    DataCheckMessage::new(
                        NAME,
                        DataCheckCode::TargetBinaryNotTwoClasses,
                        format!("binary problems need exactly 2 classes, found {}", classes.len()),
                    )
                    .with_detail("n_classes", classes.len()),
                );
            } else if classes != [0.0, 1.0] {
                report.error(
                    DataCheckMessage::new(
                        NAME,
                        DataCheckCode::TargetBinaryInvalidLabels,
                        "binary targets must be labelled 0 and 1",
                    )
                    .with_detail("labels", format!("{:?}", classes)),
                );
            }
        } else if problem_type.is_multiclass() && classes.len() < 3 {
            report.error(
                DataCheckMessage::new(
                    NAME,
                    DataCheckCode::TargetMulticlassTooFewClasses,
                    format!("multiclass problems need at least 3 classes, found {}", classes.len()),
                )
                .with_detail("n_classes", classes.len()),
            );
        }

        for class in classes {
            let count = y.iter().filter(|v| **v == class).count();
            if count < self.n_folds {
                report.error(
                    DataCheckMessage::new(
                        NAME,
                        DataCheckCode::TargetClassTooSmallForFolds,
                        format!(
                            "class {} has {} rows, fewer than the {} cross-validation folds",
                            class, count, self.n_folds
                        ),
                    )
                    .with_detail("class", class)
                    .with_detail("count", count),
                );
            }
        }
    }
}

impl DataCheck for InvalidTargetDataCheck {
    fn name(&self) -> &str {
        NAME
    }

    fn validate(&self, dataset: &Dataset, problem_type: ProblemType) -> DataCheckReport {
        let mut report = DataCheckReport::new();
        let y = dataset.y().to_vec();

        let n_non_finite = y.iter().filter(|v| !v.is_finite()).count();
        if n_non_finite > 0 {
            report.error(
                DataCheckMessage::new(
                    NAME,
                    DataCheckCode::TargetHasNonFinite,
                    format!("{} target values are missing or non-finite", n_non_finite),
                )
                .with_detail("count", n_non_finite),
            );
        }

        if problem_type.is_classification() {
            self.check_classes(&y, problem_type, &mut report);
        } else if unique_sorted(y.iter().copied()).len() <= 1 {
            report.warn(DataCheckMessage::new(
                NAME,
                DataCheckCode::TargetSingleValue,
                "regression target has a single unique value",
            ));
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn dataset(y: Vec<f64>) -> Dataset {
        let n = y.len();
        Dataset::new(Array2::zeros((n, 1)), Array1::from(y)).unwrap()
    }

    fn codes(y: Vec<f64>, problem: ProblemType) -> Vec<DataCheckCode> {
        InvalidTargetDataCheck::new(2).validate(&dataset(y), problem).codes()
    }

    #[test]
    fn test_valid_binary() {
        assert!(codes(vec![0.0, 1.0, 0.0, 1.0], ProblemType::Binary).is_empty());
    }

    #[test]
    fn test_binary_class_count() {
        let codes = codes(vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0], ProblemType::Binary);
        assert_eq!(codes, vec![DataCheckCode::TargetBinaryNotTwoClasses]);
    }

    #[test]
    fn test_binary_labels_must_be_zero_one() {
        let codes = codes(vec![1.0, 2.0, 1.0, 2.0], ProblemType::Binary);
        assert_eq!(codes, vec![DataCheckCode::TargetBinaryInvalidLabels]);
    }

    #[test]
    fn test_multiclass_needs_three() {
        let codes = codes(vec![0.0, 1.0, 0.0, 1.0], ProblemType::Multiclass);
        assert_eq!(codes, vec![DataCheckCode::TargetMulticlassTooFewClasses]);
    }

    #[test]
    fn test_small_class_and_non_finite() {
        let codes = codes(vec![0.0, 0.0, 1.0, f64::NAN], ProblemType::Binary);
        assert!(codes.contains(&DataCheckCode::TargetHasNonFinite));
        assert!(codes.contains(&DataCheckCode::TargetClassTooSmallForFolds));
    }

    #[test]
    fn test_non_integer_labels() {
        let codes = codes(vec![0.5, 1.5, 2.5, 0.5, 1.5, 2.5], ProblemType::Multiclass);
        assert_eq!(codes, vec![DataCheckCode::TargetNotIntegerLabels]);
    }

    #[test]
    fn test_constant_regression_target_warns() {
        let report = InvalidTargetDataCheck::new(2).validate(&dataset(vec![3.0; 5]), ProblemType::Regression);
        assert!(!report.has_errors());
        assert_eq!(report.warnings[0].code, DataCheckCode::TargetSingleValue);
    }
}

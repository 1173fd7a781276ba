use super::{DataCheck, DataCheckCode, DataCheckMessage, DataCheckReport};
use crate::data::Dataset;
use crate::problem::ProblemType;

/// Relative slack allowed between consecutive time steps
const INTERVAL_TOLERANCE: f64 = 1e-9;

/// Time-series datasets need an increasing, evenly spaced time index
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualIntervalDataCheck;

impl DataCheck for EqualIntervalDataCheck {
    fn name(&self) -> &str {
        "EqualIntervalDataCheck"
    }

    fn validate(&self, dataset: &Dataset, problem_type: ProblemType) -> DataCheckReport {
        let mut report = DataCheckReport::new();
        if !problem_type.is_time_series() {
            return report;
        }

        let Some(times) = dataset.time_values() else {
            report.warn(DataCheckMessage::new(
                self.name(),
                DataCheckCode::DatetimeMissing,
                "no time index declared; row order is taken as time order",
            ));
            return report;
        };

        let steps: Vec<f64> = times.windows(2).into_iter().map(|w| w[1] - w[0]).collect();
        if let Some(row) = steps.iter().position(|s| !s.is_finite() || *s <= 0.0) {
            report.error(
                DataCheckMessage::new(
                    self.name(),
                    DataCheckCode::DatetimeNotIncreasing,
                    format!("time index is not strictly increasing at row {}", row + 1),
                )
                .with_detail("row", row + 1),
            );
            return report;
        }

        if let Some(first) = steps.first().copied() {
            let uneven = steps
                .iter()
                .filter(|s| (**s - first).abs() > INTERVAL_TOLERANCE * first.abs().max(1.0))
                .count();
            if uneven > 0 {
                report.warn(
                    DataCheckMessage::new(
                        self.name(),
                        DataCheckCode::DatetimeUnequalIntervals,
                        format!("{} time steps differ from the first interval", uneven),
                    )
                    .with_detail("interval", first)
                    .with_detail("uneven_steps", uneven),
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
    use ndarray::{Array1, Array2};

    fn dataset(times: &[f64]) -> Dataset {
        let n = times.len();
        let x = Array2::from_shape_fn((n, 2), |(i, j)| if j == 0 { times[i] } else { i as f64 });
        Dataset::with_columns(
            x,
            Array1::zeros(n),
            vec![FeatureColumn::numeric("t"), FeatureColumn::numeric("v")],
        )
        .unwrap()
        .with_time_index("t")
        .unwrap()
    }

    fn codes(times: &[f64]) -> Vec<DataCheckCode> {
        EqualIntervalDataCheck
            .validate(&dataset(times), ProblemType::TimeSeriesRegression)
            .codes()
    }

    #[test]
    fn test_even_spacing_passes() {
        assert!(codes(&[10.0, 20.0, 30.0, 40.0]).is_empty());
    }

    #[test]
    fn test_not_increasing() {
        assert_eq!(codes(&[1.0, 2.0, 2.0, 3.0]), vec![DataCheckCode::DatetimeNotIncreasing]);
        assert_eq!(codes(&[1.0, f64::NAN, 3.0]), vec![DataCheckCode::DatetimeNotIncreasing]);
    }

    #[test]
    fn test_uneven_spacing_warns() {
        let report = EqualIntervalDataCheck.validate(&dataset(&[1.0, 2.0, 4.0, 5.0]), ProblemType::TimeSeriesBinary);
        assert!(!report.has_errors());
        assert_eq!(report.warnings[0].code, DataCheckCode::DatetimeUnequalIntervals);
    }

    #[test]
    fn test_missing_time_index() {
        let dataset = Dataset::new(Array2::zeros((3, 1)), Array1::zeros(3)).unwrap();
        let report = EqualIntervalDataCheck.validate(&dataset, ProblemType::TimeSeriesMulticlass);
        assert_eq!(report.codes(), vec![DataCheckCode::DatetimeMissing]);
        assert!(EqualIntervalDataCheck.validate(&dataset, ProblemType::Regression).is_empty());
    }
}

//! Regression objectives

use super::{check_lengths, labels, Objective, Predictions};
use crate::error::Result;
use crate::problem::ProblemType;
use ndarray::Array1;

fn residuals<'a>(y_true: &'a Array1<f64>, y_pred: &'a Array1<f64>) -> impl Iterator<Item = f64> + 'a {
    y_true.iter().zip(y_pred.iter()).map(|(t, p)| t - p)
}

/// Coefficient of determination
#[derive(Debug, Clone, Copy, Default)]
pub struct RSquared;

impl Objective for RSquared {
    fn name(&self) -> &str {
        "r2"
    }

    fn greater_is_better(&self) -> bool {
        true
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type.is_regression()
    }

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64> {
        let y_pred = labels(self.name(), y_pred)?;
        check_lengths(y_true, y_pred.len())?;

        let n = y_true.len() as f64;
        let mean = y_true.sum() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - mean).powi(2)).sum();
        let ss_res: f64 = residuals(y_true, y_pred).map(|e| e * e).sum();

        if ss_tot > 0.0 {
            Ok(1.0 - ss_res / ss_tot)
        } else if ss_res == 0.0 {
            Ok(1.0)
        } else {
            Ok(0.0)
        }
    }
}

/// Mean squared error
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl Objective for MeanSquaredError {
    fn name(&self) -> &str {
        "mse"
    }

    fn greater_is_better(&self) -> bool {
        false
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type.is_regression()
    }

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64> {
        let y_pred = labels(self.name(), y_pred)?;
        check_lengths(y_true, y_pred.len())?;
        Ok(residuals(y_true, y_pred).map(|e| e * e).sum::<f64>() / y_true.len() as f64)
    }
}

/// Root mean squared error
#[derive(Debug, Clone, Copy, Default)]
pub struct RootMeanSquaredError;

impl Objective for RootMeanSquaredError {
    fn name(&self) -> &str {
        "rmse"
    }

    fn greater_is_better(&self) -> bool {
        false
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type.is_regression()
    }

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64> {
        MeanSquaredError.score(y_true, y_pred).map(f64::sqrt)
    }
}

/// Mean absolute error
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAbsoluteError;

impl Objective for MeanAbsoluteError {
    fn name(&self) -> &str {
        "mae"
    }

    fn greater_is_better(&self) -> bool {
        false
    }

    fn supports(&self, problem_type: ProblemType) -> bool {
        problem_type.is_regression()
    }

    fn score(&self, y_true: &Array1<f64>, y_pred: &Predictions) -> Result<f64> {
        let y_pred = labels(self.name(), y_pred)?;
        check_lengths(y_true, y_pred.len())?;
        Ok(residuals(y_true, y_pred).map(f64::abs).sum::<f64>() / y_true.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regression_metrics() {
        let y_true = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let y_pred = Predictions::Labels(array![1.1, 2.0, 2.9, 4.1, 5.0]);

        let mse = MeanSquaredError.score(&y_true, &y_pred).unwrap();
        assert!((mse - 0.006).abs() < 1e-12);
        let rmse = RootMeanSquaredError.score(&y_true, &y_pred).unwrap();
        assert!((rmse - mse.sqrt()).abs() < 1e-12);
        let mae = MeanAbsoluteError.score(&y_true, &y_pred).unwrap();
        assert!((mae - 0.06).abs() < 1e-12);
        assert!(RSquared.score(&y_true, &y_pred).unwrap() > 0.99);
    }

    #[test]
    fn test_r2_constant_target() {
        let y_true = array![2.0, 2.0];
        assert_eq!(RSquared.score(&y_true, &Predictions::Labels(array![2.0, 2.0])).unwrap(), 1.0);
        assert_eq!(RSquared.score(&y_true, &Predictions::Labels(array![1.0, 3.0])).unwrap(), 0.0);
    }

    #[test]
    fn test_support() {
        assert!(RSquared.supports(ProblemType::TimeSeriesRegression));
        assert!(!MeanSquaredError.supports(ProblemType::Binary));
    }
}

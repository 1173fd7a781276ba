//! Linear estimators: ridge-regularized least squares and logistic regression

use super::{argmax_labels, check_fit_input, check_n_features, encode_classes, Estimator};
use crate::error::{KolosalError, Result};
use crate::pipeline::{param_f64, param_usize, Hyperparameters};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Solve the symmetric positive-definite system `a * x = b` by Cholesky.
///
/// A matrix that is not positive definite gets a small ridge added to its
/// diagonal and is tried once more.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    cholesky_solve_inner(a, b).or_else(|| {
        let n = a.nrows();
        let scale = a.diag().iter().map(|v| v.abs()).sum::<f64>() / n.max(1) as f64;
        let mut ridged = a.clone();
        for k in 0..n {
            ridged[[k, k]] += 1e-8 * scale.max(1.0);
        }
        cholesky_solve_inner(&ridged, b)
    })
}

fn cholesky_solve_inner(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L * z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T * x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (z[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Least squares with an optional L2 penalty, intercept fitted on centered data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub alpha: f64,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl LinearRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            coefficients: None,
            intercept: 0.0,
        }
    }

    pub fn from_params(params: &Hyperparameters) -> Result<Self> {
        let alpha = param_f64(params, "alpha", 0.0)?;
        if !(alpha >= 0.0) {
            return Err(KolosalError::invalid_param("alpha", alpha, "must be non-negative"));
        }
        Ok(Self::new(alpha))
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }
}

impl Estimator for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let x_mean = x.mean_axis(Axis(0)).ok_or(KolosalError::ModelNotFitted)?;
        let y_mean = y.mean().unwrap_or(0.0);
        let x_centered = x - &x_mean.view().insert_axis(Axis(0));
        let y_centered = y - y_mean;

        let mut xtx = x_centered.t().dot(&x_centered);
        for i in 0..x.ncols() {
            xtx[[i, i]] += self.alpha;
        }
        let xty = x_centered.t().dot(&y_centered);

        let coefficients = cholesky_solve(&xtx, &xty).ok_or_else(|| {
            KolosalError::ComputationError("normal equations are singular".to_string())
        })?;
        self.intercept = y_mean - coefficients.dot(&x_mean);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(KolosalError::ModelNotFitted)?;
        check_n_features(coefficients.len(), x)?;
        Ok(x.dot(coefficients) + self.intercept)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// L2-regularized logistic regression trained by batch gradient descent.
///
/// Multiclass targets are handled one-vs-rest with the per-class
/// probabilities renormalized to sum to one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub alpha: f64,
    pub learning_rate: f64,
    pub max_iter: usize,
    pub tol: f64,
    classes: Vec<f64>,
    // One (weights, bias) per class column; a single model for binary targets
    models: Vec<(Array1<f64>, f64)>,
}

impl LogisticRegression {
    pub fn new(alpha: f64, learning_rate: f64, max_iter: usize) -> Self {
        Self {
            alpha,
            learning_rate,
            max_iter,
            tol: 1e-6,
            classes: Vec::new(),
            models: Vec::new(),
        }
    }

    pub fn from_params(params: &Hyperparameters) -> Result<Self> {
        let alpha = param_f64(params, "alpha", 0.01)?;
        let learning_rate = param_f64(params, "learning_rate", 0.1)?;
        let max_iter = param_usize(params, "max_iter", 300)?;
        if !(alpha >= 0.0) {
            return Err(KolosalError::invalid_param("alpha", alpha, "must be non-negative"));
        }
        if !(learning_rate > 0.0) {
            return Err(KolosalError::invalid_param(
                "learning_rate",
                learning_rate,
                "must be positive",
            ));
        }
        if max_iter == 0 {
            return Err(KolosalError::invalid_param("max_iter", max_iter, "must be positive"));
        }
        Ok(Self::new(alpha, learning_rate, max_iter))
    }

    fn fit_binary(&self, x: &Array2<f64>, target: &Array1<f64>) -> (Array1<f64>, f64) {
        let n = x.nrows() as f64;
        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;

        for _ in 0..self.max_iter {
            let linear = x.dot(&weights) + bias;
            let errors = linear.mapv(sigmoid) - target;
            let dw = x.t().dot(&errors) / n + self.alpha * &weights;
            let db = errors.sum() / n;

            let grad_norm = (dw.mapv(|v| v * v).sum() + db * db).sqrt();
            if grad_norm < self.tol {
                break;
            }
            weights = weights - self.learning_rate * dw;
            bias -= self.learning_rate * db;
        }
        (weights, bias)
    }
}

impl Estimator for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (classes, codes) = encode_classes(y)?;

        let models = match classes.len() {
            1 => Vec::new(),
            2 => {
                let target: Array1<f64> = codes.iter().map(|&c| c as f64).collect();
                vec![self.fit_binary(x, &target)]
            }
            k => (0..k)
                .map(|class| {
                    let target: Array1<f64> =
                        codes.iter().map(|&c| if c == class { 1.0 } else { 0.0 }).collect();
                    self.fit_binary(x, &target)
                })
                .collect(),
        };

        if models
            .iter()
            .any(|(w, b)| !b.is_finite() || w.iter().any(|v| !v.is_finite()))
        {
            return Err(KolosalError::ComputationError(
                "gradient descent diverged".to_string(),
            ));
        }

        self.classes = classes;
        self.models = models;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let proba = self.predict_proba(x)?;
        Ok(argmax_labels(&proba, &self.classes))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.classes.is_empty() {
            return Err(KolosalError::ModelNotFitted);
        }
        let n = x.nrows();
        let k = self.classes.len();
        if let Some((weights, _)) = self.models.first() {
            check_n_features(weights.len(), x)?;
        }

        let mut proba = Array2::<f64>::zeros((n, k));
        match self.models.as_slice() {
            [] => proba.fill(1.0),
            [(weights, bias)] => {
                let positive = (x.dot(weights) + *bias).mapv(sigmoid);
                for (i, p) in positive.iter().enumerate() {
                    proba[[i, 0]] = 1.0 - p;
                    proba[[i, 1]] = *p;
                }
            }
            models => {
                for (class, (weights, bias)) in models.iter().enumerate() {
                    let scores = (x.dot(weights) + *bias).mapv(sigmoid);
                    proba.column_mut(class).assign(&scores);
                }
                for mut row in proba.rows_mut() {
                    let total = row.sum();
                    if total > 0.0 {
                        row /= total;
                    } else {
                        row.fill(1.0 / k as f64);
                    }
                }
            }
        }
        Ok(proba)
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{hyperparameters, ParamValue};
    use ndarray::array;

    #[test]
    fn test_linear_regression_recovers_line() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![3.0, 5.0, 7.0, 9.0, 11.0];
        let mut model = LinearRegression::new(0.0);
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients().unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-6);
        let pred = model.predict(&array![[6.0]]).unwrap();
        assert!((pred[0] - 13.0).abs() < 1e-6);
    }

    #[test]
    fn test_ridge_shrinks() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![2.0, 4.0, 6.0, 8.0];
        let mut ols = LinearRegression::new(0.0);
        let mut ridge = LinearRegression::new(10.0);
        ols.fit(&x, &y).unwrap();
        ridge.fit(&x, &y).unwrap();
        assert!(ridge.coefficients().unwrap()[0] < ols.coefficients().unwrap()[0]);
    }

    #[test]
    fn test_logistic_binary_separable() {
        let x = array![[-2.0], [-1.5], [-1.0], [1.0], [1.5], [2.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut model = LogisticRegression::new(0.0, 0.5, 500);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.classes(), &[0.0, 1.0]);
        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_logistic_multiclass_columns_sorted() {
        let x = array![[0.0], [0.1], [5.0], [5.1], [10.0], [10.1]];
        let y = array![2.0, 2.0, 0.0, 0.0, 1.0, 1.0];
        let mut model = LogisticRegression::new(0.0, 0.1, 200);
        model.fit(&x, &y).unwrap();
        assert_eq!(model.classes(), &[0.0, 1.0, 2.0]);
        assert_eq!(model.predict_proba(&x).unwrap().ncols(), 3);
    }

    #[test]
    fn test_from_params_validation() {
        let bad = hyperparameters([("learning_rate", ParamValue::Float(0.0))]);
        assert!(LogisticRegression::from_params(&bad).is_err());
        assert!(LinearRegression::from_params(&hyperparameters([("alpha", -1.0)])).is_err());
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LinearRegression::new(0.0);
        assert!(matches!(
            model.predict(&array![[1.0]]),
            Err(KolosalError::ModelNotFitted)
        ));
    }
}

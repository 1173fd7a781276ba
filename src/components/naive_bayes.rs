//! Gaussian Naive Bayes

use super::{argmax_labels, check_fit_input, check_n_features, encode_classes, Estimator};
use crate::error::{KolosalError, Result};
use crate::pipeline::{param_f64, Hyperparameters};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Gaussian Naive Bayes classifier.
///
/// `var_smoothing` is a fraction of the largest feature variance added to
/// every per-class variance, so constant features do not produce zero
/// variances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    pub var_smoothing: f64,
    classes: Vec<f64>,
    log_priors: Vec<f64>,
    // [n_classes, n_features]
    means: Array2<f64>,
    variances: Array2<f64>,
}

impl GaussianNaiveBayes {
    pub fn new(var_smoothing: f64) -> Self {
        Self {
            var_smoothing,
            classes: Vec::new(),
            log_priors: Vec::new(),
            means: Array2::zeros((0, 0)),
            variances: Array2::zeros((0, 0)),
        }
    }

    pub fn from_params(params: &Hyperparameters) -> Result<Self> {
        let var_smoothing = param_f64(params, "var_smoothing", 1e-9)?;
        if !(var_smoothing > 0.0) {
            return Err(KolosalError::invalid_param(
                "var_smoothing",
                var_smoothing,
                "must be positive",
            ));
        }
        Ok(Self::new(var_smoothing))
    }

    fn joint_log_likelihood(&self, row: ArrayView1<'_, f64>) -> Vec<f64> {
        (0..self.classes.len())
            .map(|c| {
                let likelihood: f64 = row
                    .iter()
                    .zip(self.means.row(c).iter())
                    .zip(self.variances.row(c).iter())
                    .map(|((&xi, &mean), &var)| {
                        -0.5 * ((xi - mean).powi(2) / var + var.ln() + (2.0 * PI).ln())
                    })
                    .sum();
                self.log_priors[c] + likelihood
            })
            .collect()
    }
}

impl Estimator for GaussianNaiveBayes {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (classes, codes) = encode_classes(y)?;
        let (n_classes, n_features) = (classes.len(), x.ncols());

        let mut counts = vec![0usize; n_classes];
        let mut means = Array2::<f64>::zeros((n_classes, n_features));
        let mut m2 = Array2::<f64>::zeros((n_classes, n_features));

        // Welford, one pass per row
        for (row, &c) in x.rows().into_iter().zip(codes.iter()) {
            counts[c] += 1;
            let count = counts[c] as f64;
            for (j, &val) in row.iter().enumerate() {
                let delta = val - means[[c, j]];
                means[[c, j]] += delta / count;
                m2[[c, j]] += delta * (val - means[[c, j]]);
            }
        }

        let max_var = x
            .columns()
            .into_iter()
            .map(|col| {
                let mean = col.sum() / col.len() as f64;
                col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / col.len() as f64
            })
            .fold(0.0, f64::max);
        let epsilon = if max_var > 0.0 {
            self.var_smoothing * max_var
        } else {
            self.var_smoothing
        };

        let mut variances = Array2::<f64>::zeros((n_classes, n_features));
        for c in 0..n_classes {
            for j in 0..n_features {
                variances[[c, j]] = m2[[c, j]] / counts[c] as f64 + epsilon;
            }
        }

        let n = y.len() as f64;
        self.log_priors = counts.iter().map(|&k| (k as f64 / n).ln()).collect();
        self.classes = classes;
        self.means = means;
        self.variances = variances;
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
        check_n_features(self.means.ncols(), x)?;

        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for (i, row) in x.rows().into_iter().enumerate() {
            let jll = self.joint_log_likelihood(row);
            // log-sum-exp
            let max = jll.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let total: f64 = jll.iter().map(|v| (v - max).exp()).sum();
            for (c, v) in jll.iter().enumerate() {
                proba[[i, c]] = (v - max).exp() / total;
            }
        }
        Ok(proba)
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

//! K-nearest neighbors for classification and regression

use super::{argmax_labels, check_fit_input, check_n_features, encode_classes, Estimator};
use crate::error::{KolosalError, Result};
use crate::pipeline::{param_str, param_usize, Hyperparameters};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How neighbors are weighted in the vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScheme {
    #[default]
    Uniform,
    /// Inverse distance; exact matches take the whole vote
    Distance,
}

/// Brute-force KNN over Euclidean distance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNearestNeighbors {
    pub n_neighbors: usize,
    pub weights: WeightScheme,
    classification: bool,
    x_train: Option<Array2<f64>>,
    y_train: Array1<f64>,
    // Class code of each training row (classification only)
    codes: Vec<usize>,
    classes: Vec<f64>,
}

impl KNearestNeighbors {
    pub fn new(n_neighbors: usize, weights: WeightScheme, classification: bool) -> Self {
        Self {
            n_neighbors,
            weights,
            classification,
            x_train: None,
            y_train: Array1::zeros(0),
            codes: Vec::new(),
            classes: Vec::new(),
        }
    }

    pub fn from_params(params: &Hyperparameters, classification: bool) -> Result<Self> {
        let n_neighbors = param_usize(params, "n_neighbors", 5)?;
        if n_neighbors == 0 {
            return Err(KolosalError::invalid_param("n_neighbors", n_neighbors, "must be at least 1"));
        }
        let weights = match param_str(params, "weights", "uniform")? {
            "uniform" => WeightScheme::Uniform,
            "distance" => WeightScheme::Distance,
            other => {
                return Err(KolosalError::invalid_param(
                    "weights",
                    other,
                    "expected uniform or distance",
                ))
            }
        };
        Ok(Self::new(n_neighbors, weights, classification))
    }

    /// `(training row, weight)` for the k nearest rows, nearest first
    fn neighbors(&self, x_train: &Array2<f64>, query: ArrayView1<'_, f64>) -> Vec<(usize, f64)> {
        let mut distances: Vec<(usize, f64)> = x_train
            .rows()
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                let d: f64 = row
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                (i, d.sqrt())
            })
            .collect();
        distances.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        distances.truncate(self.n_neighbors.min(x_train.nrows()));

        match self.weights {
            WeightScheme::Uniform => distances.into_iter().map(|(i, _)| (i, 1.0)).collect(),
            WeightScheme::Distance => {
                if distances.iter().any(|(_, d)| *d == 0.0) {
                    distances
                        .into_iter()
                        .filter(|(_, d)| *d == 0.0)
                        .map(|(i, _)| (i, 1.0))
                        .collect()
                } else {
                    distances.into_iter().map(|(i, d)| (i, 1.0 / d)).collect()
                }
            }
        }
    }

    fn fitted_train(&self) -> Result<&Array2<f64>> {
        self.x_train.as_ref().ok_or(KolosalError::ModelNotFitted)
    }
}

impl Estimator for KNearestNeighbors {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.classification {
            let (classes, codes) = encode_classes(y)?;
            self.classes = classes;
            self.codes = codes;
        }
        self.x_train = Some(x.clone());
        self.y_train = y.clone();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.classification {
            let proba = self.predict_proba(x)?;
            return Ok(argmax_labels(&proba, &self.classes));
        }

        let x_train = self.fitted_train()?;
        check_n_features(x_train.ncols(), x)?;
        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = self.neighbors(x_train, x.row(i));
                let total: f64 = neighbors.iter().map(|(_, w)| w).sum();
                neighbors
                    .iter()
                    .map(|(j, w)| self.y_train[*j] * w)
                    .sum::<f64>()
                    / total
            })
            .collect();
        Ok(Array1::from_vec(predictions))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.classification {
            return Err(KolosalError::Unsupported(
                "predict_proba on a KNN regressor".to_string(),
            ));
        }
        let x_train = self.fitted_train()?;
        check_n_features(x_train.ncols(), x)?;
        let n_classes = self.classes.len();

        let rows: Vec<Vec<f64>> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let mut votes = vec![0.0; n_classes];
                for (j, w) in self.neighbors(x_train, x.row(i)) {
                    votes[self.codes[j]] += w;
                }
                let total: f64 = votes.iter().sum();
                votes.iter().map(|v| v / total).collect()
            })
            .collect();

        let mut proba = Array2::<f64>::zeros((x.nrows(), n_classes));
        for (i, row) in rows.into_iter().enumerate() {
            for (c, p) in row.into_iter().enumerate() {
                proba[[i, c]] = p;
            }
        }
        Ok(proba)
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

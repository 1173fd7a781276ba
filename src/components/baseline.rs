//! Baseline estimators that ignore the features

use super::{check_fit_input, encode_classes, Estimator};
use crate::error::{KolosalError, Result};
use crate::pipeline::{param_str, Hyperparameters};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Predicts the most frequent class seen during fit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineClassifier {
    classes: Vec<f64>,
    priors: Vec<f64>,
    mode: Option<f64>,
}

impl BaselineClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: &Hyperparameters) -> Result<Self> {
        match param_str(params, "strategy", "mode")? {
            "mode" => Ok(Self::new()),
            other => Err(KolosalError::invalid_param("strategy", other, "expected mode")),
        }
    }
}

impl Estimator for BaselineClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (classes, codes) = encode_classes(y)?;
        let mut counts = vec![0usize; classes.len()];
        for code in codes {
            counts[code] += 1;
        }

        // Ties go to the smallest label
        let mut best = 0;
        for (i, count) in counts.iter().enumerate() {
            if *count > counts[best] {
                best = i;
            }
        }

        let n = y.len() as f64;
        self.priors = counts.iter().map(|c| *c as f64 / n).collect();
        self.mode = classes.get(best).copied();
        self.classes = classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mode = self.mode.ok_or(KolosalError::ModelNotFitted)?;
        Ok(Array1::from_elem(x.nrows(), mode))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.mode.is_none() {
            return Err(KolosalError::ModelNotFitted);
        }
        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for mut row in proba.rows_mut() {
            row.assign(&Array1::from(self.priors.clone()));
        }
        Ok(proba)
    }

    fn classes(&self) -> &[f64] {
        &self.classes
    }
}

/// Central tendency used by [`BaselineRegressor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineStrategy {
    Mean,
    Median,
}

/// Predicts the mean or median of the training target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineRegressor {
    pub strategy: BaselineStrategy,
    value: Option<f64>,
}

impl BaselineRegressor {
    pub fn new(strategy: BaselineStrategy) -> Self {
        Self {
            strategy,
            value: None,
        }
    }

    pub fn from_params(params: &Hyperparameters) -> Result<Self> {
        let strategy = match param_str(params, "strategy", "mean")? {
            "mean" => BaselineStrategy::Mean,
            "median" => BaselineStrategy::Median,
            other => {
                return Err(KolosalError::invalid_param(
                    "strategy",
                    other,
                    "expected mean or median",
                ))
            }
        };
        Ok(Self::new(strategy))
    }
}

impl Estimator for BaselineRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let value = match self.strategy {
            BaselineStrategy::Mean => y.sum() / y.len() as f64,
            BaselineStrategy::Median => {
                let mut sorted = y.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
        };
        self.value = Some(value);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let value = self.value.ok_or(KolosalError::ModelNotFitted)?;
        Ok(Array1::from_elem(x.nrows(), value))
    }
}

/// Predicts the last observed target value for every future row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesBaseline {
    classification: bool,
    last: Option<f64>,
    classes: Vec<f64>,
}

impl TimeSeriesBaseline {
    pub fn new(classification: bool) -> Self {
        Self {
            classification,
            last: None,
            classes: Vec::new(),
        }
    }
}

impl Estimator for TimeSeriesBaseline {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if self.classification {
            self.classes = encode_classes(y)?.0;
        }
        self.last = y.iter().last().copied();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let last = self.last.ok_or(KolosalError::ModelNotFitted)?;
        Ok(Array1::from_elem(x.nrows(), last))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.classification {
            return Err(KolosalError::Unsupported(
                "predict_proba on a regression baseline".to_string(),
            ));
        }
        let last = self.last.ok_or(KolosalError::ModelNotFitted)?;
        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        if let Some(col) = self.classes.iter().position(|c| *c == last) {
            proba.column_mut(col).fill(1.0);
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
    use ndarray::array;

    #[test]
    fn test_classifier_mode_and_priors() {
        let x = Array2::zeros((5, 1));
        let y = array![1.0, 0.0, 1.0, 2.0, 1.0];
        let mut model = BaselineClassifier::new();
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), Array1::from_elem(5, 1.0));
        let proba = model.predict_proba(&Array2::zeros((1, 1))).unwrap();
        assert_eq!(proba, array![[0.2, 0.6, 0.2]]);
    }

    #[test]
    fn test_classifier_tie_takes_smallest_label() {
        let x = Array2::zeros((4, 1));
        let mut model = BaselineClassifier::new();
        model.fit(&x, &array![1.0, 0.0, 1.0, 0.0]).unwrap();
        assert_eq!(model.predict(&Array2::zeros((1, 1))).unwrap()[0], 0.0);
    }

    #[test]
    fn test_regressor_strategies() {
        let x = Array2::zeros((4, 1));
        let y = array![1.0, 2.0, 3.0, 10.0];
        let mut mean = BaselineRegressor::new(BaselineStrategy::Mean);
        mean.fit(&x, &y).unwrap();
        assert_eq!(mean.predict(&x).unwrap()[0], 4.0);

        let mut median = BaselineRegressor::new(BaselineStrategy::Median);
        median.fit(&x, &y).unwrap();
        assert_eq!(median.predict(&x).unwrap()[0], 2.5);
    }

    #[test]
    fn test_time_series_last_value() {
        let x = Array2::zeros((3, 1));
        let mut model = TimeSeriesBaseline::new(true);
        model.fit(&x, &array![0.0, 1.0, 0.0]).unwrap();
        assert_eq!(model.predict(&Array2::zeros((2, 1))).unwrap(), array![0.0, 0.0]);
        assert_eq!(model.predict_proba(&Array2::zeros((1, 1))).unwrap(), array![[1.0, 0.0]]);
    }
}

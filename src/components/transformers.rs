//! Feature transformers: missing-value imputation and standardization

use super::Transformer;
use crate::error::{KolosalError, Result};
use crate::pipeline::{param_str, Hyperparameters};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// How a column's missing values are filled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    Mean,
    Median,
    MostFrequent,
}

impl ImputeStrategy {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "mean" => Ok(ImputeStrategy::Mean),
            "median" => Ok(ImputeStrategy::Median),
            "most_frequent" => Ok(ImputeStrategy::MostFrequent),
            other => Err(KolosalError::invalid_param(
                "impute_strategy",
                other,
                "expected mean, median or most_frequent",
            )),
        }
    }

    /// Fill value for the observed (non-NaN) entries of a column
    fn fill_value(self, mut observed: Vec<f64>) -> f64 {
        if observed.is_empty() {
            return 0.0;
        }
        match self {
            ImputeStrategy::Mean => observed.iter().sum::<f64>() / observed.len() as f64,
            ImputeStrategy::Median => {
                observed.sort_by(f64::total_cmp);
                let mid = observed.len() / 2;
                if observed.len() % 2 == 0 {
                    (observed[mid - 1] + observed[mid]) / 2.0
                } else {
                    observed[mid]
                }
            }
            ImputeStrategy::MostFrequent => {
                observed.sort_by(f64::total_cmp);
                // Longest run wins; the first (smallest) value wins ties
                let (mut best, mut best_count) = (observed[0], 0);
                let mut i = 0;
                while i < observed.len() {
                    let mut j = i;
                    while j < observed.len() && observed[j] == observed[i] {
                        j += 1;
                    }
                    if j - i > best_count {
                        best = observed[i];
                        best_count = j - i;
                    }
                    i = j;
                }
                best
            }
        }
    }
}

/// Replaces NaN entries with a per-column statistic learned at fit time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleImputer {
    pub strategy: ImputeStrategy,
    fill_values: Option<Array1<f64>>,
}

impl SimpleImputer {
    pub fn new(strategy: ImputeStrategy) -> Self {
        Self {
            strategy,
            fill_values: None,
        }
    }

    pub fn from_params(params: &Hyperparameters) -> Result<Self> {
        let strategy = ImputeStrategy::parse(param_str(params, "impute_strategy", "mean")?)?;
        Ok(Self::new(strategy))
    }
}

impl Transformer for SimpleImputer {
    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        let fill_values = x
            .columns()
            .into_iter()
            .map(|col| {
                let observed: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
                self.strategy.fill_value(observed)
            })
            .collect();
        self.fill_values = Some(fill_values);
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let fill_values = self.fill_values.as_ref().ok_or(KolosalError::ModelNotFitted)?;
        super::check_n_features(fill_values.len(), x)?;

        let mut out = x.clone();
        for (mut col, fill) in out.columns_mut().into_iter().zip(fill_values.iter()) {
            col.mapv_inplace(|v| if v.is_nan() { *fill } else { v });
        }
        Ok(out)
    }
}

/// Centers each column on its mean and scales it to unit variance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Option<Array1<f64>>,
    scales: Option<Array1<f64>>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transformer for StandardScaler {
    fn fit(&mut self, x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        let n = x.nrows().max(1) as f64;
        let mut means = Array1::<f64>::zeros(x.ncols());
        let mut scales = Array1::<f64>::ones(x.ncols());

        for (j, col) in x.columns().into_iter().enumerate() {
            let mean = col.sum() / n;
            let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            means[j] = mean;
            // Constant columns pass through centered but unscaled
            scales[j] = if std > 0.0 && std.is_finite() { std } else { 1.0 };
        }

        self.means = Some(means);
        self.scales = Some(scales);
        Ok(())
    }

    fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (means, scales) = match (&self.means, &self.scales) {
            (Some(m), Some(s)) => (m, s),
            _ => return Err(KolosalError::ModelNotFitted),
        };
        super::check_n_features(means.len(), x)?;
        Ok((x - means) / scales)
    }
}

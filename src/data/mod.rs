//! Tabular datasets shared read-only across a search
//!
//! A [`Dataset`] wraps the feature matrix and target vector in `Arc`s so that
//! cloning it for a worker never copies the underlying buffers.

mod loader;

pub use loader::{load_csv, from_dataframe, LoadOptions};

use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Logical type of a feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Boolean,
    Datetime,
    /// Free text the pipelines cannot consume
    Text,
}

/// Name and logical type of a feature column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl FeatureColumn {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn numeric(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Numeric)
    }
}

/// Immutable feature matrix + target. Missing feature values are `NaN`.
#[derive(Debug, Clone)]
pub struct Dataset {
    x: Arc<Array2<f64>>,
    y: Arc<Array1<f64>>,
    columns: Arc<Vec<FeatureColumn>>,
    time_index: Option<usize>,
}

impl Dataset {
    /// Create a dataset of numeric columns named `feature_0..feature_n`
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        let columns = (0..x.ncols())
            .map(|i| FeatureColumn::numeric(format!("feature_{}", i)))
            .collect();
        Self::with_columns(x, y, columns)
    }

    /// Create a dataset with explicit column metadata
    pub fn with_columns(x: Array2<f64>, y: Array1<f64>, columns: Vec<FeatureColumn>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} target values", x.nrows()),
                actual: format!("{}", y.len()),
            });
        }
        if columns.len() != x.ncols() {
            return Err(KolosalError::ShapeError {
                expected: format!("{} column descriptors", x.ncols()),
                actual: format!("{}", columns.len()),
            });
        }

        Ok(Self {
            x: Arc::new(x),
            y: Arc::new(y),
            columns: Arc::new(columns),
            time_index: None,
        })
    }

    /// Mark a column as the time ordering of a time-series dataset
    pub fn with_time_index(mut self, column: &str) -> Result<Self> {
        let idx = self
            .column_index(column)
            .ok_or_else(|| KolosalError::NotFound(format!("time index column '{}'", column)))?;
        self.time_index = Some(idx);
        Ok(self)
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn time_index(&self) -> Option<usize> {
        self.time_index
    }

    /// Values of the time index column, if one was declared
    pub fn time_values(&self) -> Option<ArrayView1<'_, f64>> {
        self.time_index.map(|idx| self.x.column(idx))
    }

    /// Owned copy of the given rows, used to build fold partitions
    pub fn select_rows(&self, indices: &[usize]) -> (Array2<f64>, Array1<f64>) {
        (
            self.x.select(Axis(0), indices),
            self.y.select(Axis(0), indices),
        )
    }

    /// Sorted distinct finite target values
    pub fn classes(&self) -> Vec<f64> {
        unique_sorted(self.y.iter().copied())
    }

    /// Fraction of `NaN` entries in a column
    pub fn null_fraction(&self, column: usize) -> f64 {
        let n = self.n_samples();
        if n == 0 {
            return 0.0;
        }
        let nulls = self.x.column(column).iter().filter(|v| v.is_nan()).count();
        nulls as f64 / n as f64
    }
}

/// Sorted distinct finite values of an iterator
pub(crate) fn unique_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_shape_validation() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![0.0, 1.0, 1.0];
        assert!(Dataset::new(x, y).is_err());

        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = array![0.0, 1.0];
        let columns = vec![FeatureColumn::numeric("a")];
        assert!(Dataset::with_columns(x, y, columns).is_err());
    }

    #[test]
    fn test_clone_shares_buffers() {
        let ds = Dataset::new(array![[1.0], [2.0]], array![0.0, 1.0]).unwrap();
        let cloned = ds.clone();
        assert!(Arc::ptr_eq(&ds.x, &cloned.x));
        assert!(Arc::ptr_eq(&ds.y, &cloned.y));
    }

    #[test]
    fn test_select_rows_and_classes() {
        let ds = Dataset::new(
            array![[1.0], [2.0], [3.0], [4.0]],
            array![1.0, 0.0, 1.0, 2.0],
        )
        .unwrap();
        let (x, y) = ds.select_rows(&[3, 1]);
        assert_eq!(x, array![[4.0], [2.0]]);
        assert_eq!(y, array![2.0, 0.0]);
        assert_eq!(ds.classes(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_null_fraction_and_time_index() {
        let ds = Dataset::new(
            array![[f64::NAN, 1.0], [2.0, 2.0], [f64::NAN, 3.0], [4.0, 4.0]],
            array![0.0, 1.0, 0.0, 1.0],
        )
        .unwrap()
        .with_time_index("feature_1")
        .unwrap();
        assert_eq!(ds.null_fraction(0), 0.5);
        assert_eq!(ds.time_index(), Some(1));
        assert_eq!(ds.time_values().unwrap().to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
        assert!(ds.clone().with_time_index("missing").is_err());
    }
}

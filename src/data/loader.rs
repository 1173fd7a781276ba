//! Loading datasets from CSV through polars

use super::{ColumnKind, Dataset, FeatureColumn};
use crate::error::{KolosalError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Options for turning a frame into a [`Dataset`]
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// String columns to label-encode instead of treating as free text
    pub categorical: Vec<String>,
    /// Column holding the time ordering (time-series problems)
    pub time_index: Option<String>,
    /// Feature columns to keep; all non-target columns when empty
    pub feature_columns: Vec<String>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_categorical(mut self, columns: Vec<String>) -> Self {
        self.categorical = columns;
        self
    }

    pub fn with_time_index(mut self, column: impl Into<String>) -> Self {
        self.time_index = Some(column.into());
        self
    }

    pub fn with_feature_columns(mut self, columns: Vec<String>) -> Self {
        self.feature_columns = columns;
        self
    }
}

/// Load a CSV file with a header row
pub fn load_csv(path: impl AsRef<Path>, target: &str, options: &LoadOptions) -> Result<Dataset> {
    let path = path.as_ref();
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    debug!(path = %path.display(), rows = df.height(), cols = df.width(), "Loaded CSV");
    from_dataframe(&df, target, options)
}

/// Convert a polars frame into a dataset
pub fn from_dataframe(df: &DataFrame, target: &str, options: &LoadOptions) -> Result<Dataset> {
    let feature_names: Vec<String> = if options.feature_columns.is_empty() {
        df.get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != target)
            .map(|name| name.to_string())
            .collect()
    } else {
        options.feature_columns.clone()
    };

    let target_series = df
        .column(target)
        .map_err(|_| KolosalError::NotFound(format!("target column '{}'", target)))?
        .as_materialized_series();
    let (y, _) = series_to_values(target_series, true)?;

    let mut columns = Vec::with_capacity(feature_names.len());
    let mut data = Vec::with_capacity(feature_names.len());
    for name in &feature_names {
        let series = df
            .column(name)
            .map_err(|_| KolosalError::NotFound(format!("feature column '{}'", name)))?
            .as_materialized_series();
        let declared_categorical = options.categorical.iter().any(|c| c == name);
        let (values, kind) = series_to_values(series, declared_categorical)?;
        columns.push(FeatureColumn::new(name.clone(), kind));
        data.push(values);
    }

    let n_rows = df.height();
    let x = Array2::from_shape_fn((n_rows, data.len()), |(r, c)| data[c][r]);
    let dataset = Dataset::with_columns(x, Array1::from_vec(y), columns)?;

    match &options.time_index {
        Some(column) => dataset.with_time_index(column),
        None => Ok(dataset),
    }
}

/// Read a series as `f64` values (nulls become `NaN`) and infer its kind.
///
/// String series are label-encoded in sorted order when `encode_strings` is
/// set, otherwise they come back as all-`NaN` `Text` columns.
fn series_to_values(series: &Series, encode_strings: bool) -> Result<(Vec<f64>, ColumnKind)> {
    let dtype = series.dtype();

    if matches!(dtype, DataType::String) {
        let ca = series.str()?;
        if !encode_strings {
            return Ok((vec![f64::NAN; series.len()], ColumnKind::Text));
        }
        let mut codes: BTreeMap<&str, f64> = BTreeMap::new();
        for value in ca.into_iter().flatten() {
            codes.entry(value).or_insert(0.0);
        }
        for (i, code) in codes.values_mut().enumerate() {
            *code = i as f64;
        }
        let values = ca
            .into_iter()
            .map(|v| v.and_then(|s| codes.get(s).copied()).unwrap_or(f64::NAN))
            .collect();
        return Ok((values, ColumnKind::Categorical));
    }

    let kind = if matches!(dtype, DataType::Boolean) {
        ColumnKind::Boolean
    } else if dtype.is_temporal() {
        ColumnKind::Datetime
    } else if dtype.is_numeric() {
        ColumnKind::Numeric
    } else {
        return Err(KolosalError::DataError(format!(
            "Column '{}' has unsupported dtype {}",
            series.name(),
            dtype
        )));
    };

    let physical = series.to_physical_repr();
    let cast = physical.cast(&DataType::Float64)?;
    let values = cast
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();

    Ok((values, kind))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df!(
            "age" => &[Some(21.0), None, Some(35.0), Some(40.0)],
            "city" => &["paris", "berlin", "paris", "rome"],
            "note" => &["a", "b", "c", "d"],
            "t" => &[1i64, 2, 3, 4],
            "target" => &[0i64, 1, 0, 1]
        )
        .unwrap()
    }

    #[test]
    fn test_from_dataframe_kinds() {
        let options = LoadOptions::new().with_categorical(vec!["city".to_string()]);
        let ds = from_dataframe(&frame(), "target", &options).unwrap();

        assert_eq!(ds.n_samples(), 4);
        assert_eq!(ds.n_features(), 4);
        let kinds: Vec<ColumnKind> = ds.columns().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![ColumnKind::Numeric, ColumnKind::Categorical, ColumnKind::Text, ColumnKind::Numeric]
        );
        assert!(ds.x()[[1, 0]].is_nan());
        // berlin < paris < rome
        assert_eq!(ds.x().column(1).to_vec(), vec![1.0, 0.0, 1.0, 2.0]);
        assert_eq!(ds.y().to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_missing_target() {
        let result = from_dataframe(&frame(), "label", &LoadOptions::new());
        assert!(matches!(result, Err(KolosalError::NotFound(_))));
    }

    #[test]
    fn test_time_index_and_feature_subset() {
        let options = LoadOptions::new()
            .with_feature_columns(vec!["age".to_string(), "t".to_string()])
            .with_time_index("t");
        let ds = from_dataframe(&frame(), "target", &options).unwrap();
        assert_eq!(ds.n_features(), 2);
        assert_eq!(ds.time_index(), Some(1));
    }
}

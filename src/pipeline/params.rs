//! Hyperparameter values and the ranges components declare for tuning

use crate::error::{KolosalError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            // Debug keeps the decimal point, so 1.0 and 1 stay distinct
            ParamValue::Float(v) => write!(f, "{:?}", v),
            ParamValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

/// Hyperparameters of one component, in stable key order
pub type Hyperparameters = BTreeMap<String, ParamValue>;

/// Build a [`Hyperparameters`] map from `(name, value)` pairs
pub fn hyperparameters<I, K, V>(pairs: I) -> Hyperparameters
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<ParamValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Range a hyperparameter may be tuned over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HyperparameterRange {
    Float { low: f64, high: f64, log_scale: bool },
    Int { low: i64, high: i64 },
    Categorical(Vec<ParamValue>),
}

impl HyperparameterRange {
    pub fn float(low: f64, high: f64) -> Self {
        HyperparameterRange::Float {
            low,
            high,
            log_scale: false,
        }
    }

    pub fn log_float(low: f64, high: f64) -> Self {
        HyperparameterRange::Float {
            low,
            high,
            log_scale: true,
        }
    }

    pub fn int(low: i64, high: i64) -> Self {
        HyperparameterRange::Int { low, high }
    }

    pub fn categorical<V: Into<ParamValue>>(choices: impl IntoIterator<Item = V>) -> Self {
        HyperparameterRange::Categorical(choices.into_iter().map(Into::into).collect())
    }

    /// Uniform sample from the range (log-uniform for log-scale floats)
    pub fn sample(&self, rng: &mut impl Rng) -> ParamValue {
        match self {
            HyperparameterRange::Float { low, high, log_scale } => {
                let val = if *log_scale {
                    let (log_low, log_high) = (low.ln(), high.ln());
                    (rng.gen::<f64>() * (log_high - log_low) + log_low).exp()
                } else {
                    rng.gen::<f64>() * (high - low) + low
                };
                ParamValue::Float(round_significant(val.clamp(*low, *high)))
            }
            HyperparameterRange::Int { low, high } => ParamValue::Int(rng.gen_range(*low..=*high)),
            HyperparameterRange::Categorical(choices) => {
                choices[rng.gen_range(0..choices.len())].clone()
            }
        }
    }

    /// Whether `value` lies in this range
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (HyperparameterRange::Float { low, high, .. }, v) => v
                .as_f64()
                .map(|v| v >= *low && v <= *high)
                .unwrap_or(false),
            (HyperparameterRange::Int { low, high }, ParamValue::Int(v)) => v >= low && v <= high,
            (HyperparameterRange::Categorical(choices), v) => choices.contains(v),
            _ => false,
        }
    }
}

/// Round to 6 significant digits so tuned values produce readable, stable signatures
pub fn round_significant(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor() as i32;
    let factor = 10f64.powi(5 - magnitude);
    (value * factor).round() / factor
}

pub(crate) fn param_f64(params: &Hyperparameters, name: &str, default: f64) -> Result<f64> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => v
            .as_f64()
            .ok_or_else(|| KolosalError::invalid_param(name, v, "expected a number")),
    }
}

pub(crate) fn param_usize(params: &Hyperparameters, name: &str, default: usize) -> Result<usize> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => match v.as_i64() {
            Some(i) if i >= 0 => Ok(i as usize),
            _ => Err(KolosalError::invalid_param(name, v, "expected a non-negative integer")),
        },
    }
}

pub(crate) fn param_str<'a>(params: &'a Hyperparameters, name: &str, default: &'a str) -> Result<&'a str> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => v
            .as_str()
            .ok_or_else(|| KolosalError::invalid_param(name, v, "expected a string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_display_keeps_float_point() {
        assert_eq!(ParamValue::Float(1.0).to_string(), "1.0");
        assert_eq!(ParamValue::Int(1).to_string(), "1");
        assert_eq!(ParamValue::from("mean").to_string(), "mean");
    }

    #[test]
    fn test_sample_within_range() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let ranges = [
            HyperparameterRange::log_float(1e-4, 10.0),
            HyperparameterRange::float(-1.0, 1.0),
            HyperparameterRange::int(2, 5),
            HyperparameterRange::categorical(["uniform", "distance"]),
        ];
        for range in &ranges {
            for _ in 0..50 {
                let value = range.sample(&mut rng);
                assert!(range.contains(&value), "{:?} not in {:?}", value, range);
            }
        }
    }

    #[test]
    fn test_round_significant() {
        assert_eq!(round_significant(0.123456789), 0.123457);
        assert_eq!(round_significant(12345.678), 12345.7);
        assert_eq!(round_significant(0.0), 0.0);
    }

    #[test]
    fn test_param_accessors() {
        let params = hyperparameters([("k", ParamValue::Int(3)), ("w", ParamValue::from("uniform"))]);
        assert_eq!(param_usize(&params, "k", 5).unwrap(), 3);
        assert_eq!(param_usize(&params, "missing", 5).unwrap(), 5);
        assert_eq!(param_str(&params, "w", "distance").unwrap(), "uniform");
        assert!(param_f64(&params, "w", 1.0).is_err());

        let negative = hyperparameters([("k", ParamValue::Int(-1))]);
        assert!(param_usize(&negative, "k", 5).is_err());
    }
}

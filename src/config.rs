//! Search configuration

use crate::components::ModelFamily;
use crate::error::{KolosalError, Result};
use crate::evaluation::DataSplitter;
use crate::generator::{GeneratorSettings, SearchStrategy};
use crate::objectives::objective_by_name;
use crate::problem::ProblemType;
use crate::scheduler::Budget;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Batch limit applied to an adaptive search that has no other bound
pub const DEFAULT_MAX_BATCHES: usize = 5;

/// Configuration for an [`AutoMLSearch`](crate::search::AutoMLSearch)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Problem the search is run for
    pub problem_type: ProblemType,

    /// Objective name; `None` picks the default for the problem type
    pub objective: Option<String>,

    /// Extra objectives reported next to the primary score
    pub additional_objectives: Vec<String>,

    /// Cross-validation folds
    pub n_folds: usize,

    /// Maximum number of trials to start
    pub max_iterations: Option<usize>,

    /// Wall-clock budget in seconds
    pub max_time_secs: Option<f64>,

    /// Maximum number of batches, baselines and defaults included
    pub max_batches: Option<usize>,

    /// Parallel workers. Negative values count back from the number of cores
    /// (-1 is all cores, -2 all but one)
    pub n_jobs: i64,

    pub random_seed: u64,

    pub strategy: SearchStrategy,
    pub pipelines_per_batch: usize,
    pub top_k: usize,

    /// Probability that a tuned candidate is sampled fresh instead of
    /// perturbed around its parent
    pub exploration: f64,

    pub max_resample_attempts: usize,

    /// Restricts the model families searched
    pub allowed_model_families: Option<Vec<ModelFamily>>,

    /// Stop after this many non-improving successful trials
    pub patience: Option<usize>,

    /// Minimum relative improvement that resets patience
    pub tolerance: f64,

    /// Tune the decision threshold of binary pipelines
    pub optimize_thresholds: bool,

    /// Refit the best pipeline on the full dataset when the search ends
    pub train_best_pipeline: bool,

    pub shuffle_folds: bool,

    /// Rows left out between train and test windows for time series
    pub time_series_gap: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            problem_type: ProblemType::Binary,
            objective: None,
            additional_objectives: Vec::new(),
            n_folds: 3,
            max_iterations: None,
            max_time_secs: None,
            max_batches: None,
            n_jobs: 1,
            random_seed: 0,
            strategy: SearchStrategy::Adaptive,
            pipelines_per_batch: 5,
            top_k: 3,
            exploration: 0.2,
            max_resample_attempts: 20,
            allowed_model_families: None,
            patience: None,
            tolerance: 0.0,
            optimize_thresholds: true,
            train_best_pipeline: true,
            shuffle_folds: true,
            time_series_gap: 0,
        }
    }
}

impl SearchConfig {
    pub fn new(problem_type: ProblemType) -> Self {
        Self {
            problem_type,
            ..Self::default()
        }
    }

    /// Reads a JSON config; missing fields take their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: SearchConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_objective(mut self, name: impl Into<String>) -> Self {
        self.objective = Some(name.into());
        self
    }

    pub fn with_additional_objectives(mut self, names: Vec<String>) -> Self {
        self.additional_objectives = names;
        self
    }

    pub fn with_n_folds(mut self, n: usize) -> Self {
        self.n_folds = n;
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn with_max_time(mut self, secs: f64) -> Self {
        self.max_time_secs = Some(secs);
        self
    }

    pub fn with_max_batches(mut self, n: usize) -> Self {
        self.max_batches = Some(n);
        self
    }

    pub fn with_n_jobs(mut self, n: i64) -> Self {
        self.n_jobs = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_pipelines_per_batch(mut self, n: usize) -> Self {
        self.pipelines_per_batch = n;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_exploration(mut self, exploration: f64) -> Self {
        self.exploration = exploration;
        self
    }

    pub fn with_allowed_model_families(mut self, families: Vec<ModelFamily>) -> Self {
        self.allowed_model_families = Some(families);
        self
    }

    pub fn with_early_stopping(mut self, patience: usize, tolerance: f64) -> Self {
        self.patience = Some(patience);
        self.tolerance = tolerance;
        self
    }

    pub fn with_threshold_tuning(mut self, enabled: bool) -> Self {
        self.optimize_thresholds = enabled;
        self
    }

    pub fn with_train_best_pipeline(mut self, enabled: bool) -> Self {
        self.train_best_pipeline = enabled;
        self
    }

    pub fn with_shuffle_folds(mut self, enabled: bool) -> Self {
        self.shuffle_folds = enabled;
        self
    }

    pub fn with_time_series_gap(mut self, gap: usize) -> Self {
        self.time_series_gap = gap;
        self
    }

    /// Checks every field that can be checked without data
    pub fn validate(&self) -> Result<()> {
        if self.n_folds < 2 {
            return Err(KolosalError::ConfigError(format!(
                "n_folds must be at least 2, got {}",
                self.n_folds
            )));
        }
        if self.max_iterations == Some(0) {
            return Err(KolosalError::ConfigError("max_iterations must be positive".to_string()));
        }
        if self.max_batches == Some(0) {
            return Err(KolosalError::ConfigError("max_batches must be positive".to_string()));
        }
        if let Some(secs) = self.max_time_secs {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(KolosalError::ConfigError(format!(
                    "max_time_secs must be a positive number, got {}",
                    secs
                )));
            }
        }
        if self.pipelines_per_batch == 0 || self.top_k == 0 {
            return Err(KolosalError::ConfigError(
                "pipelines_per_batch and top_k must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.exploration) {
            return Err(KolosalError::ConfigError(format!(
                "exploration must be within [0, 1], got {}",
                self.exploration
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(KolosalError::ConfigError(format!(
                "tolerance must be non-negative, got {}",
                self.tolerance
            )));
        }
        if self.patience == Some(0) {
            return Err(KolosalError::ConfigError("patience must be positive".to_string()));
        }
        if let Some(families) = &self.allowed_model_families {
            if families.is_empty() {
                return Err(KolosalError::ConfigError(
                    "allowed_model_families must not be empty".to_string(),
                ));
            }
        }
        if let Some(name) = &self.objective {
            objective_by_name(name)?;
        }
        for name in &self.additional_objectives {
            objective_by_name(name)?;
        }
        self.resolved_n_jobs()?;
        Ok(())
    }

    /// Number of worker threads after resolving negative `n_jobs`
    pub fn resolved_n_jobs(&self) -> Result<usize> {
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        resolve_n_jobs(self.n_jobs, cores)
    }

    pub fn budget(&self) -> Budget {
        Budget {
            max_iterations: self.max_iterations,
            max_time: self.max_time_secs.map(Duration::from_secs_f64),
        }
    }

    /// Batches the search may run.
    ///
    /// An adaptive search with no iteration, time, batch or patience bound
    /// would never end, so it gets [`DEFAULT_MAX_BATCHES`].
    pub fn batch_limit(&self) -> Option<usize> {
        let unbounded = self.strategy == SearchStrategy::Adaptive
            && self.max_iterations.is_none()
            && self.max_time_secs.is_none()
            && self.patience.is_none();
        match self.max_batches {
            Some(n) => Some(n),
            None if unbounded => Some(DEFAULT_MAX_BATCHES),
            None => None,
        }
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            strategy: self.strategy,
            pipelines_per_batch: self.pipelines_per_batch,
            top_k: self.top_k,
            exploration: self.exploration,
            max_resample_attempts: self.max_resample_attempts,
            allowed_families: self.allowed_model_families.clone(),
            random_seed: self.random_seed,
        }
    }

    pub fn splitter(&self) -> DataSplitter {
        DataSplitter::for_problem(
            self.problem_type,
            self.n_folds,
            self.shuffle_folds,
            self.time_series_gap,
        )
        .with_seed(self.random_seed)
    }
}

fn resolve_n_jobs(n_jobs: i64, cores: usize) -> Result<usize> {
    if n_jobs > 0 {
        return Ok(n_jobs as usize);
    }
    if n_jobs == 0 {
        return Err(KolosalError::ConfigError("n_jobs must not be 0".to_string()));
    }
    let resolved = cores as i64 + 1 + n_jobs;
    if resolved < 1 {
        return Err(KolosalError::ConfigError(format!(
            "n_jobs = {} leaves no workers on {} cores",
            n_jobs, cores
        )));
    }
    Ok(resolved as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SearchConfig::default();
        assert_eq!(config.n_folds, 3);
        assert_eq!(config.n_jobs, 1);
        assert_eq!(config.pipelines_per_batch, 5);
        assert!(config.optimize_thresholds);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = SearchConfig::new(ProblemType::Regression)
            .with_objective("mse")
            .with_max_iterations(10)
            .with_max_time(2.5)
            .with_early_stopping(3, 0.01);
        assert_eq!(config.problem_type, ProblemType::Regression);
        assert_eq!(config.budget().max_iterations, Some(10));
        assert_eq!(config.budget().max_time, Some(Duration::from_millis(2500)));
        assert_eq!(config.patience, Some(3));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        assert!(SearchConfig::default().with_n_folds(1).validate().is_err());
        assert!(SearchConfig::default().with_n_jobs(0).validate().is_err());
        assert!(SearchConfig::default().with_exploration(1.5).validate().is_err());
        assert!(SearchConfig::default().with_max_time(-1.0).validate().is_err());
        assert!(SearchConfig::default().with_objective("nope").validate().is_err());
        assert!(SearchConfig::default()
            .with_allowed_model_families(Vec::new())
            .validate()
            .is_err());
    }

    #[test]
    fn test_batch_limit() {
        assert_eq!(SearchConfig::default().batch_limit(), Some(DEFAULT_MAX_BATCHES));
        assert_eq!(SearchConfig::default().with_max_batches(2).batch_limit(), Some(2));
        assert_eq!(SearchConfig::default().with_max_iterations(10).batch_limit(), None);
        assert_eq!(SearchConfig::default().with_max_time(1.0).batch_limit(), None);
        assert_eq!(SearchConfig::default().with_early_stopping(3, 0.0).batch_limit(), None);
        assert_eq!(
            SearchConfig::default()
                .with_strategy(SearchStrategy::DefaultSweep)
                .batch_limit(),
            None
        );
        assert!(SearchConfig::default().with_max_batches(0).validate().is_err());
    }

    #[test]
    fn test_resolve_n_jobs() {
        assert_eq!(resolve_n_jobs(4, 8).unwrap(), 4);
        assert_eq!(resolve_n_jobs(-1, 8).unwrap(), 8);
        assert_eq!(resolve_n_jobs(-2, 8).unwrap(), 7);
        assert!(resolve_n_jobs(-9, 8).is_err());
        assert!(resolve_n_jobs(0, 8).is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"problem_type": "multiclass", "n_folds": 4, "allowed_model_families": ["decision_tree"]}}"#
        )
        .unwrap();

        let config = SearchConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.problem_type, ProblemType::Multiclass);
        assert_eq!(config.n_folds, 4);
        assert_eq!(config.allowed_model_families, Some(vec![ModelFamily::DecisionTree]));
        assert_eq!(config.top_k, 3);
    }

    #[test]
    fn test_generator_settings() {
        let settings = SearchConfig::default().with_seed(9).with_top_k(2).generator_settings();
        assert_eq!(settings.random_seed, 9);
        assert_eq!(settings.top_k, 2);
    }
}

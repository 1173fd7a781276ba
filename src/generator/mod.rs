//! Candidate generation
//!
//! A [`CandidateGenerator`] proposes batches of pipelines given what has been
//! evaluated so far. An empty batch tells the search there is nothing left to
//! try.

mod iterative;
mod tuner;

pub use iterative::{GeneratorSettings, IterativeGenerator};
pub use tuner::Tuner;

use crate::error::{KolosalError, Result};
use crate::evaluation::TrialResult;
use crate::pipeline::PipelineCandidate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// What is left of the search budget when a batch is requested
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BudgetRemaining {
    pub iterations_left: Option<usize>,
    pub time_left: Option<Duration>,
}

impl BudgetRemaining {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn is_exhausted(&self) -> bool {
        self.iterations_left == Some(0) || self.time_left.is_some_and(|t| t.is_zero())
    }
}

/// Proposes pipeline candidates in batches
pub trait CandidateGenerator: Send {
    /// Next batch of candidates.
    ///
    /// `history` holds successful trials best first, followed by failed
    /// trials in completion order. Returning an empty batch ends the search.
    fn next_batch(
        &mut self,
        history: &[Arc<TrialResult>],
        budget: &BudgetRemaining,
    ) -> Result<Vec<PipelineCandidate>>;

    fn name(&self) -> &str;
}

/// How far the generator goes past the baselines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Baselines only
    BaselineOnly,
    /// Baselines, then every model family with default hyperparameters
    DefaultSweep,
    /// Defaults, then tuned variants of the best families until the budget runs out
    #[default]
    Adaptive,
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchStrategy::BaselineOnly => "baseline_only",
            SearchStrategy::DefaultSweep => "default_sweep",
            SearchStrategy::Adaptive => "adaptive",
        };
        f.write_str(name)
    }
}

impl FromStr for SearchStrategy {
    type Err = KolosalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "baseline_only" | "baseline" => Ok(SearchStrategy::BaselineOnly),
            "default_sweep" | "defaults" => Ok(SearchStrategy::DefaultSweep),
            "adaptive" => Ok(SearchStrategy::Adaptive),
            other => Err(KolosalError::ConfigError(format!("Unknown search strategy '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_exhaustion() {
        assert!(!BudgetRemaining::unlimited().is_exhausted());
        let none_left = BudgetRemaining {
            iterations_left: Some(0),
            time_left: None,
        };
        assert!(none_left.is_exhausted());
        let no_time = BudgetRemaining {
            iterations_left: Some(4),
            time_left: Some(Duration::ZERO),
        };
        assert!(no_time.is_exhausted());
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("default-sweep".parse::<SearchStrategy>().unwrap(), SearchStrategy::DefaultSweep);
        assert_eq!(SearchStrategy::default(), SearchStrategy::Adaptive);
        assert!("random".parse::<SearchStrategy>().is_err());
    }
}

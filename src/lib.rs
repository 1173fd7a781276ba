//! Kolosal Search - AutoML pipeline search engine
//!
//! Given labelled tabular data and a problem type, the search proposes
//! candidate pipelines, scores each under cross-validation with a pluggable
//! objective, and keeps a ranked leaderboard plus a refitted best pipeline.
//!
//! # Modules
//!
//! ## Search loop
//! - [`search`] - Search controller, status machine and checkpoints
//! - [`generator`] - Candidate generation (baselines, defaults, tuned variants)
//! - [`scheduler`] - Budgeted sequential or parallel trial execution
//! - [`evaluation`] - Cross-validation splitters and the trial evaluator
//! - [`leaderboard`] - Ranked store of trial results
//!
//! ## Building blocks
//! - [`pipeline`] - Pipeline trait, candidates and component graphs
//! - [`components`] - Transformers and estimators
//! - [`objectives`] - Scoring functions with direction
//! - [`data`] - Dataset and CSV loading
//! - [`data_checks`] - Pre-search data validation
//!
//! ## Interfaces
//! - [`config`] - Search configuration
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use kolosal_search::prelude::*;
//!
//! # fn main() -> kolosal_search::Result<()> {
//! let dataset = load_csv("train.csv", "label", &LoadOptions::new())?;
//! let config = SearchConfig::new(ProblemType::Binary).with_max_iterations(20);
//! let search = AutoMLSearch::new(dataset, config)?;
//! search.search()?;
//! println!("{}", search.leaderboard());
//! # Ok(())
//! # }
//! ```

// Core error handling
pub mod error;
pub mod problem;

// Data
pub mod data;
pub mod data_checks;

// Pipelines and scoring
pub mod components;
pub mod objectives;
pub mod pipeline;

// Search loop
pub mod evaluation;
pub mod generator;
pub mod leaderboard;
pub mod scheduler;
pub mod search;

// Interfaces
pub mod config;
pub mod cli;

pub use error::{KolosalError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{KolosalError, Result};

    // Data
    pub use crate::data::{load_csv, ColumnKind, Dataset, FeatureColumn, LoadOptions};
    pub use crate::data_checks::{DataCheck, DataCheckMessage, DataCheckReport};
    pub use crate::problem::ProblemType;

    // Pipelines
    pub use crate::components::{ComponentKind, ModelFamily};
    pub use crate::pipeline::{
        CandidateId, ComponentGraph, ComponentSpec, Pipeline, PipelineCandidate,
    };

    // Scoring
    pub use crate::objectives::{default_objective, objective_by_name, Objective, Predictions};

    // Search
    pub use crate::config::SearchConfig;
    pub use crate::evaluation::{CrossValidationEvaluator, TrialResult, TrialStatus};
    pub use crate::generator::{CandidateGenerator, IterativeGenerator, SearchStrategy};
    pub use crate::leaderboard::{Leaderboard, RankingRow};
    pub use crate::scheduler::{Budget, BudgetKind};
    pub use crate::search::{AutoMLSearch, BestPipeline, SearchCheckpoint, SearchStatus, StopReason};
}

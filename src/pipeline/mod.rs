//! Pipelines and the candidates the search evaluates
//!
//! A [`Pipeline`] is an unfitted template that can be cloned, fitted and
//! asked for predictions. The search never fits the template itself: every
//! fold and the final refit work on [`Pipeline::clone_unfitted`] copies.
//!
//! [`PipelineCandidate`] wraps a template with the bookkeeping the search
//! needs: a stable id, its canonical signature, where it came from and its
//! lifecycle state.

mod graph;
mod params;

pub use graph::{ComponentGraph, ComponentSpec};
pub use params::{hyperparameters, round_significant, HyperparameterRange, Hyperparameters, ParamValue};
pub(crate) use params::{param_f64, param_str, param_usize};

use crate::components::ModelFamily;
use crate::error::{KolosalError, Result};
use crate::problem::ProblemType;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fit/predict pipeline.
///
/// Implementations must be cheap to [`clone_unfitted`](Pipeline::clone_unfitted)
/// and safe to move across threads.
pub trait Pipeline: Send + Sync + fmt::Debug {
    /// Human-readable name, e.g. `"Decision Tree w/ Simple Imputer"`
    fn name(&self) -> String;

    fn problem_type(&self) -> ProblemType;

    /// Canonical description; structurally identical pipelines compare equal
    fn signature(&self) -> PipelineSignature;

    /// Hyperparameters per component, in pipeline order
    fn parameters(&self) -> Vec<(String, Hyperparameters)>;

    fn model_family(&self) -> Option<ModelFamily> {
        None
    }

    /// Check that the pipeline can be built, without fitting anything
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Class probabilities with columns in ascending class order.
    ///
    /// Regression pipelines return [`KolosalError::Unsupported`].
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Sorted class labels seen during fit
    fn classes(&self) -> Vec<f64>;

    /// A fresh copy with the same structure and hyperparameters and no fitted state
    fn clone_unfitted(&self) -> Box<dyn Pipeline>;

    fn is_fitted(&self) -> bool;
}

/// Canonical pipeline string used for deduplication and display
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineSignature(String);

impl PipelineSignature {
    pub fn new(signature: impl Into<String>) -> Self {
        Self(signature.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a proposed candidate, unique within a search
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(pub usize);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a candidate was proposed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CandidateOrigin {
    Baseline,
    Default,
    Tuned { parent: CandidateId },
}

impl CandidateOrigin {
    pub fn is_baseline(self) -> bool {
        matches!(self, CandidateOrigin::Baseline)
    }
}

impl fmt::Display for CandidateOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateOrigin::Baseline => f.write_str("baseline"),
            CandidateOrigin::Default => f.write_str("default"),
            CandidateOrigin::Tuned { parent } => write!(f, "tuned from {}", parent),
        }
    }
}

/// Candidate lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateState {
    Proposed,
    Fitting,
    Scored,
    Failed,
}

/// A pipeline template proposed for evaluation
#[derive(Debug)]
pub struct PipelineCandidate {
    pub id: CandidateId,
    pub pipeline: Box<dyn Pipeline>,
    pub signature: PipelineSignature,
    pub origin: CandidateOrigin,
    pub batch: usize,
    state: CandidateState,
}

impl PipelineCandidate {
    pub fn new(id: CandidateId, pipeline: Box<dyn Pipeline>, origin: CandidateOrigin, batch: usize) -> Self {
        let signature = pipeline.signature();
        Self {
            id,
            pipeline,
            signature,
            origin,
            batch,
            state: CandidateState::Proposed,
        }
    }

    pub fn state(&self) -> CandidateState {
        self.state
    }

    pub fn name(&self) -> String {
        self.pipeline.name()
    }

    /// `Proposed -> Fitting`
    pub fn start(&mut self) -> Result<()> {
        self.transition(CandidateState::Proposed, CandidateState::Fitting)
    }

    /// `Fitting -> Scored`
    pub fn mark_scored(&mut self) -> Result<()> {
        self.transition(CandidateState::Fitting, CandidateState::Scored)
    }

    /// `Fitting -> Failed`
    pub fn mark_failed(&mut self) -> Result<()> {
        self.transition(CandidateState::Fitting, CandidateState::Failed)
    }

    fn transition(&mut self, from: CandidateState, to: CandidateState) -> Result<()> {
        if self.state != from {
            return Err(KolosalError::InvalidState(format!(
                "candidate {} cannot move from {:?} to {:?}",
                self.id, self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }
}

//! Cross-validated scoring of a single candidate

use super::splitter::{CVSplit, DataSplitter};
use crate::data::Dataset;
use crate::error::{KolosalError, Result};
use crate::objectives::{apply_threshold, Objective, Predictions, DEFAULT_THRESHOLD, POSITIVE_CLASS};
use crate::pipeline::{CandidateId, CandidateOrigin, PipelineCandidate, PipelineSignature};
use crate::problem::ProblemType;
use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of a whole evaluation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Success,
    Error,
}

/// Score of one fold; `score` is `None` when the fold failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldScore {
    pub fold: usize,
    pub score: Option<f64>,
    pub error: Option<String>,
    pub train_size: usize,
    pub test_size: usize,
}

/// Immutable record of one evaluation attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    pub trial_id: usize,
    pub candidate_id: CandidateId,
    pub pipeline_name: String,
    pub signature: PipelineSignature,
    pub origin: CandidateOrigin,
    pub batch: usize,
    pub fold_scores: Vec<FoldScore>,
    pub mean_score: Option<f64>,
    pub std_score: Option<f64>,
    pub additional_scores: BTreeMap<String, f64>,
    pub threshold: Option<f64>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub completed_at: DateTime<Utc>,
    pub status: TrialStatus,
    pub error: Option<String>,
    pub notes: Vec<String>,
}

impl TrialResult {
    /// A result for a candidate that never reached fold evaluation
    pub fn failed(trial_id: usize, candidate: &PipelineCandidate, error: impl ToString, duration: Duration) -> Self {
        Self {
            trial_id,
            candidate_id: candidate.id,
            pipeline_name: candidate.name(),
            signature: candidate.signature.clone(),
            origin: candidate.origin,
            batch: candidate.batch,
            fold_scores: Vec::new(),
            mean_score: None,
            std_score: None,
            additional_scores: BTreeMap::new(),
            threshold: None,
            duration,
            completed_at: Utc::now(),
            status: TrialStatus::Error,
            error: Some(error.to_string()),
            notes: Vec::new(),
        }
    }

    /// Succeeded with a finite mean score, so it takes part in ranking
    pub fn is_success(&self) -> bool {
        self.status == TrialStatus::Success && self.mean_score.is_some_and(f64::is_finite)
    }

    pub fn n_successful_folds(&self) -> usize {
        self.fold_scores.iter().filter(|f| f.score.is_some()).count()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// Scores of one successful fold
struct FoldOutcome {
    score: f64,
    additional: Vec<(String, Result<f64>)>,
    // Out-of-fold (y_true, positive-class probability) for threshold tuning
    oof: Option<(Array1<f64>, Array1<f64>)>,
}

/// Fits and scores a candidate on every fold of a [`DataSplitter`]
#[derive(Debug, Clone)]
pub struct CrossValidationEvaluator {
    problem_type: ProblemType,
    objective: Arc<dyn Objective>,
    additional_objectives: Vec<Arc<dyn Objective>>,
    splitter: DataSplitter,
    optimize_thresholds: bool,
}

impl CrossValidationEvaluator {
    pub fn new(problem_type: ProblemType, objective: Arc<dyn Objective>, n_folds: usize) -> Self {
        Self {
            problem_type,
            objective,
            additional_objectives: Vec::new(),
            splitter: DataSplitter::for_problem(problem_type, n_folds, true, 0),
            optimize_thresholds: true,
        }
    }

    pub fn with_splitter(mut self, splitter: DataSplitter) -> Self {
        self.splitter = splitter;
        self
    }

    pub fn with_additional_objectives(mut self, objectives: Vec<Arc<dyn Objective>>) -> Self {
        self.additional_objectives = objectives;
        self
    }

    pub fn with_threshold_tuning(mut self, enabled: bool) -> Self {
        self.optimize_thresholds = enabled;
        self
    }

    pub fn objective(&self) -> &Arc<dyn Objective> {
        &self.objective
    }

    pub fn splitter(&self) -> &DataSplitter {
        &self.splitter
    }

    fn tunes_threshold(&self) -> bool {
        self.optimize_thresholds && self.problem_type.is_binary() && self.objective.is_thresholded()
    }

    /// Evaluate `candidate` on `dataset`. Failures are recorded in the result, never returned.
    pub fn evaluate(&self, trial_id: usize, candidate: &PipelineCandidate, dataset: &Dataset) -> TrialResult {
        let start = Instant::now();
        let splits = match self.splitter.split(dataset.y()) {
            Ok(splits) => splits,
            Err(err) => return TrialResult::failed(trial_id, candidate, err, start.elapsed()),
        };
        let n_folds = splits.len();

        let mut fold_scores = Vec::with_capacity(n_folds);
        let mut scores = Vec::with_capacity(n_folds);
        let mut additional: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut notes = Vec::new();
        let (mut oof_true, mut oof_scores) = (Vec::new(), Vec::new());

        for split in &splits {
            let mut fold_score = FoldScore {
                fold: split.fold,
                score: None,
                error: None,
                train_size: split.train.len(),
                test_size: split.test.len(),
            };
            match self.evaluate_fold(candidate, dataset, split) {
                Ok(outcome) => {
                    fold_score.score = Some(outcome.score);
                    scores.push(outcome.score);
                    for (name, result) in outcome.additional {
                        match result {
                            Ok(value) => additional.entry(name).or_default().push(value),
                            Err(err) => notes.push(format!("{} fold {}: {}", name, split.fold, err)),
                        }
                    }
                    if let Some((y_true, positive)) = outcome.oof {
                        oof_true.extend(y_true.iter().copied());
                        oof_scores.extend(positive.iter().copied());
                    }
                }
                Err(err) => {
                    debug!(candidate = %candidate.id, fold = split.fold, error = %err, "fold failed");
                    fold_score.error = Some(err.to_string());
                }
            }
            fold_scores.push(fold_score);
        }

        if scores.is_empty() {
            let first_error = fold_scores
                .iter()
                .find_map(|f| f.error.clone())
                .unwrap_or_else(|| "no folds were evaluated".to_string());
            let mut result = TrialResult::failed(trial_id, candidate, first_error, start.elapsed());
            result.fold_scores = fold_scores;
            return result;
        }

        let failed = n_folds - scores.len();
        if failed > 0 {
            notes.insert(0, format!("{} of {} folds failed", failed, n_folds));
        }

        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;

        let threshold = if self.tunes_threshold() && !oof_true.is_empty() {
            match self
                .objective
                .optimal_threshold(&Array1::from(oof_true), &Array1::from(oof_scores))
            {
                Ok(t) => Some(t),
                Err(err) => {
                    notes.push(format!("threshold tuning failed: {}", err));
                    None
                }
            }
        } else {
            None
        };

        TrialResult {
            trial_id,
            candidate_id: candidate.id,
            pipeline_name: candidate.name(),
            signature: candidate.signature.clone(),
            origin: candidate.origin,
            batch: candidate.batch,
            fold_scores,
            mean_score: Some(mean),
            std_score: Some(variance.sqrt()),
            additional_scores: additional
                .into_iter()
                .map(|(name, values)| (name, values.iter().sum::<f64>() / values.len() as f64))
                .collect(),
            threshold,
            duration: start.elapsed(),
            completed_at: Utc::now(),
            status: TrialStatus::Success,
            error: None,
            notes,
        }
    }

    fn evaluate_fold(&self, candidate: &PipelineCandidate, dataset: &Dataset, split: &CVSplit) -> Result<FoldOutcome> {
        let fold_error = |stage: &str, err: KolosalError| KolosalError::FoldEvaluation {
            fold: split.fold,
            reason: format!("{}: {}", stage, err),
        };

        let (x_train, y_train) = dataset.select_rows(&split.train);
        let (x_test, y_test) = dataset.select_rows(&split.test);

        let mut pipeline = candidate.pipeline.clone_unfitted();
        pipeline.fit(&x_train, &y_train).map_err(|e| fold_error("fit", e))?;
        let labels = pipeline.predict(&x_test).map_err(|e| fold_error("predict", e))?;
        let proba = if self.problem_type.is_classification() {
            let proba = pipeline
                .predict_proba(&x_test)
                .map_err(|e| fold_error("predict_proba", e))?;
            Some(Predictions::Probabilities {
                classes: pipeline.classes(),
                proba,
            })
        } else {
            None
        };

        let score = self
            .score(self.objective.as_ref(), &y_test, &labels, proba.as_ref())
            .map_err(|e| fold_error("score", e))?;

        let additional = self
            .additional_objectives
            .iter()
            .map(|objective| {
                let result = self.score(objective.as_ref(), &y_test, &labels, proba.as_ref());
                (objective.name().to_string(), result)
            })
            .collect();

        let oof = match (&proba, self.tunes_threshold()) {
            (Some(p), true) => Some((y_test, p.class_probability(POSITIVE_CLASS)?)),
            _ => None,
        };

        Ok(FoldOutcome {
            score,
            additional,
            oof,
        })
    }

    fn score(
        &self,
        objective: &dyn Objective,
        y_true: &Array1<f64>,
        labels: &Array1<f64>,
        proba: Option<&Predictions>,
    ) -> Result<f64> {
        if !objective.supports(self.problem_type) {
            return Err(KolosalError::Unsupported(format!(
                "objective '{}' does not support {}",
                objective.name(),
                self.problem_type
            )));
        }

        let predictions = if objective.needs_proba() {
            proba.cloned().ok_or_else(|| {
                KolosalError::Unsupported(format!(
                    "objective '{}' needs probabilities",
                    objective.name()
                ))
            })?
        } else if objective.is_thresholded() && self.problem_type.is_binary() && proba.is_some() {
            let positive = proba
                .map(|p| p.class_probability(POSITIVE_CLASS))
                .transpose()?
                .unwrap_or_else(|| Array1::zeros(labels.len()));
            Predictions::Labels(apply_threshold(&positive, DEFAULT_THRESHOLD))
        } else {
            Predictions::Labels(labels.clone())
        };

        let score = objective.score(y_true, &predictions)?;
        if !score.is_finite() {
            return Err(KolosalError::ComputationError(format!(
                "objective '{}' returned a non-finite score",
                objective.name()
            )));
        }
        Ok(score)
    }
}

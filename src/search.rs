//! The search controller.
//!
//! [`AutoMLSearch`] validates the setup, then alternates between asking the
//! candidate generator for a batch and handing that batch to the trial
//! scheduler, appending every result to the leaderboard as it arrives. The
//! loop ends when the generator runs dry, a budget is exhausted or early
//! stopping fires. The best pipeline is then refitted on the full dataset.
//!
//! All accessors take `&self` and may be called from other threads while
//! [`AutoMLSearch::search`] is running.

use crate::config::SearchConfig;
use crate::data::Dataset;
use crate::data_checks::{default_data_checks, run_data_checks, DataCheck, DataCheckReport};
use crate::error::{KolosalError, Result};
use crate::evaluation::{CrossValidationEvaluator, TrialResult, TrialStatus};
use crate::generator::{CandidateGenerator, IterativeGenerator};
use crate::leaderboard::{Leaderboard, RankingRow};
use crate::objectives::{
    apply_threshold, default_objective, objective_by_name, Objective, Predictions, POSITIVE_CLASS,
};
use crate::pipeline::{CandidateId, Pipeline};
use crate::problem::ProblemType;
use crate::scheduler::{BudgetKind, BudgetTracker, TrialScheduler};
use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Why a search ended without a usable result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    SetupFailed(String),
    /// The candidate generator returned an error mid-run
    GeneratorFailed(String),
    NoValidPipeline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    Initialized,
    Running,
    Completed,
    StoppedByBudget(BudgetKind),
    StoppedByError(StopReason),
}

impl SearchStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, SearchStatus::Initialized | SearchStatus::Running)
    }
}

impl fmt::Display for SearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchStatus::Initialized => f.write_str("initialized"),
            SearchStatus::Running => f.write_str("running"),
            SearchStatus::Completed => f.write_str("completed"),
            SearchStatus::StoppedByBudget(kind) => write!(f, "stopped by {}", kind),
            SearchStatus::StoppedByError(StopReason::SetupFailed(reason)) => {
                write!(f, "setup failed: {}", reason)
            }
            SearchStatus::StoppedByError(StopReason::GeneratorFailed(reason)) => {
                write!(f, "candidate generation failed: {}", reason)
            }
            SearchStatus::StoppedByError(StopReason::NoValidPipeline) => {
                f.write_str("no valid pipeline found")
            }
        }
    }
}

/// Progress snapshot, readable at any time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchState {
    pub status: SearchStatus,
    pub batches_completed: usize,
    pub trials_completed: usize,
    pub n_successful: usize,
    pub n_failed: usize,
    pub best_candidate: Option<CandidateId>,
    pub best_score: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_secs: f64,
    /// Last error that ended or degraded the run
    #[serde(default)]
    pub error: Option<String>,
}

impl Default for SearchState {
    fn default() -> Self {
        Self {
            status: SearchStatus::Initialized,
            batches_completed: 0,
            trials_completed: 0,
            n_successful: 0,
            n_failed: 0,
            best_candidate: None,
            best_score: None,
            started_at: None,
            finished_at: None,
            elapsed_secs: 0.0,
            error: None,
        }
    }
}

/// The winning pipeline refitted on all rows
#[derive(Debug)]
pub struct BestPipeline {
    pub result: Arc<TrialResult>,
    pub pipeline: Box<dyn Pipeline>,
    /// Decision threshold on the positive-class probability (binary only)
    pub threshold: Option<f64>,
}

impl BestPipeline {
    pub fn name(&self) -> String {
        self.pipeline.name()
    }

    /// Predicts labels, cutting positive-class probabilities at the tuned
    /// threshold when one was found
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self.threshold {
            Some(threshold) => {
                let predictions = Predictions::Probabilities {
                    classes: self.pipeline.classes(),
                    proba: self.pipeline.predict_proba(x)?,
                };
                Ok(apply_threshold(&predictions.class_probability(POSITIVE_CLASS)?, threshold))
            }
            None => self.pipeline.predict(x),
        }
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.pipeline.predict_proba(x)
    }
}

/// Serializable record of a search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCheckpoint {
    pub saved_at: DateTime<Utc>,
    pub problem_type: ProblemType,
    pub objective: String,
    pub greater_is_better: bool,
    pub config: SearchConfig,
    pub state: SearchState,
    pub rankings: Vec<RankingRow>,
    /// Every trial in completion order
    pub results: Vec<TrialResult>,
}

impl SearchCheckpoint {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn best(&self) -> Option<&RankingRow> {
        self.rankings.first().filter(|row| row.rank == Some(1))
    }
}

/// Tracks non-improving trials for patience-based stopping
#[derive(Debug)]
struct EarlyStopping {
    patience: Option<usize>,
    tolerance: f64,
    greater_is_better: bool,
    best: Option<f64>,
    since_improvement: usize,
}

impl EarlyStopping {
    fn new(patience: Option<usize>, tolerance: f64, greater_is_better: bool) -> Self {
        Self {
            patience,
            tolerance,
            greater_is_better,
            best: None,
            since_improvement: 0,
        }
    }

    fn observe(&mut self, result: &TrialResult) {
        if !result.is_success() || result.origin.is_baseline() {
            return;
        }
        let Some(score) = result.mean_score else {
            return;
        };
        let improved = match self.best {
            None => true,
            Some(best) => {
                let margin = self.tolerance * best.abs();
                if self.greater_is_better {
                    score > best + margin
                } else {
                    score < best - margin
                }
            }
        };
        if improved {
            self.best = Some(score);
            self.since_improvement = 0;
        } else {
            self.since_improvement += 1;
        }
    }

    fn should_stop(&self) -> bool {
        self.patience.is_some_and(|p| self.since_improvement >= p)
    }
}

/// Everything `search()` builds before the first trial
struct SearchRun {
    generator: Box<dyn CandidateGenerator>,
    scheduler: TrialScheduler,
    tracker: Arc<BudgetTracker>,
}

pub struct AutoMLSearch {
    dataset: Dataset,
    config: SearchConfig,
    objective: Arc<dyn Objective>,
    additional_objectives: Vec<Arc<dyn Objective>>,
    generator: Mutex<Option<Box<dyn CandidateGenerator>>>,
    data_checks: Option<Vec<Box<dyn DataCheck>>>,
    leaderboard: Leaderboard,
    state: RwLock<SearchState>,
    started: AtomicBool,
    templates: RwLock<HashMap<CandidateId, Box<dyn Pipeline>>>,
    best: RwLock<Option<Arc<BestPipeline>>>,
    data_check_report: RwLock<DataCheckReport>,
}

impl fmt::Debug for AutoMLSearch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoMLSearch")
            .field("problem_type", &self.config.problem_type)
            .field("objective", &self.objective.name())
            .field("status", &self.status())
            .field("trials", &self.leaderboard.len())
            .finish()
    }
}

impl AutoMLSearch {
    /// Create a search; objectives named in `config` are resolved here
    pub fn new(dataset: Dataset, config: SearchConfig) -> Result<Self> {
        let objective = match &config.objective {
            Some(name) => objective_by_name(name)?,
            None => default_objective(config.problem_type),
        };
        let additional_objectives = config
            .additional_objectives
            .iter()
            .map(|name| objective_by_name(name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            dataset,
            leaderboard: Leaderboard::new(objective.greater_is_better()),
            objective,
            additional_objectives,
            config,
            generator: Mutex::new(None),
            data_checks: None,
            state: RwLock::new(SearchState::default()),
            started: AtomicBool::new(false),
            templates: RwLock::new(HashMap::new()),
            best: RwLock::new(None),
            data_check_report: RwLock::new(DataCheckReport::default()),
        })
    }

    pub fn with_objective(mut self, objective: Arc<dyn Objective>) -> Self {
        self.config.objective = Some(objective.name().to_string());
        self.leaderboard = Leaderboard::new(objective.greater_is_better());
        self.objective = objective;
        self
    }

    pub fn with_additional_objectives(mut self, objectives: Vec<Arc<dyn Objective>>) -> Self {
        self.config.additional_objectives = objectives.iter().map(|o| o.name().to_string()).collect();
        self.additional_objectives = objectives;
        self
    }

    /// Replace the built-in [`IterativeGenerator`]
    pub fn with_generator(self, generator: Box<dyn CandidateGenerator>) -> Self {
        *self.generator.lock() = Some(generator);
        self
    }

    /// Replace the default data checks; an empty list disables them
    pub fn with_data_checks(mut self, checks: Vec<Box<dyn DataCheck>>) -> Self {
        self.data_checks = Some(checks);
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn objective(&self) -> &Arc<dyn Objective> {
        &self.objective
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    pub fn rankings(&self) -> Vec<RankingRow> {
        self.leaderboard.rankings()
    }

    pub fn status(&self) -> SearchStatus {
        self.state.read().status.clone()
    }

    pub fn state(&self) -> SearchState {
        self.state.read().clone()
    }

    pub fn best_result(&self) -> Option<Arc<TrialResult>> {
        self.leaderboard.best()
    }

    /// The refitted best pipeline; `None` before the search ends, when no
    /// trial succeeded, or when refitting was disabled or failed
    pub fn best_pipeline(&self) -> Option<Arc<BestPipeline>> {
        self.best.read().clone()
    }

    pub fn data_check_report(&self) -> DataCheckReport {
        self.data_check_report.read().clone()
    }

    fn set_status(&self, status: SearchStatus) {
        self.state.write().status = status;
    }

    /// Runs the search to completion.
    ///
    /// Only setup problems and a repeated call are errors; failing
    /// candidates, exhausted budgets and searches without a single valid
    /// pipeline all end in `Ok` with the outcome in [`Self::status`].
    pub fn search(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(KolosalError::InvalidState(
                "search() has already been called on this AutoMLSearch".to_string(),
            ));
        }
        let started = Instant::now();
        self.state.write().started_at = Some(Utc::now());

        let mut run = match self.setup() {
            Ok(run) => run,
            Err(err) => {
                let reason = match err {
                    KolosalError::Setup(reason) => reason,
                    other => other.to_string(),
                };
                error!(reason = %reason, "search setup failed");
                let mut state = self.state.write();
                state.status = SearchStatus::StoppedByError(StopReason::SetupFailed(reason.clone()));
                state.error = Some(reason.clone());
                state.finished_at = Some(Utc::now());
                return Err(KolosalError::Setup(reason));
            }
        };

        self.set_status(SearchStatus::Running);
        info!(
            problem_type = %self.config.problem_type,
            objective = self.objective.name(),
            generator = run.generator.name(),
            n_jobs = run.scheduler.n_jobs(),
            n_samples = self.dataset.n_samples(),
            n_features = self.dataset.n_features(),
            "search started"
        );

        let status = self.run_loop(&mut run);
        let status = if self.leaderboard.n_successful() == 0 {
            warn!(trials = self.leaderboard.len(), "no valid pipeline found");
            SearchStatus::StoppedByError(StopReason::NoValidPipeline)
        } else {
            if self.config.train_best_pipeline {
                *self.best.write() = self.refit_best().map(Arc::new);
            }
            status
        };

        {
            let mut state = self.state.write();
            state.status = status.clone();
            state.finished_at = Some(Utc::now());
            state.elapsed_secs = started.elapsed().as_secs_f64();
        }
        info!(
            status = %status,
            trials = self.leaderboard.len(),
            successful = self.leaderboard.n_successful(),
            best = ?self.best_result().and_then(|r| r.mean_score),
            elapsed_secs = started.elapsed().as_secs_f64(),
            "search finished"
        );
        Ok(())
    }

    fn setup(&self) -> Result<SearchRun> {
        let problem_type = self.config.problem_type;
        self.config
            .validate()
            .map_err(|e| KolosalError::Setup(format!("invalid configuration: {}", e)))?;

        for objective in std::iter::once(&self.objective).chain(&self.additional_objectives) {
            if !objective.supports(problem_type) {
                return Err(KolosalError::Setup(format!(
                    "objective '{}' does not support problem type {}",
                    objective.name(),
                    problem_type
                )));
            }
        }

        let report = match &self.data_checks {
            Some(checks) => run_data_checks(checks, &self.dataset, problem_type),
            None => run_data_checks(
                &default_data_checks(problem_type, self.config.n_folds),
                &self.dataset,
                problem_type,
            ),
        };
        for warning in &report.warnings {
            warn!(check = %warning.check, code = %warning.code, "{}", warning.message);
        }
        let errors = report
            .errors
            .iter()
            .map(|m| m.to_string())
            .collect::<Vec<_>>();
        *self.data_check_report.write() = report;
        if !errors.is_empty() {
            return Err(KolosalError::Setup(format!(
                "data checks failed: {}",
                errors.join("; ")
            )));
        }

        let generator = match self.generator.lock().take() {
            Some(generator) => generator,
            None => Box::new(IterativeGenerator::new(
                problem_type,
                self.config.generator_settings(),
            )?),
        };

        let evaluator = CrossValidationEvaluator::new(
            problem_type,
            Arc::clone(&self.objective),
            self.config.n_folds,
        )
        .with_splitter(self.config.splitter())
        .with_additional_objectives(self.additional_objectives.clone())
        .with_threshold_tuning(self.config.optimize_thresholds);

        let tracker = Arc::new(BudgetTracker::new(self.config.budget()));
        let scheduler = TrialScheduler::new(
            Arc::new(evaluator),
            self.dataset.clone(),
            Arc::clone(&tracker),
            self.config.resolved_n_jobs()?,
        )?;

        Ok(SearchRun {
            generator,
            scheduler,
            tracker,
        })
    }

    /// Generator -> scheduler -> leaderboard until a stop condition
    fn run_loop(&self, run: &mut SearchRun) -> SearchStatus {
        let mut early_stopping = EarlyStopping::new(
            self.config.patience,
            self.config.tolerance,
            self.objective.greater_is_better(),
        );
        let batch_limit = self.config.batch_limit();

        loop {
            if let Some(kind) = run.tracker.exhausted() {
                info!(budget = %kind, "budget exhausted");
                return SearchStatus::StoppedByBudget(kind);
            }

            let history = self.leaderboard.ranked_history();
            let batch = match run.generator.next_batch(&history, &run.tracker.remaining()) {
                Ok(batch) => batch,
                Err(err) => {
                    error!(error = %err, "candidate generation failed; ending search");
                    let reason = err.to_string();
                    self.state.write().error = Some(reason.clone());
                    return SearchStatus::StoppedByError(StopReason::GeneratorFailed(reason));
                }
            };
            if batch.is_empty() {
                return match run.tracker.exhausted() {
                    Some(kind) => SearchStatus::StoppedByBudget(kind),
                    None => SearchStatus::Completed,
                };
            }

            {
                let mut templates = self.templates.write();
                for candidate in &batch {
                    templates.insert(candidate.id, candidate.pipeline.clone_unfitted());
                }
            }

            let batch_size = batch.len();
            let outcome = run.scheduler.run_with(batch, |result| {
                self.leaderboard.append_arc(Arc::clone(result));
                self.record(result);
            });

            // Proposal order, not completion order
            let mut finished: Vec<&Arc<TrialResult>> = outcome.results.iter().collect();
            finished.sort_by_key(|r| r.candidate_id);
            for result in finished {
                early_stopping.observe(result);
            }

            let batches = {
                let mut state = self.state.write();
                state.batches_completed += 1;
                state.elapsed_secs = run.tracker.elapsed().as_secs_f64();
                state.batches_completed
            };
            info!(
                batch = batches,
                size = batch_size,
                evaluated = outcome.results.len(),
                skipped = outcome.skipped.len(),
                best = ?self.state.read().best_score,
                "batch completed"
            );

            if let Some(kind) = outcome.exhausted {
                return SearchStatus::StoppedByBudget(kind);
            }
            if early_stopping.should_stop() {
                info!(
                    patience = ?self.config.patience,
                    tolerance = self.config.tolerance,
                    "early stopping"
                );
                return SearchStatus::StoppedByBudget(BudgetKind::EarlyStopping);
            }
            if batch_limit.is_some_and(|max| batches >= max) {
                info!(batches, "batch limit reached");
                return SearchStatus::StoppedByBudget(BudgetKind::Batches);
            }
        }
    }

    fn record(&self, result: &TrialResult) {
        let best = self.leaderboard.best();
        let mut state = self.state.write();
        state.trials_completed += 1;
        if result.is_success() {
            state.n_successful += 1;
        } else {
            state.n_failed += 1;
        }
        state.best_candidate = best.as_ref().map(|r| r.candidate_id);
        state.best_score = best.and_then(|r| r.mean_score);
    }

    fn refit_best(&self) -> Option<BestPipeline> {
        let result = self.leaderboard.best()?;
        let mut pipeline = self.templates.read().get(&result.candidate_id)?.clone_unfitted();
        let x = self.dataset.x().to_owned();
        let y = self.dataset.y().to_owned();

        match catch_unwind(AssertUnwindSafe(|| pipeline.fit(&x, &y))) {
            Ok(Ok(())) => {
                info!(candidate = %result.candidate_id, pipeline = %result.pipeline_name, "best pipeline refitted");
                let threshold = result.threshold.filter(|_| self.config.problem_type.is_binary());
                Some(BestPipeline {
                    result,
                    pipeline,
                    threshold,
                })
            }
            Ok(Err(err)) => {
                warn!(candidate = %result.candidate_id, error = %err, "refitting the best pipeline failed");
                None
            }
            Err(_) => {
                warn!(candidate = %result.candidate_id, "refitting the best pipeline panicked");
                None
            }
        }
    }

    /// Human-readable summary of one evaluated candidate
    pub fn describe_pipeline(&self, id: CandidateId) -> Result<String> {
        let result = self
            .leaderboard
            .get(id)
            .ok_or_else(|| KolosalError::NotFound(format!("pipeline {}", id)))?;
        let templates = self.templates.read();
        let pipeline = templates
            .get(&id)
            .ok_or_else(|| KolosalError::NotFound(format!("pipeline {}", id)))?;

        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = self.write_description(&mut out, &result, pipeline.as_ref());
        Ok(out)
    }

    fn write_description(&self, out: &mut String, result: &TrialResult, pipeline: &dyn Pipeline) -> fmt::Result {
        writeln!(out, "{} {}", result.candidate_id, result.pipeline_name)?;
        writeln!(out, "{}", "=".repeat(result.pipeline_name.len() + 4))?;
        writeln!(out, "Problem type: {}", pipeline.problem_type())?;
        if let Some(family) = pipeline.model_family() {
            writeln!(out, "Model family: {}", family)?;
        }
        writeln!(out, "Origin: {} (batch {})", result.origin, result.batch)?;
        writeln!(out)?;
        writeln!(out, "Components:")?;
        for (i, (name, params)) in pipeline.parameters().iter().enumerate() {
            writeln!(out, "  {}. {}", i + 1, name)?;
            for (key, value) in params {
                writeln!(out, "     * {} : {}", key, value)?;
            }
        }
        writeln!(out)?;
        writeln!(out, "Objective: {}", self.objective.name())?;
        match (result.mean_score, result.std_score) {
            (Some(mean), Some(std)) => writeln!(out, "Score: {:.6} ± {:.6}", mean, std)?,
            (Some(mean), None) => writeln!(out, "Score: {:.6}", mean)?,
            _ => writeln!(out, "Score: -")?,
        }
        let folds: Vec<String> = result
            .fold_scores
            .iter()
            .map(|f| f.score.map_or_else(|| "failed".to_string(), |s| format!("{:.6}", s)))
            .collect();
        if !folds.is_empty() {
            writeln!(out, "Fold scores: [{}]", folds.join(", "))?;
        }
        for (name, score) in &result.additional_scores {
            writeln!(out, "{}: {:.6}", name, score)?;
        }
        if let Some(threshold) = result.threshold {
            writeln!(out, "Threshold: {:.2}", threshold)?;
        }
        writeln!(out, "Duration: {:.3}s", result.duration.as_secs_f64())?;
        let status = match result.status {
            TrialStatus::Success => "success",
            TrialStatus::Error => "error",
        };
        writeln!(out, "Status: {}", status)?;
        if let Some(err) = &result.error {
            writeln!(out, "Error: {}", err)?;
        }
        for note in &result.notes {
            writeln!(out, "Note: {}", note)?;
        }
        Ok(())
    }

    pub fn checkpoint(&self) -> SearchCheckpoint {
        SearchCheckpoint {
            saved_at: Utc::now(),
            problem_type: self.config.problem_type,
            objective: self.objective.name().to_string(),
            greater_is_better: self.objective.greater_is_better(),
            config: self.config.clone(),
            state: self.state(),
            rankings: self.rankings(),
            results: self
                .leaderboard
                .history()
                .iter()
                .map(|r| TrialResult::clone(r))
                .collect(),
        }
    }

    /// Writes [`Self::checkpoint`] as pretty-printed JSON
    pub fn save_checkpoint(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.checkpoint())?;
        std::fs::write(path.as_ref(), json)?;
        info!(path = %path.as_ref().display(), "checkpoint saved");
        Ok(())
    }
}

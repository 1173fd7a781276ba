//! Trial scheduling under an iteration and wall-clock budget
//!
//! With `n_jobs == 1` candidates run one after another on the calling thread.
//! Otherwise each candidate becomes a task on a dedicated rayon pool and
//! reports back over a channel; the calling thread stays the only consumer of
//! results, so callbacks never run concurrently.

use crate::data::Dataset;
use crate::error::{KolosalError, Result};
use crate::evaluation::{CrossValidationEvaluator, TrialResult};
use crate::generator::BudgetRemaining;
use crate::pipeline::{CandidateId, PipelineCandidate};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Which budget ended (or would end) the search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    Iterations,
    Time,
    Batches,
    EarlyStopping,
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetKind::Iterations => f.write_str("iteration budget"),
            BudgetKind::Time => f.write_str("time budget"),
            BudgetKind::Batches => f.write_str("batch limit"),
            BudgetKind::EarlyStopping => f.write_str("early stopping"),
        }
    }
}

/// Limits on how many trials may start and for how long
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Budget {
    pub max_iterations: Option<usize>,
    pub max_time: Option<Duration>,
}

impl Budget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    pub fn with_max_time(mut self, limit: Duration) -> Self {
        self.max_time = Some(limit);
        self
    }
}

/// Shared view of a [`Budget`] as trials start.
///
/// The clock starts when the tracker is created.
#[derive(Debug)]
pub struct BudgetTracker {
    budget: Budget,
    started_at: Instant,
    started: AtomicUsize,
}

impl BudgetTracker {
    pub fn new(budget: Budget) -> Self {
        Self {
            budget,
            started_at: Instant::now(),
            started: AtomicUsize::new(0),
        }
    }

    pub fn budget(&self) -> Budget {
        self.budget
    }

    /// Claim a trial slot; returns the trial id or the budget that refused it
    pub fn try_start(&self) -> std::result::Result<usize, BudgetKind> {
        if self.time_exhausted() {
            return Err(BudgetKind::Time);
        }
        let mut current = self.started.load(Ordering::Acquire);
        loop {
            if self.budget.max_iterations.is_some_and(|max| current >= max) {
                return Err(BudgetKind::Iterations);
            }
            match self.started.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(current),
                Err(actual) => current = actual,
            }
        }
    }

    /// Trials started so far
    pub fn started(&self) -> usize {
        self.started.load(Ordering::Acquire)
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn time_exhausted(&self) -> bool {
        self.budget.max_time.is_some_and(|max| self.elapsed() >= max)
    }

    /// The budget that is used up, if any
    pub fn exhausted(&self) -> Option<BudgetKind> {
        if self.budget.max_iterations.is_some_and(|max| self.started() >= max) {
            Some(BudgetKind::Iterations)
        } else if self.time_exhausted() {
            Some(BudgetKind::Time)
        } else {
            None
        }
    }

    pub fn remaining(&self) -> BudgetRemaining {
        BudgetRemaining {
            iterations_left: self
                .budget
                .max_iterations
                .map(|max| max.saturating_sub(self.started())),
            time_left: self
                .budget
                .max_time
                .map(|max| max.saturating_sub(self.elapsed())),
        }
    }
}

/// What a batch run produced
#[derive(Debug, Default)]
pub struct ScheduleOutcome {
    /// Results in completion order
    pub results: Vec<Arc<TrialResult>>,
    /// Candidates whose start the budget refused
    pub skipped: Vec<CandidateId>,
    pub exhausted: Option<BudgetKind>,
}

enum TaskMessage {
    Completed(TrialResult),
    Skipped(CandidateId, BudgetKind),
}

/// Runs batches of candidates through the evaluator
pub struct TrialScheduler {
    evaluator: Arc<CrossValidationEvaluator>,
    dataset: Dataset,
    tracker: Arc<BudgetTracker>,
    n_jobs: usize,
    pool: Option<rayon::ThreadPool>,
}

impl fmt::Debug for TrialScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrialScheduler")
            .field("n_jobs", &self.n_jobs)
            .field("tracker", &self.tracker)
            .finish()
    }
}

impl TrialScheduler {
    pub fn new(
        evaluator: Arc<CrossValidationEvaluator>,
        dataset: Dataset,
        tracker: Arc<BudgetTracker>,
        n_jobs: usize,
    ) -> Result<Self> {
        if n_jobs == 0 {
            return Err(KolosalError::ConfigError("n_jobs must not be 0".to_string()));
        }
        let pool = if n_jobs > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_jobs)
                .thread_name(|i| format!("kolosal-trial-{}", i))
                .build()
                .map_err(|e| KolosalError::Setup(format!("cannot build worker pool: {}", e)))?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            evaluator,
            dataset,
            tracker,
            n_jobs,
            pool,
        })
    }

    pub fn tracker(&self) -> &Arc<BudgetTracker> {
        &self.tracker
    }

    pub fn n_jobs(&self) -> usize {
        self.n_jobs
    }

    pub fn run(&self, candidates: Vec<PipelineCandidate>) -> ScheduleOutcome {
        self.run_with(candidates, |_| {})
    }

    /// Run a batch, calling `on_complete` on this thread as each result arrives
    pub fn run_with<F>(&self, candidates: Vec<PipelineCandidate>, mut on_complete: F) -> ScheduleOutcome
    where
        F: FnMut(&Arc<TrialResult>),
    {
        let mut outcome = ScheduleOutcome::default();
        let mut handle = |message: TaskMessage, outcome: &mut ScheduleOutcome| match message {
            TaskMessage::Completed(result) => {
                info!(
                    trial = result.trial_id,
                    candidate = %result.candidate_id,
                    pipeline = %result.pipeline_name,
                    score = ?result.mean_score,
                    status = ?result.status,
                    "trial completed"
                );
                let result = Arc::new(result);
                on_complete(&result);
                outcome.results.push(result);
            }
            TaskMessage::Skipped(id, kind) => {
                outcome.skipped.push(id);
                outcome.exhausted.get_or_insert(kind);
            }
        };

        match &self.pool {
            None => {
                for candidate in candidates {
                    let message = match outcome.exhausted {
                        Some(kind) => TaskMessage::Skipped(candidate.id, kind),
                        None => run_trial(&self.evaluator, &self.dataset, &self.tracker, candidate),
                    };
                    handle(message, &mut outcome);
                }
            }
            Some(pool) => {
                let (tx, rx) = mpsc::channel();
                for candidate in candidates {
                    let tx = tx.clone();
                    let evaluator = Arc::clone(&self.evaluator);
                    let dataset = self.dataset.clone();
                    let tracker = Arc::clone(&self.tracker);
                    pool.spawn(move || {
                        let message = run_trial(&evaluator, &dataset, &tracker, candidate);
                        // The receiver outlives every task
                        let _ = tx.send(message);
                    });
                }
                drop(tx);
                for message in rx {
                    handle(message, &mut outcome);
                }
            }
        }
        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_trial(
    evaluator: &CrossValidationEvaluator,
    dataset: &Dataset,
    tracker: &BudgetTracker,
    mut candidate: PipelineCandidate,
) -> TaskMessage {
    let trial_id = match tracker.try_start() {
        Ok(id) => id,
        Err(kind) => return TaskMessage::Skipped(candidate.id, kind),
    };
    let start = Instant::now();
    if let Err(err) = candidate.start() {
        return TaskMessage::Completed(TrialResult::failed(trial_id, &candidate, err, start.elapsed()));
    }

    let attempt = catch_unwind(AssertUnwindSafe(|| -> Result<TrialResult> {
        candidate
            .pipeline
            .validate()
            .map_err(|e| KolosalError::CandidateFailure(e.to_string()))?;
        Ok(evaluator.evaluate(trial_id, &candidate, dataset))
    }));

    let result = match attempt {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => TrialResult::failed(trial_id, &candidate, err, start.elapsed()),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(candidate = %candidate.id, panic = %message, "candidate panicked");
            TrialResult::failed(
                trial_id,
                &candidate,
                KolosalError::CandidateFailure(format!("panicked: {}", message)),
                start.elapsed(),
            )
        }
    };

    let transition = if result.is_success() {
        candidate.mark_scored()
    } else {
        candidate.mark_failed()
    };
    if let Err(err) = transition {
        warn!(candidate = %candidate.id, error = %err, "unexpected candidate state");
    }
    TaskMessage::Completed(result)
}

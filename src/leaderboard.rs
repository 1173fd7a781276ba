//! Ranked store of trial results
//!
//! Results are appended by a single writer (the search loop) and read from
//! anywhere. Every read takes the lock once and returns an owned snapshot.

use crate::evaluation::{TrialResult, TrialStatus};
use crate::pipeline::{CandidateId, PipelineSignature};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// One row of the rankings table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRow {
    /// 1-based; `None` for failed trials
    pub rank: Option<usize>,
    pub candidate_id: CandidateId,
    pub pipeline_name: String,
    pub signature: PipelineSignature,
    pub mean_score: Option<f64>,
    pub std_score: Option<f64>,
    pub n_folds: usize,
    pub status: TrialStatus,
}

#[derive(Debug)]
pub struct Leaderboard {
    greater_is_better: bool,
    entries: RwLock<Vec<Arc<TrialResult>>>,
}

impl Leaderboard {
    pub fn new(greater_is_better: bool) -> Self {
        Self {
            greater_is_better,
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn greater_is_better(&self) -> bool {
        self.greater_is_better
    }

    pub fn append(&self, result: TrialResult) -> Arc<TrialResult> {
        let result = Arc::new(result);
        self.append_arc(Arc::clone(&result));
        result
    }

    pub fn append_arc(&self, result: Arc<TrialResult>) {
        self.entries.write().push(result);
    }

    pub fn append_all(&self, results: impl IntoIterator<Item = Arc<TrialResult>>) {
        self.entries.write().extend(results);
    }

    /// Orders two mean scores best-first
    fn compare_scores(&self, a: f64, b: f64) -> Ordering {
        if self.greater_is_better {
            b.total_cmp(&a)
        } else {
            a.total_cmp(&b)
        }
    }

    /// Successful results, best first.
    ///
    /// Equal scores rank in proposal order (`CandidateId`), so the order does
    /// not depend on which worker finished first.
    pub fn ranked(&self) -> Vec<Arc<TrialResult>> {
        let mut ranked: Vec<Arc<TrialResult>> = self
            .entries
            .read()
            .iter()
            .filter(|r| r.is_success())
            .cloned()
            .collect();
        // Stable sort: a candidate id seen twice keeps insertion order
        ranked.sort_by(|a, b| {
            self.compare_scores(a.mean_score.unwrap_or(f64::NAN), b.mean_score.unwrap_or(f64::NAN))
                .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        });
        ranked
    }

    /// Results that take no part in ranking, in proposal order
    pub fn failed(&self) -> Vec<Arc<TrialResult>> {
        let mut failed: Vec<Arc<TrialResult>> = self
            .entries
            .read()
            .iter()
            .filter(|r| !r.is_success())
            .cloned()
            .collect();
        failed.sort_by_key(|r| r.candidate_id);
        failed
    }

    pub fn best(&self) -> Option<Arc<TrialResult>> {
        self.ranked().into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn n_successful(&self) -> usize {
        self.entries.read().iter().filter(|r| r.is_success()).count()
    }

    /// Every result in append (completion) order
    pub fn history(&self) -> Vec<Arc<TrialResult>> {
        self.entries.read().clone()
    }

    /// Ranked results followed by failed ones, as handed to generators
    pub fn ranked_history(&self) -> Vec<Arc<TrialResult>> {
        let mut history = self.ranked();
        history.extend(self.failed());
        history
    }

    pub fn get(&self, id: CandidateId) -> Option<Arc<TrialResult>> {
        self.entries.read().iter().find(|r| r.candidate_id == id).cloned()
    }

    pub fn rankings(&self) -> Vec<RankingRow> {
        let ranked = self.ranked();
        let failed = self.failed();
        ranked
            .iter()
            .enumerate()
            .map(|(i, r)| row(Some(i + 1), r))
            .chain(failed.iter().map(|r| row(None, r)))
            .collect()
    }
}

fn row(rank: Option<usize>, result: &TrialResult) -> RankingRow {
    RankingRow {
        rank,
        candidate_id: result.candidate_id,
        pipeline_name: result.pipeline_name.clone(),
        signature: result.signature.clone(),
        mean_score: result.mean_score,
        std_score: result.std_score,
        n_folds: result.n_successful_folds(),
        status: result.status,
    }
}

fn format_score(score: Option<f64>) -> String {
    score.map_or_else(|| "-".to_string(), |s| format!("{:.4}", s))
}

impl fmt::Display for Leaderboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>4}  {:<6} {:<48} {:>10} {:>10} {:>5}  {}",
            "Rank", "Id", "Pipeline", "Mean", "Std", "Folds", "Status"
        )?;
        writeln!(f, "{}", "-".repeat(98))?;
        for r in self.rankings() {
            let rank = r.rank.map_or_else(|| "-".to_string(), |n| n.to_string());
            let status = match r.status {
                TrialStatus::Success => "ok",
                TrialStatus::Error => "failed",
            };
            writeln!(
                f,
                "{:>4}  {:<6} {:<48} {:>10} {:>10} {:>5}  {}",
                rank,
                r.candidate_id.to_string(),
                truncate(&r.pipeline_name, 48),
                format_score(r.mean_score),
                format_score(r.std_score),
                r.n_folds,
                status
            )?;
        }
        Ok(())
    }
}

pub(crate) fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(3)).collect();
        out.push_str("...");
        out
    }
}

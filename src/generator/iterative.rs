//! Baselines, then defaults, then tuned variants of the strongest families

use super::{BudgetRemaining, CandidateGenerator, SearchStrategy, Tuner};
use crate::components::{list_model_families, ModelFamily};
use crate::error::{KolosalError, Result};
use crate::evaluation::TrialResult;
use crate::pipeline::{
    CandidateId, CandidateOrigin, ComponentGraph, Pipeline, PipelineCandidate, PipelineSignature,
};
use crate::problem::ProblemType;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Knobs of the [`IterativeGenerator`]
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    pub strategy: SearchStrategy,
    pub pipelines_per_batch: usize,
    pub top_k: usize,
    pub exploration: f64,
    pub max_resample_attempts: usize,
    /// `None` means every family valid for the problem type
    pub allowed_families: Option<Vec<ModelFamily>>,
    pub random_seed: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Adaptive,
            pipelines_per_batch: 5,
            top_k: 3,
            exploration: 0.2,
            max_resample_attempts: 20,
            allowed_families: None,
            random_seed: 0,
        }
    }
}

impl GeneratorSettings {
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

    pub fn with_allowed_families(mut self, families: Vec<ModelFamily>) -> Self {
        self.allowed_families = Some(families);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }
}

/// The built-in generator.
///
/// Batch 0 holds the baseline, batch 1 one default pipeline per model family
/// and every later batch tuned variants of the `top_k` best families.
#[derive(Debug)]
pub struct IterativeGenerator {
    problem_type: ProblemType,
    settings: GeneratorSettings,
    families: Vec<ModelFamily>,
    tuner: Tuner,
    rng: ChaCha8Rng,
    batch: usize,
    next_id: usize,
    proposed: HashSet<PipelineSignature>,
    // Structure of every candidate handed out, for tuning and refits
    graphs: HashMap<CandidateId, ComponentGraph>,
}

impl IterativeGenerator {
    pub fn new(problem_type: ProblemType, settings: GeneratorSettings) -> Result<Self> {
        let valid = list_model_families(problem_type);
        let families = match &settings.allowed_families {
            None => valid,
            Some(allowed) => {
                if let Some(bad) = allowed
                    .iter()
                    .find(|f| **f != ModelFamily::Baseline && !valid.contains(f))
                {
                    return Err(KolosalError::Setup(format!(
                        "Unrecognized model family '{}' for problem type {}",
                        bad, problem_type
                    )));
                }
                valid.into_iter().filter(|f| allowed.contains(f)).collect()
            }
        };

        Ok(Self {
            problem_type,
            tuner: Tuner::new(settings.exploration),
            rng: ChaCha8Rng::seed_from_u64(settings.random_seed),
            settings,
            families,
            batch: 0,
            next_id: 0,
            proposed: HashSet::new(),
            graphs: HashMap::new(),
        })
    }

    /// Model families that take part in the default sweep
    pub fn families(&self) -> &[ModelFamily] {
        &self.families
    }

    fn candidate(&mut self, graph: ComponentGraph, origin: CandidateOrigin) -> PipelineCandidate {
        let id = CandidateId(self.next_id);
        self.next_id += 1;
        self.proposed.insert(graph.signature());
        let candidate = PipelineCandidate::new(id, graph.clone_unfitted(), origin, self.batch);
        self.graphs.insert(id, graph);
        candidate
    }

    fn is_new(&self, signature: &PipelineSignature, seen: &HashSet<&PipelineSignature>) -> bool {
        !self.proposed.contains(signature) && !seen.contains(signature)
    }

    fn baseline_batch(&mut self, seen: &HashSet<&PipelineSignature>) -> Result<Vec<PipelineCandidate>> {
        let graph = ComponentGraph::baseline(self.problem_type)?;
        if !self.is_new(&graph.signature(), seen) {
            return Ok(Vec::new());
        }
        Ok(vec![self.candidate(graph, CandidateOrigin::Baseline)])
    }

    fn default_batch(&mut self, seen: &HashSet<&PipelineSignature>, cap: usize) -> Result<Vec<PipelineCandidate>> {
        let mut batch = Vec::new();
        for family in self.families.clone() {
            if batch.len() >= cap {
                break;
            }
            let graph = ComponentGraph::for_family(family, self.problem_type)?;
            if self.is_new(&graph.signature(), seen) {
                batch.push(self.candidate(graph, CandidateOrigin::Default));
            }
        }
        Ok(batch)
    }

    /// Best successful candidate per family, in rank order of that best
    fn top_families(&self, history: &[Arc<TrialResult>]) -> Vec<(ModelFamily, CandidateId)> {
        let mut top: Vec<(ModelFamily, CandidateId)> = Vec::new();
        for result in history.iter().filter(|r| r.is_success() && !r.origin.is_baseline()) {
            let Some(family) = self
                .graphs
                .get(&result.candidate_id)
                .and_then(|g| g.model_family())
            else {
                continue;
            };
            if !top.iter().any(|(f, _)| *f == family) {
                top.push((family, result.candidate_id));
            }
            if top.len() == self.settings.top_k {
                break;
            }
        }
        top
    }

    fn adaptive_batch(
        &mut self,
        history: &[Arc<TrialResult>],
        seen: &HashSet<&PipelineSignature>,
        cap: usize,
    ) -> Result<Vec<PipelineCandidate>> {
        let top = self.top_families(history);
        if top.is_empty() {
            debug!("no successful model family to tune");
            return Ok(Vec::new());
        }

        let mut batch = Vec::new();
        for _ in 0..self.settings.pipelines_per_batch {
            for (family, parent) in &top {
                if batch.len() >= cap {
                    return Ok(batch);
                }
                let Some(incumbent) = self.graphs.get(parent) else {
                    continue;
                };
                let estimator = incumbent.estimator().clone();
                let index = incumbent.components().len() - 1;
                let ranges = estimator.kind.hyperparameter_ranges();

                let mut accepted = None;
                for _ in 0..self.settings.max_resample_attempts.max(1) {
                    let params = self.tuner.propose(&estimator.params, &ranges, &mut self.rng);
                    let graph = incumbent.with_params(index, params)?;
                    if self.is_new(&graph.signature(), seen) {
                        accepted = Some(graph);
                        break;
                    }
                }

                match accepted {
                    Some(graph) => {
                        batch.push(self.candidate(graph, CandidateOrigin::Tuned { parent: *parent }))
                    }
                    None => debug!(family = %family, "resample attempts exhausted"),
                }
            }
        }
        Ok(batch)
    }
}

impl CandidateGenerator for IterativeGenerator {
    fn next_batch(
        &mut self,
        history: &[Arc<TrialResult>],
        budget: &BudgetRemaining,
    ) -> Result<Vec<PipelineCandidate>> {
        if budget.is_exhausted() {
            return Ok(Vec::new());
        }
        let cap = budget.iterations_left.unwrap_or(usize::MAX);
        let seen: HashSet<&PipelineSignature> = history.iter().map(|r| &r.signature).collect();

        let batch = match (self.batch, self.settings.strategy) {
            (0, _) => self.baseline_batch(&seen)?,
            (1, SearchStrategy::DefaultSweep | SearchStrategy::Adaptive) => {
                self.default_batch(&seen, cap)?
            }
            (_, SearchStrategy::Adaptive) if self.batch >= 2 => {
                self.adaptive_batch(history, &seen, cap)?
            }
            _ => Vec::new(),
        };

        debug!(batch = self.batch, size = batch.len(), "proposed batch");
        if !batch.is_empty() || self.batch < 2 {
            self.batch += 1;
        }
        Ok(batch)
    }

    fn name(&self) -> &str {
        "iterative"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{FoldScore, TrialStatus};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn success(candidate: &PipelineCandidate, score: f64) -> Arc<TrialResult> {
        Arc::new(TrialResult {
            trial_id: candidate.id.0,
            candidate_id: candidate.id,
            pipeline_name: candidate.name(),
            signature: candidate.signature.clone(),
            origin: candidate.origin,
            batch: candidate.batch,
            fold_scores: vec![FoldScore {
                fold: 0,
                score: Some(score),
                error: None,
                train_size: 10,
                test_size: 5,
            }],
            mean_score: Some(score),
            std_score: Some(0.0),
            additional_scores: BTreeMap::new(),
            threshold: None,
            duration: Duration::from_millis(1),
            completed_at: Utc::now(),
            status: TrialStatus::Success,
            error: None,
            notes: Vec::new(),
        })
    }

    #[test]
    fn test_batches_in_order() {
        let mut gen = IterativeGenerator::new(ProblemType::Binary, GeneratorSettings::default()).unwrap();
        let budget = BudgetRemaining::unlimited();

        let baseline = gen.next_batch(&[], &budget).unwrap();
        assert_eq!(baseline.len(), 1);
        assert_eq!(baseline[0].origin, CandidateOrigin::Baseline);
        assert_eq!(baseline[0].name(), "Baseline Classifier");

        let defaults = gen.next_batch(&[], &budget).unwrap();
        assert_eq!(defaults.len(), 4);
        assert!(defaults.iter().all(|c| c.origin == CandidateOrigin::Default && c.batch == 1));

        // Best first: decision tree, then KNN
        let history = vec![success(&defaults[3], 0.9), success(&defaults[2], 0.8)];
        let tuned = gen.next_batch(&history, &budget).unwrap();
        assert_eq!(tuned.len(), 10);
        assert_eq!(tuned[0].origin, CandidateOrigin::Tuned { parent: defaults[3].id });
        assert_eq!(tuned[1].origin, CandidateOrigin::Tuned { parent: defaults[2].id });

        let mut signatures: HashSet<_> = defaults.iter().map(|c| c.signature.clone()).collect();
        for candidate in &tuned {
            assert!(signatures.insert(candidate.signature.clone()), "duplicate {}", candidate.signature);
        }
    }

    #[test]
    fn test_baseline_only_stops() {
        let settings = GeneratorSettings::default().with_strategy(SearchStrategy::BaselineOnly);
        let mut gen = IterativeGenerator::new(ProblemType::Regression, settings).unwrap();
        let budget = BudgetRemaining::unlimited();
        assert_eq!(gen.next_batch(&[], &budget).unwrap().len(), 1);
        assert!(gen.next_batch(&[], &budget).unwrap().is_empty());
    }

    #[test]
    fn test_default_sweep_stops_after_defaults() {
        let settings = GeneratorSettings::default().with_strategy(SearchStrategy::DefaultSweep);
        let mut gen = IterativeGenerator::new(ProblemType::Regression, settings).unwrap();
        let budget = BudgetRemaining::unlimited();
        gen.next_batch(&[], &budget).unwrap();
        let defaults = gen.next_batch(&[], &budget).unwrap();
        assert_eq!(defaults.len(), 3);
        let history = vec![success(&defaults[0], 0.5)];
        assert!(gen.next_batch(&history, &budget).unwrap().is_empty());
    }

    #[test]
    fn test_adaptive_without_successes_is_empty() {
        let mut gen = IterativeGenerator::new(ProblemType::Binary, GeneratorSettings::default()).unwrap();
        let budget = BudgetRemaining::unlimited();
        gen.next_batch(&[], &budget).unwrap();
        gen.next_batch(&[], &budget).unwrap();
        assert!(gen.next_batch(&[], &budget).unwrap().is_empty());
    }

    #[test]
    fn test_batch_capped_by_budget() {
        let mut gen = IterativeGenerator::new(ProblemType::Binary, GeneratorSettings::default()).unwrap();
        let two_left = BudgetRemaining {
            iterations_left: Some(2),
            time_left: None,
        };
        gen.next_batch(&[], &two_left).unwrap();
        assert_eq!(gen.next_batch(&[], &two_left).unwrap().len(), 2);

        let none_left = BudgetRemaining {
            iterations_left: Some(0),
            time_left: None,
        };
        assert!(gen.next_batch(&[], &none_left).unwrap().is_empty());
    }

    #[test]
    fn test_allowed_families() {
        let settings = GeneratorSettings::default()
            .with_allowed_families(vec![ModelFamily::DecisionTree, ModelFamily::LinearModel]);
        let gen = IterativeGenerator::new(ProblemType::Regression, settings).unwrap();
        assert_eq!(gen.families(), &[ModelFamily::LinearModel, ModelFamily::DecisionTree]);

        let settings = GeneratorSettings::default().with_allowed_families(vec![ModelFamily::NaiveBayes]);
        assert!(matches!(
            IterativeGenerator::new(ProblemType::Regression, settings),
            Err(KolosalError::Setup(_))
        ));
    }

    #[test]
    fn test_same_seed_same_proposals() {
        let run = || {
            let mut gen = IterativeGenerator::new(ProblemType::Binary, GeneratorSettings::default()).unwrap();
            let budget = BudgetRemaining::unlimited();
            gen.next_batch(&[], &budget).unwrap();
            let defaults = gen.next_batch(&[], &budget).unwrap();
            let history = vec![success(&defaults[1], 0.7)];
            gen.next_batch(&history, &budget)
                .unwrap()
                .into_iter()
                .map(|c| c.signature)
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }
}

//! Train/test splitting for cross-validation

use crate::data::unique_sorted;
use crate::error::{KolosalError, Result};
use crate::problem::ProblemType;
use ndarray::ArrayView1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// How rows are assigned to folds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStrategy {
    /// Contiguous folds over (optionally shuffled) row order
    KFold { shuffle: bool },
    /// Per-class round robin, classes in ascending label order
    StratifiedKFold { shuffle: bool },
    /// Expanding training window followed by the next block; never shuffled
    TimeSeries { gap: usize },
}

/// A single train/test split
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CVSplit {
    pub fold: usize,
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Produces the folds a candidate is evaluated on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSplitter {
    pub strategy: SplitStrategy,
    pub n_folds: usize,
    pub seed: u64,
}

impl DataSplitter {
    pub fn new(strategy: SplitStrategy, n_folds: usize) -> Self {
        Self {
            strategy,
            n_folds,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Stratified for classification, shuffled K-fold for regression and
    /// rolling origin for time series
    pub fn for_problem(problem_type: ProblemType, n_folds: usize, shuffle: bool, gap: usize) -> Self {
        let strategy = if problem_type.is_time_series() {
            SplitStrategy::TimeSeries { gap }
        } else if problem_type.is_classification() {
            SplitStrategy::StratifiedKFold { shuffle }
        } else {
            SplitStrategy::KFold { shuffle }
        };
        Self::new(strategy, n_folds)
    }

    /// Splits for `y`; every split is a fresh function of the seed, so repeated
    /// calls give the same folds
    pub fn split(&self, y: ArrayView1<'_, f64>) -> Result<Vec<CVSplit>> {
        let n_samples = y.len();
        if self.n_folds < 2 {
            return Err(KolosalError::ValidationError(
                "n_folds must be at least 2".to_string(),
            ));
        }
        if n_samples < self.n_folds {
            return Err(KolosalError::ValidationError(format!(
                "n_samples ({}) must be >= n_folds ({})",
                n_samples, self.n_folds
            )));
        }

        match self.strategy {
            SplitStrategy::KFold { shuffle } => Ok(self.k_fold(n_samples, shuffle)),
            SplitStrategy::StratifiedKFold { shuffle } => Ok(self.stratified_k_fold(y, shuffle)),
            SplitStrategy::TimeSeries { gap } => self.time_series(n_samples, gap),
        }
    }

    fn k_fold(&self, n_samples: usize, shuffle: bool) -> Vec<CVSplit> {
        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            indices.shuffle(&mut ChaCha8Rng::seed_from_u64(self.seed));
        }

        let base = n_samples / self.n_folds;
        let remainder = n_samples % self.n_folds;
        let mut folds = Vec::with_capacity(self.n_folds);
        let mut current = 0;
        for fold in 0..self.n_folds {
            let size = if fold < remainder { base + 1 } else { base };
            folds.push(indices[current..current + size].to_vec());
            current += size;
        }
        splits_from_folds(folds)
    }

    fn stratified_k_fold(&self, y: ArrayView1<'_, f64>, shuffle: bool) -> Vec<CVSplit> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut folds: Vec<Vec<usize>> = vec![Vec::new(); self.n_folds];

        // Continue the round robin across classes so small classes do not all
        // land in fold 0
        let mut next_fold = 0;
        for class in unique_sorted(y.iter().copied()) {
            let mut members: Vec<usize> = y
                .iter()
                .enumerate()
                .filter(|(_, v)| **v == class)
                .map(|(i, _)| i)
                .collect();
            if shuffle {
                members.shuffle(&mut rng);
            }
            for idx in members {
                folds[next_fold].push(idx);
                next_fold = (next_fold + 1) % self.n_folds;
            }
        }

        // Non-finite labels belong to no class; spread them too
        for (i, v) in y.iter().enumerate() {
            if !v.is_finite() {
                folds[next_fold].push(i);
                next_fold = (next_fold + 1) % self.n_folds;
            }
        }
        splits_from_folds(folds)
    }

    fn time_series(&self, n_samples: usize, gap: usize) -> Result<Vec<CVSplit>> {
        let test_size = n_samples / (self.n_folds + 1);
        if test_size == 0 {
            return Err(KolosalError::ValidationError(format!(
                "{} rows are too few for {} time series folds",
                n_samples, self.n_folds
            )));
        }

        let mut splits = Vec::with_capacity(self.n_folds);
        for fold in 0..self.n_folds {
            let test_start = (fold + 1) * test_size;
            let test_end = if fold + 1 == self.n_folds {
                n_samples
            } else {
                test_start + test_size
            };
            let train_end = test_start.saturating_sub(gap);
            if train_end == 0 {
                return Err(KolosalError::ValidationError(format!(
                    "gap of {} rows leaves fold {} without training rows",
                    gap, fold
                )));
            }
            splits.push(CVSplit {
                fold,
                train: (0..train_end).collect(),
                test: (test_start..test_end).collect(),
            });
        }
        Ok(splits)
    }
}

fn splits_from_folds(folds: Vec<Vec<usize>>) -> Vec<CVSplit> {
    (0..folds.len())
        .map(|fold| {
            let mut test = folds[fold].clone();
            test.sort_unstable();
            let mut train: Vec<usize> = folds
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != fold)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            train.sort_unstable();
            CVSplit { fold, train, test }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn assert_partition(splits: &[CVSplit], n: usize) {
        let mut seen: Vec<usize> = splits.iter().flat_map(|s| s.test.iter().copied()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
        for split in splits {
            assert!(split.test.iter().all(|i| !split.train.contains(i)));
            assert_eq!(split.train.len() + split.test.len(), n);
        }
    }

    #[test]
    fn test_k_fold_partition() {
        let y = Array1::<f64>::zeros(10);
        let splitter = DataSplitter::new(SplitStrategy::KFold { shuffle: true }, 3).with_seed(42);
        let splits = splitter.split(y.view()).unwrap();
        assert_eq!(splits.len(), 3);
        assert_eq!(splits.iter().map(|s| s.test.len()).collect::<Vec<_>>(), vec![4, 3, 3]);
        assert_partition(&splits, 10);
        assert_eq!(splits, splitter.split(y.view()).unwrap());
    }

    #[test]
    fn test_stratified_keeps_class_balance() {
        let y = array![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let splitter = DataSplitter::new(SplitStrategy::StratifiedKFold { shuffle: true }, 3).with_seed(1);
        let splits = splitter.split(y.view()).unwrap();
        assert_partition(&splits, 9);
        for split in &splits {
            let positives = split.test.iter().filter(|&&i| y[i] == 1.0).count();
            assert_eq!(positives, 1);
            assert_eq!(split.test.len(), 3);
        }
    }

    #[test]
    fn test_time_series_windows() {
        let y = Array1::<f64>::zeros(10);
        let splitter = DataSplitter::for_problem(ProblemType::TimeSeriesRegression, 3, true, 0);
        let splits = splitter.split(y.view()).unwrap();

        assert_eq!(splits[0].train, (0..2).collect::<Vec<_>>());
        assert_eq!(splits[0].test, (2..4).collect::<Vec<_>>());
        assert_eq!(splits[2].test, (6..10).collect::<Vec<_>>());
        for pair in splits.windows(2) {
            assert!(pair[1].test[0] > pair[0].test[0]);
            assert!(pair[1].train.len() > pair[0].train.len());
        }
        for split in &splits {
            // Strictly contiguous, train entirely before test
            assert!(split.train.windows(2).all(|w| w[1] == w[0] + 1));
            assert!(split.test.windows(2).all(|w| w[1] == w[0] + 1));
            assert!(split.train.last().unwrap() < &split.test[0]);
        }
    }

    #[test]
    fn test_time_series_gap() {
        let y = Array1::<f64>::zeros(12);
        let splitter = DataSplitter::new(SplitStrategy::TimeSeries { gap: 1 }, 2);
        let splits = splitter.split(y.view()).unwrap();
        assert_eq!(splits[0].train, vec![0, 1, 2]);
        assert_eq!(splits[0].test, vec![4, 5, 6, 7]);
    }

    #[test]
    fn test_errors() {
        let y = Array1::<f64>::zeros(2);
        assert!(DataSplitter::new(SplitStrategy::KFold { shuffle: false }, 1)
            .split(y.view())
            .is_err());
        assert!(DataSplitter::new(SplitStrategy::KFold { shuffle: false }, 3)
            .split(y.view())
            .is_err());

        let y = Array1::<f64>::zeros(5);
        assert!(DataSplitter::new(SplitStrategy::TimeSeries { gap: 0 }, 5)
            .split(y.view())
            .is_err());
    }
}

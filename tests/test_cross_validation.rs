//! Integration tests for fold construction

use kolosal_search::evaluation::{CVSplit, DataSplitter, SplitStrategy};
use kolosal_search::prelude::*;
use ndarray::Array1;
use proptest::prelude::*;

fn assert_disjoint(split: &CVSplit) {
    for idx in &split.test {
        assert!(!split.train.contains(idx), "row {} in train and test", idx);
    }
}

#[test]
fn test_time_series_folds_expand_forward() {
    let y = Array1::from_iter((0..50).map(|i| i as f64));
    let splitter = DataSplitter::for_problem(ProblemType::TimeSeriesRegression, 4, true, 0);
    assert_eq!(splitter.strategy, SplitStrategy::TimeSeries { gap: 0 });

    let splits = splitter.split(y.view()).unwrap();
    assert_eq!(splits.len(), 4);
    let mut last_train_end = 0;
    for split in &splits {
        let train_end = *split.train.last().unwrap();
        assert!(train_end < split.test[0]);
        assert!(train_end > last_train_end || last_train_end == 0);
        last_train_end = train_end;
        // Contiguous ranges starting from row zero
        assert_eq!(split.train, (0..split.train.len()).collect::<Vec<_>>());
        assert!(split.test.windows(2).all(|w| w[1] == w[0] + 1));
    }
    assert_eq!(*splits.last().unwrap().test.last().unwrap(), 49);
}

#[test]
fn test_time_series_gap() {
    let y = Array1::zeros(40);
    let splits = DataSplitter::new(SplitStrategy::TimeSeries { gap: 3 }, 3)
        .split(y.view())
        .unwrap();
    for split in &splits {
        assert_eq!(split.test[0] - split.train.len(), 3);
    }

    // Gap swallows the first training window
    let err = DataSplitter::new(SplitStrategy::TimeSeries { gap: 10 }, 3).split(y.view());
    assert!(matches!(err, Err(KolosalError::ValidationError(_))));
}

#[test]
fn test_stratified_keeps_class_balance() {
    let y = Array1::from_iter((0..90).map(|i| if i < 60 { 0.0 } else { 1.0 }));
    let splits = DataSplitter::for_problem(ProblemType::Binary, 3, true, 0)
        .with_seed(11)
        .split(y.view())
        .unwrap();
    for split in &splits {
        assert_disjoint(split);
        let positives = split.test.iter().filter(|&&i| y[i] == 1.0).count();
        assert_eq!(split.test.len(), 30);
        assert_eq!(positives, 10);
    }
}

#[test]
fn test_seed_controls_shuffle() {
    let y = Array1::from_iter((0..40).map(|i| (i % 4) as f64));
    let a = DataSplitter::new(SplitStrategy::KFold { shuffle: true }, 4).with_seed(1);
    let b = DataSplitter::new(SplitStrategy::KFold { shuffle: true }, 4).with_seed(2);
    assert_eq!(a.split(y.view()).unwrap(), a.split(y.view()).unwrap());
    assert_ne!(a.split(y.view()).unwrap(), b.split(y.view()).unwrap());
}

#[test]
fn test_too_few_rows() {
    let y = Array1::zeros(2);
    let err = DataSplitter::new(SplitStrategy::KFold { shuffle: false }, 3).split(y.view());
    assert!(matches!(err, Err(KolosalError::ValidationError(_))));
}

proptest! {
    #[test]
    fn prop_kfold_partitions_rows(n in 5usize..120, k in 2usize..6, seed in any::<u64>(), shuffle in any::<bool>()) {
        prop_assume!(n >= k);
        let y = Array1::from_iter((0..n).map(|i| (i % 3) as f64));
        for strategy in [SplitStrategy::KFold { shuffle }, SplitStrategy::StratifiedKFold { shuffle }] {
            let splits = DataSplitter::new(strategy, k).with_seed(seed).split(y.view()).unwrap();
            prop_assert_eq!(splits.len(), k);

            let mut seen: Vec<usize> = splits.iter().flat_map(|s| s.test.iter().copied()).collect();
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..n).collect::<Vec<_>>());

            for split in &splits {
                prop_assert_eq!(split.train.len() + split.test.len(), n);
                prop_assert!(split.test.iter().all(|i| split.train.binary_search(i).is_err()));
            }
        }
    }
}

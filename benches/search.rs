use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kolosal_search::data::from_dataframe;
use kolosal_search::pipeline::CandidateOrigin;
use kolosal_search::prelude::*;
use polars::prelude::*;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn create_classification_data(n_rows: usize, n_features: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let features: Vec<Vec<f64>> = (0..n_features)
        .map(|_| (0..n_rows).map(|_| rng.gen::<f64>() * 10.0).collect())
        .collect();

    // Label depends on the first two features plus noise
    let target: Vec<i64> = (0..n_rows)
        .map(|i| i64::from(features[0][i] + features[1][i] + rng.gen::<f64>() > 10.5))
        .collect();

    let mut columns: Vec<Column> = features
        .into_iter()
        .enumerate()
        .map(|(i, values)| Column::new(format!("feature_{}", i).into(), values))
        .collect();
    columns.push(Column::new("target".into(), target));

    let df = DataFrame::new(columns).unwrap();
    from_dataframe(&df, "target", &LoadOptions::new()).unwrap()
}

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    group.sample_size(10);

    for n_rows in [500, 2000].iter() {
        let dataset = create_classification_data(*n_rows, 8);
        let evaluator = CrossValidationEvaluator::new(
            ProblemType::Binary,
            objective_by_name("log_loss_binary").unwrap(),
            3,
        );

        for family in [ModelFamily::LinearModel, ModelFamily::DecisionTree] {
            let graph = ComponentGraph::for_family(family, ProblemType::Binary).unwrap();
            let candidate = PipelineCandidate::new(CandidateId(0), Box::new(graph), CandidateOrigin::Default, 1);
            group.bench_with_input(
                BenchmarkId::new(family.name(), n_rows),
                &dataset,
                |b, data| b.iter(|| evaluator.evaluate(0, black_box(&candidate), black_box(data))),
            );
        }
    }

    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(10);

    let dataset = create_classification_data(1000, 8);
    for n_jobs in [1i64, 4].iter() {
        group.bench_with_input(BenchmarkId::new("default_sweep", n_jobs), n_jobs, |b, &n_jobs| {
            b.iter(|| {
                let config = SearchConfig::new(ProblemType::Binary)
                    .with_strategy(SearchStrategy::DefaultSweep)
                    .with_n_jobs(n_jobs)
                    .with_train_best_pipeline(false);
                let search = AutoMLSearch::new(dataset.clone(), config).unwrap();
                search.search().unwrap();
                black_box(search.leaderboard().len())
            })
        });
    }

    group.finish();
}

fn bench_leaderboard(c: &mut Criterion) {
    let dataset = create_classification_data(300, 4);
    let config = SearchConfig::new(ProblemType::Binary)
        .with_max_iterations(30)
        .with_train_best_pipeline(false);
    let search = AutoMLSearch::new(dataset, config).unwrap();
    search.search().unwrap();
    let board = search.leaderboard();

    c.bench_function("leaderboard_rankings", |b| b.iter(|| black_box(board.rankings())));
}

criterion_group!(benches, bench_evaluate, bench_search, bench_leaderboard);
criterion_main!(benches);

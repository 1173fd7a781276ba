//! Integration tests for checkpoints, CSV loading and pipeline descriptions

use kolosal_search::data_checks::DataCheckCode;
use kolosal_search::prelude::*;
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

fn write_csv(rows: usize) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "x1,x2,colour,label").unwrap();
    let colours = ["red", "green", "blue"];
    for i in 0..rows {
        let label = i % 2;
        let x1 = label as f64 * 3.0 + (i % 5) as f64 * 0.2;
        let x2 = if i % 7 == 0 { String::new() } else { format!("{:.2}", (i % 9) as f64 * 0.5) };
        writeln!(file, "{},{},{},{}", x1, x2, colours[i % 3], label).unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn test_csv_search_and_checkpoint() {
    let file = write_csv(60);
    let options = LoadOptions::new().with_categorical(vec!["colour".to_string()]);
    let dataset = load_csv(file.path(), "label", &options).unwrap();
    assert_eq!(dataset.n_features(), 3);
    assert!(dataset.x()[[0, 1]].is_nan());

    let config = SearchConfig::new(ProblemType::Binary)
        .with_objective("f1")
        .with_additional_objectives(vec!["accuracy".to_string()])
        .with_strategy(SearchStrategy::DefaultSweep);
    let search = AutoMLSearch::new(dataset, config).unwrap();
    search.search().unwrap();

    let best = search.best_result().unwrap();
    assert!(best.additional_scores.contains_key("accuracy"));
    // F1 is thresholded, so binary candidates carry a tuned threshold
    assert!(best.threshold.is_some());
    assert_eq!(search.best_pipeline().unwrap().threshold, best.threshold);

    let dir = tempdir().unwrap();
    let path = dir.path().join("search.json");
    search.save_checkpoint(&path).unwrap();

    let loaded = SearchCheckpoint::load(&path).unwrap();
    assert_eq!(loaded.objective, "f1");
    assert!(loaded.greater_is_better);
    assert_eq!(loaded.problem_type, ProblemType::Binary);
    assert_eq!(loaded.results.len(), search.leaderboard().len());
    let ids = |rows: &[RankingRow]| rows.iter().map(|r| (r.rank, r.candidate_id)).collect::<Vec<_>>();
    assert_eq!(ids(&loaded.rankings), ids(&search.rankings()));
    assert_eq!(loaded.state.status, SearchStatus::Completed);
    assert_eq!(loaded.best().map(|r| r.candidate_id), Some(best.candidate_id));

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"mean_score\""));
}

#[test]
fn test_describe_pipeline() {
    let file = write_csv(30);
    let options = LoadOptions::new().with_categorical(vec!["colour".to_string()]);
    let dataset = load_csv(file.path(), "label", &options).unwrap();
    let config = SearchConfig::new(ProblemType::Binary).with_strategy(SearchStrategy::DefaultSweep);
    let search = AutoMLSearch::new(dataset, config).unwrap();
    search.search().unwrap();

    let tree = search
        .leaderboard()
        .history()
        .into_iter()
        .find(|r| r.pipeline_name.starts_with("Decision Tree"))
        .unwrap();
    let text = search.describe_pipeline(tree.candidate_id).unwrap();
    assert!(text.contains("Simple Imputer"));
    assert!(text.contains("max_depth"));
    assert!(text.contains("Fold scores"));
    assert!(text.contains("Objective: log_loss_binary"));

    assert!(matches!(
        search.describe_pipeline(CandidateId(10_000)),
        Err(KolosalError::NotFound(_))
    ));
}

#[test]
fn test_text_column_blocks_search() {
    let file = write_csv(30);
    // Without declaring "colour" categorical it stays free text
    let dataset = load_csv(file.path(), "label", &LoadOptions::new()).unwrap();
    let search = AutoMLSearch::new(dataset, SearchConfig::new(ProblemType::Binary)).unwrap();

    assert!(matches!(search.search(), Err(KolosalError::Setup(_))));
    let report = search.data_check_report();
    assert!(report.codes().contains(&DataCheckCode::UnsupportedColumnType));
    assert!(matches!(
        search.status(),
        SearchStatus::StoppedByError(StopReason::SetupFailed(_))
    ));
}

#[test]
fn test_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "problem_type": "regression",
            "objective": "mae",
            "n_folds": 4,
            "max_iterations": 8,
            "strategy": "default_sweep",
            "allowed_model_families": ["linear_model", "decision_tree"]
        }}"#
    )
    .unwrap();

    let config = SearchConfig::from_json_file(file.path()).unwrap();
    assert_eq!(config.problem_type, ProblemType::Regression);
    assert_eq!(config.objective.as_deref(), Some("mae"));
    assert_eq!(config.strategy, SearchStrategy::DefaultSweep);
    assert_eq!(
        config.allowed_model_families,
        Some(vec![ModelFamily::LinearModel, ModelFamily::DecisionTree])
    );
    assert_eq!(config.pipelines_per_batch, 5);
}

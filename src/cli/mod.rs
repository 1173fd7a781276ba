//! Kolosal Search CLI
//!
//! Command-line interface for running searches, checking data and listing
//! what the search can build.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::components::{list_model_families, ComponentKind, ComponentRole};
use crate::config::SearchConfig;
use crate::data::{load_csv, Dataset, LoadOptions};
use crate::data_checks::{default_data_checks, run_data_checks, DataCheckReport};
use crate::evaluation::TrialStatus;
use crate::generator::SearchStrategy;
use crate::leaderboard::{truncate, RankingRow};
use crate::objectives::{objective_by_name, objective_names};
use crate::problem::ProblemType;
use crate::search::{AutoMLSearch, SearchStatus};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "kolosal-search")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "AutoML pipeline search with cross-validated ranking")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Where the data comes from and how to read it
#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Input CSV file
    #[arg(short, long)]
    pub data: PathBuf,

    /// Target column name
    #[arg(short, long)]
    pub target: String,

    /// Problem type (binary, multiclass, regression, time_series_binary, ...)
    #[arg(short, long, default_value = "binary")]
    pub problem: String,

    /// String columns to encode as categories (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub categorical: Vec<String>,

    /// Column holding the time order of a time-series dataset
    #[arg(long)]
    pub time_index: Option<String>,

    /// Number of cross-validation folds
    #[arg(long, default_value = "3")]
    pub n_folds: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search for the best pipeline
    Search {
        #[command(flatten)]
        data: DataArgs,

        /// JSON search configuration; command-line flags override it
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Objective to optimize (defaults per problem type)
        #[arg(short, long)]
        objective: Option<String>,

        /// Maximum number of pipelines to evaluate
        #[arg(long)]
        max_iterations: Option<usize>,

        /// Wall-clock budget in seconds
        #[arg(long)]
        max_time: Option<f64>,

        /// Maximum number of batches
        #[arg(long)]
        max_batches: Option<usize>,

        /// Parallel workers (-1 for all cores)
        #[arg(long, allow_negative_numbers = true)]
        n_jobs: Option<i64>,

        /// Search strategy (baseline_only, default_sweep, adaptive)
        #[arg(long)]
        strategy: Option<String>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Stop after this many trials without improvement
        #[arg(long)]
        patience: Option<usize>,

        /// Write a JSON checkpoint of the finished search here
        #[arg(long)]
        checkpoint: Option<PathBuf>,

        /// Print a description of the best pipeline
        #[arg(long)]
        describe: bool,
    },

    /// Run the data checks without searching
    Check {
        #[command(flatten)]
        data: DataArgs,
    },

    /// List model families, components and objectives
    Models {
        /// Restrict to one problem type
        #[arg(short, long)]
        problem: Option<String>,
    },
}

// ─── Data loading ──────────────────────────────────────────────────────────────

fn load_dataset(args: &DataArgs) -> anyhow::Result<(Dataset, ProblemType)> {
    let problem_type: ProblemType = args.problem.parse()?;

    let mut options = LoadOptions::new().with_categorical(args.categorical.clone());
    if let Some(column) = &args.time_index {
        options = options.with_time_index(column.clone());
    }

    step_run("Loading data");
    let start = Instant::now();
    let dataset = load_csv(&args.data, &args.target, &options)?;
    step_done(&format!(
        "{} rows × {} features in {:?}",
        dataset.n_samples(),
        dataset.n_features(),
        start.elapsed()
    ));
    Ok((dataset, problem_type))
}

// ─── Commands ──────────────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
pub fn cmd_search(
    data: &DataArgs,
    config_path: Option<&Path>,
    objective: Option<&str>,
    max_iterations: Option<usize>,
    max_time: Option<f64>,
    max_batches: Option<usize>,
    n_jobs: Option<i64>,
    strategy: Option<&str>,
    seed: Option<u64>,
    patience: Option<usize>,
    checkpoint: Option<&Path>,
    describe: bool,
) -> anyhow::Result<()> {
    section("Search");

    let (dataset, problem_type) = load_dataset(data)?;

    let mut config = match config_path {
        Some(path) => SearchConfig::from_json_file(path)?,
        None => SearchConfig::default(),
    };
    config.problem_type = problem_type;
    config.n_folds = data.n_folds;
    if let Some(name) = objective {
        config = config.with_objective(name);
    }
    if let Some(n) = max_iterations {
        config = config.with_max_iterations(n);
    }
    if let Some(secs) = max_time {
        config = config.with_max_time(secs);
    }
    if let Some(n) = max_batches {
        config = config.with_max_batches(n);
    }
    if let Some(n) = n_jobs {
        config = config.with_n_jobs(n);
    }
    if let Some(name) = strategy {
        config = config.with_strategy(name.parse::<SearchStrategy>()?);
    }
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    if let Some(patience) = patience {
        config.patience = Some(patience);
    }

    let search = AutoMLSearch::new(dataset, config)?;
    println!(
        "  {:<12} {}",
        muted("Objective"),
        search.objective().name().cyan()
    );

    step_run("Searching");
    let start = Instant::now();
    let outcome = search.search();
    match &outcome {
        Ok(()) => step_done(&format!("{:?}", start.elapsed())),
        Err(_) => println!("{}", "failed".red()),
    }
    print_report(&search.data_check_report());
    outcome?;

    print_rankings(&search.rankings(), search.status());

    if let Some(best) = search.best_result() {
        println!(
            "  {} {} {} {:.4}",
            ok("best"),
            best.pipeline_name.white().bold(),
            muted(&format!("{}:", search.objective().name())),
            best.mean_score.unwrap_or(f64::NAN)
        );
        if describe {
            println!();
            for line in search.describe_pipeline(best.candidate_id)?.lines() {
                println!("  {}", line);
            }
        }
        println!();
    }

    if let Some(path) = checkpoint {
        step_run(&format!("Saving → {}", path.display()));
        search.save_checkpoint(path)?;
        step_done("");
    }
    Ok(())
}

pub fn cmd_check(data: &DataArgs) -> anyhow::Result<()> {
    section("Data Checks");

    let (dataset, problem_type) = load_dataset(data)?;
    let report = run_data_checks(
        &default_data_checks(problem_type, data.n_folds),
        &dataset,
        problem_type,
    );
    print_report(&report);
    if report.is_empty() {
        println!("  {} no issues found", ok("✓"));
    }
    println!();

    if report.has_errors() {
        anyhow::bail!("{} data check error(s)", report.errors.len());
    }
    Ok(())
}

pub fn cmd_models(problem: Option<&str>) -> anyhow::Result<()> {
    let problems: Vec<ProblemType> = match problem {
        Some(name) => vec![name.parse()?],
        None => ProblemType::ALL.to_vec(),
    };

    for problem_type in problems {
        section(problem_type.display_name());

        let families: Vec<String> = list_model_families(problem_type)
            .iter()
            .map(|f| f.to_string())
            .collect();
        println!("  {:<14} {}", muted("Families"), families.join(", "));

        let estimators: Vec<&str> = ComponentKind::ALL
            .iter()
            .filter(|k| k.role() == ComponentRole::Estimator && k.supports(problem_type))
            .map(|k| k.name())
            .collect();
        println!("  {:<14} {}", muted("Estimators"), estimators.join(", "));

        let objectives: Vec<&str> = objective_names()
            .iter()
            .copied()
            .filter(|name| objective_by_name(name).is_ok_and(|o| o.supports(problem_type)))
            .collect();
        println!("  {:<14} {}", muted("Objectives"), objectives.join(", "));
    }

    let transformers: Vec<&str> = ComponentKind::ALL
        .iter()
        .filter(|k| k.role() == ComponentRole::Transformer)
        .map(|k| k.name())
        .collect();
    section("Transformers");
    println!("  {}", transformers.join(", "));
    println!();
    Ok(())
}

// ─── Output ────────────────────────────────────────────────────────────────────

fn print_report(report: &DataCheckReport) {
    for message in &report.errors {
        println!("  {} {}", "error".red().bold(), message);
    }
    for message in &report.warnings {
        println!("  {} {}", "warn".yellow(), message);
    }
}

fn print_rankings(rows: &[RankingRow], status: SearchStatus) {
    println!();
    println!(
        "  {:>4}  {:<5} {:<44} {:>10} {:>8} {:>5}",
        muted("Rank"),
        muted("Id"),
        muted("Pipeline"),
        muted("Mean"),
        muted("Std"),
        muted("Folds")
    );
    println!("  {}", dim(&"─".repeat(82)));

    for row in rows {
        let name = truncate(&row.pipeline_name, 44);
        match (row.rank, row.status) {
            (Some(rank), TrialStatus::Success) => {
                let mean = format!("{:.4}", row.mean_score.unwrap_or(f64::NAN));
                let std = row.std_score.map_or_else(|| "-".to_string(), |s| format!("{:.4}", s));
                let line = format!(
                    "{:>4}  {:<5} {:<44} {:>10} {:>8} {:>5}",
                    rank,
                    row.candidate_id.to_string(),
                    name,
                    mean,
                    std,
                    row.n_folds
                );
                if rank == 1 {
                    println!("  {}", line.green().bold());
                } else {
                    println!("  {}", line);
                }
            }
            _ => {
                println!(
                    "  {}",
                    format!("{:>4}  {:<5} {:<44} {:>10}", "-", row.candidate_id.to_string(), name, "failed")
                        .red()
                );
            }
        }
    }

    println!("  {}", dim(&"─".repeat(82)));
    println!("  {:<12} {}", muted("Status"), status.to_string().white());
    println!();
}

//! Cross-validation: fold construction and per-candidate scoring

mod evaluator;
mod splitter;

pub use evaluator::{CrossValidationEvaluator, FoldScore, TrialResult, TrialStatus};
pub use splitter::{CVSplit, DataSplitter, SplitStrategy};

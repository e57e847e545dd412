//! Page classification.

mod heuristic;

pub use heuristic::{HeuristicPageClassifier, KeywordScore};

//! Sample tasks for the ml-fit pipeline lifecycle
//!
//! Each task loads its data files, fits a pipeline, evaluates the model on
//! held-out rows, saves and reloads it, and scores a few records through a
//! [`PredictionEngine`](ml_fit_model::PredictionEngine). The `ml-fit-samples`
//! binary exposes every task as a subcommand.

#![warn(missing_docs)]

pub mod cli;
pub mod tasks;

pub use tasks::movies::RecommendPolicy;

//! Submission grading engine: decodes test-case inputs, builds a harness per
//! language, runs it in a sandbox and folds the outcomes into a verdict.
pub mod canonical;
pub mod catalog;
pub mod config;
pub mod decoder;
pub mod entry_point;
pub mod evaluator;
pub mod grader;
pub mod harness;
pub mod pool;
pub mod runner;
pub mod sandbox;

#[cfg(test)]
mod grader_tests;

pub use catalog::{FileCatalog, ProblemCatalog};
pub use grader::{GradeError, Grader};
pub use pool::CancelToken;

//! Assignment checker
//!
//! Runs submitted JavaScript/TypeScript against assignment test cases in a
//! disposable sandbox, lints it and scores the result.

pub mod analyzer;
pub mod checker;
pub mod config;
pub mod core;
pub mod executor;
pub mod jobs;
pub mod judger;
pub mod languages;
pub mod redis_manager;
pub mod runner;
pub mod sandbox;
pub mod scorer;
pub mod storage;

pub use checker::{AssignmentSource, AssignmentSpec, Checker, PreparedCheck};
pub use core::{CheckError, CheckRequest, CheckResult, CheckSettings, ExecutionFailure};
pub use executor::{Executor, SandboxedExecutor};

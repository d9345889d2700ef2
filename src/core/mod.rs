//! Core types shared by every stage of a check run

pub mod error;
pub mod model;
pub mod source;

pub use error::{CheckError, ExecutionFailure};
pub use model::{
    CheckRequest, CheckResult, CheckSettings, LintFinding, SettingsOverrides, Severity, TestCase,
    TestOutcome, TestStats,
};

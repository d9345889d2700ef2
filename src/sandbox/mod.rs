//! Sandbox module - Low-level isolate wrapper
//!
//! This module provides a minimal abstraction over the isolate sandbox.
//! It handles:
//! - Isolate box initialization and cleanup
//! - Cgroup detection and box id allocation
//! - Raw command execution returning `SandboxOutcome`
//!
//! The sandbox module does NOT:
//! - Interpret results (that's the executor's job)
//! - Know about languages or harness scripts

pub mod config;
pub mod isolate_box;
pub mod meta;

// Re-exports for convenience
pub use config::{get_config, init_config, next_box_id, SandboxConfig};
pub use isolate_box::{
    ensure_cgroups_available, is_cgroups_available, IoSpec, IsolateBox, Limits, SandboxOutcome,
};
pub use meta::{IsolateMeta, IsolateStatus};

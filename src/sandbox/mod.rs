//! Sandbox module - Low-level isolate wrapper
//!
//! This module provides a minimal abstraction over the isolate sandbox.
//! It handles:
//! - Isolate box initialization and guaranteed cleanup
//! - Cgroup detection
//! - File copy in/out helpers
//! - Raw command execution returning `SandboxOutcome` with a `BoxReport`
//!
//! The sandbox module does NOT:
//! - Interpret verdicts (that's the evaluator's job)
//! - Know about toolchains or compilation
//! - Compare outputs

pub mod config;
pub mod error;
pub mod isolate_box;
pub mod report;

pub use config::{BoxIdAllocator, SandboxConfig};
pub use error::SandboxError;
pub use isolate_box::{
    probe_cgroups, truncate_capture, IoSpec, IsolateBox, Limits, MountProfile, SandboxOutcome,
    MAX_CAPTURE_BYTES,
};
pub use report::{BoxReport, BoxStatus};

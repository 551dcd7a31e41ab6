//! Executor module - compile and run untrusted code
//!
//! This module provides the contract the rest of the crate programs against:
//! - `Executor::compile`: one source file -> `CompiledArtifact` or `CompileError`
//! - `Executor::execute`: artifact + stdin -> `Execution`
//!
//! Every process-level failure is translated here. Nothing past this
//! boundary sees an `std::io::Error` or an isolate status code; callers only
//! see `ExecutionOutcome` and, for compile, `CompileError::System`.
//!
//! The executor module does NOT:
//! - Compare outputs or decide pass/fail
//! - Persist anything
//! - Cache compiled binaries (see `reference_cache`)

pub mod isolate;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::sandbox::SandboxError;

pub use isolate::IsolateExecutor;

/// A compiled binary living in its own temporary directory.
///
/// The directory (and the binary) is removed when the artifact is dropped,
/// whichever way the caller leaves: success, early return, timeout, panic.
#[derive(Debug)]
pub struct CompiledArtifact {
    dir: TempDir,
    binary: PathBuf,
}

impl CompiledArtifact {
    pub fn new(dir: TempDir, binary_name: &str) -> Self {
        let binary = dir.path().join(binary_name);
        Self { dir, binary }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Why a compile attempt produced no artifact
#[derive(Debug)]
pub enum CompileError {
    /// The compiler rejected the source; carries the diagnostics
    Diagnostics(String),
    /// The sandbox or toolchain is broken; nobody is to blame
    System(SandboxError),
}

impl From<SandboxError> for CompileError {
    fn from(err: SandboxError) -> Self {
        CompileError::System(err)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Diagnostics(text) => write!(f, "{}", text),
            CompileError::System(err) => write!(f, "{}", err),
        }
    }
}

/// Raw execution outcome (no verdict interpretation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Success,
    RuntimeError,
    Timeout,
    SystemError,
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionOutcome::Success => "success",
            ExecutionOutcome::RuntimeError => "runtime_error",
            ExecutionOutcome::Timeout => "timeout",
            ExecutionOutcome::SystemError => "system_error",
        };
        write!(f, "{}", s)
    }
}

/// Result of running an artifact once
#[derive(Debug, Clone)]
pub struct Execution {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub outcome: ExecutionOutcome,
}

impl Execution {
    /// The sandbox failed; the program may never have started.
    pub fn system_error(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            exit_code: -1,
            outcome: ExecutionOutcome::SystemError,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == ExecutionOutcome::Success
    }

    pub fn is_system_error(&self) -> bool {
        self.outcome == ExecutionOutcome::SystemError
    }
}

/// Compiles and runs single-file programs in isolation
#[async_trait]
pub trait Executor: Send + Sync {
    /// Compile one source file under the compile bound.
    async fn compile(&self, source: &str) -> Result<CompiledArtifact, CompileError>;

    /// Run the artifact once, feeding `stdin`, under `time_limit_ms`.
    async fn execute(
        &self,
        artifact: &CompiledArtifact,
        stdin: &str,
        time_limit_ms: u32,
    ) -> Execution;
}

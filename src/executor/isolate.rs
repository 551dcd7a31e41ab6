//! Isolate-backed executor
//!
//! Compiles inside a box with the toolchain visible, then runs the binary
//! in a fresh box that only contains the binary and its stdin.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, error, warn};

use super::{CompileError, CompiledArtifact, Execution, ExecutionOutcome, Executor};
use crate::sandbox::{
    BoxIdAllocator, BoxReport, BoxStatus, IoSpec, IsolateBox, Limits, MountProfile,
    SandboxConfig, SandboxError, SandboxOutcome,
};
use crate::toolchain::Toolchain;

/// Production executor wrapping the isolate sandbox
pub struct IsolateExecutor {
    toolchain: Toolchain,
    config: SandboxConfig,
    boxes: BoxIdAllocator,
    use_cgroups: bool,
}

impl IsolateExecutor {
    pub fn new(toolchain: Toolchain, config: SandboxConfig, use_cgroups: bool) -> Self {
        let boxes = BoxIdAllocator::new(config.worker_id);
        Self {
            toolchain,
            config,
            boxes,
            use_cgroups,
        }
    }

    async fn compile_in_box(&self, source: &str) -> Result<CompiledArtifact, CompileError> {
        let dir = tempfile::tempdir().map_err(SandboxError::from)?;
        let source_path = dir.path().join(&self.toolchain.source_file);
        fs::write(&source_path, source)
            .await
            .map_err(SandboxError::from)?;

        let isolate_box = IsolateBox::new(self.boxes.next_box_id(), self.use_cgroups).await?;
        let artifact = CompiledArtifact::new(dir, &self.toolchain.binary);
        let result = self
            .compile_steps(&isolate_box, &source_path, artifact)
            .await;
        finish(isolate_box, result).await
    }

    async fn compile_steps(
        &self,
        isolate_box: &IsolateBox,
        source_path: &Path,
        artifact: CompiledArtifact,
    ) -> Result<CompiledArtifact, CompileError> {
        isolate_box
            .copy_in(source_path, &self.toolchain.source_file)
            .await?;

        let limits = Limits::compile(
            self.config.compile_time_limit_ms,
            self.config.compile_memory_limit_mb,
        );
        debug!(
            "Compiling with {:?} in box {}",
            self.toolchain.compile_command,
            isolate_box.box_id()
        );
        let outcome = isolate_box
            .run(
                &self.toolchain.compile_command,
                &limits,
                &IoSpec::new(),
                MountProfile::Compile,
            )
            .await?;

        if let BoxStatus::Internal(message) = &outcome.report.status {
            return Err(SandboxError::Internal(message.clone()).into());
        }
        if !outcome.report.succeeded() {
            return Err(CompileError::Diagnostics(compile_diagnostics(&outcome)));
        }
        isolate_box
            .copy_out(&self.toolchain.binary, artifact.binary())
            .await?;
        Ok(artifact)
    }

    async fn execute_in_box(
        &self,
        artifact: &CompiledArtifact,
        stdin: &str,
        time_limit_ms: u32,
    ) -> Result<Execution, SandboxError> {
        let stdin_file = tempfile::NamedTempFile::new()?;
        fs::write(stdin_file.path(), stdin).await?;

        let isolate_box = IsolateBox::new(self.boxes.next_box_id(), self.use_cgroups).await?;
        let result = self
            .execute_steps(&isolate_box, artifact, stdin_file.path(), time_limit_ms)
            .await;
        finish(isolate_box, result).await
    }

    async fn execute_steps(
        &self,
        isolate_box: &IsolateBox,
        artifact: &CompiledArtifact,
        stdin_path: &Path,
        time_limit_ms: u32,
    ) -> Result<Execution, SandboxError> {
        isolate_box
            .copy_in(artifact.binary(), &self.toolchain.binary)
            .await?;

        let limits = Limits::run(time_limit_ms, self.config.run_memory_limit_mb);
        let io = IoSpec::new().with_stdin(stdin_path);
        let outcome = isolate_box
            .run(&self.toolchain.run_command, &limits, &io, MountProfile::Run)
            .await?;

        Ok(Execution {
            outcome: classify(&outcome.report)?,
            exit_code: outcome.report.exit_code(),
            stdout: outcome.stdout,
            stderr: outcome.stderr,
        })
    }
}

#[async_trait]
impl Executor for IsolateExecutor {
    async fn compile(&self, source: &str) -> Result<CompiledArtifact, CompileError> {
        let result = self.compile_in_box(source).await;
        if let Err(CompileError::System(e)) = &result {
            error!("Sandbox failure during compilation: {}", e);
        }
        result
    }

    async fn execute(
        &self,
        artifact: &CompiledArtifact,
        stdin: &str,
        time_limit_ms: u32,
    ) -> Execution {
        match self.execute_in_box(artifact, stdin, time_limit_ms).await {
            Ok(execution) => execution,
            Err(e) => {
                warn!("Sandbox failure during execution: {}", e);
                Execution::system_error(e.to_string())
            }
        }
    }
}

/// Tear the box down on every path. The step's own error wins over a
/// cleanup error, which is only logged then.
async fn finish<T, E>(isolate_box: IsolateBox, result: Result<T, E>) -> Result<T, E>
where
    E: From<SandboxError>,
{
    let box_id = isolate_box.box_id();
    match (result, isolate_box.cleanup().await) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e.into()),
        (Err(e), cleaned) => {
            if let Err(cleanup_err) = cleaned {
                warn!("Failed to clean up isolate box {}: {}", box_id, cleanup_err);
            }
            Err(e)
        }
    }
}

/// Map a finished run onto what the student's program did.
fn classify(report: &BoxReport) -> Result<ExecutionOutcome, SandboxError> {
    Ok(match &report.status {
        BoxStatus::Exited(0) => ExecutionOutcome::Success,
        BoxStatus::Exited(_) | BoxStatus::Killed(_) => ExecutionOutcome::RuntimeError,
        BoxStatus::TimedOut => ExecutionOutcome::Timeout,
        BoxStatus::Internal(message) => return Err(SandboxError::Internal(message.clone())),
    })
}

fn compile_diagnostics(outcome: &SandboxOutcome) -> String {
    if !outcome.stderr.trim().is_empty() {
        return outcome.stderr.clone();
    }
    if !outcome.stdout.trim().is_empty() {
        return outcome.stdout.clone();
    }
    match outcome.report.status {
        BoxStatus::TimedOut => "Compilation timed out".to_string(),
        BoxStatus::Killed(_) => "Compiler crashed".to_string(),
        _ => format!(
            "Compilation failed with exit code {}",
            outcome.report.exit_code()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(status: BoxStatus, stdout: &str, stderr: &str) -> SandboxOutcome {
        SandboxOutcome {
            report: BoxReport {
                status,
                cpu_ms: 0,
                wall_ms: 0,
            },
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_diagnostics_prefer_stderr() {
        let o = outcome(
            BoxStatus::Exited(1),
            "noise",
            "main.cpp:3:1: error: expected ';'",
        );
        assert_eq!(compile_diagnostics(&o), "main.cpp:3:1: error: expected ';'");
    }

    #[test]
    fn test_diagnostics_fallbacks() {
        let o = outcome(BoxStatus::TimedOut, "", "  ");
        assert_eq!(compile_diagnostics(&o), "Compilation timed out");

        let o = outcome(BoxStatus::Killed(9), "", "");
        assert_eq!(compile_diagnostics(&o), "Compiler crashed");

        let o = outcome(BoxStatus::Exited(4), "", "");
        assert_eq!(compile_diagnostics(&o), "Compilation failed with exit code 4");
    }

    #[test]
    fn test_classify_student_outcomes() {
        let report = |status| BoxReport {
            status,
            cpu_ms: 0,
            wall_ms: 0,
        };
        assert_eq!(classify(&report(BoxStatus::Exited(0))).unwrap(), ExecutionOutcome::Success);
        assert_eq!(classify(&report(BoxStatus::Exited(2))).unwrap(), ExecutionOutcome::RuntimeError);
        assert_eq!(classify(&report(BoxStatus::Killed(11))).unwrap(), ExecutionOutcome::RuntimeError);
        assert_eq!(classify(&BoxReport::guard_expired(9000)).unwrap(), ExecutionOutcome::Timeout);
        assert!(matches!(
            classify(&report(BoxStatus::Internal("Cannot run proxy".into()))),
            Err(SandboxError::Internal(m)) if m == "Cannot run proxy"
        ));
    }

    #[tokio::test]
    async fn test_finish_tears_down_on_failed_steps() {
        // Only meaningful on hosts without isolate installed: teardown then
        // fails in a way we can observe.
        if which_isolate() {
            return;
        }
        let failed: Result<(), CompileError> = Err(CompileError::Diagnostics("bad".into()));
        match finish(IsolateBox::detached(7), failed).await {
            Err(CompileError::Diagnostics(text)) => assert_eq!(text, "bad"),
            other => panic!("step error must win, got {:?}", other),
        }

        let ok: Result<u32, SandboxError> = Ok(1);
        assert!(matches!(
            finish(IsolateBox::detached(8), ok).await,
            Err(SandboxError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_isolate_is_system_error() {
        if which_isolate() {
            return;
        }
        let executor = IsolateExecutor::new(
            Toolchain::load(None).unwrap(),
            SandboxConfig::default(),
            false,
        );
        match executor.compile("int main() {}").await {
            Err(CompileError::System(SandboxError::Unavailable(msg))) => {
                assert!(msg.contains("isolate"));
            }
            other => panic!("expected unavailable sandbox, got {:?}", other),
        }
    }

    fn which_isolate() -> bool {
        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|p| p.join("isolate").exists()))
            .unwrap_or(false)
    }
}

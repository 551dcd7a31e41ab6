//! Isolate box management
//!
//! Low-level wrapper around the isolate sandbox for secure code execution.
//! Manages box initialization, cleanup, and command execution. A box is an
//! RAII guard: if it is dropped without `cleanup()` (early return, timeout,
//! panic) the drop handler still tears it down.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::error::SandboxError;
use super::report::BoxReport;

const ISOLATE: &str = "isolate";

/// Extra wall-clock slack given to the isolate process itself before the
/// outer guard kills it.
const OUTER_GUARD_GRACE: Duration = Duration::from_secs(3);

/// Maximum bytes kept from stdout / stderr.
pub const MAX_CAPTURE_BYTES: usize = 64 * 1024;

/// Check whether isolate can create cgroup-backed boxes.
///
/// Returns an error only when isolate itself cannot be spawned.
pub async fn probe_cgroups(box_id: u32) -> Result<bool, SandboxError> {
    let box_id_str = box_id.to_string();
    let result = Command::new(ISOLATE)
        .args(["--box-id", &box_id_str, "--cg", "--init"])
        .output()
        .await
        .map_err(|e| SandboxError::from_spawn(ISOLATE, e))?;

    let _ = Command::new(ISOLATE)
        .args(["--box-id", &box_id_str, "--cg", "--cleanup"])
        .output()
        .await;

    Ok(result.status.success())
}

/// Which host directories are visible inside the box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MountProfile {
    /// Toolchain needs headers, compiler binaries and config.
    Compile,
    /// Compiled program only needs its own box, the dynamic loader and
    /// shared libs. isolate's default rules (/bin, /usr, /dev, /proc, a
    /// writable /tmp) are switched off.
    Run,
}

impl MountProfile {
    fn dir_args(self) -> Vec<String> {
        match self {
            MountProfile::Compile => vec![
                "--dir=/usr".to_string(),
                "--dir=/lib".to_string(),
                "--dir=/lib64:maybe".to_string(),
                "--dir=/etc:noexec".to_string(),
                "--env=PATH=/usr/local/bin:/usr/bin:/bin".to_string(),
            ],
            MountProfile::Run => vec![
                "--no-default-dirs".to_string(),
                "--dir=box=./box:rw".to_string(),
                "--dir=/lib".to_string(),
                "--dir=/lib64:maybe".to_string(),
                "--dir=/usr/lib".to_string(),
            ],
        }
    }
}

/// I/O specification for sandbox execution
#[derive(Debug, Clone)]
pub struct IoSpec {
    /// Path to stdin file (will be copied into box)
    pub stdin_path: Option<PathBuf>,
    /// File name for stdout inside the box
    pub stdout_file: String,
    /// File name for stderr inside the box
    pub stderr_file: String,
}

impl Default for IoSpec {
    fn default() -> Self {
        Self {
            stdin_path: None,
            stdout_file: "stdout.txt".to_string(),
            stderr_file: "stderr.txt".to_string(),
        }
    }
}

impl IoSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stdin(mut self, path: impl AsRef<Path>) -> Self {
        self.stdin_path = Some(path.as_ref().to_path_buf());
        self
    }
}

/// Resource limits for sandbox execution
#[derive(Debug, Clone)]
pub struct Limits {
    /// CPU time limit in milliseconds
    pub time_ms: u32,
    /// Memory limit in MB
    pub memory_mb: u32,
    /// Maximum number of processes
    pub processes: u32,
    /// Maximum open files
    pub open_files: u32,
    /// Maximum file size in KB
    pub fsize_kb: u32,
}

impl Limits {
    /// Limits for running a compiled submission.
    pub fn run(time_ms: u32, memory_mb: u32) -> Self {
        Self {
            time_ms,
            memory_mb,
            processes: 8,
            open_files: 64,
            fsize_kb: 65536,
        }
    }

    /// Limits for the compiler (it forks cc1plus, as, ld).
    pub fn compile(time_ms: u32, memory_mb: u32) -> Self {
        Self {
            time_ms,
            memory_mb,
            processes: 64,
            open_files: 256,
            fsize_kb: 262144,
        }
    }

    /// Wall clock bound handed to isolate.
    pub fn wall_time_secs(&self) -> f64 {
        (self.time_ms as f64) / 1000.0 + 1.0
    }
}

/// Raw outcome from sandbox execution (no verdict interpretation)
#[derive(Debug)]
pub struct SandboxOutcome {
    pub report: BoxReport,
    /// Stdout content (truncated to `MAX_CAPTURE_BYTES`)
    pub stdout: String,
    /// Stderr content (truncated to `MAX_CAPTURE_BYTES`)
    pub stderr: String,
}

/// Isolate box manager
pub struct IsolateBox {
    box_id: u32,
    box_path: PathBuf,
    use_cgroups: bool,
    cleaned: bool,
}

impl IsolateBox {
    /// Create and initialize a new isolate box
    pub async fn new(box_id: u32, use_cgroups: bool) -> Result<Self, SandboxError> {
        let box_id_str = box_id.to_string();

        // Clean up any leftover box with the same id
        let _ = Command::new(ISOLATE)
            .args(cg_args(&box_id_str, use_cgroups, "--cleanup"))
            .output()
            .await;

        let output = Command::new(ISOLATE)
            .args(cg_args(&box_id_str, use_cgroups, "--init"))
            .output()
            .await
            .map_err(|e| SandboxError::from_spawn(ISOLATE, e))?;

        if !output.status.success() {
            return Err(SandboxError::BoxInit {
                box_id,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let box_path = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
        debug!(
            "Initialized isolate box {} at {:?} (cgroups: {})",
            box_id, box_path, use_cgroups
        );

        Ok(Self {
            box_id,
            box_path,
            use_cgroups,
            cleaned: false,
        })
    }

    /// Get the box ID
    pub fn box_id(&self) -> u32 {
        self.box_id
    }

    /// Get the path to the box/box subdirectory (working directory for programs)
    pub fn work_dir(&self) -> PathBuf {
        self.box_path.join("box")
    }

    /// Copy a file into the box's working directory
    pub async fn copy_in(&self, source: &Path, dest_name: &str) -> Result<(), SandboxError> {
        let dest = self.work_dir().join(dest_name);
        fs::copy(source, &dest).await?;
        Ok(())
    }

    /// Copy a file out of the box's working directory
    pub async fn copy_out(&self, source_name: &str, dest: &Path) -> Result<(), SandboxError> {
        let source = self.work_dir().join(source_name);
        fs::copy(&source, dest).await?;
        Ok(())
    }

    /// Run a command in the isolate box
    pub async fn run(
        &self,
        command: &[String],
        limits: &Limits,
        io: &IoSpec,
        mounts: MountProfile,
    ) -> Result<SandboxOutcome, SandboxError> {
        let meta_file = tempfile::Builder::new()
            .prefix(&format!("isolate_meta_{}_", self.box_id))
            .suffix(".txt")
            .tempfile()?;

        if let Some(stdin_path) = &io.stdin_path {
            self.copy_in(stdin_path, STDIN_FILE).await?;
        }
        let args = run_args(
            self.box_id,
            self.use_cgroups,
            command,
            limits,
            io,
            mounts,
            meta_file.path(),
        );

        debug!("Running isolate with args: {:?}", args);

        let child = Command::new(ISOLATE)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::from_spawn(ISOLATE, e))?;

        let guard = Duration::from_secs_f64(limits.wall_time_secs()) + OUTER_GUARD_GRACE;
        let report = match tokio::time::timeout(guard, child.wait_with_output()).await {
            Ok(output) => {
                let output = output?;
                let meta_content = fs::read_to_string(meta_file.path())
                    .await
                    .unwrap_or_default();
                // nothing in the meta file: isolate refused to run at all
                BoxReport::parse(&meta_content).ok_or_else(|| {
                    SandboxError::Internal(String::from_utf8_lossy(&output.stderr).trim().to_string())
                })?
            }
            Err(_) => {
                // child was dropped above, kill_on_drop took the isolate process down
                warn!(
                    "isolate box {} exceeded outer wall clock guard of {:?}",
                    self.box_id, guard
                );
                BoxReport::guard_expired(guard.as_millis() as u32)
            }
        };

        let stdout = read_capped(&self.work_dir().join(&io.stdout_file)).await;
        let stderr = read_capped(&self.work_dir().join(&io.stderr_file)).await;

        Ok(SandboxOutcome {
            report,
            stdout,
            stderr,
        })
    }

    /// Cleanup the isolate box. One attempt only: a failure here is not
    /// retried from `Drop`.
    pub async fn cleanup(mut self) -> Result<(), SandboxError> {
        self.cleaned = true;
        let box_id_str = self.box_id.to_string();
        Command::new(ISOLATE)
            .args(cg_args(&box_id_str, self.use_cgroups, "--cleanup"))
            .output()
            .await
            .map_err(|e| SandboxError::from_spawn(ISOLATE, e))?;
        debug!("Cleaned up isolate box {}", self.box_id);
        Ok(())
    }

    /// A box handle that was never initialized, for exercising teardown.
    #[cfg(test)]
    pub(crate) fn detached(box_id: u32) -> Self {
        Self {
            box_id,
            box_path: std::env::temp_dir().join(format!("arena-box-{}", box_id)),
            use_cgroups: false,
            cleaned: false,
        }
    }
}

/// Blocking last resort for boxes abandoned by a panic or a cancelled
/// future. Every normal path goes through `cleanup().await`.
impl Drop for IsolateBox {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        let box_id_str = self.box_id.to_string();
        match std::process::Command::new(ISOLATE)
            .args(cg_args(&box_id_str, self.use_cgroups, "--cleanup"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(_) => info!("Cleaned up abandoned isolate box {}", self.box_id),
            Err(e) => warn!("Failed to clean up isolate box {}: {}", self.box_id, e),
        }
    }
}

const STDIN_FILE: &str = "stdin.txt";

/// Full isolate argument vector for one `--run`.
fn run_args(
    box_id: u32,
    use_cgroups: bool,
    command: &[String],
    limits: &Limits,
    io: &IoSpec,
    mounts: MountProfile,
    meta_path: &Path,
) -> Vec<String> {
    let memory_limit_kb = limits.memory_mb * 1024;
    let mut args = vec!["--box-id".to_string(), box_id.to_string()];

    if use_cgroups {
        args.push("--cg".to_string());
        args.push(format!("--cg-mem={}", memory_limit_kb));
    } else {
        args.push(format!("--mem={}", memory_limit_kb));
    }

    args.extend([
        format!("--time={}", limits.time_ms as f64 / 1000.0),
        format!("--wall-time={}", limits.wall_time_secs()),
        format!("--meta={}", meta_path.display()),
        format!("--stdout={}", io.stdout_file),
        format!("--stderr={}", io.stderr_file),
        format!("--processes={}", limits.processes),
        format!("--open-files={}", limits.open_files),
        format!("--fsize={}", limits.fsize_kb),
    ]);
    args.extend(mounts.dir_args());

    if io.stdin_path.is_some() {
        args.push(format!("--stdin={}", STDIN_FILE));
    }

    args.push("--run".to_string());
    args.push("--".to_string());
    args.extend(command.iter().cloned());
    args
}

fn cg_args<'a>(box_id: &'a str, use_cgroups: bool, action: &'a str) -> Vec<&'a str> {
    let mut args = vec!["--box-id", box_id];
    if use_cgroups {
        args.push("--cg");
    }
    args.push(action);
    args
}

async fn read_capped(path: &Path) -> String {
    let bytes = fs::read(path).await.unwrap_or_default();
    truncate_capture(&bytes)
}

/// Lossy UTF-8 decode of at most `MAX_CAPTURE_BYTES`.
pub fn truncate_capture(bytes: &[u8]) -> String {
    let end = bytes.len().min(MAX_CAPTURE_BYTES);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

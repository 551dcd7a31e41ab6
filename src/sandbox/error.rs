use thiserror::Error;

/// Failures of the isolation environment itself.
///
/// Anything a student's program does (crash, timeout, garbage output) is
/// an execution outcome, not one of these. A `SandboxError` always means
/// the machinery is broken and the attempt must not be scored.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox component not available: {0}")]
    Unavailable(String),

    #[error("failed to initialize sandbox box {box_id}: {message}")]
    BoxInit { box_id: u32, message: String },

    #[error("sandbox internal error: {0}")]
    Internal(String),

    #[error("sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Map a process spawn failure, keeping "binary missing" distinct.
    pub fn from_spawn(program: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            SandboxError::Unavailable(format!("{} executable not found", program))
        } else {
            SandboxError::Io(err)
        }
    }
}

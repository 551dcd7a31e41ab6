use sea_orm::DbErr;
use thiserror::Error;

use crate::sandbox::SandboxError;

pub type ArenaResult<T> = Result<T, ArenaError>;

/// Errors crossing the library boundary.
///
/// Student-caused failures (compile errors, wrong output, rejected
/// retention) are never errors; they travel inside outcome structs.
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ArenaError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        ArenaError::NotFound { entity, id }
    }

    /// Short machine-readable tag used in job results.
    pub fn status(&self) -> &'static str {
        match self {
            ArenaError::NotFound { .. } => "not_found",
            ArenaError::InvalidRequest(_) => "invalid_request",
            ArenaError::Database(_) | ArenaError::Sandbox(_) | ArenaError::Config(_) => {
                "system_error"
            }
        }
    }
}

//! Worker configuration loaded from the environment

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ArenaError, ArenaResult};
use crate::sandbox::SandboxConfig;

const DEFAULT_DATABASE_URL: &str = "sqlite://arena.db?mode=rwc";
const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
const DEFAULT_REFERENCE_CACHE_TTL_SECS: u64 = 600;

/// Everything the worker needs to start, read once and passed down.
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    pub database_url: String,
    pub redis_url: String,
    /// Optional toolchain TOML; the embedded default is used when unset
    pub toolchain_path: Option<PathBuf>,
    pub sandbox: SandboxConfig,
    pub reference_cache_ttl: Duration,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            toolchain_path: None,
            sandbox: SandboxConfig::default(),
            reference_cache_ttl: Duration::from_secs(DEFAULT_REFERENCE_CACHE_TTL_SECS),
        }
    }
}

impl ArenaConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> ArenaResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup (the environment in production).
    pub fn from_lookup<F>(lookup: F) -> ArenaResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let sandbox = SandboxConfig {
            compile_time_limit_ms: parse_or(
                &lookup,
                "COMPILE_TIME_LIMIT_MS",
                defaults.sandbox.compile_time_limit_ms,
            )?,
            compile_memory_limit_mb: parse_or(
                &lookup,
                "COMPILE_MEMORY_LIMIT_MB",
                defaults.sandbox.compile_memory_limit_mb,
            )?,
            run_time_limit_ms: parse_or(
                &lookup,
                "RUN_TIME_LIMIT_MS",
                defaults.sandbox.run_time_limit_ms,
            )?,
            run_memory_limit_mb: parse_or(
                &lookup,
                "RUN_MEMORY_LIMIT_MB",
                defaults.sandbox.run_memory_limit_mb,
            )?,
            worker_id: 0,
        };

        let ttl_secs = parse_or(
            &lookup,
            "REFERENCE_CACHE_TTL_SECS",
            DEFAULT_REFERENCE_CACHE_TTL_SECS,
        )?;

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            toolchain_path: lookup("TOOLCHAIN_CONFIG").map(PathBuf::from),
            sandbox,
            reference_cache_ttl: Duration::from_secs(ttl_secs),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> ArenaResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ArenaError::Config(format!("{} must be a number, got {:?}", key, raw))),
        None => Ok(default),
    }
}

//! Sandbox configuration
//!
//! Resource bounds for compiling and running untrusted code, plus the
//! worker id used to partition isolate box ids between workers.

use std::sync::atomic::{AtomicU32, Ordering};

/// Sandbox configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Compile time limit in milliseconds (default: 10000ms = 10s)
    pub compile_time_limit_ms: u32,
    /// Compile memory limit in MB (default: 1024MB)
    pub compile_memory_limit_mb: u32,
    /// Run time limit in milliseconds (default: 5000ms = 5s)
    pub run_time_limit_ms: u32,
    /// Run memory limit in MB (default: 256MB)
    pub run_memory_limit_mb: u32,
    /// Worker ID for box ID allocation (0-9)
    pub worker_id: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            compile_time_limit_ms: 10_000,
            compile_memory_limit_mb: 1024,
            run_time_limit_ms: 5_000,
            run_memory_limit_mb: 256,
            worker_id: 0,
        }
    }
}

impl SandboxConfig {
    /// Create config with a specific worker_id
    pub fn with_worker_id(mut self, worker_id: u32) -> Self {
        self.worker_id = worker_id;
        self
    }
}

/// Hands out isolate box ids inside the range owned by one worker.
///
/// Isolate only supports box IDs 0-9999, so each worker (0-9) gets a
/// dedicated range of 1000 ids and cycles within it.
#[derive(Debug)]
pub struct BoxIdAllocator {
    worker_id: u32,
    counter: AtomicU32,
}

impl BoxIdAllocator {
    pub fn new(worker_id: u32) -> Self {
        Self {
            worker_id: worker_id % 10,
            counter: AtomicU32::new(0),
        }
    }

    pub fn next_box_id(&self) -> u32 {
        let counter = self.counter.fetch_add(1, Ordering::Relaxed);
        self.worker_id * 1000 + (counter % 1000)
    }
}

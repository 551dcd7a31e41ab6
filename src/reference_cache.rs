//! Compiled reference solutions, keyed by source hash
//!
//! Adjudicating a bug claim needs the problem's reference binary. Compiling
//! it for every vote is wasteful, so the worker owns one `ReferenceCache`
//! and hands it to the adjudicator. Entries expire after `ttl`; a source
//! that does not compile is remembered as broken for the same period.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::executor::{CompileError, CompiledArtifact, Executor};
use crate::sandbox::SandboxError;

/// Why no reference binary is available
#[derive(Debug)]
pub enum ReferenceError {
    /// The reference itself does not compile (content problem)
    CompileFailed(Arc<str>),
    /// The sandbox is broken; nothing is cached
    System(SandboxError),
}

#[derive(Clone)]
enum Cached {
    Ready(Arc<CompiledArtifact>),
    Broken(Arc<str>),
}

struct Entry {
    value: Cached,
    inserted_at: Instant,
}

pub struct ReferenceCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl ReferenceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the compiled reference, compiling on miss or expiry.
    pub async fn get_or_compile(
        &self,
        executor: &dyn Executor,
        source: &str,
    ) -> Result<Arc<CompiledArtifact>, ReferenceError> {
        let key = source_key(source);
        // held across the compile so concurrent claims on one problem compile once
        let mut entries = self.entries.lock().await;

        if let Some(entry) = entries.get(&key) {
            if entry.inserted_at.elapsed() < self.ttl {
                debug!("Reference cache hit for {}", &key[..12]);
                return match &entry.value {
                    Cached::Ready(artifact) => Ok(Arc::clone(artifact)),
                    Cached::Broken(message) => Err(ReferenceError::CompileFailed(Arc::clone(message))),
                };
            }
        }

        let value = match executor.compile(source).await {
            Ok(artifact) => Cached::Ready(Arc::new(artifact)),
            Err(CompileError::Diagnostics(message)) => Cached::Broken(Arc::from(message)),
            Err(CompileError::System(e)) => return Err(ReferenceError::System(e)),
        };
        entries.insert(
            key,
            Entry {
                value: value.clone(),
                inserted_at: Instant::now(),
            },
        );

        match value {
            Cached::Ready(artifact) => Ok(artifact),
            Cached::Broken(message) => Err(ReferenceError::CompileFailed(message)),
        }
    }

    /// Evict expired entries. Returns how many were dropped.
    pub async fn refresh(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            info!("Evicted {} expired reference binaries", evicted);
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

fn source_key(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

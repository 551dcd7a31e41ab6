use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::executor::Executor;
use crate::reference_cache::ReferenceCache;

/// Shared handles every operation needs. Built once by the worker.
pub struct ArenaContext {
    pub db: DatabaseConnection,
    pub executor: Arc<dyn Executor>,
    pub references: ReferenceCache,
    /// Per-test run bound handed to `Executor::execute`
    pub run_time_limit_ms: u32,
}

impl ArenaContext {
    pub fn new(
        db: DatabaseConnection,
        executor: Arc<dyn Executor>,
        references: ReferenceCache,
        run_time_limit_ms: u32,
    ) -> Self {
        Self {
            db,
            executor,
            references,
            run_time_limit_ms,
        }
    }
}

#[cfg(test)]
impl ArenaContext {
    /// In-memory database and the scripted executor.
    pub async fn for_tests() -> Self {
        Self::with_executor(crate::testing::ScriptedExecutor::new()).await
    }

    pub async fn with_executor(executor: crate::testing::ScriptedExecutor) -> Self {
        Self::new(
            crate::db::setup_test_db().await,
            Arc::new(executor),
            ReferenceCache::new(std::time::Duration::from_secs(600)),
            5_000,
        )
    }
}

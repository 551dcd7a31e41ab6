use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};

use arena::config::ArenaConfig;
use arena::context::ArenaContext;
use arena::db;
use arena::executor::isolate::IsolateExecutor;
use arena::jobs::dispatch;
use arena::redis_manager::RedisManager;
use arena::reference_cache::ReferenceCache;
use arena::sandbox::probe_cgroups;
use arena::toolchain::Toolchain;

/// How often expired reference binaries are evicted
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("arena=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let mut config = ArenaConfig::from_env().context("Invalid worker configuration")?;

    let toolchain = Toolchain::load(config.toolchain_path.as_deref())
        .context("Failed to load toolchain configuration")?;
    match &config.toolchain_path {
        Some(path) => info!("Loaded toolchain from {}", path.display()),
        None => info!("Loaded embedded toolchain"),
    }

    info!("Starting Arena Worker...");

    let mut redis = RedisManager::with_url(&config.redis_url).await?;
    let worker_id = redis.worker_id();
    config.sandbox = config.sandbox.with_worker_id(worker_id);
    info!("Sandbox config: worker_id={}", config.sandbox.worker_id);

    // last id of this worker's range, never handed out for real work
    let probe_box = worker_id * 1000 + 999;
    let use_cgroups = probe_cgroups(probe_box)
        .await
        .context("isolate is not available")?;
    if use_cgroups {
        info!("Confirmed isolate cgroup support is available");
    } else {
        warn!("isolate cgroups unavailable, falling back to address-space memory limits");
    }

    let db = db::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;

    let run_time_limit_ms = config.sandbox.run_time_limit_ms;
    let executor = IsolateExecutor::new(toolchain, config.sandbox.clone(), use_cgroups);
    let references = ReferenceCache::new(config.reference_cache_ttl);
    info!("Reference binaries are cached for {:?}", references.ttl());
    let ctx = ArenaContext::new(
        db,
        Arc::new(executor),
        references,
        run_time_limit_ms,
    );

    info!("Waiting for jobs...");

    let mut last_sweep = Instant::now();
    loop {
        let job = redis.pop_job().await?;
        let result = dispatch(&ctx, &job).await;
        if let Err(e) = redis.store_result(&result).await {
            error!("Failed to store result for {}: {:#}", result.request_id, e);
        }

        if last_sweep.elapsed() >= CACHE_SWEEP_INTERVAL {
            let evicted = ctx.references.refresh().await;
            if evicted > 0 {
                info!("Evicted {} expired reference binaries", evicted);
            }
            last_sweep = Instant::now();
        }
    }
}

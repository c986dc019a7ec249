use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod models;
mod services;

use config::{AppConfig, Backend};
use services::{
    local_storage::LocalStorage,
    report::RunReport,
    s3_storage::S3Storage,
    scheduler::Scheduler,
    storage_client::ObjectStorage,
    transcoder::WebpTranscoder,
};

// Conversions are interleaved on a single thread; the concurrency limit bounds
// in-flight I/O, not CPU parallelism.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;
    tracing::debug!("Effective config: {:?}", cfg);

    // --- Initialize storage client ---
    let storage: Arc<dyn ObjectStorage> = match cfg.backend {
        Backend::S3 => Arc::new(
            S3Storage::connect(&cfg.s3, cfg.bucket.clone(), cfg.run.page_size).await,
        ),
        Backend::Local => Arc::new(LocalStorage::new(
            &cfg.storage_dir,
            cfg.bucket.clone(),
            cfg.run.page_size,
        )),
    };

    let scheduler = Scheduler::new(cfg.run.clone(), storage, Arc::new(WebpTranscoder));
    log_banner(&cfg, &scheduler);

    // --- Run ---
    let mut report = RunReport::new();
    let outcome = scheduler.run(&mut report).await;
    report.log_summary();

    // --- Persist failures, even after a fatal listing error ---
    let summary = report.finalize();
    match summary.persist(&cfg.failed_keys_file).await {
        Ok(Some(path)) => tracing::warn!(
            "{} files failed. Saved to {}",
            summary.failed_keys.len(),
            path.display()
        ),
        Ok(None) => {}
        Err(err) => tracing::error!(
            "Could not write {} failed keys to {}: {}",
            summary.failed_keys.len(),
            cfg.failed_keys_file.display(),
            err
        ),
    }

    if let Err(err) = outcome {
        tracing::error!("Fatal error: {}", err);
        return Err(err).context("batch run aborted while listing the bucket");
    }

    tracing::info!("Done");
    Ok(())
}

fn log_banner(cfg: &AppConfig, scheduler: &Scheduler) {
    let run = scheduler.config();
    tracing::info!("Starting batch job on bucket {} ({:?})", cfg.bucket, cfg.backend);
    if cfg.backend == Backend::S3 {
        if let Some(endpoint) = &cfg.s3.endpoint_url {
            tracing::info!("   Endpoint: {}", endpoint);
        }
    }
    tracing::info!("   Concurrency: {}", run.concurrency);
    tracing::info!(
        "   Include: {}",
        run.include_prefix.as_deref().unwrap_or("(all)")
    );
    let exclude = if run.exclude_prefixes.is_empty() {
        "(none)".to_string()
    } else {
        run.exclude_prefixes.join(", ")
    };
    tracing::info!("   Exclude: {}", exclude);
    if run.dry_run {
        tracing::info!("   Mode: DRY RUN (no changes will be made)");
    }
}

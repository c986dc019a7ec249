//! Per-key conversion: probe, fetch, transcode, store.
//!
//! Every error is folded into [`TaskOutcome::Failed`]; nothing here can abort
//! the run.

use crate::{
    config::RunConfig,
    errors::TaskError,
    models::{
        object::{PutObject, Visibility},
        task::{SkipReason, TaskOutcome},
    },
    services::{
        filter::{TARGET_CONTENT_TYPE, derive_target_key},
        storage_client::ObjectStorage,
        timeout_guard::run_with_timeout,
        transcoder::Transcoder,
    },
};
use bytes::Bytes;
use tracing::{error, info};

/// Visibility applied to every converted object.
pub const TARGET_VISIBILITY: Visibility = Visibility::PublicRead;

/// Convert a single object and report how it went.
///
/// The target key is probed first. If it exists the key is skipped without
/// further I/O. A probe failure other than "not found" is a failure, never an
/// implicit "absent". In dry-run mode nothing past the probe is performed.
/// The target is only written after a successful transcode.
pub async fn convert(
    key: &str,
    config: &RunConfig,
    storage: &dyn ObjectStorage,
    transcoder: &dyn Transcoder,
) -> TaskOutcome {
    let target = derive_target_key(key);

    match run_with_timeout(
        storage.head_object(&target),
        config.timeouts.head,
        format!("head {}", target),
    )
    .await
    {
        Ok(_) => {
            info!("Skipping (already exists): {}", target);
            return TaskOutcome::Skipped(SkipReason::AlreadyExists);
        }
        Err(err) => {
            let err = TaskError::from(err);
            if !matches!(&err, TaskError::Storage(inner) if inner.is_not_found()) {
                error!("Error checking {}: {}", target, err);
                return TaskOutcome::Failed {
                    key: key.to_string(),
                    cause: err,
                };
            }
        }
    }

    if config.dry_run {
        info!("[DRY RUN] Would convert: {} -> {}", key, target);
        return TaskOutcome::DryRunPlanned;
    }

    match fetch_transcode_store(key, &target, config, storage, transcoder).await {
        Ok((original_size, converted_size)) => {
            info!(
                "Converted: {} | {:.1} KB -> {:.1} KB",
                target,
                original_size as f64 / 1024.0,
                converted_size as f64 / 1024.0
            );
            TaskOutcome::Converted {
                original_size,
                converted_size,
            }
        }
        Err(err) => {
            error!("Error processing {}: {}", key, err);
            TaskOutcome::Failed {
                key: key.to_string(),
                cause: err,
            }
        }
    }
}

async fn fetch_transcode_store(
    key: &str,
    target: &str,
    config: &RunConfig,
    storage: &dyn ObjectStorage,
    transcoder: &dyn Transcoder,
) -> Result<(usize, usize), TaskError> {
    let body = run_with_timeout(
        storage.get_object(key),
        config.timeouts.get,
        format!("get {}", key),
    )
    .await?;

    let converted = transcoder.convert(&body, &config.encode)?;
    let (original_size, converted_size) = (body.len(), converted.len());

    run_with_timeout(
        storage.put_object(PutObject {
            key: target.to_string(),
            body: Bytes::from(converted),
            content_type: TARGET_CONTENT_TYPE.to_string(),
            visibility: TARGET_VISIBILITY,
        }),
        config.timeouts.put,
        format!("put {}", target),
    )
    .await?;

    Ok((original_size, converted_size))
}

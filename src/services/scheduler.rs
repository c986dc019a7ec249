//! Bounded-concurrency batch driver.
//!
//! Pages are pulled lazily from the [`Enumerator`]. Every selected key of a
//! page is submitted at once, but a key only starts converting after taking a
//! permit from a limiter shared by the whole run, so at most `concurrency`
//! conversions are in flight across page boundaries. The next page is listed
//! only after the current one has fully drained.
//!
//! All conversions are polled from the caller's task. Completions are handled
//! one at a time in `drain_page`, which is the only place the [`RunReport`] is
//! mutated.

use crate::{
    config::RunConfig,
    errors::BatchError,
    models::task::TaskOutcome,
    services::{
        conversion, enumerator::Enumerator, report::RunReport, storage_client::ObjectStorage,
        transcoder::Transcoder,
    },
};
use futures::{StreamExt, stream::FuturesUnordered};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

pub struct Scheduler {
    config: RunConfig,
    storage: Arc<dyn ObjectStorage>,
    transcoder: Arc<dyn Transcoder>,
    limiter: Arc<Semaphore>,
}

impl Scheduler {
    pub fn new(
        config: RunConfig,
        storage: Arc<dyn ObjectStorage>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(config.concurrency.max(1)));
        Self {
            config,
            storage,
            transcoder,
            limiter,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Walk the whole bucket, converting every selected key.
    ///
    /// Per-key failures end up in `report`. A failed listing page stops the
    /// walk and is returned; outcomes recorded before it are kept.
    pub async fn run(&self, report: &mut RunReport) -> Result<(), BatchError> {
        let mut enumerator = Enumerator::new(self.storage.as_ref(), &self.config);
        while let Some(page) = enumerator.next_page().await? {
            debug!("scheduling {} of {} listed keys", page.keys.len(), page.listed);
            report.record_discovered(page.keys.len());
            self.drain_page(page.keys, report).await;
        }
        debug!("listing exhausted after {} pages", enumerator.pages_fetched());
        Ok(())
    }

    async fn drain_page(&self, keys: Vec<String>, report: &mut RunReport) {
        let mut in_flight: FuturesUnordered<_> =
            keys.into_iter().map(|key| self.admit(key)).collect();

        while let Some((key, outcome)) = in_flight.next().await {
            if report.record_outcome(&key, &outcome) {
                report.log_progress();
            }
        }
    }

    /// Wait for a permit, then convert `key` while holding it.
    async fn admit(&self, key: String) -> (String, TaskOutcome) {
        // The limiter is never closed, so acquisition only ever waits.
        let _permit = self.limiter.acquire().await.ok();
        let outcome = conversion::convert(
            &key,
            &self.config,
            self.storage.as_ref(),
            self.transcoder.as_ref(),
        )
        .await;
        (key, outcome)
    }
}

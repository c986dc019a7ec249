//! Lazy, page-at-a-time walk over the bucket listing.

use crate::{
    config::RunConfig,
    errors::{BatchError, TaskError},
    services::{
        filter::should_process, storage_client::ObjectStorage, timeout_guard::run_with_timeout,
    },
};
use tracing::debug;

/// One listing page after filtering.
#[derive(Debug, Default)]
pub struct KeyPage {
    /// Keys returned by the listing before filtering.
    pub listed: usize,
    /// Keys selected for conversion, in listing order.
    pub keys: Vec<String>,
}

/// Walks the listing from the start, one page per [`Enumerator::next_page`].
///
/// Not restartable: a failed page ends the walk since the position cannot be
/// resumed without its token.
pub struct Enumerator<'a> {
    storage: &'a dyn ObjectStorage,
    config: &'a RunConfig,
    next_token: Option<String>,
    pages_fetched: usize,
    exhausted: bool,
}

impl<'a> Enumerator<'a> {
    pub fn new(storage: &'a dyn ObjectStorage, config: &'a RunConfig) -> Self {
        Self {
            storage,
            config,
            next_token: None,
            pages_fetched: 0,
            exhausted: false,
        }
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Fetch and filter the next page, or `None` once the listing stopped
    /// reporting truncation.
    pub async fn next_page(&mut self) -> Result<Option<KeyPage>, BatchError> {
        if self.exhausted {
            return Ok(None);
        }

        let token = self.next_token.take();
        let page_number = self.pages_fetched + 1;
        let page = match run_with_timeout(
            self.storage.list_objects(token.as_deref()),
            self.config.timeouts.list,
            "listObjectsV2",
        )
        .await
        {
            Ok(page) => page,
            Err(err) => {
                self.exhausted = true;
                return Err(BatchError::Enumeration {
                    page: page_number,
                    token,
                    source: TaskError::from(err),
                });
            }
        };

        self.pages_fetched = page_number;
        self.next_token = page.continuation().map(str::to_string);
        self.exhausted = self.next_token.is_none();

        let listed = page.objects.len();
        let listed_bytes: i64 = page.objects.iter().map(|obj| obj.size_bytes).sum();
        let keys: Vec<String> = page
            .objects
            .into_iter()
            .map(|obj| obj.key)
            .filter(|key| should_process(key, self.config))
            .collect();
        debug!(
            "page {} of {}: {} listed ({} bytes), {} selected",
            page_number,
            self.storage.bucket(),
            listed,
            listed_bytes,
            keys.len()
        );

        Ok(Some(KeyPage { listed, keys }))
    }
}

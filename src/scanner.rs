//! Paginated id listing

use crate::api::MailboxApi;
use crate::config::MAX_PAGE_SIZE;
use crate::error::{Error, Result};
use crate::limiter::{RateLimiter, cost};
use crate::mail::MessageId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Walks the listing endpoint page by page under the shared quota.
#[derive(Clone)]
pub struct MailboxScanner {
    api: Arc<dyn MailboxApi>,
    limiter: Arc<RateLimiter>,
    page_size: u32,
    max_attempts: u32,
}

impl MailboxScanner {
    #[must_use]
    pub fn new(
        api: Arc<dyn MailboxApi>,
        limiter: Arc<RateLimiter>,
        page_size: u32,
        max_attempts: u32,
    ) -> Self {
        Self {
            api,
            limiter,
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Collect the ids of every message matching `query`.
    ///
    /// Stops once `total_hint` ids have been gathered, or the remote
    /// reports no further page or returns an empty one. A failed page is
    /// re-requested with the same continuation token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires, or the last page
    /// error once `max_attempts` consecutive requests for one page have
    /// failed.
    pub async fn list_unread_ids(
        &self,
        query: &str,
        total_hint: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<MessageId>> {
        let capacity = usize::try_from(total_hint).unwrap_or(usize::MAX).min(100_000);
        let mut ids = Vec::with_capacity(capacity);
        let mut page_token: Option<String> = None;
        let mut failures = 0;

        while (ids.len() as u64) < total_hint {
            self.limiter.admit(cost::MESSAGES_LIST, cancel).await?;

            let page = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                page = self.api.list_page(query, self.page_size, page_token.as_deref()) => page,
            };

            let page = match page {
                Ok(page) => page,
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    failures += 1;
                    if failures >= self.max_attempts {
                        warn!("Listing page failed {} times, giving up: {}", failures, e);
                        return Err(e);
                    }
                    warn!(
                        "Listing page failed (attempt {}/{}): {}",
                        failures, self.max_attempts, e
                    );
                    continue;
                }
            };
            failures = 0;

            if page.messages.is_empty() {
                break;
            }
            ids.extend(page.ids());
            debug!("Listed {} of ~{} ids", ids.len(), total_hint);

            page_token = page.next_page_token.filter(|t| !t.is_empty());
            if page_token.is_none() {
                break;
            }
        }

        info!("Collected {} message ids for '{}'", ids.len(), query);
        Ok(ids)
    }
}

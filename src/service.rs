//! Unread retrieval and bulk mailbox actions
//!
//! [`RetrievalService`] owns one rate limiter and hands it to both the
//! scanner and the fetcher, so listing, fetching and batch calls all
//! draw from the same per-user quota.

use crate::api::MailboxApi;
use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::fetcher::{MailStream, MessageFetcher};
use crate::label::Label;
use crate::limiter::{RateLimiter, cost};
use crate::mail::{MessageId, RawMail};
use crate::scanner::MailboxScanner;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Largest id list a single batch call accepts.
pub const MAX_BATCH: usize = 1000;

/// Unread mail being retrieved.
#[derive(Debug)]
pub struct UnreadStream {
    /// Unread count reported by the mailbox when the run started.
    pub total: u64,
    /// Ids the scanner found, in listing order.
    pub ids: Vec<MessageId>,
    /// Decoded records, in completion order.
    pub mails: MailStream,
}

/// Entry point for retrieving unread mail.
#[derive(Clone)]
pub struct RetrievalService {
    api: Arc<dyn MailboxApi>,
    limiter: Arc<RateLimiter>,
    config: RetrievalConfig,
}

impl RetrievalService {
    #[must_use]
    pub fn new(api: Arc<dyn MailboxApi>, config: RetrievalConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            config.quota_per_second,
            config.quota_burst,
        ));
        Self::with_limiter(api, config, limiter)
    }

    /// Build a service drawing from an existing limiter, for callers
    /// running several services against one account.
    #[must_use]
    pub const fn with_limiter(
        api: Arc<dyn MailboxApi>,
        config: RetrievalConfig,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            api,
            limiter,
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    #[must_use]
    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Unread count of the inbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires, or the remote
    /// error from the label lookup.
    pub async fn total_unread(&self, cancel: &CancellationToken) -> Result<u64> {
        self.limiter.admit(cost::LABEL_GET, cancel).await?;

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            total = self.api.unread_count() => total,
        }
    }

    /// Start retrieving every unread message matching the configured
    /// query.
    ///
    /// The unread total is read once and used both as the scanner's
    /// stopping hint and as [`UnreadStream::total`].
    ///
    /// # Errors
    ///
    /// Fails if the total or the id listing fails, or with
    /// [`Error::Quota`] if the limiter is too small to fetch anything.
    /// Per-message failures only shorten the stream.
    pub async fn stream_unread(&self, cancel: CancellationToken) -> Result<UnreadStream> {
        let total = self.total_unread(&cancel).await?;
        info!("Mailbox reports {} unread messages", total);

        let ids = self
            .scanner()
            .list_unread_ids(&self.config.query, total, &cancel)
            .await?;
        let mails = self.fetcher()?.fetch(ids.clone(), cancel);

        Ok(UnreadStream { total, ids, mails })
    }

    /// Retrieve every unread message and wait for the fetch to finish.
    ///
    /// # Errors
    ///
    /// Same as [`RetrievalService::stream_unread`].
    pub async fn collect_unread(&self, cancel: CancellationToken) -> Result<Vec<RawMail>> {
        let stream = self.stream_unread(cancel).await?;
        let mails = stream.mails.collect_all().await;
        info!("Retrieved {} of {} unread messages", mails.len(), stream.total);
        Ok(mails)
    }

    /// Permanently delete messages. Returns how many ids were processed.
    ///
    /// # Errors
    ///
    /// Stops at the first failed batch and returns its error.
    pub async fn delete_messages(
        &self,
        ids: &[MessageId],
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut done = 0;
        for chunk in ids.chunks(MAX_BATCH) {
            self.limiter.admit(cost::BATCH_DELETE, cancel).await?;
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                result = self.api.batch_delete(chunk) => result?,
            }
            done += chunk.len();
            debug!("Deleted {}/{} messages", done, ids.len());
        }
        info!("Deleted {} messages", done);
        Ok(done)
    }

    /// Move messages to the trash.
    ///
    /// # Errors
    ///
    /// Stops at the first failed batch and returns its error.
    pub async fn trash_messages(
        &self,
        ids: &[MessageId],
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.modify(ids, &[Label::Trash], &[Label::Inbox], cancel)
            .await
    }

    /// Remove messages from the inbox without deleting them.
    ///
    /// # Errors
    ///
    /// Stops at the first failed batch and returns its error.
    pub async fn archive_messages(
        &self,
        ids: &[MessageId],
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.modify(ids, &[], &[Label::Inbox], cancel).await
    }

    /// # Errors
    ///
    /// Stops at the first failed batch and returns its error.
    pub async fn mark_read(
        &self,
        ids: &[MessageId],
        cancel: &CancellationToken,
    ) -> Result<usize> {
        self.modify(ids, &[], &[Label::Unread], cancel).await
    }

    // -- private helpers --

    fn scanner(&self) -> MailboxScanner {
        MailboxScanner::new(
            Arc::clone(&self.api),
            Arc::clone(&self.limiter),
            self.config.page_size,
            self.config.max_attempts,
        )
    }

    fn fetcher(&self) -> Result<MessageFetcher> {
        MessageFetcher::new(
            Arc::clone(&self.api),
            Arc::clone(&self.limiter),
            self.config.workers,
            self.config.max_attempts,
        )
    }

    async fn modify(
        &self,
        ids: &[MessageId],
        add: &[Label],
        remove: &[Label],
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let mut done = 0;
        for chunk in ids.chunks(MAX_BATCH) {
            self.limiter.admit(cost::BATCH_MODIFY, cancel).await?;
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                result = self.api.batch_modify(chunk, add, remove) => result?,
            }
            done += chunk.len();
            debug!("Relabelled {}/{} messages", done, ids.len());
        }
        info!(
            "Relabelled {} messages (+{:?} -{:?})",
            done, add, remove
        );
        Ok(done)
    }
}

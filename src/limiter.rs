//! Token-bucket admission gate for the mailbox API quota
//!
//! Every remote call is charged a number of quota units before it is
//! issued. The bucket refills continuously at a fixed rate up to its
//! burst capacity; callers that find it short sleep until enough units
//! have accrued or their cancellation token fires.

use crate::error::{Error, Result};
use std::sync::Mutex;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Quota units charged per remote operation kind.
///
/// Values follow the Gmail API per-method quota table.
pub mod cost {
    /// `users.labels.get`
    pub const LABEL_GET: u32 = 1;
    /// `users.messages.list`
    pub const MESSAGES_LIST: u32 = 5;
    /// `users.messages.get`
    pub const MESSAGES_GET: u32 = 5;
    /// `users.messages.batchModify`
    pub const BATCH_MODIFY: u32 = 50;
    /// `users.messages.batchDelete`
    pub const BATCH_DELETE: u32 = 50;
}

/// A cancellable token bucket shared by every caller of one quota.
#[derive(Debug)]
pub struct RateLimiter {
    per_second: f64,
    burst: u32,
    bucket: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    updated: Instant,
}

impl RateLimiter {
    /// Create a full bucket refilling at `per_second` units up to `burst`.
    #[must_use]
    pub fn new(per_second: f64, burst: u32) -> Self {
        Self {
            per_second,
            burst,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(burst),
                updated: Instant::now(),
            }),
        }
    }

    /// Bucket capacity.
    #[must_use]
    pub const fn burst(&self) -> u32 {
        self.burst
    }

    /// Wait until `units` are available and consume them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires before admission,
    /// and [`Error::Quota`] if `units` exceeds the bucket capacity (such
    /// a request could never be admitted).
    pub async fn admit(&self, units: u32, cancel: &CancellationToken) -> Result<()> {
        if units > self.burst {
            return Err(Error::Quota(format!(
                "request of {units} units exceeds burst of {}",
                self.burst
            )));
        }

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let Some(wait) = self.try_take(units) else {
                return Ok(());
            };

            debug!("Quota exhausted, waiting {:?} for {} units", wait, units);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// Take `units` if available; otherwise report how long until they
    /// will be.
    fn try_take(&self, units: u32) -> Option<Duration> {
        let mut bucket = self
            .bucket
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.updated).as_secs_f64();
        bucket.tokens = elapsed
            .mul_add(self.per_second, bucket.tokens)
            .min(f64::from(self.burst));
        bucket.updated = now;

        let needed = f64::from(units);
        if bucket.tokens >= needed {
            bucket.tokens -= needed;
            None
        } else {
            let deficit = needed - bucket.tokens;
            Some(Duration::from_secs_f64(deficit / self.per_second))
        }
    }
}

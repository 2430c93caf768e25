//! Parallel message retrieval
//!
//! A fixed pool of tokio tasks drains a shared id queue. Each task
//! charges the rate limiter, fetches one message, decodes it and pushes
//! the result into a bounded channel. The consumer sees a
//! [`MailStream`] that ends once every worker has exited.
//!
//! Failures are per message: a malformed message is dropped at once, a
//! remote error is retried up to the attempt ceiling and then dropped.
//! Neither stops the other workers. Cancellation stops everything.

use crate::api::MailboxApi;
use crate::error::{Error, Result};
use crate::limiter::{RateLimiter, cost};
use crate::mail::{MessageId, RawMail};
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Queue = Arc<Mutex<VecDeque<MessageId>>>;

/// Fetches message bodies with a bounded worker pool.
#[derive(Clone)]
pub struct MessageFetcher {
    api: Arc<dyn MailboxApi>,
    limiter: Arc<RateLimiter>,
    workers: usize,
    max_attempts: u32,
}

impl MessageFetcher {
    /// Create a fetcher drawing from `limiter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Quota`] if the limiter's burst is smaller than
    /// the cost of a single get, since no worker could ever be admitted.
    pub fn new(
        api: Arc<dyn MailboxApi>,
        limiter: Arc<RateLimiter>,
        workers: usize,
        max_attempts: u32,
    ) -> Result<Self> {
        if limiter.burst() < cost::MESSAGES_GET {
            return Err(Error::Quota(format!(
                "burst of {} cannot admit a message fetch of {} units",
                limiter.burst(),
                cost::MESSAGES_GET
            )));
        }

        Ok(Self {
            api,
            limiter,
            workers: workers.max(1),
            max_attempts: max_attempts.max(1),
        })
    }

    /// Start fetching `ids` and return the stream of decoded mail.
    ///
    /// Must be called from within a tokio runtime. Records arrive in
    /// completion order, not in the order of `ids`.
    #[must_use]
    pub fn fetch(&self, ids: Vec<MessageId>, cancel: CancellationToken) -> MailStream {
        let total = ids.len();
        let workers = self.workers.min(total);
        let (tx, rx) = mpsc::channel(self.workers);
        let queue: Queue = Arc::new(Mutex::new(VecDeque::from(ids)));

        info!("Fetching {} messages with {} workers", total, workers);

        for n in 0..workers {
            let worker = Worker {
                n,
                api: Arc::clone(&self.api),
                limiter: Arc::clone(&self.limiter),
                max_attempts: self.max_attempts,
            };
            tokio::spawn(worker.run(Arc::clone(&queue), tx.clone(), cancel.clone()));
        }

        MailStream { rx }
    }
}

/// Decoded mail as it arrives from the fetch workers.
///
/// The stream ends when all workers are done, whether they drained the
/// queue or were cancelled.
#[derive(Debug)]
pub struct MailStream {
    rx: mpsc::Receiver<RawMail>,
}

impl MailStream {
    /// Next decoded message, or `None` once the fetch is complete.
    pub async fn next_mail(&mut self) -> Option<RawMail> {
        self.rx.recv().await
    }

    /// Wait for the fetch to finish and return everything it produced.
    pub async fn collect_all(mut self) -> Vec<RawMail> {
        let mut mails = Vec::new();
        while let Some(mail) = self.rx.recv().await {
            mails.push(mail);
        }
        mails
    }
}

impl Stream for MailStream {
    type Item = RawMail;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<RawMail>> {
        self.rx.poll_recv(cx)
    }
}

struct Worker {
    n: usize,
    api: Arc<dyn MailboxApi>,
    limiter: Arc<RateLimiter>,
    max_attempts: u32,
}

impl Worker {
    async fn run(self, queue: Queue, results: mpsc::Sender<RawMail>, cancel: CancellationToken) {
        while !cancel.is_cancelled() && !results.is_closed() {
            let Some(id) = pop(&queue) else {
                break;
            };

            let mail = match self.fetch_one(&id, &cancel).await {
                Ok(Some(mail)) => mail,
                Ok(None) => continue,
                Err(Error::Cancelled) => break,
                Err(e) => {
                    warn!("Worker {} stopping: {}", self.n, e);
                    break;
                }
            };

            let sent = tokio::select! {
                biased;
                () = cancel.cancelled() => false,
                sent = results.send(mail) => sent.is_ok(),
            };
            if !sent {
                break;
            }
        }
        debug!("Worker {} done", self.n);
    }

    /// Fetch and decode one message.
    ///
    /// `Ok(None)` means the message was dropped; `Err` means the worker
    /// must stop.
    async fn fetch_one(
        &self,
        id: &MessageId,
        cancel: &CancellationToken,
    ) -> Result<Option<RawMail>> {
        let mut last_err = None;

        for attempt in 1..=self.max_attempts {
            self.limiter.admit(cost::MESSAGES_GET, cancel).await?;

            let fetched = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                fetched = self.api.get_message(id) => fetched,
            };

            match fetched {
                Ok(msg) => {
                    return match RawMail::from_message(msg) {
                        Ok(mail) => Ok(Some(mail)),
                        Err(e) => {
                            warn!("Dropping message {}: {}", id, e);
                            Ok(None)
                        }
                    };
                }
                Err(e) if !e.is_retryable() => {
                    warn!("Dropping message {}: {}", id, e);
                    return Ok(None);
                }
                Err(e) => {
                    debug!(
                        "Fetching message {} failed (attempt {}/{}): {}",
                        id, attempt, self.max_attempts, e
                    );
                    last_err = Some(e);
                }
            }
        }

        if let Some(e) = last_err {
            warn!(
                "Message {} failed after {} attempts: {}",
                id, self.max_attempts, e
            );
        }
        Ok(None)
    }
}

fn pop(queue: &Mutex<VecDeque<MessageId>>) -> Option<MessageId> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

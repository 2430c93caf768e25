//! In-memory `MailboxApi` with failure injection
//!
//! Failures are configured up front with the builder-style methods and
//! every call is counted, so tests can assert both on what came out of
//! the pipeline and on how hard it hit the remote.

use super::mailbox::Mailbox;
use async_trait::async_trait;
use inbox_sweep::{Error, GmailMessage, Label, MailboxApi, MessageId, MessagePage, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A `MailboxApi` backed by a [`Mailbox`] held in memory.
pub struct FakeMailbox {
    mailbox: Mutex<Mailbox>,
    /// Ids whose fetch always fails with a 503.
    failing: HashSet<String>,
    /// Remaining forced failures per id.
    flaky: Mutex<HashMap<String, u32>>,
    /// Remaining forced listing failures.
    failing_pages: AtomicUsize,
    /// Hand out a continuation token even on the last page.
    endless_tokens: bool,
    delay: Option<Duration>,
    unread_calls: AtomicUsize,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
    get_calls_by_id: Mutex<HashMap<String, usize>>,
    batch_sizes: Mutex<Vec<usize>>,
}

impl FakeMailbox {
    pub fn new(mailbox: Mailbox) -> Self {
        Self {
            mailbox: Mutex::new(mailbox),
            failing: HashSet::new(),
            flaky: Mutex::new(HashMap::new()),
            failing_pages: AtomicUsize::new(0),
            endless_tokens: false,
            delay: None,
            unread_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            get_calls_by_id: Mutex::new(HashMap::new()),
            batch_sizes: Mutex::new(Vec::new()),
        }
    }

    /// Make every fetch of `id` fail.
    pub fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Make the first `times` fetches of `id` fail.
    pub fn flaky(self, id: &str, times: u32) -> Self {
        self.flaky.lock().unwrap().insert(id.to_string(), times);
        self
    }

    /// Make the next `times` listing requests fail.
    pub fn failing_pages(self, times: usize) -> Self {
        self.failing_pages.store(times, Ordering::SeqCst);
        self
    }

    /// Return a continuation token after every page, even an empty one.
    pub fn endless_tokens(mut self) -> Self {
        self.endless_tokens = true;
        self
    }

    /// Sleep this long inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn unread_calls(&self) -> usize {
        self.unread_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls_for(&self, id: &str) -> usize {
        self.get_calls_by_id
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .unwrap_or(0)
    }

    /// Id count of every batch call, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    pub fn snapshot(&self) -> Mailbox {
        self.mailbox.lock().unwrap().clone()
    }
}

fn unavailable() -> Error {
    Error::Api {
        status: 503,
        message: "backend unavailable".into(),
    }
}

fn id_strings(ids: &[MessageId]) -> Vec<String> {
    ids.iter().map(|id| id.as_str().to_string()).collect()
}

fn label_strings(labels: &[Label]) -> Vec<String> {
    labels.iter().map(|l| l.as_str().to_string()).collect()
}

#[async_trait]
impl MailboxApi for FakeMailbox {
    async fn unread_count(&self) -> Result<u64> {
        self.unread_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.mailbox.lock().unwrap().unread_count())
    }

    async fn list_page(
        &self,
        _query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let should_fail = self
            .failing_pages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(unavailable());
        }

        let mut page = self
            .mailbox
            .lock()
            .unwrap()
            .page(page_size as usize, page_token);
        if self.endless_tokens && page.next_page_token.is_none() {
            page.next_page_token = Some("999999".to_string());
        }
        Ok(page)
    }

    async fn get_message(&self, id: &MessageId) -> Result<GmailMessage> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        *self
            .get_calls_by_id
            .lock()
            .unwrap()
            .entry(id.as_str().to_string())
            .or_default() += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(id.as_str()) {
            return Err(unavailable());
        }

        {
            let mut flaky = self.flaky.lock().unwrap();
            if let Some(remaining) = flaky.get_mut(id.as_str()) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(unavailable());
                }
            }
        }

        self.mailbox
            .lock()
            .unwrap()
            .get(id.as_str())
            .map(super::mailbox::TestMessage::to_gmail)
            .ok_or_else(|| Error::Api {
                status: 404,
                message: "Requested entity was not found.".into(),
            })
    }

    async fn batch_delete(&self, ids: &[MessageId]) -> Result<()> {
        self.batch_sizes.lock().unwrap().push(ids.len());
        self.mailbox.lock().unwrap().delete(&id_strings(ids));
        Ok(())
    }

    async fn batch_modify(&self, ids: &[MessageId], add: &[Label], remove: &[Label]) -> Result<()> {
        self.batch_sizes.lock().unwrap().push(ids.len());
        self.mailbox.lock().unwrap().modify(
            &id_strings(ids),
            &label_strings(add),
            &label_strings(remove),
        );
        Ok(())
    }
}

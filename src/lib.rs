//! Gmail unread retrieval and mailing list cleanup
//!
//! Pulls every unread message matching a search query out of a Gmail
//! mailbox as fast as the per-user API quota allows, groups the results
//! into mailing lists by sender, and unsubscribes from a list with an
//! RFC 8058 one-click POST.
//!
//! The pipeline is [`RetrievalService`] → [`MailboxScanner`] (ids) →
//! [`MessageFetcher`] (decoded [`RawMail`]) → [`classify`] →
//! [`MailingList::unsubscribe`]. All remote calls go through the
//! [`MailboxApi`] trait and are paced by one shared [`RateLimiter`].
//!
//! Authentication is the caller's business: [`GmailClient`] takes an
//! already authorised [`reqwest::Client`] or a bearer token.
//!
//! ```no_run
//! use inbox_sweep::{GmailClient, GmailConfig, RetrievalConfig, RetrievalService, classify};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run(token: &str) -> inbox_sweep::Result<()> {
//! let client = GmailClient::with_bearer_token(token, GmailConfig::default())?;
//! let service = RetrievalService::new(Arc::new(client), RetrievalConfig::default());
//!
//! let mails = service.collect_unread(CancellationToken::new()).await?;
//! for list in classify(&mails) {
//!     println!("{} {}", list.total_unread(), list.sender());
//! }
//! # Ok(())
//! # }
//! ```

mod api;
mod classify;
mod config;
mod error;
mod fetcher;
mod gmail;
mod label;
mod limiter;
mod mail;
mod scanner;
mod service;
mod unsubscribe;

pub use api::{
    GmailMessage, LabelInfo, MailboxApi, MessageHeader, MessagePage, MessagePart, MessageRef,
};
pub use classify::{MailingList, classify, is_list_mail};
pub use config::{DEFAULT_API_BASE, DEFAULT_QUERY, GmailConfig, MAX_PAGE_SIZE, RetrievalConfig};
pub use error::{Error, Result};
pub use fetcher::{MailStream, MessageFetcher};
pub use gmail::GmailClient;
pub use label::Label;
pub use limiter::{RateLimiter, cost};
pub use mail::{Headers, MessageId, RawMail};
pub use scanner::MailboxScanner;
pub use service::{MAX_BATCH, RetrievalService, UnreadStream};
pub use unsubscribe::{LIST_UNSUBSCRIBE, LIST_UNSUBSCRIBE_POST, Unsubscriber};

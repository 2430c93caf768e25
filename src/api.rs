//! Remote mailbox interface and Gmail wire types
//!
//! [`MailboxApi`] is the seam between the retrieval pipeline and the
//! remote service. [`crate::GmailClient`] implements it over HTTP;
//! tests substitute an in-memory mailbox.

use crate::error::Result;
use crate::label::Label;
use crate::mail::MessageId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Operations the pipeline needs from the remote mailbox.
#[async_trait]
pub trait MailboxApi: Send + Sync {
    /// Number of unread messages in the inbox.
    async fn unread_count(&self) -> Result<u64>;

    /// One page of message ids matching `query`.
    async fn list_page(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage>;

    /// A single message with its header metadata.
    async fn get_message(&self, id: &MessageId) -> Result<GmailMessage>;

    /// Permanently delete messages. At most 1000 ids per call.
    async fn batch_delete(&self, ids: &[MessageId]) -> Result<()>;

    /// Add and remove labels on messages. At most 1000 ids per call.
    async fn batch_modify(&self, ids: &[MessageId], add: &[Label], remove: &[Label])
    -> Result<()>;
}

/// One page of a message listing.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_size_estimate: Option<u64>,
}

impl MessagePage {
    /// Ids on this page, in listing order.
    #[must_use]
    pub fn ids(&self) -> Vec<MessageId> {
        self.messages
            .iter()
            .map(|m| MessageId::new(m.id.clone()))
            .collect()
    }
}

/// A listing entry: just enough to fetch the message.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// A message as returned by `messages.get` with `format=metadata`.
///
/// Every field is optional on the wire; [`crate::RawMail::from_message`]
/// decides what a usable message must carry.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GmailMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub size_estimate: Option<u64>,
    /// Milliseconds since the epoch, encoded as a decimal string.
    #[serde(default)]
    pub internal_date: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub headers: Option<Vec<MessageHeader>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageHeader {
    pub name: String,
    pub value: String,
}

impl MessageHeader {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Label metadata from `labels.get`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub messages_total: Option<u64>,
    #[serde(default)]
    pub messages_unread: Option<u64>,
}

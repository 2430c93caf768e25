//! Decoded unread mail records

use crate::api::GmailMessage;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use mailparse::{MailAddr, addrparse};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// Opaque identifier of a message in the remote mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Message headers keyed by lower-cased name.
///
/// A header may repeat; values keep their order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Headers(HashMap<String, Vec<String>>);

impl Headers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under the lower-cased `name`.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// First value of a header, if present.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    /// Every value of a header in order of appearance.
    #[must_use]
    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name.as_ref(), value);
        }
        headers
    }
}

/// One unread message, reduced to the metadata the sweep needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawMail {
    pub id: MessageId,
    /// Bare sender address, without display name.
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub snippet: String,
    pub headers: Headers,
    pub received_at: Option<DateTime<Utc>>,
    pub size_estimate: u64,
}

impl RawMail {
    /// Decode a fetched message.
    ///
    /// The message must carry an id, a header list, a parseable `From`
    /// and a `Subject`. Recipients and the snippet are best effort.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] describing the first missing or
    /// malformed field.
    pub fn from_message(msg: GmailMessage) -> Result<Self> {
        let id = msg
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Decode("missing message id".into()))?;

        let raw_headers = msg
            .payload
            .and_then(|p| p.headers)
            .ok_or_else(|| Error::Decode(format!("message {id} has no headers")))?;

        let headers: Headers = raw_headers
            .into_iter()
            .map(|h| (h.name, h.value))
            .collect();

        let from_header = headers
            .first("from")
            .ok_or_else(|| Error::Decode(format!("message {id} has no sender")))?;
        let from = parse_sender(from_header)
            .ok_or_else(|| Error::Decode(format!("message {id} has unparseable sender")))?;

        let subject = headers
            .first("subject")
            .ok_or_else(|| Error::Decode(format!("message {id} has no subject")))?
            .to_string();

        let to = headers.first("to").map(parse_recipients).unwrap_or_default();

        let received_at = msg
            .internal_date
            .as_deref()
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis);

        Ok(Self {
            id: MessageId::new(id),
            from,
            to,
            subject,
            snippet: msg.snippet.unwrap_or_default(),
            headers,
            received_at,
            size_estimate: msg.size_estimate.unwrap_or(0),
        })
    }
}

impl fmt::Display for RawMail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.from, self.id, self.subject)
    }
}

/// The single address of a `From` header, lower-cased.
fn parse_sender(value: &str) -> Option<String> {
    let addrs = addrparse(value).ok()?;
    let addr = match addrs.iter().next()? {
        MailAddr::Single(info) => info.addr.clone(),
        MailAddr::Group(group) => group.addrs.first()?.addr.clone(),
    };
    let addr = addr.trim().to_ascii_lowercase();
    addr.contains('@').then_some(addr)
}

fn parse_recipients(value: &str) -> Vec<String> {
    addrparse(value)
        .map(|addrs| {
            addrs
                .iter()
                .flat_map(|a| match a {
                    MailAddr::Single(info) => vec![info.addr.clone()],
                    MailAddr::Group(group) => group.addrs.iter().map(|i| i.addr.clone()).collect(),
                })
                .collect()
        })
        .unwrap_or_default()
}

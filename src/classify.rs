//! Mailing list detection
//!
//! A sender counts as a mailing list when at least one of its unread
//! messages carries a `List-Unsubscribe` header. Only those messages are
//! counted; the rest of that sender's mail is ordinary correspondence.

use crate::error::{Error, Result};
use crate::mail::{MessageId, RawMail};
use crate::unsubscribe::{LIST_UNSUBSCRIBE, Unsubscriber};
use serde::Serialize;
use std::collections::HashMap;

/// Unread list mail from one sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailingList {
    sender: String,
    total_unread: usize,
    message_ids: Vec<MessageId>,
    unsubscriber: Option<Unsubscriber>,
}

impl MailingList {
    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Number of unread list messages; always `message_ids().len()`.
    #[must_use]
    pub const fn total_unread(&self) -> usize {
        self.total_unread
    }

    #[must_use]
    pub fn message_ids(&self) -> &[MessageId] {
        &self.message_ids
    }

    #[must_use]
    pub const fn unsubscriber(&self) -> Option<&Unsubscriber> {
        self.unsubscriber.as_ref()
    }

    #[must_use]
    pub const fn can_unsubscribe(&self) -> bool {
        self.unsubscriber.is_some()
    }

    /// Unsubscribe from this list with a one-click POST.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoUnsubscriber`] if none of the list's messages
    /// offered a one-click target, otherwise whatever
    /// [`Unsubscriber::unsubscribe`] reports.
    pub async fn unsubscribe(&self, http: &reqwest::Client) -> Result<()> {
        match &self.unsubscriber {
            Some(unsubscriber) => unsubscriber.unsubscribe(http).await,
            None => Err(Error::NoUnsubscriber),
        }
    }
}

/// Whether a message was sent through a mailing list.
#[must_use]
pub fn is_list_mail(mail: &RawMail) -> bool {
    mail.headers.contains(LIST_UNSUBSCRIBE)
}

/// Group mail by sender and keep the senders that are mailing lists,
/// busiest first.
///
/// Ties keep the order in which senders first appear in `records`, so
/// the result is stable for a given input.
#[must_use]
pub fn classify<'a, I>(records: I) -> Vec<MailingList>
where
    I: IntoIterator<Item = &'a RawMail>,
{
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(&str, Vec<&RawMail>)> = Vec::new();

    for mail in records {
        let slot = *index.entry(mail.from.as_str()).or_insert_with(|| {
            groups.push((mail.from.as_str(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(mail);
    }

    let mut lists: Vec<MailingList> = groups
        .into_iter()
        .filter_map(|(sender, mails)| {
            let list_mail: Vec<&RawMail> = mails.into_iter().filter(|m| is_list_mail(m)).collect();
            if list_mail.is_empty() {
                return None;
            }

            let unsubscriber = list_mail
                .iter()
                .find_map(|m| Unsubscriber::from_headers(&m.headers));
            let message_ids: Vec<MessageId> = list_mail.iter().map(|m| m.id.clone()).collect();

            Some(MailingList {
                sender: sender.to_string(),
                total_unread: message_ids.len(),
                message_ids,
                unsubscriber,
            })
        })
        .collect();

    lists.sort_by(|a, b| b.total_unread.cmp(&a.total_unread));
    lists
}

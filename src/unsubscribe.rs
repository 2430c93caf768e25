//! RFC 8058 one-click unsubscribe
//!
//! A sender opts into one-click unsubscription by sending both
//!
//! ```text
//! List-Unsubscribe: <mailto:leave@example.com>, <https://example.com/u?id=42>
//! List-Unsubscribe-Post: List-Unsubscribe=One-Click
//! ```
//!
//! The client then unsubscribes with a single form POST to the HTTPS
//! target; no web page is involved. Only HTTPS targets are honoured.

use crate::error::{Error, Result};
use crate::mail::Headers;
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

/// Header carrying the unsubscribe targets.
pub const LIST_UNSUBSCRIBE: &str = "list-unsubscribe";

/// Header advertising one-click support.
pub const LIST_UNSUBSCRIBE_POST: &str = "list-unsubscribe-post";

const ONE_CLICK_TOKEN: &str = "list-unsubscribe=one-click";
const ONE_CLICK_BODY: &str = "List-Unsubscribe=One-Click";
const USER_AGENT: &str = concat!("inbox-sweep/", env!("CARGO_PKG_VERSION"));

/// A validated one-click unsubscribe target.
///
/// Only obtainable through [`Unsubscriber::from_headers`], so the target
/// is always an `https` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unsubscriber {
    target: Url,
}

impl Unsubscriber {
    /// Find a one-click target in a message's headers.
    ///
    /// Returns `None` unless `List-Unsubscribe-Post` announces one-click
    /// and `List-Unsubscribe` lists at least one `https` URL. The first
    /// such URL, in header order, is kept.
    #[must_use]
    pub fn from_headers(headers: &Headers) -> Option<Self> {
        let post = headers.first(LIST_UNSUBSCRIBE_POST)?;
        if !post.trim().eq_ignore_ascii_case(ONE_CLICK_TOKEN) {
            return None;
        }

        let targets = headers.first(LIST_UNSUBSCRIBE)?;
        bracketed(targets)
            .into_iter()
            .find_map(|candidate| {
                Url::parse(candidate.trim())
                    .ok()
                    .filter(|url| url.scheme() == "https")
            })
            .map(|target| Self { target })
    }

    #[must_use]
    pub const fn target(&self) -> &Url {
        &self.target
    }

    /// Send the one-click POST.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] if the request cannot be sent and
    /// [`Error::Unsubscribe`] if the target answers with a non-2xx
    /// status.
    pub async fn unsubscribe(&self, http: &reqwest::Client) -> Result<()> {
        debug!("POST one-click unsubscribe to {}", self.target);

        let response = http
            .post(self.target.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .body(ONE_CLICK_BODY)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Unsubscribe {
                status: status.as_u16(),
            });
        }

        info!("Unsubscribed via {}", self.target);
        Ok(())
    }
}

/// Every non-empty `<...>` span of `value`, in order.
fn bracketed(value: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut rest = value;

    while let Some(open) = rest.find('<') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            break;
        };
        if close == 0 {
            rest = after;
            continue;
        }
        spans.push(&after[..close]);
        rest = &after[close + 1..];
    }

    spans
}

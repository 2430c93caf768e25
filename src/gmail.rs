//! Gmail REST client
//!
//! Implements [`MailboxApi`] against the Gmail v1 HTTP API. The client
//! never handles credentials itself: it is handed an already
//! authenticated [`reqwest::Client`], or a bearer token for
//! [`GmailClient::with_bearer_token`] to install as a default header.

use crate::api::{GmailMessage, LabelInfo, MailboxApi, MessagePage};
use crate::config::GmailConfig;
use crate::error::{Error, Result};
use crate::label::Label;
use crate::mail::MessageId;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("inbox-sweep/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Gmail API client for the authenticated user (`users/me`).
#[derive(Debug, Clone)]
pub struct GmailClient {
    http: reqwest::Client,
    base: Url,
}

impl GmailClient {
    /// Wrap an authenticated HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client, config: GmailConfig) -> Self {
        Self {
            http,
            base: config.api_base,
        }
    }

    /// Build a client that sends `Authorization: Bearer <token>` on
    /// every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or
    /// the HTTP client cannot be built.
    pub fn with_bearer_token(token: &str, config: GmailConfig) -> Result<Self> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| Error::Config(format!("Invalid access token: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self::new(http, config))
    }

    /// API base every endpoint is resolved against.
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    // -- private helpers --

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("API base {} cannot hold a path", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url);
        let response = self.http.get(url).send().await?;
        let body = check(response).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_json(&self, url: Url, body: serde_json::Value) -> Result<()> {
        debug!("POST {}", url);
        let response = self.http.post(url).json(&body).send().await?;
        check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl MailboxApi for GmailClient {
    async fn unread_count(&self) -> Result<u64> {
        let url = self.endpoint(&["labels", Label::Inbox.as_str()])?;
        let label: LabelInfo = self.get_json(url).await?;
        Ok(label.messages_unread.unwrap_or(0))
    }

    async fn list_page(
        &self,
        query: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<MessagePage> {
        let mut url = self.endpoint(&["messages"])?;
        {
            let mut params = url.query_pairs_mut();
            params
                .append_pair("q", query)
                .append_pair("maxResults", &page_size.to_string());
            if let Some(token) = page_token {
                params.append_pair("pageToken", token);
            }
        }
        self.get_json(url).await
    }

    async fn get_message(&self, id: &MessageId) -> Result<GmailMessage> {
        let mut url = self.endpoint(&["messages", id.as_str()])?;
        url.query_pairs_mut().append_pair("format", "metadata");
        self.get_json(url).await
    }

    async fn batch_delete(&self, ids: &[MessageId]) -> Result<()> {
        let url = self.endpoint(&["messages", "batchDelete"])?;
        self.post_json(url, json!({ "ids": ids })).await
    }

    async fn batch_modify(
        &self,
        ids: &[MessageId],
        add: &[Label],
        remove: &[Label],
    ) -> Result<()> {
        let url = self.endpoint(&["messages", "batchModify"])?;
        let add: Vec<&str> = add.iter().copied().map(Label::as_str).collect();
        let remove: Vec<&str> = remove.iter().copied().map(Label::as_str).collect();
        self.post_json(
            url,
            json!({ "ids": ids, "addLabelIds": add, "removeLabelIds": remove }),
        )
        .await
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Turn a non-success response into [`Error::Api`].
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(api_error(status, &text))
}

fn api_error(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<ErrorBody>(body).map_or_else(
        |_| {
            if body.is_empty() {
                status.canonical_reason().unwrap_or("unknown").to_string()
            } else {
                body.to_string()
            }
        },
        |b| b.error.message,
    );
    Error::Api {
        status: status.as_u16(),
        message,
    }
}

//! In-process fake Gmail REST server for integration testing
//!
//! # The Gmail endpoints involved
//!
//! Every endpoint lives under `/gmail/v1/users/me/` and is authorised
//! with `Authorization: Bearer <token>`:
//!
//! ```text
//!   GET  labels/INBOX                         -> {"messagesUnread": 42, ...}
//!   GET  messages?q=..&maxResults=..&pageToken=..
//!                                             -> {"messages": [{"id": ..}], "nextPageToken": ..}
//!   GET  messages/{id}?format=metadata        -> {"id": .., "payload": {"headers": [..]}}
//!   POST messages/batchDelete  {"ids": [..]}  -> 204
//!   POST messages/batchModify  {"ids": [..], "addLabelIds": [..], "removeLabelIds": [..]}
//!                                             -> 204
//! ```
//!
//! Errors come back as `{"error": {"code": 404, "message": ".."}}`.
//! Listing ignores `q` and returns every unread message; page tokens
//! are plain offsets.

use super::http::{Request, read_request, write_error, write_response};
use super::mailbox::Mailbox;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use url::Url;

const PREFIX: &str = "/gmail/v1/users/me/";

/// Token the server accepts unless told otherwise.
pub const TEST_TOKEN: &str = "test-token";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchBody {
    ids: Vec<String>,
    #[serde(default)]
    add_label_ids: Vec<String>,
    #[serde(default)]
    remove_label_ids: Vec<String>,
}

struct State {
    mailbox: Mutex<Mailbox>,
    requests: Mutex<Vec<Request>>,
    token: String,
}

/// A fake Gmail server on localhost with an OS-assigned port.
///
/// The server runs until the `FakeGmailServer` is dropped.
pub struct FakeGmailServer {
    port: u16,
    state: Arc<State>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for FakeGmailServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeGmailServer {
    /// Start a server holding `mailbox` and accepting [`TEST_TOKEN`].
    pub async fn start(mailbox: Mailbox) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let state = Arc::new(State {
            mailbox: Mutex::new(mailbox),
            requests: Mutex::new(Vec::new()),
            token: TEST_TOKEN.to_string(),
        });

        let handle = {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _addr)) = listener.accept().await else {
                        break;
                    };
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        handle_connection(stream, &state).await;
                    });
                }
            })
        };

        Self {
            port,
            state,
            handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// API base to hand to `GmailConfig::with_base`.
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}{PREFIX}", self.port)
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn mailbox(&self) -> Mailbox {
        self.state.mailbox.lock().unwrap().clone()
    }
}

async fn handle_connection(stream: TcpStream, state: &State) {
    let mut reader = BufReader::new(stream);
    let Some(request) = read_request(&mut reader).await else {
        return;
    };
    state.requests.lock().unwrap().push(request.clone());

    let authorised = request
        .header("authorization")
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|t| t == state.token);
    if !authorised {
        write_error(&mut reader, 401, "Request had invalid authentication credentials.").await;
        return;
    }

    let Ok(url) = Url::parse(&format!("http://fake{}", request.target)) else {
        write_error(&mut reader, 400, "Bad request target").await;
        return;
    };
    let Some(path) = url.path().strip_prefix(PREFIX) else {
        write_error(&mut reader, 404, "Not found").await;
        return;
    };
    let segments: Vec<&str> = path.split('/').collect();

    match (request.method.as_str(), segments.as_slice()) {
        ("GET", ["labels", "INBOX"]) => {
            let body = {
                let mailbox = state.mailbox.lock().unwrap();
                serde_json::json!({
                    "id": "INBOX",
                    "name": "INBOX",
                    "messagesTotal": mailbox.messages.len(),
                    "messagesUnread": mailbox.unread_count(),
                })
            };
            write_json(&mut reader, &body).await;
        }
        ("GET", ["messages"]) => {
            let mut page_size = 100;
            let mut page_token = None;
            for (key, value) in url.query_pairs() {
                match key.as_ref() {
                    "maxResults" => page_size = value.parse().unwrap_or(100),
                    "pageToken" => page_token = Some(value.into_owned()),
                    _ => {}
                }
            }
            let page = state
                .mailbox
                .lock()
                .unwrap()
                .page(page_size, page_token.as_deref());
            write_json(&mut reader, &page).await;
        }
        ("POST", ["messages", "batchDelete"]) => {
            let Ok(body) = serde_json::from_slice::<BatchBody>(&request.body) else {
                write_error(&mut reader, 400, "Invalid JSON payload").await;
                return;
            };
            state.mailbox.lock().unwrap().delete(&body.ids);
            write_response(&mut reader, 204, "application/json", b"").await;
        }
        ("POST", ["messages", "batchModify"]) => {
            let Ok(body) = serde_json::from_slice::<BatchBody>(&request.body) else {
                write_error(&mut reader, 400, "Invalid JSON payload").await;
                return;
            };
            state.mailbox.lock().unwrap().modify(
                &body.ids,
                &body.add_label_ids,
                &body.remove_label_ids,
            );
            write_response(&mut reader, 204, "application/json", b"").await;
        }
        ("GET", ["messages", id]) => {
            let message = state.mailbox.lock().unwrap().get(id).map(|m| m.to_gmail());
            match message {
                Some(message) => write_json(&mut reader, &message).await,
                None => write_error(&mut reader, 404, "Requested entity was not found.").await,
            }
        }
        _ => write_error(&mut reader, 404, "Not found").await,
    }
}

async fn write_json<T: serde::Serialize>(stream: &mut BufReader<TcpStream>, value: &T) {
    let body = serde_json::to_vec(value).expect("serialize response");
    write_response(stream, 200, "application/json", &body).await;
}

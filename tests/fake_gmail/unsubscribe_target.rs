//! HTTPS endpoint receiving one-click unsubscribe POSTs
//!
//! RFC 8058 only allows `https` targets, so the fake target terminates
//! TLS itself. It generates a self-signed certificate for `127.0.0.1`
//! at startup; clients must be built with
//! `danger_accept_invalid_certs(true)` to talk to it.

use super::http::{Request, read_request, write_response};
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::{Arc, Mutex};
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// A fake list server answering every request with a fixed status.
pub struct FakeUnsubscribeTarget {
    port: u16,
    received: Arc<Mutex<Vec<Request>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for FakeUnsubscribeTarget {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl FakeUnsubscribeTarget {
    /// Start a target that answers `200 OK`.
    pub async fn start() -> Self {
        Self::with_status(200).await
    }

    /// Start a target that answers every request with `status`.
    pub async fn with_status(status: u16) -> Self {
        // Multiple tests may race to install the provider; the loser's
        // error is harmless.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
            .expect("generate self-signed cert");
        let cert_der = cert.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config");
        let acceptor = TlsAcceptor::from(Arc::new(tls_config));

        let received = Arc::new(Mutex::new(Vec::new()));
        let handle = {
            let received = Arc::clone(&received);
            tokio::spawn(async move {
                loop {
                    let Ok((stream, _addr)) = listener.accept().await else {
                        break;
                    };
                    let acceptor = acceptor.clone();
                    let received = Arc::clone(&received);
                    tokio::spawn(async move {
                        let Ok(tls) = acceptor.accept(stream).await else {
                            return;
                        };
                        let mut reader = BufReader::new(tls);
                        let Some(request) = read_request(&mut reader).await else {
                            return;
                        };
                        received.lock().unwrap().push(request);
                        write_response(&mut reader, status, "text/plain", b"").await;
                    });
                }
            })
        };

        Self {
            port,
            received,
            handle,
        }
    }

    /// URL to advertise in `List-Unsubscribe`.
    pub fn url(&self, path: &str) -> String {
        format!("https://127.0.0.1:{}{path}", self.port)
    }

    /// Every request received so far.
    pub fn received(&self) -> Vec<Request> {
        self.received.lock().unwrap().clone()
    }
}

/// An HTTP client that trusts the target's self-signed certificate.
pub fn insecure_client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .expect("build HTTP client")
}

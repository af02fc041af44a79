//! reqwest-backed [`RequestClient`].

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::error::Error as StdError;
use std::io;
use std::time::Duration;
use surge_core::{ClientError, Method, RequestClient};
use tracing::trace;

use super::RemoteError;

/// Errno reported when the OS does not expose one for a reset.
const ECONNRESET: i64 = 104;

/// HTTP client for one service endpoint.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base: Url,
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a client with a per-request timeout.
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, RemoteError> {
        let base = Url::parse(endpoint)
            .map_err(|e| RemoteError::InvalidEndpoint(format!("{endpoint}: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(RemoteError::InvalidEndpoint(format!(
                "{endpoint}: unsupported scheme"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("surge-spammer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RemoteError::Build)?;

        Ok(Self { base, client })
    }

    /// Endpoint requests are resolved against.
    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    fn resolve(&self, op: Method, path: &str) -> Result<Url, ClientError> {
        self.base.join(path).map_err(|e| ClientError::Transport {
            op,
            url: format!("{}{}", self.base, path),
            message: e.to_string(),
        })
    }

    async fn send(
        &self,
        op: Method,
        url: Url,
        request: reqwest::RequestBuilder,
    ) -> Result<Vec<u8>, ClientError> {
        let url_str = url.to_string();
        let response = request
            .send()
            .await
            .map_err(|e| map_error(op, &url_str, &e))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_error(op, &url_str, &e))?;
        trace!(%op, url = %url_str, status = status.as_u16(), len = body.len(), "Response");

        if status != StatusCode::OK {
            return Err(ClientError::Problem {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl RequestClient for HttpClient {
    async fn get(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        let url = self.resolve(Method::Get, path)?;
        let request = self.client.get(url.clone());
        self.send(Method::Get, url, request).await
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        let url = self.resolve(Method::Post, path)?;
        let request = self
            .client
            .post(url.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        self.send(Method::Post, url, request).await
    }
}

/// Map a reqwest failure onto the three transport variants.
fn map_error(op: Method, url: &str, err: &reqwest::Error) -> ClientError {
    if err.is_timeout() {
        return ClientError::Timeout {
            op,
            url: url.to_string(),
            message: err.to_string(),
        };
    }
    if let Some(errno) = reset_errno(err) {
        return ClientError::ConnectionReset {
            op,
            url: url.to_string(),
            errno,
        };
    }
    ClientError::Transport {
        op,
        url: url.to_string(),
        message: err.to_string(),
    }
}

/// Walk the source chain looking for a connection reset.
fn reset_errno(err: &(dyn StdError + 'static)) -> Option<i64> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>() {
            if io_err.kind() == io::ErrorKind::ConnectionReset {
                return Some(io_err.raw_os_error().map(i64::from).unwrap_or(ECONNRESET));
            }
        }
        current = e.source();
    }
    None
}

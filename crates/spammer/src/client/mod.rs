//! Typed client for the remote service.
//!
//! [`RemoteClient`] wraps a byte-level [`RequestClient`] with the service's
//! paths, JSON decoding and the retry rules:
//!
//! - account lookups are retried up to [`ACCOUNT_LOOKUP_ATTEMPTS`] times
//! - submissions are retried up to [`SUBMIT_ATTEMPTS`] times, but only for
//!   transient failures (timeouts and connection resets)
//! - transaction lookups are not retried; callers poll

mod http;
mod types;

pub use http::HttpClient;
pub use types::{ServicePaths, SubmissionResult};

use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use surge_core::{ClientError, RequestClient};
use surge_types::{
    AccountState, Address, ErrorKind, Hash, NodeInfo, Transaction, TransactionError,
    TransactionRecord,
};
use tracing::{debug, trace, warn};

/// Attempts for one account lookup.
pub const ACCOUNT_LOOKUP_ATTEMPTS: usize = 3;

/// Attempts for one submission.
pub const SUBMIT_ATTEMPTS: usize = 3;

/// Errors from typed service calls.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error(transparent)]
    Request(#[from] ClientError),

    #[error("Failed to decode {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode transaction: {0}")]
    Encode(#[from] TransactionError),

    #[error("Invalid endpoint {0}")]
    InvalidEndpoint(String),

    #[error("Failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
}

impl RemoteError {
    /// JSON payload recorded in the result log.
    pub fn raw_payload(&self) -> Value {
        match self {
            RemoteError::Request(err) => err.raw_payload(),
            other => json!({ "message": other.to_string() }),
        }
    }

    /// Classification of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Request(err) => err.kind(),
            _ => ErrorKind::Unknown,
        }
    }
}

/// Typed access to the remote service.
#[derive(Clone)]
pub struct RemoteClient {
    client: Arc<dyn RequestClient>,
    paths: ServicePaths,
}

impl RemoteClient {
    pub fn new(client: Arc<dyn RequestClient>, paths: ServicePaths) -> Self {
        Self { client, paths }
    }

    pub fn paths(&self) -> &ServicePaths {
        &self.paths
    }

    /// Fetch node info and network policy.
    pub async fn node_info(&self) -> Result<NodeInfo, RemoteError> {
        let body = self.client.get(&self.paths.info).await?;
        decode("node info", &body)
    }

    /// Fetch the current state of an account.
    pub async fn get_account(&self, address: &Address) -> Result<AccountState, RemoteError> {
        let path = self.paths.account(address);
        let mut attempt = 1;
        loop {
            match self.client.get(&path).await {
                Ok(body) => return decode("account", &body),
                Err(e) if attempt < ACCOUNT_LOOKUP_ATTEMPTS => {
                    debug!(
                        address = %address.short(),
                        attempt,
                        error = %e,
                        "Account lookup failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fetch a confirmed transaction. Any error means "not confirmed yet".
    pub async fn get_transaction(&self, hash: &Hash) -> Result<TransactionRecord, RemoteError> {
        let body = self.client.get(&self.paths.transaction(hash)).await?;
        decode("transaction", &body)
    }

    /// Poll until the transaction is confirmed. Has no deadline of its own;
    /// callers that need one wrap this in a timeout.
    pub async fn wait_for_confirmation(
        &self,
        hash: &Hash,
        interval: Duration,
    ) -> TransactionRecord {
        let mut lookups = 0u64;
        loop {
            lookups += 1;
            match self.get_transaction(hash).await {
                Ok(record) => {
                    debug!(%hash, lookups, "Transaction confirmed");
                    return record;
                }
                Err(e) => {
                    trace!(%hash, lookups, error = %e, "Transaction not confirmed yet");
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    /// Submit a signed transaction.
    pub async fn submit(&self, tx: &Transaction) -> Result<SubmissionResult, RemoteError> {
        let body = tx.serialize()?;
        let hash = tx.hash();

        let mut attempt = 1;
        loop {
            match self.client.post(&self.paths.submit, body.clone()).await {
                Ok(response) => {
                    return Ok(SubmissionResult {
                        hash,
                        attempts: attempt,
                        body: response,
                    })
                }
                Err(e) if e.kind().is_transient() && attempt < SUBMIT_ATTEMPTS => {
                    debug!(%hash, attempt, kind = %e.kind(), "Transient submit failure, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    warn!(%hash, attempt, kind = %e.kind(), error = %e, "Submit failed");
                    return Err(e.into());
                }
            }
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(
    what: &'static str,
    body: &[u8],
) -> Result<T, RemoteError> {
    serde_json::from_slice(body).map_err(|source| RemoteError::Decode { what, source })
}

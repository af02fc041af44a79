//! Collaborator traits.
//!
//! The harness talks to the remote service only through a [`RequestClient`]
//! and builds transactions only through a [`TransactionBuilder`]. Production
//! code plugs in the reqwest client and [`SigningBuilder`](crate::SigningBuilder);
//! tests plug in an in-memory service.

use crate::ClientError;
use async_trait::async_trait;
use std::sync::Arc;
use surge_types::{Address, Amount, KeyPair, Transaction, TransactionError};

/// Byte-level access to the remote service.
///
/// # Contract
///
/// - Paths are absolute (`/api/v1/accounts/...`) and resolved against the
///   service endpoint by the implementation
/// - A non-success status is reported as [`ClientError::Problem`] with the
///   response body
/// - Timeouts and connection resets are reported as their own variants so
///   the executor can retry them
#[async_trait]
pub trait RequestClient: Send + Sync {
    /// Issue a GET request and return the response body.
    async fn get(&self, path: &str) -> Result<Vec<u8>, ClientError>;

    /// Issue a POST request and return the response body.
    async fn post(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>, ClientError>;
}

#[async_trait]
impl<T: RequestClient + ?Sized> RequestClient for Arc<T> {
    async fn get(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        (**self).get(path).await
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        (**self).post(path, body).await
    }
}

/// Construction and signing of transactions.
pub trait TransactionBuilder: Send + Sync {
    /// Build a transaction creating and funding each target with `amount`.
    fn build_create_accounts(
        &self,
        funder: &KeyPair,
        sequence: u64,
        targets: &[Address],
        amount: Amount,
    ) -> Result<Transaction, TransactionError>;

    /// Build a transaction paying `amount` to each target.
    fn build_payment(
        &self,
        source: &KeyPair,
        sequence: u64,
        targets: &[Address],
        amount: Amount,
    ) -> Result<Transaction, TransactionError>;
}

impl<T: TransactionBuilder + ?Sized> TransactionBuilder for Arc<T> {
    fn build_create_accounts(
        &self,
        funder: &KeyPair,
        sequence: u64,
        targets: &[Address],
        amount: Amount,
    ) -> Result<Transaction, TransactionError> {
        (**self).build_create_accounts(funder, sequence, targets, amount)
    }

    fn build_payment(
        &self,
        source: &KeyPair,
        sequence: u64,
        targets: &[Address],
        amount: Amount,
    ) -> Result<Transaction, TransactionError> {
        (**self).build_payment(source, sequence, targets, amount)
    }
}

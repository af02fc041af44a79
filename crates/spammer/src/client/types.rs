//! Types for remote service communication.

use serde::{Deserialize, Serialize};
use surge_types::{Address, Hash};

/// Request paths of the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServicePaths {
    /// Root info endpoint.
    pub info: String,
    /// Account prefix; the address is appended.
    pub accounts: String,
    /// Transaction prefix; the hash is appended.
    pub transactions: String,
    /// Submission endpoint.
    pub submit: String,
}

impl Default for ServicePaths {
    fn default() -> Self {
        Self {
            info: "/".to_string(),
            accounts: "/api/v1/accounts".to_string(),
            transactions: "/api/v1/transactions".to_string(),
            submit: "/node/message".to_string(),
        }
    }
}

impl ServicePaths {
    /// Path of an account lookup.
    pub fn account(&self, address: &Address) -> String {
        join(&self.accounts, address.as_str())
    }

    /// Path of a transaction lookup.
    pub fn transaction(&self, hash: &Hash) -> String {
        join(&self.transactions, &hash.to_hex())
    }
}

fn join(prefix: &str, segment: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), segment)
}

/// Result of a transaction submission.
#[derive(Debug, Clone)]
pub struct SubmissionResult {
    /// The transaction hash.
    pub hash: Hash,
    /// Number of POST attempts, including the successful one.
    pub attempts: usize,
    /// Response body.
    pub body: Vec<u8>,
}

//! Response types of the remote service.
//!
//! Only the fields the harness reads are modelled; unknown fields are
//! ignored so newer service versions stay readable.

use crate::{Address, Amount, Hash};
use serde::{Deserialize, Serialize};

/// Root info endpoint response (`GET /`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    #[serde(default)]
    pub node: NodeSummary,
    pub policy: NetworkPolicy,
    #[serde(default)]
    pub block: BlockSummary,
}

/// Identity of the node that answered the info request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeSummary {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub state: String,
}

/// Network policy consumed once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkPolicy {
    /// Network identifier mixed into every signature.
    pub network_id: String,
    /// Fee charged per operation.
    pub base_fee: Amount,
    /// Minimum balance of a newly created account.
    pub base_reserve: Amount,
    /// Maximum number of operations in one transaction.
    pub operations_limit: usize,
    #[serde(default)]
    pub initial_balance: Amount,
    /// Block time as reported by the service; informational only.
    #[serde(default)]
    pub block_time: serde_json::Value,
}

/// Latest block as reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlockSummary {
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub total_txs: u64,
    #[serde(default)]
    pub total_ops: u64,
}

/// Account state (`GET /accounts/{address}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub address: Address,
    pub balance: Amount,
    pub sequence_id: u64,
}

/// Confirmed transaction (`GET /transactions/{hash}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub hash: Hash,
    #[serde(default)]
    pub source: Option<Address>,
    #[serde(default, alias = "sequenceid")]
    pub sequence_id: u64,
    #[serde(default)]
    pub operation_count: u64,
    #[serde(default)]
    pub fee: Amount,
    #[serde(default)]
    pub created: Option<String>,
}

//! Signed transactions submitted to the remote service.
//!
//! A transaction is a header/body pair. The body carries the source account,
//! its sequence number, the fee and the operations; the header carries the
//! Blake3 hash of the body and the source's signature over
//! `network_id || hash`.

use crate::{Address, Amount, Hash, KeyError, KeyPair, PublicKey, Signature};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Kind of a single operation inside a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    /// Create and fund a new account.
    CreateAccount,
    /// Pay an existing account.
    Payment,
}

/// Operation header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHeader {
    #[serde(rename = "type")]
    pub kind: OperationType,
}

/// Operation body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationBody {
    pub target: Address,
    pub amount: Amount,
}

/// One operation of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(rename = "H")]
    pub header: OperationHeader,
    #[serde(rename = "B")]
    pub body: OperationBody,
}

impl Operation {
    /// Build an operation of the given kind.
    pub fn new(kind: OperationType, target: Address, amount: Amount) -> Self {
        Self {
            header: OperationHeader { kind },
            body: OperationBody { target, amount },
        }
    }
}

/// The signed part of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionBody {
    pub source: Address,
    pub fee: Amount,
    pub sequence_id: u64,
    pub operations: Vec<Operation>,
}

impl TransactionBody {
    /// Hash of the canonical JSON encoding of this body.
    pub fn hash(&self) -> Result<Hash, TransactionError> {
        let bytes = serde_json::to_vec(self)?;
        Ok(Hash::from_bytes(&bytes))
    }
}

/// Transaction header: body hash, signature and creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    pub hash: Hash,
    pub signature: Signature,
    pub created: String,
}

/// A signed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(rename = "H")]
    pub header: TransactionHeader,
    #[serde(rename = "B")]
    pub body: TransactionBody,
}

impl Transaction {
    /// Hash and sign a body with the source keypair.
    pub fn sign(
        body: TransactionBody,
        keypair: &KeyPair,
        network_id: &[u8],
    ) -> Result<Self, TransactionError> {
        let hash = body.hash()?;
        let signature = keypair.sign(&signing_message(network_id, &hash));
        let created = humantime::format_rfc3339_nanos(SystemTime::now()).to_string();

        Ok(Self {
            header: TransactionHeader {
                hash,
                signature,
                created,
            },
            body,
        })
    }

    /// Transaction hash.
    pub fn hash(&self) -> Hash {
        self.header.hash
    }

    /// Encode for `POST /message`.
    pub fn serialize(&self) -> Result<Vec<u8>, TransactionError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a submitted transaction.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, TransactionError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Check the body hash and the source signature.
    pub fn verify(&self, network_id: &[u8]) -> Result<(), TransactionError> {
        if self.body.hash()? != self.header.hash {
            return Err(TransactionError::HashMismatch);
        }
        let pk = PublicKey::from_address(&self.body.source)?;
        if !pk.verify(
            &signing_message(network_id, &self.header.hash),
            &self.header.signature,
        ) {
            return Err(TransactionError::BadSignature);
        }
        Ok(())
    }

    /// Sum of all operation amounts.
    pub fn total_amount(&self) -> Option<Amount> {
        self.body
            .operations
            .iter()
            .try_fold(Amount::ZERO, |acc, op| acc.checked_add(op.body.amount))
    }
}

/// Message signed by the source: `network_id || hash`.
pub fn signing_message(network_id: &[u8], hash: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(network_id.len() + Hash::BYTES);
    message.extend_from_slice(network_id);
    message.extend_from_slice(hash.as_bytes());
    message
}

/// Errors building or checking transactions.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("Transaction encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Transaction hash does not match its body")]
    HashMismatch,

    #[error("Transaction signature is invalid")]
    BadSignature,

    #[error("Transaction fee overflows")]
    FeeOverflow,

    #[error(transparent)]
    Key(#[from] KeyError),
}

//! Core types for the surge payment load harness.
//!
//! This crate holds everything shared between the load generator and the
//! offline analyzer:
//!
//! - **Identity**: [`KeyPair`], [`Address`], [`Amount`], [`Hash`]
//! - **Transactions**: the signed [`Transaction`] wire format
//! - **Remote service**: [`NodeInfo`], [`AccountState`], [`TransactionRecord`]
//! - **Result log**: the [`Event`] union written one per line
//! - **Failures**: [`ErrorKind`] and the raw-payload [`classify`] function

mod crypto;
mod error_kind;
mod event;
mod hash;
mod identifiers;
mod node;
mod transaction;

pub use crypto::{KeyError, KeyPair, PublicKey, Signature};
pub use error_kind::{
    classify, ErrorKind, PayloadShape, CONNECTION_RESET_ERRNOS, HTTP_PROBLEM_CODE, REMOTE_FAULTS,
};
pub use event::{elapsed, rfc3339, CreateAccountsRecord, Event, PaymentRecord, RunConfig};
pub use hash::{Hash, HexError};
pub use identifiers::{short_addresses, Address, Amount};
pub use node::{AccountState, BlockSummary, NetworkPolicy, NodeInfo, NodeSummary, TransactionRecord};
pub use transaction::{
    signing_message, Operation, OperationBody, OperationHeader, OperationType, Transaction,
    TransactionBody, TransactionError, TransactionHeader,
};

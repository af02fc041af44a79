//! Default [`TransactionBuilder`]: signs with ed25519 under the network id.

use crate::TransactionBuilder;
use surge_types::{
    Address, Amount, KeyPair, NetworkPolicy, Operation, OperationType, Transaction,
    TransactionBody, TransactionError,
};

/// Builds transactions the remote service accepts.
///
/// The fee is `base_fee` per operation.
#[derive(Debug, Clone)]
pub struct SigningBuilder {
    network_id: Vec<u8>,
    base_fee: Amount,
}

impl SigningBuilder {
    pub fn new(network_id: impl Into<Vec<u8>>, base_fee: Amount) -> Self {
        Self {
            network_id: network_id.into(),
            base_fee,
        }
    }

    /// Builder for the network described by a policy.
    pub fn from_policy(policy: &NetworkPolicy) -> Self {
        Self::new(policy.network_id.as_bytes(), policy.base_fee)
    }

    /// Network id mixed into signatures.
    pub fn network_id(&self) -> &[u8] {
        &self.network_id
    }

    fn build(
        &self,
        kind: OperationType,
        source: &KeyPair,
        sequence: u64,
        targets: &[Address],
        amount: Amount,
    ) -> Result<Transaction, TransactionError> {
        let fee = self
            .base_fee
            .checked_mul(targets.len() as u64)
            .ok_or(TransactionError::FeeOverflow)?;

        let body = TransactionBody {
            source: source.address(),
            fee,
            sequence_id: sequence,
            operations: targets
                .iter()
                .map(|target| Operation::new(kind, target.clone(), amount))
                .collect(),
        };
        Transaction::sign(body, source, &self.network_id)
    }
}

impl TransactionBuilder for SigningBuilder {
    fn build_create_accounts(
        &self,
        funder: &KeyPair,
        sequence: u64,
        targets: &[Address],
        amount: Amount,
    ) -> Result<Transaction, TransactionError> {
        self.build(OperationType::CreateAccount, funder, sequence, targets, amount)
    }

    fn build_payment(
        &self,
        source: &KeyPair,
        sequence: u64,
        targets: &[Address],
        amount: Amount,
    ) -> Result<Transaction, TransactionError> {
        self.build(OperationType::Payment, source, sequence, targets, amount)
    }
}

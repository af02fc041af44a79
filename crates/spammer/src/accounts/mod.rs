//! Account pool for payment generation.
//!
//! The pool is built once, after all funding batches are confirmed, and is
//! read-only afterwards. It keeps the created addresses in creation order,
//! their keypairs, and for each address the list of every other created
//! address (its eligible payment targets).

mod funding;

pub use funding::{create_accounts, FundingError, FundingPlan, FUNDING_POLL_INTERVAL};

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use surge_types::{Address, KeyPair};

/// Errors selecting accounts from the pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountPoolError {
    #[error("Address {0} is not in the pool")]
    UnknownAddress(Address),

    #[error("Address {0} has no eligible targets")]
    NoTargets(Address),

    #[error("Address {address} needs {needed} targets but only {available} exist")]
    NotEnoughTargets {
        address: Address,
        needed: usize,
        available: usize,
    },
}

/// Created accounts and their eligible targets.
pub struct AccountPool {
    addresses: Vec<Address>,
    keys: HashMap<Address, KeyPair>,
    targets: HashMap<Address, Vec<Address>>,
}

impl AccountPool {
    /// Build the pool from created keypairs, in creation order.
    ///
    /// Duplicate addresses are kept once.
    pub fn from_keypairs(keypairs: impl IntoIterator<Item = KeyPair>) -> Self {
        let mut addresses = Vec::new();
        let mut keys = HashMap::new();
        for keypair in keypairs {
            let address = keypair.address();
            if keys.contains_key(&address) {
                continue;
            }
            addresses.push(address.clone());
            keys.insert(address, keypair);
        }

        let targets = addresses
            .iter()
            .map(|address| {
                let others = addresses
                    .iter()
                    .filter(|other| *other != address)
                    .cloned()
                    .collect();
                (address.clone(), others)
            })
            .collect();

        Self {
            addresses,
            keys,
            targets,
        }
    }

    /// Created addresses in creation order.
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn keypair(&self, address: &Address) -> Option<&KeyPair> {
        self.keys.get(address)
    }

    /// Every created address except `address`.
    pub fn eligible_targets(&self, address: &Address) -> &[Address] {
        self.targets.get(address).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Pick `count` distinct targets for `source`, uniformly without replacement.
    pub fn pick_targets<R: Rng + ?Sized>(
        &self,
        source: &Address,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<Address>, AccountPoolError> {
        let eligible = self
            .targets
            .get(source)
            .ok_or_else(|| AccountPoolError::UnknownAddress(source.clone()))?;
        if eligible.is_empty() {
            return Err(AccountPoolError::NoTargets(source.clone()));
        }
        if eligible.len() < count {
            return Err(AccountPoolError::NotEnoughTargets {
                address: source.clone(),
                needed: count,
                available: eligible.len(),
            });
        }
        Ok(eligible.choose_multiple(rng, count).cloned().collect())
    }
}

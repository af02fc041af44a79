//! Payment request executor.

use super::{Outcome, Workload};
use crate::accounts::{AccountPool, AccountPoolError, FUNDING_POLL_INTERVAL};
use crate::client::{RemoteClient, RemoteError};
use crate::results::ResultRecorder;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use surge_core::TransactionBuilder;
use surge_types::{
    Address, Amount, ErrorKind, Event, Hash, NetworkPolicy, PaymentRecord, TransactionError,
};
use tracing::{debug, warn};

/// Attempts to pick targets before giving up on an address.
pub const TARGET_PICK_ATTEMPTS: usize = 3;

/// Why a payment request did not confirm.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Targets(#[from] AccountPoolError),

    #[error("No keypair for {0}")]
    UnknownSource(Address),

    #[error("Insufficient balance: balance={balance} required={required}")]
    InsufficientBalance { balance: Amount, required: Amount },

    #[error("Failed to build payment: {0}")]
    Build(#[from] TransactionError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Transaction {hash} not confirmed within {}", humantime::format_duration(*waited))]
    ConfirmationTimeout { hash: Hash, waited: Duration },
}

impl ExecutionError {
    /// JSON payload recorded in the result log.
    pub fn raw_payload(&self) -> Value {
        let condition = match self {
            ExecutionError::Remote(err) => return err.raw_payload(),
            ExecutionError::Targets(_) => "no-targets",
            ExecutionError::UnknownSource(_) => "unknown-source",
            ExecutionError::InsufficientBalance { .. } => "insufficient-balance",
            ExecutionError::Build(_) => "build-failed",
            ExecutionError::ConfirmationTimeout { .. } => "confirmation-timeout",
        };
        json!({ "message": self.to_string(), "condition": condition })
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::Remote(err) => err.kind(),
            _ => ErrorKind::Unknown,
        }
    }

    /// Whether the source address must be retired.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionError::Targets(_)
                | ExecutionError::UnknownSource(_)
                | ExecutionError::InsufficientBalance { .. }
        )
    }
}

/// Issues one payment per call and records it.
pub struct RequestExecutor {
    remote: RemoteClient,
    builder: Arc<dyn TransactionBuilder>,
    pool: Arc<AccountPool>,
    recorder: Arc<ResultRecorder>,

    /// Base fee of the network.
    base_fee: Amount,

    /// Operations (targets) per payment.
    operations: usize,

    /// Amount paid to each target.
    amount: Amount,

    /// How long to wait for a payment to be confirmed.
    confirm_duration: Duration,

    /// Interval between confirmation lookups.
    poll_interval: Duration,

    rng: Mutex<ChaCha8Rng>,
}

impl RequestExecutor {
    pub fn new(
        remote: RemoteClient,
        builder: Arc<dyn TransactionBuilder>,
        pool: Arc<AccountPool>,
        recorder: Arc<ResultRecorder>,
        policy: &NetworkPolicy,
    ) -> Self {
        Self {
            remote,
            builder,
            pool,
            recorder,
            base_fee: policy.base_fee,
            operations: 1,
            amount: Amount(1),
            confirm_duration: Duration::from_secs(60),
            poll_interval: FUNDING_POLL_INTERVAL,
            rng: Mutex::new(ChaCha8Rng::from_entropy()),
        }
    }

    pub fn with_operations(mut self, operations: usize) -> Self {
        self.operations = operations;
        self
    }

    pub fn with_amount(mut self, amount: Amount) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_confirm_duration(mut self, duration: Duration) -> Self {
        self.confirm_duration = duration;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Seed target selection for reproducible runs.
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = ChaCha8Rng::seed_from_u64(seed);
        self
    }

    /// Balance a source needs for a payment with `operations` targets:
    /// `(base_fee + base_fee) * operations`.
    pub fn required_balance(&self, operations: usize) -> Amount {
        Amount(
            self.base_fee
                .get()
                .saturating_mul(2)
                .saturating_mul(operations as u64),
        )
    }

    /// Issue one payment from `source` to `operations` random targets.
    ///
    /// Records exactly one `payment` event unless no targets could be
    /// picked or the source is unknown.
    pub async fn execute(&self, source: &Address, operations: usize) -> Outcome {
        let targets = match self.pick_targets(source, operations).await {
            Ok(targets) => targets,
            Err(e) => {
                warn!(address = %source.short(), error = %e, "Cannot pick payment targets");
                return Outcome::Retired;
            }
        };

        let mut started = None;
        let result = self.pay(source, &targets, &mut started).await;
        let elapsed = started.map(|s: Instant| s.elapsed()).unwrap_or_default();

        if let Err(ExecutionError::UnknownSource(_)) = &result {
            warn!(address = %source.short(), "Source has no keypair");
            return Outcome::Retired;
        }

        let error = result.as_ref().err().map(ExecutionError::raw_payload);
        let event = Event::Payment(PaymentRecord {
            time: SystemTime::now(),
            elapsed,
            count: targets.len(),
            addresses: targets,
            amount: self.amount,
            source: source.clone(),
            error,
        });
        if let Err(e) = self.recorder.append(&event) {
            warn!(error = %e, "Failed to record payment");
        }

        match result {
            Ok(hash) => {
                debug!(address = %source.short(), %hash, elapsed = ?elapsed, "Payment confirmed");
                Outcome::Confirmed
            }
            Err(e) if e.is_terminal() => {
                debug!(address = %source.short(), reason = %e, "Stop requests");
                Outcome::Retired
            }
            Err(e) => {
                debug!(address = %source.short(), kind = %e.kind(), error = %e, "Payment failed");
                Outcome::Failed(e.kind())
            }
        }
    }

    async fn pick_targets(
        &self,
        source: &Address,
        operations: usize,
    ) -> Result<Vec<Address>, AccountPoolError> {
        let mut attempt = 1;
        loop {
            let picked = {
                let mut rng = self.rng.lock();
                self.pool.pick_targets(source, operations, &mut *rng)
            };
            match picked {
                Err(AccountPoolError::NoTargets(_)) if attempt < TARGET_PICK_ATTEMPTS => {
                    attempt += 1;
                    tokio::task::yield_now().await;
                }
                other => return other,
            }
        }
    }

    async fn pay(
        &self,
        source: &Address,
        targets: &[Address],
        started: &mut Option<Instant>,
    ) -> Result<Hash, ExecutionError> {
        let keypair = self
            .pool
            .keypair(source)
            .ok_or_else(|| ExecutionError::UnknownSource(source.clone()))?;

        let account = self.remote.get_account(source).await?;
        let required = self.required_balance(targets.len());
        if account.balance < required {
            return Err(ExecutionError::InsufficientBalance {
                balance: account.balance,
                required,
            });
        }

        *started = Some(Instant::now());
        let tx = self
            .builder
            .build_payment(keypair, account.sequence_id, targets, self.amount)?;
        let submission = self.remote.submit(&tx).await?;

        tokio::time::timeout(
            self.confirm_duration,
            self.remote
                .wait_for_confirmation(&submission.hash, self.poll_interval),
        )
        .await
        .map(|record| record.hash)
        .map_err(|_| ExecutionError::ConfirmationTimeout {
            hash: submission.hash,
            waited: self.confirm_duration,
        })
    }
}

#[async_trait]
impl Workload for RequestExecutor {
    async fn run(&self, source: Address) -> Outcome {
        self.execute(&source, self.operations).await
    }
}

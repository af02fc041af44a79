//! Account creation from the funding account.

use super::AccountPool;
use crate::client::{RemoteClient, RemoteError};
use crate::results::{RecorderError, ResultRecorder};
use serde_json::{json, Value};
use std::time::{Duration, Instant, SystemTime};
use surge_core::TransactionBuilder;
use surge_types::{
    Address, Amount, CreateAccountsRecord, Event, KeyPair, NetworkPolicy, TransactionError,
};
use tracing::{debug, info, warn};

/// Interval between confirmation lookups.
pub const FUNDING_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Errors during account creation. All of them abort the run.
#[derive(Debug, thiserror::Error)]
pub enum FundingError {
    #[error("Network operations limit must be at least 1")]
    InvalidBatchLimit,

    #[error("Funding amount {amount} is below the base reserve {reserve}")]
    ReserveTooLow { amount: Amount, reserve: Amount },

    #[error("Funding amount overflows")]
    AmountOverflow,

    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Failed to build create-accounts transaction: {0}")]
    Build(#[from] TransactionError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),
}

impl FundingError {
    fn raw_payload(&self) -> Value {
        match self {
            FundingError::Remote(err) => err.raw_payload(),
            other => json!({ "message": other.to_string() }),
        }
    }
}

/// How many accounts to create and how to fund them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingPlan {
    /// Accounts to create in total.
    pub total: usize,
    /// Maximum accounts per create-accounts transaction.
    pub per_batch: usize,
    /// Starting balance of each account.
    pub amount: Amount,
    /// Interval between confirmation lookups.
    pub poll_interval: Duration,
}

impl FundingPlan {
    /// Plan funding each account with `reserve_multiple` base reserves.
    pub fn for_policy(
        total: usize,
        policy: &NetworkPolicy,
        reserve_multiple: u64,
    ) -> Result<Self, FundingError> {
        if policy.operations_limit == 0 {
            return Err(FundingError::InvalidBatchLimit);
        }
        let amount = policy
            .base_reserve
            .checked_mul(reserve_multiple)
            .ok_or(FundingError::AmountOverflow)?;
        if amount < policy.base_reserve || amount == Amount::ZERO {
            return Err(FundingError::ReserveTooLow {
                amount,
                reserve: policy.base_reserve,
            });
        }

        Ok(Self {
            total,
            per_batch: policy.operations_limit,
            amount,
            poll_interval: FUNDING_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sizes of the batches: `ceil(total / per_batch)` of them, the last one
    /// holding the remainder.
    pub fn batch_sizes(&self) -> Vec<usize> {
        if self.per_batch == 0 {
            return Vec::new();
        }
        let mut sizes = vec![self.per_batch; self.total / self.per_batch];
        if self.total % self.per_batch > 0 {
            sizes.push(self.total % self.per_batch);
        }
        sizes
    }
}

/// Create and fund accounts batch by batch, waiting for each batch to be
/// confirmed before starting the next.
///
/// Every batch is recorded as a `create-accounts` event, including a failed
/// one. Confirmation polling has no deadline.
pub async fn create_accounts(
    remote: &RemoteClient,
    builder: &dyn TransactionBuilder,
    funder: &KeyPair,
    plan: &FundingPlan,
    recorder: &ResultRecorder,
) -> Result<AccountPool, FundingError> {
    let batches = plan.batch_sizes();
    let mut created = Vec::with_capacity(plan.total);

    for (index, size) in batches.iter().copied().enumerate() {
        let keypairs: Vec<KeyPair> = (0..size).map(|_| KeyPair::generate()).collect();
        let targets: Vec<Address> = keypairs.iter().map(KeyPair::address).collect();
        debug!(
            batch = index + 1,
            count = size,
            amount = %plan.amount,
            "Creating accounts"
        );

        let started = Instant::now();
        let result = fund_batch(remote, builder, funder, &targets, plan).await;
        let elapsed = started.elapsed();

        recorder.append(&Event::CreateAccounts(CreateAccountsRecord {
            time: SystemTime::now(),
            elapsed,
            count: size,
            addresses: targets,
            error: result.as_ref().err().map(FundingError::raw_payload),
        }))?;

        if let Err(e) = result {
            warn!(batch = index + 1, error = %e, "Account creation failed");
            return Err(e);
        }
        created.extend(keypairs);
        info!(
            batch = index + 1,
            batches = batches.len(),
            created = created.len(),
            elapsed = ?elapsed,
            "Accounts created"
        );
    }

    Ok(AccountPool::from_keypairs(created))
}

async fn fund_batch(
    remote: &RemoteClient,
    builder: &dyn TransactionBuilder,
    funder: &KeyPair,
    targets: &[Address],
    plan: &FundingPlan,
) -> Result<(), FundingError> {
    let account = remote.get_account(&funder.address()).await?;
    let tx = builder.build_create_accounts(funder, account.sequence_id, targets, plan.amount)?;
    let submission = remote.submit(&tx).await?;
    remote
        .wait_for_confirmation(&submission.hash, plan.poll_interval)
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ServicePaths;
    use std::sync::Arc;
    use surge_core::SigningBuilder;
    use surge_test_helpers::{test_policy, Fault, MockService};
    use surge_types::RunConfig;

    fn plan(total: usize, per_batch: usize) -> FundingPlan {
        let policy = NetworkPolicy {
            operations_limit: per_batch,
            ..test_policy()
        };
        FundingPlan::for_policy(total, &policy, 100)
            .unwrap()
            .with_poll_interval(Duration::from_millis(1))
    }

    fn recorder(dir: &tempfile::TempDir, mock: &MockService) -> ResultRecorder {
        let path = dir.path().join("result.log");
        ResultRecorder::open(
            &path,
            RunConfig {
                node: mock.node_info(),
                concurrency: 1,
                init_account: Address::new("funder"),
                timeout: Duration::from_secs(1),
                request_timeout: Duration::from_secs(1),
                confirm_duration: Duration::from_secs(1),
                result_output: path.display().to_string(),
                operations: 1,
            },
        )
        .unwrap()
    }

    fn events(recorder: &ResultRecorder) -> Vec<Event> {
        std::fs::read_to_string(recorder.path())
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_batch_sizes() {
        assert_eq!(plan(11, 4).batch_sizes(), vec![4, 4, 3]);
        assert_eq!(plan(8, 4).batch_sizes(), vec![4, 4]);
        assert_eq!(plan(3, 100).batch_sizes(), vec![3]);
        assert!(plan(0, 4).batch_sizes().is_empty());
    }

    #[test]
    fn test_plan_validation() {
        let zero_limit = NetworkPolicy {
            operations_limit: 0,
            ..test_policy()
        };
        assert!(matches!(
            FundingPlan::for_policy(3, &zero_limit, 100),
            Err(FundingError::InvalidBatchLimit)
        ));
        assert!(matches!(
            FundingPlan::for_policy(3, &test_policy(), 0),
            Err(FundingError::ReserveTooLow { .. })
        ));
        assert_eq!(
            FundingPlan::for_policy(3, &test_policy(), 100).unwrap().amount,
            Amount(100_000_000)
        );
    }

    #[tokio::test]
    async fn test_create_accounts_in_batches() {
        let funder = KeyPair::from_seed(&[3; 32]);
        let mock = Arc::new(
            MockService::new().with_account(funder.address(), Amount(10_000_000_000)),
        );
        let remote = RemoteClient::new(mock.clone(), ServicePaths::default());
        let builder = SigningBuilder::from_policy(&mock.policy());
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder(&dir, &mock);

        let pool = create_accounts(&remote, &builder, &funder, &plan(5, 2), &recorder)
            .await
            .unwrap();

        assert_eq!(pool.len(), 5);
        assert_eq!(mock.submitted().len(), 3);
        for address in pool.addresses() {
            assert_eq!(mock.account(address).unwrap().balance, Amount(100_000_000));
        }

        let batches: Vec<_> = events(&recorder)
            .into_iter()
            .filter_map(|event| match event {
                Event::CreateAccounts(record) => Some(record),
                _ => None,
            })
            .collect();
        assert_eq!(
            batches.iter().map(|b| b.count).collect::<Vec<_>>(),
            vec![2, 2, 1]
        );
        assert!(batches.iter().all(|b| b.error.is_none()));
    }

    #[tokio::test]
    async fn test_failed_batch_is_recorded_and_fatal() {
        let funder = KeyPair::from_seed(&[3; 32]);
        let mock = Arc::new(
            MockService::new()
                .with_account(funder.address(), Amount(10_000_000_000))
                .with_post_faults([Fault::ServerError]),
        );
        let remote = RemoteClient::new(mock.clone(), ServicePaths::default());
        let builder = SigningBuilder::from_policy(&mock.policy());
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder(&dir, &mock);

        let err = create_accounts(&remote, &builder, &funder, &plan(3, 2), &recorder)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, FundingError::Remote(_)));

        let recorded = events(&recorder);
        assert_eq!(recorded.len(), 2);
        let Event::CreateAccounts(record) = &recorded[1] else {
            panic!("expected create-accounts");
        };
        assert_eq!(record.count, 2);
        assert_eq!(record.error.as_ref().unwrap()["data"]["status"], 500);
    }

    #[tokio::test]
    async fn test_confirmation_polled_until_visible() {
        let funder = KeyPair::from_seed(&[3; 32]);
        let mock = Arc::new(
            MockService::new()
                .with_account(funder.address(), Amount(10_000_000_000))
                .with_missed_confirmations(3),
        );
        let remote = RemoteClient::new(mock.clone(), ServicePaths::default());
        let builder = SigningBuilder::from_policy(&mock.policy());
        let dir = tempfile::tempdir().unwrap();
        let recorder = recorder(&dir, &mock);

        create_accounts(&remote, &builder, &funder, &plan(1, 10), &recorder)
            .await
            .unwrap();
        // one account lookup, three misses, one hit
        assert_eq!(mock.get_count(), 5);
    }
}

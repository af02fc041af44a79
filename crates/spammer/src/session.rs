//! A complete load run.
//!
//! [`Spammer::run`] performs the setup steps in order, any of which aborts
//! the run, and then hands over to the [`LoadEngine`]:
//!
//! 1. fetch node info and the network policy
//! 2. check the funding account exists and holds a balance
//! 3. open the result log and write the `config` line
//! 4. create and fund `max(concurrency, operations) + 1` accounts
//! 5. write `started`, run the engine until drained, write `ended`

use crate::accounts::{create_accounts, FundingError, FundingPlan};
use crate::client::{HttpClient, RemoteClient, RemoteError};
use crate::config::{ConfigError, SpammerConfig};
use crate::results::{RecorderError, ResultRecorder};
use crate::runner::{ActiveSet, EngineConfig, EngineError, EngineReport, LoadEngine};
use crate::workloads::RequestExecutor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use surge_core::{RequestClient, SigningBuilder, TransactionBuilder};
use surge_types::{Address, KeyPair, NodeInfo, RunConfig};
use tracing::{info, warn};

/// Setup failures. Each one aborts the run before or instead of load.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to fetch node info: {0}")]
    NodeInfo(#[source] RemoteError),

    #[error("Failed to create client: {0}")]
    Client(#[source] RemoteError),

    #[error("Funding account {address} not found: {source}")]
    FunderUnavailable {
        address: Address,
        #[source]
        source: RemoteError,
    },

    #[error("Funding account {0} has no balance")]
    FunderEmpty(Address),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("Failed to create accounts: {0}")]
    Funding(#[from] FundingError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub result_path: PathBuf,
    pub node: NodeInfo,
    pub accounts_created: usize,
    pub engine: EngineReport,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn print(&self) {
        println!("\n=== Run Summary ===");
        println!("Result log:        {}", self.result_path.display());
        println!("Network:           {}", self.node.policy.network_id);
        println!("Accounts created:  {}", self.accounts_created);
        println!("Requests:          {}", self.engine.admitted);
        println!("  Confirmed:       {}", self.engine.confirmed);
        println!("  Failed:          {}", self.engine.failed);
        println!("Retired accounts:  {}", self.engine.retired);
        println!("Max in flight:     {}", self.engine.max_active);
        println!(
            "Load duration:     {}",
            humantime::format_duration(round_millis(self.engine.elapsed))
        );
        println!(
            "Total duration:    {}",
            humantime::format_duration(round_millis(self.elapsed))
        );
    }
}

fn round_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

/// Orchestrates one load run against a remote service.
pub struct Spammer {
    config: SpammerConfig,
    client: Arc<dyn RequestClient>,
    funder: KeyPair,
}

impl Spammer {
    /// Create a spammer over an existing request client.
    pub fn new(
        config: SpammerConfig,
        client: Arc<dyn RequestClient>,
        funder: KeyPair,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            client,
            funder,
        })
    }

    /// Create a spammer talking HTTP to `config.endpoint`.
    pub fn connect(config: SpammerConfig, funder: KeyPair) -> Result<Self, SessionError> {
        let client = HttpClient::new(&config.endpoint, config.request_timeout)
            .map_err(SessionError::Client)?;
        Self::new(config, Arc::new(client), funder)
    }

    pub fn config(&self) -> &SpammerConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<RunSummary, SessionError> {
        let started = Instant::now();
        let remote = RemoteClient::new(Arc::clone(&self.client), self.config.paths.clone());

        let node = remote.node_info().await.map_err(SessionError::NodeInfo)?;
        info!(
            endpoint = %self.config.endpoint,
            network = %node.policy.network_id,
            base_fee = %node.policy.base_fee,
            base_reserve = %node.policy.base_reserve,
            operations_limit = node.policy.operations_limit,
            "Connected"
        );

        self.check_funder(&remote).await?;

        let result_path = self.config.result_path();
        let recorder = Arc::new(ResultRecorder::open(
            &result_path,
            self.run_config(&node, &result_path),
        )?);

        let builder: Arc<dyn TransactionBuilder> = Arc::new(SigningBuilder::from_policy(&node.policy));
        let plan = FundingPlan::for_policy(
            self.config.accounts_needed(),
            &node.policy,
            self.config.reserve_multiple,
        )?
        .with_poll_interval(self.config.poll_interval);
        info!(
            accounts = plan.total,
            per_batch = plan.per_batch,
            amount = %plan.amount,
            "Creating accounts"
        );
        let pool = Arc::new(
            create_accounts(&remote, &*builder, &self.funder, &plan, &recorder).await?,
        );

        let mut executor = RequestExecutor::new(
            remote,
            builder,
            Arc::clone(&pool),
            Arc::clone(&recorder),
            &node.policy,
        )
        .with_operations(self.config.operations)
        .with_amount(self.config.payment_amount)
        .with_confirm_duration(self.config.confirm_duration)
        .with_poll_interval(self.config.poll_interval);
        if let Some(seed) = self.config.seed {
            executor = executor.with_seed(seed);
        }

        let engine = LoadEngine::new(
            Arc::new(executor),
            pool.addresses().to_vec(),
            Arc::new(ActiveSet::new()),
            EngineConfig::new(self.config.concurrency, self.config.timeout)
                .with_monitor_interval(self.config.monitor_interval),
        )?;

        recorder.started()?;
        info!(
            concurrency = self.config.concurrency,
            timeout = %humantime::format_duration(self.config.timeout),
            "Started"
        );
        let report = engine.run().await;
        recorder.ended()?;
        recorder.close()?;
        info!(path = %result_path.display(), "Ended");

        Ok(RunSummary {
            result_path,
            node,
            accounts_created: pool.len(),
            engine: report,
            elapsed: started.elapsed(),
        })
    }

    async fn check_funder(&self, remote: &RemoteClient) -> Result<(), SessionError> {
        let address = self.funder.address();
        let account = remote
            .get_account(&address)
            .await
            .map_err(|source| SessionError::FunderUnavailable {
                address: address.clone(),
                source,
            })?;
        if account.balance.get() == 0 {
            warn!(address = %address.short(), "Funding account is empty");
            return Err(SessionError::FunderEmpty(address));
        }
        info!(address = %address.short(), balance = %account.balance, "Funding account");
        Ok(())
    }

    fn run_config(&self, node: &NodeInfo, result_path: &std::path::Path) -> RunConfig {
        RunConfig {
            node: node.clone(),
            concurrency: self.config.concurrency,
            init_account: self.funder.address(),
            timeout: self.config.timeout,
            request_timeout: self.config.request_timeout,
            confirm_duration: self.config.confirm_duration,
            result_output: result_path.display().to_string(),
            operations: self.config.operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_test_helpers::MockService;
    use surge_types::{Amount, Event};
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> SpammerConfig {
        SpammerConfig::default()
            .with_concurrency(2)
            .with_timeout(Duration::from_secs(1))
            .with_poll_interval(Duration::from_millis(10))
            .with_result_output(dir.path().join("result.log"))
            .with_seed(7)
    }

    fn read_events(path: &std::path::Path) -> Vec<Event> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_run_writes_log() {
        let dir = TempDir::new().unwrap();
        let funder = KeyPair::from_seed(&[9; 32]);
        let mock = Arc::new(
            MockService::new()
                .with_account(funder.address(), Amount(10_000_000_000))
                .with_latency(Duration::from_millis(10)),
        );

        let spammer = Spammer::new(config(&dir), mock.clone(), funder).unwrap();
        let summary = spammer.run().await.unwrap();

        assert_eq!(summary.accounts_created, 3);
        assert!(summary.engine.confirmed > 0);
        assert_eq!(summary.engine.failed, 0);
        assert!(summary.engine.max_active <= 2);
        // funder plus the created accounts
        assert_eq!(mock.account_count(), 4);

        let events = read_events(&summary.result_path);
        assert_eq!(events[0].type_name(), "config");
        assert_eq!(events[1].type_name(), "create-accounts");
        assert_eq!(events[2].type_name(), "started");
        assert_eq!(events.last().unwrap().type_name(), "ended");

        let payments: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::Payment(record) => Some(record),
                _ => None,
            })
            .collect();
        assert_eq!(payments.len() as u64, summary.engine.admitted);
        assert!(payments.iter().all(|p| !p.is_failure()));
        assert!(payments.iter().all(|p| !p.addresses.contains(&p.source)));

        let Event::Config { config, .. } = &events[0] else {
            panic!("first event is not config");
        };
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.node.policy, mock.policy());
    }

    #[tokio::test]
    async fn test_missing_funder_is_fatal() {
        let dir = TempDir::new().unwrap();
        let funder = KeyPair::from_seed(&[9; 32]);
        let mock = Arc::new(MockService::new());

        let err = Spammer::new(config(&dir), mock, funder)
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::FunderUnavailable { .. }));
        assert!(!dir.path().join("result.log").exists());
    }

    #[tokio::test]
    async fn test_empty_funder_is_fatal() {
        let dir = TempDir::new().unwrap();
        let funder = KeyPair::from_seed(&[9; 32]);
        let mock = Arc::new(MockService::new().with_account(funder.address(), Amount::ZERO));

        let err = Spammer::new(config(&dir), mock, funder)
            .unwrap()
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::FunderEmpty(_)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mock = Arc::new(MockService::new());
        let config = SpammerConfig::default().with_concurrency(0);
        assert!(matches!(
            Spammer::new(config, mock, KeyPair::from_seed(&[1; 32])),
            Err(SessionError::Config(_))
        ));
    }
}

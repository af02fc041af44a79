//! Spammer configuration.

use crate::client::ServicePaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use surge_types::Amount;

/// Default endpoint of the remote service.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:12345";

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Configuration for a load run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SpammerConfig {
    /// Base URL of the remote service.
    pub endpoint: String,

    /// Maximum payment requests in flight.
    pub concurrency: usize,

    /// How long to keep admitting requests.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Timeout of a single HTTP request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// How long a payment may wait for confirmation.
    #[serde(with = "humantime_serde")]
    pub confirm_duration: Duration,

    /// Operations per payment request.
    pub operations: usize,

    /// Result log path. Defaults to a timestamped file in the working directory.
    pub result_output: Option<PathBuf>,

    /// New accounts are funded with this many base reserves.
    pub reserve_multiple: u64,

    /// Amount paid to each target.
    pub payment_amount: Amount,

    /// Remote service paths.
    pub paths: ServicePaths,

    /// Interval between confirmation lookups.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Interval of the "actives" debug line.
    #[serde(with = "humantime_serde")]
    pub monitor_interval: Duration,

    /// Seed for target selection.
    pub seed: Option<u64>,
}

impl Default for SpammerConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            concurrency: 10,
            timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            confirm_duration: Duration::from_secs(60),
            operations: 1,
            result_output: None,
            reserve_multiple: 100,
            payment_amount: Amount(1),
            paths: ServicePaths::default(),
            poll_interval: Duration::from_millis(300),
            monitor_interval: Duration::from_secs(1),
            seed: None,
        }
    }
}

impl SpammerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_confirm_duration(mut self, duration: Duration) -> Self {
        self.confirm_duration = duration;
        self
    }

    pub fn with_operations(mut self, operations: usize) -> Self {
        self.operations = operations;
        self
    }

    pub fn with_result_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.result_output = Some(path.into());
        self
    }

    pub fn with_reserve_multiple(mut self, multiple: u64) -> Self {
        self.reserve_multiple = multiple;
        self
    }

    pub fn with_payment_amount(mut self, amount: Amount) -> Self {
        self.payment_amount = amount;
        self
    }

    pub fn with_paths(mut self, paths: ServicePaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Accounts to create: one per worker or per operation, whichever is
    /// larger, plus one so every source has a target.
    pub fn accounts_needed(&self) -> usize {
        self.concurrency.max(self.operations) + 1
    }

    /// Configured result log path, or `surge-result-<timestamp>.log`.
    pub fn result_path(&self) -> PathBuf {
        match &self.result_output {
            Some(path) => path.clone(),
            None => PathBuf::from(default_result_name(SystemTime::now())),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.operations == 0 {
            return Err(ConfigError::Invalid("operations must be at least 1".into()));
        }
        if self.reserve_multiple == 0 {
            return Err(ConfigError::Invalid(
                "reserve-multiple must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("timeout", self.timeout),
            ("request-timeout", self.request_timeout),
            ("confirm-duration", self.confirm_duration),
            ("poll-interval", self.poll_interval),
            ("monitor-interval", self.monitor_interval),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// `surge-result-YYYYmmddHHMMSS.log` for the given UTC time.
fn default_result_name(now: SystemTime) -> String {
    let stamp: String = humantime::format_rfc3339_seconds(now)
        .to_string()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    format!("surge-result-{stamp}.log")
}

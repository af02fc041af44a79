//! Payment load generator.
//!
//! Funds a pool of fresh accounts from one funding account, then keeps a
//! fixed number of payment requests in flight against the remote service
//! for a fixed time, recording every request to an append-only result log.
//!
//! # Example
//!
//! ```no_run
//! use surge_spammer::config::SpammerConfig;
//! use surge_spammer::session::Spammer;
//! use surge_types::KeyPair;
//! use std::time::Duration;
//!
//! # async fn example(funder: KeyPair) -> Result<(), Box<dyn std::error::Error>> {
//! let config = SpammerConfig::new("http://127.0.0.1:12345")
//!     .with_concurrency(50)
//!     .with_timeout(Duration::from_secs(300));
//!
//! let summary = Spammer::connect(config, funder)?.run().await?;
//! summary.print();
//! # Ok(())
//! # }
//! ```

pub mod accounts;
pub mod client;
pub mod config;
pub mod keygen;
pub mod logging;
pub mod results;
pub mod runner;
pub mod session;
pub mod workloads;

pub use accounts::AccountPool;
pub use client::{HttpClient, RemoteClient};
pub use config::SpammerConfig;
pub use results::ResultRecorder;
pub use runner::{ActiveSet, EngineState, LoadEngine};
pub use session::{RunSummary, Spammer};
pub use workloads::{Outcome, RequestExecutor, Workload};

//! Units of work driven by the load engine.

mod payment;

pub use payment::{ExecutionError, RequestExecutor, TARGET_PICK_ATTEMPTS};

use async_trait::async_trait;
use surge_types::{Address, ErrorKind};

/// Result of one unit of work for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The request was confirmed.
    Confirmed,
    /// The request failed; the address stays in rotation.
    Failed(ErrorKind),
    /// The address can no longer do work and leaves the rotation.
    Retired,
}

impl Outcome {
    /// Whether the address must not be re-admitted.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Outcome::Retired)
    }
}

/// Work performed on behalf of one address at a time.
#[async_trait]
pub trait Workload: Send + Sync + 'static {
    /// Do one unit of work for `source` and report how it went.
    async fn run(&self, source: Address) -> Outcome;
}

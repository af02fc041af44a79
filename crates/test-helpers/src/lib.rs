//! Test helpers for surge.
//!
//! [`MockService`] is an in-memory stand-in for the remote service. It
//! implements [`RequestClient`] directly, keeps a ledger of accounts and
//! confirmed transactions, verifies signatures on submission, and can be
//! told to fail the next N requests in specific ways.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use surge_core::{ClientError, Method, RequestClient};
use surge_types::{
    AccountState, Address, Amount, BlockSummary, Hash, KeyPair, NetworkPolicy, NodeInfo,
    NodeSummary, OperationType, Transaction, TransactionRecord,
};
use tracing::trace;

pub const ACCOUNTS_PREFIX: &str = "/api/v1/accounts/";
pub const TRANSACTIONS_PREFIX: &str = "/api/v1/transactions/";
pub const SUBMIT_PATH: &str = "/node/message";

/// Network policy used by [`MockService::new`].
pub fn test_policy() -> NetworkPolicy {
    NetworkPolicy {
        network_id: "surge-test-network".to_string(),
        base_fee: Amount(10_000),
        base_reserve: Amount(1_000_000),
        operations_limit: 100,
        initial_balance: Amount(10_000_000_000_000),
        block_time: json!("5s"),
    }
}

/// Deterministic keypairs for fixtures.
pub fn keypairs(count: usize) -> Vec<KeyPair> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[..8].copy_from_slice(&(i as u64 + 1).to_le_bytes());
            KeyPair::from_seed(&seed)
        })
        .collect()
}

/// Failure to inject into the next request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Transport timeout.
    Timeout,
    /// Connection reset by peer.
    Reset,
    /// Connection refused.
    Refused,
    /// Remote problem `139`: another transaction from the same source.
    Conflict,
    /// Remote problem `134`: unknown transaction.
    Missing,
    /// Plain server error without a problem body.
    ServerError,
}

#[derive(Default)]
struct Ledger {
    accounts: HashMap<Address, AccountState>,
    transactions: HashMap<Hash, TransactionRecord>,
    submitted: Vec<Transaction>,
}

/// In-memory remote service.
pub struct MockService {
    policy: NetworkPolicy,
    ledger: Mutex<Ledger>,
    get_faults: Mutex<VecDeque<Fault>>,
    post_faults: Mutex<VecDeque<Fault>>,
    latency: Duration,
    withhold_confirmations: bool,
    missed_confirmations: AtomicUsize,
    get_count: AtomicUsize,
    post_count: AtomicUsize,
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockService {
    pub fn new() -> Self {
        Self {
            policy: test_policy(),
            ledger: Mutex::new(Ledger::default()),
            get_faults: Mutex::new(VecDeque::new()),
            post_faults: Mutex::new(VecDeque::new()),
            latency: Duration::ZERO,
            withhold_confirmations: false,
            missed_confirmations: AtomicUsize::new(0),
            get_count: AtomicUsize::new(0),
            post_count: AtomicUsize::new(0),
        }
    }

    pub fn with_policy(mut self, policy: NetworkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Seed an existing account.
    pub fn with_account(self, address: Address, balance: Amount) -> Self {
        self.ledger.lock().accounts.insert(
            address.clone(),
            AccountState {
                address,
                balance,
                sequence_id: 0,
            },
        );
        self
    }

    /// Fail the next GET requests, one fault per request.
    pub fn with_get_faults(self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.get_faults.lock().extend(faults);
        self
    }

    /// Fail the next POST requests, one fault per request.
    pub fn with_post_faults(self, faults: impl IntoIterator<Item = Fault>) -> Self {
        self.post_faults.lock().extend(faults);
        self
    }

    /// Delay every request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Apply submissions but never report them as confirmed.
    pub fn with_withheld_confirmations(mut self) -> Self {
        self.withhold_confirmations = true;
        self
    }

    /// Report the next `count` transaction lookups as not found.
    pub fn with_missed_confirmations(self, count: usize) -> Self {
        self.missed_confirmations.store(count, Ordering::SeqCst);
        self
    }

    pub fn policy(&self) -> NetworkPolicy {
        self.policy.clone()
    }

    pub fn node_info(&self) -> NodeInfo {
        NodeInfo {
            node: NodeSummary {
                address: "mock-node".to_string(),
                endpoint: "http://127.0.0.1:12345".to_string(),
                state: "CONSENSUS".to_string(),
            },
            policy: self.policy.clone(),
            block: BlockSummary::default(),
        }
    }

    /// Current state of an account.
    pub fn account(&self, address: &Address) -> Option<AccountState> {
        self.ledger.lock().accounts.get(address).cloned()
    }

    pub fn account_count(&self) -> usize {
        self.ledger.lock().accounts.len()
    }

    /// Every transaction accepted so far, in submission order.
    pub fn submitted(&self) -> Vec<Transaction> {
        self.ledger.lock().submitted.clone()
    }

    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    pub fn post_count(&self) -> usize {
        self.post_count.load(Ordering::SeqCst)
    }

    /// Queue one more POST fault.
    pub fn push_post_fault(&self, fault: Fault) {
        self.post_faults.lock().push_back(fault);
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn handle_get(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        if path == "/" {
            return Ok(to_json(&self.node_info()));
        }

        let ledger = self.ledger.lock();
        if let Some(address) = path.strip_prefix(ACCOUNTS_PREFIX) {
            return match ledger.accounts.get(&Address::new(address)) {
                Some(account) => Ok(to_json(account)),
                None => Err(problem(404, "122", "account not found")),
            };
        }
        if let Some(hash) = path.strip_prefix(TRANSACTIONS_PREFIX) {
            if self.withhold_confirmations || self.take_missed_confirmation() {
                return Err(problem(404, "134", "transaction not found"));
            }
            let record = Hash::from_hex(hash)
                .ok()
                .and_then(|hash| ledger.transactions.get(&hash));
            return match record {
                Some(record) => Ok(to_json(record)),
                None => Err(problem(404, "134", "transaction not found")),
            };
        }
        Err(not_found())
    }

    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, ClientError> {
        if path != SUBMIT_PATH {
            return Err(not_found());
        }
        let tx = Transaction::deserialize(body)
            .map_err(|e| problem(400, "100", &format!("bad transaction: {e}")))?;
        tx.verify(self.policy.network_id.as_bytes())
            .map_err(|e| problem(400, "101", &e.to_string()))?;

        let mut ledger = self.ledger.lock();
        let record = apply(&mut ledger, &self.policy, &tx)?;
        trace!(hash = %tx.hash(), ops = tx.body.operations.len(), "Mock applied transaction");
        ledger.transactions.insert(tx.hash(), record.clone());
        ledger.submitted.push(tx);
        Ok(to_json(&record))
    }

    fn take_missed_confirmation(&self) -> bool {
        self.missed_confirmations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn next_fault(faults: &Mutex<VecDeque<Fault>>) -> Option<Fault> {
        faults.lock().pop_front()
    }
}

#[async_trait]
impl RequestClient for MockService {
    async fn get(&self, path: &str) -> Result<Vec<u8>, ClientError> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if let Some(fault) = Self::next_fault(&self.get_faults) {
            return Err(fault_error(fault, Method::Get, path));
        }
        self.handle_get(path)
    }

    async fn post(&self, path: &str, body: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        self.post_count.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if let Some(fault) = Self::next_fault(&self.post_faults) {
            return Err(fault_error(fault, Method::Post, path));
        }
        self.handle_post(path, &body)
    }
}

fn apply(
    ledger: &mut Ledger,
    policy: &NetworkPolicy,
    tx: &Transaction,
) -> Result<TransactionRecord, ClientError> {
    if ledger.transactions.contains_key(&tx.hash()) {
        return Err(problem(400, "139", "transaction already exists"));
    }
    let body = &tx.body;
    let source = ledger
        .accounts
        .get(&body.source)
        .cloned()
        .ok_or_else(|| problem(404, "122", "source account not found"))?;
    if source.sequence_id != body.sequence_id {
        return Err(problem(400, "139", "sequence id mismatch"));
    }

    let total = tx
        .total_amount()
        .and_then(|amount| amount.checked_add(body.fee))
        .ok_or_else(|| problem(400, "137", "amount overflow"))?;
    if source.balance < total {
        return Err(problem(400, "137", "insufficient balance"));
    }

    for op in &body.operations {
        let exists = ledger.accounts.contains_key(&op.body.target);
        match op.header.kind {
            OperationType::CreateAccount if exists => {
                return Err(problem(400, "125", "account already exists"));
            }
            OperationType::CreateAccount if op.body.amount < policy.base_reserve => {
                return Err(problem(400, "126", "amount below base reserve"));
            }
            OperationType::Payment if !exists => {
                return Err(problem(400, "122", "target account not found"));
            }
            _ => {}
        }
    }

    for op in &body.operations {
        let target = ledger
            .accounts
            .entry(op.body.target.clone())
            .or_insert_with(|| AccountState {
                address: op.body.target.clone(),
                balance: Amount::ZERO,
                sequence_id: 0,
            });
        target.balance = Amount(target.balance.get() + op.body.amount.get());
    }
    if let Some(source) = ledger.accounts.get_mut(&body.source) {
        source.balance = Amount(source.balance.get() - total.get());
        source.sequence_id += 1;
    }

    Ok(TransactionRecord {
        hash: tx.hash(),
        source: Some(body.source.clone()),
        sequence_id: body.sequence_id,
        operation_count: body.operations.len() as u64,
        fee: body.fee,
        created: Some(tx.header.created.clone()),
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

fn problem(status: u16, code: &str, title: &str) -> ClientError {
    ClientError::Problem {
        status,
        body: json!({
            "type": format!("https://surge.test/error/{code}"),
            "title": title,
        })
        .to_string(),
    }
}

fn not_found() -> ClientError {
    ClientError::Problem {
        status: 404,
        body: "404 page not found".to_string(),
    }
}

fn fault_error(fault: Fault, op: Method, path: &str) -> ClientError {
    let url = format!("http://mock{path}");
    match fault {
        Fault::Timeout => ClientError::Timeout {
            op,
            url,
            message: "operation timed out".to_string(),
        },
        Fault::Reset => ClientError::ConnectionReset {
            op,
            url,
            errno: 104,
        },
        Fault::Refused => ClientError::Transport {
            op,
            url,
            message: "connection refused".to_string(),
        },
        Fault::Conflict => problem(400, "139", "another transaction from this source is pending"),
        Fault::Missing => problem(404, "134", "transaction not found"),
        Fault::ServerError => ClientError::Problem {
            status: 500,
            body: "internal error".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surge_core::{SigningBuilder, TransactionBuilder};
    use surge_types::ErrorKind;

    #[tokio::test]
    async fn test_create_then_pay() {
        let keys = keypairs(3);
        let funder = &keys[0];
        let mock = MockService::new().with_account(funder.address(), Amount(100_000_000));
        let builder = SigningBuilder::from_policy(&mock.policy());
        let targets = vec![keys[1].address(), keys[2].address()];

        let tx = builder
            .build_create_accounts(funder, 0, &targets, Amount(1_000_000))
            .unwrap();
        mock.post(SUBMIT_PATH, tx.serialize().unwrap()).await.unwrap();

        assert_eq!(mock.account(&targets[0]).unwrap().balance, Amount(1_000_000));
        let funder_state = mock.account(&funder.address()).unwrap();
        assert_eq!(funder_state.sequence_id, 1);
        assert_eq!(funder_state.balance, Amount(100_000_000 - 2_000_000 - 20_000));

        let path = format!("{TRANSACTIONS_PREFIX}{}", tx.hash().to_hex());
        let record: TransactionRecord = serde_json::from_slice(&mock.get(&path).await.unwrap()).unwrap();
        assert_eq!(record.hash, tx.hash());

        let pay = builder
            .build_payment(&keys[1], 0, &[keys[2].address()], Amount(1))
            .unwrap();
        mock.post(SUBMIT_PATH, pay.serialize().unwrap()).await.unwrap();
        assert_eq!(mock.account(&keys[2].address()).unwrap().balance, Amount(1_000_001));
        assert_eq!(mock.submitted().len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_stale_sequence() {
        let keys = keypairs(2);
        let mock = MockService::new()
            .with_account(keys[0].address(), Amount(100_000_000))
            .with_account(keys[1].address(), Amount(0));
        let builder = SigningBuilder::from_policy(&mock.policy());

        let tx = builder
            .build_payment(&keys[0], 5, &[keys[1].address()], Amount(1))
            .unwrap();
        let err = mock.post(SUBMIT_PATH, tx.serialize().unwrap()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RemoteTxConflict);
    }

    #[tokio::test]
    async fn test_rejects_wrong_network() {
        let keys = keypairs(2);
        let mock = MockService::new()
            .with_account(keys[0].address(), Amount(100_000_000))
            .with_account(keys[1].address(), Amount(0));
        let builder = SigningBuilder::new("other-network", Amount(10_000));

        let tx = builder
            .build_payment(&keys[0], 0, &[keys[1].address()], Amount(1))
            .unwrap();
        let err = mock.post(SUBMIT_PATH, tx.serialize().unwrap()).await.unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(mock.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_faults_consumed_in_order() {
        let mock = MockService::new().with_get_faults([Fault::Timeout, Fault::Reset]);

        assert_eq!(mock.get("/").await.unwrap_err().kind(), ErrorKind::NetworkTimeout);
        assert_eq!(mock.get("/").await.unwrap_err().kind(), ErrorKind::ConnectionReset);
        assert!(mock.get("/").await.is_ok());
        assert_eq!(mock.get_count(), 3);
    }

    #[tokio::test]
    async fn test_withheld_confirmation_reports_missing() {
        let keys = keypairs(2);
        let mock = MockService::new()
            .with_account(keys[0].address(), Amount(100_000_000))
            .with_withheld_confirmations();
        let tx = SigningBuilder::from_policy(&mock.policy())
            .build_create_accounts(&keys[0], 0, &[keys[1].address()], Amount(1_000_000))
            .unwrap();
        mock.post(SUBMIT_PATH, tx.serialize().unwrap()).await.unwrap();

        let path = format!("{TRANSACTIONS_PREFIX}{}", tx.hash().to_hex());
        assert_eq!(mock.get(&path).await.unwrap_err().kind(), ErrorKind::RemoteTxMissing);
    }
}

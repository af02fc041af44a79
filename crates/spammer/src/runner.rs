//! Load engine.
//!
//! Keeps at most `budget` addresses in flight, re-admitting each address as
//! soon as its previous request completes. Admission stops at the run
//! deadline; in-flight requests are then drained to natural completion.
//!
//! ```text
//! Filling ──(budget admitted)──► Running ──(deadline)──► Draining ──(active set empty)──► Stopped
//! ```

use crate::workloads::{Outcome, Workload};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_types::Address;
use tokio::sync::{mpsc, watch, Notify, Semaphore};
use tokio::time::Instant;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

/// Engine lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Filling,
    Running,
    Draining,
    Stopped,
}

/// Errors starting the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Concurrency budget must be at least 1")]
    ZeroBudget,

    #[error("No addresses to run")]
    NoAddresses,
}

/// Addresses with a request in flight.
///
/// The membership count is the live concurrency level.
#[derive(Debug, Default)]
pub struct ActiveSet {
    active: DashMap<Address, Instant>,
    high_water: AtomicUsize,
}

impl ActiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an address active. Returns false if it already is.
    pub fn try_activate(&self, address: Address) -> bool {
        match self.active.entry(address) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                self.high_water
                    .fetch_max(self.active.len(), Ordering::SeqCst);
                true
            }
        }
    }

    pub fn deactivate(&self, address: &Address) {
        self.active.remove(address);
    }

    pub fn is_active(&self, address: &Address) -> bool {
        self.active.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Highest membership count observed.
    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum requests in flight.
    pub budget: usize,
    /// How long to keep admitting work.
    pub timeout: Duration,
    /// Interval of the "actives" debug line.
    pub monitor_interval: Duration,
    /// Interval of the active-set check while draining.
    pub drain_interval: Duration,
}

impl EngineConfig {
    pub fn new(budget: usize, timeout: Duration) -> Self {
        Self {
            budget,
            timeout,
            monitor_interval: Duration::from_secs(1),
            drain_interval: Duration::from_secs(1),
        }
    }

    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }
}

/// Totals of one engine run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineReport {
    /// Requests started.
    pub admitted: u64,
    /// Requests that confirmed.
    pub confirmed: u64,
    /// Requests that failed.
    pub failed: u64,
    /// Addresses retired.
    pub retired: u64,
    /// Highest number of requests in flight.
    pub max_active: usize,
    /// Time from start to stop.
    pub elapsed: Duration,
}

#[derive(Default)]
struct Counters {
    admitted: AtomicU64,
    confirmed: AtomicU64,
    failed: AtomicU64,
    retired: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Confirmed => &self.confirmed,
            Outcome::Failed(_) => &self.failed,
            Outcome::Retired => &self.retired,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drives a [`Workload`] over a set of addresses.
pub struct LoadEngine<W: Workload> {
    workload: Arc<W>,
    addresses: Vec<Address>,
    active: Arc<ActiveSet>,
    config: EngineConfig,
    state: watch::Sender<EngineState>,
}

impl<W: Workload> LoadEngine<W> {
    pub fn new(
        workload: Arc<W>,
        addresses: Vec<Address>,
        active: Arc<ActiveSet>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        if config.budget == 0 {
            return Err(EngineError::ZeroBudget);
        }
        if addresses.is_empty() {
            return Err(EngineError::NoAddresses);
        }
        let (state, _) = watch::channel(EngineState::Filling);
        Ok(Self {
            workload,
            addresses,
            active,
            config,
            state,
        })
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    fn transition(&self, next: EngineState) {
        debug!(state = ?next, running = self.active.len(), "Engine state");
        self.state.send_replace(next);
    }

    /// Run until the deadline, then drain.
    pub async fn run(&self) -> EngineReport {
        let started = Instant::now();
        let deadline = tokio::time::sleep(self.config.timeout);
        tokio::pin!(deadline);

        let permits = Arc::new(Semaphore::new(self.config.budget));
        let tracker = TaskTracker::new();
        let counters = Arc::new(Counters::default());
        let all_retired = Arc::new(Notify::new());
        let (ready_tx, mut ready_rx) = mpsc::unbounded_channel::<Address>();

        // Only the first `budget` addresses circulate.
        let initial = self.addresses.len().min(self.config.budget);
        for address in &self.addresses[..initial] {
            let _ = ready_tx.send(address.clone());
        }
        let circulating = Arc::new(AtomicUsize::new(initial));

        let mut monitor = tokio::time::interval(self.config.monitor_interval);
        let mut filled = 0usize;
        self.transition(EngineState::Filling);

        loop {
            tokio::select! {
                biased;
                _ = &mut deadline => {
                    debug!(timeout = ?self.config.timeout, "Will be stopped; waiting for in-flight requests");
                    break;
                }
                _ = all_retired.notified() => {
                    info!("All addresses retired");
                    break;
                }
                _ = monitor.tick() => {
                    debug!(running = self.active.len(), "actives");
                }
                Some(address) = ready_rx.recv() => {
                    let permit = tokio::select! {
                        biased;
                        _ = &mut deadline => None,
                        permit = Arc::clone(&permits).acquire_owned() => permit.ok(),
                    };
                    let Some(permit) = permit else {
                        break;
                    };

                    if !self.active.try_activate(address.clone()) {
                        trace!(address = %address.short(), "Already active, skipped");
                        if circulating.fetch_sub(1, Ordering::SeqCst) == 1 {
                            all_retired.notify_one();
                        }
                        continue;
                    }
                    counters.admitted.fetch_add(1, Ordering::Relaxed);
                    trace!(address = %address.short(), running = self.active.len(), "Start request");

                    let workload = Arc::clone(&self.workload);
                    let active = Arc::clone(&self.active);
                    let counters = Arc::clone(&counters);
                    let circulating = Arc::clone(&circulating);
                    let all_retired = Arc::clone(&all_retired);
                    let ready_tx = ready_tx.clone();
                    tracker.spawn(async move {
                        let outcome = workload.run(address.clone()).await;
                        active.deactivate(&address);
                        drop(permit);
                        counters.record(outcome);

                        if outcome.is_terminal() {
                            debug!(address = %address.short(), "Address retired");
                            if circulating.fetch_sub(1, Ordering::SeqCst) == 1 {
                                all_retired.notify_one();
                            }
                        } else {
                            // The receiver is gone once draining starts.
                            let _ = ready_tx.send(address);
                        }
                    });

                    if filled < initial {
                        filled += 1;
                        if filled == initial {
                            self.transition(EngineState::Running);
                        }
                    }
                }
            }
        }

        drop(ready_rx);
        self.transition(EngineState::Draining);

        let mut drain = tokio::time::interval(self.config.drain_interval);
        loop {
            drain.tick().await;
            if self.active.is_empty() {
                break;
            }
            debug!(running = self.active.len(), "Waiting for in-flight requests");
        }
        tracker.close();
        tracker.wait().await;

        self.transition(EngineState::Stopped);

        let report = EngineReport {
            admitted: counters.admitted.load(Ordering::Relaxed),
            confirmed: counters.confirmed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            retired: counters.retired.load(Ordering::Relaxed),
            max_active: self.active.high_water(),
            elapsed: started.elapsed(),
        };
        info!(
            admitted = report.admitted,
            confirmed = report.confirmed,
            failed = report.failed,
            retired = report.retired,
            max_active = report.max_active,
            "Engine stopped"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use surge_types::ErrorKind;

    /// Simulated worker: sleeps, tracks concurrency against a shared set.
    struct Simulated {
        active: Arc<ActiveSet>,
        budget: usize,
        latency: Mutex<ChaCha8Rng>,
        latency_range: (u64, u64),
        admissions: Mutex<Vec<Instant>>,
        completions: Mutex<Vec<Instant>>,
        retire_after: Option<usize>,
        retiring: Option<Address>,
        calls: Mutex<Vec<(Address, Instant)>>,
    }

    impl Simulated {
        fn new(active: Arc<ActiveSet>, budget: usize, seed: u64, range: (u64, u64)) -> Self {
            Self {
                active,
                budget,
                latency: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
                latency_range: range,
                admissions: Mutex::new(Vec::new()),
                completions: Mutex::new(Vec::new()),
                retire_after: None,
                retiring: None,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Workload for Simulated {
        async fn run(&self, source: Address) -> Outcome {
            assert!(self.active.is_active(&source));
            assert!(self.active.len() <= self.budget, "budget exceeded");
            let index = {
                let mut admissions = self.admissions.lock();
                admissions.push(Instant::now());
                admissions.len()
            };
            self.calls.lock().push((source.clone(), Instant::now()));

            let millis = {
                let (lo, hi) = self.latency_range;
                self.latency.lock().gen_range(lo..=hi)
            };
            tokio::time::sleep(Duration::from_millis(millis)).await;
            self.completions.lock().push(Instant::now());

            match self.retire_after {
                Some(limit) if index >= limit => Outcome::Retired,
                _ if self.retiring.as_ref() == Some(&source) => Outcome::Retired,
                _ if index % 7 == 0 => Outcome::Failed(ErrorKind::NetworkTimeout),
                _ => Outcome::Confirmed,
            }
        }
    }

    fn addresses(n: usize) -> Vec<Address> {
        (0..n).map(|i| Address::new(format!("account-{i}"))).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_admission_after_deadline_and_full_drain() {
        let active = Arc::new(ActiveSet::new());
        let workload = Arc::new(Simulated::new(Arc::clone(&active), 3, 1, (10, 10)));
        let engine = LoadEngine::new(
            Arc::clone(&workload),
            addresses(5),
            Arc::clone(&active),
            EngineConfig::new(3, Duration::from_secs(2)),
        )
        .unwrap();

        let start = Instant::now();
        let report = engine.run().await;
        let deadline = start + Duration::from_secs(2);

        let admissions = workload.admissions.lock().clone();
        let completions = workload.completions.lock().clone();
        assert!(!admissions.is_empty());
        assert!(admissions.iter().all(|t| *t <= deadline));
        assert_eq!(admissions.len(), completions.len());
        assert_eq!(report.admitted as usize, admissions.len());
        assert_eq!(
            report.confirmed + report.failed + report.retired,
            report.admitted
        );
        // 3 workers, 10 ms each, for 2 s
        assert!(report.admitted >= 300, "admitted {}", report.admitted);
        assert!(report.max_active <= 3);
        assert!(active.is_empty());
        assert_eq!(engine.state(), EngineState::Stopped);

        let last_completion = completions.iter().max().copied().unwrap();
        assert!(Instant::now() >= last_completion);
    }

    #[tokio::test(start_paused = true)]
    async fn test_active_count_never_exceeds_budget() {
        for seed in 0..8u64 {
            let budget = 1 + (seed as usize % 4);
            let active = Arc::new(ActiveSet::new());
            let workload = Arc::new(Simulated::new(Arc::clone(&active), budget, seed, (1, 40)));
            let engine = LoadEngine::new(
                Arc::clone(&workload),
                addresses(budget + 3),
                Arc::clone(&active),
                EngineConfig::new(budget, Duration::from_millis(500))
                    .with_drain_interval(Duration::from_millis(20)),
            )
            .unwrap();

            let report = engine.run().await;
            assert!(report.max_active <= budget, "seed {seed}");
            assert!(report.max_active >= 1);
            assert!(active.is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions() {
        let active = Arc::new(ActiveSet::new());
        let workload = Arc::new(Simulated::new(Arc::clone(&active), 2, 3, (50, 50)));
        let engine = LoadEngine::new(
            workload,
            addresses(2),
            Arc::clone(&active),
            EngineConfig::new(2, Duration::from_millis(300)),
        )
        .unwrap();

        let mut states = engine.subscribe();
        let seen = Arc::new(Mutex::new(vec![*states.borrow()]));
        let recorder = {
            let seen = Arc::clone(&seen);
            tokio::spawn(async move {
                while states.changed().await.is_ok() {
                    let state = *states.borrow_and_update();
                    seen.lock().push(state);
                    if state == EngineState::Stopped {
                        break;
                    }
                }
            })
        };

        engine.run().await;
        recorder.await.unwrap();

        // A watch receiver may skip intermediate values, never reorder them.
        let rank = |state: &EngineState| match state {
            EngineState::Filling => 0,
            EngineState::Running => 1,
            EngineState::Draining => 2,
            EngineState::Stopped => 3,
        };
        let seen = seen.lock().clone();
        assert_eq!(seen.first(), Some(&EngineState::Filling));
        assert_eq!(seen.last(), Some(&EngineState::Stopped));
        assert!(seen.windows(2).all(|w| rank(&w[0]) <= rank(&w[1])));
        assert!(seen.contains(&EngineState::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retired_addresses_end_run_early() {
        let active = Arc::new(ActiveSet::new());
        let mut simulated = Simulated::new(Arc::clone(&active), 2, 5, (10, 10));
        simulated.retire_after = Some(1);
        let workload = Arc::new(simulated);
        let engine = LoadEngine::new(
            Arc::clone(&workload),
            addresses(2),
            Arc::clone(&active),
            EngineConfig::new(2, Duration::from_secs(60)),
        )
        .unwrap();

        let report = engine.run().await;
        assert_eq!(report.retired, 2);
        assert_eq!(report.admitted, 2);
        assert!(report.elapsed < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_retirement_leaves_remaining_workers_running() {
        let active = Arc::new(ActiveSet::new());
        let pool = addresses(3);
        let mut simulated = Simulated::new(Arc::clone(&active), 3, 11, (10, 10));
        simulated.retiring = Some(pool[0].clone());
        let workload = Arc::new(simulated);
        let engine = LoadEngine::new(
            Arc::clone(&workload),
            pool.clone(),
            Arc::clone(&active),
            EngineConfig::new(3, Duration::from_secs(2)),
        )
        .unwrap();

        let start = Instant::now();
        let deadline = start + Duration::from_secs(2);
        let report = engine.run().await;

        assert_eq!(report.retired, 1);
        assert!(report.max_active <= 3);
        assert_eq!(engine.state(), EngineState::Stopped);
        assert!(active.is_empty());

        let calls = workload.calls.lock().clone();
        let retired_calls = calls.iter().filter(|(a, _)| *a == pool[0]).count();
        assert_eq!(retired_calls, 1);
        for survivor in &pool[1..] {
            let times: Vec<Instant> = calls
                .iter()
                .filter(|(a, _)| a == survivor)
                .map(|(_, t)| *t)
                .collect();
            // 10 ms per request for 2 s
            assert!(times.len() >= 100, "{} admissions", times.len());
            let last = times.iter().max().copied().unwrap();
            assert!(last <= deadline);
            assert!(last >= deadline - Duration::from_millis(100));
        }

        // the engine stops only once the last request has completed
        let last_completion = workload.completions.lock().iter().max().copied().unwrap();
        assert!(last_completion >= deadline - Duration::from_millis(100));
        assert!(Instant::now() >= last_completion);
    }

    #[test]
    fn test_invalid_engine_config() {
        let active = Arc::new(ActiveSet::new());
        let workload = Arc::new(Simulated::new(Arc::clone(&active), 1, 0, (1, 1)));
        assert_eq!(
            LoadEngine::new(
                Arc::clone(&workload),
                addresses(1),
                Arc::clone(&active),
                EngineConfig::new(0, Duration::from_secs(1))
            )
            .err(),
            Some(EngineError::ZeroBudget)
        );
        assert_eq!(
            LoadEngine::new(
                workload,
                Vec::new(),
                active,
                EngineConfig::new(1, Duration::from_secs(1))
            )
            .err(),
            Some(EngineError::NoAddresses)
        );
    }

    #[test]
    fn test_active_set_rejects_duplicates() {
        let set = ActiveSet::new();
        let address = Address::new("a");
        assert!(set.try_activate(address.clone()));
        assert!(!set.try_activate(address.clone()));
        assert_eq!(set.len(), 1);
        set.deactivate(&address);
        assert!(set.is_empty());
        assert!(set.try_activate(address));
        assert_eq!(set.high_water(), 1);
    }
}

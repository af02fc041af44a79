//! Run report built from a result log.

use crate::histogram::{Bin, ElapsedHistogram, LatencyTracker, Percentiles};
use crate::AnalyzeError;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};
use surge_types::{ErrorKind, Event, PaymentRecord, RunConfig};

/// Summary of one run.
///
/// Rates and throughputs are `None` when there is no data to compute them
/// from: no payments, or a zero-length span.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub config: RunConfig,
    pub started: Option<SystemTime>,
    pub ended: Option<SystemTime>,
    /// Time of the last payment event.
    pub last_payment: Option<SystemTime>,
    /// From `started` (or the first event) to the last payment (or `ended`).
    pub span: Option<Duration>,

    pub account_batches: u64,
    pub accounts_created: u64,
    pub failed_batches: u64,

    pub requests: u64,
    pub failed: u64,
    /// `requests × operations per request`.
    pub operations: u64,
    /// `failed / requests`.
    pub error_rate: Option<f64>,
    /// Succeeded operations per second.
    pub observed_ops: Option<f64>,
    /// Attempted operations per second.
    pub expected_ops: Option<f64>,

    pub min_elapsed: Option<Duration>,
    pub max_elapsed: Option<Duration>,
    pub percentiles: Option<Percentiles>,
    pub bin_width: Duration,
    pub distribution: Vec<Bin>,
    /// Failures per kind.
    pub errors: BTreeMap<ErrorKind, u64>,
}

impl Report {
    /// Error rate as a percentage.
    pub fn error_percent(&self) -> Option<f64> {
        self.error_rate.map(|rate| rate * 100.0)
    }

    pub fn print(&self) {
        let config = &self.config;
        let policy = &config.node.policy;
        let node = &config.node;

        println!("\n=== Config ===");
        row("testing time", humantime::format_duration(config.timeout));
        row("concurrent requests", config.concurrency);
        row("initial account", config.init_account.short());
        row("request timeout", humantime::format_duration(config.request_timeout));
        row("confirm duration", humantime::format_duration(config.confirm_duration));
        row("operations", config.operations);

        println!("\n=== Network ===");
        row("network id", &policy.network_id);
        row("initial balance", policy.initial_balance);
        row("block time", &policy.block_time);
        row("base reserve", policy.base_reserve);
        row("base fee", policy.base_fee);

        println!("\n=== Node ===");
        row("endpoint", &node.node.endpoint);
        row("address", &node.node.address);
        row("state", &node.node.state);
        row("block height", node.block.height);
        row("block hash", &node.block.hash);
        row("block total txs", node.block.total_txs);
        row("block total ops", node.block.total_ops);

        println!("\n=== Time ===");
        row("started", format_time(self.started));
        row("ended", format_time(self.last_payment.or(self.ended)));
        row("total elapsed", format_span(self.span));

        println!("\n=== Accounts ===");
        row("batches", self.account_batches);
        row("created", self.accounts_created);
        row("failed batches", self.failed_batches);

        println!("\n=== Result ===");
        row("requests", self.requests);
        row("operations", self.operations);
        row(
            "error rate",
            match self.error_percent() {
                Some(percent) => format!("{percent:.5}% ({}/{})", self.failed, self.requests),
                None => "no data".to_string(),
            },
        );
        row("min elapsed", format_span(self.min_elapsed));
        row("max elapsed", format_span(self.max_elapsed));
        if let Some(p) = self.percentiles {
            row("p50", format_span(Some(p.p50)));
            row("p90", format_span(Some(p.p90)));
            row("p99", format_span(Some(p.p99)));
        }
        row("expected OPS", format_rate(self.expected_ops));
        row("real OPS", format_rate(self.observed_ops));

        println!("\n=== Distribution ===");
        for bin in &self.distribution {
            let share = share(bin.count, self.requests);
            println!(
                "  {:>6.1}s - {:<6.1}s {:>9.5}% / {:>6}",
                bin.start.as_secs_f64(),
                bin.end.as_secs_f64(),
                share,
                bin.count
            );
        }

        println!("\n=== Errors ===");
        if self.errors.is_empty() {
            println!("  no error");
        }
        for (kind, count) in &self.errors {
            println!(
                "  {:<24} {:>6} | {:>9.5}%",
                kind.as_str(),
                count,
                share(*count, self.failed)
            );
        }
    }
}

fn row(label: &str, value: impl std::fmt::Display) {
    println!("  {label:<22} {value}");
}

fn share(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn format_time(time: Option<SystemTime>) -> String {
    time.map(|t| humantime::format_rfc3339_nanos(t).to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn format_span(span: Option<Duration>) -> String {
    span.map(|d| format!("{:.9}s", d.as_secs_f64()))
        .unwrap_or_else(|| "-".to_string())
}

fn format_rate(rate: Option<f64>) -> String {
    rate.map(|r| format!("{r:.2}"))
        .unwrap_or_else(|| "no data".to_string())
}

/// Accumulates events into a [`Report`].
pub struct ReportBuilder {
    config: RunConfig,
    first_event: SystemTime,
    started: Option<SystemTime>,
    ended: Option<SystemTime>,
    last_payment: Option<SystemTime>,
    account_batches: u64,
    accounts_created: u64,
    failed_batches: u64,
    requests: u64,
    failed: u64,
    min_elapsed: Option<Duration>,
    max_elapsed: Option<Duration>,
    histogram: ElapsedHistogram,
    latency: LatencyTracker,
    errors: BTreeMap<ErrorKind, u64>,
}

impl ReportBuilder {
    pub fn new(
        config: RunConfig,
        opened: SystemTime,
        bin_width: Duration,
    ) -> Result<Self, AnalyzeError> {
        Ok(Self {
            config,
            first_event: opened,
            started: None,
            ended: None,
            last_payment: None,
            account_batches: 0,
            accounts_created: 0,
            failed_batches: 0,
            requests: 0,
            failed: 0,
            min_elapsed: None,
            max_elapsed: None,
            histogram: ElapsedHistogram::new(bin_width)?,
            latency: LatencyTracker::new()?,
            errors: BTreeMap::new(),
        })
    }

    pub fn observe(&mut self, event: &Event) {
        match event {
            Event::Config { .. } => {}
            Event::Started { time } => self.started = Some(*time),
            Event::Ended { time } => self.ended = Some(*time),
            Event::CreateAccounts(record) => {
                self.account_batches += 1;
                if record.error.is_some() {
                    self.failed_batches += 1;
                } else {
                    self.accounts_created += record.count as u64;
                }
            }
            Event::Payment(record) => self.observe_payment(record),
        }
    }

    fn observe_payment(&mut self, record: &PaymentRecord) {
        self.requests += 1;
        self.last_payment = Some(record.time);

        let elapsed = record.elapsed;
        self.min_elapsed = Some(self.min_elapsed.map_or(elapsed, |min| min.min(elapsed)));
        self.max_elapsed = Some(self.max_elapsed.map_or(elapsed, |max| max.max(elapsed)));
        self.histogram.record(elapsed);
        self.latency.record(elapsed);

        let kind = record.error_kind();
        if kind != ErrorKind::None {
            self.failed += 1;
            *self.errors.entry(kind).or_default() += 1;
        }
    }

    pub fn finish(self) -> Report {
        let start = self.started.unwrap_or(self.first_event);
        let span = self
            .last_payment
            .or(self.ended)
            .and_then(|end| end.duration_since(start).ok());

        let operations = self.requests * self.config.operations as u64;
        let succeeded_ops = (self.requests - self.failed) * self.config.operations as u64;
        let per_second = |ops: u64| {
            span.filter(|s| !s.is_zero() && self.requests > 0)
                .map(|s| ops as f64 / s.as_secs_f64())
        };
        let error_rate =
            (self.requests > 0).then(|| self.failed as f64 / self.requests as f64);

        Report {
            started: self.started,
            ended: self.ended,
            last_payment: self.last_payment,
            span,
            account_batches: self.account_batches,
            accounts_created: self.accounts_created,
            failed_batches: self.failed_batches,
            requests: self.requests,
            failed: self.failed,
            operations,
            error_rate,
            observed_ops: per_second(succeeded_ops),
            expected_ops: per_second(operations),
            min_elapsed: self.min_elapsed,
            max_elapsed: self.max_elapsed,
            percentiles: self.latency.percentiles(),
            bin_width: self.histogram.width(),
            distribution: self.histogram.bins(),
            errors: self.errors,
            config: self.config,
        }
    }
}

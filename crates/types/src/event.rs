//! Result log events.
//!
//! The result log is UTF-8 JSON, one event per line, discriminated by the
//! `type` field. The first line is always a `config` event. Readers ignore
//! unknown fields but reject unknown `type` values.

use crate::{classify, Address, Amount, ErrorKind, NodeInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, SystemTime};

/// Settings of a run, recorded as the first line of the result log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunConfig {
    /// Node info fetched at startup.
    pub node: NodeInfo,
    /// Concurrency budget.
    pub concurrency: usize,
    /// Funding account.
    pub init_account: Address,
    /// Total run duration.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Per HTTP request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// How long a payment may wait for confirmation.
    #[serde(with = "humantime_serde")]
    pub confirm_duration: Duration,
    /// Path of the result log.
    pub result_output: String,
    /// Operations per payment request.
    pub operations: usize,
}

/// A `create-accounts` event: one funding batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateAccountsRecord {
    #[serde(with = "rfc3339")]
    pub time: SystemTime,
    #[serde(with = "elapsed")]
    pub elapsed: Duration,
    pub count: usize,
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub error: Option<Value>,
}

/// A `payment` event: one payment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(with = "rfc3339")]
    pub time: SystemTime,
    #[serde(with = "elapsed")]
    pub elapsed: Duration,
    pub count: usize,
    pub addresses: Vec<Address>,
    pub amount: Amount,
    pub source: Address,
    #[serde(default)]
    pub error: Option<Value>,
}

impl PaymentRecord {
    /// Classification of the recorded error.
    pub fn error_kind(&self) -> ErrorKind {
        classify(self.error.as_ref())
    }

    /// Whether the request failed.
    pub fn is_failure(&self) -> bool {
        self.error_kind() != ErrorKind::None
    }
}

/// One line of the result log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    Config {
        config: RunConfig,
        #[serde(with = "rfc3339")]
        time: SystemTime,
    },
    Started {
        #[serde(with = "rfc3339")]
        time: SystemTime,
    },
    Ended {
        #[serde(with = "rfc3339")]
        time: SystemTime,
    },
    CreateAccounts(CreateAccountsRecord),
    Payment(PaymentRecord),
}

impl Event {
    /// Value of the `type` discriminator.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::Config { .. } => "config",
            Event::Started { .. } => "started",
            Event::Ended { .. } => "ended",
            Event::CreateAccounts(_) => "create-accounts",
            Event::Payment(_) => "payment",
        }
    }

    /// When the event was written.
    pub fn time(&self) -> SystemTime {
        match self {
            Event::Config { time, .. } | Event::Started { time } | Event::Ended { time } => *time,
            Event::CreateAccounts(record) => record.time,
            Event::Payment(record) => record.time,
        }
    }
}

/// RFC 3339 UTC timestamps with nanosecond precision.
pub mod rfc3339 {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::SystemTime;

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_rfc3339_nanos(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_rfc3339_weak(&s).map_err(serde::de::Error::custom)
    }
}

/// Elapsed time as a decimal seconds string (`"2.162394793"`).
///
/// Numbers are accepted on input.
pub mod elapsed {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("{}.{:09}", d.as_secs(), d.subsec_nanos()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => {
                parse(&s).ok_or_else(|| D::Error::custom(format!("invalid elapsed: {s:?}")))
            }
            Value::Number(n) => n
                .as_f64()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or_else(|| D::Error::custom(format!("invalid elapsed: {n}"))),
            other => Err(D::Error::custom(format!("invalid elapsed: {other}"))),
        }
    }

    /// Parse `secs[.fraction]`; digits past nanosecond precision are truncated.
    pub fn parse(s: &str) -> Option<Duration> {
        let (secs, frac) = s.split_once('.').unwrap_or((s, ""));
        if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let secs: u64 = secs.parse().ok()?;
        let frac = &frac[..frac.len().min(9)];
        let nanos: u32 = if frac.is_empty() {
            0
        } else {
            format!("{frac:0<9}").parse().ok()?
        };
        Some(Duration::new(secs, nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockSummary, NetworkPolicy, NodeSummary};
    use serde_json::json;

    fn node_info() -> NodeInfo {
        NodeInfo {
            node: NodeSummary::default(),
            policy: NetworkPolicy {
                network_id: "test".into(),
                base_fee: Amount(10_000),
                base_reserve: Amount(1_000_000),
                operations_limit: 100,
                initial_balance: Amount::ZERO,
                block_time: Value::Null,
            },
            block: BlockSummary::default(),
        }
    }

    #[test]
    fn test_config_line_shape() {
        let event = Event::Config {
            config: RunConfig {
                node: node_info(),
                concurrency: 10,
                init_account: Address::new("funder"),
                timeout: Duration::from_secs(60),
                request_timeout: Duration::from_secs(30),
                confirm_duration: Duration::from_secs(60),
                result_output: "out.log".into(),
                operations: 1,
            },
            time: SystemTime::UNIX_EPOCH + Duration::new(1_500_000_000, 5),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "config");
        assert_eq!(value["config"]["timeout"], "1m");
        assert_eq!(value["config"]["request-timeout"], "30s");
        assert_eq!(value["time"], "2017-07-14T02:40:00.000000005Z");

        let parsed: Event = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let line = r#"{"type":"refund","time":"2017-07-14T02:40:00.000000000Z"}"#;
        assert!(serde_json::from_str::<Event>(line).is_err());
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let line = r#"{"type":"started","time":"2017-07-14T02:40:00Z","host":"loadgen-1"}"#;
        let event: Event = serde_json::from_str(line).unwrap();
        assert_eq!(event.type_name(), "started");
    }

    #[test]
    fn test_payment_failure_detection() {
        let line = json!({
            "type": "payment",
            "time": "2017-07-14T02:40:00Z",
            "elapsed": "2.162394793",
            "count": 1,
            "addresses": ["aa"],
            "amount": "1",
            "source": "bb",
            "error": {"Err": {"Timeout": true}}
        });
        let Event::Payment(record) = serde_json::from_value(line).unwrap() else {
            panic!("expected payment");
        };
        assert_eq!(record.elapsed, Duration::new(2, 162_394_793));
        assert!(record.is_failure());
        assert_eq!(record.error_kind(), ErrorKind::NetworkTimeout);
    }

    #[test]
    fn test_elapsed_parse() {
        assert_eq!(elapsed::parse("1.5"), Some(Duration::from_millis(1500)));
        assert_eq!(elapsed::parse("3"), Some(Duration::from_secs(3)));
        assert_eq!(elapsed::parse("0.000000001"), Some(Duration::from_nanos(1)));
        assert_eq!(
            elapsed::parse("1.9459782410"),
            Some(Duration::new(1, 945_978_241))
        );
        assert_eq!(elapsed::parse("-1.0"), None);
        assert_eq!(elapsed::parse(".5"), None);
    }

    #[test]
    fn test_numeric_elapsed_out_of_range_is_an_error() {
        #[derive(Debug, Deserialize)]
        struct Wrapper {
            #[serde(with = "elapsed")]
            elapsed: Duration,
        }

        let ok: Wrapper = serde_json::from_str(r#"{"elapsed":1.25}"#).unwrap();
        assert_eq!(ok.elapsed, Duration::from_millis(1250));

        for raw in [r#"{"elapsed":1e30}"#, r#"{"elapsed":-1.0}"#] {
            assert!(serde_json::from_str::<Wrapper>(raw).is_err(), "{raw}");
        }
    }
}

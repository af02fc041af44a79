//! Stable classification of request failures.
//!
//! Every failed request is recorded with its raw error payload. The payload
//! comes in two shapes: transport failures (`{"Err": {...}}`) and problems
//! reported by the remote service (`{"code": 163, "data": {"body": ...}}`).
//! [`classify`] first reduces a payload to a [`PayloadShape`] and then maps
//! the shape to an [`ErrorKind`] through the lookup tables below.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Fault code the remote service uses for HTTP problem responses.
pub const HTTP_PROBLEM_CODE: u64 = 163;

/// Errno values reported for a connection reset by peer (BSD, Linux).
pub const CONNECTION_RESET_ERRNOS: &[i64] = &[54, 104];

/// Known problem types, keyed by the last path segment of the problem URN.
pub const REMOTE_FAULTS: &[(&str, ErrorKind)] = &[
    ("134", ErrorKind::RemoteTxMissing),
    ("139", ErrorKind::RemoteTxConflict),
];

/// Classification of a failure, used for retry policy and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// No error.
    None,
    /// Anything not covered by another kind.
    Unknown,
    /// The transport timed out.
    NetworkTimeout,
    /// The peer reset the connection.
    ConnectionReset,
    /// The service rejected the transaction because the source already has one pending.
    RemoteTxConflict,
    /// The service does not know the transaction.
    RemoteTxMissing,
}

impl ErrorKind {
    /// All kinds, in report order.
    pub const ALL: [ErrorKind; 6] = [
        ErrorKind::None,
        ErrorKind::Unknown,
        ErrorKind::NetworkTimeout,
        ErrorKind::ConnectionReset,
        ErrorKind::RemoteTxConflict,
        ErrorKind::RemoteTxMissing,
    ];

    /// Stable name used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::None => "none",
            ErrorKind::Unknown => "unknown",
            ErrorKind::NetworkTimeout => "network-timeout",
            ErrorKind::ConnectionReset => "connection-reset",
            ErrorKind::RemoteTxConflict => "remote-tx-conflict",
            ErrorKind::RemoteTxMissing => "remote-tx-missing",
        }
    }

    /// Whether a submission that failed with this kind may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, ErrorKind::NetworkTimeout | ErrorKind::ConnectionReset)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural reading of a raw error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadShape {
    /// No error recorded (`null` or `{}`).
    Empty,
    /// Transport failure: `{"Err": {"Timeout": bool, "Err": {"Syscall": .., "Err": errno}}}`.
    Transport { timeout: bool, errno: Option<i64> },
    /// Remote problem: `{"code": n, "data": {"body": "<problem json>"}}`.
    RemoteProblem {
        code: Option<u64>,
        problem_type: Option<String>,
    },
    /// Neither shape.
    Unrecognized,
}

impl PayloadShape {
    /// Read the shape of a raw payload.
    pub fn of(raw: &Value) -> Self {
        let obj = match raw {
            Value::Null => return PayloadShape::Empty,
            Value::Object(obj) if obj.is_empty() => return PayloadShape::Empty,
            Value::Object(obj) => obj,
            _ => return PayloadShape::Unrecognized,
        };

        if let Some(code) = obj.get("code") {
            let problem_type = raw
                .pointer("/data/body")
                .and_then(Value::as_str)
                .and_then(|body| serde_json::from_str::<Value>(body).ok())
                .and_then(|problem| problem.get("type")?.as_str().map(str::to_string));
            return PayloadShape::RemoteProblem {
                code: code.as_u64(),
                problem_type,
            };
        }

        if let Some(Value::Object(net)) = obj.get("Err") {
            let timeout = net.get("Timeout").and_then(Value::as_bool).unwrap_or(false);
            let errno = net
                .get("Err")
                .and_then(Value::as_object)
                .filter(|syscall| syscall.contains_key("Syscall"))
                .and_then(|syscall| syscall.get("Err")?.as_i64());
            return PayloadShape::Transport { timeout, errno };
        }

        PayloadShape::Unrecognized
    }

    /// Map the shape to its error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PayloadShape::Empty => ErrorKind::None,
            PayloadShape::Transport { timeout: true, .. } => ErrorKind::NetworkTimeout,
            PayloadShape::Transport {
                errno: Some(errno), ..
            } if CONNECTION_RESET_ERRNOS.contains(errno) => ErrorKind::ConnectionReset,
            PayloadShape::Transport { .. } => ErrorKind::Unknown,
            PayloadShape::RemoteProblem {
                code: Some(HTTP_PROBLEM_CODE),
                problem_type: Some(problem_type),
            } => remote_fault_kind(problem_type),
            PayloadShape::RemoteProblem { .. } => ErrorKind::Unknown,
            PayloadShape::Unrecognized => ErrorKind::Unknown,
        }
    }
}

/// Look up a problem URN in [`REMOTE_FAULTS`].
fn remote_fault_kind(problem_type: &str) -> ErrorKind {
    let segment = problem_type.rsplit('/').next().unwrap_or(problem_type);
    REMOTE_FAULTS
        .iter()
        .find(|(code, _)| *code == segment)
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Unknown)
}

/// Classify a raw error payload. `None` means the request succeeded.
pub fn classify(raw: Option<&Value>) -> ErrorKind {
    match raw {
        None => ErrorKind::None,
        Some(raw) => PayloadShape::of(raw).kind(),
    }
}

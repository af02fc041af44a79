//! Request Client failures and their raw, recordable form.
//!
//! A [`ClientError`] is recorded in the result log as a JSON payload (see
//! [`ClientError::raw_payload`]) and classified from that payload, so the
//! retry decision and the offline report always agree on the kind.

use serde_json::{json, Value};
use std::fmt;
use surge_types::{classify, ErrorKind, HTTP_PROBLEM_CODE};

/// HTTP method of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("Get"),
            Method::Post => f.write_str("Post"),
        }
    }
}

/// Failure surfaced by a Request Client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The request did not complete within the request timeout.
    #[error("{op} {url}: timed out: {message}")]
    Timeout {
        op: Method,
        url: String,
        message: String,
    },

    /// The peer reset the connection.
    #[error("{op} {url}: connection reset by peer (errno {errno})")]
    ConnectionReset { op: Method, url: String, errno: i64 },

    /// Any other transport failure (refused, DNS, TLS, body read).
    #[error("{op} {url}: {message}")]
    Transport {
        op: Method,
        url: String,
        message: String,
    },

    /// The service answered with a non-success status.
    #[error("HTTP problem: status {status}")]
    Problem { status: u16, body: String },
}

impl ClientError {
    /// JSON payload recorded in the result log.
    pub fn raw_payload(&self) -> Value {
        match self {
            ClientError::Timeout { op, url, message } => json!({
                "Op": op.to_string(),
                "URL": url,
                "Err": {"Timeout": true, "Message": message},
            }),
            ClientError::ConnectionReset { op, url, errno } => json!({
                "Op": op.to_string(),
                "URL": url,
                "Err": {
                    "Op": "read",
                    "Net": "tcp",
                    "Err": {"Syscall": "read", "Err": errno},
                },
            }),
            ClientError::Transport { op, url, message } => json!({
                "Op": op.to_string(),
                "URL": url,
                "Err": {"Message": message},
            }),
            ClientError::Problem { status, body } => json!({
                "code": HTTP_PROBLEM_CODE,
                "message": "problem",
                "data": {"status": status, "body": body},
            }),
        }
    }

    /// Classification of this failure.
    pub fn kind(&self) -> ErrorKind {
        classify(Some(&self.raw_payload()))
    }

    /// HTTP status of a problem response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Problem { status, .. } => Some(*status),
            _ => None,
        }
    }
}

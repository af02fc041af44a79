//! Collaborator seams for surge.
//!
//! The load engine and request executor never talk HTTP or build
//! transactions directly. They go through the two traits defined here,
//! which keeps them testable against an in-memory service.
//!
//! - [`RequestClient`]: byte-level GET/POST against the remote service
//! - [`TransactionBuilder`]: builds and signs create-account and payment transactions
//! - [`ClientError`]: request failures, with the raw payload recorded in the result log

mod builder;
mod request;
mod traits;

pub use builder::SigningBuilder;
pub use request::{ClientError, Method};
pub use traits::{RequestClient, TransactionBuilder};

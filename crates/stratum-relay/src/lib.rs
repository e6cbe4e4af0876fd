//! Session pipeline for the credential-rewriting Stratum proxy.
//!
//! This crate accepts TLS connections from miners, opens a matching TLS
//! connection to the real pool for each one, and relays newline-delimited
//! Stratum traffic in both directions. Lines flowing toward the pool are run
//! through a [`MessageInspector`], which substitutes worker credentials;
//! lines flowing back to the miner are passed through untouched.
//!
//! # Architecture
//!
//! ```text
//! Miner  <--TLS-->  stratum-relay  <--TLS-->  Pool
//!                     |
//!               [Inspector]   (client -> pool only)
//! ```
//!
//! Each [`Session`] runs two forwarding tasks. Whichever stops first (EOF,
//! I/O error, over-long line, or a panic) fires the session's
//! [`ShutdownSignal`] exactly once, which stops the other task and closes both
//! connections together.

mod error;
mod forward;
pub mod inspect;
pub mod listener;
pub mod session;
pub mod upstream;

pub use error::RelayError;
pub use forward::{Direction, StopReason, DEFAULT_MAX_LINE_LENGTH};
pub use inspect::{intercept_line, InspectionResult, MessageInspector, SessionContext};
pub use listener::{Proxy, ProxyConfig};
pub use session::{Session, SessionState, SessionSummary, ShutdownSignal};
pub use upstream::Upstream;

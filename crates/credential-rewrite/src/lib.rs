//! # credential-rewrite
//!
//! Worker credential substitution for Stratum mining traffic. This crate holds
//! the pure parts of the proxy: the identity rewrite rule, the set of methods
//! eligible for rewriting, a typed view over a single Stratum line, and the
//! [`CredentialRewriter`] that ties them together.
//!
//! Nothing here performs I/O; the relay crate decides what to do with the
//! rewritten message.
//!
//! ## Quick start
//!
//! ```rust
//! use credential_rewrite::{CredentialRewriter, Credentials, StratumMessage};
//!
//! let rewriter = CredentialRewriter::new(Credentials::new("bob", "x"));
//! let msg = StratumMessage::parse(
//!     r#"{"id":1,"method":"mining.authorize","params":["alice.rig1","pw"]}"#,
//! )
//! .unwrap();
//!
//! let rewrite = rewriter.rewrite(&msg).unwrap();
//! assert_eq!(rewrite.identity, "bob.rig1");
//! ```

mod identity;
mod message;
mod rewriter;
mod target;

pub use identity::rewrite_identity;
pub use message::StratumMessage;
pub use rewriter::{CredentialRewriter, Credentials, Rewrite};
pub use target::RewriteTarget;

use serde_json::Value;

use crate::identity::rewrite_identity;
use crate::message::StratumMessage;
use crate::target::RewriteTarget;

/// Replacement worker credentials.
///
/// Built once at startup and shared read-only by every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Replaces the user part of `params[0]`.
    pub user: String,
    /// Replaces `params[1]` of `mining.authorize`.
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

/// A message that was rewritten, along with what changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Rewrite {
    pub target: RewriteTarget,
    /// `params[0]` as the client sent it.
    pub original_identity: String,
    /// `params[0]` as it will be sent upstream.
    pub identity: String,
    /// The full message with substituted params.
    pub message: StratumMessage,
}

/// Applies [`Credentials`] to Stratum messages.
#[derive(Debug, Clone)]
pub struct CredentialRewriter {
    credentials: Credentials,
}

impl CredentialRewriter {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Rewrite `msg` if it is a rewrite target with a string identity.
    ///
    /// Returns `None` for non-target methods and for targets whose `params`
    /// is missing, empty, or starts with a non-string. The rule is applied to
    /// `params[0]` of every target regardless of what the field means for that
    /// method, so a `mining.subscribe` user agent is rewritten too.
    pub fn rewrite(&self, msg: &StratumMessage) -> Option<Rewrite> {
        let target = RewriteTarget::from_method(msg.method.as_deref()?)?;
        let original_identity = msg.identity()?.to_string();
        let identity = rewrite_identity(&original_identity, &self.credentials.user);

        let mut message = msg.clone();
        if let Some(params) = message.params.as_mut() {
            if let Some(first) = params.first_mut() {
                *first = Value::String(identity.clone());
            }
            if target.carries_password() {
                if let Some(password) = params.get_mut(1) {
                    *password = Value::String(self.credentials.password.clone());
                }
            }
        }

        Some(Rewrite {
            target,
            original_identity,
            identity,
            message,
        })
    }
}

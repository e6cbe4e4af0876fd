use std::borrow::Cow;
use std::net::SocketAddr;

use credential_rewrite::{CredentialRewriter, StratumMessage};

/// Per-session metadata passed to inspectors and attached to log events.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Unique identifier for this session.
    pub session_id: uuid::Uuid,
    /// TCP address of the miner.
    pub client_addr: SocketAddr,
    /// Address of the pool this session dials.
    pub upstream_addr: String,
}

impl SessionContext {
    pub fn new(client_addr: SocketAddr, upstream_addr: impl Into<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4(),
            client_addr,
            upstream_addr: upstream_addr.into(),
        }
    }
}

/// The result of inspecting a single message.
#[derive(Debug, Clone, PartialEq)]
pub enum InspectionResult {
    /// Forward the original line unchanged.
    Pass,
    /// Forward this message instead.
    Modify(StratumMessage),
}

/// Synchronous inspection of client-to-pool messages.
///
/// Inspectors run inline on the forwarding task for every decoded line, so
/// they must not block or perform I/O.
pub trait MessageInspector: Send + Sync {
    fn inspect_upstream(&self, msg: &StratumMessage, ctx: &SessionContext) -> InspectionResult;
}

impl MessageInspector for CredentialRewriter {
    fn inspect_upstream(&self, msg: &StratumMessage, ctx: &SessionContext) -> InspectionResult {
        let Some(rewrite) = self.rewrite(msg) else {
            return InspectionResult::Pass;
        };

        if rewrite.target.is_logged() {
            tracing::info!(
                session_id = %ctx.session_id,
                client = %ctx.client_addr,
                method = %rewrite.target,
                original = %rewrite.original_identity,
                rewritten = %rewrite.identity,
                "credentials rewritten"
            );
        }

        InspectionResult::Modify(rewrite.message)
    }
}

/// Run one line through `inspector` and return the line to forward.
///
/// Lines that do not decode as a Stratum message, and messages the inspector
/// passes, are returned verbatim. A modified message is re-encoded; if that
/// fails the original line is forwarded instead.
pub fn intercept_line<'a>(
    line: &'a str,
    inspector: &dyn MessageInspector,
    ctx: &SessionContext,
) -> Cow<'a, str> {
    let Some(msg) = StratumMessage::parse(line) else {
        return Cow::Borrowed(line);
    };

    match inspector.inspect_upstream(&msg, ctx) {
        InspectionResult::Pass => Cow::Borrowed(line),
        InspectionResult::Modify(modified) => match modified.to_line() {
            Ok(encoded) => Cow::Owned(encoded),
            Err(err) => {
                tracing::error!(
                    session_id = %ctx.session_id,
                    %err,
                    "failed to encode modified message, forwarding original"
                );
                Cow::Borrowed(line)
            }
        },
    }
}

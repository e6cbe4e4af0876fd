use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinError;
use tokio_rustls::client::TlsStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::forward::{forward_lines, Direction, StopReason};
use crate::inspect::{MessageInspector, SessionContext};
use crate::upstream::Upstream;

const CLIENT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// One-shot, first-trigger-wins session termination.
///
/// Any number of callers may [`trigger`](Self::trigger) concurrently; exactly
/// one of them wins and cancels the token, the rest are no-ops.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    fired: AtomicBool,
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the signal. Returns `true` only for the call that fired it.
    pub fn trigger(&self) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// A token that is cancelled when the signal fires.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Client accepted, upstream being dialed.
    Establishing,
    /// Both forwarders running.
    Active,
    /// One forwarder stopped; the other is being stopped.
    Closing,
    /// Both forwarders exited, each having shut down its destination, and
    /// both connections dropped.
    Closed,
}

/// How a session ended.
#[derive(Debug)]
pub struct SessionSummary {
    /// The direction whose forwarder stopped first and closed the session.
    pub first_stopped: Direction,
    pub client_to_upstream: Result<StopReason, RelayError>,
    pub upstream_to_client: Result<StopReason, RelayError>,
}

/// A miner connection paired with its pool connection.
///
/// The session exclusively owns both streams. [`run`](Self::run) relays
/// until either direction stops, then closes both legs together.
pub struct Session<C, U> {
    ctx: Arc<SessionContext>,
    client: C,
    upstream: U,
    inspector: Arc<dyn MessageInspector>,
    max_line_length: usize,
    state: SessionState,
}

impl<C> Session<C, TlsStream<TcpStream>>
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Dial the pool for an accepted client.
    ///
    /// On failure the client connection is shut down and dropped, and no
    /// forwarders are started.
    pub async fn establish(
        ctx: SessionContext,
        mut client: C,
        upstream: &Upstream,
        inspector: Arc<dyn MessageInspector>,
        max_line_length: usize,
    ) -> Result<Self, RelayError> {
        debug!(
            session_id = %ctx.session_id,
            state = ?SessionState::Establishing,
            upstream = %upstream.addr(),
            "dialing upstream"
        );

        let upstream_conn = match upstream.connect().await {
            Ok(conn) => conn,
            Err(err) => {
                if let Ok(Err(close_err)) =
                    tokio::time::timeout(CLIENT_CLOSE_TIMEOUT, client.shutdown()).await
                {
                    debug!(session_id = %ctx.session_id, err = %close_err, "client shutdown failed");
                }
                drop(client);
                debug!(
                    session_id = %ctx.session_id,
                    state = ?SessionState::Closed,
                    "client closed after failed dial"
                );
                return Err(err);
            }
        };

        Ok(Session::new(
            ctx,
            client,
            upstream_conn,
            inspector,
            max_line_length,
        ))
    }
}

impl<C, U> Session<C, U>
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    U: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Pair two already-established connections.
    pub fn new(
        ctx: SessionContext,
        client: C,
        upstream: U,
        inspector: Arc<dyn MessageInspector>,
        max_line_length: usize,
    ) -> Self {
        Self {
            ctx: Arc::new(ctx),
            client,
            upstream,
            inspector,
            max_line_length,
            state: SessionState::Establishing,
        }
    }

    /// Relay in both directions until one stops, then shut the other down.
    ///
    /// Returns once both forwarders have exited. Each forwarder shuts down the
    /// write side it owns on the way out, so both peers see an orderly close
    /// (a TLS `close_notify` on TLS legs) before the connections are dropped.
    pub async fn run(mut self) -> SessionSummary {
        let signal = ShutdownSignal::new();
        let ctx = Arc::clone(&self.ctx);

        let (client_read, client_write) = tokio::io::split(self.client);
        let (upstream_read, upstream_write) = tokio::io::split(self.upstream);

        let mut up_task = tokio::spawn(forward_lines(
            client_read,
            upstream_write,
            Some(Arc::clone(&self.inspector)),
            Arc::clone(&ctx),
            Direction::ClientToUpstream,
            self.max_line_length,
            signal.token(),
        ));

        let mut down_task = tokio::spawn(forward_lines(
            upstream_read,
            client_write,
            None,
            Arc::clone(&ctx),
            Direction::UpstreamToClient,
            self.max_line_length,
            signal.token(),
        ));

        transition(&ctx, &mut self.state, SessionState::Active);
        info!(
            session_id = %ctx.session_id,
            client = %ctx.client_addr,
            upstream = %ctx.upstream_addr,
            "session started"
        );

        // Whichever direction stops first closes the session.
        let (first_stopped, first_result) = tokio::select! {
            joined = &mut up_task => {
                (Direction::ClientToUpstream, task_result(Direction::ClientToUpstream, joined))
            }
            joined = &mut down_task => {
                (Direction::UpstreamToClient, task_result(Direction::UpstreamToClient, joined))
            }
        };

        transition(&ctx, &mut self.state, SessionState::Closing);
        stopped(&ctx, &signal, first_stopped, &first_result);

        let (second_stopped, second_result) = match first_stopped {
            Direction::ClientToUpstream => (
                Direction::UpstreamToClient,
                task_result(Direction::UpstreamToClient, down_task.await),
            ),
            Direction::UpstreamToClient => (
                Direction::ClientToUpstream,
                task_result(Direction::ClientToUpstream, up_task.await),
            ),
        };
        stopped(&ctx, &signal, second_stopped, &second_result);

        transition(&ctx, &mut self.state, SessionState::Closed);
        info!(
            session_id = %ctx.session_id,
            client = %ctx.client_addr,
            first_stopped = %first_stopped,
            "session closed"
        );

        let (client_to_upstream, upstream_to_client) = match first_stopped {
            Direction::ClientToUpstream => (first_result, second_result),
            Direction::UpstreamToClient => (second_result, first_result),
        };

        SessionSummary {
            first_stopped,
            client_to_upstream,
            upstream_to_client,
        }
    }
}

fn transition(ctx: &SessionContext, state: &mut SessionState, next: SessionState) {
    debug!(session_id = %ctx.session_id, from = ?*state, to = ?next, "session state");
    *state = next;
}

/// Turn a panicked or cancelled forwarder into an ordinary error.
fn task_result(
    direction: Direction,
    joined: Result<Result<StopReason, RelayError>, JoinError>,
) -> Result<StopReason, RelayError> {
    joined.unwrap_or_else(|err| {
        Err(RelayError::TaskFailed {
            direction,
            reason: err.to_string(),
        })
    })
}

/// Log a forwarder's exit and fire the shutdown signal.
fn stopped(
    ctx: &SessionContext,
    signal: &ShutdownSignal,
    direction: Direction,
    result: &Result<StopReason, RelayError>,
) {
    match result {
        Ok(reason) => {
            debug!(session_id = %ctx.session_id, %direction, ?reason, "forwarder stopped");
        }
        Err(err @ (RelayError::LineTooLong { .. } | RelayError::TaskFailed { .. })) => {
            warn!(session_id = %ctx.session_id, %direction, %err, "forwarder failed");
        }
        Err(err) => {
            debug!(session_id = %ctx.session_id, %direction, %err, "forwarder I/O error");
        }
    }

    if signal.trigger() {
        debug!(session_id = %ctx.session_id, %direction, "closing both legs");
    }
}

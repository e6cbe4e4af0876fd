use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relay_tls::TlsAcceptor;
use tokio::net::{TcpListener, TcpStream};

use crate::error::RelayError;
use crate::inspect::{MessageInspector, SessionContext};
use crate::session::Session;
use crate::upstream::Upstream;

/// Pause after a failed accept, so descriptor exhaustion does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration for the proxy listener.
pub struct ProxyConfig {
    /// Address to accept miner connections on.
    pub listen_addr: SocketAddr,
    /// Terminates TLS for miners.
    pub acceptor: TlsAcceptor,
    /// The pool every session dials.
    pub upstream: Upstream,
    /// Applied to every client-to-pool line.
    pub inspector: Arc<dyn MessageInspector>,
    /// Longest line accepted from either peer.
    pub max_line_length: usize,
}

/// The TLS Stratum proxy server.
///
/// Accepts miner connections and runs one [`Session`] per connection in its
/// own Tokio task. There is no connection limit.
pub struct Proxy {
    config: Arc<ProxyConfig>,
}

impl Proxy {
    pub fn new(config: ProxyConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Bind `listen_addr` and accept connections forever.
    pub async fn run(&self) -> Result<(), RelayError> {
        let listener = TcpListener::bind(self.config.listen_addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: self.config.listen_addr.to_string(),
                source,
            })?;
        tracing::info!(addr = %self.config.listen_addr, "stratum proxy listening");

        self.serve(listener).await
    }

    /// Accept connections from an already-bound listener forever.
    ///
    /// Accept errors are logged and the loop continues after a short pause.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    tracing::warn!(%err, "failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let config = Arc::clone(&self.config);
            tokio::spawn(handle_connection(stream, remote_addr, config));
        }
    }
}

/// Handle a single miner connection from TLS handshake through teardown.
async fn handle_connection(stream: TcpStream, remote_addr: SocketAddr, config: Arc<ProxyConfig>) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!(%remote_addr, %err, "failed to set TCP_NODELAY");
    }

    let client = match config.acceptor.accept(stream).await {
        Ok(client) => client,
        Err(err) => {
            tracing::debug!(%remote_addr, %err, "client TLS handshake failed");
            return;
        }
    };

    let ctx = SessionContext::new(remote_addr, config.upstream.addr());
    let session_id = ctx.session_id;

    tracing::info!(%session_id, %remote_addr, "client connected");

    let session = match Session::establish(
        ctx,
        client,
        &config.upstream,
        Arc::clone(&config.inspector),
        config.max_line_length,
    )
    .await
    {
        Ok(session) => session,
        Err(err) => {
            tracing::warn!(%session_id, %remote_addr, %err, "upstream unavailable, closing client");
            return;
        }
    };

    session.run().await;
}

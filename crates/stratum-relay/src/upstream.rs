use relay_tls::TlsConnector;
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;

use crate::error::RelayError;

/// The pool every session dials.
#[derive(Clone)]
pub struct Upstream {
    addr: String,
    server_name: String,
    connector: TlsConnector,
}

impl Upstream {
    /// `addr` is `host:port`. An empty host (`:1177`) means `localhost`.
    ///
    /// The TLS server name defaults to the host part of `addr`.
    pub fn new(addr: &str, server_name: Option<String>, connector: TlsConnector) -> Self {
        let (addr, host) = normalize_addr(addr);
        Self {
            server_name: server_name.unwrap_or(host),
            addr,
            connector,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Open a TCP connection to the pool and run the TLS handshake.
    pub async fn connect(&self) -> Result<TlsStream<TcpStream>, RelayError> {
        let tcp = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| RelayError::Connect {
                addr: self.addr.clone(),
                source,
            })?;

        if let Err(err) = tcp.set_nodelay(true) {
            tracing::debug!(addr = %self.addr, %err, "failed to set TCP_NODELAY");
        }

        self.connector
            .connect(tcp, &self.server_name)
            .await
            .map_err(|source| RelayError::UpstreamTls {
                addr: self.addr.clone(),
                source,
            })
    }
}

/// Split `host:port`, filling in `localhost` for an empty host.
///
/// Returns the dialable address and the bare host (IPv6 brackets removed).
fn normalize_addr(addr: &str) -> (String, String) {
    let Some((host, port)) = addr.rsplit_once(':') else {
        return (addr.to_string(), addr.to_string());
    };

    if host.is_empty() {
        return (format!("localhost:{port}"), "localhost".to_string());
    }

    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    (addr.to_string(), bare.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector() -> TlsConnector {
        TlsConnector::new_insecure().unwrap()
    }

    #[test]
    fn host_and_port() {
        let upstream = Upstream::new("pool.example.com:3333", None, connector());
        assert_eq!(upstream.addr(), "pool.example.com:3333");
        assert_eq!(upstream.server_name(), "pool.example.com");
    }

    #[test]
    fn empty_host_means_localhost() {
        let upstream = Upstream::new(":1177", None, connector());
        assert_eq!(upstream.addr(), "localhost:1177");
        assert_eq!(upstream.server_name(), "localhost");
    }

    #[test]
    fn ipv6_brackets_are_stripped_from_server_name() {
        let upstream = Upstream::new("[::1]:1177", None, connector());
        assert_eq!(upstream.addr(), "[::1]:1177");
        assert_eq!(upstream.server_name(), "::1");
    }

    #[test]
    fn explicit_server_name_wins() {
        let upstream = Upstream::new(
            "10.0.0.5:443",
            Some("stratum.example.org".to_string()),
            connector(),
        );
        assert_eq!(upstream.addr(), "10.0.0.5:443");
        assert_eq!(upstream.server_name(), "stratum.example.org");
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let upstream = Upstream::new(&addr.to_string(), None, connector());
        let err = upstream.connect().await.err().unwrap();
        assert!(matches!(err, RelayError::Connect { .. }));
    }

    #[tokio::test]
    async fn non_tls_peer_is_a_handshake_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Accept and immediately hang up without speaking TLS.
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let upstream = Upstream::new(&addr.to_string(), None, connector());
        let err = upstream.connect().await.err().unwrap();
        assert!(matches!(err, RelayError::UpstreamTls { .. }));
    }
}

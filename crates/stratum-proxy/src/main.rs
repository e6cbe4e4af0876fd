mod cli;
mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use credential_rewrite::{CredentialRewriter, Credentials};
use relay_tls::{TlsAcceptor, TlsConnector};
use stratum_relay::{MessageInspector, Proxy, ProxyConfig, Upstream};

use crate::cli::Cli;
use crate::config::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let loaded = config::load(&cli.config)?;
    let config_found = loaded.is_some();
    let mut cfg = loaded.unwrap_or_default();
    cfg.apply_cli(&cli);

    // 3. Init tracing-subscriber.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    match cfg.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init(),
    }

    if !config_found {
        warn!(
            path = %cli.config.display(),
            "configuration file not found; using defaults"
        );
    }

    cfg.validate().context("invalid configuration")?;
    let listen_addr = cfg.listen_addr()?;

    info!(
        config_file = %cli.config.display(),
        listen = %listen_addr,
        upstream = %cfg.network.upstream_addr,
        replaced_user = %cfg.credentials.user,
        "stratum-proxy starting"
    );

    // 4. TLS for both legs.
    let acceptor = TlsAcceptor::from_pem_files(&cfg.tls.cert_path, &cfg.tls.key_path)
        .context("failed to load server certificate and key")?;
    let connector =
        TlsConnector::new_insecure().context("failed to build upstream TLS connector")?;

    let upstream = Upstream::new(
        &cfg.network.upstream_addr,
        cfg.network.upstream_server_name.clone(),
        connector,
    );

    warn!(
        upstream = %upstream.addr(),
        server_name = %upstream.server_name(),
        "upstream certificate verification is disabled"
    );

    // 5. Credential rewriter, shared read-only by every session.
    let credentials = Credentials::new(
        cfg.credentials.user.clone(),
        cfg.credentials.password.clone(),
    );
    let inspector: Arc<dyn MessageInspector> = Arc::new(CredentialRewriter::new(credentials));

    // 6. Run the proxy until it fails or a shutdown signal arrives.
    let proxy = Proxy::new(ProxyConfig {
        listen_addr,
        acceptor,
        upstream,
        inspector,
        max_line_length: cfg.relay.max_line_length,
    });

    tokio::select! {
        result = proxy.run() => {
            result.context("proxy stopped")?;
        }
        _ = shutdown_signal() => {}
    }

    info!("stratum-proxy shutting down");
    Ok(())
}

/// Resolve on SIGINT (ctrl-c) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(%err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        let sigterm = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(err) => {
                    warn!(%err, "failed to register SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT (ctrl-c)"),
            _ = sigterm => info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        info!("received SIGINT (ctrl-c)");
    }
}

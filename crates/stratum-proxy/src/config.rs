use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::cli::Cli;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
    #[serde(default = "default_upstream")]
    pub upstream_addr: String,
    /// SNI name sent to the pool; defaults to the host part of `upstream_addr`.
    #[serde(default)]
    pub upstream_server_name: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen(),
            upstream_addr: default_upstream(),
            upstream_server_name: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TlsConfig {
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: default_cert_path(),
            key_path: default_key_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: default_password(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_line_length: default_max_line_length(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_listen() -> String {
    "0.0.0.0:9999".to_string()
}

fn default_upstream() -> String {
    "127.0.0.1:1177".to_string()
}

fn default_cert_path() -> PathBuf {
    PathBuf::from("server.pem")
}

fn default_key_path() -> PathBuf {
    PathBuf::from("server.key")
}

fn default_password() -> String {
    "x".to_string()
}

fn default_max_line_length() -> usize {
    stratum_relay::DEFAULT_MAX_LINE_LENGTH
}

fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// Returns `None` if the file does not exist, so the proxy can run from CLI
/// flags alone. The caller reports the missing file once logging is up.
pub fn load(path: &Path) -> anyhow::Result<Option<Config>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    parse(&contents)
        .map(Some)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))
}

fn parse(contents: &str) -> Result<Config, serde_yml::Error> {
    serde_yml::from_str(contents)
}

impl Config {
    /// Apply command-line overrides on top of the file settings.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(ref listen) = cli.listen_addr {
            self.network.listen_addr = listen.clone();
        }
        if let Some(ref upstream) = cli.server_addr {
            self.network.upstream_addr = upstream.clone();
        }
        if let Some(ref pem) = cli.server_pem {
            self.tls.cert_path = pem.clone();
        }
        if let Some(ref key) = cli.server_key {
            self.tls.key_path = key.clone();
        }
        if let Some(ref user) = cli.replaced_user {
            self.credentials.user = user.clone();
        }
        if let Some(ref password) = cli.replaced_password {
            self.credentials.password = password.clone();
        }
        if let Some(ref level) = cli.log_level {
            self.logging.level = level.clone();
        }
    }

    /// The listen address as a socket address. A bare `:port` listens on all
    /// IPv4 interfaces.
    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = &self.network.listen_addr;
        let full = if addr.starts_with(':') {
            format!("0.0.0.0{addr}")
        } else {
            addr.clone()
        };
        full.parse::<SocketAddr>()
            .with_context(|| format!("invalid listen address '{addr}'"))
    }

    /// Reject settings the proxy cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.credentials.user.trim().is_empty() {
            anyhow::bail!(
                "no replacement user configured (set credentials.user or --replaced-user)"
            );
        }
        if self.relay.max_line_length == 0 {
            anyhow::bail!("relay.max_line_length must be greater than zero");
        }
        if self.network.upstream_addr.trim().is_empty() {
            anyhow::bail!("network.upstream_addr must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn empty_file_uses_defaults() {
        let config = parse("{}").unwrap();
        assert_eq!(config.network.listen_addr, "0.0.0.0:9999");
        assert_eq!(config.network.upstream_addr, "127.0.0.1:1177");
        assert!(config.network.upstream_server_name.is_none());
        assert_eq!(config.tls.cert_path, PathBuf::from("server.pem"));
        assert_eq!(config.tls.key_path, PathBuf::from("server.key"));
        assert_eq!(config.credentials.password, "x");
        assert_eq!(
            config.relay.max_line_length,
            stratum_relay::DEFAULT_MAX_LINE_LENGTH
        );
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn full_file() {
        let yaml = r#"
            network:
              listen_addr: "127.0.0.1:3334"
              upstream_addr: "pool.example.com:443"
              upstream_server_name: "stratum.example.com"
            tls:
              cert_path: /etc/stratum/cert.pem
              key_path: /etc/stratum/key.pem
            credentials:
              user: wallet.farm
              password: secret
            relay:
              max_line_length: 4096
            logging:
              level: debug
              format: pretty
        "#;
        let config = parse(yaml).unwrap();
        assert_eq!(config.network.listen_addr, "127.0.0.1:3334");
        assert_eq!(config.network.upstream_addr, "pool.example.com:443");
        assert_eq!(
            config.network.upstream_server_name.as_deref(),
            Some("stratum.example.com")
        );
        assert_eq!(config.tls.cert_path, PathBuf::from("/etc/stratum/cert.pem"));
        assert_eq!(config.credentials.user, "wallet.farm");
        assert_eq!(config.credentials.password, "secret");
        assert_eq!(config.relay.max_line_length, 4096);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn cli_overrides_file() {
        let mut config = parse("credentials:\n  user: from-file\n").unwrap();
        let cli = Cli::parse_from([
            "stratum-proxy",
            "--listen-addr",
            "127.0.0.1:7000",
            "--server-addr",
            "pool:1177",
            "--replaced-user",
            "bob",
            "--replaced-password",
            "pw",
        ]);

        config.apply_cli(&cli);
        assert_eq!(config.network.listen_addr, "127.0.0.1:7000");
        assert_eq!(config.network.upstream_addr, "pool:1177");
        assert_eq!(config.credentials.user, "bob");
        assert_eq!(config.credentials.password, "pw");
        // Untouched settings keep their file/default values.
        assert_eq!(config.tls.cert_path, PathBuf::from("server.pem"));
    }

    #[test]
    fn missing_user_is_rejected() {
        let config = Config::default();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("replacement user"));
    }

    #[test]
    fn zero_line_length_is_rejected() {
        let config = parse("credentials:\n  user: bob\nrelay:\n  max_line_length: 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bare_port_listens_on_all_interfaces() {
        let mut config = Config::default();
        config.network.listen_addr = ":9999".to_string();
        assert_eq!(
            config.listen_addr().unwrap(),
            "0.0.0.0:9999".parse::<SocketAddr>().unwrap()
        );

        config.network.listen_addr = "not an address".to_string();
        assert!(config.listen_addr().is_err());
    }

    #[test]
    fn missing_file_is_reported_as_absent() {
        let loaded = load(Path::new("/nonexistent/stratum-proxy.yaml")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn existing_file_is_loaded() {
        let dir = std::env::temp_dir().join(format!("stratum-proxy-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(&path, "credentials:\n  user: bob\n").unwrap();

        let config = load(&path).unwrap().unwrap();
        assert_eq!(config.credentials.user, "bob");
    }
}

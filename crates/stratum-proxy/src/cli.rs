use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "stratum-proxy",
    version,
    about = "TLS Stratum proxy that substitutes worker credentials"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "stratum-proxy.yaml")]
    pub config: PathBuf,

    /// Address to accept miner connections on (overrides config file setting)
    #[arg(long)]
    pub listen_addr: Option<String>,

    /// Address of the upstream pool (overrides config file setting)
    #[arg(long)]
    pub server_addr: Option<String>,

    /// Path to the server certificate PEM file (overrides config file setting)
    #[arg(long)]
    pub server_pem: Option<PathBuf>,

    /// Path to the server private key PEM file (overrides config file setting)
    #[arg(long)]
    pub server_key: Option<PathBuf>,

    /// Replacement worker user (overrides config file setting)
    #[arg(long)]
    pub replaced_user: Option<String>,

    /// Replacement worker password (overrides config file setting)
    #[arg(long)]
    pub replaced_password: Option<String>,

    /// Log level filter (overrides config file setting; RUST_LOG wins over both)
    #[arg(long)]
    pub log_level: Option<String>,
}

//! TLS for both legs of the Stratum proxy.
//!
//! ```text
//! Miner  <--TLS-->  [TlsAcceptor] proxy [TlsConnector]  <--TLS-->  Pool
//! ```
//!
//! The miner-facing side presents a certificate loaded from PEM files. The
//! pool-facing side encrypts but does not verify the pool's certificate; see
//! [`TlsConnector`].

mod acceptor;
mod connector;
mod error;

pub use acceptor::TlsAcceptor;
pub use connector::TlsConnector;
pub use error::TlsError;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Load every certificate in a PEM file (leaf first for a chain).
pub(crate) fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::cert_load(path, e.to_string()))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::cert_load(path, e.to_string()))
}

/// Load the first private key (PKCS#1, PKCS#8 or SEC1) in a PEM file.
pub(crate) fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|e| TlsError::key_load(path, e.to_string()))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| TlsError::key_load(path, e.to_string()))?
        .ok_or_else(|| TlsError::key_load(path, "no private key found in file"))
}

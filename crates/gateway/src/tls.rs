//! TLS listener configuration.
//!
//! The gateway only speaks mutual TLS: every client must present a
//! certificate chaining to the configured CA bundle.

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::version::{TLS12, TLS13};
use rustls::{RootCertStore, ServerConfig, SupportedProtocolVersion};
use std::sync::Arc;

use qpu_core::{
    config::{TlsConfig, TlsVersion},
    Error, Result,
};

static TLS13_ONLY: &[&SupportedProtocolVersion] = &[&TLS13];
static TLS12_AND_UP: &[&SupportedProtocolVersion] = &[&TLS13, &TLS12];

/// Build the rustls server configuration for the listener.
pub fn build_server_config(config: &TlsConfig) -> Result<ServerConfig> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let certs = load_certs(&config.cert_path)?;
    let key = load_private_key(&config.key_path)?;
    let roots = load_client_roots(&config.client_ca_path)?;

    let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
        .build()
        .map_err(|e| Error::tls(format!("client verifier error: {}", e)))?;

    let versions = match config.min_version {
        TlsVersion::Tls13 => TLS13_ONLY,
        TlsVersion::Tls12 => TLS12_AND_UP,
    };

    let mut server_config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(versions)
        .map_err(|e| Error::tls(format!("unsupported protocol versions: {}", e)))?
        .with_client_cert_verifier(verifier)
        .with_single_cert(certs, key)
        .map_err(|e| Error::tls(format!("server certificate rejected: {}", e)))?;

    server_config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    tracing::debug!(
        cert = %config.cert_path,
        client_ca = %config.client_ca_path,
        min_version = ?config.min_version,
        "TLS configuration loaded"
    );

    Ok(server_config)
}

fn load_certs(path: &str) -> Result<Vec<CertificateDer<'static>>> {
    let certs = CertificateDer::pem_file_iter(path)
        .map_err(|e| Error::tls(format!("failed to open {}: {}", path, e)))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::tls(format!("failed to parse certificates in {}: {}", path, e)))?;
    if certs.is_empty() {
        return Err(Error::tls(format!("no certificates found in {}", path)));
    }
    Ok(certs)
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>> {
    PrivateKeyDer::from_pem_file(path)
        .map_err(|e| Error::tls(format!("failed to load private key {}: {}", path, e)))
}

fn load_client_roots(path: &str) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| Error::tls(format!("invalid client CA in {}: {}", path, e)))?;
    }
    Ok(roots)
}

//! TLS bootstrap for TN3270 connections
//!
//! The connection driver never looks at certificates. It hands a connected
//! socket to a [`TlsHandshake`] and gets back either an encrypted stream or
//! a [`TlsError`] with a reason for display. The same hook serves
//! TLS-from-start and START-TLS.

use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, info, warn};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme, StreamOwned};

use crate::config::SessionConfig;
use crate::error::TlsError;

/// Anything the connection can read from and write to
pub trait ReadWrite: Read + Write {}
impl<T: Read + Write> ReadWrite for T {}

/// The stream the connection talks through once TLS is up
pub type SecureStream = Box<dyn ReadWrite + Send>;

/// Largest CA bundle we are willing to read
const MAX_CA_BUNDLE: u64 = 10 * 1024 * 1024;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

/// Pluggable TLS handshake
///
/// Called with a socket in blocking mode; the connection restores its own
/// timeouts afterwards.
pub trait TlsHandshake: Send {
    fn handshake(&self, host: &str, stream: TcpStream) -> Result<SecureStream, TlsError>;
}

/// rustls-backed handshake
#[derive(Debug, Clone)]
pub struct RustlsHandshake {
    config: Arc<ClientConfig>,
}

impl RustlsHandshake {
    /// Build a client configuration. With `verify` off any server
    /// certificate is accepted.
    pub fn new(verify: bool, ca_bundle: Option<&Path>) -> Result<Self, TlsError> {
        let config = if verify {
            let roots = trust_store(ca_bundle)?;
            ClientConfig::builder()
                .with_root_certificates(roots)
                .with_no_client_auth()
        } else {
            warn!("TLS certificate verification is disabled");
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoCertificateVerification::new()))
                .with_no_client_auth()
        };
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn from_config(config: &SessionConfig) -> Result<Self, TlsError> {
        Self::new(config.tls_verify, config.tls_ca_bundle.as_deref())
    }
}

impl TlsHandshake for RustlsHandshake {
    fn handshake(&self, host: &str, mut stream: TcpStream) -> Result<SecureStream, TlsError> {
        let name = ServerName::try_from(host.to_string())
            .map_err(|_| TlsError::InvalidServerName(host.to_string()))?;
        let mut conn = ClientConnection::new(Arc::clone(&self.config), name)
            .map_err(|e| TlsError::Handshake(e.to_string()))?;

        debug!("Starting TLS handshake with {host}");
        while conn.is_handshaking() {
            conn.complete_io(&mut stream)
                .map_err(|e| TlsError::Handshake(e.to_string()))?;
        }
        info!(
            "TLS established with {host} ({:?})",
            conn.negotiated_cipher_suite().map(|s| s.suite())
        );
        Ok(Box::new(StreamOwned::new(conn, stream)))
    }
}

/// Bundled web roots, the platform store, then the configured bundle
fn trust_store(ca_bundle: Option<&Path>) -> Result<RootCertStore, TlsError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    match rustls_native_certs::load_native_certs() {
        Ok(certs) => {
            let (added, ignored) = roots.add_parsable_certificates(certs);
            debug!("Platform trust store: {added} certificates added, {ignored} ignored");
        }
        Err(e) => warn!("Platform trust store unavailable: {e}"),
    }

    if let Some(path) = ca_bundle {
        let mut added = 0;
        for der in load_ca_bundle(path)? {
            match roots.add(der) {
                Ok(()) => added += 1,
                Err(e) => warn!("Skipping certificate in {}: {e}", path.display()),
            }
        }
        if added == 0 {
            return Err(TlsError::TrustStore(format!(
                "no usable certificates in {}",
                path.display()
            )));
        }
        info!("Added {added} trusted CA certificates from {}", path.display());
    }
    Ok(roots)
}

/// Read a CA bundle: PEM text with one or more certificates, or a single
/// DER certificate
pub fn load_ca_bundle(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let bundle_error = |reason: String| TlsError::TrustStore(format!("{}: {reason}", path.display()));

    let size = fs::metadata(path).map_err(|e| bundle_error(e.to_string()))?.len();
    if size > MAX_CA_BUNDLE {
        return Err(bundle_error(format!("bundle is {size} bytes")));
    }
    let bytes = fs::read(path).map_err(|e| bundle_error(e.to_string()))?;

    match std::str::from_utf8(&bytes) {
        Ok(text) if text.contains(PEM_BEGIN) => parse_pem_certificates(text).map_err(bundle_error),
        _ => Ok(vec![CertificateDer::from(bytes)]),
    }
}

/// Decode every `BEGIN CERTIFICATE` block in `text`
pub fn parse_pem_certificates(text: &str) -> Result<Vec<CertificateDer<'static>>, String> {
    let mut certs = Vec::new();
    let mut start = 0;

    while let Some(b) = text[start..].find(PEM_BEGIN) {
        let body_start = start + b + PEM_BEGIN.len();
        let Some(e) = text[body_start..].find(PEM_END) else {
            return Err("unterminated certificate block".to_string());
        };
        let body_end = body_start + e;
        let b64: String = text[body_start..body_end]
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let der = STANDARD
            .decode(b64.as_bytes())
            .map_err(|e| format!("certificate {}: {e}", certs.len() + 1))?;
        certs.push(CertificateDer::from(der));
        start = body_end + PEM_END.len();
    }

    if certs.is_empty() {
        return Err("no certificates found".to_string());
    }
    Ok(certs)
}

/// Accepts any server certificate; signatures are still checked so the
/// handshake itself is sound
#[derive(Debug)]
struct NoCertificateVerification {
    algorithms: WebPkiSupportedAlgorithms,
}

impl NoCertificateVerification {
    fn new() -> Self {
        Self {
            algorithms: rustls::crypto::ring::default_provider().signature_verification_algorithms,
        }
    }
}

impl ServerCertVerifier for NoCertificateVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}

//! Error taxonomy for tn3270r
//!
//! Only transport, TLS and configuration failures ever reach a caller as an
//! `Err`. Protocol syntax errors, negotiation refusals and BIND validation
//! problems are absorbed by the session engine and surface as
//! [`Diagnostic`] values instead.

use std::fmt;
use std::io;

use thiserror::Error;

/// Top-level error type for tn3270r operations
#[derive(Debug, Error)]
pub enum Tn3270Error {
    /// Socket-level failures
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    /// TLS handshake or certificate failures
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Tn3270Error {
    /// Whether the error ends the connection it occurred on
    pub fn is_connection_terminating(&self) -> bool {
        matches!(self, Tn3270Error::Network(_) | Tn3270Error::Tls(_))
    }
}

impl From<io::Error> for Tn3270Error {
    fn from(err: io::Error) -> Self {
        Tn3270Error::Network(NetworkError::Io(err))
    }
}

/// Result type alias using [`Tn3270Error`]
pub type Result<T> = std::result::Result<T, Tn3270Error>;

/// Transport errors
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Name resolution produced no usable address
    #[error("Cannot resolve {host}:{port}: {reason}")]
    DnsResolution { host: String, port: u16, reason: String },
    /// Every resolved address failed; carries the last failure
    #[error("Connection to {host}:{port} failed after {attempts} attempt(s): {last_error}")]
    ConnectFailed {
        host: String,
        port: u16,
        attempts: usize,
        last_error: io::Error,
    },
    /// Peer closed the connection
    #[error("Connection closed by host")]
    ConnectionClosed,
    /// Operation requires an established connection
    #[error("Not connected")]
    NotConnected,
    /// Read or write failure on an established connection
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// TLS errors
#[derive(Debug, Error)]
pub enum TlsError {
    /// No TLS implementation was supplied to the connection
    #[error("TLS requested but no TLS support is configured")]
    Unsupported,
    /// Host name is not usable as a TLS server name
    #[error("Invalid TLS server name '{0}'")]
    InvalidServerName(String),
    /// Trust store could not be built
    #[error("Cannot load trusted certificates: {0}")]
    TrustStore(String),
    /// The handshake failed; the reason is passed through for display
    #[error("TLS handshake failed: {0}")]
    Handshake(String),
    /// Socket failure during the handshake
    #[error("I/O error during TLS handshake: {0}")]
    Io(#[from] io::Error),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration parameter
    #[error("Invalid value '{value}' for {parameter}: {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    /// Configuration file could not be read or written
    #[error("Configuration file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: io::Error,
    },
    /// Configuration file is not valid JSON for a session
    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Non-fatal conditions reported through
/// [`HostSession::diagnostic`](crate::protocol_common::traits::HostSession::diagnostic)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Malformed telnet or TN3270E syntax that was skipped
    ProtocolSyntax(String),
    /// The host refused something and the session fell back
    NegotiationRefused(String),
    /// TN3270E was abandoned; plain TN3270 negotiation continues
    Tn3270eAbandoned(String),
    /// A BIND image was ignored or its geometry rejected
    BindRejected(String),
    /// A record arrived that the current mode cannot use
    RecordDiscarded(String),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ProtocolSyntax(msg) => write!(f, "Protocol error: {msg}"),
            Diagnostic::NegotiationRefused(msg) => write!(f, "Negotiation refused: {msg}"),
            Diagnostic::Tn3270eAbandoned(msg) => write!(f, "TN3270E abandoned: {msg}"),
            Diagnostic::BindRejected(msg) => write!(f, "BIND rejected: {msg}"),
            Diagnostic::RecordDiscarded(msg) => write!(f, "Record discarded: {msg}"),
        }
    }
}

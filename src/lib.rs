//! tn3270r: TELNET/TN3270E connection and negotiation engine
//!
//! The crate carries a 3270 terminal session from TCP connect to delivered
//! records: option negotiation, TN3270E device-type and functions exchange,
//! BIND/UNBIND tracking, record framing, and TLS (from the start or through
//! START-TLS). Screen handling is left to a [`HostSession`] implementation.
//!
//! - [`session::Tn3270Session`] is the protocol core with no I/O.
//! - [`network::Tn3270Connection`] drives a session over a socket.

/// PROTOCOL COMMON: telnet framing, EBCDIC, and the consumer boundary
pub mod protocol_common;

/// LIB3270: TN3270E messages, BIND images, record framing
pub mod lib3270;

pub mod config;
pub mod error;
pub mod network;
pub mod session;
pub mod telnet_negotiation;
pub mod tls;

pub use config::SessionConfig;
pub use error::{Diagnostic, Result, Tn3270Error};
pub use network::{ConnectionState, Tn3270Connection};
pub use protocol_common::traits::{DataStreamResult, HostSession};
pub use session::{ConnectionMode, NetStats, Tn3270Session};
pub use tls::{RustlsHandshake, SecureStream, TlsHandshake};

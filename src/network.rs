//! Network module for TN3270 connections
//!
//! [`Tn3270Connection`] owns the socket and drives a [`Tn3270Session`]:
//! resolve, connect to each address in turn, optional TLS from the start,
//! then a read/process/write pump. START-TLS is sequenced here because it
//! needs the raw socket.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{NetworkError, Result, TlsError};
use crate::protocol_common::traits::HostSession;
use crate::session::{ConnectionMode, Tn3270Session};
use crate::tls::{SecureStream, TlsHandshake};

/// Default wait per read attempt
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const READ_BUFFER_SIZE: usize = 4096;

/// Where the connection is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    NotConnected,
    Resolving,
    Connecting,
    /// TLS handshake in progress
    TlsPending,
    /// Connected, no mode agreed yet
    Negotiating,
    Connected(ConnectionMode),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::NotConnected => f.write_str("not connected"),
            ConnectionState::Resolving => f.write_str("resolving"),
            ConnectionState::Connecting => f.write_str("connecting"),
            ConnectionState::TlsPending => f.write_str("TLS handshake"),
            ConnectionState::Negotiating => f.write_str("negotiating"),
            ConnectionState::Connected(mode) => write!(f, "connected in {mode} mode"),
        }
    }
}

/// One TN3270 connection and the consumer it feeds
pub struct Tn3270Connection<H: HostSession> {
    config: SessionConfig,
    session: Tn3270Session,
    host: H,
    tls: Option<Box<dyn TlsHandshake>>,
    stream: Option<SecureStream>,
    // Second handle on the same socket, for timeouts and shutdown
    socket: Option<TcpStream>,
    state: ConnectionState,
    poll_interval: Duration,
    read_buf: Vec<u8>,
}

impl<H: HostSession> Tn3270Connection<H> {
    /// A connection without TLS support: TLS-from-start fails and
    /// START-TLS is refused
    pub fn new(config: SessionConfig, host: H) -> Self {
        let session = Tn3270Session::new(&config);
        Self {
            config,
            session,
            host,
            tls: None,
            stream: None,
            socket: None,
            state: ConnectionState::NotConnected,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_buf: vec![0; READ_BUFFER_SIZE],
        }
    }

    pub fn with_tls(config: SessionConfig, host: H, tls: Box<dyn TlsHandshake>) -> Self {
        let mut conn = Self::new(config, host);
        conn.tls = Some(tls);
        conn
    }

    pub fn set_poll_interval(&mut self, interval: Duration) {
        self.poll_interval = interval;
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    pub fn tls_is_active(&self) -> bool {
        self.session.is_secure()
    }

    pub fn session(&self) -> &Tn3270Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Tn3270Session {
        &mut self.session
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Resolve, connect and (if configured) run the TLS handshake. The
    /// session is reset first, so this also reconnects.
    pub fn connect(&mut self) -> Result<()> {
        self.disconnect();
        let result = self.establish();
        if result.is_err() {
            self.disconnect();
        }
        result
    }

    fn establish(&mut self) -> Result<()> {
        let host = self.config.host.clone();
        let port = self.config.port;

        self.state = ConnectionState::Resolving;
        let addrs = resolve(&host, port)?;

        self.state = ConnectionState::Connecting;
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let tcp = connect_any(&host, port, &addrs, timeout)?;
        tcp.set_nodelay(true)?;

        let raw = tcp.try_clone()?;
        let stream: SecureStream = if self.config.use_tls() {
            self.state = ConnectionState::TlsPending;
            let tls = self.tls.as_ref().ok_or(TlsError::Unsupported)?;
            let secure = tls.handshake(&host, raw)?;
            self.session.tls_established();
            secure
        } else {
            Box::new(raw)
        };

        tcp.set_read_timeout(Some(self.poll_interval))?;
        self.socket = Some(tcp);
        self.stream = Some(stream);
        self.session
            .set_tls_available(self.config.starttls && self.tls.is_some());
        self.update_state();
        info!("Connected to {host}:{port}{}", if self.tls_is_active() { " (TLS)" } else { "" });
        Ok(())
    }

    /// Close the socket and reset the session
    pub fn disconnect(&mut self) {
        if let Some(socket) = self.socket.take() {
            let _ = socket.shutdown(std::net::Shutdown::Both);
            debug!("Disconnected from {}:{}", self.config.host, self.config.port);
        }
        self.stream = None;
        self.session.reset();
        self.state = ConnectionState::NotConnected;
    }

    /// Wait up to one poll interval for input, process it, and write any
    /// replies. Returns the number of bytes read; 0 when nothing arrived.
    pub fn poll(&mut self) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(NetworkError::NotConnected)?;
        let n = match stream.read(&mut self.read_buf) {
            Ok(0) => {
                info!("Host closed the connection");
                self.disconnect();
                return Err(NetworkError::ConnectionClosed.into());
            }
            Ok(n) => n,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => {
                self.flush()?;
                return Ok(0);
            }
            Err(e) => {
                warn!("Read failed: {e}");
                self.disconnect();
                return Err(NetworkError::Io(e).into());
            }
        };

        let consumed = self.session.process_input(&self.read_buf[..n], &mut self.host);
        self.flush()?;
        if self.session.starttls_pending() {
            if consumed < n {
                warn!("Dropping {} bytes received before the TLS handshake", n - consumed);
            }
            if let Err(e) = self.start_tls() {
                self.disconnect();
                return Err(e);
            }
        }
        self.update_state();
        Ok(n)
    }

    /// Poll until `done` returns true or `timeout` passes. Returns whether
    /// `done` was satisfied.
    pub fn run_until<F>(&mut self, timeout: Duration, mut done: F) -> Result<bool>
    where
        F: FnMut(&Tn3270Session, &H) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if done(&self.session, &self.host) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            self.poll()?;
        }
    }

    /// Queue a record for the current mode and write it out
    pub fn send_record(&mut self, data: &[u8]) -> Result<()> {
        self.session.send_record(data);
        self.flush()
    }

    /// Queue NVT data and write it out
    pub fn send_nvt(&mut self, data: &[u8]) -> Result<()> {
        self.session.send_nvt(data);
        self.flush()
    }

    /// Write everything the session has queued
    pub fn flush(&mut self) -> Result<()> {
        if !self.session.has_output() {
            return Ok(());
        }
        let stream = self.stream.as_mut().ok_or(NetworkError::NotConnected)?;
        let out = self.session.take_output();
        stream.write_all(&out)?;
        stream.flush()?;
        Ok(())
    }

    fn start_tls(&mut self) -> Result<()> {
        self.state = ConnectionState::TlsPending;
        let socket = self.socket.as_ref().ok_or(NetworkError::NotConnected)?;
        // The handshake runs in blocking mode
        socket.set_read_timeout(None)?;
        let raw = socket.try_clone()?;

        let tls = self.tls.as_ref().ok_or(TlsError::Unsupported)?;
        let secure = tls.handshake(&self.config.host, raw)?;

        socket.set_read_timeout(Some(self.poll_interval))?;
        self.stream = Some(secure);
        self.session.tls_established();
        Ok(())
    }

    fn update_state(&mut self) {
        self.state = if self.stream.is_none() {
            ConnectionState::NotConnected
        } else if self.session.starttls_pending() {
            ConnectionState::TlsPending
        } else if self.session.mode() == ConnectionMode::Initial {
            ConnectionState::Negotiating
        } else {
            ConnectionState::Connected(self.session.mode())
        };
    }
}

impl<H: HostSession> fmt::Debug for Tn3270Connection<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tn3270Connection")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state)
            .field("tls", &self.tls_is_active())
            .finish()
    }
}

/// All addresses for `host:port`, in resolver order
pub fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let dns_error = |reason: String| NetworkError::DnsResolution {
        host: host.to_string(),
        port,
        reason,
    };
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| dns_error(e.to_string()))?
        .collect();
    if addrs.is_empty() {
        return Err(dns_error("no addresses".to_string()).into());
    }
    debug!("{host}:{port} resolved to {addrs:?}");
    Ok(addrs)
}

/// Try each address in order; the first that connects wins
pub fn connect_any(host: &str, port: u16, addrs: &[SocketAddr], timeout: Duration) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        debug!("Trying {addr}");
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                warn!("Connect to {addr} failed: {e}");
                last_error = Some(e);
            }
        }
    }
    Err(NetworkError::ConnectFailed {
        host: host.to_string(),
        port,
        attempts: addrs.len(),
        last_error: last_error
            .unwrap_or_else(|| std::io::Error::new(ErrorKind::AddrNotAvailable, "no addresses")),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Tn3270Error;
    use crate::lib3270::record::Transmitter;
    use crate::protocol_common::traits::DataStreamResult;
    use std::net::TcpListener;

    struct Null;

    impl HostSession for Null {
        fn process_ds(&mut self, _record: &[u8], _tx: &mut Transmitter) -> DataStreamResult {
            DataStreamResult::OkayNoOutput
        }
        fn write_sscp_lu(&mut self, _record: &[u8], _tx: &mut Transmitter) {}
        fn ansi_process(&mut self, _byte: u8) {}
    }

    fn config(port: u16) -> SessionConfig {
        SessionConfig {
            host: "127.0.0.1".to_string(),
            port,
            connect_timeout_secs: 2,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn test_new_connection_is_idle() {
        let conn = Tn3270Connection::new(config(23), Null);
        assert_eq!(conn.state(), ConnectionState::NotConnected);
        assert!(!conn.is_connected());
        assert!(!conn.tls_is_active());
    }

    #[test]
    fn test_poll_requires_connection() {
        let mut conn = Tn3270Connection::new(config(23), Null);
        assert!(matches!(
            conn.poll(),
            Err(Tn3270Error::Network(NetworkError::NotConnected))
        ));
    }

    #[test]
    fn test_connect_refused_reports_attempts() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut conn = Tn3270Connection::new(config(port), Null);
        match conn.connect() {
            Err(Tn3270Error::Network(NetworkError::ConnectFailed { attempts, .. })) => {
                assert_eq!(attempts, 1)
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(conn.state(), ConnectionState::NotConnected);
    }

    #[test]
    fn test_tls_without_hook_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut cfg = config(listener.local_addr().unwrap().port());
        cfg.tls = Some(true);
        let mut conn = Tn3270Connection::new(cfg, Null);
        assert!(matches!(
            conn.connect(),
            Err(Tn3270Error::Tls(TlsError::Unsupported))
        ));
        assert!(!conn.is_connected());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(
            ConnectionState::Connected(ConnectionMode::Tn3270).to_string(),
            "connected in TN3270 mode"
        );
    }
}

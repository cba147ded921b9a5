//! Connection driver against a scripted host on the loopback interface

mod utils;

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tn3270r::error::{NetworkError, TlsError};
use tn3270r::{
    ConnectionMode, ConnectionState, SecureStream, SessionConfig, Tn3270Connection, Tn3270Error,
    TlsHandshake,
};
use utils::*;

fn loopback_config(port: u16) -> SessionConfig {
    SessionConfig {
        host: "127.0.0.1".to_string(),
        port,
        connect_timeout_secs: 5,
        ..SessionConfig::default()
    }
}

/// Read from the host side until `needle` shows up
fn read_until(stream: &mut TcpStream, seen: &mut Vec<u8>, needle: &[u8]) {
    stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut buf = [0u8; 512];
    while !contains(seen, needle) {
        assert!(Instant::now() < deadline, "host never saw {needle:?}, got {seen:?}");
        match stream.read(&mut buf) {
            Ok(0) => panic!("client closed early"),
            Ok(n) => seen.extend_from_slice(&buf[..n]),
            Err(_) => {}
        }
    }
}

#[test]
fn test_tn3270_session_over_loopback() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut seen = Vec::new();
        stream
            .write_all(&[
                IAC, DO, TTYPE, IAC, DO, BINARY, IAC, WILL, BINARY, IAC, DO, OPT_EOR, IAC, WILL,
                OPT_EOR,
            ])
            .unwrap();
        read_until(&mut stream, &mut seen, &[IAC, WILL, OPT_EOR]);
        stream.write_all(&record(&[0xF5, 0xC3, 0x11])).unwrap();
        read_until(&mut stream, &mut seen, &[0x88, IAC, EOR]);
        seen
    });

    let host = RecordingHost {
        reply: Some(vec![0x88]),
        ..RecordingHost::default()
    };
    let mut conn = Tn3270Connection::new(loopback_config(port), host);
    conn.set_poll_interval(Duration::from_millis(20));
    conn.connect().unwrap();
    assert!(conn.is_connected());
    assert!(!conn.tls_is_active());

    let done = conn
        .run_until(Duration::from_secs(5), |_, host| !host.records().is_empty())
        .unwrap();
    assert!(done);
    assert_eq!(conn.host().records(), vec![vec![0xF5, 0xC3, 0x11]]);
    assert_eq!(conn.state(), ConnectionState::Connected(ConnectionMode::Tn3270));

    let seen = server.join().unwrap();
    assert!(contains(&seen, &[IAC, WILL, TTYPE]));
    assert!(contains(&seen, &[IAC, DO, BINARY]));
    assert!(seen.ends_with(&[0x88, IAC, EOR]));

    // Host has hung up
    let err = loop {
        match conn.poll() {
            Ok(_) => continue,
            Err(e) => break e,
        }
    };
    assert!(matches!(err, Tn3270Error::Network(NetworkError::ConnectionClosed)));
    assert_eq!(conn.state(), ConnectionState::NotConnected);
}

/// Handshake that only checks the socket is blocking and hands it back
struct PlainHandshake {
    called: Arc<AtomicBool>,
}

impl TlsHandshake for PlainHandshake {
    fn handshake(&self, _host: &str, stream: TcpStream) -> Result<SecureStream, TlsError> {
        assert_eq!(stream.read_timeout().unwrap(), None);
        self.called.store(true, Ordering::SeqCst);
        Ok(Box::new(stream))
    }
}

#[test]
fn test_starttls_sequencing() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut seen = Vec::new();
        stream.write_all(&[IAC, DO, STARTTLS]).unwrap();
        read_until(&mut stream, &mut seen, &[IAC, WILL, STARTTLS]);
        stream.write_all(&sb(STARTTLS, &[1])).unwrap();
        read_until(&mut stream, &mut seen, &sb(STARTTLS, &[1]));
        // Now "encrypted"
        stream.write_all(&[IAC, DO, BINARY]).unwrap();
        read_until(&mut stream, &mut seen, &[IAC, WILL, BINARY]);
        // Once secure, STARTTLS is refused
        stream.write_all(&[IAC, DONT, STARTTLS, IAC, DO, STARTTLS]).unwrap();
        read_until(&mut stream, &mut seen, &[IAC, WONT, STARTTLS]);
    });

    let called = Arc::new(AtomicBool::new(false));
    let tls = PlainHandshake {
        called: Arc::clone(&called),
    };
    let mut conn = Tn3270Connection::with_tls(loopback_config(port), RecordingHost::default(), Box::new(tls));
    conn.set_poll_interval(Duration::from_millis(20));
    conn.connect().unwrap();

    let done = conn
        .run_until(Duration::from_secs(5), |session, _| session.option_state(BINARY).local)
        .unwrap();
    assert!(done);
    assert!(called.load(Ordering::SeqCst));
    assert!(conn.tls_is_active());

    conn.run_until(Duration::from_secs(5), |session, _| !session.option_state(STARTTLS).local)
        .unwrap();
    server.join().unwrap();
}

#[test]
fn test_starttls_refused_without_hook() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut seen = Vec::new();
        stream.write_all(&[IAC, DO, STARTTLS]).unwrap();
        read_until(&mut stream, &mut seen, &[IAC, WONT, STARTTLS]);
    });

    let mut conn = Tn3270Connection::new(loopback_config(port), RecordingHost::default());
    conn.set_poll_interval(Duration::from_millis(20));
    conn.connect().unwrap();
    let done = conn
        .run_until(Duration::from_secs(5), |session, _| session.stats().bytes_received >= 3)
        .unwrap();
    assert!(done);
    server.join().unwrap();
    assert!(!conn.tls_is_active());
    assert!(!conn.session().option_state(STARTTLS).local);
}

#[test]
fn test_unresolvable_host() {
    let mut conn = Tn3270Connection::new(
        SessionConfig {
            host: "no-such-host.invalid".to_string(),
            ..SessionConfig::default()
        },
        RecordingHost::default(),
    );
    let err = conn.connect().unwrap_err();
    assert!(matches!(
        err,
        Tn3270Error::Network(NetworkError::DnsResolution { .. })
    ));
    assert!(err.is_connection_terminating());
}

//! Shared test harness: a recording host session and byte-script helpers
#![allow(dead_code)]

use tn3270r::lib3270::bind::ScreenGeometry;
use tn3270r::lib3270::record::Transmitter;
use tn3270r::{ConnectionMode, DataStreamResult, Diagnostic, HostSession, SessionConfig, Tn3270Session};

pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
pub const SB: u8 = 250;
pub const SE: u8 = 240;
pub const EOR: u8 = 239;

pub const BINARY: u8 = 0;
pub const TTYPE: u8 = 24;
pub const OPT_EOR: u8 = 25;
pub const NAWS: u8 = 31;
pub const NEW_ENVIRON: u8 = 39;
pub const TN3270E: u8 = 40;
pub const STARTTLS: u8 = 46;

/// What the engine handed to the host session, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Record(Vec<u8>),
    Sscp(Vec<u8>),
    Mode(ConnectionMode, bool),
    Geometry(ScreenGeometry, bool),
    Diagnostic(Diagnostic),
}

/// Host session that records every call
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub events: Vec<Event>,
    pub nvt: Vec<u8>,
    /// Returned from `process_ds`, even after sending `reply`
    pub result: Option<DataStreamResult>,
    /// Sent back through the transmitter from `process_ds`
    pub reply: Option<Vec<u8>>,
}

impl RecordingHost {
    pub fn records(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Record(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn modes(&self) -> Vec<(ConnectionMode, bool)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Mode(m, b) => Some((*m, *b)),
                _ => None,
            })
            .collect()
    }

    pub fn geometries(&self) -> Vec<(ScreenGeometry, bool)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Geometry(g, v) => Some((*g, *v)),
                _ => None,
            })
            .collect()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Diagnostic(d) => Some(d.clone()),
                _ => None,
            })
            .collect()
    }
}

impl HostSession for RecordingHost {
    fn process_ds(&mut self, record: &[u8], tx: &mut Transmitter) -> DataStreamResult {
        self.events.push(Event::Record(record.to_vec()));
        if let Some(reply) = &self.reply {
            tx.send_record(reply);
            return self.result.unwrap_or(DataStreamResult::OkayOutput);
        }
        self.result.unwrap_or(DataStreamResult::OkayNoOutput)
    }

    fn write_sscp_lu(&mut self, record: &[u8], _tx: &mut Transmitter) {
        self.events.push(Event::Sscp(record.to_vec()));
    }

    fn ansi_process(&mut self, byte: u8) {
        self.nvt.push(byte);
    }

    fn mode_changed(&mut self, mode: ConnectionMode, bound: bool) {
        self.events.push(Event::Mode(mode, bound));
    }

    fn geometry_changed(&mut self, geometry: ScreenGeometry, valid: bool) {
        self.events.push(Event::Geometry(geometry, valid));
    }

    fn diagnostic(&mut self, diagnostic: Diagnostic) {
        self.events.push(Event::Diagnostic(diagnostic));
    }
}

pub fn config() -> SessionConfig {
    SessionConfig {
        host: "mainframe.test".to_string(),
        ..SessionConfig::default()
    }
}

pub fn session_with(config: &SessionConfig) -> (Tn3270Session, RecordingHost) {
    (Tn3270Session::new(config), RecordingHost::default())
}

/// `IAC SB <option> <payload> IAC SE`
pub fn sb(option: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![IAC, SB, option];
    out.extend_from_slice(payload);
    out.extend_from_slice(&[IAC, SE]);
    out
}

/// `<bytes> IAC EOR`, with 0xFF doubled
pub fn record(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for &b in bytes {
        out.push(b);
        if b == IAC {
            out.push(IAC);
        }
    }
    out.extend_from_slice(&[IAC, EOR]);
    out
}

/// Drive a session into plain TN3270 mode and drop the replies
pub fn negotiate_tn3270(session: &mut Tn3270Session, host: &mut RecordingHost) {
    session.process_input(
        &[
            IAC, DO, TTYPE, IAC, DO, BINARY, IAC, WILL, BINARY, IAC, DO, OPT_EOR, IAC, WILL, OPT_EOR,
        ],
        host,
    );
    session.take_output();
}

/// Whether `needle` occurs in `haystack`
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

//! TN3270 session engine
//!
//! [`Tn3270Session`] is the protocol core of one connection with no I/O of
//! its own. Bytes read from the socket go into
//! [`Tn3270Session::process_input`]; bytes for the socket come out of
//! [`Tn3270Session::take_output`]. In between, the session runs the telnet
//! framer, the option negotiator, the TN3270E negotiator and the record
//! assembler, and calls the [`HostSession`] consumer with completed records.

use std::fmt;

use log::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::error::Diagnostic;
use crate::lib3270::bind::{BindGeometry, BindImage, GeometryLimits, ScreenGeometry};
use crate::lib3270::codes::{TN3270E_RSF_ALWAYS_RESPONSE, TN3270E_RSF_ERROR_RESPONSE};
use crate::lib3270::record::{DataType, OutputFraming, RecordAssembler, RecordHeader, Transmitter};
use crate::lib3270::tn3270e::{
    Functions, Submode, Tn3270eMessage, Tn3270eNegotiator, Tn3270ePhase,
};
use crate::protocol_common::telnet_base::{
    option_name, FramerEvent, NegotiationVerb, TelnetCommand, TelnetFramer, TelnetOption, IAC,
    TELQUAL_SEND, TLS_FOLLOWS,
};
use crate::protocol_common::traits::HostSession;
use crate::telnet_negotiation::{
    environment_reply, starttls_follows, terminal_type_reply, window_size, EnvironmentValues,
    NegotiationSettings, OptionState, TelnetNegotiator,
};

/// What the connection is currently carrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Connected, nothing decided yet
    Initial,
    /// Character mode
    Nvt,
    /// TN3270: BINARY, EOR and TERMINAL-TYPE agreed
    Tn3270,
    /// TN3270E agreed, no submode selected yet
    Tn3270eInitial,
    Tn3270eNvt,
    Tn3270e,
    Tn3270eSscp,
}

impl ConnectionMode {
    pub fn is_tn3270e(self) -> bool {
        matches!(
            self,
            ConnectionMode::Tn3270eInitial
                | ConnectionMode::Tn3270eNvt
                | ConnectionMode::Tn3270e
                | ConnectionMode::Tn3270eSscp
        )
    }

    /// 3270 data stream, with or without TN3270E
    pub fn is_3270(self) -> bool {
        matches!(self, ConnectionMode::Tn3270 | ConnectionMode::Tn3270e)
    }

    pub fn is_nvt(self) -> bool {
        matches!(self, ConnectionMode::Nvt | ConnectionMode::Tn3270eNvt)
    }

    pub fn is_sscp(self) -> bool {
        self == ConnectionMode::Tn3270eSscp
    }

    /// Records are delimited by EOR in this mode
    pub fn uses_records(self) -> bool {
        self == ConnectionMode::Tn3270 || self.is_tn3270e()
    }
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionMode::Initial => "initial",
            ConnectionMode::Nvt => "NVT",
            ConnectionMode::Tn3270 => "TN3270",
            ConnectionMode::Tn3270eInitial => "TN3270E (no submode)",
            ConnectionMode::Tn3270eNvt => "TN3270E NVT",
            ConnectionMode::Tn3270e => "TN3270E 3270",
            ConnectionMode::Tn3270eSscp => "TN3270E SSCP-LU",
        })
    }
}

/// Traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetStats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub records_received: u64,
    pub records_sent: u64,
}

/// Protocol state of one TN3270 connection
#[derive(Debug)]
pub struct Tn3270Session {
    framer: TelnetFramer,
    negotiator: TelnetNegotiator,
    tn3270e: Tn3270eNegotiator,
    assembler: RecordAssembler,
    tx: Transmitter,
    mode: ConnectionMode,
    notified: (ConnectionMode, bool),
    term_type: String,
    user: Option<String>,
    limits: GeometryLimits,
    default_geometry: ScreenGeometry,
    geometry: ScreenGeometry,
    window: (u16, u16),
    starttls_pending: bool,
    secure: bool,
    stats: NetStats,
}

impl Tn3270Session {
    pub fn new(config: &SessionConfig) -> Self {
        let (max_rows, max_cols) = config.model_size();
        let term_type = config.terminal_type();
        let default_geometry = ScreenGeometry::new(24, 80, max_rows, max_cols);
        Self {
            framer: TelnetFramer::new(),
            negotiator: TelnetNegotiator::new(NegotiationSettings {
                tn3270e_allowed: config.tn3270e_allowed(),
                bsd_tm: config.bsd_tm,
                tls_available: config.starttls,
            }),
            tn3270e: Tn3270eNegotiator::new(term_type.clone(), config.candidate_lus()),
            assembler: RecordAssembler::new(),
            tx: Transmitter::new(),
            mode: ConnectionMode::Initial,
            notified: (ConnectionMode::Initial, false),
            term_type,
            user: config.user.clone(),
            limits: config.geometry_limits(),
            default_geometry,
            geometry: default_geometry,
            window: (max_rows, max_cols),
            starttls_pending: false,
            secure: false,
            stats: NetStats::default(),
        }
    }

    /// Start over for a new connection attempt
    pub fn reset(&mut self) {
        self.framer.reset();
        self.negotiator.reset();
        self.tn3270e.reset();
        self.tn3270e.lus_mut().reset();
        self.assembler.clear();
        self.tx.reset();
        self.mode = ConnectionMode::Initial;
        self.notified = (ConnectionMode::Initial, false);
        self.geometry = self.default_geometry;
        self.starttls_pending = false;
        self.secure = false;
        self.stats = NetStats::default();
    }

    /// Feed bytes read from the host. Returns how many were consumed: all of
    /// them, unless the host announced START-TLS, in which case processing
    /// stops right after the FOLLOWS subnegotiation until
    /// [`Tn3270Session::tls_established`] is called.
    pub fn process_input<H: HostSession + ?Sized>(&mut self, data: &[u8], host: &mut H) -> usize {
        if self.starttls_pending {
            warn!("{} bytes received during TLS negotiation, not processed", data.len());
            return 0;
        }
        let mut consumed = 0;
        for &byte in data {
            consumed += 1;
            match self.framer.step(byte) {
                FramerEvent::Consumed | FramerEvent::Command(_) => {}
                FramerEvent::SyntaxError(e) => host.diagnostic(Diagnostic::ProtocolSyntax(e.to_string())),
                FramerEvent::Data(b) => self.data_byte(b, host),
                FramerEvent::Negotiation(verb, option) => self.negotiation(verb, option, host),
                FramerEvent::Subnegotiation => {
                    let payload = self.framer.take_subnegotiation();
                    self.subnegotiation(&payload, host);
                    self.framer.recycle(payload);
                }
                FramerEvent::EndOfRecord => self.end_of_record(host),
            }
            if self.starttls_pending {
                break;
            }
        }
        self.stats.bytes_received += consumed as u64;
        consumed
    }

    /// Queue a 3270 (or, in SSCP-LU submode, SSCP-LU) record
    pub fn send_record(&mut self, data: &[u8]) {
        if !self.mode.uses_records() {
            warn!("Record of {} bytes dropped, not in 3270 mode ({})", data.len(), self.mode);
            return;
        }
        self.tx.send_record(data);
    }

    /// Queue NVT character data
    pub fn send_nvt(&mut self, data: &[u8]) {
        self.tx.send_nvt(data);
    }

    /// Send IAC IP, the ATTN key
    pub fn send_interrupt(&mut self) {
        trace!("SENT IP");
        self.tx.send_raw(&[IAC, TelnetCommand::IP as u8]);
    }

    /// Send the SYSREQ key: IAC AO when the SYSREQ function was negotiated,
    /// otherwise IAC IP
    pub fn send_sysreq(&mut self) {
        if self.mode.is_tn3270e() && self.tn3270e.functions().contains(Functions::SYSREQ) {
            trace!("SENT AO");
            self.tx.send_raw(&[IAC, TelnetCommand::AO as u8]);
        } else {
            self.send_interrupt();
        }
    }

    pub fn send_break(&mut self) {
        trace!("SENT BREAK");
        self.tx.send_raw(&[IAC, TelnetCommand::BRK as u8]);
    }

    /// Change the size reported through NAWS, resending it if agreed
    pub fn set_window_size(&mut self, rows: u16, cols: u16) {
        self.window = (rows, cols);
        self.send_window_size();
    }

    pub fn has_output(&self) -> bool {
        self.tx.has_output()
    }

    /// Drain bytes queued for the host
    pub fn take_output(&mut self) -> Vec<u8> {
        let out = self.tx.take_output();
        self.stats.bytes_sent += out.len() as u64;
        out
    }

    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    pub fn submode(&self) -> Submode {
        self.tn3270e.submode()
    }

    pub fn bound(&self) -> bool {
        self.tn3270e.bound()
    }

    pub fn functions(&self) -> Functions {
        self.tn3270e.functions()
    }

    pub fn tn3270e_phase(&self) -> &Tn3270ePhase {
        self.tn3270e.phase()
    }

    pub fn option_state(&self, option: u8) -> OptionState {
        self.negotiator.state(option)
    }

    pub fn geometry(&self) -> ScreenGeometry {
        self.geometry
    }

    /// The last BIND image, while bound
    pub fn bind_image(&self) -> Option<&BindImage> {
        self.tn3270e.session().and_then(|s| s.bind.as_ref())
    }

    pub fn connected_lu(&self) -> Option<&str> {
        self.tn3270e.connected_lu()
    }

    pub fn reported_device_type(&self) -> Option<&str> {
        self.tn3270e.reported_device_type()
    }

    pub fn terminal_type(&self) -> &str {
        &self.term_type
    }

    /// NVT line mode: the host does not echo
    pub fn line_mode(&self) -> bool {
        self.negotiator.line_mode()
    }

    pub fn stats(&self) -> NetStats {
        NetStats {
            records_sent: self.tx.records_sent(),
            ..self.stats
        }
    }

    /// Whether a DO START-TLS may be accepted
    pub fn set_tls_available(&mut self, available: bool) {
        self.negotiator.settings_mut().tls_available = available;
    }

    /// The host sent START-TLS FOLLOWS; the handshake must run before any
    /// more input is processed
    pub fn starttls_pending(&self) -> bool {
        self.starttls_pending
    }

    /// The connection is encrypted from here on (START-TLS handshake done,
    /// or TLS from the start)
    pub fn tls_established(&mut self) {
        if self.starttls_pending {
            info!("START-TLS handshake complete");
        }
        self.starttls_pending = false;
        self.secure = true;
        self.negotiator.set_secure(true);
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    fn data_byte<H: HostSession + ?Sized>(&mut self, byte: u8, host: &mut H) {
        match self.mode {
            ConnectionMode::Initial => {
                // Data before any agreement: the host is a plain telnet server
                self.mode = ConnectionMode::Nvt;
                info!("Data received before negotiation, now operating in {} mode", self.mode);
                self.sync_mode(host);
                host.ansi_process(byte);
            }
            ConnectionMode::Nvt => host.ansi_process(byte),
            _ => self.assembler.push(byte),
        }
    }

    fn negotiation<H: HostSession + ?Sized>(&mut self, verb: NegotiationVerb, option: u8, host: &mut H) {
        let changed = match verb {
            NegotiationVerb::Will => self.negotiator.on_will(option),
            NegotiationVerb::Wont => self.negotiator.on_wont(option),
            NegotiationVerb::Do => self.negotiator.on_do(option),
            NegotiationVerb::Dont => self.negotiator.on_dont(option),
        };
        self.flush_negotiation();
        if changed && matches!(verb, NegotiationVerb::Wont | NegotiationVerb::Dont) {
            let what = format!("host sent {} {}", verb.command().name(), option_name(option));
            info!("Option turned off: {what}");
            host.diagnostic(Diagnostic::NegotiationRefused(what));
        }
        if changed && verb == NegotiationVerb::Do {
            match TelnetOption::from_u8(option) {
                Some(TelnetOption::NAWS) => self.send_window_size(),
                Some(TelnetOption::TN3270E) => self.tn3270e.start(),
                _ => {}
            }
        }
        self.update_mode(host);
    }

    fn subnegotiation<H: HostSession + ?Sized>(&mut self, payload: &[u8], host: &mut H) {
        let Some((&option, body)) = payload.split_first() else {
            warn!("Empty subnegotiation ignored");
            host.diagnostic(Diagnostic::ProtocolSyntax("empty subnegotiation".to_string()));
            return;
        };

        match TelnetOption::from_u8(option) {
            Some(TelnetOption::TerminalType)
                if body.first() == Some(&TELQUAL_SEND) && self.negotiator.local(TelnetOption::TerminalType) =>
            {
                trace!("RCVD SB TERMINAL-TYPE SEND SE");
                let reply = terminal_type_reply(&self.term_type, self.tn3270e.lus().current());
                self.tx.send_raw(&reply);
                self.tn3270e.lus_mut().advance();
            }
            Some(TelnetOption::NewEnvironment)
                if body.first() == Some(&TELQUAL_SEND) && self.negotiator.local(TelnetOption::NewEnvironment) =>
            {
                trace!("RCVD SB NEW-ENVIRON SEND SE");
                let values = EnvironmentValues {
                    user: self.user.as_deref(),
                    devname: self.tn3270e.lus().current(),
                };
                let reply = environment_reply(&body[1..], &values);
                self.tx.send_raw(&reply);
            }
            Some(TelnetOption::TN3270E) if self.negotiator.local(TelnetOption::TN3270E) => {
                match Tn3270eMessage::decode(body) {
                    Ok(msg) => self.tn3270e_message(msg, host),
                    Err(e) => {
                        warn!("Bad TN3270E subnegotiation: {e}");
                        host.diagnostic(Diagnostic::ProtocolSyntax(e.to_string()));
                    }
                }
            }
            Some(TelnetOption::StartTls)
                if body.first() == Some(&TLS_FOLLOWS) && self.negotiator.local(TelnetOption::StartTls) =>
            {
                trace!("RCVD SB START-TLS FOLLOWS SE");
                self.tx.send_raw(&starttls_follows());
                self.starttls_pending = true;
                info!("Host is starting TLS");
            }
            _ => debug!("Ignoring SB {} ({} bytes)", option_name(option), body.len()),
        }
    }

    fn tn3270e_message<H: HostSession + ?Sized>(&mut self, msg: Tn3270eMessage, host: &mut H) {
        let outcome = self.tn3270e.handle(msg);
        if let Some(reply) = outcome.reply {
            trace!("SENT TN3270E {reply}");
            self.tx.send_raw(&reply.encode());
        }
        if let Some(reason) = outcome.ignored {
            warn!("{reason}");
            host.diagnostic(Diagnostic::ProtocolSyntax(reason));
        }
        if let Some(reason) = outcome.abandon {
            self.backoff_tn3270e(reason, host);
        } else if outcome.established {
            self.update_mode(host);
        }
    }

    /// Give up on TN3270E and let plain TN3270 negotiation continue
    fn backoff_tn3270e<H: HostSession + ?Sized>(&mut self, reason: String, host: &mut H) {
        warn!("Aborting TN3270E: {reason}");
        self.negotiator.withdraw(TelnetOption::TN3270E as u8);
        self.flush_negotiation();
        self.tn3270e.reset();
        self.tn3270e.lus_mut().reset();
        host.diagnostic(Diagnostic::Tn3270eAbandoned(reason));
        self.update_mode(host);
    }

    fn end_of_record<H: HostSession + ?Sized>(&mut self, host: &mut H) {
        if !self.mode.uses_records() {
            warn!("EOR received when not in 3270 mode, ignored");
            self.assembler.clear();
            return;
        }
        let record = self.assembler.take();
        self.stats.records_received += 1;
        trace!("RCVD EOR, record of {} bytes", record.len());
        if self.mode.is_tn3270e() {
            self.tn3270e_record(&record, host);
        } else {
            let result = host.process_ds(&record, &mut self.tx);
            if result.is_error() {
                debug!("3270 data stream error: {result:?}");
            }
        }
        self.assembler.recycle(record);
    }

    fn tn3270e_record<H: HostSession + ?Sized>(&mut self, record: &[u8], host: &mut H) {
        let Some((header, payload)) = RecordHeader::parse(record) else {
            self.discard(format!("TN3270E record of {} bytes has no header", record.len()), host);
            return;
        };
        trace!(
            "RCVD TN3270E({} flags {:02x}/{:02x} seq {})",
            header.data_type,
            header.request_flag,
            header.response_flag,
            header.seq_number
        );
        let (functions, bound) = match self.tn3270e.session() {
            Some(session) => (session.functions, session.bound),
            None => {
                self.discard(format!("{} before TN3270E negotiation completed", header.data_type), host);
                return;
            }
        };
        let binds = functions.contains(Functions::BIND_IMAGE);

        match header.data_type {
            DataType::Data3270 => {
                if binds && !bound {
                    self.discard("3270-DATA while unbound".to_string(), host);
                    return;
                }
                self.set_submode(Submode::ThreeTwoSeventy, host);
                self.data_stream(header, payload, functions, host);
            }
            DataType::BindImage if binds => self.bind(payload, host),
            DataType::Unbind if binds => self.unbind(host),
            DataType::NvtData => {
                self.set_submode(Submode::Nvt, host);
                for &b in payload {
                    host.ansi_process(b);
                }
            }
            DataType::SscpLuData => {
                if binds && bound {
                    self.discard("SSCP-LU-DATA while bound".to_string(), host);
                    return;
                }
                self.set_submode(Submode::Sscp, host);
                host.write_sscp_lu(payload, &mut self.tx);
            }
            other => self.discard(format!("unsupported data type {other}"), host),
        }
    }

    fn data_stream<H: HostSession + ?Sized>(
        &mut self,
        header: RecordHeader,
        payload: &[u8],
        functions: Functions,
        host: &mut H,
    ) {
        let responses = functions.contains(Functions::RESPONSES);
        if responses && header.response_flag == TN3270E_RSF_ALWAYS_RESPONSE {
            self.tx.expect_response(header.seq_number);
        }
        let result = host.process_ds(payload, &mut self.tx);
        match result.negative_response_code() {
            Some(code)
                if responses
                    && matches!(
                        header.response_flag,
                        TN3270E_RSF_ERROR_RESPONSE | TN3270E_RSF_ALWAYS_RESPONSE
                    ) =>
            {
                self.tx.respond(header.seq_number, Some(code));
            }
            None if self.tx.pending_ack().is_some() => self.tx.respond(header.seq_number, None),
            _ => self.tx.cancel_pending_ack(),
        }
    }

    fn bind<H: HostSession + ?Sized>(&mut self, image: &[u8], host: &mut H) {
        let bind = match BindImage::parse(image, &self.limits) {
            Ok(bind) => {
                match &bind.geometry {
                    BindGeometry::Accepted(geometry) => {
                        info!("BIND screen size {geometry}");
                        self.geometry = *geometry;
                        host.geometry_changed(*geometry, true);
                    }
                    BindGeometry::Rejected { reason, .. } => {
                        host.diagnostic(Diagnostic::BindRejected(reason.clone()));
                        host.geometry_changed(self.geometry, false);
                    }
                    BindGeometry::Absent => {}
                }
                if let Some(plu) = &bind.plu_name {
                    info!("Bound to PLU {plu}");
                }
                Some(bind)
            }
            Err(e) => {
                warn!("BIND image discarded: {e}");
                host.diagnostic(Diagnostic::BindRejected(e.to_string()));
                None
            }
        };
        if let Some(session) = self.tn3270e.session_mut() {
            session.bound = true;
            session.bind = bind;
        }
        self.update_mode(host);
    }

    fn unbind<H: HostSession + ?Sized>(&mut self, host: &mut H) {
        if let Some(session) = self.tn3270e.session_mut() {
            session.bound = false;
            session.bind = None;
            if session.submode == Submode::ThreeTwoSeventy {
                session.submode = Submode::None;
            }
        }
        debug!("UNBIND, screen back to {}", self.default_geometry);
        self.geometry = self.default_geometry;
        host.geometry_changed(self.geometry, true);
        self.update_mode(host);
    }

    fn set_submode<H: HostSession + ?Sized>(&mut self, submode: Submode, host: &mut H) {
        if let Some(session) = self.tn3270e.session_mut() {
            session.submode = submode;
        }
        self.update_mode(host);
    }

    fn discard<H: HostSession + ?Sized>(&mut self, reason: String, host: &mut H) {
        debug!("Record discarded: {reason}");
        host.diagnostic(Diagnostic::RecordDiscarded(reason));
    }

    /// Derive the connection mode from the option table and TN3270E state
    fn update_mode<H: HostSession + ?Sized>(&mut self, host: &mut H) {
        let neg = &self.negotiator;
        let tn3270e = neg.local(TelnetOption::TN3270E);
        let new_mode = if tn3270e {
            match self.tn3270e.session().map(|s| s.submode) {
                None | Some(Submode::None) => ConnectionMode::Tn3270eInitial,
                Some(Submode::ThreeTwoSeventy) => ConnectionMode::Tn3270e,
                Some(Submode::Nvt) => ConnectionMode::Tn3270eNvt,
                Some(Submode::Sscp) => ConnectionMode::Tn3270eSscp,
            }
        } else if neg.local(TelnetOption::Binary)
            && neg.local(TelnetOption::EndOfRecord)
            && neg.local(TelnetOption::TerminalType)
            && neg.remote(TelnetOption::Binary)
            && neg.remote(TelnetOption::EndOfRecord)
        {
            ConnectionMode::Tn3270
        } else if self.mode == ConnectionMode::Initial {
            ConnectionMode::Initial
        } else {
            ConnectionMode::Nvt
        };

        if !tn3270e && *self.tn3270e.phase() != Tn3270ePhase::Inactive {
            self.tn3270e.reset();
        }
        if new_mode != self.mode {
            if new_mode.is_tn3270e() != self.mode.is_tn3270e() {
                self.tn3270e.lus_mut().reset();
            }
            info!("Now operating in {new_mode} mode");
            self.mode = new_mode;
        }
        self.sync_mode(host);
    }

    /// Bring output framing in line with the mode and tell the consumer
    /// about any change it has not seen yet
    fn sync_mode<H: HostSession + ?Sized>(&mut self, host: &mut H) {
        let responses = self.tn3270e.functions().contains(Functions::RESPONSES);
        self.tx.set_framing(match self.mode {
            ConnectionMode::Initial | ConnectionMode::Nvt => OutputFraming::Nvt,
            ConnectionMode::Tn3270 => OutputFraming::Record,
            ConnectionMode::Tn3270eSscp => OutputFraming::Tn3270e {
                data_type: DataType::SscpLuData,
                responses,
            },
            ConnectionMode::Tn3270eInitial | ConnectionMode::Tn3270eNvt | ConnectionMode::Tn3270e => {
                OutputFraming::Tn3270e {
                    data_type: DataType::Data3270,
                    responses,
                }
            }
        });

        let state = (self.mode, self.tn3270e.bound());
        if state != self.notified {
            self.notified = state;
            host.mode_changed(state.0, state.1);
        }
    }

    fn send_window_size(&mut self) {
        if self.negotiator.local(TelnetOption::NAWS) {
            let (rows, cols) = self.window;
            self.tx.send_raw(&window_size(rows, cols));
        }
    }

    fn flush_negotiation(&mut self) {
        if self.negotiator.has_output() {
            let out = self.negotiator.take_output();
            self.tx.send_raw(&out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol_common::traits::DataStreamResult;

    #[derive(Default)]
    struct Recorder {
        records: Vec<Vec<u8>>,
        nvt: Vec<u8>,
        modes: Vec<(ConnectionMode, bool)>,
    }

    impl HostSession for Recorder {
        fn process_ds(&mut self, record: &[u8], _tx: &mut Transmitter) -> DataStreamResult {
            self.records.push(record.to_vec());
            DataStreamResult::OkayNoOutput
        }

        fn write_sscp_lu(&mut self, record: &[u8], _tx: &mut Transmitter) {
            self.records.push(record.to_vec());
        }

        fn ansi_process(&mut self, byte: u8) {
            self.nvt.push(byte);
        }

        fn mode_changed(&mut self, mode: ConnectionMode, bound: bool) {
            self.modes.push((mode, bound));
        }
    }

    fn session() -> Tn3270Session {
        Tn3270Session::new(&SessionConfig {
            host: "test".to_string(),
            ..SessionConfig::default()
        })
    }

    #[test]
    fn test_plain_tn3270_mode() {
        let mut s = session();
        let mut host = Recorder::default();
        s.process_input(&[255, 253, 24, 255, 253, 0, 255, 251, 0], &mut host);
        assert_eq!(s.mode(), ConnectionMode::Initial);
        s.process_input(&[255, 253, 25, 255, 251, 25], &mut host);
        assert_eq!(s.mode(), ConnectionMode::Tn3270);
        assert_eq!(host.modes, vec![(ConnectionMode::Tn3270, false)]);

        s.process_input(&[0xF5, 0xC3, 255, 255, 255, 239], &mut host);
        assert_eq!(host.records, vec![vec![0xF5, 0xC3, 0xFF]]);
    }

    #[test]
    fn test_data_before_negotiation_enters_nvt() {
        let mut s = session();
        let mut host = Recorder::default();
        s.process_input(b"login: ", &mut host);
        assert_eq!(s.mode(), ConnectionMode::Nvt);
        assert_eq!(host.nvt, b"login: ".to_vec());
    }

    #[test]
    fn test_eor_outside_3270_ignored() {
        let mut s = session();
        let mut host = Recorder::default();
        s.process_input(&[b'x', 255, 239], &mut host);
        assert!(host.records.is_empty());
    }

    #[test]
    fn test_naws_sent_on_agreement() {
        let mut s = session();
        let mut host = Recorder::default();
        s.process_input(&[255, 253, 31], &mut host);
        assert_eq!(
            s.take_output(),
            vec![255, 251, 31, 255, 250, 31, 0, 80, 0, 43, 255, 240]
        );
        s.set_window_size(24, 80);
        assert_eq!(s.take_output(), vec![255, 250, 31, 0, 80, 0, 24, 255, 240]);
    }

    #[test]
    fn test_attention_keys() {
        let mut s = session();
        s.send_interrupt();
        s.send_sysreq();
        s.send_break();
        assert_eq!(s.take_output(), vec![255, 244, 255, 244, 255, 243]);
        assert_eq!(s.stats().bytes_sent, 6);
    }

    #[test]
    fn test_starttls_pauses_input() {
        let mut s = session();
        let mut host = Recorder::default();
        s.process_input(&[255, 253, 46], &mut host);
        assert_eq!(s.take_output(), vec![255, 251, 46]);

        let consumed = s.process_input(&[255, 250, 46, 1, 255, 240, 255, 253, 0], &mut host);
        assert_eq!(consumed, 6);
        assert!(s.starttls_pending());
        assert_eq!(s.take_output(), vec![255, 250, 46, 1, 255, 240]);
        assert_eq!(s.process_input(&[255, 253, 0], &mut host), 0);

        s.tls_established();
        assert!(s.is_secure());
        assert_eq!(s.process_input(&[255, 253, 0], &mut host), 3);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut s = session();
        let mut host = Recorder::default();
        s.process_input(&[255, 253, 24, 255, 253, 0], &mut host);
        s.reset();
        assert_eq!(s.option_state(24), OptionState::default());
        assert!(!s.has_output());
        assert_eq!(s.stats(), NetStats::default());
    }
}

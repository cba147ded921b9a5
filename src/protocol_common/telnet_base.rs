//! Telnet wire vocabulary and the byte framer
//!
//! This module owns the RFC 854 command codes, the option codes a TN3270
//! client meets, the helpers that build negotiation and subnegotiation
//! sequences, and [`TelnetFramer`], the single finite-state machine that
//! classifies every byte received from the host.

use std::fmt;

use log::{trace, warn};

/// Interpret As Command
pub const IAC: u8 = 255;

/// Upper bound on a single subnegotiation payload. Longer payloads are
/// truncated, never grown without limit.
pub const MAX_SUBNEGOTIATION: usize = 16 * 1024;

/// Telnet command codes (RFC 854, RFC 885)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelnetCommand {
    /// Interpret As Command - 255 (0xFF)
    IAC = 255,
    /// Don't - 254 (0xFE)
    DONT = 254,
    /// Do - 253 (0xFD)
    DO = 253,
    /// Won't - 252 (0xFC)
    WONT = 252,
    /// Will - 251 (0xFB)
    WILL = 251,
    /// Subnegotiation Begin - 250 (0xFA)
    SB = 250,
    /// Go Ahead - 249 (0xF9)
    GA = 249,
    /// Erase Line - 248 (0xF8)
    EL = 248,
    /// Erase Character - 247 (0xF7)
    EC = 247,
    /// Are You There - 246 (0xF6)
    AYT = 246,
    /// Abort Output - 245 (0xF5)
    AO = 245,
    /// Interrupt Process - 244 (0xF4)
    IP = 244,
    /// Break - 243 (0xF3)
    BRK = 243,
    /// Data Mark - 242 (0xF2)
    DM = 242,
    /// No Operation - 241 (0xF1)
    NOP = 241,
    /// Subnegotiation End - 240 (0xF0)
    SE = 240,
    /// End Of Record - 239 (0xEF)
    EOR = 239,
}

impl TelnetCommand {
    /// Convert a byte to a TelnetCommand
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            255 => Some(TelnetCommand::IAC),
            254 => Some(TelnetCommand::DONT),
            253 => Some(TelnetCommand::DO),
            252 => Some(TelnetCommand::WONT),
            251 => Some(TelnetCommand::WILL),
            250 => Some(TelnetCommand::SB),
            249 => Some(TelnetCommand::GA),
            248 => Some(TelnetCommand::EL),
            247 => Some(TelnetCommand::EC),
            246 => Some(TelnetCommand::AYT),
            245 => Some(TelnetCommand::AO),
            244 => Some(TelnetCommand::IP),
            243 => Some(TelnetCommand::BRK),
            242 => Some(TelnetCommand::DM),
            241 => Some(TelnetCommand::NOP),
            240 => Some(TelnetCommand::SE),
            239 => Some(TelnetCommand::EOR),
            _ => None,
        }
    }

    /// Trace name, as printed in negotiation logs
    pub fn name(&self) -> &'static str {
        match self {
            TelnetCommand::IAC => "IAC",
            TelnetCommand::DONT => "DONT",
            TelnetCommand::DO => "DO",
            TelnetCommand::WONT => "WONT",
            TelnetCommand::WILL => "WILL",
            TelnetCommand::SB => "SB",
            TelnetCommand::GA => "GA",
            TelnetCommand::EL => "EL",
            TelnetCommand::EC => "EC",
            TelnetCommand::AYT => "AYT",
            TelnetCommand::AO => "AO",
            TelnetCommand::IP => "IP",
            TelnetCommand::BRK => "BREAK",
            TelnetCommand::DM => "DM",
            TelnetCommand::NOP => "NOP",
            TelnetCommand::SE => "SE",
            TelnetCommand::EOR => "EOR",
        }
    }
}

/// Telnet options a TN3270 client negotiates or refuses by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TelnetOption {
    /// Binary Transmission - 0
    Binary = 0,
    /// Echo - 1
    Echo = 1,
    /// Suppress Go Ahead - 3
    SuppressGoAhead = 3,
    /// Timing Mark - 6
    TimingMark = 6,
    /// Terminal Type - 24
    TerminalType = 24,
    /// End of Record - 25
    EndOfRecord = 25,
    /// Negotiate About Window Size - 31
    NAWS = 31,
    /// Linemode - 34
    Linemode = 34,
    /// New Environment - 39
    NewEnvironment = 39,
    /// TN3270 Enhancements (RFC 2355) - 40
    TN3270E = 40,
    /// Start TLS - 46
    StartTls = 46,
}

impl TelnetOption {
    /// Convert a byte to a TelnetOption
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TelnetOption::Binary),
            1 => Some(TelnetOption::Echo),
            3 => Some(TelnetOption::SuppressGoAhead),
            6 => Some(TelnetOption::TimingMark),
            24 => Some(TelnetOption::TerminalType),
            25 => Some(TelnetOption::EndOfRecord),
            31 => Some(TelnetOption::NAWS),
            34 => Some(TelnetOption::Linemode),
            39 => Some(TelnetOption::NewEnvironment),
            40 => Some(TelnetOption::TN3270E),
            46 => Some(TelnetOption::StartTls),
            _ => None,
        }
    }

    /// Get the option name as it appears in traces
    pub fn name(&self) -> &'static str {
        match self {
            TelnetOption::Binary => "BINARY",
            TelnetOption::Echo => "ECHO",
            TelnetOption::SuppressGoAhead => "SGA",
            TelnetOption::TimingMark => "TIMING-MARK",
            TelnetOption::TerminalType => "TERMINAL-TYPE",
            TelnetOption::EndOfRecord => "END-OF-RECORD",
            TelnetOption::NAWS => "NAWS",
            TelnetOption::Linemode => "LINEMODE",
            TelnetOption::NewEnvironment => "NEW-ENVIRON",
            TelnetOption::TN3270E => "TN3270E",
            TelnetOption::StartTls => "START-TLS",
        }
    }
}

/// Printable name for any option code, named or not
pub fn option_name(option: u8) -> String {
    match TelnetOption::from_u8(option) {
        Some(opt) => opt.name().to_string(),
        None => format!("?[{option}]"),
    }
}

/// TERMINAL-TYPE and NEW-ENVIRON qualifier: IS
pub const TELQUAL_IS: u8 = 0;
/// TERMINAL-TYPE and NEW-ENVIRON qualifier: SEND
pub const TELQUAL_SEND: u8 = 1;

/// NEW-ENVIRON variable type codes (RFC 1572)
pub const NEW_ENV_VAR: u8 = 0;
pub const NEW_ENV_VALUE: u8 = 1;
pub const NEW_ENV_ESC: u8 = 2;
pub const NEW_ENV_USERVAR: u8 = 3;

/// STARTTLS subnegotiation: FOLLOWS
pub const TLS_FOLLOWS: u8 = 1;

/// The four option-negotiation verbs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NegotiationVerb {
    Will,
    Wont,
    Do,
    Dont,
}

impl NegotiationVerb {
    pub fn command(&self) -> TelnetCommand {
        match self {
            NegotiationVerb::Will => TelnetCommand::WILL,
            NegotiationVerb::Wont => TelnetCommand::WONT,
            NegotiationVerb::Do => TelnetCommand::DO,
            NegotiationVerb::Dont => TelnetCommand::DONT,
        }
    }
}

/// Build a telnet negotiation sequence
///
/// ```
/// use tn3270r::protocol_common::telnet_base::{build_negotiation, TelnetCommand};
///
/// // Build "IAC WILL BINARY"
/// let seq = build_negotiation(TelnetCommand::WILL, 0);
/// assert_eq!(seq, vec![255, 251, 0]);
/// ```
pub fn build_negotiation(command: TelnetCommand, option: u8) -> Vec<u8> {
    vec![TelnetCommand::IAC as u8, command as u8, option]
}

/// Build a telnet subnegotiation sequence, doubling any IAC in `data`
///
/// ```
/// use tn3270r::protocol_common::telnet_base::build_subnegotiation;
///
/// // "IAC SB TERMINAL-TYPE IS IBM-3278-2 IAC SE"
/// let mut data = vec![0u8];
/// data.extend_from_slice(b"IBM-3278-2");
/// let seq = build_subnegotiation(24, &data);
/// assert_eq!(&seq[..4], &[255, 250, 24, 0]);
/// assert_eq!(&seq[seq.len() - 2..], &[255, 240]);
/// ```
pub fn build_subnegotiation(option: u8, data: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(data.len() + 5);
    result.extend_from_slice(&[TelnetCommand::IAC as u8, TelnetCommand::SB as u8, option]);
    append_escaped(&mut result, data);
    result.extend_from_slice(&[TelnetCommand::IAC as u8, TelnetCommand::SE as u8]);
    result
}

/// Append `data` to `out`, doubling every literal 0xFF
pub fn append_escaped(out: &mut Vec<u8>, data: &[u8]) {
    out.reserve(data.len());
    for &byte in data {
        out.push(byte);
        if byte == IAC {
            out.push(IAC);
        }
    }
}

/// Byte framer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FramerState {
    #[default]
    Data,
    Iac,
    Will,
    Wont,
    Do,
    Dont,
    Sb,
    SbIac,
}

/// What one input byte turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerEvent {
    /// Part of a command still being collected
    Consumed,
    /// A data byte, already un-stuffed
    Data(u8),
    /// WILL/WONT/DO/DONT for an option
    Negotiation(NegotiationVerb, u8),
    /// IAC SE closed a subnegotiation; the payload is waiting in the framer
    Subnegotiation,
    /// IAC EOR
    EndOfRecord,
    /// DM, GA or NOP
    Command(TelnetCommand),
    /// Input the framer skipped; it is back in sync
    SyntaxError(SyntaxError),
}

/// Malformed or unexpected telnet input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxError {
    /// A valid command a client never expects from a host (AYT, SE outside SB...)
    UnexpectedCommand(TelnetCommand),
    /// IAC followed by a byte that is no telnet command
    UnknownCommand(u8),
    /// Subnegotiation payload went past [`MAX_SUBNEGOTIATION`]
    SubnegotiationTooLong,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxError::UnexpectedCommand(cmd) => write!(f, "unexpected telnet command {}", cmd.name()),
            SyntaxError::UnknownCommand(byte) => write!(f, "unknown telnet command 0x{byte:02x}"),
            SyntaxError::SubnegotiationTooLong => {
                write!(f, "subnegotiation longer than {MAX_SUBNEGOTIATION} bytes, truncated")
            }
        }
    }
}

/// Telnet byte classifier
///
/// Consumes one byte at a time and never fails: anything it cannot make
/// sense of is logged and dropped, and the machine resynchronizes at the
/// next IAC.
#[derive(Debug, Default)]
pub struct TelnetFramer {
    state: FramerState,
    sbbuf: Vec<u8>,
    truncated: bool,
}

impl TelnetFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Back to `Data`, dropping any partial subnegotiation
    pub fn reset(&mut self) {
        self.state = FramerState::Data;
        self.sbbuf.clear();
        self.truncated = false;
    }

    /// Classify one byte
    pub fn step(&mut self, byte: u8) -> FramerEvent {
        match self.state {
            FramerState::Data => {
                if byte == IAC {
                    self.state = FramerState::Iac;
                    FramerEvent::Consumed
                } else {
                    FramerEvent::Data(byte)
                }
            }
            FramerState::Iac => self.command(byte),
            FramerState::Will => self.verb(NegotiationVerb::Will, byte),
            FramerState::Wont => self.verb(NegotiationVerb::Wont, byte),
            FramerState::Do => self.verb(NegotiationVerb::Do, byte),
            FramerState::Dont => self.verb(NegotiationVerb::Dont, byte),
            FramerState::Sb => {
                if byte == IAC {
                    self.state = FramerState::SbIac;
                    FramerEvent::Consumed
                } else {
                    self.store(byte)
                }
            }
            FramerState::SbIac => {
                if byte == TelnetCommand::SE as u8 {
                    self.state = FramerState::Data;
                    FramerEvent::Subnegotiation
                } else {
                    // IAC IAC is a literal 0xFF; any other IAC pair keeps
                    // only its second byte.
                    self.state = FramerState::Sb;
                    self.store(byte)
                }
            }
        }
    }

    /// Hand the completed subnegotiation payload to the caller. Pass it back
    /// through [`TelnetFramer::recycle`] so the buffer is reused.
    pub fn take_subnegotiation(&mut self) -> Vec<u8> {
        self.truncated = false;
        std::mem::take(&mut self.sbbuf)
    }

    pub fn recycle(&mut self, mut buffer: Vec<u8>) {
        buffer.clear();
        if buffer.capacity() > self.sbbuf.capacity() {
            self.sbbuf = buffer;
        }
    }

    fn command(&mut self, byte: u8) -> FramerEvent {
        self.state = FramerState::Data;
        match TelnetCommand::from_u8(byte) {
            Some(TelnetCommand::IAC) => FramerEvent::Data(IAC),
            Some(TelnetCommand::WILL) => self.enter(FramerState::Will),
            Some(TelnetCommand::WONT) => self.enter(FramerState::Wont),
            Some(TelnetCommand::DO) => self.enter(FramerState::Do),
            Some(TelnetCommand::DONT) => self.enter(FramerState::Dont),
            Some(TelnetCommand::SB) => {
                self.sbbuf.clear();
                self.truncated = false;
                self.enter(FramerState::Sb)
            }
            Some(TelnetCommand::EOR) => FramerEvent::EndOfRecord,
            Some(cmd @ (TelnetCommand::DM | TelnetCommand::GA | TelnetCommand::NOP)) => {
                trace!("RCVD {}", cmd.name());
                FramerEvent::Command(cmd)
            }
            Some(cmd) => {
                warn!("RCVD unexpected telnet command {}, ignored", cmd.name());
                FramerEvent::SyntaxError(SyntaxError::UnexpectedCommand(cmd))
            }
            None => {
                warn!("RCVD unknown telnet command 0x{byte:02x}, ignored");
                FramerEvent::SyntaxError(SyntaxError::UnknownCommand(byte))
            }
        }
    }

    fn enter(&mut self, state: FramerState) -> FramerEvent {
        self.state = state;
        FramerEvent::Consumed
    }

    fn verb(&mut self, verb: NegotiationVerb, option: u8) -> FramerEvent {
        self.state = FramerState::Data;
        FramerEvent::Negotiation(verb, option)
    }

    /// Reports the first byte dropped from an oversized subnegotiation
    fn store(&mut self, byte: u8) -> FramerEvent {
        if self.sbbuf.len() < MAX_SUBNEGOTIATION {
            self.sbbuf.push(byte);
        } else if !self.truncated {
            self.truncated = true;
            warn!("Subnegotiation exceeds {MAX_SUBNEGOTIATION} bytes, truncating");
            return FramerEvent::SyntaxError(SyntaxError::SubnegotiationTooLong);
        }
        FramerEvent::Consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(framer: &mut TelnetFramer, bytes: &[u8]) -> Vec<FramerEvent> {
        bytes
            .iter()
            .map(|&b| framer.step(b))
            .filter(|e| *e != FramerEvent::Consumed)
            .collect()
    }

    #[test]
    fn test_telnet_command_conversion() {
        assert_eq!(TelnetCommand::from_u8(255), Some(TelnetCommand::IAC));
        assert_eq!(TelnetCommand::from_u8(251), Some(TelnetCommand::WILL));
        assert_eq!(TelnetCommand::from_u8(239), Some(TelnetCommand::EOR));
        assert_eq!(TelnetCommand::from_u8(100), None);
    }

    #[test]
    fn test_telnet_option_conversion() {
        assert_eq!(TelnetOption::from_u8(0), Some(TelnetOption::Binary));
        assert_eq!(TelnetOption::from_u8(25), Some(TelnetOption::EndOfRecord));
        assert_eq!(TelnetOption::from_u8(40), Some(TelnetOption::TN3270E));
        assert_eq!(option_name(46), "START-TLS");
        assert_eq!(option_name(200), "?[200]");
    }

    #[test]
    fn test_build_subnegotiation_escapes_iac() {
        let seq = build_subnegotiation(24, &[0x00, 0xFF, 0x41]);
        assert_eq!(seq, vec![255, 250, 24, 0x00, 0xFF, 0xFF, 0x41, 255, 240]);
    }

    #[test]
    fn test_plain_data_passes_through() {
        let mut framer = TelnetFramer::new();
        assert_eq!(
            run(&mut framer, b"AB"),
            vec![FramerEvent::Data(b'A'), FramerEvent::Data(b'B')]
        );
    }

    #[test]
    fn test_doubled_iac_is_one_data_byte() {
        let mut framer = TelnetFramer::new();
        assert_eq!(
            run(&mut framer, &[0x01, 0xFF, 0xFF, 0x02]),
            vec![FramerEvent::Data(0x01), FramerEvent::Data(0xFF), FramerEvent::Data(0x02)]
        );
        assert_eq!(framer.state(), FramerState::Data);
    }

    #[test]
    fn test_negotiation_and_eor() {
        let mut framer = TelnetFramer::new();
        let events = run(&mut framer, &[255, 253, 0, 0x7D, 255, 239]);
        assert_eq!(
            events,
            vec![
                FramerEvent::Negotiation(NegotiationVerb::Do, 0),
                FramerEvent::Data(0x7D),
                FramerEvent::EndOfRecord,
            ]
        );
    }

    #[test]
    fn test_subnegotiation_collected() {
        let mut framer = TelnetFramer::new();
        let events = run(&mut framer, &[255, 250, 24, 1, 255, 255, 255, 240]);
        assert_eq!(events, vec![FramerEvent::Subnegotiation]);
        let payload = framer.take_subnegotiation();
        assert_eq!(payload, vec![24, 1, 0xFF]);
        framer.recycle(payload);
        assert_eq!(framer.state(), FramerState::Data);
    }

    #[test]
    fn test_split_across_batches() {
        let mut framer = TelnetFramer::new();
        assert!(run(&mut framer, &[255]).is_empty());
        assert!(run(&mut framer, &[251]).is_empty());
        assert_eq!(
            run(&mut framer, &[25]),
            vec![FramerEvent::Negotiation(NegotiationVerb::Will, 25)]
        );
    }

    #[test]
    fn test_unknown_command_resynchronizes() {
        let mut framer = TelnetFramer::new();
        let events = run(&mut framer, &[255, 246, b'X', 255, 200, b'Y']);
        assert_eq!(
            events,
            vec![
                FramerEvent::SyntaxError(SyntaxError::UnexpectedCommand(TelnetCommand::AYT)),
                FramerEvent::Data(b'X'),
                FramerEvent::SyntaxError(SyntaxError::UnknownCommand(200)),
                FramerEvent::Data(b'Y'),
            ]
        );
    }

    #[test]
    fn test_known_noop_commands_reported() {
        let mut framer = TelnetFramer::new();
        let events = run(&mut framer, &[255, 241, 255, 249, 255, 242]);
        assert_eq!(
            events,
            vec![
                FramerEvent::Command(TelnetCommand::NOP),
                FramerEvent::Command(TelnetCommand::GA),
                FramerEvent::Command(TelnetCommand::DM),
            ]
        );
    }

    #[test]
    fn test_oversized_subnegotiation_truncated() {
        let mut framer = TelnetFramer::new();
        framer.step(255);
        framer.step(250);
        let reported = (0..(MAX_SUBNEGOTIATION + 100))
            .filter(|_| framer.step(b'x') != FramerEvent::Consumed)
            .count();
        assert_eq!(reported, 1);
        framer.step(255);
        assert_eq!(framer.step(240), FramerEvent::Subnegotiation);
        assert_eq!(framer.take_subnegotiation().len(), MAX_SUBNEGOTIATION);
    }
}

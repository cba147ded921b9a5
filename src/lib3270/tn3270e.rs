//! TN3270E subnegotiation (RFC 2355)
//!
//! [`Tn3270eMessage`] is the decoded form of an `IAC SB TN3270E ... IAC SE`
//! payload. [`Tn3270eNegotiator`] walks the DEVICE-TYPE and FUNCTIONS
//! exchanges and, once they settle, holds the negotiated session state:
//! functions, submode, bound flag and the last BIND image.

use std::fmt;

use log::{debug, trace, warn};
use thiserror::Error;

use super::bind::BindImage;
use super::codes::*;
use crate::protocol_common::telnet_base::{build_subnegotiation, TelnetOption};

/// A set of TN3270E function codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Functions(u32);

impl Functions {
    pub const NONE: Functions = Functions(0);
    pub const BIND_IMAGE: Functions = Functions(1 << TN3270E_FUNC_BIND_IMAGE);
    pub const DATA_STREAM_CTL: Functions = Functions(1 << TN3270E_FUNC_DATA_STREAM_CTL);
    pub const RESPONSES: Functions = Functions(1 << TN3270E_FUNC_RESPONSES);
    pub const SCS_CTL_CODES: Functions = Functions(1 << TN3270E_FUNC_SCS_CTL_CODES);
    pub const SYSREQ: Functions = Functions(1 << TN3270E_FUNC_SYSREQ);

    /// What a display session asks for
    pub fn default_request() -> Self {
        Self::BIND_IMAGE | Self::RESPONSES | Self::SYSREQ
    }

    /// Build a set from wire codes. Codes past 31 cannot be represented and
    /// are dropped with a warning.
    pub fn from_codes(codes: &[u8]) -> Self {
        let mut set = Self::NONE;
        for &code in codes {
            if code < 32 {
                set.0 |= 1 << code;
            } else {
                warn!("Ignoring out-of-range TN3270E function code {code}");
            }
        }
        set
    }

    /// Wire codes in ascending order
    pub fn to_codes(self) -> Vec<u8> {
        (0u8..32).filter(|&code| self.0 & (1 << code) != 0).collect()
    }

    pub fn contains(self, other: Functions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_subset_of(self, other: Functions) -> bool {
        other.contains(self)
    }

    pub fn intersection(self, other: Functions) -> Functions {
        Functions(self.0 & other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for Functions {
    type Output = Functions;

    fn bitor(self, rhs: Functions) -> Functions {
        Functions(self.0 | rhs.0)
    }
}

impl fmt::Display for Functions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.to_codes().into_iter().map(function_name).collect();
        if names.is_empty() {
            write!(f, "(none)")
        } else {
            write!(f, "{}", names.join(" "))
        }
    }
}

/// DEVICE-TYPE REJECT reasons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    ConnPartner,
    DeviceInUse,
    InvAssociate,
    InvName,
    InvDeviceType,
    TypeNameError,
    UnknownError,
    UnsupportedReq,
    Other(u8),
}

impl RejectReason {
    pub fn from_u8(code: u8) -> Self {
        match code {
            TN3270E_REASON_CONN_PARTNER => RejectReason::ConnPartner,
            TN3270E_REASON_DEVICE_IN_USE => RejectReason::DeviceInUse,
            TN3270E_REASON_INV_ASSOCIATE => RejectReason::InvAssociate,
            TN3270E_REASON_INV_NAME => RejectReason::InvName,
            TN3270E_REASON_INV_DEVICE_TYPE => RejectReason::InvDeviceType,
            TN3270E_REASON_TYPE_NAME_ERROR => RejectReason::TypeNameError,
            TN3270E_REASON_UNKNOWN_ERROR => RejectReason::UnknownError,
            TN3270E_REASON_UNSUPPORTED_REQ => RejectReason::UnsupportedReq,
            other => RejectReason::Other(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            RejectReason::ConnPartner => TN3270E_REASON_CONN_PARTNER,
            RejectReason::DeviceInUse => TN3270E_REASON_DEVICE_IN_USE,
            RejectReason::InvAssociate => TN3270E_REASON_INV_ASSOCIATE,
            RejectReason::InvName => TN3270E_REASON_INV_NAME,
            RejectReason::InvDeviceType => TN3270E_REASON_INV_DEVICE_TYPE,
            RejectReason::TypeNameError => TN3270E_REASON_TYPE_NAME_ERROR,
            RejectReason::UnknownError => TN3270E_REASON_UNKNOWN_ERROR,
            RejectReason::UnsupportedReq => TN3270E_REASON_UNSUPPORTED_REQ,
            RejectReason::Other(code) => code,
        }
    }

    /// Reasons that say TN3270E itself is unusable, whatever LU is tried
    pub fn abandons_tn3270e(self) -> bool {
        matches!(self, RejectReason::InvDeviceType | RejectReason::UnsupportedReq)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectReason::ConnPartner => "CONN-PARTNER",
            RejectReason::DeviceInUse => "DEVICE-IN-USE",
            RejectReason::InvAssociate => "INV-ASSOCIATE",
            RejectReason::InvName => "INV-NAME",
            RejectReason::InvDeviceType => "INV-DEVICE-TYPE",
            RejectReason::TypeNameError => "TYPE-NAME-ERROR",
            RejectReason::UnknownError => "UNKNOWN-ERROR",
            RejectReason::UnsupportedReq => "UNSUPPORTED-REQ",
            RejectReason::Other(code) => return write!(f, "??{code}"),
        };
        f.write_str(name)
    }
}

/// Malformed TN3270E subnegotiation payloads
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubnegotiationError {
    #[error("empty TN3270E subnegotiation")]
    Empty,
    #[error("truncated TN3270E {0}")]
    Truncated(&'static str),
    #[error("unsupported TN3270E {0}")]
    Unsupported(String),
}

/// One decoded TN3270E subnegotiation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tn3270eMessage {
    /// `SEND DEVICE-TYPE`
    SendDeviceType,
    /// `DEVICE-TYPE REQUEST <type> [CONNECT <lu>]`
    DeviceTypeRequest { device_type: String, lu: Option<String> },
    /// `DEVICE-TYPE IS <type> [CONNECT <lu>]`
    DeviceTypeIs { device_type: String, lu: Option<String> },
    /// `DEVICE-TYPE REJECT REASON <code>`
    DeviceTypeReject(RejectReason),
    /// `FUNCTIONS REQUEST <codes>`
    FunctionsRequest(Functions),
    /// `FUNCTIONS IS <codes>`
    FunctionsIs(Functions),
}

impl Tn3270eMessage {
    /// Decode a subnegotiation payload, option byte excluded
    pub fn decode(payload: &[u8]) -> Result<Self, SubnegotiationError> {
        let (&op, rest) = payload.split_first().ok_or(SubnegotiationError::Empty)?;
        match op {
            TN3270E_OP_SEND => match rest.first() {
                Some(&TN3270E_OP_DEVICE_TYPE) => Ok(Tn3270eMessage::SendDeviceType),
                Some(&other) => Err(SubnegotiationError::Unsupported(format!("SEND {}", op_name(other)))),
                None => Err(SubnegotiationError::Truncated("SEND")),
            },
            TN3270E_OP_DEVICE_TYPE => {
                let (&sub, body) = rest
                    .split_first()
                    .ok_or(SubnegotiationError::Truncated("DEVICE-TYPE"))?;
                match sub {
                    TN3270E_OP_REQUEST => {
                        let (device_type, lu) = split_device_type(body);
                        Ok(Tn3270eMessage::DeviceTypeRequest { device_type, lu })
                    }
                    TN3270E_OP_IS => {
                        let (device_type, lu) = split_device_type(body);
                        Ok(Tn3270eMessage::DeviceTypeIs { device_type, lu })
                    }
                    TN3270E_OP_REJECT => match body {
                        [TN3270E_OP_REASON, reason, ..] => {
                            Ok(Tn3270eMessage::DeviceTypeReject(RejectReason::from_u8(*reason)))
                        }
                        _ => Err(SubnegotiationError::Truncated("DEVICE-TYPE REJECT")),
                    },
                    other => Err(SubnegotiationError::Unsupported(format!(
                        "DEVICE-TYPE {}",
                        op_name(other)
                    ))),
                }
            }
            TN3270E_OP_FUNCTIONS => {
                let (&sub, codes) = rest
                    .split_first()
                    .ok_or(SubnegotiationError::Truncated("FUNCTIONS"))?;
                match sub {
                    TN3270E_OP_REQUEST => Ok(Tn3270eMessage::FunctionsRequest(Functions::from_codes(codes))),
                    TN3270E_OP_IS => Ok(Tn3270eMessage::FunctionsIs(Functions::from_codes(codes))),
                    other => Err(SubnegotiationError::Unsupported(format!(
                        "FUNCTIONS {}",
                        op_name(other)
                    ))),
                }
            }
            other => Err(SubnegotiationError::Unsupported(op_name(other))),
        }
    }

    /// Encode as a complete `IAC SB TN3270E ... IAC SE` sequence
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        match self {
            Tn3270eMessage::SendDeviceType => {
                body.extend_from_slice(&[TN3270E_OP_SEND, TN3270E_OP_DEVICE_TYPE]);
            }
            Tn3270eMessage::DeviceTypeRequest { device_type, lu } => {
                body.extend_from_slice(&[TN3270E_OP_DEVICE_TYPE, TN3270E_OP_REQUEST]);
                push_device_type(&mut body, device_type, lu.as_deref());
            }
            Tn3270eMessage::DeviceTypeIs { device_type, lu } => {
                body.extend_from_slice(&[TN3270E_OP_DEVICE_TYPE, TN3270E_OP_IS]);
                push_device_type(&mut body, device_type, lu.as_deref());
            }
            Tn3270eMessage::DeviceTypeReject(reason) => {
                body.extend_from_slice(&[
                    TN3270E_OP_DEVICE_TYPE,
                    TN3270E_OP_REJECT,
                    TN3270E_OP_REASON,
                    reason.code(),
                ]);
            }
            Tn3270eMessage::FunctionsRequest(funcs) => {
                body.extend_from_slice(&[TN3270E_OP_FUNCTIONS, TN3270E_OP_REQUEST]);
                body.extend(funcs.to_codes());
            }
            Tn3270eMessage::FunctionsIs(funcs) => {
                body.extend_from_slice(&[TN3270E_OP_FUNCTIONS, TN3270E_OP_IS]);
                body.extend(funcs.to_codes());
            }
        }
        build_subnegotiation(TelnetOption::TN3270E as u8, &body)
    }
}

impl fmt::Display for Tn3270eMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tn3270eMessage::SendDeviceType => write!(f, "SEND DEVICE-TYPE"),
            Tn3270eMessage::DeviceTypeRequest { device_type, lu } => {
                write!(f, "DEVICE-TYPE REQUEST {device_type}")?;
                lu.iter().try_for_each(|lu| write!(f, " CONNECT {lu}"))
            }
            Tn3270eMessage::DeviceTypeIs { device_type, lu } => {
                write!(f, "DEVICE-TYPE IS {device_type}")?;
                lu.iter().try_for_each(|lu| write!(f, " CONNECT {lu}"))
            }
            Tn3270eMessage::DeviceTypeReject(reason) => write!(f, "DEVICE-TYPE REJECT REASON {reason}"),
            Tn3270eMessage::FunctionsRequest(funcs) => write!(f, "FUNCTIONS REQUEST {funcs}"),
            Tn3270eMessage::FunctionsIs(funcs) => write!(f, "FUNCTIONS IS {funcs}"),
        }
    }
}

fn split_device_type(body: &[u8]) -> (String, Option<String>) {
    let end = body
        .iter()
        .position(|&b| b == TN3270E_OP_CONNECT || b == TN3270E_OP_ASSOCIATE)
        .unwrap_or(body.len());
    let device_type = String::from_utf8_lossy(&body[..end]).into_owned();
    let lu = match body.get(end) {
        Some(&TN3270E_OP_CONNECT) => Some(String::from_utf8_lossy(&body[end + 1..]).into_owned()),
        _ => None,
    };
    (device_type, lu)
}

fn push_device_type(body: &mut Vec<u8>, device_type: &str, lu: Option<&str>) {
    body.extend_from_slice(device_type.as_bytes());
    if let Some(lu) = lu {
        body.push(TN3270E_OP_CONNECT);
        body.extend_from_slice(lu.as_bytes());
    }
}

/// The 3278 equivalent of a terminal type. Hosts know the 3279 as a 3278
/// with color, so DEVICE-TYPE never names a 3279.
pub fn device_type_for(term_type: &str) -> String {
    match term_type.strip_prefix("IBM-3279") {
        Some(rest) => format!("IBM-3278{rest}"),
        None => term_type.to_string(),
    }
}

/// Ordered LU names to try, with a cursor on the current attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateLus {
    names: Vec<String>,
    cursor: usize,
}

impl CandidateLus {
    /// Parse a comma-separated list; blanks are skipped
    pub fn parse(list: &str) -> Self {
        Self {
            names: list
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect(),
            cursor: 0,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.names.get(self.cursor).map(String::as_str)
    }

    /// Move to the next name and return it
    pub fn advance(&mut self) -> Option<&str> {
        if self.cursor < self.names.len() {
            self.cursor += 1;
        }
        self.current()
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.names.len()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Which interpretation the next TN3270E record gets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Submode {
    #[default]
    None,
    ThreeTwoSeventy,
    Nvt,
    Sscp,
}

/// State that only exists once FUNCTIONS has been agreed
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NegotiatedSession {
    pub functions: Functions,
    pub submode: Submode,
    pub bound: bool,
    pub bind: Option<BindImage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Tn3270ePhase {
    #[default]
    Inactive,
    AwaitingDeviceType,
    AwaitingFunctions,
    Negotiated(NegotiatedSession),
}

/// What the caller must do after a message has been handled
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tn3270eOutcome {
    pub reply: Option<Tn3270eMessage>,
    /// TN3270E must be abandoned, with this reason
    pub abandon: Option<String>,
    /// The exchange just reached `Negotiated`
    pub established: bool,
    /// Message was ignored in the current phase
    pub ignored: Option<String>,
}

impl Tn3270eOutcome {
    fn reply(msg: Tn3270eMessage) -> Self {
        Self {
            reply: Some(msg),
            ..Self::default()
        }
    }

    fn abandon(reason: impl Into<String>) -> Self {
        Self {
            abandon: Some(reason.into()),
            ..Self::default()
        }
    }

    fn ignored(reason: impl Into<String>) -> Self {
        Self {
            ignored: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// TN3270E session negotiator
#[derive(Debug, Clone)]
pub struct Tn3270eNegotiator {
    phase: Tn3270ePhase,
    term_type: String,
    requested: Functions,
    lus: CandidateLus,
    reported_device_type: Option<String>,
    connected_lu: Option<String>,
}

impl Tn3270eNegotiator {
    pub fn new(term_type: impl Into<String>, lus: CandidateLus) -> Self {
        Self {
            phase: Tn3270ePhase::Inactive,
            term_type: term_type.into(),
            requested: Functions::default_request(),
            lus,
            reported_device_type: None,
            connected_lu: None,
        }
    }

    pub fn phase(&self) -> &Tn3270ePhase {
        &self.phase
    }

    /// The agreed session, once FUNCTIONS has settled
    pub fn session(&self) -> Option<&NegotiatedSession> {
        match &self.phase {
            Tn3270ePhase::Negotiated(session) => Some(session),
            _ => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut NegotiatedSession> {
        match &mut self.phase {
            Tn3270ePhase::Negotiated(session) => Some(session),
            _ => None,
        }
    }

    /// Negotiated functions; empty before negotiation completes
    pub fn functions(&self) -> Functions {
        self.session().map_or(Functions::NONE, |s| s.functions)
    }

    pub fn submode(&self) -> Submode {
        self.session().map_or(Submode::None, |s| s.submode)
    }

    pub fn bound(&self) -> bool {
        self.session().is_some_and(|s| s.bound)
    }

    pub fn lus(&self) -> &CandidateLus {
        &self.lus
    }

    pub fn lus_mut(&mut self) -> &mut CandidateLus {
        &mut self.lus
    }

    pub fn reported_device_type(&self) -> Option<&str> {
        self.reported_device_type.as_deref()
    }

    pub fn connected_lu(&self) -> Option<&str> {
        self.connected_lu.as_deref()
    }

    /// The host agreed to TN3270E; wait for SEND DEVICE-TYPE
    pub fn start(&mut self) {
        self.reset();
        self.phase = Tn3270ePhase::AwaitingDeviceType;
    }

    /// Back to `Inactive`. The LU cursor is left alone.
    pub fn reset(&mut self) {
        self.phase = Tn3270ePhase::Inactive;
        self.requested = Functions::default_request();
        self.reported_device_type = None;
        self.connected_lu = None;
    }

    pub fn handle(&mut self, msg: Tn3270eMessage) -> Tn3270eOutcome {
        trace!("RCVD TN3270E {msg}");
        match msg {
            Tn3270eMessage::SendDeviceType => {
                if let Tn3270ePhase::Negotiated(_) = self.phase {
                    warn!("Host restarted TN3270E device-type negotiation");
                }
                self.phase = Tn3270ePhase::AwaitingDeviceType;
                self.requested = Functions::default_request();
                Tn3270eOutcome::reply(self.device_type_request())
            }
            Tn3270eMessage::DeviceTypeIs { device_type, lu } => {
                if self.phase != Tn3270ePhase::AwaitingDeviceType {
                    return Tn3270eOutcome::ignored("DEVICE-TYPE IS outside device-type negotiation");
                }
                debug!(
                    "Host reports device type {device_type}, LU {}",
                    lu.as_deref().unwrap_or("(none)")
                );
                self.reported_device_type = Some(device_type);
                self.connected_lu = lu;
                self.phase = Tn3270ePhase::AwaitingFunctions;
                Tn3270eOutcome::reply(Tn3270eMessage::FunctionsRequest(self.requested))
            }
            Tn3270eMessage::DeviceTypeReject(reason) => {
                if self.phase != Tn3270ePhase::AwaitingDeviceType {
                    return Tn3270eOutcome::ignored("DEVICE-TYPE REJECT outside device-type negotiation");
                }
                if reason.abandons_tn3270e() {
                    return Tn3270eOutcome::abandon(format!("Host rejected device type: {reason}"));
                }
                match self.lus.advance() {
                    Some(lu) => {
                        debug!("Host rejected LU ({reason}), trying {lu}");
                        Tn3270eOutcome::reply(self.device_type_request())
                    }
                    None => Tn3270eOutcome::abandon(format!("Host rejected resource(s): {reason}")),
                }
            }
            Tn3270eMessage::FunctionsRequest(wanted) => {
                if self.phase != Tn3270ePhase::AwaitingFunctions {
                    return Tn3270eOutcome::ignored("FUNCTIONS REQUEST outside functions negotiation");
                }
                if wanted.is_subset_of(self.requested) {
                    self.requested = wanted;
                    self.establish(wanted);
                    Tn3270eOutcome {
                        reply: Some(Tn3270eMessage::FunctionsIs(wanted)),
                        established: true,
                        ..Tn3270eOutcome::default()
                    }
                } else {
                    self.requested = self.requested.intersection(wanted);
                    Tn3270eOutcome::reply(Tn3270eMessage::FunctionsRequest(self.requested))
                }
            }
            Tn3270eMessage::FunctionsIs(granted) => {
                if self.phase != Tn3270ePhase::AwaitingFunctions {
                    return Tn3270eOutcome::ignored("FUNCTIONS IS outside functions negotiation");
                }
                if !granted.is_subset_of(self.requested) {
                    return Tn3270eOutcome::abandon(format!(
                        "Host illegally added function(s): asked for {}, got {granted}",
                        self.requested
                    ));
                }
                self.requested = granted;
                self.establish(granted);
                Tn3270eOutcome {
                    established: true,
                    ..Tn3270eOutcome::default()
                }
            }
            Tn3270eMessage::DeviceTypeRequest { .. } => {
                Tn3270eOutcome::ignored("DEVICE-TYPE REQUEST is a client message")
            }
        }
    }

    fn establish(&mut self, functions: Functions) {
        debug!("TN3270E negotiated, functions: {functions}");
        self.phase = Tn3270ePhase::Negotiated(NegotiatedSession {
            functions,
            ..NegotiatedSession::default()
        });
    }

    fn device_type_request(&self) -> Tn3270eMessage {
        Tn3270eMessage::DeviceTypeRequest {
            device_type: device_type_for(&self.term_type),
            lu: self.lus.current().map(String::from),
        }
    }
}

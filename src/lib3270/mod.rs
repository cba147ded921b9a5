//! TN3270 and TN3270E protocol layer
//!
//! Everything between the telnet byte stream and the 3270 data-stream
//! interpreter: the TN3270E subnegotiation (RFC 2355), BIND image decoding,
//! and the record framing used in both directions. The data stream itself
//! (commands, orders, the screen buffer) belongs to the host session
//! consumer, see [`crate::protocol_common::traits::HostSession`].
//!
//! # Architecture
//!
//! - [`codes`] - TN3270E operation, reason, function and data-type codes
//! - [`tn3270e`] - DEVICE-TYPE/FUNCTIONS messages and the session negotiator
//! - [`bind`] - BIND image decoding and geometry validation
//! - [`record`] - record assembly and output framing

pub mod bind;
pub mod codes;
pub mod record;
pub mod tn3270e;

pub use bind::{BindError, BindGeometry, BindImage, GeometryLimits, ScreenGeometry};
pub use record::{DataType, OutputFraming, RecordAssembler, RecordHeader, Transmitter};
pub use tn3270e::{
    CandidateLus, Functions, NegotiatedSession, RejectReason, SubnegotiationError, Submode,
    Tn3270eMessage, Tn3270eNegotiator, Tn3270eOutcome, Tn3270ePhase,
};

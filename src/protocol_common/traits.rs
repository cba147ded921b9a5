//! The boundary between the connection engine and the emulator above it
//!
//! The engine owns the telnet and TN3270E protocol state. It does not own a
//! screen, an NVT emulator or a trace window. Those live behind
//! [`HostSession`], which the engine calls with completed records and state
//! changes.

use crate::error::Diagnostic;
use crate::lib3270::bind::ScreenGeometry;
use crate::lib3270::codes::{TN3270E_NEG_COMMAND_REJECT, TN3270E_NEG_OPERATION_CHECK};
use crate::lib3270::record::Transmitter;
use crate::session::ConnectionMode;

/// Outcome of interpreting one 3270 data-stream record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStreamResult {
    /// Processed, and the consumer queued a reply
    OkayOutput,
    /// Processed, nothing to send
    OkayNoOutput,
    /// Unknown or invalid command
    BadCommand,
    /// Buffer address out of range
    BadAddress,
}

impl DataStreamResult {
    pub fn is_error(self) -> bool {
        matches!(self, DataStreamResult::BadCommand | DataStreamResult::BadAddress)
    }

    /// Sense code for a negative TN3270E response
    pub fn negative_response_code(self) -> Option<u8> {
        match self {
            DataStreamResult::BadCommand => Some(TN3270E_NEG_COMMAND_REJECT),
            DataStreamResult::BadAddress => Some(TN3270E_NEG_OPERATION_CHECK),
            DataStreamResult::OkayOutput | DataStreamResult::OkayNoOutput => None,
        }
    }
}

/// Consumer of records and session events
///
/// Records arrive header-stripped. A consumer that answers a record (a read
/// reply, an AID) does so through the [`Transmitter`] it is handed, which
/// frames the reply for the current mode.
pub trait HostSession {
    /// Interpret a 3270 data-stream record
    fn process_ds(&mut self, record: &[u8], tx: &mut Transmitter) -> DataStreamResult;

    /// Interpret an SSCP-LU record (unformatted host traffic)
    fn write_sscp_lu(&mut self, record: &[u8], tx: &mut Transmitter);

    /// One byte of NVT character data
    fn ansi_process(&mut self, byte: u8);

    /// The connection mode or the bound flag changed
    fn mode_changed(&mut self, _mode: ConnectionMode, _bound: bool) {}

    /// A BIND or UNBIND changed (or tried to change) the screen size.
    /// With `valid == false` the geometry is the one still in force.
    fn geometry_changed(&mut self, _geometry: ScreenGeometry, _valid: bool) {}

    /// A non-fatal protocol condition
    fn diagnostic(&mut self, _diagnostic: Diagnostic) {}
}

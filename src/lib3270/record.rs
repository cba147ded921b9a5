//! Record assembly and output framing
//!
//! Inbound, [`RecordAssembler`] collects un-stuffed data bytes until the
//! framer sees `IAC EOR`. Outbound, [`Transmitter`] turns a record into wire
//! bytes: optional TN3270E header, IAC doubling, trailing `IAC EOR`.

use std::fmt;

use log::{debug, trace};

use super::codes::*;
use crate::protocol_common::telnet_base::{append_escaped, TelnetCommand, IAC};

/// TN3270E header data types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Data3270,
    Scs,
    Response,
    BindImage,
    Unbind,
    NvtData,
    Request,
    SscpLuData,
    PrintEoj,
    Unknown(u8),
}

impl DataType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            TN3270E_DT_3270_DATA => DataType::Data3270,
            TN3270E_DT_SCS_DATA => DataType::Scs,
            TN3270E_DT_RESPONSE => DataType::Response,
            TN3270E_DT_BIND_IMAGE => DataType::BindImage,
            TN3270E_DT_UNBIND => DataType::Unbind,
            TN3270E_DT_NVT_DATA => DataType::NvtData,
            TN3270E_DT_REQUEST => DataType::Request,
            TN3270E_DT_SSCP_LU_DATA => DataType::SscpLuData,
            TN3270E_DT_PRINT_EOJ => DataType::PrintEoj,
            other => DataType::Unknown(other),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            DataType::Data3270 => TN3270E_DT_3270_DATA,
            DataType::Scs => TN3270E_DT_SCS_DATA,
            DataType::Response => TN3270E_DT_RESPONSE,
            DataType::BindImage => TN3270E_DT_BIND_IMAGE,
            DataType::Unbind => TN3270E_DT_UNBIND,
            DataType::NvtData => TN3270E_DT_NVT_DATA,
            DataType::Request => TN3270E_DT_REQUEST,
            DataType::SscpLuData => TN3270E_DT_SSCP_LU_DATA,
            DataType::PrintEoj => TN3270E_DT_PRINT_EOJ,
            DataType::Unknown(code) => code,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Data3270 => "3270-DATA",
            DataType::Scs => "SCS-DATA",
            DataType::Response => "RESPONSE",
            DataType::BindImage => "BIND-IMAGE",
            DataType::Unbind => "UNBIND",
            DataType::NvtData => "NVT-DATA",
            DataType::Request => "REQUEST",
            DataType::SscpLuData => "SSCP-LU-DATA",
            DataType::PrintEoj => "PRINT-EOJ",
            DataType::Unknown(code) => return write!(f, "??{code}"),
        };
        f.write_str(name)
    }
}

/// The 5-byte header in front of every TN3270E record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub data_type: DataType,
    pub request_flag: u8,
    pub response_flag: u8,
    pub seq_number: u16,
}

impl RecordHeader {
    /// Split a record into header and payload
    pub fn parse(record: &[u8]) -> Option<(RecordHeader, &[u8])> {
        if record.len() < EH_SIZE {
            return None;
        }
        let (head, payload) = record.split_at(EH_SIZE);
        let header = RecordHeader {
            data_type: DataType::from_u8(head[0]),
            request_flag: head[1],
            response_flag: head[2],
            seq_number: u16::from_be_bytes([head[3], head[4]]),
        };
        Some((header, payload))
    }

    pub fn to_bytes(&self) -> [u8; EH_SIZE] {
        let [hi, lo] = self.seq_number.to_be_bytes();
        [self.data_type.code(), self.request_flag, self.response_flag, hi, lo]
    }
}

/// Collects data bytes between EOR markers
#[derive(Debug, Default)]
pub struct RecordAssembler {
    buffer: Vec<u8>,
}

impl RecordAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, byte: u8) {
        self.buffer.push(byte);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Take the completed record; hand it back through
    /// [`RecordAssembler::recycle`] once it has been processed
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    pub fn recycle(&mut self, mut record: Vec<u8>) {
        record.clear();
        if self.buffer.is_empty() && record.capacity() > self.buffer.capacity() {
            self.buffer = record;
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// How outbound records are wrapped in the current connection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFraming {
    /// Character mode: bytes are only IAC-doubled
    Nvt,
    /// TN3270: IAC-doubled record followed by `IAC EOR`
    Record,
    /// TN3270E: header, IAC-doubled record, `IAC EOR`. `data_type` is the
    /// type used for records sent with [`Transmitter::send_record`].
    Tn3270e { data_type: DataType, responses: bool },
}

/// Output framer
///
/// Every byte bound for the host goes through one growable buffer, so
/// ordering between negotiation replies, acknowledgements and records is the
/// order in which they were queued.
#[derive(Debug)]
pub struct Transmitter {
    out: Vec<u8>,
    framing: OutputFraming,
    seq: u16,
    pending_ack: Option<PendingAck>,
    records_sent: u64,
}

/// A positive response owed for the record being processed, and where in
/// the output it belongs
#[derive(Debug, Clone, Copy)]
struct PendingAck {
    seq_number: u16,
    at: usize,
}

impl Default for Transmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Transmitter {
    pub fn new() -> Self {
        Self {
            out: Vec::with_capacity(1024),
            framing: OutputFraming::Nvt,
            seq: 0,
            pending_ack: None,
            records_sent: 0,
        }
    }

    pub fn framing(&self) -> OutputFraming {
        self.framing
    }

    pub fn set_framing(&mut self, framing: OutputFraming) {
        self.framing = framing;
    }

    /// Next outbound TN3270E sequence number
    pub fn sequence(&self) -> u16 {
        self.seq
    }

    pub fn records_sent(&self) -> u64 {
        self.records_sent
    }

    /// Queue a 3270 or SSCP-LU record
    pub fn send_record(&mut self, data: &[u8]) {
        match self.framing {
            OutputFraming::Nvt | OutputFraming::Record => {
                append_escaped(&mut self.out, data);
                self.push_eor();
            }
            OutputFraming::Tn3270e { data_type, responses } => {
                self.push_tn3270e(data_type, responses, data);
            }
        }
        self.records_sent += 1;
        trace!("SENT record, {} bytes", data.len());
    }

    /// Queue NVT data: an NVT-DATA record in TN3270E, plain bytes otherwise
    pub fn send_nvt(&mut self, data: &[u8]) {
        match self.framing {
            OutputFraming::Tn3270e { responses, .. } => {
                self.push_tn3270e(DataType::NvtData, responses, data);
                self.records_sent += 1;
            }
            OutputFraming::Nvt | OutputFraming::Record => append_escaped(&mut self.out, data),
        }
    }

    /// Queue bytes that are already wire-ready (negotiation sequences)
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    /// The record being processed asked for a positive response. Whatever
    /// the consumer queues from here on goes out after the response.
    pub fn expect_response(&mut self, seq_number: u16) {
        self.pending_ack = Some(PendingAck {
            seq_number,
            at: self.out.len(),
        });
    }

    /// Sequence number of a positive response not yet settled
    pub fn pending_ack(&self) -> Option<u16> {
        self.pending_ack.map(|p| p.seq_number)
    }

    /// Forget an owed positive response without sending it
    pub fn cancel_pending_ack(&mut self) {
        self.pending_ack = None;
    }

    /// Send the one response for `seq_number`: positive (DEVICE-END) when
    /// `negative` is `None`, otherwise negative with that sense code. It is
    /// placed ahead of anything queued since [`expect_response`](Self::expect_response).
    pub fn respond(&mut self, seq_number: u16, negative: Option<u8>) {
        let at = match self.pending_ack.take() {
            Some(p) => p.at.min(self.out.len()),
            None => self.out.len(),
        };
        let (flag, code) = match negative {
            None => {
                debug!("SENT TN3270E(RESPONSE POSITIVE-RESPONSE {seq_number}) DEVICE-END");
                (TN3270E_RSF_POSITIVE_RESPONSE, TN3270E_POS_DEVICE_END)
            }
            Some(code) => {
                debug!("SENT TN3270E(RESPONSE NEGATIVE-RESPONSE {seq_number}) 0x{code:02x}");
                (TN3270E_RSF_NEGATIVE_RESPONSE, code)
            }
        };
        let header = RecordHeader {
            data_type: DataType::Response,
            request_flag: 0,
            response_flag: flag,
            seq_number,
        };
        let mut response = Vec::with_capacity(EH_SIZE * 2 + 3);
        append_escaped(&mut response, &header.to_bytes());
        response.extend_from_slice(&[code, IAC, TelnetCommand::EOR as u8]);
        self.out.splice(at..at, response);
    }

    pub fn has_output(&self) -> bool {
        !self.out.is_empty()
    }

    /// Drain everything queued so far
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }

    /// Reset sequence numbers and pending state for a new connection
    pub fn reset(&mut self) {
        self.out.clear();
        self.framing = OutputFraming::Nvt;
        self.seq = 0;
        self.pending_ack = None;
        self.records_sent = 0;
    }

    fn push_tn3270e(&mut self, data_type: DataType, responses: bool, data: &[u8]) {
        let header = RecordHeader {
            data_type,
            request_flag: 0,
            response_flag: TN3270E_RSF_NO_RESPONSE,
            seq_number: self.seq,
        };
        append_escaped(&mut self.out, &header.to_bytes());
        append_escaped(&mut self.out, data);
        self.push_eor();
        if responses {
            self.seq = (self.seq + 1) & E_SEQ_MASK;
        }
    }

    fn push_eor(&mut self) {
        self.out.extend_from_slice(&[IAC, TelnetCommand::EOR as u8]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EOR: u8 = TelnetCommand::EOR as u8;

    #[test]
    fn test_header_parse() {
        let record = [TN3270E_DT_3270_DATA, 0, TN3270E_RSF_ALWAYS_RESPONSE, 0x01, 0x02, 0xF5];
        let (header, payload) = RecordHeader::parse(&record).unwrap();
        assert_eq!(header.data_type, DataType::Data3270);
        assert_eq!(header.response_flag, TN3270E_RSF_ALWAYS_RESPONSE);
        assert_eq!(header.seq_number, 0x0102);
        assert_eq!(payload, &[0xF5]);
        assert!(RecordHeader::parse(&record[..4]).is_none());
    }

    #[test]
    fn test_assembler_reuses_buffer() {
        let mut asm = RecordAssembler::new();
        for b in 0..100u8 {
            asm.push(b);
        }
        let record = asm.take();
        assert_eq!(record.len(), 100);
        assert!(asm.is_empty());
        let cap = record.capacity();
        asm.recycle(record);
        asm.push(1);
        assert_eq!(asm.len(), 1);
        assert!(asm.buffer.capacity() >= cap);
    }

    #[test]
    fn test_plain_record_framing() {
        let mut tx = Transmitter::new();
        tx.set_framing(OutputFraming::Record);
        tx.send_record(&[0x7D, 0xFF, 0x40]);
        assert_eq!(tx.take_output(), vec![0x7D, 0xFF, 0xFF, 0x40, IAC, EOR]);
        assert_eq!(tx.records_sent(), 1);
    }

    #[test]
    fn test_nvt_framing_has_no_eor() {
        let mut tx = Transmitter::new();
        tx.send_nvt(b"ls\r\n");
        assert_eq!(tx.take_output(), b"ls\r\n".to_vec());
    }

    #[test]
    fn test_tn3270e_header_and_sequence() {
        let mut tx = Transmitter::new();
        tx.set_framing(OutputFraming::Tn3270e {
            data_type: DataType::Data3270,
            responses: true,
        });
        tx.send_record(&[0x7D]);
        tx.send_record(&[0x7D]);
        let out = tx.take_output();
        assert_eq!(&out[..8], &[0, 0, 0, 0, 0, 0x7D, IAC, EOR]);
        assert_eq!(&out[8..], &[0, 0, 0, 0, 1, 0x7D, IAC, EOR]);
        assert_eq!(tx.sequence(), 2);
    }

    #[test]
    fn test_sequence_fixed_without_responses() {
        let mut tx = Transmitter::new();
        tx.set_framing(OutputFraming::Tn3270e {
            data_type: DataType::SscpLuData,
            responses: false,
        });
        tx.send_record(b"x");
        tx.send_record(b"y");
        assert_eq!(tx.sequence(), 0);
        assert_eq!(tx.take_output()[0], TN3270E_DT_SSCP_LU_DATA);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut tx = Transmitter::new();
        tx.set_framing(OutputFraming::Tn3270e {
            data_type: DataType::Data3270,
            responses: true,
        });
        tx.seq = E_SEQ_MASK;
        tx.send_record(&[]);
        assert_eq!(tx.sequence(), 0);
    }

    #[test]
    fn test_ack_escapes_sequence() {
        let mut tx = Transmitter::new();
        tx.respond(0x00FF, None);
        assert_eq!(
            tx.take_output(),
            vec![TN3270E_DT_RESPONSE, 0, TN3270E_RSF_POSITIVE_RESPONSE, 0x00, 0xFF, 0xFF, 0x00, IAC, EOR]
        );
        tx.respond(0x0102, Some(TN3270E_NEG_COMMAND_REJECT));
        assert_eq!(
            tx.take_output(),
            vec![TN3270E_DT_RESPONSE, 0, TN3270E_RSF_NEGATIVE_RESPONSE, 0x01, 0x02, 0x00, IAC, EOR]
        );
    }

    #[test]
    fn test_pending_ack_precedes_record() {
        let mut tx = Transmitter::new();
        tx.set_framing(OutputFraming::Tn3270e {
            data_type: DataType::Data3270,
            responses: true,
        });
        tx.send_raw(&[IAC, 241]);
        tx.expect_response(7);
        tx.send_record(&[0x88]);
        assert_eq!(tx.pending_ack(), Some(7));
        tx.respond(7, None);
        let out = tx.take_output();
        assert_eq!(&out[..2], &[IAC, 241]);
        assert_eq!(out[2], TN3270E_DT_RESPONSE);
        assert_eq!(&out[5..7], &[0, 7]);
        assert_eq!(out[10], TN3270E_DT_3270_DATA);
        assert_eq!(tx.pending_ack(), None);
    }

    #[test]
    fn test_negative_response_replaces_owed_ack() {
        let mut tx = Transmitter::new();
        tx.set_framing(OutputFraming::Tn3270e {
            data_type: DataType::Data3270,
            responses: true,
        });
        tx.expect_response(9);
        tx.send_record(&[0x88]);
        tx.respond(9, Some(TN3270E_NEG_COMMAND_REJECT));
        let out = tx.take_output();
        assert_eq!(
            &out[..8],
            &[TN3270E_DT_RESPONSE, 0, TN3270E_RSF_NEGATIVE_RESPONSE, 0, 9, 0, IAC, EOR]
        );
        assert_eq!(out[8], TN3270E_DT_3270_DATA);
        let responses = out.windows(3).filter(|w| w[0] == TN3270E_DT_RESPONSE && w[1] == 0).count();
        assert_eq!(responses, 1);
    }
}

/// TN3270E Protocol Constants
///
/// Operation codes, reason codes, function codes, data types and header
/// flags used by the TN3270E subnegotiation and record header, as
/// specified in RFC 2355, plus the BIND-image offsets the session
/// negotiator reads.
///
/// # References
/// - RFC 1576: TN3270 Current Practices
/// - RFC 1646: TN3270 Extensions for LUname and Printer Selection
/// - RFC 2355: TN3270 Enhancements
/// - SNA Formats (GA27-3136), BIND request unit

/// TN3270E subnegotiation operation codes
pub const TN3270E_OP_ASSOCIATE: u8 = 0x00;
pub const TN3270E_OP_CONNECT: u8 = 0x01;
pub const TN3270E_OP_DEVICE_TYPE: u8 = 0x02;
pub const TN3270E_OP_FUNCTIONS: u8 = 0x03;
pub const TN3270E_OP_IS: u8 = 0x04;
pub const TN3270E_OP_REASON: u8 = 0x05;
pub const TN3270E_OP_REJECT: u8 = 0x06;
pub const TN3270E_OP_REQUEST: u8 = 0x07;
pub const TN3270E_OP_SEND: u8 = 0x08;

/// DEVICE-TYPE REJECT reason codes
pub const TN3270E_REASON_CONN_PARTNER: u8 = 0x00;
pub const TN3270E_REASON_DEVICE_IN_USE: u8 = 0x01;
pub const TN3270E_REASON_INV_ASSOCIATE: u8 = 0x02;
pub const TN3270E_REASON_INV_NAME: u8 = 0x03;
pub const TN3270E_REASON_INV_DEVICE_TYPE: u8 = 0x04;
pub const TN3270E_REASON_TYPE_NAME_ERROR: u8 = 0x05;
pub const TN3270E_REASON_UNKNOWN_ERROR: u8 = 0x06;
pub const TN3270E_REASON_UNSUPPORTED_REQ: u8 = 0x07;

/// FUNCTIONS codes (bit positions in [`super::tn3270e::Functions`])
pub const TN3270E_FUNC_BIND_IMAGE: u8 = 0x00;
pub const TN3270E_FUNC_DATA_STREAM_CTL: u8 = 0x01;
pub const TN3270E_FUNC_RESPONSES: u8 = 0x02;
pub const TN3270E_FUNC_SCS_CTL_CODES: u8 = 0x03;
pub const TN3270E_FUNC_SYSREQ: u8 = 0x04;

/// TN3270E header data types
pub const TN3270E_DT_3270_DATA: u8 = 0x00;
pub const TN3270E_DT_SCS_DATA: u8 = 0x01;
pub const TN3270E_DT_RESPONSE: u8 = 0x02;
pub const TN3270E_DT_BIND_IMAGE: u8 = 0x03;
pub const TN3270E_DT_UNBIND: u8 = 0x04;
pub const TN3270E_DT_NVT_DATA: u8 = 0x05;
pub const TN3270E_DT_REQUEST: u8 = 0x06;
pub const TN3270E_DT_SSCP_LU_DATA: u8 = 0x07;
pub const TN3270E_DT_PRINT_EOJ: u8 = 0x08;

/// Header response flags for 3270-DATA and SCS-DATA
pub const TN3270E_RSF_NO_RESPONSE: u8 = 0x00;
pub const TN3270E_RSF_ERROR_RESPONSE: u8 = 0x01;
pub const TN3270E_RSF_ALWAYS_RESPONSE: u8 = 0x02;

/// Header response flags for RESPONSE records
pub const TN3270E_RSF_POSITIVE_RESPONSE: u8 = 0x00;
pub const TN3270E_RSF_NEGATIVE_RESPONSE: u8 = 0x01;

/// RESPONSE record payloads
pub const TN3270E_POS_DEVICE_END: u8 = 0x00;
pub const TN3270E_NEG_COMMAND_REJECT: u8 = 0x00;
pub const TN3270E_NEG_OPERATION_CHECK: u8 = 0x02;

/// Size of the TN3270E record header
pub const EH_SIZE: usize = 5;

/// Outbound sequence numbers are 15 bits wide
pub const E_SEQ_MASK: u16 = 0x7FFF;

/// BIND request unit code
pub const BIND_RU: u8 = 0x31;

/// BIND image field offsets
pub const BIND_OFF_MAXRU_SEC: usize = 10;
pub const BIND_OFF_MAXRU_PRI: usize = 11;
pub const BIND_OFF_RD: usize = 20;
pub const BIND_OFF_CD: usize = 21;
pub const BIND_OFF_RA: usize = 22;
pub const BIND_OFF_CA: usize = 23;
pub const BIND_OFF_SSIZE: usize = 24;
/// PLU name length, after the cryptography options byte at 26
pub const BIND_OFF_PLU_NAME_LEN: usize = 27;
pub const BIND_OFF_PLU_NAME: usize = 28;
pub const BIND_PLU_NAME_MAX: usize = 8;

/// BIND screen-size format bytes
pub const BIND_SS_MODEL2: u8 = 0x00;
pub const BIND_SS_MODEL2_ALT: u8 = 0x02;
pub const BIND_SS_MODEL2_DEFAULT_MAX_ALT: u8 = 0x03;
pub const BIND_SS_DEFAULT_EQUALS_ALT: u8 = 0x7E;
pub const BIND_SS_EXPLICIT: u8 = 0x7F;

/// Smallest supported screen: Model 2
pub const MODEL_2_ROWS: u16 = 24;
pub const MODEL_2_COLS: u16 = 80;

/// Printable name for a TN3270E operation code
pub fn op_name(op: u8) -> String {
    match op {
        TN3270E_OP_ASSOCIATE => "ASSOCIATE".to_string(),
        TN3270E_OP_CONNECT => "CONNECT".to_string(),
        TN3270E_OP_DEVICE_TYPE => "DEVICE-TYPE".to_string(),
        TN3270E_OP_FUNCTIONS => "FUNCTIONS".to_string(),
        TN3270E_OP_IS => "IS".to_string(),
        TN3270E_OP_REASON => "REASON".to_string(),
        TN3270E_OP_REJECT => "REJECT".to_string(),
        TN3270E_OP_REQUEST => "REQUEST".to_string(),
        TN3270E_OP_SEND => "SEND".to_string(),
        other => format!("??{other}"),
    }
}

/// Printable name for a FUNCTIONS code
pub fn function_name(func: u8) -> String {
    match func {
        TN3270E_FUNC_BIND_IMAGE => "BIND-IMAGE".to_string(),
        TN3270E_FUNC_DATA_STREAM_CTL => "DATA-STREAM-CTL".to_string(),
        TN3270E_FUNC_RESPONSES => "RESPONSES".to_string(),
        TN3270E_FUNC_SCS_CTL_CODES => "SCS-CTL-CODES".to_string(),
        TN3270E_FUNC_SYSREQ => "SYSREQ".to_string(),
        other => format!("??{other}"),
    }
}

//! Protocol building blocks shared by the telnet and TN3270 layers
//!
//! - [`ebcdic`] - CP037 conversion, used for names carried in BIND images
//! - [`telnet_base`] - telnet command and option codes, the byte framer
//! - [`traits`] - the [`HostSession`](traits::HostSession) boundary trait
//!
//! # Examples
//!
//! ```
//! use tn3270r::protocol_common::ebcdic::{ebcdic_name, ebcdic_to_ascii};
//!
//! assert_eq!(ebcdic_to_ascii(0xC1), 'A');
//! assert_eq!(ebcdic_name(&[0xC3, 0xC9, 0xC3, 0xE2, 0x40]), "CICS");
//! ```

pub mod ebcdic;
pub mod telnet_base;
pub mod traits;

pub use ebcdic::{ebcdic_name, ebcdic_to_ascii};
pub use telnet_base::{
    build_negotiation, build_subnegotiation, FramerEvent, NegotiationVerb, SyntaxError,
    TelnetCommand, TelnetFramer, TelnetOption,
};
pub use traits::{DataStreamResult, HostSession};

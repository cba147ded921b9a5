//! Property tests for framing and negotiation

mod utils;

use proptest::prelude::*;
use tn3270r::lib3270::record::{OutputFraming, RecordAssembler, Transmitter};
use tn3270r::protocol_common::telnet_base::{FramerEvent, TelnetFramer};
use tn3270r::telnet_negotiation::{NegotiationSettings, TelnetNegotiator};
use tn3270r::SessionConfig;
use utils::*;

/// Decode wire bytes back into records
fn decode_records(wire: &[u8]) -> Vec<Vec<u8>> {
    let mut framer = TelnetFramer::new();
    let mut assembler = RecordAssembler::new();
    let mut records = Vec::new();
    for &b in wire {
        match framer.step(b) {
            FramerEvent::Data(d) => assembler.push(d),
            FramerEvent::EndOfRecord => records.push(assembler.take()),
            _ => {}
        }
    }
    records
}

proptest! {
    #[test]
    fn prop_record_round_trips(data in proptest::collection::vec(any::<u8>(), 0..512)) {
        let mut tx = Transmitter::new();
        tx.set_framing(OutputFraming::Record);
        tx.send_record(&data);
        let wire = tx.take_output();

        let iacs = data.iter().filter(|&&b| b == IAC).count();
        prop_assert_eq!(wire.len(), data.len() + iacs + 2);
        prop_assert_eq!(decode_records(&wire), vec![data]);
    }

    #[test]
    fn prop_negotiation_idempotent(option in any::<u8>(), repeats in 1usize..4) {
        let mut neg = TelnetNegotiator::new(NegotiationSettings {
            tn3270e_allowed: true,
            bsd_tm: true,
            tls_available: true,
        });
        neg.on_will(option);
        neg.on_do(option);
        neg.take_output();

        let state = neg.state(option);
        if state.local && state.remote {
            for _ in 0..repeats {
                neg.on_will(option);
                neg.on_do(option);
            }
            prop_assert!(!neg.has_output());
            prop_assert_eq!(neg.state(option), state);
        }
    }

    #[test]
    fn prop_session_never_stalls_on_noise(input in proptest::collection::vec(any::<u8>(), 0..1024)) {
        let cfg = SessionConfig {
            starttls: false,
            ..config()
        };
        let (mut session, mut host) = session_with(&cfg);
        let consumed = session.process_input(&input, &mut host);
        prop_assert_eq!(consumed, input.len());
        prop_assert_eq!(session.stats().bytes_received, input.len() as u64);
    }

    #[test]
    fn prop_chunking_does_not_change_records(
        records in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..64), 1..8),
        chunk in 1usize..16,
    ) {
        let mut wire = Vec::new();
        for r in &records {
            wire.extend(record(r));
        }
        let (mut session, mut host) = session_with(&config());
        negotiate_tn3270(&mut session, &mut host);
        for piece in wire.chunks(chunk) {
            session.process_input(piece, &mut host);
        }
        prop_assert_eq!(host.records(), records);
    }
}

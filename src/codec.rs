//! Event serialization seam.
//!
//! The storage stage persists encoded events, not Rust structs; the codec
//! trait keeps the wire format swappable without touching the pipeline. The
//! default codec is bincode, which keeps records compact and self-contained
//! for the length-prefixed log framing.

use thiserror::Error;

use crate::event::Event;

/// Errors from encoding or decoding events.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The event could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),
    /// The record bytes did not decode to an event.
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Converts events to and from record payload bytes.
pub trait EventCodec: Send + Sync {
    /// Serializes an event into record payload bytes.
    fn encode(&self, event: &Event) -> Result<Vec<u8>, CodecError>;

    /// Deserializes record payload bytes back into an event.
    fn decode(&self, bytes: &[u8]) -> Result<Event, CodecError>;
}

/// Default codec: bincode over the event's serde representation.
#[derive(Debug, Default, Clone, Copy)]
pub struct BincodeCodec;

impl EventCodec for BincodeCodec {
    fn encode(&self, event: &Event) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(event).map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Event, CodecError> {
        bincode::deserialize(bytes).map_err(|err| CodecError::Decode(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{AuxReading, AuxSource, EventPayload, ExgSample};

    #[test]
    fn exg_event_round_trips() {
        let codec = BincodeCodec;
        let event = Event::exg(
            1_234_567,
            ExgSample {
                status: [0xC0, 0x12, 0x34],
                channels: [[0x01, 0x02, 0x03]; 8],
                sequence: 41,
            },
        );
        let bytes = codec.encode(&event).expect("encodes");
        let decoded = codec.decode(&bytes).expect("decodes");
        assert_eq!(decoded, event);
    }

    #[test]
    fn aux_and_unknown_events_round_trip() {
        let codec = BincodeCodec;
        for event in [
            Event::aux(
                9,
                AuxReading {
                    source: AuxSource::Battery,
                    raw: 87,
                },
            ),
            Event::unknown(10),
        ] {
            let bytes = codec.encode(&event).expect("encodes");
            assert_eq!(codec.decode(&bytes).expect("decodes"), event);
        }
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let codec = BincodeCodec;
        let result = codec.decode(&[0xFF; 3]);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }

    #[test]
    fn payload_variants_stay_distinct() {
        let codec = BincodeCodec;
        let unknown = Event::unknown(0);
        let bytes = codec.encode(&unknown).expect("encodes");
        let decoded = codec.decode(&bytes).expect("decodes");
        assert_eq!(decoded.payload, EventPayload::None);
    }
}

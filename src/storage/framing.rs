//! On-media record framing.
//!
//! Every log file starts with a fixed 12-byte header, followed by records
//! framed as a little-endian `u16` payload length and the payload itself.
//! Appends go to the medium one framed record at a time, so a truncated tail
//! after power loss costs at most the final record. [`RecordReader`] walks
//! the complete records of a file body and reports whether a partial tail
//! was left behind.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Magic prefix of every log file: `BFP_LOG` + an interrobang + format
/// version. The trailing version byte is doubled; readers in the field
/// expect both.
pub const LOG_FILE_HEADER: [u8; 12] = [
    0x42, 0x46, 0x50, 0x5F, 0x4C, 0x4F, 0x47, 0xE2, 0x80, 0xBD, 0x04, 0x04,
];

/// Largest payload a length prefix can describe.
pub const MAX_RECORD_LEN: usize = u16::MAX as usize;

/// Framing failures.
#[derive(Error, Debug)]
pub enum FramingError {
    /// Payload does not fit in a `u16` length prefix.
    #[error("record of {len} bytes exceeds the {MAX_RECORD_LEN} byte frame limit")]
    RecordTooLong {
        /// Payload length that was rejected.
        len: usize,
    },

    /// File does not start with [`LOG_FILE_HEADER`].
    #[error("log file header missing or corrupt")]
    BadHeader,
}

/// Frames one payload as `len:u16-le ++ payload`.
pub fn encode_record(payload: &[u8]) -> Result<Bytes, FramingError> {
    if payload.len() > MAX_RECORD_LEN {
        return Err(FramingError::RecordTooLong {
            len: payload.len(),
        });
    }
    let mut frame = BytesMut::with_capacity(2 + payload.len());
    #[allow(clippy::cast_possible_truncation)]
    frame.put_u16_le(payload.len() as u16);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Iterates the complete records of a log file body.
///
/// Construction validates the file header. Iteration stops at the first
/// record whose frame runs past the end of the data; [`is_truncated`] then
/// reports `true` and [`remainder`] exposes the partial tail.
///
/// [`is_truncated`]: RecordReader::is_truncated
/// [`remainder`]: RecordReader::remainder
#[derive(Debug)]
pub struct RecordReader<'a> {
    rest: &'a [u8],
    truncated: bool,
}

impl<'a> RecordReader<'a> {
    /// A reader over `data`, which must begin with [`LOG_FILE_HEADER`].
    pub fn new(data: &'a [u8]) -> Result<Self, FramingError> {
        let body = data
            .strip_prefix(&LOG_FILE_HEADER[..])
            .ok_or(FramingError::BadHeader)?;
        Ok(Self {
            rest: body,
            truncated: false,
        })
    }

    /// Whether iteration stopped at a partial record.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Bytes not consumed as complete records.
    #[must_use]
    pub fn remainder(&self) -> &'a [u8] {
        self.rest
    }
}

impl<'a> Iterator for RecordReader<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.truncated {
            return None;
        }
        let (prefix, body) = match self.rest {
            [] => return None,
            [a, b, body @ ..] => ([*a, *b], body),
            _ => {
                self.truncated = true;
                return None;
            }
        };
        let len = usize::from(u16::from_le_bytes(prefix));
        if body.len() < len {
            self.truncated = true;
            return None;
        }
        let (record, rest) = body.split_at(len);
        self.rest = rest;
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with(payloads: &[&[u8]]) -> Vec<u8> {
        let mut data = LOG_FILE_HEADER.to_vec();
        for payload in payloads {
            data.extend_from_slice(&encode_record(payload).expect("frame"));
        }
        data
    }

    #[test]
    fn records_round_trip_through_a_file_body() {
        let data = file_with(&[b"first", b"", b"third record"]);
        let mut reader = RecordReader::new(&data).expect("valid header");

        let records: Vec<&[u8]> = (&mut reader).collect();
        assert_eq!(records, vec![&b"first"[..], &b""[..], &b"third record"[..]]);
        assert!(!reader.is_truncated());
        assert!(reader.remainder().is_empty());
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let payload = vec![0u8; MAX_RECORD_LEN + 1];
        assert!(matches!(
            encode_record(&payload),
            Err(FramingError::RecordTooLong { len }) if len == MAX_RECORD_LEN + 1
        ));
        assert!(encode_record(&vec![0u8; MAX_RECORD_LEN]).is_ok());
    }

    #[test]
    fn missing_header_is_rejected() {
        assert!(matches!(
            RecordReader::new(b"not a log file"),
            Err(FramingError::BadHeader)
        ));

        let mut mangled = LOG_FILE_HEADER.to_vec();
        mangled[10] = 0x03;
        assert!(matches!(
            RecordReader::new(&mangled),
            Err(FramingError::BadHeader)
        ));
    }

    #[test]
    fn header_only_file_has_no_records() {
        let mut reader = RecordReader::new(&LOG_FILE_HEADER).expect("valid header");
        assert!(reader.next().is_none());
        assert!(!reader.is_truncated());
    }

    #[test]
    fn torn_tail_is_reported_as_truncation() {
        let mut data = file_with(&[b"intact"]);
        let torn = encode_record(b"lost to power cut").expect("frame");
        data.extend_from_slice(&torn[..torn.len() - 4]);

        let mut reader = RecordReader::new(&data).expect("valid header");
        assert_eq!(reader.next(), Some(&b"intact"[..]));
        assert!(reader.next().is_none());
        assert!(reader.is_truncated());
        assert!(!reader.remainder().is_empty());
    }

    #[test]
    fn lone_length_byte_is_truncation() {
        let mut data = LOG_FILE_HEADER.to_vec();
        data.push(0x05);

        let mut reader = RecordReader::new(&data).expect("valid header");
        assert!(reader.next().is_none());
        assert!(reader.is_truncated());
        assert_eq!(reader.remainder(), &[0x05]);
    }
}

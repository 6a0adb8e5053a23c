//! Raw EXG frame layout.
//!
//! The front-end emits one frame per conversion: three status bytes followed
//! by eight channels of 24-bit big-endian samples. Buffers loaned from the
//! pool are at least [`FRAME_LEN`] bytes; the worker validates the length the
//! bus reports before building an event.

use crate::event::ExgSample;

/// Status bytes leading every frame.
pub const FRAME_STATUS_LEN: usize = 3;
/// Channels per frame.
pub const FRAME_CHANNELS: usize = 8;
/// Bytes per channel word.
pub const FRAME_BYTES_PER_CHANNEL: usize = 3;
/// Total frame length in bytes.
pub const FRAME_LEN: usize = FRAME_STATUS_LEN + FRAME_CHANNELS * FRAME_BYTES_PER_CHANNEL;

/// Sign-extends a 24-bit big-endian channel word to `i32`.
pub fn sign_extend_24(bytes: [u8; 3]) -> i32 {
    let raw =
        (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8) | u32::from(bytes[2]);
    if raw & 0x0080_0000 != 0 {
        (raw | 0xFF00_0000) as i32
    } else {
        raw as i32
    }
}

/// Splits a raw frame into an [`ExgSample`]. Returns `None` unless the slice
/// is exactly one frame long.
pub fn sample_from_frame(frame: &[u8], sequence: u32) -> Option<ExgSample> {
    if frame.len() != FRAME_LEN {
        return None;
    }
    let mut status = [0u8; FRAME_STATUS_LEN];
    status.copy_from_slice(&frame[..FRAME_STATUS_LEN]);

    let mut channels = [[0u8; FRAME_BYTES_PER_CHANNEL]; FRAME_CHANNELS];
    for (index, word) in frame[FRAME_STATUS_LEN..]
        .chunks_exact(FRAME_BYTES_PER_CHANNEL)
        .enumerate()
    {
        channels[index].copy_from_slice(word);
    }

    Some(ExgSample {
        status,
        channels,
        sequence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_extension_handles_both_signs() {
        assert_eq!(sign_extend_24([0x00, 0x00, 0x2A]), 42);
        assert_eq!(sign_extend_24([0xFF, 0xFF, 0xFF]), -1);
        assert_eq!(sign_extend_24([0x80, 0x00, 0x00]), -8_388_608);
        assert_eq!(sign_extend_24([0x7F, 0xFF, 0xFF]), 8_388_607);
    }

    #[test]
    fn frame_parses_status_and_channels() {
        let mut raw = vec![0u8; FRAME_LEN];
        raw[0] = 0xC0;
        // channel 0 = 1, channel 7 = -1
        raw[FRAME_STATUS_LEN + 2] = 0x01;
        let last = FRAME_STATUS_LEN + 7 * FRAME_BYTES_PER_CHANNEL;
        raw[last..last + 3].copy_from_slice(&[0xFF, 0xFF, 0xFF]);

        let sample = sample_from_frame(&raw, 5).expect("frame length is exact");
        assert_eq!(sample.status[0], 0xC0);
        assert_eq!(sample.sequence, 5);
        assert_eq!(sample.channel_value(0), Some(1));
        assert_eq!(sample.channel_value(7), Some(-1));
    }

    #[test]
    fn wrong_length_is_rejected() {
        assert!(sample_from_frame(&[0u8; FRAME_LEN - 1], 0).is_none());
        assert!(sample_from_frame(&[0u8; FRAME_LEN + 1], 0).is_none());
    }
}

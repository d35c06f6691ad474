//! # L16 Decoder
//!
//! Uncompressed 16-bit PCM in network byte order (RFC 3551 §4.5.11).

use crate::error::{ReceiverError, Result};
use crate::traits::AudioDecoder;

/// Linear PCM decoder for the L16 family.
#[derive(Debug, Clone)]
pub struct Pcm16bDecoder {
    sample_rate_hz: u32,
    channels: u16,
}

impl Pcm16bDecoder {
    /// Create a decoder producing `channels` interleaved channels at
    /// `sample_rate_hz`.
    pub fn new(sample_rate_hz: u32, channels: u16) -> Self {
        Self {
            sample_rate_hz,
            channels,
        }
    }
}

impl AudioDecoder for Pcm16bDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>> {
        let frame_bytes = 2 * self.channels.max(1) as usize;
        if payload.len() % frame_bytes != 0 {
            return Err(ReceiverError::MalformedPayload(format!(
                "L16 payload of {} bytes is not a multiple of {}",
                payload.len(),
                frame_bytes
            )));
        }

        Ok(payload
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect())
    }

    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_big_endian_samples() {
        let mut decoder = Pcm16bDecoder::new(16000, 1);
        let samples = decoder.decode(&[0x00, 0x01, 0xff, 0xff, 0x80, 0x00]).unwrap();
        assert_eq!(samples, vec![1, -1, i16::MIN]);
    }

    #[test]
    fn rejects_odd_length() {
        let mut decoder = Pcm16bDecoder::new(8000, 1);
        assert!(matches!(
            decoder.decode(&[0x00, 0x01, 0x02]),
            Err(ReceiverError::MalformedPayload(_))
        ));
    }

    #[test]
    fn rejects_incomplete_stereo_frame() {
        let mut decoder = Pcm16bDecoder::new(32000, 2);
        assert!(decoder.decode(&[0, 1, 0, 2]).is_ok());
        assert!(matches!(
            decoder.decode(&[0, 1, 0, 2, 0, 3]),
            Err(ReceiverError::MalformedPayload(_))
        ));
    }
}

//! # G.711 Decoder
//!
//! µ-law and A-law expansion per ITU-T G.711.

use crate::error::Result;
use crate::traits::AudioDecoder;

/// Companding law of a G.711 stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum G711Law {
    /// µ-law (PCMU)
    MuLaw,
    /// A-law (PCMA)
    ALaw,
}

/// Stateless G.711 decoder. One byte per sample, channels interleaved.
#[derive(Debug, Clone)]
pub struct G711Decoder {
    law: G711Law,
    channels: u16,
}

impl G711Decoder {
    /// Create a decoder for `law` with `channels` interleaved channels.
    pub fn new(law: G711Law, channels: u16) -> Self {
        Self { law, channels }
    }
}

impl AudioDecoder for G711Decoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>> {
        // Trailing bytes of an incomplete stereo pair are ignored, matching
        // what a sample-interleaved depacketizer hands over.
        let usable = payload.len() - payload.len() % self.channels.max(1) as usize;
        let expand = match self.law {
            G711Law::MuLaw => ulaw_to_linear,
            G711Law::ALaw => alaw_to_linear,
        };
        Ok(payload[..usable].iter().map(|&b| expand(b)).collect())
    }

    fn sample_rate_hz(&self) -> u32 {
        8000
    }

    fn channels(&self) -> u16 {
        self.channels
    }
}

const BIAS: i32 = 0x84;

/// Expand one µ-law byte.
pub(crate) fn ulaw_to_linear(byte: u8) -> i16 {
    let u = !byte;
    let exponent = (u >> 4) & 0x07;
    let mantissa = (u & 0x0f) as i32;
    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if u & 0x80 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Expand one A-law byte.
pub(crate) fn alaw_to_linear(byte: u8) -> i16 {
    let a = byte ^ 0x55;
    let segment = (a >> 4) & 0x07;
    let mut magnitude = ((a & 0x0f) as i32) << 4;
    magnitude = match segment {
        0 => magnitude + 8,
        1 => magnitude + 0x108,
        _ => (magnitude + 0x108) << (segment - 1),
    };
    if a & 0x80 != 0 {
        magnitude as i16
    } else {
        -magnitude as i16
    }
}

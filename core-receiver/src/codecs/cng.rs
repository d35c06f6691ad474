//! # Comfort Noise Decoder
//!
//! RFC 3389 comfort noise. The first payload byte carries the noise level
//! in -dBov; the optional reflection coefficients that follow are accepted
//! but the generated noise is spectrally flat.

use crate::error::{ReceiverError, Result};
use crate::traits::AudioDecoder;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Lowest representable noise level (-127 dBov).
const MAX_LEVEL_DBOV: u8 = 127;

/// White-noise generator driven by CN payloads.
#[derive(Debug)]
pub struct ComfortNoiseDecoder {
    sample_rate_hz: u32,
    packet_size: usize,
    level_dbov: Option<u8>,
    rng: StdRng,
}

impl ComfortNoiseDecoder {
    /// Create a decoder generating `packet_size` samples per update at
    /// `sample_rate_hz`.
    pub fn new(sample_rate_hz: u32, packet_size: usize) -> Self {
        Self {
            sample_rate_hz,
            packet_size,
            level_dbov: None,
            rng: StdRng::seed_from_u64(u64::from(sample_rate_hz)),
        }
    }

    /// Noise level of the last accepted update, in -dBov.
    pub fn level_dbov(&self) -> Option<u8> {
        self.level_dbov
    }

    fn generate(&mut self, level_dbov: u8, samples: usize) -> Vec<i16> {
        // Uniform noise on [-a*sqrt(3), a*sqrt(3)] has an RMS of a.
        let rms = f32::from(i16::MAX) * 10f32.powf(-f32::from(level_dbov) / 20.0);
        let peak = (rms * 3f32.sqrt()).min(f32::from(i16::MAX));
        if peak < 1.0 {
            return vec![0; samples];
        }
        (0..samples)
            .map(|_| self.rng.gen_range(-peak..=peak).round() as i16)
            .collect()
    }
}

impl AudioDecoder for ComfortNoiseDecoder {
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>> {
        let level = *payload.first().ok_or_else(|| {
            ReceiverError::MalformedPayload("comfort noise payload is empty".to_string())
        })?;

        if level > MAX_LEVEL_DBOV {
            return Err(ReceiverError::MalformedPayload(format!(
                "comfort noise level {} exceeds {} dBov",
                level, MAX_LEVEL_DBOV
            )));
        }

        self.level_dbov = Some(level);
        Ok(self.generate(level, self.packet_size))
    }

    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    fn channels(&self) -> u16 {
        1
    }

    fn reset(&mut self) {
        self.level_dbov = None;
    }

    /// Keep generating noise at the last signalled level until the next
    /// update arrives.
    fn conceal(&mut self, samples_per_channel: usize) -> Option<Vec<i16>> {
        let level = self.level_dbov?;
        Some(self.generate(level, samples_per_channel))
    }
}

//! # Output Resampler
//!
//! Converts 10 ms frames between sample rates using rubato's FFT resampler.
//!
//! Each (input rate, output rate, channels) triple gets its own resampler
//! instance so filter state carries across consecutive frames. Frames are
//! always 10 ms, which makes every supported rate pair an exact chunk size:
//! one input frame produces one output frame.

use crate::error::{ReceiverError, Result};
use rubato::{FftFixedInOut, Resampler};
use std::collections::HashMap;
use tracing::debug;

/// Stateful converter for one rate pair.
pub struct FrameResampler {
    resampler: FftFixedInOut<f32>,
    channels: usize,
    input: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
    out_frames_per_call: usize,
}

impl FrameResampler {
    /// Create a converter from `from_hz` to `to_hz`.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::Resampler`] if either rate has no whole-sample
    /// 10 ms frame, or if rubato rejects the parameters.
    pub fn new(from_hz: u32, to_hz: u32, channels: u16) -> Result<Self> {
        if from_hz == 0 || to_hz == 0 || from_hz % 100 != 0 || to_hz % 100 != 0 {
            return Err(ReceiverError::Resampler(format!(
                "cannot convert 10 ms frames from {} Hz to {} Hz",
                from_hz, to_hz
            )));
        }
        let channels = channels.max(1) as usize;
        let chunk_in = (from_hz / 100) as usize;

        let resampler =
            FftFixedInOut::<f32>::new(from_hz as usize, to_hz as usize, chunk_in, channels)
                .map_err(|e| ReceiverError::Resampler(e.to_string()))?;

        debug!(
            from_hz,
            to_hz,
            channels,
            chunk_in = resampler.input_frames_next(),
            chunk_out = resampler.output_frames_next(),
            "Created resampler"
        );

        Ok(Self {
            resampler,
            channels,
            input: vec![Vec::new(); channels],
            output: vec![Vec::new(); channels],
            out_frames_per_call: (to_hz / 100) as usize,
        })
    }

    /// Resample one interleaved frame, returning one interleaved 10 ms frame
    /// at the output rate.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::Resampler`] if rubato fails.
    pub fn process(&mut self, interleaved: &[i16]) -> Result<Vec<i16>> {
        for frame in interleaved.chunks_exact(self.channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                self.input[ch].push(f32::from(sample));
            }
        }

        loop {
            let needed = self.resampler.input_frames_next();
            if self.input[0].len() < needed {
                break;
            }

            let chunk: Vec<&[f32]> = self.input.iter().map(|ch| &ch[..needed]).collect();
            let produced = self
                .resampler
                .process(&chunk, None)
                .map_err(|e| ReceiverError::Resampler(e.to_string()))?;

            for (fifo, mut block) in self.output.iter_mut().zip(produced) {
                fifo.append(&mut block);
            }
            for fifo in &mut self.input {
                fifo.drain(..needed);
            }
        }

        let wanted = self.out_frames_per_call;
        let mut out = vec![0i16; wanted * self.channels];

        // Short output only happens before the first chunk completes; pad the
        // front with silence so frame timing stays fixed.
        let have = self.output[0].len().min(wanted);
        let pad = wanted - have;

        for (ch, fifo) in self.output.iter_mut().enumerate() {
            for (i, sample) in fifo.drain(..have).enumerate() {
                out[(pad + i) * self.channels + ch] =
                    sample.round().clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16;
            }
        }

        Ok(out)
    }
}

type ResamplerKey = (u32, u32, u16);

/// Resamplers keyed by rate pair and channel count.
#[derive(Default)]
pub struct ResamplerCache {
    resamplers: HashMap<ResamplerKey, FrameResampler>,
}

impl ResamplerCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert `samples` from `from_hz` to `to_hz`. Equal rates pass
    /// through unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::Resampler`] if a resampler cannot be built
    /// or fails.
    pub fn resample(
        &mut self,
        from_hz: u32,
        to_hz: u32,
        channels: u16,
        samples: &[i16],
    ) -> Result<Vec<i16>> {
        if from_hz == to_hz {
            return Ok(samples.to_vec());
        }

        self.prepare(from_hz, to_hz, channels)?;

        match self.resamplers.get_mut(&(from_hz, to_hz, channels)) {
            Some(resampler) => resampler.process(samples),
            None => Err(ReceiverError::Resampler(format!(
                "no resampler for {} -> {} Hz",
                from_hz, to_hz
            ))),
        }
    }

    /// Build the resampler for a rate pair ahead of use. No-op for equal
    /// rates or an existing entry.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::Resampler`] if rubato rejects the parameters.
    pub fn prepare(&mut self, from_hz: u32, to_hz: u32, channels: u16) -> Result<()> {
        let key = (from_hz, to_hz, channels);
        if from_hz != to_hz && !self.resamplers.contains_key(&key) {
            let resampler = FrameResampler::new(from_hz, to_hz, channels)?;
            self.resamplers.insert(key, resampler);
        }
        Ok(())
    }

    /// Number of live resamplers.
    pub fn len(&self) -> usize {
        self.resamplers.len()
    }

    /// Returns `true` if no resampler has been built.
    pub fn is_empty(&self) -> bool {
        self.resamplers.is_empty()
    }

    /// Drop every resampler.
    pub fn clear(&mut self) {
        self.resamplers.clear();
    }
}

impl std::fmt::Debug for ResamplerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResamplerCache")
            .field("keys", &self.resamplers.keys().collect::<Vec<_>>())
            .finish()
    }
}

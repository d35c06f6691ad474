//! Last-audio-codec tracking.
//!
//! Remembers the most recent codec that produced real speech. Comfort-noise
//! decodes never overwrite it, so the answer survives DTX periods.

use crate::codec::{CodecDescriptor, CodecId};
use crate::error::{ReceiverError, Result};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum LastAudioCodec {
    /// No speech payload has been decoded yet.
    #[default]
    Undefined,
    /// Snapshot of the descriptor of the last speech decode.
    Set(CodecDescriptor),
}

/// Tracks the last non-comfort-noise codec.
#[derive(Debug, Default)]
pub struct LastAudioCodecTracker {
    state: LastAudioCodec,
    comfort_noise_since: u64,
}

impl LastAudioCodecTracker {
    /// Create a tracker in the undefined state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful speech decode.
    pub fn on_speech(&mut self, descriptor: &CodecDescriptor) {
        let changed = match &self.state {
            LastAudioCodec::Set(current) => current != descriptor,
            LastAudioCodec::Undefined => true,
        };
        if changed {
            debug!(
                codec = %descriptor.codec,
                payload_type = descriptor.payload_type,
                "Last audio codec changed"
            );
            self.state = LastAudioCodec::Set(descriptor.clone());
        }
        self.comfort_noise_since = 0;
    }

    /// Record a comfort-noise decode. The tracked codec is untouched.
    pub fn on_comfort_noise(&mut self) {
        self.comfort_noise_since += 1;
    }

    /// Descriptor of the last speech decode.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::NoAudioCodecDecoded`] if no speech has been
    /// decoded yet, even when comfort noise has.
    pub fn last_audio_codec(&self) -> Result<CodecDescriptor> {
        match &self.state {
            LastAudioCodec::Set(descriptor) => Ok(descriptor.clone()),
            LastAudioCodec::Undefined => Err(ReceiverError::NoAudioCodecDecoded),
        }
    }

    /// Identity of the last speech decode, `None` if never set.
    pub fn last_audio_codec_id(&self) -> Option<CodecId> {
        match &self.state {
            LastAudioCodec::Set(descriptor) => Some(descriptor.codec),
            LastAudioCodec::Undefined => None,
        }
    }

    /// Comfort-noise packets decoded since the last speech decode.
    pub fn comfort_noise_since_speech(&self) -> u64 {
        self.comfort_noise_since
    }

}

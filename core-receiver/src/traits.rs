//! # Core Receiver Traits
//!
//! Data types crossing the receiver boundary and the capability traits the
//! receiver consumes from its collaborators.
//!
//! ## Architecture
//!
//! The receiver sits between two execution contexts:
//!
//! - **Packet arrival**: the session layer depacketizes RTP and hands an
//!   [`IncomingPacket`] to `AudioReceiver::insert_packet`.
//! - **Playout**: the audio device pulls one 10 ms [`AudioFrame`] at a time
//!   through `AudioReceiver::get_audio`.
//!
//! Codec algorithms and the voice-activity heuristic are opaque
//! capabilities, expressed as the [`AudioDecoder`], [`DecoderFactory`] and
//! [`VadClassifier`] traits. All of them are synchronous: no receiver
//! operation suspends.
//!
//! ## Usage Example
//!
//! ```rust
//! use bytes::Bytes;
//! use core_receiver::{FrameType, IncomingPacket, RtpHeader};
//!
//! let packet = IncomingPacket::new(
//!     RtpHeader::new(0, 1, 160),
//!     FrameType::Speech,
//!     Bytes::from_static(&[0xff; 160]),
//! );
//! assert!(!packet.is_empty());
//! ```

use crate::codec::CodecDescriptor;
use crate::error::Result;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

// ============================================================================
// Incoming Packets
// ============================================================================

/// Frame classification hint supplied by the packet source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    /// Packet carries encoded speech.
    Speech,
    /// Packet carries a comfort-noise update (DTX).
    ComfortNoise,
    /// Nothing to decode.
    Empty,
}

/// RTP header fields the receiver cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RtpHeader {
    /// Payload type (0-127)
    pub payload_type: u8,
    /// 16-bit sequence number
    pub sequence_number: u16,
    /// 32-bit media timestamp
    pub timestamp: u32,
    /// Synchronisation source
    pub ssrc: u32,
    /// Marker bit
    pub marker: bool,
}

impl RtpHeader {
    /// Create a header with zero SSRC and marker unset.
    pub fn new(payload_type: u8, sequence_number: u16, timestamp: u32) -> Self {
        Self {
            payload_type,
            sequence_number,
            timestamp,
            ssrc: 0,
            marker: false,
        }
    }

    /// Set the synchronisation source.
    pub fn with_ssrc(mut self, ssrc: u32) -> Self {
        self.ssrc = ssrc;
        self
    }

    /// Set the marker bit.
    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }
}

/// A depacketized audio packet handed to the receiver.
///
/// The receiver only reads the packet for the duration of one insertion.
#[derive(Debug, Clone)]
pub struct IncomingPacket {
    /// RTP header fields
    pub header: RtpHeader,
    /// Classification hint from the packet source
    pub frame_type: FrameType,
    /// Raw payload bytes (codec specific)
    pub payload: Bytes,
}

impl IncomingPacket {
    /// Create a new packet.
    pub fn new(header: RtpHeader, frame_type: FrameType, payload: Bytes) -> Self {
        Self {
            header,
            frame_type,
            payload,
        }
    }

    /// Returns `true` if there is nothing to decode.
    pub fn is_empty(&self) -> bool {
        self.frame_type == FrameType::Empty || self.payload.is_empty()
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }
}

// ============================================================================
// Output Frames
// ============================================================================

/// Voice-activity classification attached to each output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VadActivity {
    /// Frame contains active speech.
    Active,
    /// Frame contains silence or background noise.
    Passive,
    /// Post-decode VAD disabled, or nothing classified yet.
    Unknown,
}

/// Which decode path produced an output frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechType {
    /// Decoded from a speech payload.
    Normal,
    /// Synthesised by a comfort-noise decoder.
    ComfortNoise,
    /// Produced by the decoder's concealment on underrun.
    Concealment,
}

/// One fixed-duration (10 ms) block of decoded audio.
///
/// Samples are interleaved 16-bit PCM (LRLR... for stereo).
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Interleaved PCM samples
    pub samples: Vec<i16>,
    /// Sample rate of `samples` in Hz
    pub sample_rate_hz: u32,
    /// Number of interleaved channels
    pub num_channels: u16,
    /// Samples per channel (`samples.len() / num_channels`)
    pub samples_per_channel: usize,
    /// RTP timestamp of the first sample, in the codec clock
    pub timestamp: u32,
    /// Decode path that produced the frame
    pub speech_type: SpeechType,
    /// Voice-activity classification
    pub vad_activity: VadActivity,
}

impl AudioFrame {
    /// Duration of one output frame in milliseconds.
    pub const DURATION_MS: u32 = 10;

    /// Returns `true` if all samples are zero.
    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|&s| s == 0)
    }

    /// Returns the samples of one channel.
    pub fn channel(&self, index: u16) -> Vec<i16> {
        self.samples
            .iter()
            .skip(index as usize)
            .step_by(self.num_channels.max(1) as usize)
            .copied()
            .collect()
    }
}

// ============================================================================
// Telephone Events
// ============================================================================

/// A DTMF event carried by a telephone-event payload (RFC 4733).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TelephoneEvent {
    /// Event code (0-9, *, #, A-D are 0-15)
    pub event: u8,
    /// End-of-event flag
    pub end: bool,
    /// Volume in -dBm0
    pub volume: u8,
    /// Duration in timestamp units
    pub duration: u16,
}

// ============================================================================
// Capability Traits
// ============================================================================

/// A codec decoder bound to one registry entry.
///
/// Decoding is synchronous and bounded. Implementations keep whatever
/// internal state their codec needs between packets.
pub trait AudioDecoder: Send {
    /// Decode one payload into interleaved 16-bit samples at the decoder's
    /// native rate.
    ///
    /// # Errors
    ///
    /// Returns `ReceiverError::MalformedPayload` if the bytes cannot be
    /// decoded. The decoder must not have emitted partial output.
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>>;

    /// Native output sample rate in Hz.
    fn sample_rate_hz(&self) -> u32;

    /// Number of interleaved output channels.
    fn channels(&self) -> u16;

    /// Reset codec state (called when buffers are flushed).
    fn reset(&mut self) {}

    /// Produce `samples_per_channel` samples of concealment audio when the
    /// receiver runs dry. Decoders without a concealment algorithm return
    /// `None`.
    fn conceal(&mut self, _samples_per_channel: usize) -> Option<Vec<i16>> {
        None
    }
}

/// Creates decoders for registered codecs.
pub trait DecoderFactory: Send + Sync {
    /// Instantiate a decoder for `descriptor`.
    ///
    /// # Errors
    ///
    /// Returns `ReceiverError::UnknownCodecIdentity` if this factory cannot
    /// provide the codec.
    fn create(&self, descriptor: &CodecDescriptor) -> Result<Box<dyn AudioDecoder>>;
}

/// Voice-activity decision for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceActivity {
    /// Speech present.
    Active,
    /// No speech present.
    Passive,
}

impl From<VoiceActivity> for VadActivity {
    fn from(value: VoiceActivity) -> Self {
        match value {
            VoiceActivity::Active => VadActivity::Active,
            VoiceActivity::Passive => VadActivity::Passive,
        }
    }
}

/// Classifies decoded frames as active or passive speech.
pub trait VadClassifier: Send {
    /// Classify one frame of interleaved samples.
    fn classify(&mut self, samples: &[i16], sample_rate_hz: u32, channels: u16) -> VoiceActivity;

    /// Forget any hangover state.
    fn reset(&mut self) {}
}

// ============================================================================
// Tests
// ============================================================================

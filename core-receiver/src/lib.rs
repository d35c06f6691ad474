//! # Audio Receiver Module
//!
//! Receive-side audio decoding for real-time communication.
//!
//! ## Overview
//!
//! This module handles:
//! - Payload type → decoder bindings with last-write-wins re-registration
//! - Per-packet decode dispatch, including RED unwrapping and telephone events
//! - Fixed 10 ms output frames at a caller-chosen rate (rubato resampling)
//! - Tracking of the last speech codec across comfort-noise periods
//! - Optional post-decode voice activity classification
//! - Built-in G.711, L16 and comfort-noise decoders (feature-gated)

pub mod buffer;
pub mod codec;
pub mod codecs;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod receiver;
pub mod registry;
pub mod resampler;
pub mod tracker;
pub mod traits;
pub mod vad;

pub use codec::{CodecDatabase, CodecDescriptor, CodecId, CodecInfo, CodecKind};
pub use codecs::BuiltinDecoderFactory;
pub use config::{ReceiverConfig, ReceiverStats, SUPPORTED_OUTPUT_RATES_HZ};
pub use error::{ReceiverError, Result};
pub use receiver::AudioReceiver;
pub use traits::{
    AudioDecoder, AudioFrame, DecoderFactory, FrameType, IncomingPacket, RtpHeader, SpeechType,
    TelephoneEvent, VadActivity, VadClassifier, VoiceActivity,
};
pub use vad::{EnergyVad, VadSettings};

//! # Receiver Error Types
//!
//! Error types for codec registration, packet insertion and audio pulls.

use thiserror::Error;

/// Errors that can occur while operating the audio receiver.
///
/// Every error is reported at the call that triggered it. None of them
/// poisons the receiver: a failed operation leaves prior state unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiverError {
    // ========================================================================
    // Codec Registration Errors
    // ========================================================================
    /// Codec identity is not known to the codec database or cannot be
    /// instantiated by the decoder factory.
    #[error("Unknown codec identity: {0}")]
    UnknownCodecIdentity(String),

    /// Parameters are inconsistent with the codec family (channel count,
    /// sample rate, payload type range).
    #[error("Invalid codec parameters: {0}")]
    InvalidCodecParameters(String),

    /// No decoder is registered for the payload type.
    #[error("No decoder registered for payload type {0}")]
    DecoderNotFound(u8),

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// Payload bytes could not be decoded.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// A frame was requested before enough samples were decoded.
    #[error("Insufficient buffered audio: {available} of {required} samples")]
    InsufficientBufferedAudio {
        /// Samples currently buffered (all channels).
        available: usize,
        /// Samples needed for one output frame (all channels).
        required: usize,
    },

    /// No speech payload has been decoded since the receiver was created.
    #[error("No audio codec has been decoded yet")]
    NoAudioCodecDecoded,

    // ========================================================================
    // Output Errors
    // ========================================================================
    /// Requested output sample rate is not supported.
    #[error("Unsupported output sample rate: {0} Hz")]
    UnsupportedSampleRate(u32),

    /// Rate converter could not be built or failed to process a frame.
    #[error("Resampler error: {0}")]
    Resampler(String),

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Receiver configuration failed validation.
    #[error("Invalid receiver configuration: {0}")]
    InvalidConfig(String),
}

impl ReceiverError {
    /// Returns `true` if retrying the same call later may succeed without
    /// any other intervention (more packets arriving).
    pub fn is_transient(&self) -> bool {
        matches!(self, ReceiverError::InsufficientBufferedAudio { .. })
    }

    /// Returns `true` if this error is about codec identity or parameters.
    pub fn is_codec_error(&self) -> bool {
        matches!(
            self,
            ReceiverError::UnknownCodecIdentity(_)
                | ReceiverError::InvalidCodecParameters(_)
                | ReceiverError::DecoderNotFound(_)
        )
    }
}

/// Result type for receiver operations.
pub type Result<T> = std::result::Result<T, ReceiverError>;

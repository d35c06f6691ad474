//! # Codec Identities & Database
//!
//! Static knowledge about every codec the receiver recognises and the
//! immutable [`CodecDescriptor`] describing one registered codec instance.
//!
//! The payload type is the external correlation key. The codec identity and
//! the remaining descriptor fields are internal: the same identity may be
//! registered under several payload types, and one payload type may be
//! rebound to a different identity at any time.

use crate::error::{ReceiverError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest valid RTP payload type.
pub const MAX_PAYLOAD_TYPE: u8 = 127;

// ============================================================================
// Codec Identity
// ============================================================================

/// Codec identities known to the receiver.
///
/// The declaration order defines the numeric index used by
/// [`CodecId::from_index`] / [`CodecId::index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodecId {
    /// iSAC wideband (16 kHz)
    Isac,
    /// iSAC super-wideband (32 kHz)
    IsacSwb,
    /// Linear 16-bit PCM, 8 kHz
    Pcm16b,
    /// Linear 16-bit PCM, 16 kHz
    Pcm16bWb,
    /// Linear 16-bit PCM, 32 kHz
    Pcm16bSwb32,
    /// Linear 16-bit PCM, 48 kHz
    Pcm16bSwb48,
    /// G.711 µ-law
    Pcmu,
    /// G.711 A-law
    Pcma,
    /// Internet Low Bitrate Codec
    Ilbc,
    /// G.722 (16 kHz audio, 8 kHz RTP clock)
    G722,
    /// Opus
    Opus,
    /// Comfort noise, narrowband
    CnNb,
    /// Comfort noise, wideband
    CnWb,
    /// Comfort noise, super-wideband
    CnSwb,
    /// Comfort noise, fullband
    CnFb,
    /// DTMF digits (RFC 4733)
    TelephoneEvent,
    /// Redundant audio (RFC 2198)
    Red,
}

impl CodecId {
    /// Every known identity, in index order.
    pub const ALL: [CodecId; 17] = [
        CodecId::Isac,
        CodecId::IsacSwb,
        CodecId::Pcm16b,
        CodecId::Pcm16bWb,
        CodecId::Pcm16bSwb32,
        CodecId::Pcm16bSwb48,
        CodecId::Pcmu,
        CodecId::Pcma,
        CodecId::Ilbc,
        CodecId::G722,
        CodecId::Opus,
        CodecId::CnNb,
        CodecId::CnWb,
        CodecId::CnSwb,
        CodecId::CnFb,
        CodecId::TelephoneEvent,
        CodecId::Red,
    ];

    /// Resolve a numeric codec index.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::UnknownCodecIdentity`] when the index is
    /// outside the table.
    pub fn from_index(index: i32) -> Result<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| ReceiverError::UnknownCodecIdentity(format!("index {}", index)))
    }

    /// Numeric index of this identity.
    pub fn index(self) -> i32 {
        // ALL holds every variant exactly once.
        Self::ALL.iter().position(|&c| c == self).unwrap_or_default() as i32
    }

    /// What kind of payload this codec carries.
    pub fn kind(self) -> CodecKind {
        match self {
            CodecId::CnNb | CodecId::CnWb | CodecId::CnSwb | CodecId::CnFb => {
                CodecKind::ComfortNoise
            }
            CodecId::TelephoneEvent => CodecKind::TelephoneEvent,
            CodecId::Red => CodecKind::Redundancy,
            _ => CodecKind::Audio,
        }
    }

    /// Returns `true` for comfort-noise generators.
    pub fn is_comfort_noise(self) -> bool {
        self.kind() == CodecKind::ComfortNoise
    }

    /// Static database entry for this identity.
    pub fn info(self) -> &'static CodecInfo {
        // CODEC_TABLE is indexed like ALL.
        &CODEC_TABLE[self.index() as usize]
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info();
        write!(f, "{}/{}", info.name, info.sample_rate_hz)
    }
}

/// Payload categories handled by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    /// Speech codec producing real audio.
    Audio,
    /// Comfort-noise generator used during DTX.
    ComfortNoise,
    /// RED container wrapping other payloads.
    Redundancy,
    /// Out-of-band DTMF events.
    TelephoneEvent,
}

// ============================================================================
// Codec Database
// ============================================================================

/// Static properties of a codec identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecInfo {
    /// Identity this entry describes
    pub id: CodecId,
    /// SDP encoding name
    pub name: &'static str,
    /// Payload type used when none is negotiated
    pub default_payload_type: u8,
    /// Native decoded sample rate in Hz
    pub sample_rate_hz: u32,
    /// RTP timestamp clock rate in Hz
    pub clock_rate_hz: u32,
    /// Samples per channel in one packet at the default packetization
    pub packet_size: usize,
    /// Channel counts this family can be registered with
    pub channels: &'static [u16],
}

const MONO: &[u16] = &[1];
const MONO_OR_STEREO: &[u16] = &[1, 2];

const fn entry(
    id: CodecId,
    name: &'static str,
    default_payload_type: u8,
    sample_rate_hz: u32,
    clock_rate_hz: u32,
    packet_size: usize,
    channels: &'static [u16],
) -> CodecInfo {
    CodecInfo {
        id,
        name,
        default_payload_type,
        sample_rate_hz,
        clock_rate_hz,
        packet_size,
        channels,
    }
}

static CODEC_TABLE: [CodecInfo; 17] = [
    entry(CodecId::Isac, "ISAC", 103, 16000, 16000, 480, MONO),
    entry(CodecId::IsacSwb, "ISAC", 104, 32000, 32000, 960, MONO),
    entry(CodecId::Pcm16b, "L16", 107, 8000, 8000, 80, MONO_OR_STEREO),
    entry(CodecId::Pcm16bWb, "L16", 108, 16000, 16000, 160, MONO_OR_STEREO),
    entry(CodecId::Pcm16bSwb32, "L16", 109, 32000, 32000, 320, MONO_OR_STEREO),
    entry(CodecId::Pcm16bSwb48, "L16", 110, 48000, 48000, 480, MONO_OR_STEREO),
    entry(CodecId::Pcmu, "PCMU", 0, 8000, 8000, 160, MONO_OR_STEREO),
    entry(CodecId::Pcma, "PCMA", 8, 8000, 8000, 160, MONO_OR_STEREO),
    entry(CodecId::Ilbc, "ILBC", 102, 8000, 8000, 240, MONO),
    entry(CodecId::G722, "G722", 9, 16000, 8000, 320, MONO_OR_STEREO),
    entry(CodecId::Opus, "opus", 120, 48000, 48000, 960, MONO_OR_STEREO),
    entry(CodecId::CnNb, "CN", 13, 8000, 8000, 240, MONO),
    entry(CodecId::CnWb, "CN", 98, 16000, 16000, 480, MONO),
    entry(CodecId::CnSwb, "CN", 99, 32000, 32000, 960, MONO),
    entry(CodecId::CnFb, "CN", 100, 48000, 48000, 1440, MONO),
    entry(CodecId::TelephoneEvent, "telephone-event", 106, 8000, 8000, 240, MONO),
    entry(CodecId::Red, "red", 127, 8000, 8000, 0, MONO),
];

/// Lookup and validation over the static codec table.
pub struct CodecDatabase;

impl CodecDatabase {
    /// All known codec entries.
    pub fn entries() -> &'static [CodecInfo] {
        &CODEC_TABLE
    }

    /// Find a codec identity by SDP name, sample rate and channel count.
    ///
    /// Name comparison is case-insensitive, as in SDP.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::UnknownCodecIdentity`] if no entry matches.
    pub fn find(name: &str, sample_rate_hz: u32, channels: u16) -> Result<CodecId> {
        CODEC_TABLE
            .iter()
            .find(|info| {
                info.name.eq_ignore_ascii_case(name)
                    && info.sample_rate_hz == sample_rate_hz
                    && info.channels.contains(&channels)
            })
            .map(|info| info.id)
            .ok_or_else(|| {
                ReceiverError::UnknownCodecIdentity(format!(
                    "{}/{}/{}",
                    name, sample_rate_hz, channels
                ))
            })
    }

    /// Build a validated descriptor for a registration request.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::InvalidCodecParameters`] if the payload type
    /// is out of range, or the channel count or sample rate does not fit
    /// the codec family.
    pub fn descriptor(
        codec: CodecId,
        payload_type: u8,
        channels: u16,
        sample_rate_hz: u32,
    ) -> Result<CodecDescriptor> {
        let info = codec.info();

        if payload_type > MAX_PAYLOAD_TYPE {
            return Err(ReceiverError::InvalidCodecParameters(format!(
                "payload type {} exceeds {}",
                payload_type, MAX_PAYLOAD_TYPE
            )));
        }

        if !info.channels.contains(&channels) {
            return Err(ReceiverError::InvalidCodecParameters(format!(
                "{} does not support {} channel(s)",
                codec, channels
            )));
        }

        if info.sample_rate_hz != sample_rate_hz {
            return Err(ReceiverError::InvalidCodecParameters(format!(
                "{} runs at {} Hz, got {} Hz",
                codec, info.sample_rate_hz, sample_rate_hz
            )));
        }

        Ok(CodecDescriptor {
            codec,
            payload_type,
            channels,
            sample_rate_hz,
            clock_rate_hz: info.clock_rate_hz,
            packet_size: info.packet_size,
        })
    }

    /// Descriptor for a codec at its default payload type, mono.
    pub fn default_descriptor(codec: CodecId) -> CodecDescriptor {
        let info = codec.info();
        CodecDescriptor {
            codec,
            payload_type: info.default_payload_type,
            channels: info.channels[0],
            sample_rate_hz: info.sample_rate_hz,
            clock_rate_hz: info.clock_rate_hz,
            packet_size: info.packet_size,
        }
    }
}

// ============================================================================
// Codec Descriptor
// ============================================================================

/// Immutable description of one registered codec instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodecDescriptor {
    /// Codec identity
    pub codec: CodecId,
    /// RTP payload type (0-127) this instance is bound to
    pub payload_type: u8,
    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,
    /// Native decoded sample rate in Hz
    pub sample_rate_hz: u32,
    /// RTP timestamp clock rate in Hz
    pub clock_rate_hz: u32,
    /// Packetization size in samples per channel
    pub packet_size: usize,
}

impl CodecDescriptor {
    /// Number of 10 ms frames one packet of this codec decodes into.
    pub fn frames_per_packet(&self) -> usize {
        let per_frame = (self.sample_rate_hz / 100) as usize;
        if per_frame == 0 {
            return 0;
        }
        self.packet_size / per_frame
    }

    /// Same codec instance, ignoring packetization details.
    pub fn same_binding(&self, other: &CodecDescriptor) -> bool {
        self.codec == other.codec
            && self.payload_type == other.payload_type
            && self.channels == other.channels
            && self.sample_rate_hz == other.sample_rate_hz
    }
}

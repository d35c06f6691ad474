//! # Built-in Decoders
//!
//! Pure-Rust decoders for the payload formats simple enough to ship with the
//! receiver, and the [`BuiltinDecoderFactory`] that hands them out.
//!
//! ## Supported Formats
//!
//! | Codec | Payload | Feature Flag | Channels |
//! |-------|---------|--------------|----------|
//! | PCMU | G.711 µ-law | `decoder-g711` | 1, 2 |
//! | PCMA | G.711 A-law | `decoder-g711` | 1, 2 |
//! | L16 | Big-endian linear PCM (8/16/32/48 kHz) | `decoder-l16` | 1, 2 |
//! | CN | RFC 3389 comfort noise (8/16/32/48 kHz) | `decoder-cng` | 1 |
//!
//! iSAC, iLBC, G.722 and Opus are known to the codec database but carry no
//! built-in decoder. Register them with an external [`AudioDecoder`]:
//!
//! ```rust,ignore
//! receiver.add_codec(CodecId::Opus, 111, 2, 48000, Some(Box::new(my_opus)))?;
//! ```

#[cfg(feature = "decoder-cng")]
mod cng;

#[cfg(feature = "decoder-g711")]
mod g711;

#[cfg(feature = "decoder-l16")]
mod pcm16b;

#[cfg(feature = "decoder-cng")]
pub use cng::ComfortNoiseDecoder;

#[cfg(feature = "decoder-g711")]
pub use g711::{G711Decoder, G711Law};

#[cfg(feature = "decoder-l16")]
pub use pcm16b::Pcm16bDecoder;

use crate::codec::{CodecDescriptor, CodecId};
use crate::error::{ReceiverError, Result};
use crate::traits::{AudioDecoder, DecoderFactory};
use tracing::debug;

/// Factory for the decoders compiled into this crate.
#[derive(Debug, Default, Clone)]
pub struct BuiltinDecoderFactory;

impl BuiltinDecoderFactory {
    /// Create the factory.
    pub fn new() -> Self {
        Self
    }

    /// Returns `true` if a built-in decoder exists for `codec`.
    pub fn supports(codec: CodecId) -> bool {
        match codec {
            #[cfg(feature = "decoder-g711")]
            CodecId::Pcmu | CodecId::Pcma => true,
            #[cfg(feature = "decoder-l16")]
            CodecId::Pcm16b | CodecId::Pcm16bWb | CodecId::Pcm16bSwb32 | CodecId::Pcm16bSwb48 => {
                true
            }
            #[cfg(feature = "decoder-cng")]
            CodecId::CnNb | CodecId::CnWb | CodecId::CnSwb | CodecId::CnFb => true,
            _ => false,
        }
    }
}

impl DecoderFactory for BuiltinDecoderFactory {
    fn create(&self, descriptor: &CodecDescriptor) -> Result<Box<dyn AudioDecoder>> {
        debug!(
            codec = %descriptor.codec,
            payload_type = descriptor.payload_type,
            "Creating built-in decoder"
        );

        match descriptor.codec {
            #[cfg(feature = "decoder-g711")]
            CodecId::Pcmu => Ok(Box::new(G711Decoder::new(G711Law::MuLaw, descriptor.channels))),
            #[cfg(feature = "decoder-g711")]
            CodecId::Pcma => Ok(Box::new(G711Decoder::new(G711Law::ALaw, descriptor.channels))),
            #[cfg(feature = "decoder-l16")]
            CodecId::Pcm16b | CodecId::Pcm16bWb | CodecId::Pcm16bSwb32 | CodecId::Pcm16bSwb48 => {
                Ok(Box::new(Pcm16bDecoder::new(
                    descriptor.sample_rate_hz,
                    descriptor.channels,
                )))
            }
            #[cfg(feature = "decoder-cng")]
            CodecId::CnNb | CodecId::CnWb | CodecId::CnSwb | CodecId::CnFb => Ok(Box::new(
                ComfortNoiseDecoder::new(descriptor.sample_rate_hz, descriptor.packet_size),
            )),
            other => Err(ReceiverError::UnknownCodecIdentity(format!(
                "no built-in decoder for {}",
                other
            ))),
        }
    }
}

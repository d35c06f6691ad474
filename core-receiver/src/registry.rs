//! # Decoder Registry
//!
//! Maps payload types to active decoder instances.
//!
//! The registry is keyed purely by payload type. Registering a codec under a
//! payload type that is already bound replaces the previous entry, whatever
//! its codec identity was (last write wins). Removing an unbound payload type
//! is a no-op.

use crate::codec::{CodecDescriptor, CodecKind};
use crate::error::{ReceiverError, Result};
use crate::traits::{AudioDecoder, DecoderFactory};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// What a registry entry dispatches to.
pub enum DecoderSlot {
    /// Audio decoder (speech or comfort noise).
    Audio(Box<dyn AudioDecoder>),
    /// RED container; the dispatcher unwraps it.
    Redundancy,
    /// DTMF events; parsed, never decoded to audio.
    TelephoneEvent,
}

impl fmt::Debug for DecoderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecoderSlot::Audio(decoder) => f
                .debug_struct("Audio")
                .field("sample_rate_hz", &decoder.sample_rate_hz())
                .field("channels", &decoder.channels())
                .finish(),
            DecoderSlot::Redundancy => f.write_str("Redundancy"),
            DecoderSlot::TelephoneEvent => f.write_str("TelephoneEvent"),
        }
    }
}

/// One payload type binding.
#[derive(Debug)]
pub struct RegistryEntry {
    /// Descriptor the binding was registered with
    pub descriptor: CodecDescriptor,
    /// Decoder the binding dispatches to
    pub slot: DecoderSlot,
}

/// Payload type → decoder mapping.
#[derive(Debug, Default)]
pub struct DecoderRegistry {
    entries: HashMap<u8, RegistryEntry>,
}

impl DecoderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `descriptor.payload_type` to a decoder.
    ///
    /// With `decoder == None` the decoder comes from `factory`. Re-adding a
    /// binding identical to the current one keeps the existing decoder so its
    /// state survives re-negotiation. The registry is untouched on error.
    ///
    /// # Errors
    ///
    /// - [`ReceiverError::UnknownCodecIdentity`] if the factory cannot build
    ///   the codec
    /// - [`ReceiverError::InvalidCodecParameters`] if an external decoder's
    ///   format disagrees with the descriptor
    pub fn add_codec(
        &mut self,
        descriptor: CodecDescriptor,
        decoder: Option<Box<dyn AudioDecoder>>,
        factory: &dyn DecoderFactory,
    ) -> Result<()> {
        let payload_type = descriptor.payload_type;

        if decoder.is_none() {
            if let Some(existing) = self.entries.get(&payload_type) {
                if existing.descriptor.same_binding(&descriptor) {
                    debug!(payload_type, codec = %descriptor.codec, "Codec already registered");
                    return Ok(());
                }
            }
        }

        let slot = Self::build_slot(&descriptor, decoder, factory)?;
        let replaced = self.insert(RegistryEntry { descriptor, slot });

        match replaced {
            Some(previous) => info!(
                payload_type,
                codec = %self.entries[&payload_type].descriptor.codec,
                previous = %previous.codec,
                "Replaced decoder binding"
            ),
            None => info!(
                payload_type,
                codec = %self.entries[&payload_type].descriptor.codec,
                frames_per_packet = self.entries[&payload_type].descriptor.frames_per_packet(),
                "Registered decoder"
            ),
        }

        Ok(())
    }

    fn build_slot(
        descriptor: &CodecDescriptor,
        decoder: Option<Box<dyn AudioDecoder>>,
        factory: &dyn DecoderFactory,
    ) -> Result<DecoderSlot> {
        match descriptor.codec.kind() {
            CodecKind::Redundancy => return Ok(DecoderSlot::Redundancy),
            CodecKind::TelephoneEvent => return Ok(DecoderSlot::TelephoneEvent),
            CodecKind::Audio | CodecKind::ComfortNoise => {}
        }

        let decoder = match decoder {
            Some(decoder) => decoder,
            None => factory.create(descriptor)?,
        };

        if decoder.sample_rate_hz() != descriptor.sample_rate_hz
            || decoder.channels() != descriptor.channels
        {
            return Err(ReceiverError::InvalidCodecParameters(format!(
                "decoder produces {} Hz/{} ch, {} expects {} Hz/{} ch",
                decoder.sample_rate_hz(),
                decoder.channels(),
                descriptor.codec,
                descriptor.sample_rate_hz,
                descriptor.channels
            )));
        }

        Ok(DecoderSlot::Audio(decoder))
    }

    /// Insert an entry, returning the descriptor it displaced.
    fn insert(&mut self, entry: RegistryEntry) -> Option<CodecDescriptor> {
        self.entries
            .insert(entry.descriptor.payload_type, entry)
            .map(|previous| previous.descriptor)
    }

    /// Unbind a payload type. Unbound payload types are ignored.
    pub fn remove(&mut self, payload_type: u8) -> Option<CodecDescriptor> {
        let removed = self.entries.remove(&payload_type).map(|e| e.descriptor);
        match &removed {
            Some(descriptor) => info!(payload_type, codec = %descriptor.codec, "Removed decoder"),
            None => debug!(payload_type, "Remove of unregistered payload type ignored"),
        }
        removed
    }

    /// Descriptor bound to `payload_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::DecoderNotFound`] if nothing is bound.
    pub fn lookup(&self, payload_type: u8) -> Result<&CodecDescriptor> {
        self.entries
            .get(&payload_type)
            .map(|entry| &entry.descriptor)
            .ok_or(ReceiverError::DecoderNotFound(payload_type))
    }

    /// Mutable access to the entry bound to `payload_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::DecoderNotFound`] if nothing is bound.
    pub fn entry_mut(&mut self, payload_type: u8) -> Result<&mut RegistryEntry> {
        self.entries
            .get_mut(&payload_type)
            .ok_or(ReceiverError::DecoderNotFound(payload_type))
    }

    /// All current bindings, ordered by payload type.
    pub fn descriptors(&self) -> Vec<CodecDescriptor> {
        let mut descriptors: Vec<_> = self.entries.values().map(|e| e.descriptor.clone()).collect();
        descriptors.sort_by_key(|d| d.payload_type);
        descriptors
    }

    /// Reset every audio decoder.
    pub fn reset_decoders(&mut self) {
        for entry in self.entries.values_mut() {
            if let DecoderSlot::Audio(decoder) = &mut entry.slot {
                decoder.reset();
            }
        }
    }

    /// Drop every binding.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

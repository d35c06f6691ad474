//! # Decode Dispatcher
//!
//! Routes one incoming packet to the decoder bound to its payload type.
//!
//! ## Per-packet state machine
//!
//! 1. Empty packets short-circuit: no decode, no state change.
//! 2. The payload type is resolved through the [`DecoderRegistry`].
//! 3. RED containers are unwrapped to their primary block; telephone events
//!    are parsed and stop here.
//! 4. The payload is decoded and appended to the [`DecodedAudioBuffer`].
//! 5. The codec family decides speech vs. comfort noise. Only speech updates
//!    the [`LastAudioCodecTracker`].
//!
//! A failing packet leaves the buffer, tracker and continuity state as they
//! were.

use crate::buffer::{DecodedAudioBuffer, SpanFormat};
use crate::codec::{CodecDescriptor, CodecKind};
use crate::config::ReceiverStats;
use crate::error::{ReceiverError, Result};
use crate::registry::{DecoderRegistry, DecoderSlot};
use crate::tracker::LastAudioCodecTracker;
use crate::traits::{FrameType, IncomingPacket, RtpHeader, SpeechType, TelephoneEvent};
use core_runtime::logging::payload_preview;
use tracing::{debug, trace, warn};

/// What a dispatched packet turned into.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Empty packet; nothing happened.
    Skipped,
    /// Audio was decoded and buffered.
    Decoded {
        /// Descriptor of the decoder that ran
        descriptor: CodecDescriptor,
        /// Interleaved samples appended to the buffer
        samples: usize,
        /// Speech or comfort noise
        speech_type: SpeechType,
    },
    /// A telephone event was parsed.
    TelephoneEvent(TelephoneEvent),
}

/// Mutable receiver state a dispatch touches.
pub struct DispatchTargets<'a> {
    /// Payload type bindings
    pub registry: &'a mut DecoderRegistry,
    /// Decoded audio awaiting playout
    pub buffer: &'a mut DecodedAudioBuffer,
    /// Last speech codec
    pub tracker: &'a mut LastAudioCodecTracker,
    /// Counters
    pub stats: &'a mut ReceiverStats,
}

/// Sequence/timestamp continuity tracking. Discontinuities are counted and
/// tolerated.
#[derive(Debug, Default, Clone, Copy)]
struct Continuity {
    last: Option<(u16, u32)>,
}

impl Continuity {
    fn is_discontinuous(&self, header: &RtpHeader) -> bool {
        let Some((seq, ts)) = self.last else {
            return false;
        };
        let seq_gap = header.sequence_number != seq.wrapping_add(1);
        let ts_backwards = (header.timestamp.wrapping_sub(ts) as i32) < 0;
        seq_gap || ts_backwards
    }

    fn record(&mut self, header: &RtpHeader) {
        self.last = Some((header.sequence_number, header.timestamp));
    }
}

/// Stateful packet router.
#[derive(Debug, Default)]
pub struct DecodeDispatcher {
    continuity: Continuity,
    last_decoded: Option<CodecDescriptor>,
    last_telephone_event: Option<TelephoneEvent>,
}

impl DecodeDispatcher {
    /// Create a dispatcher with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor of the last audio decode, speech or comfort noise.
    pub fn last_decoded(&self) -> Option<&CodecDescriptor> {
        self.last_decoded.as_ref()
    }

    /// Most recent telephone event.
    pub fn last_telephone_event(&self) -> Option<TelephoneEvent> {
        self.last_telephone_event
    }

    /// Route one packet.
    ///
    /// # Errors
    ///
    /// - [`ReceiverError::DecoderNotFound`] if the payload type (or a RED
    ///   primary payload type) is not registered
    /// - [`ReceiverError::MalformedPayload`] if a container or decoder
    ///   rejects the bytes
    pub fn dispatch(
        &mut self,
        packet: &IncomingPacket,
        targets: DispatchTargets<'_>,
    ) -> Result<DispatchOutcome> {
        let DispatchTargets {
            registry,
            buffer,
            tracker,
            stats,
        } = targets;

        stats.packets_inserted += 1;

        if packet.is_empty() {
            trace!(seq = packet.header.sequence_number, "Empty packet skipped");
            stats.empty_packets += 1;
            return Ok(DispatchOutcome::Skipped);
        }

        let outcome = self.decode_into(packet, registry, buffer, tracker, stats);
        if let Err(e) = &outcome {
            if matches!(e, ReceiverError::MalformedPayload(_)) {
                stats.decode_errors += 1;
            }
            warn!(
                payload_type = packet.header.payload_type,
                seq = packet.header.sequence_number,
                payload = %payload_preview(&packet.payload, 8),
                error = %e,
                "Packet rejected"
            );
            return outcome;
        }

        if self.continuity.is_discontinuous(&packet.header) {
            debug!(
                seq = packet.header.sequence_number,
                timestamp = packet.header.timestamp,
                "Stream discontinuity"
            );
            stats.discontinuities += 1;
        }
        self.continuity.record(&packet.header);

        outcome
    }

    fn decode_into(
        &mut self,
        packet: &IncomingPacket,
        registry: &mut DecoderRegistry,
        buffer: &mut DecodedAudioBuffer,
        tracker: &mut LastAudioCodecTracker,
        stats: &mut ReceiverStats,
    ) -> Result<DispatchOutcome> {
        let mut payload_type = packet.header.payload_type;
        let mut payload: &[u8] = &packet.payload;

        if registry.lookup(payload_type)?.codec.kind() == CodecKind::Redundancy {
            let (primary_pt, primary) = parse_red_primary(payload)?;
            trace!(red = payload_type, primary = primary_pt, "Unwrapped RED");
            payload_type = primary_pt;
            payload = primary;
        }

        // A RED primary pointing at another RED binding falls into the
        // Redundancy arm below.
        let entry = registry.entry_mut(payload_type)?;
        let decoder = match &mut entry.slot {
            DecoderSlot::Audio(decoder) => decoder,
            DecoderSlot::TelephoneEvent => {
                let event = parse_telephone_event(payload)?;
                debug!(event = event.event, end = event.end, "Telephone event");
                self.last_telephone_event = Some(event);
                stats.telephone_events += 1;
                return Ok(DispatchOutcome::TelephoneEvent(event));
            }
            DecoderSlot::Redundancy => {
                return Err(ReceiverError::MalformedPayload(
                    "nested RED payload".to_string(),
                ));
            }
        };

        let samples = decoder.decode(payload)?;
        let channels = decoder.channels();
        let descriptor = entry.descriptor.clone();

        let comfort_noise = descriptor.codec.is_comfort_noise();
        if comfort_noise != (packet.frame_type == FrameType::ComfortNoise) {
            trace!(
                codec = %descriptor.codec,
                hint = ?packet.frame_type,
                "Frame type hint disagrees with codec family"
            );
        }

        let speech_type = if comfort_noise {
            stats.comfort_noise_packets += 1;
            tracker.on_comfort_noise();
            SpeechType::ComfortNoise
        } else {
            tracker.on_speech(&descriptor);
            SpeechType::Normal
        };

        let count = samples.len();
        let dropped_before = buffer.dropped_samples();
        buffer.push(
            SpanFormat::new(descriptor.sample_rate_hz, channels, descriptor.clock_rate_hz),
            payload_type,
            packet.header.timestamp,
            speech_type,
            samples,
        );
        stats.samples_dropped += buffer.dropped_samples() - dropped_before;

        trace!(
            payload_type,
            codec = %descriptor.codec,
            samples = count,
            "Decoded packet"
        );

        self.last_decoded = Some(descriptor.clone());

        Ok(DispatchOutcome::Decoded {
            descriptor,
            samples: count,
            speech_type,
        })
    }
}

/// Split an RFC 2198 payload and return the primary block.
///
/// Redundant blocks have 4-byte headers (F=1); the primary block has a
/// 1-byte header (F=0) and its data follows all redundant data.
pub fn parse_red_primary(payload: &[u8]) -> Result<(u8, &[u8])> {
    let mut pos = 0;
    let mut redundant_len = 0usize;

    loop {
        let header = *payload.get(pos).ok_or_else(|| {
            ReceiverError::MalformedPayload("RED header truncated".to_string())
        })?;
        let payload_type = header & 0x7f;

        if header & 0x80 == 0 {
            pos += 1;
            let start = pos + redundant_len;
            if start > payload.len() {
                return Err(ReceiverError::MalformedPayload(format!(
                    "RED blocks claim {} bytes, payload has {}",
                    start,
                    payload.len()
                )));
            }
            return Ok((payload_type, &payload[start..]));
        }

        if pos + 4 > payload.len() {
            return Err(ReceiverError::MalformedPayload(
                "RED block header truncated".to_string(),
            ));
        }
        let block_len = (usize::from(payload[pos + 2] & 0x03) << 8) | usize::from(payload[pos + 3]);
        redundant_len += block_len;
        pos += 4;
    }
}

/// Parse an RFC 4733 telephone-event payload.
pub fn parse_telephone_event(payload: &[u8]) -> Result<TelephoneEvent> {
    if payload.len() < 4 {
        return Err(ReceiverError::MalformedPayload(format!(
            "telephone-event payload of {} bytes, need 4",
            payload.len()
        )));
    }
    Ok(TelephoneEvent {
        event: payload[0],
        end: payload[1] & 0x80 != 0,
        volume: payload[1] & 0x3f,
        duration: u16::from_be_bytes([payload[2], payload[3]]),
    })
}

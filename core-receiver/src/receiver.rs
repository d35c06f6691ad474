//! # Audio Receiver
//!
//! The receive-side decoding engine.
//!
//! ## Architecture
//!
//! ```text
//!  packet arrival context                 playout context
//!  ──────────────────────                 ───────────────
//!  insert_packet(packet)                  get_audio(rate)
//!        │                                      │
//!        ▼                                      ▼
//! ┌────────────────── Mutex<ReceiverState> ──────────────────┐
//! │ DecodeDispatcher ──► DecoderRegistry                     │
//! │        │                                                 │
//! │        ├──► LastAudioCodecTracker                        │
//! │        ▼                                                 │
//! │ DecodedAudioBuffer ──► ResamplerCache ──► PostDecodeVad  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every public operation takes the lock once and completes before
//! releasing it, so the two contexts never observe a half-applied
//! registration or a buffer mid-append. No operation blocks on I/O.
//!
//! ## Usage
//!
//! ```rust
//! use bytes::Bytes;
//! use core_receiver::{
//!     AudioReceiver, CodecId, FrameType, IncomingPacket, ReceiverConfig, RtpHeader,
//! };
//!
//! let receiver = AudioReceiver::new(ReceiverConfig::default()).unwrap();
//! receiver.add_codec(CodecId::Pcmu, 0, 1, 8000, None).unwrap();
//!
//! let packet = IncomingPacket::new(
//!     RtpHeader::new(0, 1, 0),
//!     FrameType::Speech,
//!     Bytes::from(vec![0xff; 160]),
//! );
//! receiver.insert_packet(&packet).unwrap();
//!
//! let frame = receiver.get_audio(16000).unwrap();
//! assert_eq!(frame.samples_per_channel, 160);
//! assert_eq!(receiver.last_audio_codec_id(), Some(CodecId::Pcmu));
//! ```

use crate::buffer::{DecodedAudioBuffer, PulledFrame, SpanFormat};
use crate::codec::{CodecDatabase, CodecDescriptor, CodecId};
use crate::codecs::BuiltinDecoderFactory;
use crate::config::{is_supported_output_rate, ReceiverConfig, ReceiverStats};
use crate::dispatcher::{DecodeDispatcher, DispatchOutcome, DispatchTargets};
use crate::error::{ReceiverError, Result};
use crate::registry::{DecoderRegistry, DecoderSlot};
use crate::resampler::ResamplerCache;
use crate::tracker::LastAudioCodecTracker;
use crate::traits::{
    AudioDecoder, AudioFrame, DecoderFactory, IncomingPacket, SpeechType, TelephoneEvent,
    VadClassifier,
};
use crate::vad::{EnergyVad, PostDecodeVad};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument, trace, warn};

/// Everything guarded by the receiver lock.
struct ReceiverState {
    registry: DecoderRegistry,
    dispatcher: DecodeDispatcher,
    buffer: DecodedAudioBuffer,
    tracker: LastAudioCodecTracker,
    resamplers: ResamplerCache,
    vad: PostDecodeVad,
    stats: ReceiverStats,
    current_sample_rate_hz: u32,
    next_playout_timestamp: Option<u32>,
}

/// Receive-side audio decoding engine.
///
/// `AudioReceiver` is `Send + Sync`; share it between the packet-arrival
/// and playout threads with an [`Arc`].
pub struct AudioReceiver {
    config: ReceiverConfig,
    factory: Arc<dyn DecoderFactory>,
    state: Mutex<ReceiverState>,
}

impl AudioReceiver {
    /// Create a receiver using the built-in decoders.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: ReceiverConfig) -> Result<Self> {
        Self::with_factory(config, Arc::new(BuiltinDecoderFactory::new()))
    }

    /// Create a receiver that builds decoders with `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::InvalidConfig`] if `config` fails validation.
    pub fn with_factory(config: ReceiverConfig, factory: Arc<dyn DecoderFactory>) -> Result<Self> {
        config.validate().map_err(ReceiverError::InvalidConfig)?;

        let vad = PostDecodeVad::new(
            Box::new(EnergyVad::with_settings(config.vad.clone())),
            config.vad_enabled,
        );

        let state = ReceiverState {
            registry: DecoderRegistry::new(),
            dispatcher: DecodeDispatcher::new(),
            buffer: DecodedAudioBuffer::new(config.max_buffered_ms),
            tracker: LastAudioCodecTracker::new(),
            resamplers: ResamplerCache::new(),
            vad,
            stats: ReceiverStats::default(),
            current_sample_rate_hz: config.initial_sample_rate_hz,
            next_playout_timestamp: None,
        };

        info!(
            max_output_sample_rate_hz = config.max_output_sample_rate_hz,
            vad_enabled = config.vad_enabled,
            "Audio receiver created"
        );

        Ok(Self {
            config,
            factory,
            state: Mutex::new(state),
        })
    }

    /// Replace the post-decode VAD classifier.
    pub fn with_vad_classifier(self, classifier: Box<dyn VadClassifier>) -> Self {
        self.state.lock().vad.set_classifier(classifier);
        self
    }

    /// Configuration the receiver was built with.
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    // ========================================================================
    // Decoder Registry
    // ========================================================================

    /// Bind `payload_type` to a codec.
    ///
    /// With `decoder == None` the decoder comes from the receiver's factory.
    /// Any existing binding of `payload_type` is replaced, whatever its codec.
    ///
    /// # Errors
    ///
    /// - [`ReceiverError::InvalidCodecParameters`] for a payload type above
    ///   127, or a channel count or rate the codec family does not support
    /// - [`ReceiverError::UnknownCodecIdentity`] if no decoder is supplied
    ///   and the factory cannot build one
    #[instrument(level = "debug", skip(self, decoder))]
    pub fn add_codec(
        &self,
        codec: CodecId,
        payload_type: u8,
        channels: u16,
        sample_rate_hz: u32,
        decoder: Option<Box<dyn AudioDecoder>>,
    ) -> Result<()> {
        let descriptor = CodecDatabase::descriptor(codec, payload_type, channels, sample_rate_hz)?;
        let mut state = self.state.lock();
        state
            .registry
            .add_codec(descriptor, decoder, self.factory.as_ref())
    }

    /// Unbind `payload_type`. Unbound payload types are not an error.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_codec(&self, payload_type: u8) -> Result<()> {
        self.state.lock().registry.remove(payload_type);
        Ok(())
    }

    /// Unbind every payload type.
    pub fn remove_all_codecs(&self) {
        let mut state = self.state.lock();
        let count = state.registry.len();
        state.registry.clear();
        info!(count, "Removed all decoders");
    }

    /// Descriptor currently bound to `payload_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::DecoderNotFound`] if nothing is bound.
    pub fn decoder_by_payload_type(&self, payload_type: u8) -> Result<CodecDescriptor> {
        self.state.lock().registry.lookup(payload_type).cloned()
    }

    /// All current bindings, ordered by payload type.
    pub fn registered_codecs(&self) -> Vec<CodecDescriptor> {
        self.state.lock().registry.descriptors()
    }

    // ========================================================================
    // Packet Path
    // ========================================================================

    /// Decode one packet into the buffer.
    ///
    /// Empty packets succeed without touching any state.
    ///
    /// # Errors
    ///
    /// - [`ReceiverError::DecoderNotFound`] if the payload type is unbound
    /// - [`ReceiverError::MalformedPayload`] if the decoder rejects the bytes
    ///
    /// On error the buffer and last-audio-codec state are unchanged.
    #[instrument(
        level = "trace",
        skip(self, packet),
        fields(pt = packet.header.payload_type, seq = packet.header.sequence_number)
    )]
    pub fn insert_packet(&self, packet: &IncomingPacket) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let outcome = state.dispatcher.dispatch(
            packet,
            DispatchTargets {
                registry: &mut state.registry,
                buffer: &mut state.buffer,
                tracker: &mut state.tracker,
                stats: &mut state.stats,
            },
        )?;

        if let DispatchOutcome::Decoded { descriptor, .. } = outcome {
            let rate = descriptor
                .sample_rate_hz
                .min(self.config.max_output_sample_rate_hz);
            if rate != state.current_sample_rate_hz {
                debug!(
                    from = state.current_sample_rate_hz,
                    to = rate,
                    "Current sample rate changed"
                );
                state.current_sample_rate_hz = rate;
            }
        }

        Ok(())
    }

    // ========================================================================
    // Output Path
    // ========================================================================

    /// Produce one 10 ms frame at `sample_rate_hz`.
    ///
    /// # Errors
    ///
    /// - [`ReceiverError::UnsupportedSampleRate`] if the rate is not one of
    ///   8, 16, 32, 44.1 or 48 kHz
    /// - [`ReceiverError::InsufficientBufferedAudio`] if less than a frame is
    ///   buffered and the last decoder cannot conceal
    /// - [`ReceiverError::Resampler`] if rate conversion fails
    #[instrument(level = "trace", skip(self))]
    pub fn get_audio(&self, sample_rate_hz: u32) -> Result<AudioFrame> {
        if !is_supported_output_rate(sample_rate_hz) {
            return Err(ReceiverError::UnsupportedSampleRate(sample_rate_hz));
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;

        // Build the converter before cutting the frame so a failure leaves
        // the buffered audio in place.
        if let Some(format) = state.buffer.next_frame_format() {
            state
                .resamplers
                .prepare(format.sample_rate_hz, sample_rate_hz, format.channels)?;
        }

        let dropped_before = state.buffer.dropped_samples();
        let pulled = state.buffer.pull_frame();
        state.stats.samples_dropped += state.buffer.dropped_samples() - dropped_before;

        let pulled = match pulled {
            Ok(frame) => frame,
            Err(e @ ReceiverError::InsufficientBufferedAudio { .. }) => {
                match Self::conceal(state) {
                    Some(frame) => {
                        state.stats.concealed_frames += 1;
                        frame
                    }
                    None => {
                        state.stats.underruns += 1;
                        trace!(error = %e, "Output underrun");
                        return Err(e);
                    }
                }
            }
            Err(e) => return Err(e),
        };

        let format = pulled.format;
        let samples = state.resamplers.resample(
            format.sample_rate_hz,
            sample_rate_hz,
            format.channels,
            &pulled.samples,
        )?;

        let frame_clock = format.clock_rate_hz / 100;
        state.next_playout_timestamp = state
            .buffer
            .next_timestamp()
            .or(Some(pulled.timestamp.wrapping_add(frame_clock)));

        let vad_activity = state.vad.annotate(
            &samples,
            sample_rate_hz,
            format.channels,
            pulled.speech_type == SpeechType::ComfortNoise,
        );

        state.stats.frames_produced += 1;

        Ok(AudioFrame {
            samples_per_channel: (sample_rate_hz * AudioFrame::DURATION_MS / 1000) as usize,
            samples,
            sample_rate_hz,
            num_channels: format.channels,
            timestamp: pulled.timestamp,
            speech_type: pulled.speech_type,
            vad_activity,
        })
    }

    /// Ask the decoder of the last decoded packet for one frame of
    /// concealment audio.
    fn conceal(state: &mut ReceiverState) -> Option<PulledFrame> {
        if state.buffer.available_samples() > 0 {
            return None;
        }

        let descriptor = state.dispatcher.last_decoded()?.clone();
        let entry = state.registry.entry_mut(descriptor.payload_type).ok()?;
        if entry.descriptor != descriptor {
            return None;
        }
        let DecoderSlot::Audio(decoder) = &mut entry.slot else {
            return None;
        };

        let format = SpanFormat::new(
            descriptor.sample_rate_hz,
            decoder.channels(),
            descriptor.clock_rate_hz,
        );
        let samples = decoder.conceal((format.sample_rate_hz / 100) as usize)?;
        if samples.len() != format.samples_per_frame() {
            warn!(
                codec = %descriptor.codec,
                got = samples.len(),
                expected = format.samples_per_frame(),
                "Discarding concealment of wrong length"
            );
            return None;
        }

        let speech_type = if descriptor.codec.is_comfort_noise() {
            SpeechType::ComfortNoise
        } else {
            SpeechType::Concealment
        };

        Some(PulledFrame {
            samples,
            format,
            payload_type: descriptor.payload_type,
            timestamp: state.next_playout_timestamp.unwrap_or(0),
            speech_type,
        })
    }

    /// Drop buffered audio and resampler state, and reset decoders.
    ///
    /// Codec bindings, the last-audio-codec state and the VAD mode are kept.
    pub fn flush_buffers(&self) {
        let mut state = self.state.lock();
        state.buffer.clear();
        state.resamplers.clear();
        state.registry.reset_decoders();
        state.vad.reset();
        state.next_playout_timestamp = None;
        debug!("Receiver buffers flushed");
    }

    // ========================================================================
    // Voice Activity
    // ========================================================================

    /// Classify subsequent frames.
    pub fn enable_vad(&self) {
        self.state.lock().vad.enable();
    }

    /// Stop classifying; subsequent frames report `VadActivity::Unknown`.
    pub fn disable_vad(&self) {
        self.state.lock().vad.disable();
    }

    /// Returns `true` while post-decode VAD is on.
    pub fn is_vad_enabled(&self) -> bool {
        self.state.lock().vad.is_enabled()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Native rate of the last decoded codec, capped at the configured
    /// ceiling. Before any decode, the configured initial rate.
    pub fn current_sample_rate_hz(&self) -> u32 {
        self.state.lock().current_sample_rate_hz
    }

    /// Native rate of the last decoded packet, uncapped.
    pub fn last_packet_sample_rate_hz(&self) -> Option<u32> {
        self.state
            .lock()
            .dispatcher
            .last_decoded()
            .map(|d| d.sample_rate_hz)
    }

    /// Descriptor of the last decoded speech (non-comfort-noise) codec.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::NoAudioCodecDecoded`] if only comfort noise
    /// or nothing has been decoded.
    pub fn last_audio_codec(&self) -> Result<CodecDescriptor> {
        self.state.lock().tracker.last_audio_codec()
    }

    /// Identity of the last decoded speech codec, `None` if never set.
    pub fn last_audio_codec_id(&self) -> Option<CodecId> {
        self.state.lock().tracker.last_audio_codec_id()
    }

    /// Comfort-noise packets decoded since the last speech packet.
    pub fn comfort_noise_since_speech(&self) -> u64 {
        self.state.lock().tracker.comfort_noise_since_speech()
    }

    /// RTP timestamp of the next sample to be played out.
    pub fn playout_timestamp(&self) -> Option<u32> {
        let state = self.state.lock();
        state.buffer.next_timestamp().or(state.next_playout_timestamp)
    }

    /// Most recent telephone event.
    pub fn last_telephone_event(&self) -> Option<TelephoneEvent> {
        self.state.lock().dispatcher.last_telephone_event()
    }

    /// Snapshot of the receiver counters.
    pub fn stats(&self) -> ReceiverStats {
        self.state.lock().stats.clone()
    }
}

impl std::fmt::Debug for AudioReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioReceiver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

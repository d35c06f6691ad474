//! End-to-end receiver tests
//!
//! This test suite verifies:
//! - Decode dispatch and last-audio-codec tracking across comfort noise
//! - Output cadence, rate conversion and the current-rate ceiling
//! - Post-decode VAD gating
//! - Concealment, failure atomicity and statistics

use bytes::Bytes;
use core_receiver::{
    AudioDecoder, AudioReceiver, CodecId, FrameType, IncomingPacket, ReceiverConfig,
    ReceiverError, Result, RtpHeader, SpeechType, TelephoneEvent, VadActivity, VadClassifier,
    VoiceActivity,
};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use mockall::mock;
use mockall::predicate::eq;

// ============================================================================
// Helpers
// ============================================================================

mock! {
    Decoder {}

    impl AudioDecoder for Decoder {
        fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>>;
        fn sample_rate_hz(&self) -> u32;
        fn channels(&self) -> u16;
        fn reset(&mut self);
        fn conceal(&mut self, samples_per_channel: usize) -> Option<Vec<i16>>;
    }
}

mock! {
    Classifier {}

    impl VadClassifier for Classifier {
        fn classify(&mut self, samples: &[i16], sample_rate_hz: u32, channels: u16) -> VoiceActivity;
        fn reset(&mut self);
    }
}

fn init_test_logging() {
    // Several tests race to install the subscriber; only the first wins.
    let _ = init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Debug),
    );
}

/// iSAC stand-in producing one packetization interval of silence per packet.
fn isac_like(sample_rate_hz: u32, packet_size: usize) -> Box<MockDecoder> {
    let mut decoder = MockDecoder::new();
    decoder.expect_sample_rate_hz().return_const(sample_rate_hz);
    decoder.expect_channels().return_const(1u16);
    decoder
        .expect_decode()
        .returning(move |_| Ok(vec![0; packet_size]));
    decoder.expect_conceal().returning(|_| None);
    decoder.expect_reset().return_const(());
    Box::new(decoder)
}

fn speech(pt: u8, seq: u16, ts: u32, payload: Vec<u8>) -> IncomingPacket {
    IncomingPacket::new(RtpHeader::new(pt, seq, ts), FrameType::Speech, Bytes::from(payload))
}

fn comfort_noise(pt: u8, seq: u16, ts: u32, level: u8) -> IncomingPacket {
    IncomingPacket::new(
        RtpHeader::new(pt, seq, ts),
        FrameType::ComfortNoise,
        Bytes::from(vec![level]),
    )
}

fn l16_payload(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

fn receiver() -> AudioReceiver {
    init_test_logging();
    AudioReceiver::new(ReceiverConfig::default()).unwrap()
}

// ============================================================================
// Last Audio Codec
// ============================================================================

#[test]
fn last_audio_codec_scenario() {
    let receiver = receiver();
    receiver.add_codec(CodecId::Pcmu, 0, 1, 8000, None).unwrap();
    receiver.add_codec(CodecId::Pcma, 1, 1, 8000, None).unwrap();
    receiver.add_codec(CodecId::CnNb, 13, 1, 8000, None).unwrap();

    receiver.insert_packet(&speech(0, 1, 0, vec![0xff; 160])).unwrap();
    assert_eq!(receiver.last_audio_codec_id(), Some(CodecId::Pcmu));

    receiver.insert_packet(&comfort_noise(13, 2, 160, 60)).unwrap();
    assert_eq!(receiver.last_audio_codec_id(), Some(CodecId::Pcmu));

    receiver.insert_packet(&speech(1, 3, 400, vec![0xd5; 160])).unwrap();
    assert_eq!(receiver.last_audio_codec_id(), Some(CodecId::Pcma));
    assert_eq!(receiver.last_audio_codec().unwrap().payload_type, 1);
}

#[test]
fn last_audio_codec_undefined_after_only_dtx() {
    let receiver = receiver();
    receiver.add_codec(CodecId::CnNb, 13, 1, 8000, None).unwrap();
    receiver.add_codec(CodecId::CnWb, 98, 1, 16000, None).unwrap();

    receiver.insert_packet(&comfort_noise(13, 1, 0, 40)).unwrap();
    receiver.insert_packet(&comfort_noise(98, 2, 240, 40)).unwrap();

    assert_eq!(receiver.last_audio_codec_id(), None);
    assert_eq!(
        receiver.last_audio_codec(),
        Err(ReceiverError::NoAudioCodecDecoded)
    );
    assert_eq!(receiver.comfort_noise_since_speech(), 2);
}

#[test]
fn last_audio_codec_persists_through_comfort_noise() {
    let receiver = receiver();
    receiver.add_codec(CodecId::CnNb, 13, 1, 8000, None).unwrap();
    receiver.add_codec(CodecId::CnWb, 98, 1, 16000, None).unwrap();
    receiver.add_codec(CodecId::Pcmu, 0, 1, 8000, None).unwrap();
    receiver.add_codec(CodecId::Pcm16bWb, 108, 1, 16000, None).unwrap();
    receiver
        .add_codec(CodecId::Isac, 103, 1, 16000, Some(isac_like(16000, 480)))
        .unwrap();

    let speech_packets = [
        (CodecId::Pcmu, speech(0, 0, 0, vec![0xff; 160])),
        (CodecId::Pcm16bWb, speech(108, 0, 0, l16_payload(&[0; 160]))),
        (CodecId::Isac, speech(103, 0, 0, vec![1, 2, 3])),
    ];

    let mut seq = 0u16;
    for (codec, packet) in speech_packets {
        seq += 1;
        let packet = IncomingPacket::new(
            RtpHeader::new(packet.header.payload_type, seq, u32::from(seq) * 960),
            packet.frame_type,
            packet.payload,
        );
        receiver.insert_packet(&packet).unwrap();
        assert_eq!(receiver.last_audio_codec_id(), Some(codec));

        for cn in 0..3 {
            seq += 1;
            let pt = if cn % 2 == 0 { 13 } else { 98 };
            receiver
                .insert_packet(&comfort_noise(pt, seq, u32::from(seq) * 960, 50))
                .unwrap();
            assert_eq!(receiver.last_audio_codec_id(), Some(codec));
        }
    }
}

#[test]
fn last_audio_codec_snapshot_survives_removal() {
    let receiver = receiver();
    receiver.add_codec(CodecId::Pcma, 8, 1, 8000, None).unwrap();
    receiver.insert_packet(&speech(8, 1, 0, vec![0xd5; 160])).unwrap();

    receiver.remove_codec(8).unwrap();
    let last = receiver.last_audio_codec().unwrap();
    assert_eq!(last.codec, CodecId::Pcma);
    assert_eq!(last.payload_type, 8);
}

#[test]
fn telephone_events_do_not_touch_last_codec() {
    let receiver = receiver();
    receiver.add_codec(CodecId::TelephoneEvent, 101, 1, 8000, None).unwrap();
    receiver
        .insert_packet(&speech(101, 1, 0, vec![1, 0x0a, 0x00, 0xa0]))
        .unwrap();

    assert_eq!(
        receiver.last_telephone_event(),
        Some(TelephoneEvent {
            event: 1,
            end: false,
            volume: 10,
            duration: 160,
        })
    );
    assert_eq!(receiver.last_audio_codec_id(), None);
    assert_eq!(receiver.stats().telephone_events, 1);
}

// ============================================================================
// Sample Rates & Cadence
// ============================================================================

#[test]
fn current_sample_rate_follows_decoded_codec() {
    let receiver = receiver();
    receiver
        .add_codec(CodecId::Isac, 103, 1, 16000, Some(isac_like(16000, 480)))
        .unwrap();
    receiver
        .add_codec(CodecId::IsacSwb, 104, 1, 32000, Some(isac_like(32000, 960)))
        .unwrap();

    let mut seq = 0;
    for (pt, rate) in [(103u8, 16000u32), (104, 32000)] {
        seq += 1;
        receiver
            .insert_packet(&speech(pt, seq, u32::from(seq) * 960, vec![0; 20]))
            .unwrap();

        let frame = receiver.get_audio(8000).unwrap();
        assert_eq!(frame.sample_rate_hz, 8000);
        assert_eq!(frame.samples_per_channel, 80);
        assert_eq!(receiver.current_sample_rate_hz(), rate.min(32000));
        assert_eq!(receiver.last_packet_sample_rate_hz(), Some(rate));
        receiver.flush_buffers();
    }
}

#[test]
fn current_sample_rate_is_capped() {
    let receiver = receiver();
    assert_eq!(receiver.current_sample_rate_hz(), 16000);

    receiver.add_codec(CodecId::Pcm16bSwb48, 110, 1, 48000, None).unwrap();
    receiver
        .insert_packet(&speech(110, 1, 0, l16_payload(&[0; 480])))
        .unwrap();
    assert_eq!(receiver.current_sample_rate_hz(), 32000);
    assert_eq!(receiver.last_packet_sample_rate_hz(), Some(48000));

    let fullband = AudioReceiver::new(ReceiverConfig::fullband()).unwrap();
    fullband.add_codec(CodecId::Pcm16bSwb48, 110, 1, 48000, None).unwrap();
    fullband
        .insert_packet(&speech(110, 1, 0, l16_payload(&[0; 480])))
        .unwrap();
    assert_eq!(fullband.current_sample_rate_hz(), 48000);
}

#[test]
fn frame_cadence_matches_packetization() {
    let cases = [
        CodecId::Pcmu,
        CodecId::Pcma,
        CodecId::Pcm16b,
        CodecId::Pcm16bWb,
        CodecId::Pcm16bSwb32,
        CodecId::Pcm16bSwb48,
    ];

    for codec in cases {
        let receiver = receiver();
        let info = codec.info();
        receiver
            .add_codec(codec, info.default_payload_type, 1, info.sample_rate_hz, None)
            .unwrap();

        let payload = match codec {
            CodecId::Pcmu | CodecId::Pcma => vec![0xff; info.packet_size],
            _ => l16_payload(&vec![0; info.packet_size]),
        };
        receiver
            .insert_packet(&speech(info.default_payload_type, 1, 0, payload))
            .unwrap();

        let frames = receiver
            .decoder_by_payload_type(info.default_payload_type)
            .unwrap()
            .frames_per_packet();
        assert_eq!(frames, info.packet_size / (info.sample_rate_hz / 100) as usize);
        for _ in 0..frames {
            receiver.get_audio(info.sample_rate_hz).unwrap();
        }
        assert!(
            matches!(
                receiver.get_audio(info.sample_rate_hz),
                Err(ReceiverError::InsufficientBufferedAudio { .. })
            ),
            "{}",
            codec
        );
        assert_eq!(receiver.stats().underruns, 1);
    }
}

#[test]
fn small_packets_span_frames() {
    let receiver = receiver();
    receiver.add_codec(CodecId::Pcm16b, 107, 1, 8000, None).unwrap();

    let samples: Vec<i16> = (0..120).collect();
    // Three 40-sample packets make one and a half frames.
    for (i, chunk) in samples.chunks(40).enumerate() {
        receiver
            .insert_packet(&speech(107, i as u16, (i * 40) as u32, l16_payload(chunk)))
            .unwrap();
    }

    let frame = receiver.get_audio(8000).unwrap();
    assert_eq!(frame.samples, (0..80).collect::<Vec<i16>>());
    assert_eq!(frame.timestamp, 0);
    assert_eq!(receiver.playout_timestamp(), Some(80));
    assert!(receiver.get_audio(8000).is_err());

    receiver
        .insert_packet(&speech(107, 3, 120, l16_payload(&[120; 40])))
        .unwrap();
    let frame = receiver.get_audio(8000).unwrap();
    assert_eq!(&frame.samples[..40], &samples[80..]);
    assert_eq!(frame.timestamp, 80);
}

#[test]
fn stereo_output_is_resampled_interleaved() {
    let receiver = receiver();
    receiver.add_codec(CodecId::Pcm16bWb, 108, 2, 16000, None).unwrap();

    for seq in 0..3u16 {
        receiver
            .insert_packet(&speech(108, seq, u32::from(seq) * 160, l16_payload(&[0; 320])))
            .unwrap();
        let frame = receiver.get_audio(48000).unwrap();
        assert_eq!(frame.num_channels, 2);
        assert_eq!(frame.samples_per_channel, 480);
        assert_eq!(frame.samples.len(), 960);
        assert_eq!(frame.channel(1).len(), 480);
    }
}

#[test]
fn unsupported_output_rate() {
    let receiver = receiver();
    assert_eq!(
        receiver.get_audio(11025),
        Err(ReceiverError::UnsupportedSampleRate(11025))
    );
}

// ============================================================================
// Voice Activity
// ============================================================================

#[test]
fn post_decode_vad_gating() {
    let receiver = receiver();
    receiver.add_codec(CodecId::Pcm16bWb, 108, 1, 16000, None).unwrap();
    assert!(!receiver.is_vad_enabled());

    let silence = l16_payload(&[0; 160]);

    receiver.insert_packet(&speech(108, 1, 0, silence.clone())).unwrap();
    assert_eq!(receiver.get_audio(16000).unwrap().vad_activity, VadActivity::Unknown);

    receiver.enable_vad();
    assert!(receiver.is_vad_enabled());
    receiver.insert_packet(&speech(108, 2, 160, silence.clone())).unwrap();
    assert_eq!(receiver.get_audio(16000).unwrap().vad_activity, VadActivity::Passive);

    let loud: Vec<i16> = (0..160).map(|i| if i % 2 == 0 { 10000 } else { -10000 }).collect();
    receiver.insert_packet(&speech(108, 3, 320, l16_payload(&loud))).unwrap();
    assert_eq!(receiver.get_audio(16000).unwrap().vad_activity, VadActivity::Active);

    receiver.disable_vad();
    assert!(!receiver.is_vad_enabled());
    receiver.insert_packet(&speech(108, 4, 480, silence)).unwrap();
    assert_eq!(receiver.get_audio(16000).unwrap().vad_activity, VadActivity::Unknown);
}

#[test]
fn vad_toggle_applies_from_next_frame() {
    let receiver = receiver();
    receiver.add_codec(CodecId::Pcmu, 0, 1, 8000, None).unwrap();

    // One packet buffers two frames; toggling between pulls affects only
    // the second.
    receiver.insert_packet(&speech(0, 1, 0, vec![0xff; 160])).unwrap();
    assert_eq!(receiver.get_audio(8000).unwrap().vad_activity, VadActivity::Unknown);
    receiver.enable_vad();
    assert_eq!(receiver.get_audio(8000).unwrap().vad_activity, VadActivity::Passive);
}

#[test]
fn comfort_noise_is_passive_without_classification() {
    let mut classifier = MockClassifier::new();
    classifier.expect_classify().times(0);
    classifier.expect_reset().return_const(());

    let config = ReceiverConfig {
        vad_enabled: true,
        ..Default::default()
    };
    let receiver = AudioReceiver::new(config)
        .unwrap()
        .with_vad_classifier(Box::new(classifier));
    receiver.add_codec(CodecId::CnNb, 13, 1, 8000, None).unwrap();
    receiver.insert_packet(&comfort_noise(13, 1, 0, 20)).unwrap();

    let frame = receiver.get_audio(8000).unwrap();
    assert_eq!(frame.speech_type, SpeechType::ComfortNoise);
    assert_eq!(frame.vad_activity, VadActivity::Passive);
}

#[test]
fn custom_classifier_sees_output_frames() {
    let mut classifier = MockClassifier::new();
    classifier
        .expect_classify()
        .withf(|samples: &[i16], rate: &u32, channels: &u16| {
            samples.len() == 320 && *rate == 32000 && *channels == 1
        })
        .times(2)
        .returning(|_, _, _| VoiceActivity::Active);
    classifier.expect_reset().return_const(());

    let receiver = AudioReceiver::new(ReceiverConfig::default())
        .unwrap()
        .with_vad_classifier(Box::new(classifier));
    receiver.enable_vad();
    receiver.add_codec(CodecId::Pcmu, 0, 1, 8000, None).unwrap();
    receiver.insert_packet(&speech(0, 1, 0, vec![0x80; 160])).unwrap();

    for _ in 0..2 {
        assert_eq!(receiver.get_audio(32000).unwrap().vad_activity, VadActivity::Active);
    }
}

// ============================================================================
// Failures, Concealment & Stats
// ============================================================================

#[test]
fn empty_packets_are_ignored() {
    let receiver = receiver();
    let packet = IncomingPacket::new(RtpHeader::new(99, 1, 0), FrameType::Empty, Bytes::new());
    assert!(receiver.insert_packet(&packet).is_ok());
    assert_eq!(receiver.current_sample_rate_hz(), 16000);
    assert_eq!(receiver.stats().empty_packets, 1);
}

#[test]
fn unknown_payload_type_is_rejected() {
    let receiver = receiver();
    receiver.add_codec(CodecId::Pcmu, 0, 1, 8000, None).unwrap();
    assert_eq!(
        receiver.insert_packet(&speech(8, 1, 0, vec![0xd5; 160])),
        Err(ReceiverError::DecoderNotFound(8))
    );
    assert_eq!(receiver.last_audio_codec_id(), None);
}

#[test]
fn malformed_payload_leaves_state_unchanged() {
    let receiver = receiver();
    receiver.add_codec(CodecId::Pcm16bWb, 108, 1, 16000, None).unwrap();
    receiver.add_codec(CodecId::Pcmu, 0, 1, 8000, None).unwrap();
    receiver.insert_packet(&speech(0, 1, 0, vec![0xff; 80])).unwrap();

    let result = receiver.insert_packet(&speech(108, 2, 80, vec![0; 321]));
    assert!(matches!(result, Err(ReceiverError::MalformedPayload(_))));

    assert_eq!(receiver.last_audio_codec_id(), Some(CodecId::Pcmu));
    assert_eq!(receiver.current_sample_rate_hz(), 8000);
    assert_eq!(receiver.get_audio(8000).unwrap().samples.len(), 80);
    assert!(receiver.get_audio(8000).is_err());
    assert_eq!(receiver.stats().decode_errors, 1);
}

#[test]
fn decoder_concealment_fills_underrun() {
    let mut decoder = MockDecoder::new();
    decoder.expect_sample_rate_hz().return_const(16000u32);
    decoder.expect_channels().return_const(1u16);
    decoder.expect_decode().returning(|_| Ok(vec![100; 160]));
    decoder
        .expect_conceal()
        .with(eq(160))
        .times(1)
        .returning(|n| Some(vec![7; n]));

    let receiver = receiver();
    receiver
        .add_codec(CodecId::Isac, 103, 1, 16000, Some(Box::new(decoder)))
        .unwrap();
    receiver.insert_packet(&speech(103, 1, 1600, vec![1])).unwrap();

    let decoded = receiver.get_audio(16000).unwrap();
    assert_eq!(decoded.speech_type, SpeechType::Normal);

    let concealed = receiver.get_audio(16000).unwrap();
    assert_eq!(concealed.speech_type, SpeechType::Concealment);
    assert!(concealed.samples.iter().all(|&s| s == 7));
    assert_eq!(concealed.timestamp, 1760);
    assert_eq!(receiver.stats().concealed_frames, 1);
}

#[test]
fn red_wrapped_speech_is_decoded() {
    let receiver = receiver();
    receiver.add_codec(CodecId::Pcmu, 0, 1, 8000, None).unwrap();
    receiver.add_codec(CodecId::Red, 127, 1, 8000, None).unwrap();

    let mut payload = vec![0x00];
    payload.extend_from_slice(&[0xff; 80]);
    receiver.insert_packet(&speech(127, 1, 0, payload)).unwrap();

    assert_eq!(receiver.last_audio_codec_id(), Some(CodecId::Pcmu));
    assert!(receiver.get_audio(8000).unwrap().is_silent());
}

#[test]
fn stats_track_activity() {
    let receiver = receiver();
    receiver.add_codec(CodecId::Pcmu, 0, 1, 8000, None).unwrap();
    receiver.add_codec(CodecId::CnNb, 13, 1, 8000, None).unwrap();

    receiver.insert_packet(&speech(0, 1, 0, vec![0xff; 160])).unwrap();
    receiver.insert_packet(&comfort_noise(13, 2, 160, 70)).unwrap();
    receiver.insert_packet(&speech(0, 9, 400, vec![0xff; 160])).unwrap();
    receiver.get_audio(8000).unwrap();

    let stats = receiver.stats();
    assert_eq!(stats.packets_inserted, 3);
    assert_eq!(stats.comfort_noise_packets, 1);
    assert_eq!(stats.discontinuities, 1);
    assert_eq!(stats.frames_produced, 1);
}

#[test]
fn buffer_overflow_drops_oldest_audio() {
    init_test_logging();
    let config = ReceiverConfig {
        max_buffered_ms: 40,
        ..Default::default()
    };
    let receiver = AudioReceiver::new(config).unwrap();
    receiver.add_codec(CodecId::Pcm16b, 107, 1, 8000, None).unwrap();

    for seq in 0..6u16 {
        let value = seq as i16;
        receiver
            .insert_packet(&speech(107, seq, u32::from(seq) * 80, l16_payload(&[value; 80])))
            .unwrap();
    }

    assert_eq!(receiver.stats().samples_dropped, 160);
    let frame = receiver.get_audio(8000).unwrap();
    assert_eq!(frame.samples[0], 2);
    assert_eq!(frame.timestamp, 160);
}

#[test]
fn buffer_cap_holds_for_short_packets() {
    init_test_logging();

    // 7 samples at 8 kHz is 875 us, 79 samples is 9.875 ms.
    for (packet_samples, max_buffered_ms) in [(7usize, 10u32), (79, 40)] {
        let config = ReceiverConfig {
            max_buffered_ms,
            ..Default::default()
        };
        let receiver = AudioReceiver::new(config).unwrap();
        receiver.add_codec(CodecId::Pcm16b, 107, 1, 8000, None).unwrap();

        let packets = 2000u32;
        for seq in 0..packets {
            receiver
                .insert_packet(&speech(
                    107,
                    seq as u16,
                    seq * packet_samples as u32,
                    l16_payload(&vec![1; packet_samples]),
                ))
                .unwrap();
        }

        let mut frames = 0u64;
        while receiver.get_audio(8000).is_ok() {
            frames += 1;
        }

        let cap_frames = u64::from(max_buffered_ms / 10);
        assert!(
            frames <= cap_frames,
            "{} frames buffered with a {} ms cap",
            frames,
            max_buffered_ms
        );

        let stats = receiver.stats();
        let pushed = u64::from(packets) * packet_samples as u64;
        let leftover = pushed - frames * 80 - stats.samples_dropped;
        assert!(leftover < 80, "{} samples unaccounted for", leftover);
    }
}

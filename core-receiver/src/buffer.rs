//! # Decoded Audio Buffer
//!
//! Accumulates decoded PCM between the packet-arrival context (producer)
//! and the playout context (consumer).
//!
//! ## Design
//!
//! - **Spans**: every decode appends one [`AudioSpan`] tagged with the
//!   format (rate, channels) and RTP timestamp of the decode that produced it.
//! - **Cursor**: output frames are cut by sample count, not packet count. A
//!   frame may take the tail of one span and the head of the next, and one
//!   span may feed many frames.
//! - **Format boundaries**: samples of different formats are never mixed in a
//!   frame. A sub-frame remainder left in front of a format change is dropped.
//! - **Overflow policy**: when the buffered duration exceeds the cap, the
//!   oldest audio is dropped one frame at a time. The duration is a running
//!   total in microseconds, each span rounded up, so packets shorter than a
//!   millisecond still count against the cap.
//!
//! ## Usage
//!
//! ```rust
//! use core_receiver::buffer::{DecodedAudioBuffer, SpanFormat};
//! use core_receiver::SpeechType;
//!
//! let mut buffer = DecodedAudioBuffer::new(1000);
//! let format = SpanFormat::new(8000, 1, 8000);
//! buffer.push(format, 0, 0, SpeechType::Normal, vec![0; 160]);
//!
//! let frame = buffer.pull_frame().unwrap();
//! assert_eq!(frame.samples.len(), 80);
//! assert_eq!(buffer.available_samples(), 80);
//! ```

use crate::error::{ReceiverError, Result};
use crate::traits::SpeechType;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Sample layout of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanFormat {
    /// Sample rate in Hz
    pub sample_rate_hz: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// RTP clock rate used by the span's timestamps
    pub clock_rate_hz: u32,
}

impl SpanFormat {
    /// Create a span format.
    pub fn new(sample_rate_hz: u32, channels: u16, clock_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz,
            channels,
            clock_rate_hz,
        }
    }

    /// Interleaved samples in one 10 ms frame.
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate_hz / 100) as usize * self.channels as usize
    }

    fn same_layout(&self, other: &SpanFormat) -> bool {
        self.sample_rate_hz == other.sample_rate_hz && self.channels == other.channels
    }
}

/// Samples produced by one decode.
#[derive(Debug, Clone)]
pub struct AudioSpan {
    /// Sample layout
    pub format: SpanFormat,
    /// Payload type of the packet that produced the span
    pub payload_type: u8,
    /// RTP timestamp of the first sample
    pub timestamp: u32,
    /// Decode path
    pub speech_type: SpeechType,
    samples: Vec<i16>,
    read_pos: usize,
}

impl AudioSpan {
    fn remaining(&self) -> usize {
        self.samples.len() - self.read_pos
    }

    /// Unplayed duration in microseconds, rounded up.
    fn remaining_us(&self) -> u64 {
        let frames = (self.remaining() / self.format.channels.max(1) as usize) as u64;
        let rate = u64::from(self.format.sample_rate_hz.max(1));
        (frames * 1_000_000).div_ceil(rate)
    }

    fn timestamp_at_cursor(&self) -> u32 {
        let channels = self.format.channels.max(1) as u64;
        let consumed = (self.read_pos as u64 / channels) * u64::from(self.format.clock_rate_hz)
            / u64::from(self.format.sample_rate_hz.max(1));
        self.timestamp.wrapping_add(consumed as u32)
    }
}

/// One 10 ms block cut from the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct PulledFrame {
    /// Interleaved samples at the span's native rate
    pub samples: Vec<i16>,
    /// Sample layout
    pub format: SpanFormat,
    /// Payload type of the span the frame started in
    pub payload_type: u8,
    /// RTP timestamp of the first sample
    pub timestamp: u32,
    /// Decode path of the span the frame started in
    pub speech_type: SpeechType,
}

/// Append-only span queue with a sample-indexed read cursor.
#[derive(Debug)]
pub struct DecodedAudioBuffer {
    spans: VecDeque<AudioSpan>,
    max_buffered_ms: u32,
    buffered_us: u64,
    dropped_samples: u64,
}

impl DecodedAudioBuffer {
    /// Create a buffer holding at most `max_buffered_ms` of audio.
    pub fn new(max_buffered_ms: u32) -> Self {
        Self {
            spans: VecDeque::new(),
            max_buffered_ms,
            buffered_us: 0,
            dropped_samples: 0,
        }
    }

    /// Append the output of one decode.
    pub fn push(
        &mut self,
        format: SpanFormat,
        payload_type: u8,
        timestamp: u32,
        speech_type: SpeechType,
        samples: Vec<i16>,
    ) {
        if samples.is_empty() {
            return;
        }

        let span = AudioSpan {
            format,
            payload_type,
            timestamp,
            speech_type,
            samples,
            read_pos: 0,
        };
        self.buffered_us += span.remaining_us();
        self.spans.push_back(span);

        self.enforce_capacity();
    }

    /// Cut the next 10 ms frame.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::InsufficientBufferedAudio`] if less than one
    /// frame of the head format is buffered. The buffer is unchanged then.
    pub fn pull_frame(&mut self) -> Result<PulledFrame> {
        loop {
            let Some(head) = self.spans.front() else {
                return Err(ReceiverError::InsufficientBufferedAudio {
                    available: 0,
                    required: 0,
                });
            };

            let format = head.format;
            let required = format.samples_per_frame();
            let (available, run_len) = self.contiguous_run(&format);

            if required > 0 && available >= required {
                return Ok(self.take(required));
            }

            if run_len < self.spans.len() {
                // A different format follows; the remainder can never fill a frame.
                debug!(
                    dropped = available,
                    sample_rate_hz = format.sample_rate_hz,
                    "Dropping partial frame at format change"
                );
                self.dropped_samples += available as u64;
                for span in self.spans.drain(..run_len) {
                    self.buffered_us -= span.remaining_us();
                }
                continue;
            }

            return Err(ReceiverError::InsufficientBufferedAudio {
                available,
                required,
            });
        }
    }

    /// Samples available in the head format, across contiguous spans.
    pub fn available_samples(&self) -> usize {
        self.spans
            .front()
            .map(|head| self.contiguous_run(&head.format).0)
            .unwrap_or(0)
    }

    /// Buffered duration across all spans, in microseconds.
    pub fn buffered_us(&self) -> u64 {
        self.buffered_us
    }

    /// Buffered duration across all spans, in whole milliseconds.
    pub fn buffered_ms(&self) -> u64 {
        self.buffered_us / 1000
    }

    /// Format of the frame the next [`pull_frame`](Self::pull_frame) would
    /// return, skipping runs it would drop at a format change.
    pub fn next_frame_format(&self) -> Option<SpanFormat> {
        let mut spans = self.spans.iter().peekable();
        while let Some(head) = spans.next() {
            let format = head.format;
            let mut available = head.remaining();
            while let Some(span) = spans.next_if(|s| s.format.same_layout(&format)) {
                available += span.remaining();
            }
            let required = format.samples_per_frame();
            if required > 0 && available >= required {
                return Some(format);
            }
        }
        None
    }

    /// Payload type of the oldest buffered audio.
    pub fn head_payload_type(&self) -> Option<u8> {
        self.spans.front().map(|span| span.payload_type)
    }

    /// RTP timestamp of the next sample to be pulled.
    pub fn next_timestamp(&self) -> Option<u32> {
        self.spans.front().map(AudioSpan::timestamp_at_cursor)
    }

    /// Samples dropped so far by overflow and format changes.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples
    }

    /// Drop all buffered audio.
    pub fn clear(&mut self) {
        self.spans.clear();
        self.buffered_us = 0;
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    fn contiguous_run(&self, format: &SpanFormat) -> (usize, usize) {
        let mut available = 0;
        let mut run_len = 0;
        for span in self.spans.iter().take_while(|s| s.format.same_layout(format)) {
            available += span.remaining();
            run_len += 1;
        }
        (available, run_len)
    }

    fn take(&mut self, count: usize) -> PulledFrame {
        let mut samples = Vec::with_capacity(count);
        let mut header = None;

        while samples.len() < count {
            let Some(span) = self.spans.front_mut() else {
                break;
            };

            if header.is_none() {
                header = Some((
                    span.format,
                    span.payload_type,
                    span.timestamp_at_cursor(),
                    span.speech_type,
                ));
            }

            let before_us = span.remaining_us();
            let n = span.remaining().min(count - samples.len());
            samples.extend_from_slice(&span.samples[span.read_pos..span.read_pos + n]);
            span.read_pos += n;
            self.buffered_us -= before_us - span.remaining_us();

            if span.remaining() == 0 {
                self.spans.pop_front();
            }
        }

        // take() is only called once a full run is known to be available.
        let (format, payload_type, timestamp, speech_type) =
            header.unwrap_or((SpanFormat::new(0, 0, 0), 0, 0, SpeechType::Normal));

        PulledFrame {
            samples,
            format,
            payload_type,
            timestamp,
            speech_type,
        }
    }

    fn enforce_capacity(&mut self) {
        let cap_us = u64::from(self.max_buffered_ms) * 1000;
        let mut dropped = 0usize;
        while self.buffered_us > cap_us {
            let Some(head) = self.spans.front_mut() else {
                break;
            };
            let before_us = head.remaining_us();
            let n = head.format.samples_per_frame().max(1).min(head.remaining());
            head.read_pos += n;
            self.buffered_us -= before_us - head.remaining_us();
            dropped += n;
            if head.remaining() == 0 {
                self.spans.pop_front();
            }
        }

        if dropped > 0 {
            warn!(
                dropped,
                max_buffered_ms = self.max_buffered_ms,
                "Decoded audio buffer overflow, dropped oldest samples"
            );
            self.dropped_samples += dropped as u64;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

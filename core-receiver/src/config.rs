//! # Receiver Configuration
//!
//! Configuration and statistics types for the audio receiver.

use crate::error::{ReceiverError, Result};
use crate::vad::VadSettings;
use serde::{Deserialize, Serialize};

/// Output sample rates `get_audio` accepts.
pub const SUPPORTED_OUTPUT_RATES_HZ: [u32; 5] = [8000, 16000, 32000, 44100, 48000];

/// Returns `true` if `rate` is a supported output rate.
pub fn is_supported_output_rate(rate: u32) -> bool {
    SUPPORTED_OUTPUT_RATES_HZ.contains(&rate)
}

/// Audio receiver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Ceiling applied to the reported current sample rate.
    ///
    /// A 48 kHz codec under a 32 kHz ceiling reports 32000.
    ///
    /// Default: 32000 Hz.
    #[serde(default = "default_max_output_sample_rate_hz")]
    pub max_output_sample_rate_hz: u32,

    /// Current sample rate reported before anything has been decoded.
    ///
    /// Default: 16000 Hz.
    #[serde(default = "default_initial_sample_rate_hz")]
    pub initial_sample_rate_hz: u32,

    /// Whether post-decode VAD starts enabled.
    ///
    /// Default: false.
    #[serde(default)]
    pub vad_enabled: bool,

    /// Maximum decoded audio held between insert and pull, in milliseconds.
    /// Older audio is dropped on overflow.
    ///
    /// Default: 1000 ms.
    #[serde(default = "default_max_buffered_ms")]
    pub max_buffered_ms: u32,

    /// Settings for the built-in energy VAD.
    #[serde(default)]
    pub vad: VadSettings,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            max_output_sample_rate_hz: default_max_output_sample_rate_hz(),
            initial_sample_rate_hz: default_initial_sample_rate_hz(),
            vad_enabled: false,
            max_buffered_ms: default_max_buffered_ms(),
            vad: VadSettings::default(),
        }
    }
}

impl ReceiverConfig {
    /// Telephony profile: everything capped at 8 kHz.
    pub fn narrowband() -> Self {
        Self {
            max_output_sample_rate_hz: 8000,
            initial_sample_rate_hz: 8000,
            ..Default::default()
        }
    }

    /// Full-band profile: no ceiling below 48 kHz.
    pub fn fullband() -> Self {
        Self {
            max_output_sample_rate_hz: 48000,
            initial_sample_rate_hz: 48000,
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !is_supported_output_rate(self.max_output_sample_rate_hz) {
            return Err(format!(
                "max_output_sample_rate_hz {} is not one of {:?}",
                self.max_output_sample_rate_hz, SUPPORTED_OUTPUT_RATES_HZ
            ));
        }

        if self.initial_sample_rate_hz == 0 {
            return Err("initial_sample_rate_hz must be > 0".to_string());
        }

        if self.initial_sample_rate_hz > self.max_output_sample_rate_hz {
            return Err("initial_sample_rate_hz cannot exceed max_output_sample_rate_hz".to_string());
        }

        if self.max_buffered_ms < 10 {
            return Err("max_buffered_ms must hold at least one 10 ms frame".to_string());
        }

        if !self.vad.threshold_db.is_finite() {
            return Err("vad.threshold_db must be finite".to_string());
        }

        Ok(())
    }

    /// Parse and validate a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReceiverError::InvalidConfig`] on malformed JSON or invalid
    /// values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ReceiverError::InvalidConfig(e.to_string()))?;
        config.validate().map_err(ReceiverError::InvalidConfig)?;
        Ok(config)
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_max_output_sample_rate_hz() -> u32 {
    32000
}

fn default_initial_sample_rate_hz() -> u32 {
    16000
}

fn default_max_buffered_ms() -> u32 {
    1000
}

// ============================================================================
// Receiver Statistics
// ============================================================================

/// Counters describing receiver activity since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiverStats {
    /// Packets handed to `insert_packet`, including failed ones.
    pub packets_inserted: u64,
    /// Packets short-circuited as empty.
    pub empty_packets: u64,
    /// Packets decoded on a comfort-noise path.
    pub comfort_noise_packets: u64,
    /// Telephone-event packets parsed.
    pub telephone_events: u64,
    /// Packets rejected by a decoder or payload parser.
    pub decode_errors: u64,
    /// Sequence gaps and backwards timestamps seen.
    pub discontinuities: u64,
    /// Frames returned by `get_audio`.
    pub frames_produced: u64,
    /// Frames filled by decoder concealment.
    pub concealed_frames: u64,
    /// `get_audio` calls that found too little audio.
    pub underruns: u64,
    /// Decoded samples discarded on overflow or format change.
    pub samples_dropped: u64,
}

impl ReceiverStats {
    /// Fraction of inserted packets that failed to decode.
    pub fn decode_error_rate(&self) -> f32 {
        if self.packets_inserted == 0 {
            return 0.0;
        }
        self.decode_errors as f32 / self.packets_inserted as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReceiverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_output_sample_rate_hz, 32000);
        assert_eq!(config.initial_sample_rate_hz, 16000);
        assert!(!config.vad_enabled);
    }

    #[test]
    fn test_presets() {
        let nb = ReceiverConfig::narrowband();
        assert!(nb.validate().is_ok());
        assert_eq!(nb.max_output_sample_rate_hz, 8000);

        let fb = ReceiverConfig::fullband();
        assert!(fb.validate().is_ok());
        assert!(fb.max_output_sample_rate_hz > ReceiverConfig::default().max_output_sample_rate_hz);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ReceiverConfig::default();

        config.max_output_sample_rate_hz = 22050;
        assert!(config.validate().is_err());
        config.max_output_sample_rate_hz = 32000;

        config.initial_sample_rate_hz = 48000;
        assert!(config.validate().is_err());
        config.initial_sample_rate_hz = 16000;

        config.max_buffered_ms = 5;
        assert!(config.validate().is_err());
        config.max_buffered_ms = 1000;

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_str() {
        let config = ReceiverConfig::from_json_str(r#"{"vad_enabled": true}"#).unwrap();
        assert!(config.vad_enabled);
        assert_eq!(config.max_buffered_ms, 1000);
        assert_eq!(config.vad.threshold_db, -40.0);

        assert!(matches!(
            ReceiverConfig::from_json_str(r#"{"max_output_sample_rate_hz": 11025}"#),
            Err(ReceiverError::InvalidConfig(_))
        ));
        assert!(matches!(
            ReceiverConfig::from_json_str("not json"),
            Err(ReceiverError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_supported_rates() {
        assert!(is_supported_output_rate(44100));
        assert!(!is_supported_output_rate(22050));
    }

    #[test]
    fn test_receiver_stats() {
        let stats = ReceiverStats {
            packets_inserted: 10,
            decode_errors: 1,
            ..Default::default()
        };
        assert!((stats.decode_error_rate() - 0.1).abs() < f32::EPSILON);
        assert_eq!(ReceiverStats::default().decode_error_rate(), 0.0);
    }
}

//! Post-decode voice activity detection.
//!
//! Classifies each output frame as active or passive speech. The built-in
//! [`EnergyVad`] compares the frame's RMS level against a threshold and holds
//! the active state for a configurable time so word endings are not cut off.
//! Any other classifier can be plugged in through [`VadClassifier`].

use crate::traits::{VadActivity, VadClassifier, VoiceActivity};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Settings for [`EnergyVad`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VadSettings {
    /// Threshold in dB relative to full scale. Frames at or below it are
    /// passive.
    #[serde(default = "default_threshold_db")]
    pub threshold_db: f32,

    /// Time to stay active after the level drops below the threshold.
    #[serde(default = "default_holdoff_ms")]
    pub holdoff_ms: u32,
}

fn default_threshold_db() -> f32 {
    -40.0
}

fn default_holdoff_ms() -> u32 {
    0
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold_db: default_threshold_db(),
            holdoff_ms: default_holdoff_ms(),
        }
    }
}

/// RMS level of 16-bit samples in dBFS. Silence is `-inf`.
pub fn rms_db(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    let rms = (sum / samples.len() as f64).sqrt() / 32768.0;
    (20.0 * rms.log10()) as f32
}

/// Energy-threshold classifier with holdoff.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    settings: VadSettings,
    voice_active: bool,
    holdoff_remaining: u32,
}

impl EnergyVad {
    /// Create a classifier with default settings.
    pub fn new() -> Self {
        Self::with_settings(VadSettings::default())
    }

    /// Create a classifier with custom settings.
    pub fn with_settings(settings: VadSettings) -> Self {
        Self {
            settings,
            voice_active: false,
            holdoff_remaining: 0,
        }
    }

    /// Current settings.
    pub fn settings(&self) -> &VadSettings {
        &self.settings
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new()
    }
}

impl VadClassifier for EnergyVad {
    fn classify(&mut self, samples: &[i16], sample_rate_hz: u32, channels: u16) -> VoiceActivity {
        let level_db = rms_db(samples);

        if level_db > self.settings.threshold_db {
            self.voice_active = true;
            self.holdoff_remaining =
                (u64::from(self.settings.holdoff_ms) * u64::from(sample_rate_hz) / 1000) as u32;
        } else if self.holdoff_remaining > 0 {
            let frames = (samples.len() / channels.max(1) as usize) as u32;
            self.holdoff_remaining = self.holdoff_remaining.saturating_sub(frames);
        } else {
            self.voice_active = false;
        }

        if self.voice_active {
            VoiceActivity::Active
        } else {
            VoiceActivity::Passive
        }
    }

    fn reset(&mut self) {
        self.voice_active = false;
        self.holdoff_remaining = 0;
    }
}

/// Annotates output frames with a VAD decision when enabled.
pub struct PostDecodeVad {
    enabled: bool,
    classifier: Box<dyn VadClassifier>,
}

impl PostDecodeVad {
    /// Wrap a classifier. Starts in the given enabled state.
    pub fn new(classifier: Box<dyn VadClassifier>, enabled: bool) -> Self {
        Self {
            enabled,
            classifier,
        }
    }

    /// Turn classification on.
    pub fn enable(&mut self) {
        if !self.enabled {
            debug!("Post-decode VAD enabled");
            self.classifier.reset();
        }
        self.enabled = true;
    }

    /// Turn classification off. Subsequent frames are [`VadActivity::Unknown`].
    pub fn disable(&mut self) {
        if self.enabled {
            debug!("Post-decode VAD disabled");
        }
        self.enabled = false;
    }

    /// Returns `true` while classification is on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Replace the classifier, keeping the enabled state.
    pub fn set_classifier(&mut self, classifier: Box<dyn VadClassifier>) {
        self.classifier = classifier;
    }

    /// Activity label for one output frame.
    ///
    /// Comfort noise is passive by definition and never reaches the
    /// classifier.
    pub fn annotate(
        &mut self,
        samples: &[i16],
        sample_rate_hz: u32,
        channels: u16,
        comfort_noise: bool,
    ) -> VadActivity {
        if !self.enabled {
            return VadActivity::Unknown;
        }
        if comfort_noise {
            return VadActivity::Passive;
        }
        self.classifier
            .classify(samples, sample_rate_hz, channels)
            .into()
    }

    /// Clear classifier state.
    pub fn reset(&mut self) {
        self.classifier.reset();
    }
}

impl std::fmt::Debug for PostDecodeVad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostDecodeVad")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

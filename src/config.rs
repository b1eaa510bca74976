// Engine tuning knobs, loadable from a JSON file. Anything missing from the
// file falls back to the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::audio_api::EnvelopeSettings;
use crate::mapping::FrequencyRange;
use crate::shared::DEFAULT_CANVAS_HEIGHT;
use crate::{PlaybackError, Result};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub frequency_range: FrequencyRange,
    pub canvas_height: f64,
    pub min_segment_secs: f64,  // segments shorter than this are not played
    pub release_tail_secs: f64, // how long after a segment's last point the note is released
    pub pass_padding_secs: f64, // silence added to a pass before the loop continues
    pub render_tail_secs: f64,  // extra capture time for reverb/delay decay when rendering
    pub sample_rate: u32,       // offline rendering only; live output uses the device rate
    pub envelope: EnvelopeSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frequency_range: FrequencyRange::DEFAULT,
            canvas_height: DEFAULT_CANVAS_HEIGHT,
            min_segment_secs: 0.02,
            release_tail_secs: 0.1,
            pass_padding_secs: 0.5,
            render_tail_secs: 2.5,
            sample_rate: 44100,
            envelope: EnvelopeSettings::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.frequency_range.is_valid() {
            return Err(PlaybackError::Config(format!(
                "frequency range {}..{} Hz is not increasing and positive",
                self.frequency_range.min_hz, self.frequency_range.max_hz
            )));
        }
        if self.canvas_height <= 0.0 {
            return Err(PlaybackError::Config("canvas height must be positive".into()));
        }
        if self.sample_rate == 0 {
            return Err(PlaybackError::Config("sample rate must be positive".into()));
        }
        let timings = [
            self.min_segment_secs,
            self.release_tail_secs,
            self.pass_padding_secs,
            self.render_tail_secs,
        ];
        if timings.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(PlaybackError::Config("timing values must be finite and non-negative".into()));
        }
        Ok(())
    }
}

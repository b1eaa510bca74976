// A saved sound: the drawing plus everything needed to play it back the same way.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::scheduler::PlaybackRequest;
use crate::shared::{EffectSettings, WaveformKind, WaveformPoint, REFERENCE_BPM};
use crate::Result;

fn default_bpm() -> f64 {
    REFERENCE_BPM
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoundFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub points: Vec<WaveformPoint>,
    #[serde(default)]
    pub waveform: WaveformKind,
    #[serde(default)]
    pub effects: EffectSettings,
    #[serde(default = "default_bpm")]
    pub bpm: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>, // fixed playback length in seconds
}

impl SoundFile {
    pub fn new(points: Vec<WaveformPoint>) -> Self {
        Self {
            name: None,
            points,
            waveform: WaveformKind::default(),
            effects: EffectSettings::default(),
            bpm: REFERENCE_BPM,
            duration: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    // Writes pretty JSON, creating parent directories if they don't exist already
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    // A one-shot request with this sound's settings.
    pub fn to_request(&self) -> PlaybackRequest {
        PlaybackRequest::new(self.points.clone())
            .waveform(self.waveform)
            .effects(self.effects)
            .duration(self.duration)
            .bpm(self.bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sounds").join("wiggle.json");

        let mut sound = SoundFile::new(vec![
            WaveformPoint::new(0.0, 100.0),
            WaveformPoint::new(50.0, 120.0),
            WaveformPoint::new(200.0, 300.0).starting_line(Some(0.25)),
        ]);
        sound.name = Some("wiggle".into());
        sound.waveform = WaveformKind::Square;
        sound.bpm = 90.0;
        sound.save(&path).unwrap();

        assert_eq!(SoundFile::load(&path).unwrap(), sound);
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let json = r#"{ "points": [ { "x": 0, "y": 10 }, { "x": 5, "y": 20, "isNewLine": true, "gapDuration": 0.5 } ] }"#;
        let sound: SoundFile = serde_json::from_str(json).unwrap();
        assert_eq!(sound.waveform, WaveformKind::Sine);
        assert_eq!(sound.bpm, 120.0);
        assert_eq!(sound.effects, EffectSettings::default());
        assert!(sound.points[1].is_new_line);
        assert_eq!(sound.points[1].gap_duration, Some(0.5));
        assert_eq!(sound.points[0].time, 0.0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SoundFile::load(&dir.path().join("nope.json")),
            Err(crate::PlaybackError::Io(_))
        ));
    }
}

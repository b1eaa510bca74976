// The model types that every layer agrees on. The drawing side hands us points,
// a waveform choice and effect settings; everything downstream works on copies.
//
// Field names serialize in camelCase so sound files written by the drawing UI
// (`isNewLine`, `gapDuration`) load without translation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const MIN_PLAYABLE_POINTS: usize = 2;
pub const REFERENCE_BPM: f64 = 120.0;
pub const DEFAULT_CANVAS_HEIGHT: f64 = 400.0;

// One vertex of the drawn polyline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveformPoint {
    pub x: f64, // time proxy, in canvas pixels
    pub y: f64, // pitch proxy, 0 is the top of the canvas
    #[serde(default)]
    pub time: f64, // seconds from sequence start, always recomputed before playback
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_new_line: bool, // pen lift: this point starts a new segment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gap_duration: Option<f64>, // silence before this point, only read on new lines
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl WaveformPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, ..Self::default() }
    }

    // Marks the point as the first vertex of a new segment, optionally preceded by silence.
    pub fn starting_line(mut self, gap_duration: Option<f64>) -> Self {
        self.is_new_line = true;
        self.gap_duration = gap_duration;
        self
    }

    pub fn is_playable(points: &[WaveformPoint]) -> bool {
        points.len() >= MIN_PLAYABLE_POINTS
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformKind {
    #[default]
    Sine,
    Square,
    Triangle,
    Sawtooth,
    // No drawable custom waveforms yet, so this plays as a sine.
    Custom,
}

impl WaveformKind {
    // The oscillator shape actually used for this kind.
    pub fn resolved(self) -> Self {
        match self {
            WaveformKind::Custom => WaveformKind::Sine,
            other => other,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WaveformKind::Sine => "sine",
            WaveformKind::Square => "square",
            WaveformKind::Triangle => "triangle",
            WaveformKind::Sawtooth => "sawtooth",
            WaveformKind::Custom => "custom",
        }
    }
}

impl fmt::Display for WaveformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for WaveformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sine" => Ok(WaveformKind::Sine),
            "square" => Ok(WaveformKind::Square),
            "triangle" => Ok(WaveformKind::Triangle),
            "sawtooth" | "saw" => Ok(WaveformKind::Sawtooth),
            "custom" => Ok(WaveformKind::Custom),
            other => Err(format!("unknown waveform '{other}'")),
        }
    }
}

// The effect knobs as the config panel exposes them. Everything but reverb
// and distortion may be left out; a missing value leaves that stage alone.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectSettings {
    pub reverb: f32,         // 0.0 to 1.0, also drives the decay time
    pub distortion: f32,     // 0.0 to 1.0
    pub filter: Option<f32>, // lowpass cutoff in Hz
    pub delay: Option<f32>,  // 0.0 to 1.0, wet with proportional feedback
    pub chorus: Option<f32>, // 0.0 to 1.0
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self {
            reverb: 0.3,
            distortion: 0.1,
            filter: Some(2000.0),
            delay: Some(0.1),
            chorus: Some(0.1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_waveform_falls_back_to_sine() {
        assert_eq!(WaveformKind::Custom.resolved(), WaveformKind::Sine);
        assert_eq!(WaveformKind::Square.resolved(), WaveformKind::Square);
    }

    #[test]
    fn points_load_from_camel_case_json() {
        let json = r#"[
            {"x": 0, "y": 100, "time": 0},
            {"x": 50, "y": 120, "time": 0, "isNewLine": true, "gapDuration": 0.25}
        ]"#;
        let points: Vec<WaveformPoint> = serde_json::from_str(json).unwrap();
        assert!(!points[0].is_new_line);
        assert!(points[1].is_new_line);
        assert_eq!(points[1].gap_duration, Some(0.25));
    }

    #[test]
    fn partial_effect_settings_keep_defaults() {
        let effects: EffectSettings = serde_json::from_str(r#"{"reverb": 0.8}"#).unwrap();
        assert_eq!(effects.reverb, 0.8);
        assert_eq!(effects.distortion, 0.1);
        assert_eq!(effects.filter, Some(2000.0));
    }

    #[test]
    fn waveform_parses_from_cli_names() {
        assert_eq!("Saw".parse::<WaveformKind>(), Ok(WaveformKind::Sawtooth));
        assert!("noise".parse::<WaveformKind>().is_err());
    }
}

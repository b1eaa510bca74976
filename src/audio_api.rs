use serde::{Deserialize, Serialize};

use crate::shared::{EffectSettings, WaveformKind};

// What the single voice can be told to do. Frequencies change in steps; a
// SetFrequency glides the sounding note without restarting its envelope.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VoiceEvent {
    Attack { frequency: f32 },
    SetFrequency { frequency: f32 },
    Release,
    // Switches oscillator shape and effect settings at a point on the clock,
    // so sequenced sounds each keep their own settings.
    Configure { waveform: WaveformKind, effects: EffectParams },
}

// A voice event pinned to the audio clock, in seconds since the engine started.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledEvent {
    pub at_secs: f64,
    pub event: VoiceEvent,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeSettings {
    pub attack_secs: f32,
    pub decay_secs: f32,
    pub sustain: f32, // level, 0.0 to 1.0
    pub release_secs: f32,
}

impl Default for EnvelopeSettings {
    fn default() -> Self {
        Self {
            attack_secs: 0.05,
            decay_secs: 0.3,
            sustain: 0.6,
            release_secs: 1.0,
        }
    }
}

// Effect-chain parameters in engine units. `None` leaves a stage as it is,
// matching how the panel treats an unset (or zero) knob.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EffectParams {
    pub filter_cutoff_hz: Option<f32>,
    pub chorus_wet: Option<f32>,
    pub delay_wet: Option<f32>,
    pub delay_feedback: Option<f32>,
    pub reverb_decay_secs: f32,
    pub reverb_wet: f32,
    pub distortion: f32,
    pub distortion_wet: f32,
}

impl EffectParams {
    pub fn from_settings(settings: &EffectSettings) -> Self {
        let set = |v: Option<f32>| v.filter(|v| *v > 0.0);
        let delay = set(settings.delay).map(|d| d.clamp(0.0, 1.0));
        Self {
            filter_cutoff_hz: set(settings.filter),
            chorus_wet: set(settings.chorus).map(|c| c.clamp(0.0, 1.0)),
            delay_wet: delay,
            delay_feedback: delay.map(|d| d * 0.6),
            reverb_decay_secs: (settings.reverb * 10.0).max(0.001),
            reverb_wet: settings.reverb.clamp(0.0, 1.0),
            distortion: settings.distortion.clamp(0.0, 1.0),
            distortion_wet: settings.distortion.clamp(0.0, 1.0),
        }
    }
}

#[derive(Clone, Debug)]
pub enum AudioCommand {
    SetEffects(EffectParams),
    SetWaveform(WaveformKind),

    // Queued against the audio clock and applied by the render loop when due
    Schedule(ScheduledEvent),

    // A whole segment at once, so a long line can't overrun the command queue
    ScheduleBatch(Vec<ScheduledEvent>),

    // Release whatever is sounding right now and forget everything queued
    ReleaseNow,

    // Tap the end of the chain; StopCapture hands the frames back to the caller
    StartCapture,
    StopCapture,
}

use std::f32::consts::TAU;

use crate::audio_api::EnvelopeSettings;
use crate::shared::WaveformKind;

const OUTPUT_GAIN: f32 = 0.5; // headroom for the distortion stage
const SILENCE: f32 = 1e-5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnvelopeStage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

// The one and only voice. A new attack takes over whatever is sounding: the
// envelope climbs again from its current level instead of starting a second note.
#[derive(Clone, Debug)]
pub struct MonoVoice {
    sample_rate: f32,
    waveform: WaveformKind,
    frequency: f32,
    phase: f32, // 0.0 to 1.0
    envelope: EnvelopeSettings,
    stage: EnvelopeStage,
    level: f32,
    release_step: f32,
}

impl MonoVoice {
    pub fn new(sample_rate: u32, envelope: EnvelopeSettings) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            waveform: WaveformKind::Sine,
            frequency: 440.0,
            phase: 0.0,
            envelope,
            stage: EnvelopeStage::Idle,
            level: 0.0,
            release_step: 0.0,
        }
    }

    pub fn set_waveform(&mut self, kind: WaveformKind) {
        self.waveform = kind.resolved();
    }

    pub fn waveform(&self) -> WaveformKind {
        self.waveform
    }

    pub fn attack(&mut self, frequency: f32) {
        if self.stage == EnvelopeStage::Idle {
            self.phase = 0.0;
        }
        self.frequency = frequency;
        self.stage = EnvelopeStage::Attack;
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency;
    }

    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    pub fn release(&mut self) {
        if matches!(self.stage, EnvelopeStage::Idle | EnvelopeStage::Release) {
            return;
        }
        self.stage = EnvelopeStage::Release;
        self.release_step = self.level / self.seconds_to_samples(self.envelope.release_secs);
    }

    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Idle
    }

    pub fn next_sample(&mut self) -> f32 {
        if self.stage == EnvelopeStage::Idle {
            return 0.0;
        }
        let out = self.oscillate() * self.advance_envelope() * OUTPUT_GAIN;

        self.phase += self.frequency / self.sample_rate;
        if self.phase >= 1.0 {
            self.phase -= self.phase.floor();
        }
        out
    }

    fn oscillate(&self) -> f32 {
        let p = self.phase;
        match self.waveform {
            WaveformKind::Square => if p < 0.5 { 1.0 } else { -1.0 },
            WaveformKind::Triangle => 4.0 * (p - 0.5).abs() - 1.0,
            WaveformKind::Sawtooth => 2.0 * p - 1.0,
            WaveformKind::Sine | WaveformKind::Custom => (TAU * p).sin(),
        }
    }

    fn advance_envelope(&mut self) -> f32 {
        let env = self.envelope;
        match self.stage {
            EnvelopeStage::Attack => {
                self.level += 1.0 / self.seconds_to_samples(env.attack_secs);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = EnvelopeStage::Decay;
                }
            }
            EnvelopeStage::Decay => {
                self.level -= (1.0 - env.sustain) / self.seconds_to_samples(env.decay_secs);
                if self.level <= env.sustain {
                    self.level = env.sustain;
                    self.stage = EnvelopeStage::Sustain;
                }
            }
            EnvelopeStage::Release => {
                self.level -= self.release_step;
                if self.level <= SILENCE {
                    self.level = 0.0;
                    self.stage = EnvelopeStage::Idle;
                }
            }
            EnvelopeStage::Sustain | EnvelopeStage::Idle => {}
        }
        self.level
    }

    fn seconds_to_samples(&self, secs: f32) -> f32 {
        (secs * self.sample_rate).max(1.0)
    }
}

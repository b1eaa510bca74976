use std::f32::consts::TAU;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

use super::frame::{mix, StereoFrame};
use crate::audio_api::EffectParams;

pub trait Effect: Send {
    fn process(&mut self, buf: &mut [StereoFrame]);
}

// The fixed serial chain every sample goes through on its way out:
// lowpass -> chorus -> delay -> reverb -> distortion.
pub struct EffectChain {
    pub filter: LowPass,
    pub chorus: Chorus,
    pub delay: FeedbackDelay,
    pub reverb: Reverb,
    pub distortion: Distortion,
}

impl EffectChain {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        Self {
            filter: LowPass::new(sr, 2000.0),
            chorus: Chorus::new(sr, 4.0, 0.0025, 0.7, 0.1),
            delay: FeedbackDelay::new(sr, 0.3, 0.4, 0.1),
            reverb: Reverb::new(sr, 2.5, 0.1, 0.3),
            distortion: Distortion::new(0.2, 0.1),
        }
    }

    pub fn apply(&mut self, params: &EffectParams) {
        self.reverb.set_decay(params.reverb_decay_secs);
        self.reverb.wet = params.reverb_wet;
        self.distortion.set_drive(params.distortion);
        self.distortion.wet = params.distortion_wet;
        if let Some(cutoff) = params.filter_cutoff_hz {
            self.filter.set_cutoff(cutoff);
        }
        if let Some(wet) = params.delay_wet {
            self.delay.wet = wet;
        }
        if let Some(feedback) = params.delay_feedback {
            self.delay.set_feedback(feedback);
        }
        if let Some(wet) = params.chorus_wet {
            self.chorus.wet = wet;
        }
    }
}

impl Effect for EffectChain {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        self.filter.process(buf);
        self.chorus.process(buf);
        self.delay.process(buf);
        self.reverb.process(buf);
        self.distortion.process(buf);
    }
}

//lowpass, 12dB/oct
pub struct LowPass {
    sample_rate: f32,
    cutoff: f32,
    left: DirectForm2Transposed<f32>,
    right: DirectForm2Transposed<f32>,
}

const FILTER_Q: f32 = 1.0;

impl LowPass {
    pub fn new(sample_rate: f32, cutoff: f32) -> Self {
        let cutoff = clamp_cutoff(cutoff, sample_rate);
        let coeffs = lowpass_coefficients(sample_rate, cutoff).unwrap_or(PASS_THROUGH);
        Self {
            sample_rate,
            cutoff,
            left: DirectForm2Transposed::<f32>::new(coeffs),
            right: DirectForm2Transposed::<f32>::new(coeffs),
        }
    }

    pub fn set_cutoff(&mut self, cutoff: f32) {
        let cutoff = clamp_cutoff(cutoff, self.sample_rate);
        // keep the old response if the new one can't be built
        if let Some(coeffs) = lowpass_coefficients(self.sample_rate, cutoff) {
            self.left.update_coefficients(coeffs);
            self.right.update_coefficients(coeffs);
            self.cutoff = cutoff;
        }
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff
    }
}

const PASS_THROUGH: Coefficients<f32> = Coefficients { a1: 0.0, a2: 0.0, b0: 1.0, b1: 0.0, b2: 0.0 };

fn clamp_cutoff(cutoff: f32, sample_rate: f32) -> f32 {
    cutoff.clamp(20.0, sample_rate * 0.45)
}

fn lowpass_coefficients(sample_rate: f32, cutoff: f32) -> Option<Coefficients<f32>> {
    Coefficients::<f32>::from_params(Type::LowPass, sample_rate.hz(), cutoff.hz(), FILTER_Q).ok()
}

impl Effect for LowPass {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        for f in buf.iter_mut() {
            f.left = self.left.run(f.left);
            f.right = self.right.run(f.right);
        }
    }
}

//chorus
pub struct Chorus {
    pub wet: f32,
    sample_rate: f32,
    rate_hz: f32,
    base_delay_secs: f32,
    depth: f32,
    lfo_phase: f32,
    buffer: Vec<StereoFrame>,
    write_pos: usize,
}

impl Chorus {
    pub fn new(sample_rate: f32, rate_hz: f32, base_delay_secs: f32, depth: f32, wet: f32) -> Self {
        let max_delay = base_delay_secs * (1.0 + depth);
        let len = (max_delay * sample_rate).ceil() as usize + 2;
        Self {
            wet: wet.clamp(0.0, 1.0),
            sample_rate,
            rate_hz,
            base_delay_secs,
            depth: depth.clamp(0.0, 1.0),
            lfo_phase: 0.0,
            buffer: vec![StereoFrame::zero(); len],
            write_pos: 0,
        }
    }

    fn read(&self, delay_samples: f32, right: bool) -> f32 {
        let len = self.buffer.len() as f32;
        let mut pos = self.write_pos as f32 - delay_samples;
        if pos < 0.0 {
            pos += len;
        }
        let i = pos as usize % self.buffer.len();
        let j = (i + 1) % self.buffer.len();
        let frac = pos - pos.floor();
        let (a, b) = (self.buffer[i], self.buffer[j]);
        if right {
            a.right * (1.0 - frac) + b.right * frac
        } else {
            a.left * (1.0 - frac) + b.left * frac
        }
    }
}

impl Effect for Chorus {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        let base = self.base_delay_secs * self.sample_rate;
        let lfo_inc = self.rate_hz / self.sample_rate;
        for f in buf.iter_mut() {
            self.buffer[self.write_pos] = *f;

            // left and right sweep a quarter cycle apart for some width
            let mod_l = (TAU * self.lfo_phase).sin();
            let mod_r = (TAU * (self.lfo_phase + 0.25)).sin();
            let wet_l = self.read(base * (1.0 + self.depth * mod_l), false);
            let wet_r = self.read(base * (1.0 + self.depth * mod_r), true);

            f.left = mix(f.left, wet_l, self.wet);
            f.right = mix(f.right, wet_r, self.wet);

            self.write_pos = (self.write_pos + 1) % self.buffer.len();
            self.lfo_phase = (self.lfo_phase + lfo_inc).fract();
        }
    }
}

//feedback delay
pub struct FeedbackDelay {
    pub wet: f32,
    feedback: f32,
    buffer: Vec<StereoFrame>,
    pos: usize,
}

impl FeedbackDelay {
    pub fn new(sample_rate: f32, delay_secs: f32, feedback: f32, wet: f32) -> Self {
        let len = ((delay_secs * sample_rate) as usize).max(1);
        Self {
            wet: wet.clamp(0.0, 1.0),
            feedback: feedback.clamp(0.0, 0.95),
            buffer: vec![StereoFrame::zero(); len],
            pos: 0,
        }
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback.clamp(0.0, 0.95);
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }
}

impl Effect for FeedbackDelay {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        for f in buf.iter_mut() {
            let delayed = self.buffer[self.pos];
            self.buffer[self.pos] = StereoFrame {
                left: f.left + delayed.left * self.feedback,
                right: f.right + delayed.right * self.feedback,
            };
            self.pos = (self.pos + 1) % self.buffer.len();
            f.left = mix(f.left, delayed.left, self.wet);
            f.right = mix(f.right, delayed.right, self.wet);
        }
    }
}

//reverb: pre-delay into four damped combs and two allpasses per side
const COMB_TUNING: [usize; 4] = [1116, 1188, 1277, 1356]; // at 44.1kHz
const ALLPASS_TUNING: [usize; 2] = [556, 441];
const STEREO_SPREAD: usize = 23;
const COMB_DAMPING: f32 = 0.2;

struct Comb {
    buffer: Vec<f32>,
    pos: usize,
    feedback: f32,
    store: f32,
}

impl Comb {
    fn new(len: usize) -> Self {
        Self { buffer: vec![0.0; len.max(1)], pos: 0, feedback: 0.0, store: 0.0 }
    }

    fn set_decay(&mut self, decay_secs: f32, sample_rate: f32) {
        // feedback that makes this comb fall by 60dB over the decay time
        let loop_secs = self.buffer.len() as f32 / sample_rate;
        self.feedback = 10f32.powf(-3.0 * loop_secs / decay_secs.max(0.001)).min(0.98);
    }

    fn process(&mut self, input: f32) -> f32 {
        let out = self.buffer[self.pos];
        self.store = out * (1.0 - COMB_DAMPING) + self.store * COMB_DAMPING;
        self.buffer[self.pos] = input + self.store * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();
        out
    }
}

struct AllPass {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllPass {
    fn new(len: usize) -> Self {
        Self { buffer: vec![0.0; len.max(1)], pos: 0 }
    }

    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        self.buffer[self.pos] = input + buffered * 0.5;
        self.pos = (self.pos + 1) % self.buffer.len();
        buffered - input
    }
}

struct ReverbChannel {
    combs: Vec<Comb>,
    allpasses: Vec<AllPass>,
}

impl ReverbChannel {
    fn new(sample_rate: f32, spread: usize) -> Self {
        let scale = |n: usize| ((n + spread) as f32 * sample_rate / 44100.0) as usize;
        Self {
            combs: COMB_TUNING.iter().map(|&n| Comb::new(scale(n))).collect(),
            allpasses: ALLPASS_TUNING.iter().map(|&n| AllPass::new(scale(n))).collect(),
        }
    }

    fn process(&mut self, input: f32) -> f32 {
        let mut out = self.combs.iter_mut().map(|c| c.process(input)).sum::<f32>() * 0.25;
        for ap in &mut self.allpasses {
            out = ap.process(out);
        }
        out
    }
}

pub struct Reverb {
    pub wet: f32,
    sample_rate: f32,
    decay_secs: f32,
    pre_delay: Vec<StereoFrame>,
    pre_pos: usize,
    left: ReverbChannel,
    right: ReverbChannel,
}

impl Reverb {
    pub fn new(sample_rate: f32, decay_secs: f32, pre_delay_secs: f32, wet: f32) -> Self {
        let mut reverb = Self {
            wet: wet.clamp(0.0, 1.0),
            sample_rate,
            decay_secs,
            pre_delay: vec![StereoFrame::zero(); ((pre_delay_secs * sample_rate) as usize).max(1)],
            pre_pos: 0,
            left: ReverbChannel::new(sample_rate, 0),
            right: ReverbChannel::new(sample_rate, STEREO_SPREAD),
        };
        reverb.set_decay(decay_secs);
        reverb
    }

    pub fn set_decay(&mut self, decay_secs: f32) {
        self.decay_secs = decay_secs.max(0.001);
        for comb in self.left.combs.iter_mut().chain(self.right.combs.iter_mut()) {
            comb.set_decay(self.decay_secs, self.sample_rate);
        }
    }

    pub fn decay_secs(&self) -> f32 {
        self.decay_secs
    }
}

impl Effect for Reverb {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        for f in buf.iter_mut() {
            let delayed = self.pre_delay[self.pre_pos];
            self.pre_delay[self.pre_pos] = *f;
            self.pre_pos = (self.pre_pos + 1) % self.pre_delay.len();

            let wet_l = self.left.process(delayed.left);
            let wet_r = self.right.process(delayed.right);
            f.left = mix(f.left, wet_l, self.wet);
            f.right = mix(f.right, wet_r, self.wet);
        }
    }
}

//distortion
pub struct Distortion {
    pub wet: f32,
    drive: f32,
}

impl Distortion {
    pub fn new(drive: f32, wet: f32) -> Self {
        Self {
            wet: wet.clamp(0.0, 1.0),
            drive: drive.clamp(0.0, 1.0),
        }
    }

    pub fn set_drive(&mut self, drive: f32) {
        self.drive = drive.clamp(0.0, 1.0);
    }
}

impl Effect for Distortion {
    fn process(&mut self, buf: &mut [StereoFrame]) {
        let pre_gain = 1.0 + self.drive * 10.0;
        for f in buf.iter_mut() {
            let l = (pre_gain * f.left.clamp(-1.0, 1.0)).tanh();
            let r = (pre_gain * f.right.clamp(-1.0, 1.0)).tanh();
            f.left = mix(f.left, l, self.wet);
            f.right = mix(f.right, r, self.wet);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::EffectSettings;

    const RATE: f32 = 44100.0;

    fn impulse(len: usize) -> Vec<StereoFrame> {
        let mut buf = vec![StereoFrame::zero(); len];
        buf[0] = StereoFrame::mono(1.0);
        buf
    }

    #[test]
    fn fully_wet_delay_repeats_an_impulse() {
        let mut delay = FeedbackDelay::new(8.0, 0.5, 0.0, 1.0);
        let mut buf = impulse(8);
        delay.process(&mut buf);
        assert_eq!(buf[0].left, 0.0);
        assert_eq!(buf[4].left, 1.0);
    }

    #[test]
    fn lowpass_settles_on_dc() {
        let mut lp = LowPass::new(RATE, 500.0);
        let mut buf = vec![StereoFrame::mono(1.0); 4096];
        lp.process(&mut buf);
        assert!((buf[4095].left - 1.0).abs() < 0.01);
    }

    #[test]
    fn lowpass_cutoff_is_kept_below_nyquist() {
        let mut lp = LowPass::new(RATE, 2000.0);
        lp.set_cutoff(90_000.0);
        assert!(lp.cutoff() < RATE / 2.0);
        lp.set_cutoff(1.0);
        assert_eq!(lp.cutoff(), 20.0);
    }

    #[test]
    fn dry_effects_pass_signal_through() {
        let mut chorus = Chorus::new(RATE, 4.0, 0.0025, 0.7, 0.0);
        let mut reverb = Reverb::new(RATE, 1.0, 0.1, 0.0);
        let mut distortion = Distortion::new(1.0, 0.0);
        let input: Vec<_> = (0..256).map(|i| StereoFrame::mono((i as f32 * 0.1).sin() * 0.5)).collect();
        let mut buf = input.clone();
        chorus.process(&mut buf);
        reverb.process(&mut buf);
        distortion.process(&mut buf);
        assert_eq!(buf, input);
    }

    #[test]
    fn reverb_tail_rings_after_the_input_stops() {
        let mut reverb = Reverb::new(RATE, 2.0, 0.01, 1.0);
        let mut buf = impulse(RATE as usize / 2);
        reverb.process(&mut buf);
        let tail_energy: f32 = buf[RATE as usize / 4..].iter().map(|f| f.left.abs()).sum();
        assert!(tail_energy > 0.0);
        assert!(buf.iter().all(|f| f.left.is_finite() && f.left.abs() < 2.0));
    }

    #[test]
    fn longer_decay_means_more_comb_feedback() {
        let mut short = Comb::new(1000);
        let mut long = Comb::new(1000);
        short.set_decay(0.5, RATE);
        long.set_decay(5.0, RATE);
        assert!(long.feedback > short.feedback);
    }

    #[test]
    fn chain_takes_panel_values() {
        let mut chain = EffectChain::new(44100);
        chain.apply(&EffectParams::from_settings(&EffectSettings {
            reverb: 0.5,
            distortion: 0.0,
            filter: Some(800.0),
            delay: Some(0.5),
            chorus: Some(0.25),
        }));
        assert_eq!(chain.reverb.decay_secs(), 5.0);
        assert_eq!(chain.filter.cutoff(), 800.0);
        assert!((chain.delay.feedback() - 0.3).abs() < 1e-6);
        assert_eq!(chain.chorus.wet, 0.25);
        assert_eq!(chain.distortion.wet, 0.0);
    }

    #[test]
    fn unset_knobs_leave_stages_alone() {
        let mut chain = EffectChain::new(44100);
        chain.apply(&EffectParams::from_settings(&EffectSettings {
            filter: None,
            delay: None,
            chorus: None,
            ..EffectSettings::default()
        }));
        assert_eq!(chain.filter.cutoff(), 2000.0);
        assert!((chain.delay.feedback() - 0.4).abs() < 1e-6);
        assert_eq!(chain.chorus.wet, 0.1);
    }
}

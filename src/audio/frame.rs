// The smallest unit of audio; one stereo frame
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn zero() -> Self { // just giving `default` a better name for clarity
        Self::default()
    }

    pub fn mono(sample: f32) -> Self {
        Self { left: sample, right: sample }
    }

    // Write into one interleaved device frame of any channel count
    pub fn write_interleaved(&self, out: &mut [f32]) {
        match out {
            [] => {}
            [only] => *only = 0.5 * (self.left + self.right),
            [left, right, rest @ ..] => {
                *left = self.left;
                *right = self.right;
                rest.iter_mut().for_each(|s| *s = 0.0);
            }
        }
    }
}

#[inline]
pub fn mix(dry: f32, wet_signal: f32, wet: f32) -> f32 {
    dry * (1.0 - wet) + wet_signal * wet
}

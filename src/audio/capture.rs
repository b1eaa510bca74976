use std::io::Cursor;

use super::frame::StereoFrame;
use crate::Result;

// Whatever came out of the end of the chain while capture was on.
#[derive(Clone, Debug, Default)]
pub struct CapturedAudio {
    pub sample_rate: u32,
    pub frames: Vec<StereoFrame>,
}

impl CapturedAudio {
    pub const CHANNELS: u16 = 2;

    pub fn duration_secs(&self) -> f64 {
        self.frames.len() as f64 / self.sample_rate.max(1) as f64
    }

    // Wrap the raw capture in a 32-bit float WAV. This is the container the
    // renderer decodes from, and what it hands out if conversion goes wrong.
    pub fn to_container(&self) -> Result<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: Self::CHANNELS,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for f in &self.frames {
                writer.write_sample(f.left)?;
                writer.write_sample(f.right)?;
            }
            writer.finalize()?;
        }
        Ok(cursor.into_inner())
    }
}

// Planar float PCM, one Vec per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedPcm {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl DecodedPcm {
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Decode a WAV container into planar floats. The reader only lives for the
// duration of this call, so it is closed on every exit path.
pub fn decode_container(bytes: &[u8]) -> Result<DecodedPcm> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let n_channels = spec.channels.max(1) as usize;

    // Read the samples from the WAV data
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader // float, just pass it through
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => { // int, convert to float
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|x| x as f32 / max))
                .collect::<std::result::Result<Vec<_>, _>>()?
        }
    };

    let mut channels = vec![Vec::with_capacity(samples.len() / n_channels); n_channels];
    for frame in samples.chunks_exact(n_channels) {
        for (channel, sample) in channels.iter_mut().zip(frame) {
            channel.push(*sample);
        }
    }

    Ok(DecodedPcm {
        sample_rate: spec.sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_decodes_back_to_the_capture() {
        let captured = CapturedAudio {
            sample_rate: 22050,
            frames: (0..100)
                .map(|i| StereoFrame { left: i as f32 / 100.0, right: -(i as f32) / 100.0 })
                .collect(),
        };
        let bytes = captured.to_container().unwrap();
        let decoded = decode_container(&bytes).unwrap();

        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.channels.len(), 2);
        assert_eq!(decoded.len(), 100);
        assert_eq!(decoded.channels[0][37], 0.37);
        assert_eq!(decoded.channels[1][37], -0.37);
    }

    #[test]
    fn integer_wavs_decode_to_unit_floats() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [0i16, 16384, -32768] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }

        let decoded = decode_container(&cursor.into_inner()).unwrap();
        assert_eq!(decoded.channels, vec![vec![0.0, 0.5, -1.0]]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(decode_container(b"definitely not a wav file").is_err());
    }

    #[test]
    fn duration_follows_the_frame_count() {
        let captured = CapturedAudio { sample_rate: 1000, frames: vec![StereoFrame::zero(); 2500] };
        assert_eq!(captured.duration_secs(), 2.5);
    }
}

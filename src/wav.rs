// Canonical 16-bit PCM WAV encoding.
//
// The header is written by hand rather than through a streaming writer so
// the layout is always the plain 44-byte `RIFF`/`fmt `/`data` form that every
// player accepts, with chunk sizes matching the payload exactly.

pub const HEADER_LEN: usize = 44;

const BITS_PER_SAMPLE: u16 = 16;
const FORMAT_PCM: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

// Clamps to [-1, 1] and scales asymmetrically so both -1.0 and 1.0 hit the
// ends of the i16 range. Truncates toward zero.
pub fn float_to_pcm16(sample: f32) -> i16 {
    let s = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

// Interleaves planar float channels into a complete WAV file. Channels
// shorter than the longest one are padded with silence.
pub fn encode_wav_pcm16(channels: &[Vec<f32>], sample_rate: u32) -> Vec<u8> {
    let n_channels = channels.len() as u16;
    let n_frames = channels.iter().map(Vec::len).max().unwrap_or(0);

    let block_align = n_channels * (BITS_PER_SAMPLE / 8);
    let byte_rate = sample_rate * block_align as u32;
    let data_len = (n_frames * block_align as usize) as u32;

    let mut out = Vec::with_capacity(HEADER_LEN + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(data_len + HEADER_LEN as u32 - 8).to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&FMT_CHUNK_LEN.to_le_bytes());
    out.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    out.extend_from_slice(&n_channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());

    for i in 0..n_frames {
        for channel in channels {
            let sample = channel.get(i).copied().unwrap_or(0.0);
            out.extend_from_slice(&float_to_pcm16(sample).to_le_bytes());
        }
    }

    out
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use log::info;

use crate::audio_api::{AudioCommand, EnvelopeSettings};
use crate::{PlaybackError, Result};

mod capture;
mod effect;
mod engine;
mod frame;
mod offline;
mod voice;

pub use capture::{decode_container, CapturedAudio, DecodedPcm};
pub use effect::{Effect, EffectChain};
pub use engine::Engine;
pub use frame::StereoFrame;
pub use offline::OfflineBackend;
pub use voice::{EnvelopeStage, MonoVoice};

// Where the synth's commands go and where its audio clock comes from.
pub trait AudioBackend {
    fn send(&mut self, cmd: AudioCommand) -> Result<()>;

    // Seconds on the audio clock; scheduled events are relative to this.
    fn now_secs(&self) -> f64;

    fn sample_rate(&self) -> u32;

    // Let `duration` worth of audio play out.
    fn wait(&mut self, duration: Duration);

    // The capture finished by the last `StopCapture`, if it has arrived.
    fn take_capture(&mut self) -> Option<CapturedAudio>;
}

// Live output through the default cpal device.
pub struct AudioHandle {
    tx: Sender<AudioCommand>,
    completed_rx: Receiver<CapturedAudio>,
    clock: Arc<AtomicU64>,
    sample_rate: u32,
    _output_stream: cpal::Stream,
}

const CAPTURE_HANDOFF_TIMEOUT: Duration = Duration::from_secs(2);
const COMMAND_SEND_TIMEOUT: Duration = Duration::from_millis(100);

impl AudioBackend for AudioHandle {
    fn send(&mut self, cmd: AudioCommand) -> Result<()> {
        send_command(&self.tx, cmd)
    }

    fn now_secs(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn wait(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn take_capture(&mut self) -> Option<CapturedAudio> {
        self.completed_rx.recv_timeout(CAPTURE_HANDOFF_TIMEOUT).ok()
    }
}

// Waits briefly for the callback to drain a full queue, then gives up loudly.
fn send_command(tx: &Sender<AudioCommand>, cmd: AudioCommand) -> Result<()> {
    tx.send_timeout(cmd, COMMAND_SEND_TIMEOUT).map_err(|_| PlaybackError::QueueFull)
}

pub fn start_audio(envelope: EnvelopeSettings) -> anyhow::Result<AudioHandle> {
    let (tx, rx) = crossbeam_channel::bounded::<AudioCommand>(1024);
    let (completed_tx, completed_rx) = crossbeam_channel::bounded::<CapturedAudio>(4);

    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let config = device.default_output_config().context("no default output config")?;

    let sample_rate: u32 = config.sample_rate();
    let channels = config.channels() as usize;
    let clock = Arc::new(AtomicU64::new(0));

    match config.sample_format() {
        cpal::SampleFormat::F32 => {
            let mut engine = Engine::new(sample_rate, envelope, clock.clone());
            engine.set_completed_tx(completed_tx);

            let output_stream = build_output_stream_f32(&device, &config.into(), rx, engine, channels)?;
            output_stream.play().context("failed to play output stream")?;
            info!("audio output running at {sample_rate} Hz, {channels} channel(s)");

            Ok(AudioHandle {
                tx,
                completed_rx,
                clock,
                sample_rate,
                _output_stream: output_stream,
            })
        }
        other => anyhow::bail!("unsupported sample format {other:?} (only f32 supported for now)"),
    }
}

// ── Output stream ─────────────────────────────────────────────────

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    rx: Receiver<AudioCommand>,
    mut engine: Engine,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let err_fn = |err| log::error!("audio output stream error: {err}");
    let mut block: Vec<StereoFrame> = Vec::with_capacity(4096);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
            while let Ok(cmd) = rx.try_recv() { // set up command handling
                engine.handle_cmd(cmd);
            }

            let n_frames = data.len() / channels.max(1);
            block.resize(n_frames, StereoFrame::zero());
            engine.render_block(&mut block);

            for (out, frame) in data.chunks_exact_mut(channels.max(1)).zip(&block) {
                frame.write_interleaved(out);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_is_an_error_not_a_silent_drop() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        send_command(&tx, AudioCommand::ReleaseNow).unwrap();
        assert!(matches!(send_command(&tx, AudioCommand::StartCapture), Err(PlaybackError::QueueFull)));

        rx.try_recv().unwrap();
        send_command(&tx, AudioCommand::StopCapture).unwrap();
    }

    #[test]
    fn disconnected_queue_is_an_error() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        drop(rx);
        assert!(send_command(&tx, AudioCommand::ReleaseNow).is_err());
    }
}

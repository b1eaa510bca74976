use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use super::capture::CapturedAudio;
use super::engine::Engine;
use super::frame::StereoFrame;
use super::AudioBackend;
use crate::audio_api::{AudioCommand, EnvelopeSettings};
use crate::Result;

const BLOCK_FRAMES: usize = 512;

// Runs the engine in-process with no device attached. "Waiting" renders the
// audio as fast as the CPU allows, so the audio clock only moves when asked.
pub struct OfflineBackend {
    engine: Engine,
    block: Vec<StereoFrame>,
}

impl OfflineBackend {
    pub fn new(sample_rate: u32, envelope: EnvelopeSettings) -> Self {
        Self {
            engine: Engine::new(sample_rate, envelope, Arc::new(AtomicU64::new(0))),
            block: vec![StereoFrame::zero(); BLOCK_FRAMES],
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn render_frames(&mut self, mut frames: usize) {
        while frames > 0 {
            let n = frames.min(BLOCK_FRAMES);
            self.engine.render_block(&mut self.block[..n]);
            frames -= n;
        }
    }
}

impl AudioBackend for OfflineBackend {
    fn send(&mut self, cmd: AudioCommand) -> Result<()> {
        self.engine.handle_cmd(cmd);
        Ok(())
    }

    fn now_secs(&self) -> f64 {
        self.engine.now_secs()
    }

    fn sample_rate(&self) -> u32 {
        self.engine.sample_rate()
    }

    fn wait(&mut self, duration: Duration) {
        let frames = (duration.as_secs_f64() * self.engine.sample_rate() as f64).ceil() as usize;
        self.render_frames(frames);
    }

    fn take_capture(&mut self) -> Option<CapturedAudio> {
        self.engine.take_completed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_api::{ScheduledEvent, VoiceEvent};

    #[test]
    fn waiting_advances_the_audio_clock() {
        let mut backend = OfflineBackend::new(8000, EnvelopeSettings::default());
        backend.wait(Duration::from_millis(250));
        assert_eq!(backend.engine().now_frames(), 2000);
        assert_eq!(backend.now_secs(), 0.25);
    }

    #[test]
    fn capture_round_trip() {
        let mut backend = OfflineBackend::new(8000, EnvelopeSettings::default());
        backend.send(AudioCommand::StartCapture).unwrap();
        backend.send(AudioCommand::Schedule(ScheduledEvent {
            at_secs: 0.0,
            event: VoiceEvent::Attack { frequency: 200.0 },
        }))
        .unwrap();
        backend.wait(Duration::from_secs(1));
        backend.send(AudioCommand::StopCapture).unwrap();

        let captured = backend.take_capture().unwrap();
        assert_eq!(captured.frames.len(), 8000);
        assert!(backend.take_capture().is_none());
    }
}

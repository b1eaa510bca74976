use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;

use super::capture::CapturedAudio;
use super::effect::{Effect, EffectChain};
use super::frame::StereoFrame;
use super::voice::MonoVoice;
use crate::audio_api::{AudioCommand, EnvelopeSettings, ScheduledEvent, VoiceEvent};

const QUEUE_CAPACITY: usize = 4096; // reserve up front so scheduling rarely allocates in the callback

#[derive(Clone, Copy, Debug)]
struct QueuedEvent {
    at_frame: u64,
    event: VoiceEvent,
}

// Renders the voice through the effect chain. Lives wherever audio is pulled
// from: the cpal callback for live output, or the offline backend.
pub struct Engine {
    sample_rate: u32,
    clock: Arc<AtomicU64>, // frames rendered so far; the audio clock
    voice: MonoVoice,
    chain: EffectChain,
    queue: VecDeque<QueuedEvent>, // sorted by frame
    capture: Option<Vec<StereoFrame>>,
    completed: Option<CapturedAudio>,
    completed_tx: Option<Sender<CapturedAudio>>,
}

impl Engine {
    pub fn new(sample_rate: u32, envelope: EnvelopeSettings, clock: Arc<AtomicU64>) -> Self {
        Self {
            sample_rate,
            clock,
            voice: MonoVoice::new(sample_rate, envelope),
            chain: EffectChain::new(sample_rate),
            queue: VecDeque::with_capacity(QUEUE_CAPACITY),
            capture: None,
            completed: None,
            completed_tx: None,
        }
    }

    // Finished captures go here instead of waiting in `take_completed`
    pub fn set_completed_tx(&mut self, tx: Sender<CapturedAudio>) {
        self.completed_tx = Some(tx);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn now_frames(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    pub fn now_secs(&self) -> f64 {
        self.now_frames() as f64 / self.sample_rate as f64
    }

    pub fn voice(&self) -> &MonoVoice {
        &self.voice
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    pub fn handle_cmd(&mut self, cmd: AudioCommand) {
        match cmd {
            AudioCommand::SetEffects(params) => self.chain.apply(&params),
            AudioCommand::SetWaveform(kind) => self.voice.set_waveform(kind),
            AudioCommand::Schedule(event) => self.schedule(event),
            AudioCommand::ScheduleBatch(events) => events.into_iter().for_each(|e| self.schedule(e)),
            AudioCommand::ReleaseNow => {
                self.queue.clear();
                self.voice.release();
            }
            AudioCommand::StartCapture => self.capture = Some(Vec::new()),
            AudioCommand::StopCapture => self.stop_capture(),
        }
    }

    fn schedule(&mut self, event: ScheduledEvent) {
        let at_frame = (event.at_secs.max(0.0) * self.sample_rate as f64).round() as u64;
        // after any event already queued for the same frame, so order of arrival wins ties
        let idx = self.queue.partition_point(|q| q.at_frame <= at_frame);
        self.queue.insert(idx, QueuedEvent { at_frame, event: event.event });
    }

    fn stop_capture(&mut self) {
        let Some(frames) = self.capture.take() else {
            return;
        };
        let captured = CapturedAudio {
            sample_rate: self.sample_rate,
            frames,
        };
        match &self.completed_tx {
            Some(tx) => {
                let _ = tx.try_send(captured);
            }
            None => self.completed = Some(captured),
        }
    }

    pub fn take_completed(&mut self) -> Option<CapturedAudio> {
        self.completed.take()
    }

    pub fn render_block(&mut self, out: &mut [StereoFrame]) {
        let start = self.now_frames();

        for (i, frame) in out.iter_mut().enumerate() {
            let now = start + i as u64;
            while let Some(next) = self.queue.front() {
                if next.at_frame > now {
                    break;
                }
                let event = next.event;
                self.queue.pop_front();
                self.apply(event);
            }
            *frame = StereoFrame::mono(self.voice.next_sample());
        }

        self.chain.process(out);

        if let Some(capture) = self.capture.as_mut() {
            capture.extend_from_slice(out);
        }
        self.clock.store(start + out.len() as u64, Ordering::Release);
    }

    fn apply(&mut self, event: VoiceEvent) {
        match event {
            VoiceEvent::Attack { frequency } => self.voice.attack(frequency),
            VoiceEvent::SetFrequency { frequency } => self.voice.set_frequency(frequency),
            VoiceEvent::Release => self.voice.release(),
            VoiceEvent::Configure { waveform, effects } => {
                self.voice.set_waveform(waveform);
                self.chain.apply(&effects);
            }
        }
    }
}

// The control-side face of the synthesizer: one voice, one effect chain,
// started lazily on first use.
//
// Construction failures never escape as panics. The engine logs the failure,
// goes inert, and every later operation reports
// `PlaybackError::EngineUnavailable` so callers can decide what to do.

use std::time::Duration;

use log::{debug, error, info, warn};

use crate::audio::{self, AudioBackend, CapturedAudio, OfflineBackend};
use crate::audio_api::{AudioCommand, EffectParams, ScheduledEvent, VoiceEvent};
use crate::config::EngineConfig;
use crate::mapping::map_to_frequency;
use crate::segment::LineSegment;
use crate::shared::{EffectSettings, WaveformKind};
use crate::{PlaybackError, Result};

pub type BackendFactory = Box<dyn FnMut() -> anyhow::Result<Box<dyn AudioBackend>>>;

enum Lifecycle {
    Uninitialized,
    Ready(Box<dyn AudioBackend>),
    Failed(String),
}

pub struct SynthEngine {
    config: EngineConfig,
    factory: BackendFactory,
    lifecycle: Lifecycle,
}

impl SynthEngine {
    pub fn new(config: EngineConfig, factory: BackendFactory) -> Self {
        Self {
            config,
            factory,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    // Plays through the default output device.
    pub fn live(config: EngineConfig) -> Self {
        let envelope = config.envelope;
        Self::new(
            config,
            Box::new(move || -> anyhow::Result<Box<dyn AudioBackend>> {
                let handle = audio::start_audio(envelope)?;
                Ok(Box::new(handle))
            }),
        )
    }

    // Renders in-process at the configured sample rate, no device needed.
    pub fn offline(config: EngineConfig) -> Self {
        let (sample_rate, envelope) = (config.sample_rate, config.envelope);
        Self::new(
            config,
            Box::new(move || -> anyhow::Result<Box<dyn AudioBackend>> {
                Ok(Box::new(OfflineBackend::new(sample_rate, envelope)))
            }),
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Ready(_))
    }

    // Builds the backend on first call; a no-op afterwards.
    pub fn ensure_ready(&mut self) -> Result<()> {
        match &self.lifecycle {
            Lifecycle::Ready(_) => Ok(()),
            Lifecycle::Failed(reason) => Err(PlaybackError::EngineUnavailable(reason.clone())),
            Lifecycle::Uninitialized => match (self.factory)() {
                Ok(backend) => {
                    info!("audio engine initialized with effects chain at {} Hz", backend.sample_rate());
                    self.lifecycle = Lifecycle::Ready(backend);
                    Ok(())
                }
                Err(err) => {
                    let reason = format!("{err:#}");
                    error!("failed to initialize audio engine: {reason}");
                    self.lifecycle = Lifecycle::Failed(reason.clone());
                    Err(PlaybackError::EngineUnavailable(reason))
                }
            },
        }
    }

    fn backend(&mut self) -> Result<&mut dyn AudioBackend> {
        self.ensure_ready()?;
        match &mut self.lifecycle {
            Lifecycle::Ready(backend) => Ok(backend.as_mut()),
            Lifecycle::Failed(reason) => Err(PlaybackError::EngineUnavailable(reason.clone())),
            Lifecycle::Uninitialized => Err(PlaybackError::EngineUnavailable("not initialized".into())),
        }
    }

    pub fn configure_effects(&mut self, settings: &EffectSettings) -> Result<()> {
        let params = EffectParams::from_settings(settings);
        debug!("applying effects: {settings:?} -> {params:?}");
        self.backend()?.send(AudioCommand::SetEffects(params))
    }

    pub fn set_waveform(&mut self, kind: WaveformKind) -> Result<()> {
        if kind == WaveformKind::Custom {
            debug!("custom waveform requested, playing it as sine");
        }
        self.backend()?.send(AudioCommand::SetWaveform(kind.resolved()))
    }

    // Waveform and effects that take over at `at_secs` on the audio clock
    // rather than right away.
    pub fn configure_at(&mut self, at_secs: f64, kind: WaveformKind, settings: &EffectSettings) -> Result<()> {
        let event = VoiceEvent::Configure {
            waveform: kind.resolved(),
            effects: EffectParams::from_settings(settings),
        };
        self.backend()?.send(AudioCommand::Schedule(ScheduledEvent { at_secs, event }))
    }

    // Queues one segment as a single note: attack on the first point, a
    // frequency step on every later point, release shortly after the last.
    // Returns false when the segment is too short or too small to play.
    pub fn trigger_segment(&mut self, segment: &LineSegment, origin_secs: f64) -> Result<bool> {
        let (Some(start), Some(end)) = (segment.first(), segment.last()) else {
            return Ok(false);
        };
        if !segment.is_audible() || segment.span_secs() < self.config.min_segment_secs {
            return Ok(false);
        }

        let (range, height) = (self.config.frequency_range, self.config.canvas_height);
        let release_at = origin_secs + end.time + self.config.release_tail_secs;
        let frequency = |y: f64| map_to_frequency(y, height, range) as f32;

        let mut events = Vec::with_capacity(segment.points.len() + 1);
        events.push(ScheduledEvent {
            at_secs: origin_secs + start.time,
            event: VoiceEvent::Attack { frequency: frequency(start.y) },
        });
        events.extend(segment.points[1..].iter().map(|point| ScheduledEvent {
            at_secs: origin_secs + point.time,
            event: VoiceEvent::SetFrequency { frequency: frequency(point.y) },
        }));
        events.push(ScheduledEvent {
            at_secs: release_at,
            event: VoiceEvent::Release,
        });

        self.backend()?.send(AudioCommand::ScheduleBatch(events))?;
        Ok(true)
    }

    // Releases whatever is sounding and drops anything still queued.
    // Does nothing if the engine never started.
    pub fn stop(&mut self) {
        if let Lifecycle::Ready(backend) = &mut self.lifecycle {
            if let Err(err) = backend.send(AudioCommand::ReleaseNow) {
                warn!("could not release the voice: {err}");
            }
        }
    }

    // Lets go of the backend (and the device with it). The next use starts
    // a fresh one. Safe to call any number of times.
    pub fn dispose(&mut self) {
        if let Lifecycle::Ready(backend) = &mut self.lifecycle {
            if let Err(err) = backend.send(AudioCommand::ReleaseNow) {
                warn!("could not release the voice while disposing: {err}");
            }
            info!("audio engine disposed");
        }
        if !matches!(self.lifecycle, Lifecycle::Failed(_)) {
            self.lifecycle = Lifecycle::Uninitialized;
        }
    }

    pub fn now_secs(&mut self) -> Result<f64> {
        Ok(self.backend()?.now_secs())
    }

    pub fn start_capture(&mut self) -> Result<()> {
        self.backend()?.send(AudioCommand::StartCapture)
    }

    pub fn finish_capture(&mut self) -> Result<CapturedAudio> {
        let backend = self.backend()?;
        backend.send(AudioCommand::StopCapture)?;
        backend.take_capture().ok_or(PlaybackError::NothingCaptured)
    }

    pub fn wait(&mut self, duration: Duration) -> Result<()> {
        self.backend()?.wait(duration);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::calculate_time_values;
    use crate::segment::split_segments;
    use crate::shared::WaveformPoint;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<AudioCommand>>>;

    struct RecordingBackend {
        log: Log,
    }

    impl AudioBackend for RecordingBackend {
        fn send(&mut self, cmd: AudioCommand) -> Result<()> {
            self.log.borrow_mut().push(cmd);
            Ok(())
        }
        fn now_secs(&self) -> f64 {
            10.0
        }
        fn sample_rate(&self) -> u32 {
            1000
        }
        fn wait(&mut self, _duration: Duration) {}
        fn take_capture(&mut self) -> Option<CapturedAudio> {
            None
        }
    }

    fn recording_engine() -> (SynthEngine, Log) {
        let log: Log = Rc::default();
        let factory_log = log.clone();
        let engine = SynthEngine::new(
            EngineConfig::default(),
            Box::new(move || -> anyhow::Result<Box<dyn AudioBackend>> {
                Ok(Box::new(RecordingBackend { log: factory_log.clone() }))
            }),
        );
        (engine, log)
    }

    fn failing_engine(attempts: Rc<Cell<u32>>) -> SynthEngine {
        SynthEngine::new(
            EngineConfig::default(),
            Box::new(move || -> anyhow::Result<Box<dyn AudioBackend>> {
                attempts.set(attempts.get() + 1);
                anyhow::bail!("no default output device")
            }),
        )
    }

    fn scheduled(log: &Log) -> Vec<ScheduledEvent> {
        log.borrow()
            .iter()
            .flat_map(|c| match c {
                AudioCommand::Schedule(e) => vec![*e],
                AudioCommand::ScheduleBatch(events) => events.clone(),
                _ => Vec::new(),
            })
            .collect()
    }

    #[test]
    fn segment_becomes_attack_glides_and_release() {
        let (mut engine, log) = recording_engine();
        let points = calculate_time_values(
            &[
                WaveformPoint::new(0.0, 400.0),
                WaveformPoint::new(100.0, 200.0),
                WaveformPoint::new(300.0, 0.0),
            ],
            None,
            120.0,
        );
        let segment = &split_segments(&points)[0];
        assert!(engine.trigger_segment(segment, 1.0).unwrap());

        let events = scheduled(&log);
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].at_secs, 1.0);
        assert_eq!(events[0].event, VoiceEvent::Attack { frequency: 110.0 });
        assert!(matches!(events[1].event, VoiceEvent::SetFrequency { .. }));
        assert_eq!(events[2].event, VoiceEvent::SetFrequency { frequency: 880.0 });
        assert!((events[3].at_secs - 1.4).abs() < 1e-9);
        assert_eq!(events[3].event, VoiceEvent::Release);
    }

    #[test]
    fn long_lines_go_out_as_one_command() {
        let (mut engine, log) = recording_engine();
        let drawn: Vec<_> = (0..1100).map(|i| WaveformPoint::new(i as f64, (i % 400) as f64)).collect();
        let points = calculate_time_values(&drawn, None, 120.0);
        assert!(engine.trigger_segment(&split_segments(&points)[0], 0.0).unwrap());

        let log = log.borrow();
        assert_eq!(log.len(), 1);
        let AudioCommand::ScheduleBatch(events) = &log[0] else {
            panic!("expected a single batch");
        };
        assert_eq!(events.len(), 1101);
        assert_eq!(events[1100].event, VoiceEvent::Release);
    }

    #[test]
    fn rejected_commands_are_reported() {
        struct FullBackend;
        impl AudioBackend for FullBackend {
            fn send(&mut self, _cmd: AudioCommand) -> Result<()> {
                Err(PlaybackError::QueueFull)
            }
            fn now_secs(&self) -> f64 {
                0.0
            }
            fn sample_rate(&self) -> u32 {
                1000
            }
            fn wait(&mut self, _duration: Duration) {}
            fn take_capture(&mut self) -> Option<CapturedAudio> {
                None
            }
        }

        let mut engine = SynthEngine::new(
            EngineConfig::default(),
            Box::new(|| -> anyhow::Result<Box<dyn AudioBackend>> { Ok(Box::new(FullBackend)) }),
        );
        let points = calculate_time_values(&[WaveformPoint::new(0.0, 0.0), WaveformPoint::new(300.0, 0.0)], None, 120.0);
        assert!(matches!(
            engine.trigger_segment(&split_segments(&points)[0], 0.0),
            Err(PlaybackError::QueueFull)
        ));
        assert!(engine.set_waveform(WaveformKind::Square).is_err());
        // still safe
        engine.stop();
        engine.dispose();
    }

    #[test]
    fn settings_can_be_pinned_to_the_clock() {
        let (mut engine, log) = recording_engine();
        engine.configure_at(2.5, WaveformKind::Custom, &EffectSettings::default()).unwrap();
        let events = scheduled(&log);
        assert_eq!(events[0].at_secs, 2.5);
        assert!(matches!(
            events[0].event,
            VoiceEvent::Configure { waveform: WaveformKind::Sine, .. }
        ));
    }

    #[test]
    fn very_short_segments_are_skipped() {
        let (mut engine, log) = recording_engine();
        let points = calculate_time_values(&[WaveformPoint::new(0.0, 0.0), WaveformPoint::new(10.0, 0.0)], None, 120.0);
        assert!(!engine.trigger_segment(&split_segments(&points)[0], 0.0).unwrap());
        assert!(scheduled(&log).is_empty());
    }

    #[test]
    fn custom_waveform_is_sent_as_sine() {
        let (mut engine, log) = recording_engine();
        engine.set_waveform(WaveformKind::Custom).unwrap();
        assert!(matches!(log.borrow()[0], AudioCommand::SetWaveform(WaveformKind::Sine)));
    }

    #[test]
    fn failed_init_leaves_an_inert_engine() {
        let attempts = Rc::new(Cell::new(0));
        let mut engine = failing_engine(attempts.clone());

        assert!(matches!(engine.ensure_ready(), Err(PlaybackError::EngineUnavailable(_))));
        assert!(matches!(
            engine.configure_effects(&EffectSettings::default()),
            Err(PlaybackError::EngineUnavailable(_))
        ));
        assert!(engine.set_waveform(WaveformKind::Square).is_err());
        engine.stop();
        engine.dispose();
        assert!(!engine.is_ready());
        assert_eq!(attempts.get(), 1);
    }

    #[test]
    fn stop_and_dispose_are_safe_in_any_state() {
        let (mut engine, log) = recording_engine();
        engine.stop();
        engine.dispose();
        assert!(log.borrow().is_empty());

        engine.ensure_ready().unwrap();
        engine.stop();
        engine.dispose();
        engine.dispose();
        assert!(!engine.is_ready());
        assert_eq!(log.borrow().len(), 2);

        // comes back on next use
        engine.ensure_ready().unwrap();
        assert!(engine.is_ready());
    }
}

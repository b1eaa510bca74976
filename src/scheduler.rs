// The playback state machine.
//
// One request at a time owns the synth. Audio events go onto the audio clock
// up front, while "this pass is over" is a wall-clock timer advanced by
// `Scheduler::tick`. The two clocks can drift apart a little; a pass is padded
// by `pass_padding_secs` so the drift stays inaudible.
//
//            play(loop)                       set_loop_mode(false)
//   Idle ─────────────────▶ Looping ───────────────────────────▶ Finishing
//    ▲                         ▲          set_loop_mode(true)          │
//    │  play(once)             └───────────────────────────────────────┤
//    ├───────────▶ Playing                                             │
//    │               │ timer                                           │ timer
//    └───────────────┴─────────────────────────────────────────────────┘
//
// The pending timer lives in a single `Option`, so there is never more than
// one continuation waiting, and both `play` and `stop` clear it first.

use log::{debug, error, info};

use crate::config::EngineConfig;
use crate::mapping::calculate_time_values;
use crate::segment::split_segments;
use crate::shared::{EffectSettings, WaveformKind, WaveformPoint, REFERENCE_BPM};
use crate::synth::SynthEngine;
use crate::timeline::Timeline;
use crate::Result;

// Supplies the drawing as it is right now. Asked once per loop pass, so the
// user can keep editing while a loop plays.
pub trait PointsSource {
    fn current(&mut self) -> Vec<WaveformPoint>;
}

impl<F: FnMut() -> Vec<WaveformPoint>> PointsSource for F {
    fn current(&mut self) -> Vec<WaveformPoint> {
        self()
    }
}

pub type CompletionCallback = Box<dyn FnOnce()>;

// Everything needed to play a drawing once or on repeat.
pub struct PlaybackRequest {
    pub points: Vec<WaveformPoint>,
    pub waveform: WaveformKind,
    pub effects: EffectSettings,
    pub duration: Option<f64>, // stretch the drawing to exactly this many seconds
    pub start_delay: f64,
    pub bpm: f64,
    pub looping: bool,
    pub on_complete: Option<CompletionCallback>,
    pub points_source: Option<Box<dyn PointsSource>>,
}

impl PlaybackRequest {
    pub fn new(points: Vec<WaveformPoint>) -> Self {
        Self {
            points,
            waveform: WaveformKind::Sine,
            effects: EffectSettings::default(),
            duration: None,
            start_delay: 0.0,
            bpm: REFERENCE_BPM,
            looping: false,
            on_complete: None,
            points_source: None,
        }
    }

    pub fn waveform(mut self, waveform: WaveformKind) -> Self {
        self.waveform = waveform;
        self
    }

    pub fn effects(mut self, effects: EffectSettings) -> Self {
        self.effects = effects;
        self
    }

    pub fn duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }

    pub fn start_delay(mut self, secs: f64) -> Self {
        self.start_delay = secs.max(0.0);
        self
    }

    pub fn bpm(mut self, bpm: f64) -> Self {
        self.bpm = bpm;
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn on_complete(mut self, callback: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    pub fn points_source(mut self, source: impl PointsSource + 'static) -> Self {
        self.points_source = Some(Box::new(source));
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,   // a single pass
    Looping,   // passes keep coming
    Finishing, // loop switched off, current pass plays out
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PlayOutcome {
    Ignored, // fewer than two points, nothing changed
    Started { total_duration: f64, segments: usize },
}

#[derive(Clone, Copy, Debug)]
struct PendingTimer {
    due_at: f64, // on the scheduler's wall clock
}

// The parts of a request that outlive its first pass.
struct ActivePlayback {
    points: Vec<WaveformPoint>,
    waveform: WaveformKind,
    effects: EffectSettings,
    duration: Option<f64>,
    bpm: f64,
    on_complete: Option<CompletionCallback>,
    points_source: Option<Box<dyn PointsSource>>,
}

impl ActivePlayback {
    // A one-shot with nothing to replay; only the callback matters.
    fn once(on_complete: Option<CompletionCallback>) -> Self {
        Self {
            points: Vec::new(),
            waveform: WaveformKind::default(),
            effects: EffectSettings::default(),
            duration: None,
            bpm: REFERENCE_BPM,
            on_complete,
            points_source: None,
        }
    }
}

pub struct Scheduler {
    engine: SynthEngine,
    state: PlaybackState,
    clock: f64, // wall-clock seconds fed in through tick()
    pending: Option<PendingTimer>,
    active: Option<ActivePlayback>,
    passes: u64,
}

impl Scheduler {
    pub fn new(engine: SynthEngine) -> Self {
        Self {
            engine,
            state: PlaybackState::Idle,
            clock: 0.0,
            pending: None,
            active: None,
            passes: 0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_looping(&self) -> bool {
        self.state == PlaybackState::Looping
    }

    pub fn finish_current_loop(&self) -> bool {
        self.state == PlaybackState::Finishing
    }

    // 0 or 1
    pub fn pending_timers(&self) -> usize {
        usize::from(self.pending.is_some())
    }

    pub fn time_until_next(&self) -> Option<f64> {
        self.pending.map(|t| (t.due_at - self.clock).max(0.0))
    }

    // Passes started for the current request
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn config(&self) -> &EngineConfig {
        self.engine.config()
    }

    pub fn engine_mut(&mut self) -> &mut SynthEngine {
        &mut self.engine
    }

    pub fn play(&mut self, request: PlaybackRequest) -> Result<PlayOutcome> {
        if !WaveformPoint::is_playable(&request.points) {
            debug!("ignoring play request with {} point(s)", request.points.len());
            return Ok(PlayOutcome::Ignored);
        }
        self.take_over()?;

        let PlaybackRequest {
            points,
            waveform,
            effects,
            duration,
            start_delay,
            bpm,
            looping,
            on_complete,
            points_source,
        } = request;

        self.state = if looping { PlaybackState::Looping } else { PlaybackState::Playing };
        self.passes = 0;
        self.active = Some(ActivePlayback {
            points: points.clone(),
            waveform,
            effects,
            duration,
            bpm,
            on_complete,
            points_source,
        });

        self.start_pass(points, start_delay).inspect_err(|_| self.reset())
    }

    // Plays every event of the timeline in one pass, each sound at its own
    // offset from `from_secs` with its own waveform and effects. Events that
    // start before `from_secs` play right away. Timelines never loop.
    pub fn play_timeline(
        &mut self,
        timeline: &Timeline,
        from_secs: f64,
        on_complete: Option<CompletionCallback>,
    ) -> Result<PlayOutcome> {
        if !timeline.is_playable() {
            debug!("ignoring timeline with nothing playable");
            return Ok(PlayOutcome::Ignored);
        }
        self.take_over()?;

        self.state = PlaybackState::Playing;
        self.passes = 0;
        self.active = Some(ActivePlayback::once(on_complete));

        self.start_timeline(timeline, from_secs).inspect_err(|_| self.reset())
    }

    // Switching looping off mid-loop lets the current pass finish instead of
    // cutting it. A one-shot stays a one-shot.
    pub fn set_loop_mode(&mut self, enabled: bool) {
        let next = match (self.state, enabled) {
            (PlaybackState::Looping, false) => PlaybackState::Finishing,
            (PlaybackState::Finishing, true) => PlaybackState::Looping,
            (state, _) => state,
        };
        if next != self.state {
            debug!("loop mode {enabled}: {:?} -> {next:?}", self.state);
            self.state = next;
        }
    }

    // Silences everything now. The completion callback is dropped, not called.
    pub fn stop(&mut self) {
        self.cancel_pending();
        self.engine.stop();
        self.reset();
    }

    // Stops and releases the audio backend
    pub fn shutdown(&mut self) {
        self.stop();
        self.engine.dispose();
    }

    // Advances the wall clock by `elapsed` seconds and fires the pending timer
    // if it is due. Returns true when a timer fired.
    pub fn tick(&mut self, elapsed: f64) -> bool {
        self.clock += elapsed.max(0.0);
        match self.pending {
            Some(timer) if timer.due_at <= self.clock => {
                self.pending = None;
                self.on_pass_end();
                true
            }
            _ => false,
        }
    }

    // The new request takes over the voice from whatever was playing.
    fn take_over(&mut self) -> Result<()> {
        self.engine.ensure_ready()?;
        self.cancel_pending();
        if self.state != PlaybackState::Idle {
            self.engine.stop();
        }
        Ok(())
    }

    fn cancel_pending(&mut self) {
        if self.pending.take().is_some() {
            debug!("cancelled pending pass timer");
        }
    }

    fn on_pass_end(&mut self) {
        match self.state {
            PlaybackState::Looping => self.schedule_next(),
            PlaybackState::Playing | PlaybackState::Finishing => self.complete(),
            PlaybackState::Idle => {}
        }
    }

    // Next loop pass with a fresh look at the drawing.
    fn schedule_next(&mut self) {
        let Some(active) = self.active.as_mut() else {
            self.reset();
            return;
        };
        let points = match active.points_source.as_mut() {
            Some(source) => source.current(),
            None => active.points.clone(),
        };

        if !WaveformPoint::is_playable(&points) {
            debug!("loop source has {} point(s), ending loop", points.len());
            self.complete();
            return;
        }
        if let Err(err) = self.start_pass(points, 0.0) {
            error!("could not start next loop pass: {err}");
            self.complete();
        }
    }

    fn start_pass(&mut self, points: Vec<WaveformPoint>, start_delay: f64) -> Result<PlayOutcome> {
        let Some(active) = self.active.as_ref() else {
            return Ok(PlayOutcome::Ignored);
        };
        let (waveform, effects, duration, bpm) = (active.waveform, active.effects, active.duration, active.bpm);

        self.engine.configure_effects(&effects)?;
        self.engine.set_waveform(waveform)?;

        let timed = calculate_time_values(&points, duration, bpm);
        let last_time = timed.last().map_or(0.0, |p| p.time);

        let origin = self.engine.now_secs()? + start_delay;
        let segments = self.trigger_all(&timed, origin)?;

        Ok(self.arm(last_time, segments))
    }

    fn start_timeline(&mut self, timeline: &Timeline, from_secs: f64) -> Result<PlayOutcome> {
        let origin = self.engine.now_secs()?;
        let mut end = 0.0_f64;
        let mut segments = 0;

        for entry in timeline.schedule(from_secs) {
            let sound = &entry.event.sound;
            let at = origin + entry.delay_secs;
            self.engine.configure_at(at, sound.waveform, &sound.effects)?;

            let timed = calculate_time_values(&sound.points, Some(entry.event.duration_secs), sound.bpm);
            end = end.max(entry.delay_secs + timed.last().map_or(0.0, |p| p.time));
            segments += self.trigger_all(&timed, at)?;
        }

        Ok(self.arm(end, segments))
    }

    fn trigger_all(&mut self, timed: &[WaveformPoint], origin: f64) -> Result<usize> {
        let mut triggered = 0;
        for segment in split_segments(timed).iter().filter(|s| s.is_audible()) {
            if self.engine.trigger_segment(segment, origin)? {
                triggered += 1;
            }
        }
        Ok(triggered)
    }

    // Arms the one timer for a pass whose last event sits at `last_time`.
    // Drawings can run backwards in time; such a pass still ends, right away.
    fn arm(&mut self, last_time: f64, segments: usize) -> PlayOutcome {
        let total_duration = (last_time + self.config().pass_padding_secs).max(0.0);
        self.pending = Some(PendingTimer {
            due_at: self.clock + total_duration,
        });
        self.passes += 1;
        info!(
            "pass {} started: {segments} segment(s), {total_duration:.2}s, {:?}",
            self.passes, self.state
        );
        PlayOutcome::Started { total_duration, segments }
    }

    fn complete(&mut self) {
        let callback = self.active.as_mut().and_then(|a| a.on_complete.take());
        self.reset();
        if let Some(callback) = callback {
            callback();
        }
    }

    fn reset(&mut self) {
        self.state = PlaybackState::Idle;
        self.pending = None;
        self.active = None;
    }
}

use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use squiggle::midi::extract_notes;
use squiggle::sound_file::SoundFile;
use squiggle::transform::{apply_arpeggio, smooth_line, stretch_line};
use squiggle::{
    render_timeline, render_to_file, EngineConfig, PlayOutcome, RenderOutcome, RenderedFormat, Scheduler,
    SynthEngine, Timeline, WaveformKind, WaveformPoint,
};

const TICK_RATE: Duration = Duration::from_millis(16); // ~60 ticks a second

#[derive(Parser)]
#[command(name = "squiggle", version, about = "Play drawn curves as sound")]
struct Cli {
    /// Engine settings as JSON; anything left out uses the defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play a sound file through the default output device.
    Play {
        #[command(flatten)]
        sound: SoundArgs,
        /// Keep playing, re-reading the file before every pass.
        #[arg(long = "loop")]
        looping: bool,
        /// With --loop, let this many passes play and then finish gracefully.
        #[arg(long)]
        passes: Option<u64>,
        /// Seconds to wait before the first note.
        #[arg(long, default_value_t = 0.0)]
        delay: f64,
    },
    /// Render a sound file to a 16-bit WAV.
    Render {
        #[command(flatten)]
        sound: SoundArgs,
        #[arg(short, long)]
        output: PathBuf,
        /// Capture from the live device in real time instead of rendering offline.
        #[arg(long)]
        live: bool,
    },
    /// Print the MIDI notes a sound file would produce, as JSON.
    Notes {
        #[command(flatten)]
        sound: SoundArgs,
    },
    /// Play a timeline of sounds, or render it with --output.
    Timeline {
        /// Timeline file (JSON) listing sounds with their start times and durations.
        file: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Start playing from this many seconds in.
        #[arg(long, default_value_t = 0.0)]
        from: f64,
    },
}

#[derive(Args)]
struct SoundArgs {
    /// Sound file (JSON) holding the points and playback settings.
    file: PathBuf,
    #[arg(long)]
    bpm: Option<f64>,
    /// Stretch the drawing to exactly this many seconds.
    #[arg(long)]
    duration: Option<f64>,
    #[arg(long)]
    waveform: Option<WaveformKind>,
    #[arg(long)]
    smooth: bool,
    /// Scale the drawing horizontally by this factor.
    #[arg(long)]
    stretch: Option<f64>,
    #[arg(long)]
    arpeggio: bool,
}

impl SoundArgs {
    fn load(&self) -> anyhow::Result<SoundFile> {
        let mut sound = SoundFile::load(&self.file)
            .with_context(|| format!("failed to load sound file {}", self.file.display()))?;
        sound.points = self.shape(&sound.points);
        if let Some(bpm) = self.bpm {
            sound.bpm = bpm;
        }
        if self.duration.is_some() {
            sound.duration = self.duration;
        }
        if let Some(waveform) = self.waveform {
            sound.waveform = waveform;
        }
        Ok(sound)
    }

    fn shape(&self, points: &[WaveformPoint]) -> Vec<WaveformPoint> {
        let mut points = points.to_vec();
        if self.smooth {
            points = smooth_line(&points);
        }
        if let Some(factor) = self.stretch {
            points = stretch_line(&points, factor);
        }
        if self.arpeggio {
            points = apply_arpeggio(&points);
        }
        points
    }
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Play { sound, looping, passes, delay } => play(config, sound, looping, passes, delay),
        Command::Render { sound, output, live } => render(config, &sound, &output, live),
        Command::Notes { sound } => notes(&config, &sound),
        Command::Timeline { file, output, from } => timeline(config, &file, output.as_deref(), from),
    }
}

fn play(config: EngineConfig, args: SoundArgs, looping: bool, passes: Option<u64>, delay: f64) -> anyhow::Result<()> {
    let sound = args.load()?;
    let done = Rc::new(Cell::new(false));
    let done_flag = done.clone();

    let mut request = sound.to_request().start_delay(delay).looping(looping).on_complete(move || done_flag.set(true));
    if looping {
        let mut last_good = sound.points.clone();
        request = request.points_source(move || {
            // the file may be mid-edit; keep playing what we had
            match SoundFile::load(&args.file) {
                Ok(reloaded) => last_good = args.shape(&reloaded.points),
                Err(err) => warn!("could not reload {}: {err}", args.file.display()),
            }
            last_good.clone()
        });
    }

    let mut scheduler = Scheduler::new(SynthEngine::live(config));
    match scheduler.play(request)? {
        PlayOutcome::Ignored => {
            println!("nothing to play: a sound needs at least two points");
            return Ok(());
        }
        PlayOutcome::Started { total_duration, segments } => {
            info!("playing {segments} segment(s), {total_duration:.2}s per pass");
        }
    }

    run_until_done(&mut scheduler, &done, |s| {
        if passes.is_some_and(|n| s.is_looping() && s.passes() >= n) {
            info!("played {} pass(es), finishing the current one", s.passes());
            s.set_loop_mode(false);
        }
    });
    Ok(())
}

// Drives the scheduler at the tick rate until `done` is set, then lets the
// release and effect tails ring out.
fn run_until_done(scheduler: &mut Scheduler, done: &Cell<bool>, mut each_tick: impl FnMut(&mut Scheduler)) {
    let mut last_tick = Instant::now();
    while !done.get() {
        std::thread::sleep(TICK_RATE);
        let elapsed = last_tick.elapsed().as_secs_f64();
        last_tick = Instant::now();
        scheduler.tick(elapsed);
        each_tick(scheduler);
    }

    std::thread::sleep(Duration::from_secs_f64(scheduler.config().release_tail_secs.max(0.0) + 1.0));
    scheduler.shutdown();
}

fn render(config: EngineConfig, args: &SoundArgs, output: &Path, live: bool) -> anyhow::Result<()> {
    let sound = args.load()?;
    let engine = if live { SynthEngine::live(config) } else { SynthEngine::offline(config) };
    let mut scheduler = Scheduler::new(engine);

    let outcome = render_to_file(&mut scheduler, sound.to_request(), output)?;
    scheduler.shutdown();

    report(outcome, "a sound needs at least two points");
    Ok(())
}

fn timeline(config: EngineConfig, file: &Path, output: Option<&Path>, from: f64) -> anyhow::Result<()> {
    let timeline = Timeline::load(file).with_context(|| format!("failed to load timeline {}", file.display()))?;

    if let Some(output) = output {
        let mut scheduler = Scheduler::new(SynthEngine::offline(config));
        let outcome = render_timeline(&mut scheduler, &timeline, output)?;
        scheduler.shutdown();
        report(outcome, "no event on the timeline has two points");
        return Ok(());
    }

    let done = Rc::new(Cell::new(false));
    let done_flag = done.clone();
    let mut scheduler = Scheduler::new(SynthEngine::live(config));
    match scheduler.play_timeline(&timeline, from, Some(Box::new(move || done_flag.set(true))))? {
        PlayOutcome::Ignored => {
            println!("nothing to play: no event on the timeline has two points");
            return Ok(());
        }
        PlayOutcome::Started { total_duration, segments } => {
            info!("playing {} event(s), {segments} segment(s), {total_duration:.2}s", timeline.events.len());
        }
    }
    run_until_done(&mut scheduler, &done, |_| {});
    Ok(())
}

fn report(outcome: Option<RenderOutcome>, why_empty: &str) {
    match outcome {
        None => println!("nothing to render: {why_empty}"),
        Some(outcome) => {
            println!(
                "wrote {} ({:.2}s, {} bytes)",
                outcome.path.display(),
                outcome.duration_secs,
                outcome.bytes
            );
            if let RenderedFormat::Fallback(reason) = outcome.format {
                println!("warning: conversion to 16-bit PCM failed ({reason}); the file holds the float capture");
            }
        }
    }
}

fn notes(config: &EngineConfig, args: &SoundArgs) -> anyhow::Result<()> {
    let sound = args.load()?;
    let notes = extract_notes(&sound.points, sound.bpm, config.frequency_range, config.canvas_height)?;
    println!("{}", serde_json::to_string_pretty(&notes)?);
    Ok(())
}

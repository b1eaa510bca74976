// Drawn-curve playback: map a polyline to a pitch contour, play it through a
// monophonic synth with an effects chain, loop it, and render it to WAV.

pub mod audio;
pub mod audio_api;
pub mod config;
pub mod mapping;
pub mod midi;
pub mod render;
pub mod scheduler;
pub mod segment;
pub mod shared;
pub mod sound_file;
pub mod synth;
pub mod timeline;
pub mod transform;
pub mod wav;

pub use config::EngineConfig;
pub use mapping::{calculate_time_values, map_to_frequency, FrequencyRange};
pub use render::{render_timeline, render_to_file, render_to_file_with, RenderOutcome, RenderedFormat};
pub use scheduler::{PlayOutcome, PlaybackRequest, PlaybackState, PointsSource, Scheduler};
pub use segment::{split_segments, LineSegment};
pub use shared::{EffectSettings, WaveformKind, WaveformPoint};
pub use synth::SynthEngine;
pub use timeline::{Timeline, TimelineEvent};

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("audio engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("not enough points: need at least 2, got {0}")]
    NotEnoughPoints(usize),

    #[error("audio command queue is full")]
    QueueFull,

    #[error("no audio was captured")]
    NothingCaptured,

    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PlaybackError>;

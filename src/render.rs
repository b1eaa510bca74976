// Renders a drawing to a WAV file by playing it once with capture on.
//
// The capture comes back as a float WAV container, is decoded to planar PCM
// and re-encoded as 16-bit PCM. If that conversion fails the container itself
// is written, so a finished recording is never thrown away.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{error, info, warn};

use crate::audio::decode_container;
use crate::scheduler::{PlayOutcome, PlaybackRequest, Scheduler};
use crate::shared::WaveformPoint;
use crate::timeline::Timeline;
use crate::wav::encode_wav_pcm16;
use crate::Result;

#[derive(Clone, Debug, PartialEq)]
pub enum RenderedFormat {
    Pcm16,
    Fallback(String), // conversion failed, the file holds the float container
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderOutcome {
    pub path: PathBuf,
    pub format: RenderedFormat,
    pub duration_secs: f64,
    pub bytes: usize,
}

// Plays `request` once (looping is forced off) while capturing, then writes
// the result to `path`. `Ok(None)` when there is nothing to play.
pub fn render_to_file(
    scheduler: &mut Scheduler,
    request: PlaybackRequest,
    path: &Path,
) -> Result<Option<RenderOutcome>> {
    render_to_file_with(scheduler, request, path, convert_to_pcm16)
}

// Same as `render_to_file`, with the container-to-file conversion supplied.
pub fn render_to_file_with(
    scheduler: &mut Scheduler,
    request: PlaybackRequest,
    path: &Path,
    convert: impl FnOnce(&[u8]) -> Result<Vec<u8>>,
) -> Result<Option<RenderOutcome>> {
    if !WaveformPoint::is_playable(&request.points) {
        return Ok(None);
    }
    capture_to_file(scheduler, path, |s| s.play(request.looping(false)), convert)
}

// Renders every event of the timeline from its start into one file.
pub fn render_timeline(scheduler: &mut Scheduler, timeline: &Timeline, path: &Path) -> Result<Option<RenderOutcome>> {
    if !timeline.is_playable() {
        return Ok(None);
    }
    capture_to_file(scheduler, path, |s| s.play_timeline(timeline, 0.0, None), convert_to_pcm16)
}

fn capture_to_file(
    scheduler: &mut Scheduler,
    path: &Path,
    start: impl FnOnce(&mut Scheduler) -> Result<PlayOutcome>,
    convert: impl FnOnce(&[u8]) -> Result<Vec<u8>>,
) -> Result<Option<RenderOutcome>> {
    let tail = scheduler.config().render_tail_secs.max(0.0);

    scheduler.engine_mut().start_capture()?;
    let total_duration = match start(scheduler) {
        Ok(PlayOutcome::Started { total_duration, .. }) => total_duration.max(0.0),
        other => {
            if let Err(err) = scheduler.engine_mut().finish_capture() {
                warn!("could not close the unused capture: {err}");
            }
            return other.map(|_| None);
        }
    };

    let wait = total_duration + tail;
    info!("rendering {total_duration:.2}s (+{tail:.2}s tail) to {}", path.display());
    scheduler.engine_mut().wait(Duration::from_secs_f64(wait))?;
    scheduler.tick(wait);

    let captured = scheduler.engine_mut().finish_capture()?;
    let container = captured.to_container()?;

    let (bytes, format) = match convert(&container) {
        Ok(pcm) => (pcm, RenderedFormat::Pcm16),
        Err(err) => {
            error!("wav conversion failed, writing the raw capture instead: {err}");
            (container, RenderedFormat::Fallback(err.to_string()))
        }
    };
    std::fs::write(path, &bytes)?;

    Ok(Some(RenderOutcome {
        path: path.to_path_buf(),
        format,
        duration_secs: captured.duration_secs(),
        bytes: bytes.len(),
    }))
}

// Decodes a captured container and re-encodes it as 16-bit PCM with the same
// channel count and sample rate.
pub fn convert_to_pcm16(container: &[u8]) -> Result<Vec<u8>> {
    let pcm = decode_container(container)?;
    Ok(encode_wav_pcm16(&pcm.channels, pcm.sample_rate))
}

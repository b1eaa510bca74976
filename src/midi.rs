// Quantizes a drawing into a flat note list for MIDI export. Writing the
// actual Standard MIDI File bytes is left to whatever consumes the list.

use serde::Serialize;

use crate::mapping::{
    calculate_time_values, frequency_to_midi_note, map_to_frequency, midi_note_name, FrequencyRange,
};
use crate::shared::{WaveformPoint, MIN_PLAYABLE_POINTS};
use crate::{PlaybackError, Result};

pub const TICKS_PER_QUARTER: u32 = 480;
pub const MIN_NOTE_SECS: f64 = 0.05;
pub const DEFAULT_VELOCITY: u8 = 100;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MidiNote {
    pub pitch: u8,
    pub name: String,
    pub duration_ticks: u32,
    pub velocity: u8,
}

// One note per pair of neighbouring points on the same line, pitched at the
// first point and lasting until the second. Notes shorter than 50ms are dropped.
pub fn extract_notes(
    points: &[WaveformPoint],
    bpm: f64,
    range: FrequencyRange,
    canvas_height: f64,
) -> Result<Vec<MidiNote>> {
    if points.len() < MIN_PLAYABLE_POINTS {
        return Err(PlaybackError::NotEnoughPoints(points.len()));
    }

    let timed = calculate_time_values(points, None, bpm);
    let seconds_per_quarter = 60.0 / bpm;

    let notes = timed
        .windows(2)
        .filter(|pair| !pair[1].is_new_line)
        .filter_map(|pair| {
            let duration = pair[1].time - pair[0].time;
            if duration < MIN_NOTE_SECS {
                return None;
            }
            let frequency = map_to_frequency(pair[0].y, canvas_height, range);
            let pitch = frequency_to_midi_note(frequency).clamp(0, 127);
            let ticks = (TICKS_PER_QUARTER as f64 * duration / seconds_per_quarter).round();
            Some(MidiNote {
                pitch: pitch as u8,
                name: midi_note_name(pitch),
                duration_ticks: ticks as u32,
                velocity: DEFAULT_VELOCITY,
            })
        })
        .collect();

    Ok(notes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_second_at_120_bpm_is_one_beat() {
        let points = [WaveformPoint::new(0.0, 0.0), WaveformPoint::new(500.0, 0.0)];
        let notes = extract_notes(&points, 120.0, FrequencyRange::DEFAULT, 400.0).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].duration_ticks, 480);
        // top of the canvas is 880 Hz, A5
        assert_eq!(notes[0].pitch, 81);
        assert_eq!(notes[0].name, "A5");
        assert_eq!(notes[0].velocity, 100);
    }

    #[test]
    fn short_notes_and_line_starts_are_skipped() {
        let points = [
            WaveformPoint::new(0.0, 400.0),
            WaveformPoint::new(20.0, 400.0), // 20ms, too short
            WaveformPoint::new(400.0, 400.0),
            WaveformPoint::new(600.0, 200.0).starting_line(Some(0.5)),
            WaveformPoint::new(900.0, 200.0),
        ];
        let notes = extract_notes(&points, 120.0, FrequencyRange::DEFAULT, 400.0).unwrap();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].name, "A2");
        assert_eq!(notes[0].duration_ticks, 365); // 0.38s
        assert_eq!(notes[1].duration_ticks, 288); // 0.3s
    }

    #[test]
    fn fewer_than_two_points_is_an_error() {
        let err = extract_notes(&[WaveformPoint::new(0.0, 0.0)], 120.0, FrequencyRange::DEFAULT, 400.0);
        assert!(matches!(err, Err(PlaybackError::NotEnoughPoints(1))));
    }
}

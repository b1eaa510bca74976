// Geometry to sound: canvas height becomes frequency, canvas width becomes time.

use serde::{Deserialize, Serialize};

use crate::shared::{WaveformPoint, REFERENCE_BPM};

const NOTE_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

// The pitch bounds the canvas is stretched across. Top of the canvas plays
// `max_hz`, bottom plays `min_hz`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    pub min_hz: f64,
    pub max_hz: f64,
}

impl FrequencyRange {
    // A2 to A5.
    pub const DEFAULT: Self = Self { min_hz: 110.0, max_hz: 880.0 };
    // A1 to A6.
    pub const EXTENDED: Self = Self { min_hz: 55.0, max_hz: 1760.0 };

    pub fn new(min_hz: f64, max_hz: f64) -> Self {
        Self { min_hz, max_hz }
    }

    pub fn geometric_mid(&self) -> f64 {
        (self.min_hz * self.max_hz).sqrt()
    }

    pub fn is_valid(&self) -> bool {
        self.min_hz > 0.0 && self.max_hz > self.min_hz && self.max_hz.is_finite()
    }
}

impl Default for FrequencyRange {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// Logarithmic mapping so equal vertical distances are equal musical intervals.
pub fn map_to_frequency(y: f64, height: f64, range: FrequencyRange) -> f64 {
    let normalized_y = (height - y) / height;
    range.min_hz * (range.max_hz / range.min_hz).powf(normalized_y)
}

// Scales raw times relative to the 120 BPM reference. Higher BPM plays faster.
pub fn tempo_factor(bpm: f64) -> f64 {
    if bpm.is_finite() && bpm > 0.0 {
        REFERENCE_BPM / bpm
    } else {
        1.0
    }
}

// Computes absolute playback times for a copy of `points`.
//
// Each point sits at `x / 1000` seconds (tempo scaled) after the silence
// accumulated so far; a new line carrying a gap pushes everything after it
// back by that gap. With a `target_duration` the whole sequence is stretched
// so the first point lands on 0 and the last on the target. A zero-length
// sequence is left as computed rather than divided by zero.
pub fn calculate_time_values(
    points: &[WaveformPoint],
    target_duration: Option<f64>,
    bpm: f64,
) -> Vec<WaveformPoint> {
    let mut processed = points.to_vec();
    if processed.is_empty() {
        return processed;
    }

    let factor = tempo_factor(bpm);
    let mut total_time = 0.0;

    for (i, point) in processed.iter_mut().enumerate() {
        if point.is_new_line && i > 0 {
            if let Some(gap) = point.gap_duration {
                total_time += gap * factor;
            }
        }
        point.time = total_time + (point.x / 1000.0) * factor;
    }

    if let Some(duration) = target_duration.filter(|d| *d > 0.0) {
        if processed.len() > 1 {
            let start = processed[0].time;
            let span = processed[processed.len() - 1].time - start;
            if span.abs() > f64::EPSILON {
                let time_factor = duration / span;
                for point in &mut processed {
                    point.time = (point.time - start) * time_factor;
                }
            }
        }
    }

    processed
}

// Nearest MIDI note number, A4 = 69 = 440 Hz.
pub fn frequency_to_midi_note(frequency: f64) -> i32 {
    (12.0 * (frequency / 440.0).log2() + 69.0).round() as i32
}

pub fn midi_note_name(note: i32) -> String {
    let octave = note.div_euclid(12) - 1;
    let name = NOTE_NAMES[note.rem_euclid(12) as usize];
    format!("{name}{octave}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn canvas_edges_map_to_range_bounds() {
        for range in [FrequencyRange::DEFAULT, FrequencyRange::EXTENDED] {
            assert_approx_eq!(map_to_frequency(0.0, 400.0, range), range.max_hz);
            assert_approx_eq!(map_to_frequency(400.0, 400.0, range), range.min_hz);
        }
    }

    #[test]
    fn canvas_middle_is_geometric_midpoint() {
        let range = FrequencyRange::DEFAULT;
        assert_approx_eq!(map_to_frequency(200.0, 400.0, range), range.geometric_mid());
        assert_approx_eq!(range.geometric_mid(), 311.127, 1e-3);
    }

    #[test]
    fn frequency_falls_as_y_grows() {
        let range = FrequencyRange::EXTENDED;
        let mut previous = f64::INFINITY;
        for y in (0..=400).step_by(10) {
            let freq = map_to_frequency(y as f64, 400.0, range);
            assert!(freq < previous, "y={y} gave {freq} after {previous}");
            previous = freq;
        }
    }

    #[test]
    fn two_points_at_reference_tempo() {
        let points = [WaveformPoint::new(0.0, 200.0), WaveformPoint::new(500.0, 0.0)];
        let timed = calculate_time_values(&points, None, 120.0);
        assert_approx_eq!(timed[0].time, 0.0);
        assert_approx_eq!(timed[1].time, 0.5);
    }

    #[test]
    fn doubling_tempo_halves_times() {
        let points = [WaveformPoint::new(0.0, 0.0), WaveformPoint::new(1000.0, 0.0)];
        let timed = calculate_time_values(&points, None, 240.0);
        assert_approx_eq!(timed[1].time, 0.5);
    }

    #[test]
    fn gap_is_added_before_the_new_line_offset() {
        let points = [
            WaveformPoint::new(0.0, 100.0),
            WaveformPoint::new(100.0, 100.0).starting_line(Some(0.2)),
            WaveformPoint::new(300.0, 100.0),
        ];
        let timed = calculate_time_values(&points, None, 60.0);
        // tempo factor 2: gap 0.4, then 100px -> 0.2
        assert_approx_eq!(timed[1].time, 0.6);
        assert_approx_eq!(timed[2].time, 1.0);
    }

    #[test]
    fn gap_on_first_point_is_ignored() {
        let points = [
            WaveformPoint::new(0.0, 100.0).starting_line(Some(1.0)),
            WaveformPoint::new(100.0, 100.0),
        ];
        let timed = calculate_time_values(&points, None, 120.0);
        assert_approx_eq!(timed[0].time, 0.0);
        assert_approx_eq!(timed[1].time, 0.1);
    }

    #[test]
    fn target_duration_pins_both_ends() {
        let points = [
            WaveformPoint::new(120.0, 10.0),
            WaveformPoint::new(250.0, 10.0),
            WaveformPoint::new(700.0, 10.0),
        ];
        let timed = calculate_time_values(&points, Some(2.0), 90.0);
        assert_approx_eq!(timed[0].time, 0.0);
        assert_approx_eq!(timed[2].time, 2.0);
        assert!(timed[1].time > 0.0 && timed[1].time < 2.0);
    }

    #[test]
    fn zero_span_with_target_keeps_original_times() {
        let points = [WaveformPoint::new(300.0, 10.0), WaveformPoint::new(300.0, 50.0)];
        let timed = calculate_time_values(&points, Some(3.0), 120.0);
        assert_approx_eq!(timed[0].time, 0.3);
        assert_approx_eq!(timed[1].time, 0.3);
        assert!(timed.iter().all(|p| p.time.is_finite()));
    }

    #[test]
    fn increasing_x_never_goes_back_in_time() {
        let points: Vec<_> = (0..50)
            .map(|i| {
                let p = WaveformPoint::new(i as f64 * 13.0, (i * 7 % 400) as f64);
                if i % 9 == 0 { p.starting_line(Some(0.05)) } else { p }
            })
            .collect();
        for bpm in [40.0, 120.0, 300.0] {
            let timed = calculate_time_values(&points, None, bpm);
            assert!(timed.windows(2).all(|w| w[0].time <= w[1].time));
        }
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(calculate_time_values(&[], Some(1.0), 120.0).is_empty());
    }

    #[test]
    fn invalid_bpm_uses_reference_tempo() {
        assert_eq!(tempo_factor(0.0), 1.0);
        assert_eq!(tempo_factor(f64::NAN), 1.0);
    }

    #[test]
    fn midi_note_names() {
        assert_eq!(frequency_to_midi_note(440.0), 69);
        assert_eq!(frequency_to_midi_note(261.63), 60);
        assert_eq!(midi_note_name(69), "A4");
        assert_eq!(midi_note_name(60), "C4");
        assert_eq!(midi_note_name(61), "C#4");
    }
}

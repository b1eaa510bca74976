// Quick edits applied to a drawing before it is played.

use crate::shared::WaveformPoint;

const ARPEGGIO_OFFSETS: [f64; 4] = [0.0, 20.0, -20.0, 40.0]; // y offsets, in pixels
const ARPEGGIO_STEP_X: f64 = 10.0;

// Three-point moving average on y. Points next to a pen lift are left alone
// so separate lines don't bleed into each other.
pub fn smooth_line(points: &[WaveformPoint]) -> Vec<WaveformPoint> {
    let mut smoothed = points.to_vec();
    if points.len() <= 2 {
        return smoothed;
    }

    for i in 1..points.len() - 1 {
        if points[i].is_new_line || points[i + 1].is_new_line {
            continue;
        }
        smoothed[i].y = (points[i - 1].y + points[i].y + points[i + 1].y) / 3.0;
    }
    smoothed
}

pub fn stretch_line(points: &[WaveformPoint], factor: f64) -> Vec<WaveformPoint> {
    points
        .iter()
        .map(|p| WaveformPoint {
            x: p.x * factor,
            time: p.time * factor,
            ..*p
        })
        .collect()
}

// Expands each point into a small four-note figure. Pen lifts are copied as-is.
pub fn apply_arpeggio(points: &[WaveformPoint]) -> Vec<WaveformPoint> {
    let mut result = Vec::with_capacity(points.len() * ARPEGGIO_OFFSETS.len());

    for point in points {
        if point.is_new_line {
            result.push(*point);
            continue;
        }
        for (j, offset) in ARPEGGIO_OFFSETS.iter().enumerate() {
            result.push(WaveformPoint {
                x: point.x + j as f64 * ARPEGGIO_STEP_X,
                y: point.y + offset,
                is_new_line: false,
                gap_duration: None,
                ..*point
            });
        }
    }
    result
}

use crate::shared::{WaveformPoint, MIN_PLAYABLE_POINTS};

// A run of points between pen lifts; plays as one continuous tone.
#[derive(Clone, Debug, PartialEq)]
pub struct LineSegment {
    pub start_index: usize,
    pub end_index: usize, // inclusive
    pub points: Vec<WaveformPoint>,
}

impl LineSegment {
    // A lone point has no transition to play.
    pub fn is_audible(&self) -> bool {
        self.points.len() >= MIN_PLAYABLE_POINTS
    }

    pub fn first(&self) -> Option<&WaveformPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&WaveformPoint> {
        self.points.last()
    }

    pub fn span_secs(&self) -> f64 {
        match (self.first(), self.last()) {
            (Some(a), Some(b)) => b.time - a.time,
            _ => 0.0,
        }
    }
}

// Splits at every new-line marker. Short segments stay in the list so the
// indices line up with the input; callers skip them with `is_audible`.
pub fn split_segments(points: &[WaveformPoint]) -> Vec<LineSegment> {
    let mut segments = Vec::new();
    let mut start = 0;

    for (i, point) in points.iter().enumerate() {
        if point.is_new_line && i > start {
            segments.push(make_segment(points, start, i - 1));
            start = i;
        }
    }
    if start < points.len() {
        segments.push(make_segment(points, start, points.len() - 1));
    }

    segments
}

fn make_segment(points: &[WaveformPoint], start_index: usize, end_index: usize) -> LineSegment {
    LineSegment {
        start_index,
        end_index,
        points: points[start_index..=end_index].to_vec(),
    }
}

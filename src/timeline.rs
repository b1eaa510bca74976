// Several saved sounds laid out in time. Each event plays one sound, stretched
// to its own duration, starting at its own offset.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::shared::WaveformPoint;
use crate::sound_file::SoundFile;
use crate::Result;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub sound: SoundFile,
    pub start_secs: f64,
    pub duration_secs: f64,
    #[serde(default)]
    pub track: u32, // display lane only; playback ignores it
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    pub events: Vec<TimelineEvent>,
}

// An event resolved against a playhead position.
#[derive(Clone, Copy, Debug)]
pub struct ScheduledSound<'a> {
    pub delay_secs: f64,
    pub event: &'a TimelineEvent,
}

impl Timeline {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn add(&mut self, sound: SoundFile, start_secs: f64, duration_secs: f64) {
        self.events.push(TimelineEvent {
            sound,
            start_secs: start_secs.max(0.0),
            duration_secs,
            track: 0,
        });
    }

    // Where the last event ends, by its nominal duration
    pub fn end_secs(&self) -> f64 {
        self.events
            .iter()
            .map(|e| e.start_secs + e.duration_secs)
            .fold(0.0, f64::max)
    }

    pub fn is_playable(&self) -> bool {
        self.events.iter().any(|e| WaveformPoint::is_playable(&e.sound.points))
    }

    // Playable events in start order, each with its delay from `from_secs`.
    // Events already behind the playhead start immediately.
    pub fn schedule(&self, from_secs: f64) -> Vec<ScheduledSound<'_>> {
        let mut scheduled: Vec<_> = self
            .events
            .iter()
            .filter(|e| WaveformPoint::is_playable(&e.sound.points))
            .map(|event| ScheduledSound {
                delay_secs: (event.start_secs - from_secs).max(0.0),
                event,
            })
            .collect();
        scheduled.sort_by(|a, b| a.event.start_secs.total_cmp(&b.event.start_secs));
        scheduled
    }
}

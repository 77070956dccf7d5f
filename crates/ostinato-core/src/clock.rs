//! Tempo clock and solo register

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::player::PlayerId;

/// Beat/second conversion for the shared timeline.
pub trait Clock: Send {
    fn bpm(&self) -> f64;

    /// Change tempo from `at_beat` onwards; earlier beats keep their times
    fn set_bpm(&mut self, bpm: f64, at_beat: f64);

    fn beats_per_bar(&self) -> f64;

    fn seconds_at(&self, beat: f64) -> f64;

    fn beat_at(&self, seconds: f64) -> f64;

    /// Length of `beats` beats in seconds at the current tempo
    fn beat_dur(&self, beats: f64) -> f64 {
        beats * 60.0 / self.bpm()
    }

    /// Format a beat position as bar.beat
    fn format_position(&self, beat: f64) -> String {
        let bar = (beat / self.beats_per_bar()).floor();
        let within = beat - bar * self.beats_per_bar();
        format!("{}.{:.2}", bar as i64 + 1, within + 1.0)
    }
}

/// Piecewise-constant tempo map anchored at the last tempo change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoClock {
    /// Tempo in BPM
    pub bpm: f64,
    /// Time signature numerator
    pub beats_per_bar: f64,
    anchor_beat: f64,
    anchor_secs: f64,
}

impl Default for TempoClock {
    fn default() -> Self {
        Self::new(120.0, 4.0)
    }
}

impl TempoClock {
    pub fn new(bpm: f64, beats_per_bar: f64) -> Self {
        Self {
            bpm,
            beats_per_bar,
            anchor_beat: 0.0,
            anchor_secs: 0.0,
        }
    }
}

impl Clock for TempoClock {
    fn bpm(&self) -> f64 {
        self.bpm
    }

    fn set_bpm(&mut self, bpm: f64, at_beat: f64) {
        if bpm <= 0.0 || !bpm.is_finite() {
            return;
        }
        self.anchor_secs = self.seconds_at(at_beat);
        self.anchor_beat = at_beat;
        self.bpm = bpm;
    }

    fn beats_per_bar(&self) -> f64 {
        self.beats_per_bar
    }

    fn seconds_at(&self, beat: f64) -> f64 {
        self.anchor_secs + (beat - self.anchor_beat) * 60.0 / self.bpm
    }

    fn beat_at(&self, seconds: f64) -> f64 {
        self.anchor_beat + (seconds - self.anchor_secs) * self.bpm / 60.0
    }
}

/// Players holding exclusive emission rights. Empty means everyone plays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoloRegister {
    members: BTreeSet<PlayerId>,
}

impl SoloRegister {
    pub fn set(&mut self, id: PlayerId) {
        self.members.clear();
        self.members.insert(id);
    }

    pub fn add(&mut self, id: PlayerId) {
        self.members.insert(id);
    }

    pub fn remove(&mut self, id: PlayerId) {
        self.members.remove(&id);
    }

    pub fn reset(&mut self) {
        self.members.clear();
    }

    pub fn is_active(&self) -> bool {
        !self.members.is_empty()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.members.contains(&id)
    }

    /// Whether `id` may emit right now
    pub fn allows(&self, id: PlayerId) -> bool {
        !self.is_active() || self.contains(id)
    }
}

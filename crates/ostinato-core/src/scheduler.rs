//! Time-ordered task queue polled by the stage

use serde::{Deserialize, Serialize};

use crate::player::PlayerId;

/// Beats closer than this are treated as the same instant
pub const BEAT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Task {
    /// Invoke a player's next event
    Player(PlayerId),
    /// Add a late-arriving player to the active solo set
    SoloAdd(PlayerId),
    /// Switch the clock tempo
    Tempo(f64),
}

impl Task {
    pub fn player(&self) -> Option<PlayerId> {
        match self {
            Self::Player(id) | Self::SoloAdd(id) => Some(*id),
            Self::Tempo(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    beat: f64,
    task: Task,
}

/// Tasks due at one instant
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub beat: f64,
    pub tasks: Vec<Task>,
}

/// Queue keyed by absolute beat. Tasks scheduled for the same beat keep
/// insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scheduler {
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, beat: f64, task: Task) {
        let at = self.entries.partition_point(|e| e.beat <= beat + BEAT_EPSILON);
        self.entries.insert(at, Entry { beat, task });
    }

    /// Remove every pending task for `id`
    pub fn cancel(&mut self, id: PlayerId) {
        self.entries.retain(|e| e.task.player() != Some(id));
    }

    pub fn is_scheduled(&self, id: PlayerId) -> bool {
        self.entries.iter().any(|e| e.task == Task::Player(id))
    }

    pub fn next_beat(&self) -> Option<f64> {
        self.entries.first().map(|e| e.beat)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take every task sharing the earliest beat, if that beat is not after `until`
    pub fn pop_block(&mut self, until: f64) -> Option<Block> {
        let beat = self.next_beat()?;
        if beat > until + BEAT_EPSILON {
            return None;
        }
        let end = self.entries.partition_point(|e| e.beat <= beat + BEAT_EPSILON);
        let tasks = self.entries.drain(..end).map(|e| e.task).collect();
        Some(Block { beat, tasks })
    }
}

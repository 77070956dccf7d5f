//! Synth definitions a player can be bound to

use serde::{Deserialize, Serialize};

/// How a synth turns an event into sound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SynthKind {
    /// Degrees are mapped through a scale to a frequency
    #[default]
    Pitched,
    /// Degrees are selector characters naming a sample buffer
    Sample,
    /// Degrees are playback positions into a single looped buffer
    Loop,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthDef {
    pub name: String,
    pub kind: SynthKind,
}

impl SynthDef {
    pub fn pitched(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SynthKind::Pitched,
        }
    }

    /// Sample player; the concrete synth name depends on each buffer's channel count
    pub fn sample() -> Self {
        Self {
            name: "play".into(),
            kind: SynthKind::Sample,
        }
    }

    pub fn looper() -> Self {
        Self {
            name: "loop".into(),
            kind: SynthKind::Loop,
        }
    }

    /// Name sent for an event using a buffer with `channels` channels
    pub fn name_for(&self, channels: u16) -> String {
        match self.kind {
            SynthKind::Sample => format!("{}{}", self.name, channels.clamp(1, 2)),
            _ => self.name.clone(),
        }
    }
}

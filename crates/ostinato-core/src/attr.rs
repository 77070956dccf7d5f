//! The closed set of player attributes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OstinatoError;
use crate::synth::SynthKind;
use crate::value::Value;

/// Every attribute a player carries. Each one is always backed by a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Attr {
    // Keywords used internally
    Degree,
    Oct,
    Freq,
    Dur,
    Delay,
    Buf,
    Blur,
    Amplify,
    Bpm,
    Sample,
    Root,
    // Base attributes, sent with every message
    Sus,
    Fmod,
    Vib,
    Pan,
    Rate,
    Amp,
    Midinote,
    Channel,
    // Effect parameters
    Hpf,
    Hpr,
    Lpf,
    Lpr,
    Chop,
    Room,
    Mix,
    Echo,
    Decay,
    Slide,
    Slidedelay,
    Shape,
    Coarse,
}

impl Attr {
    pub const ALL: [Attr; 32] = [
        Attr::Degree,
        Attr::Oct,
        Attr::Freq,
        Attr::Dur,
        Attr::Delay,
        Attr::Buf,
        Attr::Blur,
        Attr::Amplify,
        Attr::Bpm,
        Attr::Sample,
        Attr::Root,
        Attr::Sus,
        Attr::Fmod,
        Attr::Vib,
        Attr::Pan,
        Attr::Rate,
        Attr::Amp,
        Attr::Midinote,
        Attr::Channel,
        Attr::Hpf,
        Attr::Hpr,
        Attr::Lpf,
        Attr::Lpr,
        Attr::Chop,
        Attr::Room,
        Attr::Mix,
        Attr::Echo,
        Attr::Decay,
        Attr::Slide,
        Attr::Slidedelay,
        Attr::Shape,
        Attr::Coarse,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Degree => "degree",
            Self::Oct => "oct",
            Self::Freq => "freq",
            Self::Dur => "dur",
            Self::Delay => "delay",
            Self::Buf => "buf",
            Self::Blur => "blur",
            Self::Amplify => "amplify",
            Self::Bpm => "bpm",
            Self::Sample => "sample",
            Self::Root => "root",
            Self::Sus => "sus",
            Self::Fmod => "fmod",
            Self::Vib => "vib",
            Self::Pan => "pan",
            Self::Rate => "rate",
            Self::Amp => "amp",
            Self::Midinote => "midinote",
            Self::Channel => "channel",
            Self::Hpf => "hpf",
            Self::Hpr => "hpr",
            Self::Lpf => "lpf",
            Self::Lpr => "lpr",
            Self::Chop => "chop",
            Self::Room => "room",
            Self::Mix => "mix",
            Self::Echo => "echo",
            Self::Decay => "decay",
            Self::Slide => "slide",
            Self::Slidedelay => "slidedelay",
            Self::Shape => "shape",
            Self::Coarse => "coarse",
        }
    }

    /// Attributes consumed by the runtime rather than forwarded as message fields
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            Self::Degree
                | Self::Oct
                | Self::Freq
                | Self::Dur
                | Self::Delay
                | Self::Buf
                | Self::Blur
                | Self::Amplify
                | Self::Bpm
                | Self::Sample
                | Self::Root
        )
    }

    pub fn is_effect(&self) -> bool {
        matches!(
            self,
            Self::Hpf
                | Self::Hpr
                | Self::Lpf
                | Self::Lpr
                | Self::Chop
                | Self::Room
                | Self::Mix
                | Self::Echo
                | Self::Decay
                | Self::Slide
                | Self::Slidedelay
                | Self::Shape
                | Self::Coarse
        )
    }

    /// Whether the attribute is overlaid onto the outgoing field set
    pub fn is_sent(&self) -> bool {
        !self.is_keyword() && !self.is_effect()
    }

    /// Value an attribute takes after a reset
    pub fn default_value(&self, kind: SynthKind, root: f64) -> Value {
        match self {
            Self::Degree if kind == SynthKind::Sample => Value::Char(' '),
            Self::Dur if kind == SynthKind::Sample => Value::Num(0.5),
            Self::Dur | Self::Sus | Self::Blur | Self::Amp | Self::Amplify => Value::Num(1.0),
            Self::Hpr | Self::Lpr | Self::Decay => Value::Num(1.0),
            Self::Mix => Value::Num(0.1),
            Self::Oct => Value::Num(5.0),
            Self::Root => Value::Num(root),
            Self::Bpm => Value::Nil,
            _ => Value::Num(0.0),
        }
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Attr {
    type Err = OstinatoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Attr::ALL
            .iter()
            .find(|a| a.name() == s)
            .copied()
            .ok_or_else(|| OstinatoError::UnknownAttribute(s.to_string()))
    }
}

//! Scales and degree-to-pitch conversion

use serde::{Deserialize, Serialize};

use crate::error::{OstinatoError, Result};
use crate::value::Value;

/// Scale/mode types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScaleMode {
    #[default]
    Major,
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    HarmonicMinor,
    MelodicMinor,
    Pentatonic,
    Blues,
    Chromatic,
    /// Degrees are already frequencies in Hz
    Freq,
}

impl ScaleMode {
    /// Semitone offsets from the root
    pub fn intervals(&self) -> &'static [f64] {
        match self {
            Self::Major => &[0.0, 2.0, 4.0, 5.0, 7.0, 9.0, 11.0],
            Self::Minor => &[0.0, 2.0, 3.0, 5.0, 7.0, 8.0, 10.0],
            Self::Dorian => &[0.0, 2.0, 3.0, 5.0, 7.0, 9.0, 10.0],
            Self::Phrygian => &[0.0, 1.0, 3.0, 5.0, 7.0, 8.0, 10.0],
            Self::Lydian => &[0.0, 2.0, 4.0, 6.0, 7.0, 9.0, 11.0],
            Self::Mixolydian => &[0.0, 2.0, 4.0, 5.0, 7.0, 9.0, 10.0],
            Self::Locrian => &[0.0, 1.0, 3.0, 5.0, 6.0, 8.0, 10.0],
            Self::HarmonicMinor => &[0.0, 2.0, 3.0, 5.0, 7.0, 8.0, 11.0],
            Self::MelodicMinor => &[0.0, 2.0, 3.0, 5.0, 7.0, 9.0, 11.0],
            Self::Pentatonic => &[0.0, 2.0, 4.0, 7.0, 9.0],
            Self::Blues => &[0.0, 3.0, 5.0, 6.0, 7.0, 10.0],
            Self::Chromatic | Self::Freq => &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Major => "Major",
            Self::Minor => "Minor",
            Self::Dorian => "Dorian",
            Self::Phrygian => "Phrygian",
            Self::Lydian => "Lydian",
            Self::Mixolydian => "Mixolydian",
            Self::Locrian => "Locrian",
            Self::HarmonicMinor => "Harmonic Minor",
            Self::MelodicMinor => "Melodic Minor",
            Self::Pentatonic => "Pentatonic",
            Self::Blues => "Blues",
            Self::Chromatic => "Chromatic",
            Self::Freq => "Freq",
        }
    }
}

/// Maps scale degrees to MIDI note numbers and frequencies.
pub trait Tuning: Send {
    /// Fractional MIDI note for `degree` in `scale`, offset by `root` semitones
    fn midi(&self, scale: ScaleMode, octave: &Value, degree: &Value, root: f64) -> Result<f64>;

    fn midi_to_freq(&self, midi: f64) -> f64 {
        440.0 * 2f64.powf((midi - 69.0) / 12.0)
    }
}

/// Twelve-tone equal temperament. Fractional degrees interpolate toward the
/// next scale step.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualTemperament;

impl Tuning for EqualTemperament {
    fn midi(&self, scale: ScaleMode, octave: &Value, degree: &Value, root: f64) -> Result<f64> {
        let invalid = || OstinatoError::InvalidPitch {
            degree: degree.to_string(),
            octave: octave.to_string(),
        };
        let degree = degree.as_f64().ok_or_else(invalid)?;
        let octave = octave.as_f64().ok_or_else(invalid)?;
        if !degree.is_finite() || !octave.is_finite() {
            return Err(invalid());
        }

        let steps = scale.intervals();
        let len = steps.len() as i64;
        let lower = degree.floor() as i64;
        let index = lower.rem_euclid(len) as usize;
        let octave = octave + lower.div_euclid(len) as f64;

        let next = if index + 1 < steps.len() { steps[index + 1] } else { 12.0 };
        let micro = (degree - lower as f64) * (next - steps[index]);

        Ok(12.0 * octave + root + steps[index] + micro)
    }
}

//! Error types for ostinato

use thiserror::Error;

use crate::player::PlayerId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OstinatoError {
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),
    #[error("Player not found: {0}")]
    PlayerNotFound(PlayerId),
    #[error("Duration pattern is empty or sums to zero")]
    ZeroDuration,
    #[error("Duration pattern contains a non-numeric value: {0}")]
    NonNumericDuration(String),
    #[error("Invalid degree / octave for pitch calculation: degree={degree}, octave={octave}")]
    InvalidPitch { degree: String, octave: String },
    #[error("Effect '{effect}' is missing its '{arg}' parameter")]
    MissingEffectArg { effect: &'static str, arg: &'static str },
    #[error("Key expression nested deeper than {0} references")]
    ReferenceDepth(usize),
    #[error("Malformed play string '{0}'")]
    PlayString(String),
}

pub type Result<T> = std::result::Result<T, OstinatoError>;

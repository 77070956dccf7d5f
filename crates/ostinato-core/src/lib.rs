//! ostinato-core: Players, patterns and scheduling for live-coded music

mod assignment;
mod attr;
pub mod clock;
mod config;
mod error;
mod event;
pub mod fx;
mod group;
mod key;
pub mod message;
pub mod pattern;
mod player;
pub mod render;
mod rest;
pub mod samples;
pub mod scheduler;
mod stage;
mod synth;
pub mod tuning;
mod value;

pub use assignment::Assignment;
pub use attr::Attr;
pub use clock::{Clock, SoloRegister, TempoClock};
pub use config::StageConfig;
pub use error::{OstinatoError, Result};
pub use event::Event;
pub use group::Group;
pub use key::{KeyExpr, Resolve, DEFAULT_MAX_REFERENCE_DEPTH};
pub use message::{Bundle, ControlMessage, EffectGroup, MessageLog, MessageSink, NullSink};
pub use pattern::Pattern;
pub use player::{count, BangHook, PlaybackState, Player, PlayerId};
pub use rest::Rest;
pub use samples::{is_rest_selector, SampleBank, SampleMap};
pub use scheduler::{Scheduler, Task};
pub use stage::Stage;
pub use synth::{SynthDef, SynthKind};
pub use tuning::{EqualTemperament, ScaleMode, Tuning};
pub use value::{BinOp, Chord, ChordMode, TimeVar, Value};

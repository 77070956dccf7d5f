//! Builder for binding a player to a synth

use crate::attr::Attr;
use crate::error::Result;
use crate::pattern::Pattern;
use crate::synth::SynthDef;
use crate::tuning::ScaleMode;

/// Synth, primary pattern and attribute overrides applied by `Stage::assign`.
///
/// `scale`, `root` and `dur` are kept apart from the other overrides since
/// they are applied first.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub(crate) synth: SynthDef,
    pub(crate) primary: Option<Pattern>,
    pub(crate) scale: Option<ScaleMode>,
    pub(crate) root: Option<Pattern>,
    pub(crate) dur: Option<Pattern>,
    pub(crate) overrides: Vec<(Attr, Pattern)>,
}

impl Assignment {
    pub fn new(synth: SynthDef) -> Self {
        Self {
            synth,
            primary: None,
            scale: None,
            root: None,
            dur: None,
            overrides: Vec::new(),
        }
    }

    pub fn pitched(name: impl Into<String>) -> Self {
        Self::new(SynthDef::pitched(name))
    }

    /// Sample player driven by a play string such as `"x-o-"`
    pub fn sample(play: &str) -> Result<Self> {
        Ok(Self::new(SynthDef::sample()).degree(Pattern::parse_play_string(play)?))
    }

    pub fn looper(buf: u32) -> Self {
        Self::new(SynthDef::looper()).set(Attr::Buf, buf as f64)
    }

    pub fn degree(mut self, pattern: impl Into<Pattern>) -> Self {
        self.primary = Some(pattern.into());
        self
    }

    pub fn scale(mut self, scale: ScaleMode) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn root(mut self, pattern: impl Into<Pattern>) -> Self {
        self.root = Some(pattern.into());
        self
    }

    pub fn dur(mut self, pattern: impl Into<Pattern>) -> Self {
        self.dur = Some(pattern.into());
        self
    }

    pub fn set(mut self, attr: Attr, pattern: impl Into<Pattern>) -> Self {
        let pattern = pattern.into();
        match attr {
            Attr::Degree => self.primary = Some(pattern),
            Attr::Root => self.root = Some(pattern),
            Attr::Dur => self.dur = Some(pattern),
            _ => {
                self.overrides.retain(|(a, _)| *a != attr);
                self.overrides.push((attr, pattern));
            }
        }
        self
    }

    /// Like `set`, with the attribute given by name
    pub fn set_named(self, name: &str, pattern: impl Into<Pattern>) -> Result<Self> {
        let attr: Attr = name.parse()?;
        Ok(self.set(attr, pattern))
    }

    pub(crate) fn sets(&self, attr: Attr) -> bool {
        self.overrides.iter().any(|(a, _)| *a == attr)
    }
}

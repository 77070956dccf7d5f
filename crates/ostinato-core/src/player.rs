//! Players: pattern-backed voices and their scheduling state

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attr::Attr;
use crate::error::{OstinatoError, Result};
use crate::event::Event;
use crate::key::KeyExpr;
use crate::pattern::Pattern;
use crate::scheduler::BEAT_EPSILON;
use crate::synth::{SynthDef, SynthKind};
use crate::tuning::ScaleMode;
use crate::value::{BinOp, Chord, Value};

/// Unique identifier for a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    StopPending,
}

/// Called once for every event that produced at least one message
pub type BangHook = Arc<dyn Fn(PlayerId, &Event) + Send + Sync>;

/// Re-harmonisation state for `accompany`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Accompaniment {
    pub lead: PlayerId,
    pub intervals: Pattern,
    pub last: Option<Value>,
}

/// Count events in a repeating rhythm up to `time`.
///
/// Returns `(n, acc)`: the number of events before the one at `time` and the
/// beat that event starts on. With `find_after` the event starting at or
/// after `time` is returned instead of the one containing it.
pub fn count(durations: &[f64], time: f64, find_after: bool) -> Result<(i64, f64)> {
    let total: f64 = durations.iter().sum();
    if durations.is_empty() || total <= 0.0 || !total.is_finite() {
        return Err(OstinatoError::ZeroDuration);
    }

    let cycles = (time / total).floor();
    let mut acc = cycles * total;
    let mut n = cycles as i64 * durations.len() as i64;

    if (acc - time).abs() > BEAT_EPSILON {
        loop {
            let dur = durations[n.rem_euclid(durations.len() as i64) as usize];
            let next = acc + dur;
            if (next - time).abs() <= BEAT_EPSILON {
                acc = next;
                n += 1;
                break;
            } else if next > time {
                if find_after {
                    acc = next;
                    n += 1;
                }
                break;
            }
            acc = next;
            n += 1;
        }
    }

    Ok((n, acc))
}

/// A scheduled voice: attribute patterns, the current event and the cursor
/// locating the next one.
pub struct Player {
    id: PlayerId,
    pub(crate) synth: SynthDef,
    attrs: BTreeMap<Attr, Pattern>,
    pub(crate) event: Event,
    pub(crate) event_n: i64,
    pub(crate) event_time: f64,
    pub(crate) state: PlaybackState,
    pub(crate) stop_at: Option<f64>,
    pub(crate) paused: bool,
    pub(crate) cached_rhythm: Option<Vec<f64>>,
    pub(crate) scale: ScaleMode,
    carrier: Pattern,
    mod_data: Pattern,
    undegraded_amp: Option<Pattern>,
    offset: f64,
    pub(crate) accompany: Option<Accompaniment>,
    pub(crate) bang: Option<BangHook>,
    pub(crate) pending_stutter: usize,
    pub(crate) last_pitch: Option<f64>,
    pub(crate) freqs: Vec<f64>,
    pub(crate) bufs: Vec<u32>,
    pub(crate) notes_played: u64,
}

impl Player {
    pub fn new(id: PlayerId) -> Self {
        let mut player = Self {
            id,
            synth: SynthDef::pitched("default"),
            attrs: BTreeMap::new(),
            event: Event::new(),
            event_n: 0,
            event_time: 0.0,
            state: PlaybackState::Stopped,
            stop_at: None,
            paused: false,
            cached_rhythm: None,
            scale: ScaleMode::default(),
            carrier: Pattern::default(),
            mod_data: Pattern::single(0.0),
            undegraded_amp: None,
            offset: 0.0,
            accompany: None,
            bang: None,
            pending_stutter: 0,
            last_pitch: None,
            freqs: Vec::new(),
            bufs: Vec::new(),
            notes_played: 0,
        };
        player.reset(0.0);
        player
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn synth(&self) -> &SynthDef {
        &self.synth
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state != PlaybackState::Stopped
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn event_n(&self) -> i64 {
        self.event_n
    }

    pub fn event_time(&self) -> f64 {
        self.event_time
    }

    pub fn stop_at(&self) -> Option<f64> {
        self.stop_at
    }

    pub fn scale(&self) -> ScaleMode {
        self.scale
    }

    pub fn notes_played(&self) -> u64 {
        self.notes_played
    }

    /// Frequencies sent for the most recent event
    pub fn freqs(&self) -> &[f64] {
        &self.freqs
    }

    /// Buffers sent for the most recent event
    pub fn bufs(&self) -> &[u32] {
        &self.bufs
    }

    /// Stream the `+`/`-` modifiers are applied on top of
    pub fn carrier(&self) -> &Pattern {
        &self.carrier
    }

    pub fn modifier(&self) -> &Pattern {
        &self.mod_data
    }

    pub fn get(&self, attr: Attr) -> &Pattern {
        static EMPTY: Pattern = Pattern::empty();
        self.attrs.get(&attr).unwrap_or(&EMPTY)
    }

    pub fn attrs(&self) -> impl Iterator<Item = (Attr, &Pattern)> {
        self.attrs.iter().map(|(a, p)| (*a, p))
    }

    /// Reference to this player's resolved `attr`, for use in other players' patterns
    pub fn key(&self, attr: Attr) -> KeyExpr {
        KeyExpr::attr(self.id, attr)
    }

    /// Attribute the `+`/`-` modifiers act on
    pub fn modifier_target(&self) -> Attr {
        match self.synth.kind {
            SynthKind::Sample => Attr::Sample,
            _ => Attr::Degree,
        }
    }

    /// Restore every attribute to its default stream and clear modifier state
    pub fn reset(&mut self, root: f64) {
        let kind = self.synth.kind;
        self.attrs = Attr::ALL
            .iter()
            .map(|a| (*a, Pattern::single(a.default_value(kind, root))))
            .collect();
        self.carrier = self.get(self.modifier_target()).clone();
        self.mod_data = Pattern::single(0.0);
        self.undegraded_amp = None;
        self.offset = 0.0;
        self.accompany = None;
        self.pending_stutter = 0;
        self.paused = false;
        self.cached_rhythm = None;
        self.last_pitch = None;
    }

    pub fn set(&mut self, attr: Attr, pattern: impl Into<Pattern>) -> &mut Self {
        let pattern = pattern.into();
        let pattern = if pattern.is_empty() {
            Pattern::single(attr.default_value(self.synth.kind, 0.0))
        } else {
            pattern
        };
        if attr == self.modifier_target() {
            self.carrier = pattern.clone();
            self.mod_data = Pattern::single(0.0);
        }
        if attr == Attr::Amp {
            self.undegraded_amp = None;
        }
        if attr == Attr::Degree {
            self.accompany = None;
        }
        self.attrs.insert(attr, pattern);
        self
    }

    /// Set an attribute by name, rejecting names outside the attribute set
    pub fn set_named(&mut self, name: &str, pattern: impl Into<Pattern>) -> Result<&mut Self> {
        let attr: Attr = name.parse()?;
        Ok(self.set(attr, pattern))
    }

    fn modify(&mut self, op: BinOp, data: Pattern) -> &mut Self {
        self.mod_data = self.mod_data.combine(op, &data);
        let target = self.modifier_target();
        let combined = self.carrier.combine(BinOp::Add, &self.mod_data);
        self.attrs.insert(target, combined);
        self
    }

    /// Replace the degree stream under the current modifier. The stream
    /// becomes the carrier when degree is the modifier target, so later
    /// `add`/`sub` calls build on it.
    fn rebase_degree(&mut self, stream: Pattern) {
        if self.modifier_target() == Attr::Degree {
            self.carrier = stream;
            let combined = self.carrier.combine(BinOp::Add, &self.mod_data);
            self.attrs.insert(Attr::Degree, combined);
        } else {
            self.attrs.insert(Attr::Degree, stream);
        }
    }

    /// Transpose by `data`, on top of any earlier modifier
    pub fn add(&mut self, data: impl Into<Pattern>) -> &mut Self {
        self.modify(BinOp::Add, data.into())
    }

    pub fn sub(&mut self, data: impl Into<Pattern>) -> &mut Self {
        self.modify(BinOp::Sub, data.into())
    }

    fn replace_degree(&mut self, degree: Pattern) -> &mut Self {
        self.set(Attr::Degree, degree)
    }

    pub fn shuffle(&mut self) -> &mut Self {
        let degree = self.get(Attr::Degree).shuffle();
        self.replace_degree(degree)
    }

    pub fn mirror(&mut self) -> &mut Self {
        let degree = self.get(Attr::Degree).mirror();
        self.replace_degree(degree)
    }

    pub fn rotate(&mut self, n: i64) -> &mut Self {
        let degree = self.get(Attr::Degree).rotate(n);
        self.replace_degree(degree)
    }

    /// Play the degree sequence `n` times over before it repeats
    pub fn multiply(&mut self, n: usize) -> &mut Self {
        let degree = self.get(Attr::Degree).repeat(n);
        self.replace_degree(degree)
    }

    /// Mask the amplitude with random 0/1 slots; each slot keeps sounding
    /// with probability `amount`. Repeated calls re-draw the mask.
    pub fn degrade(&mut self, amount: f64) -> &mut Self {
        let amp = self
            .undegraded_amp
            .take()
            .unwrap_or_else(|| self.get(Attr::Amp).clone());
        let len = self.get(Attr::Degree).len().max(16);
        let mask = Pattern::bernoulli(len, amount.clamp(0.0, 1.0));
        self.attrs.insert(Attr::Amp, amp.combine(BinOp::Mul, &mask));
        self.undegraded_amp = Some(amp);
        self
    }

    /// Shift emission by `dur` beats relative to the previous offbeat call
    pub fn offbeat(&mut self, dur: f64) -> &mut Self {
        let delay = self.get(Attr::Delay).clone() + (dur - self.offset);
        self.attrs.insert(Attr::Delay, delay);
        self.offset = dur;
        self
    }

    /// Stagger the notes of each chord by `dur` beats
    pub fn strum(&mut self, dur: f64) -> &mut Self {
        let width = self.largest_attribute();
        let delay = if width > 1 {
            Pattern::single(Chord::new((0..width).map(|i| i as f64 * dur)))
        } else {
            Pattern::single(dur)
        };
        self.attrs.insert(Attr::Delay, delay);
        self
    }

    /// Widest chord in the current event, or in the patterns before the first event
    pub fn largest_attribute(&self) -> usize {
        let from_event = self.event.iter().map(|(_, v)| v.width()).max().unwrap_or(1);
        let from_patterns = self
            .attrs
            .values()
            .flat_map(|p| p.iter().map(Value::width))
            .max()
            .unwrap_or(1);
        from_event.max(from_patterns)
    }

    /// Time-reverse every stream around the current event
    pub fn reverse(&mut self) -> &mut Self {
        let n = self.event_n;
        for pattern in self.attrs.values_mut() {
            *pattern = pattern.pivot(n);
        }
        self
    }

    pub fn lshift(&mut self, n: i64) -> &mut Self {
        self.event_n -= n + 1;
        self
    }

    pub fn rshift(&mut self, n: i64) -> &mut Self {
        self.event_n += n;
        self
    }

    /// Track `lead`'s degree, offset by this player's modifier
    pub fn follow(&mut self, lead: PlayerId) -> &mut Self {
        self.rebase_degree(Pattern::single(KeyExpr::attr(lead, Attr::Degree)));
        self.accompany = None;
        self
    }

    /// Harmonise around `lead`'s degree with `intervals`, refreshed only
    /// when the lead's degree changes
    pub fn accompany(&mut self, lead: PlayerId, intervals: impl Into<Pattern>) -> &mut Self {
        self.accompany = Some(Accompaniment {
            lead,
            intervals: intervals.into(),
            last: None,
        });
        self
    }

    /// Rebuild the degree stream if the lead moved. Returns whether it changed.
    pub(crate) fn reharmonise(&mut self, lead_degree: Value) -> bool {
        let Some(acc) = self.accompany.as_mut() else {
            return false;
        };
        if acc.last.as_ref() == Some(&lead_degree) {
            return false;
        }
        let harmony = acc.intervals.combine_value(BinOp::Add, &lead_degree);
        acc.last = Some(lead_degree);
        self.rebase_degree(harmony);
        true
    }

    /// Repeat the next note `n - 1` extra times within its duration
    pub fn stutter(&mut self, n: usize) -> &mut Self {
        self.pending_stutter = n;
        self
    }

    pub fn on_bang(&mut self, hook: BangHook) -> &mut Self {
        self.bang = Some(hook);
        self
    }

    /// Deepest cross-player reference chain in any attribute
    pub fn num_key_references(&self) -> usize {
        self.attrs.values().map(Pattern::reference_depth).max().unwrap_or(0)
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Player {} using '{}'", self.id, self.synth.name)?;
        writeln!(f)?;
        writeln!(f, "ATTRIBUTES")?;
        writeln!(f, "----------")?;
        writeln!(f)?;
        for (attr, pattern) in &self.attrs {
            writeln!(f, "\t{attr}\t:{pattern}")?;
        }
        Ok(())
    }
}

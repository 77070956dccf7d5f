//! Resolved per-tick attribute snapshot

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attr::Attr;
use crate::value::{lcm, BinOp, Chord, ChordMode, Value};

static NIL: Value = Value::Nil;

/// Concrete values of every attribute for one event. Rebuilt whole on each
/// invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    values: BTreeMap<Attr, Value>,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, attr: Attr) -> &Value {
        self.values.get(&attr).unwrap_or(&NIL)
    }

    pub fn set(&mut self, attr: Attr, value: Value) {
        self.values.insert(attr, value);
    }

    pub fn num(&self, attr: Attr) -> Option<f64> {
        self.get(attr).as_f64()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attr, &Value)> {
        self.values.iter().map(|(a, v)| (*a, v))
    }

    /// Number of simultaneous sub-events
    pub fn layers(&self) -> usize {
        self.values.values().map(Value::width).fold(1, lcm)
    }

    pub fn layer(&self, attr: Attr, index: usize) -> Value {
        self.get(attr).layer(index)
    }

    /// Apply the widest behavioural chord to the whole event.
    ///
    /// `pass` gives, for an attribute, how many full passes through its
    /// pattern have completed; round-robin chords advance once per pass.
    pub fn apply_behaviour(&mut self, pass: impl Fn(Attr) -> i64) {
        let widest = self
            .values
            .iter()
            .filter_map(|(attr, v)| match v {
                Value::Chord(c) if c.mode != ChordMode::Together && !c.is_empty() => Some((*attr, c.len())),
                _ => None,
            })
            .fold(None, |best: Option<(Attr, usize)>, (attr, n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((attr, n)),
            });

        let Some((carrier, n)) = widest else {
            return;
        };
        let Value::Chord(chord) = self.get(carrier).clone() else {
            return;
        };

        match chord.mode {
            ChordMode::Choose => {
                self.set(carrier, chord.items[fastrand::usize(..n)].clone());
            }
            ChordMode::Cycle => {
                let i = pass(carrier).rem_euclid(n as i64) as usize;
                self.set(carrier, chord.items[i].clone());
            }
            ChordMode::Subdivide => {
                let dur = self.num(Attr::Dur).unwrap_or(0.0);
                let offsets = Chord::new((0..n).map(|i| i as f64 * dur / n as f64));
                let delay = Value::combine(BinOp::Add, self.get(Attr::Delay), &Value::Chord(offsets));
                self.set(carrier, Value::Chord(Chord::new(chord.items)));
                self.set(Attr::Delay, delay);
            }
            ChordMode::Together => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers_use_lcm_of_widths() {
        let mut event = Event::new();
        event.set(Attr::Degree, Chord::new([0.0, 2.0]).into());
        event.set(Attr::Pan, Chord::new([-1.0, 0.0, 1.0]).into());
        event.set(Attr::Amp, 1.0.into());
        assert_eq!(event.layers(), 6);
        assert_eq!(event.layer(Attr::Degree, 3), Value::Num(2.0));
        assert_eq!(event.layer(Attr::Pan, 3), Value::Num(-1.0));
    }

    #[test]
    fn test_missing_attribute_is_nil() {
        assert_eq!(Event::new().get(Attr::Room), &Value::Nil);
    }

    #[test]
    fn test_cycle_advances_per_pass() {
        for (pass, expected) in [(0, 'x'), (1, 'o'), (2, 'x')] {
            let mut event = Event::new();
            event.set(Attr::Degree, Chord::with_mode(['x', 'o'], ChordMode::Cycle).into());
            event.apply_behaviour(|_| pass);
            assert_eq!(event.get(Attr::Degree), &Value::Char(expected));
        }
    }

    #[test]
    fn test_choose_picks_a_member() {
        let mut event = Event::new();
        event.set(Attr::Degree, Chord::with_mode(['a', 'b', 'c'], ChordMode::Choose).into());
        event.apply_behaviour(|_| 0);
        assert!(matches!(event.get(Attr::Degree), Value::Char('a' | 'b' | 'c')));
    }

    #[test]
    fn test_subdivide_spreads_delay() {
        let mut event = Event::new();
        event.set(Attr::Dur, 0.5.into());
        event.set(Attr::Delay, 0.0.into());
        event.set(Attr::Degree, Chord::with_mode(['x', 'o'], ChordMode::Subdivide).into());
        event.apply_behaviour(|_| 0);
        assert_eq!(event.layers(), 2);
        assert_eq!(event.layer(Attr::Degree, 1), Value::Char('o'));
        assert_eq!(event.layer(Attr::Delay, 1), Value::Num(0.25));
    }

    #[test]
    fn test_widest_behaviour_wins() {
        let mut event = Event::new();
        event.set(Attr::Degree, Chord::with_mode([0.0, 1.0, 2.0], ChordMode::Cycle).into());
        event.set(Attr::Pan, Chord::with_mode([-1.0, 1.0], ChordMode::Cycle).into());
        event.apply_behaviour(|_| 1);
        assert_eq!(event.get(Attr::Degree), &Value::Num(1.0));
        assert!(matches!(event.get(Attr::Pan), Value::Chord(_)));
    }
}

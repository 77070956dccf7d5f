//! Value streams: ordered, modular-indexed, arithmetic-composable sequences

use std::fmt;
use std::ops::{Add, Div, Mul, Rem, Sub};

use serde::{Deserialize, Serialize};

use crate::error::{OstinatoError, Result};
use crate::key::KeyExpr;
use crate::rest::Rest;
use crate::value::{lcm, BinOp, Chord, ChordMode, TimeVar, Value};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pattern {
    data: Vec<Value>,
}

impl Pattern {
    pub fn new(data: Vec<Value>) -> Self {
        Self { data }
    }

    pub const fn empty() -> Self {
        Self { data: Vec::new() }
    }

    pub fn single(value: impl Into<Value>) -> Self {
        Self { data: vec![value.into()] }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.data
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.data.iter()
    }

    /// Element at `index mod len`; negative indices wrap from the end
    pub fn at(&self, index: i64) -> Value {
        if self.data.is_empty() {
            return Value::Nil;
        }
        let i = index.rem_euclid(self.data.len() as i64) as usize;
        self.data[i].clone()
    }

    pub fn map(&self, f: impl Fn(&Value) -> Value) -> Pattern {
        Pattern::new(self.data.iter().map(f).collect())
    }

    /// Element-wise combination; the result is as long as the LCM of both lengths
    pub fn combine(&self, op: BinOp, other: &Pattern) -> Pattern {
        if self.is_empty() || other.is_empty() {
            return self.clone();
        }
        let n = lcm(self.len(), other.len());
        Pattern::new(
            (0..n)
                .map(|i| Value::combine(op, &self.data[i % self.len()], &other.data[i % other.len()]))
                .collect(),
        )
    }

    pub fn combine_value(&self, op: BinOp, value: &Value) -> Pattern {
        self.map(|v| Value::combine(op, v, value))
    }

    /// Time-reversal around `index`: the element at `index` stays put and
    /// later positions read earlier elements.
    pub fn pivot(&self, index: i64) -> Pattern {
        let n = self.len() as i64;
        if n == 0 {
            return self.clone();
        }
        Pattern::new((0..n).map(|k| self.at(2 * index - k)).collect())
    }

    pub fn shuffle(&self) -> Pattern {
        let mut data = self.data.clone();
        fastrand::shuffle(&mut data);
        Pattern::new(data)
    }

    pub fn mirror(&self) -> Pattern {
        Pattern::new(self.data.iter().rev().cloned().collect())
    }

    pub fn rotate(&self, n: i64) -> Pattern {
        if self.data.is_empty() {
            return self.clone();
        }
        let mut data = self.data.clone();
        let shift = n.rem_euclid(data.len() as i64) as usize;
        data.rotate_left(shift);
        Pattern::new(data)
    }

    /// The whole sequence played `n` times over
    pub fn repeat(&self, n: usize) -> Pattern {
        Pattern::new(self.data.iter().cloned().cycle().take(self.len() * n.max(1)).collect())
    }

    /// Random 0/1 mask of `len` slots where each slot is 1 with probability `p`
    pub fn bernoulli(len: usize, p: f64) -> Pattern {
        Pattern::new(
            (0..len.max(1))
                .map(|_| Value::Num(if fastrand::f64() < p { 1.0 } else { 0.0 }))
                .collect(),
        )
    }

    /// Deepest key reference chain held by any element
    pub fn reference_depth(&self) -> usize {
        self.data.iter().map(Value::reference_depth).max().unwrap_or(0)
    }

    /// Parse a sample play string.
    ///
    /// Plain characters select samples; `(xo)` alternates between members on
    /// each pass through the pattern, `{xo}` picks one at random, and `[xo]`
    /// squeezes its members into a single slot.
    pub fn parse_play_string(s: &str) -> Result<Pattern> {
        let mut data = Vec::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            let (close, mode) = match c {
                '(' => (')', ChordMode::Cycle),
                '{' => ('}', ChordMode::Choose),
                '[' => (']', ChordMode::Subdivide),
                ')' | '}' | ']' => return Err(OstinatoError::PlayString(s.to_string())),
                other => {
                    data.push(Value::Char(other));
                    continue;
                }
            };
            let mut members = Vec::new();
            loop {
                match chars.next() {
                    Some(m) if m == close => break,
                    Some('(' | '{' | '[' | ')' | '}' | ']') | None => {
                        return Err(OstinatoError::PlayString(s.to_string()));
                    }
                    Some(m) => members.push(Value::Char(m)),
                }
            }
            if members.is_empty() {
                data.push(Value::Char(' '));
            } else {
                data.push(Value::Chord(Chord { items: members, mode }));
            }
        }
        if data.is_empty() {
            data.push(Value::Char(' '));
        }
        Ok(Pattern::new(data))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("P[")?;
        for (i, v) in self.data.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{v}")?;
        }
        f.write_str("]")
    }
}

impl<'a> IntoIterator for &'a Pattern {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

impl FromIterator<Value> for Pattern {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Pattern::new(iter.into_iter().collect())
    }
}

impl From<Vec<Value>> for Pattern {
    fn from(data: Vec<Value>) -> Self {
        Pattern::new(data)
    }
}

impl From<Vec<f64>> for Pattern {
    fn from(data: Vec<f64>) -> Self {
        data.into_iter().map(Value::Num).collect()
    }
}

impl<const N: usize> From<[f64; N]> for Pattern {
    fn from(data: [f64; N]) -> Self {
        data.into_iter().map(Value::Num).collect()
    }
}

impl From<f64> for Pattern {
    fn from(n: f64) -> Self {
        Pattern::single(n)
    }
}

impl From<Value> for Pattern {
    fn from(v: Value) -> Self {
        Pattern::single(v)
    }
}

impl From<Rest> for Pattern {
    fn from(r: Rest) -> Self {
        Pattern::single(r)
    }
}

impl From<Chord> for Pattern {
    fn from(c: Chord) -> Self {
        Pattern::single(c)
    }
}

impl From<KeyExpr> for Pattern {
    fn from(k: KeyExpr) -> Self {
        Pattern::single(k)
    }
}

impl From<TimeVar> for Pattern {
    fn from(v: TimeVar) -> Self {
        Pattern::single(v)
    }
}

macro_rules! impl_pattern_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<Pattern> for Pattern {
            type Output = Pattern;
            fn $method(self, rhs: Pattern) -> Pattern { self.combine($op, &rhs) }
        }

        impl $trait<&Pattern> for &Pattern {
            type Output = Pattern;
            fn $method(self, rhs: &Pattern) -> Pattern { self.combine($op, rhs) }
        }

        impl $trait<f64> for Pattern {
            type Output = Pattern;
            fn $method(self, rhs: f64) -> Pattern { self.combine_value($op, &Value::Num(rhs)) }
        }

        impl $trait<Value> for Pattern {
            type Output = Pattern;
            fn $method(self, rhs: Value) -> Pattern { self.combine_value($op, &rhs) }
        }

        impl $trait<KeyExpr> for Pattern {
            type Output = Pattern;
            fn $method(self, rhs: KeyExpr) -> Pattern { self.combine_value($op, &Value::from(rhs)) }
        }

        impl $trait<Pattern> for f64 {
            type Output = Pattern;
            fn $method(self, rhs: Pattern) -> Pattern {
                rhs.map(|v| Value::combine($op, &Value::Num(self), v))
            }
        }
    };
}

impl_pattern_op!(Add, add, BinOp::Add);
impl_pattern_op!(Sub, sub, BinOp::Sub);
impl_pattern_op!(Mul, mul, BinOp::Mul);
impl_pattern_op!(Div, div, BinOp::Div);
impl_pattern_op!(Rem, rem, BinOp::Mod);

#[cfg(test)]
mod tests {
    use super::*;

    fn nums(p: &Pattern) -> Vec<f64> {
        p.iter().map(|v| v.as_f64().unwrap()).collect()
    }

    #[test]
    fn test_modular_index() {
        let p = Pattern::from([0.0, 2.0, 4.0]);
        assert_eq!(p.at(4), Value::Num(2.0));
        assert_eq!(p.at(-1), Value::Num(4.0));
        assert_eq!(Pattern::default().at(3), Value::Nil);
    }

    #[test]
    fn test_lcm_arithmetic() {
        let p = Pattern::from([0.0, 1.0]) + Pattern::from([10.0, 20.0, 30.0]);
        assert_eq!(nums(&p), vec![10.0, 21.0, 30.0, 11.0, 20.0, 31.0]);
        let p = 10.0 - Pattern::from([1.0, 2.0]);
        assert_eq!(nums(&p), vec![9.0, 8.0]);
    }

    #[test]
    fn test_mirror_twice_is_identity() {
        let p = Pattern::from([0.0, 2.0, 4.0, 7.0]);
        assert_eq!(nums(&p.mirror()), vec![7.0, 4.0, 2.0, 0.0]);
        assert_eq!(p.mirror().mirror(), p);
    }

    #[test]
    fn test_rotate_and_back_is_identity() {
        let p = Pattern::from([0.0, 2.0, 4.0, 7.0]);
        assert_eq!(nums(&p.rotate(1)), vec![2.0, 4.0, 7.0, 0.0]);
        for n in -5..=5 {
            assert_eq!(p.rotate(n).rotate(-n), p);
        }
    }

    #[test]
    fn test_shuffle_preserves_multiplicities() {
        let p = Pattern::from([0.0, 0.0, 1.0, 2.0, 2.0, 2.0]);
        let mut shuffled = nums(&p.shuffle());
        shuffled.sort_by(f64::total_cmp);
        assert_eq!(shuffled, nums(&p));
    }

    #[test]
    fn test_pivot_keeps_index_in_place() {
        let p = Pattern::from([0.0, 1.0, 2.0, 3.0]);
        let r = p.pivot(1);
        assert_eq!(r.at(1), Value::Num(1.0));
        assert_eq!(r.at(2), Value::Num(0.0));
        assert_eq!(r.at(0), Value::Num(2.0));
    }

    #[test]
    fn test_repeat() {
        let p = Pattern::from([1.0, 2.0]);
        assert_eq!(nums(&p.repeat(3)), vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn test_play_string() {
        let p = Pattern::parse_play_string("x-o-").unwrap();
        assert_eq!(
            p.values(),
            &[Value::Char('x'), Value::Char('-'), Value::Char('o'), Value::Char('-')]
        );

        let p = Pattern::parse_play_string("(xo)-[--]{ab}").unwrap();
        assert_eq!(p.len(), 4);
        assert_eq!(p.at(0), Value::Chord(Chord::with_mode(['x', 'o'], ChordMode::Cycle)));
        assert_eq!(p.at(2), Value::Chord(Chord::with_mode(['-', '-'], ChordMode::Subdivide)));
        assert_eq!(p.at(3), Value::Chord(Chord::with_mode(['a', 'b'], ChordMode::Choose)));
    }

    #[test]
    fn test_malformed_play_string() {
        assert!(Pattern::parse_play_string("x(o").is_err());
        assert!(Pattern::parse_play_string("x]").is_err());
        assert_eq!(Pattern::parse_play_string("").unwrap().values(), &[Value::Char(' ')]);
    }

    #[test]
    fn test_bernoulli_extremes() {
        assert!(Pattern::bernoulli(8, 1.0).iter().all(|v| *v == Value::Num(1.0)));
        assert!(Pattern::bernoulli(8, 0.0).iter().all(|v| *v == Value::Num(0.0)));
    }
}

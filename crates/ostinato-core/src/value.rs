//! Values carried by patterns and resolved events

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::key::{KeyExpr, Resolve};
use crate::rest::Rest;

/// Binary operation shared by pattern arithmetic and key expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    /// Apply to two numbers. Division and modulo by zero yield 0 so a
    /// running pattern never produces NaN.
    pub fn eval(self, a: f64, b: f64) -> f64 {
        let truth = |t: bool| if t { 1.0 } else { 0.0 };
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div if b == 0.0 => 0.0,
            Self::Div => a / b,
            Self::Mod if b == 0.0 => 0.0,
            Self::Mod => a.rem_euclid(b),
            Self::Pow => a.powf(b),
            Self::Eq => truth(a == b),
            Self::Ne => truth(a != b),
            Self::Lt => truth(a < b),
            Self::Le => truth(a <= b),
            Self::Gt => truth(a > b),
            Self::Ge => truth(a >= b),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Mod => "%",
            Self::Pow => "**",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// How a simultaneity group behaves when it lands in an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChordMode {
    /// All members sound together
    #[default]
    Together,
    /// One member chosen at random per event
    Choose,
    /// One member per pass through the pattern, in order
    Cycle,
    /// Members spread evenly across the event's duration
    Subdivide,
}

/// Simultaneity group: several values occupying one pattern slot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Chord {
    pub items: Vec<Value>,
    pub mode: ChordMode,
}

impl Chord {
    pub fn new(items: impl IntoIterator<Item = impl Into<Value>>) -> Self {
        Self::with_mode(items, ChordMode::Together)
    }

    pub fn with_mode(items: impl IntoIterator<Item = impl Into<Value>>, mode: ChordMode) -> Self {
        Self {
            items: items.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A value that steps through `values`, holding each for the matching
/// entry of `durs` beats, looping forever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeVar {
    pub values: Vec<f64>,
    pub durs: Vec<f64>,
}

impl TimeVar {
    pub fn new(values: Vec<f64>, durs: Vec<f64>) -> Self {
        Self { values, durs }
    }

    pub fn at(&self, beat: f64) -> f64 {
        let Some(&last) = self.values.last() else {
            return 0.0;
        };
        let total: f64 = self.durs.iter().sum();
        if total <= 0.0 {
            return self.values[0];
        }
        let t = beat.rem_euclid(total);
        let mut acc = 0.0;
        for (i, d) in self.durs.iter().enumerate() {
            if t < acc + d {
                return self.values[i % self.values.len()];
            }
            acc += d;
        }
        last
    }
}

/// One element of a pattern
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Nil,
    Num(f64),
    /// Sample selector character
    Char(char),
    Rest(Rest),
    Chord(Chord),
    /// Deferred reference to a player's resolved attribute
    Key(Box<KeyExpr>),
    Var(TimeVar),
}

impl Value {
    /// Numeric view. Chords use their first member, rests their duration.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Num(n) => Some(*n),
            Self::Rest(r) => Some(r.0),
            Self::Chord(c) => c.items.first().and_then(Value::as_f64),
            _ => None,
        }
    }

    pub fn is_rest(&self) -> bool {
        match self {
            Self::Rest(_) => true,
            Self::Chord(c) => c.items.first().is_some_and(Value::is_rest),
            _ => false,
        }
    }

    /// True while the value still needs evaluating against the clock or peers
    pub fn is_deferred(&self) -> bool {
        match self {
            Self::Key(_) | Self::Var(_) => true,
            Self::Chord(c) => c.items.iter().any(Value::is_deferred),
            _ => false,
        }
    }

    /// Number of simultaneous layers this value expands to
    pub fn width(&self) -> usize {
        match self {
            Self::Chord(c) if !c.is_empty() => {
                let inner = c.items.iter().map(Value::width).fold(1, lcm);
                c.len() * inner
            }
            _ => 1,
        }
    }

    /// Member of layer `index`, recursing through nested chords
    pub fn layer(&self, index: usize) -> Value {
        match self {
            Self::Chord(c) if !c.is_empty() => {
                let n = c.len();
                c.items[index % n].layer(index / n)
            }
            Self::Chord(_) => Value::Nil,
            other => other.clone(),
        }
    }

    /// Number of key references chained inside this value
    pub fn reference_depth(&self) -> usize {
        match self {
            Self::Key(k) => k.reference_depth(),
            Self::Chord(c) => c.items.iter().map(Value::reference_depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Evaluate keys and time-varying values, producing a concrete value
    pub fn resolve(&self, ctx: &mut dyn Resolve) -> Result<Value> {
        match self {
            Self::Key(key) => key.evaluate(ctx),
            Self::Var(var) => Ok(Value::Num(var.at(ctx.now()))),
            Self::Chord(c) => {
                let items = c.items.iter().map(|v| v.resolve(ctx)).collect::<Result<Vec<_>>>()?;
                Ok(Value::Chord(Chord { items, mode: c.mode }))
            }
            other => Ok(other.clone()),
        }
    }

    /// Element-wise binary operation. Deferred operands produce a deferred key.
    pub fn combine(op: BinOp, lhs: &Value, rhs: &Value) -> Value {
        match (lhs, rhs) {
            (Self::Key(_) | Self::Var(_), _) | (_, Self::Key(_) | Self::Var(_)) => {
                Value::Key(Box::new(KeyExpr::binary(
                    op,
                    KeyExpr::from(lhs.clone()),
                    KeyExpr::from(rhs.clone()),
                )))
            }
            (Self::Chord(a), Self::Chord(b)) => {
                if a.is_empty() || b.is_empty() {
                    return Value::Chord(Chord { items: Vec::new(), mode: a.mode });
                }
                let n = a.len().max(b.len());
                let items = (0..n)
                    .map(|i| Value::combine(op, &a.items[i % a.len()], &b.items[i % b.len()]))
                    .collect();
                Value::Chord(Chord { items, mode: a.mode })
            }
            (Self::Chord(a), r) => Value::Chord(Chord {
                items: a.items.iter().map(|x| Value::combine(op, x, r)).collect(),
                mode: a.mode,
            }),
            (l, Self::Chord(b)) => Value::Chord(Chord {
                items: b.items.iter().map(|x| Value::combine(op, l, x)).collect(),
                mode: b.mode,
            }),
            (Self::Num(a), Self::Num(b)) => Value::Num(op.eval(*a, *b)),
            (Self::Rest(a), Self::Num(b)) => Value::Rest(Rest(op.eval(a.0, *b))),
            (Self::Num(a), Self::Rest(b)) => Value::Rest(Rest(op.eval(*a, b.0))),
            (Self::Rest(a), Self::Rest(b)) => Value::Rest(Rest(op.eval(a.0, b.0))),
            (Self::Nil, _) | (_, Self::Nil) => Value::Nil,
            // Selector characters do not take part in arithmetic
            (Self::Char(c), _) | (_, Self::Char(c)) => Value::Char(*c),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("None"),
            Self::Num(n) => write!(f, "{n}"),
            Self::Char(c) => write!(f, "'{c}'"),
            Self::Rest(r) => write!(f, "{r}"),
            Self::Chord(c) => {
                let (open, close) = match c.mode {
                    ChordMode::Together => ("(", ")"),
                    ChordMode::Choose => ("{", "}"),
                    ChordMode::Cycle => ("<", ">"),
                    ChordMode::Subdivide => ("[", "]"),
                };
                f.write_str(open)?;
                for (i, item) in c.items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(close)
            }
            Self::Key(k) => write!(f, "{k}"),
            Self::Var(v) => write!(f, "var({:?}, {:?})", v.values, v.durs),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Num(n as f64)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Char(c)
    }
}

impl From<Rest> for Value {
    fn from(r: Rest) -> Self {
        Value::Rest(r)
    }
}

impl From<Chord> for Value {
    fn from(c: Chord) -> Self {
        Value::Chord(c)
    }
}

impl From<KeyExpr> for Value {
    fn from(k: KeyExpr) -> Self {
        match k {
            KeyExpr::Constant(v) => v,
            other => Value::Key(Box::new(other)),
        }
    }
}

impl From<TimeVar> for Value {
    fn from(v: TimeVar) -> Self {
        Value::Var(v)
    }
}

pub(crate) fn gcd(a: usize, b: usize) -> usize {
    if b == 0 { a } else { gcd(b, a % b) }
}

pub(crate) fn lcm(a: usize, b: usize) -> usize {
    if a == 0 || b == 0 {
        return a.max(b);
    }
    a / gcd(a, b) * b
}

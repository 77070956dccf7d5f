//! Deferred references to players' current attribute values
//!
//! A `KeyExpr` is a small expression tree whose leaves are constants or
//! `(player, attribute)` references. It is evaluated once per event against
//! the referenced players' resolved events, so one voice can follow or react
//! to another without owning it.

use std::fmt;
use std::ops::{Add, Div, Mul, Rem, Sub};

use serde::{Deserialize, Serialize};

use crate::attr::Attr;
use crate::error::{OstinatoError, Result};
use crate::player::PlayerId;
use crate::value::{BinOp, Value};

/// Default bound on chained references inside one expression
pub const DEFAULT_MAX_REFERENCE_DEPTH: usize = 32;

/// Evaluation context: the current beat and access to peers' resolved events.
pub trait Resolve {
    fn now(&self) -> f64;

    /// Current resolved value of `attr` on `player`, if that player exists
    fn peer_value(&mut self, player: PlayerId, attr: Attr) -> Option<Value>;

    fn max_depth(&self) -> usize {
        DEFAULT_MAX_REFERENCE_DEPTH
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyExpr {
    Constant(Value),
    Attr { player: PlayerId, attr: Attr },
    Binary {
        op: BinOp,
        left: Box<KeyExpr>,
        right: Box<KeyExpr>,
    },
}

impl KeyExpr {
    pub fn attr(player: PlayerId, attr: Attr) -> Self {
        Self::Attr { player, attr }
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Self::from(value.into())
    }

    pub fn binary(op: BinOp, left: KeyExpr, right: KeyExpr) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn apply(self, op: BinOp, rhs: impl Into<KeyExpr>) -> Self {
        Self::binary(op, self, rhs.into())
    }

    pub fn pow(self, rhs: impl Into<KeyExpr>) -> Self {
        self.apply(BinOp::Pow, rhs)
    }

    pub fn equals(self, rhs: impl Into<KeyExpr>) -> Self {
        self.apply(BinOp::Eq, rhs)
    }

    pub fn differs(self, rhs: impl Into<KeyExpr>) -> Self {
        self.apply(BinOp::Ne, rhs)
    }

    pub fn less(self, rhs: impl Into<KeyExpr>) -> Self {
        self.apply(BinOp::Lt, rhs)
    }

    pub fn less_eq(self, rhs: impl Into<KeyExpr>) -> Self {
        self.apply(BinOp::Le, rhs)
    }

    pub fn greater(self, rhs: impl Into<KeyExpr>) -> Self {
        self.apply(BinOp::Gt, rhs)
    }

    pub fn greater_eq(self, rhs: impl Into<KeyExpr>) -> Self {
        self.apply(BinOp::Ge, rhs)
    }

    /// Length of the longest chain of binary relationships
    pub fn reference_depth(&self) -> usize {
        match self {
            Self::Constant(v) => v.reference_depth(),
            Self::Attr { .. } => 0,
            Self::Binary { left, right, .. } => 1 + left.reference_depth().max(right.reference_depth()),
        }
    }

    /// Evaluate to a concrete value. Never mutates any player's patterns.
    pub fn evaluate(&self, ctx: &mut dyn Resolve) -> Result<Value> {
        let depth = self.reference_depth();
        if depth > ctx.max_depth() {
            return Err(OstinatoError::ReferenceDepth(ctx.max_depth()));
        }
        self.eval_inner(ctx)
    }

    fn eval_inner(&self, ctx: &mut dyn Resolve) -> Result<Value> {
        match self {
            Self::Constant(v) => v.resolve(ctx),
            Self::Attr { player, attr } => Ok(ctx.peer_value(*player, *attr).unwrap_or(Value::Nil)),
            Self::Binary { op, left, right } => {
                let l = left.eval_inner(ctx)?;
                let r = right.eval_inner(ctx)?;
                Ok(Value::combine(*op, &l, &r))
            }
        }
    }
}

impl fmt::Display for KeyExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(v) => write!(f, "{v}"),
            Self::Attr { player, attr } => write!(f, "{player}.{attr}"),
            Self::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
        }
    }
}

impl From<Value> for KeyExpr {
    fn from(value: Value) -> Self {
        match value {
            Value::Key(k) => *k,
            other => KeyExpr::Constant(other),
        }
    }
}

impl From<f64> for KeyExpr {
    fn from(n: f64) -> Self {
        KeyExpr::Constant(Value::Num(n))
    }
}

macro_rules! impl_key_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<R: Into<KeyExpr>> $trait<R> for KeyExpr {
            type Output = KeyExpr;
            fn $method(self, rhs: R) -> KeyExpr { self.apply($op, rhs) }
        }

        impl $trait<KeyExpr> for f64 {
            type Output = KeyExpr;
            fn $method(self, rhs: KeyExpr) -> KeyExpr { KeyExpr::from(self).apply($op, rhs) }
        }
    };
}

impl_key_op!(Add, add, BinOp::Add);
impl_key_op!(Sub, sub, BinOp::Sub);
impl_key_op!(Mul, mul, BinOp::Mul);
impl_key_op!(Div, div, BinOp::Div);
impl_key_op!(Rem, rem, BinOp::Mod);

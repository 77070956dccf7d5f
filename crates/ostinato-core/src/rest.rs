//! Rest marker for duration patterns

use std::fmt;
use std::ops::{Add, Div, Mul, Rem, Sub};

use serde::{Deserialize, Serialize};

/// A duration slot that consumes time without emitting a message.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rest(pub f64);

impl Rest {
    pub fn new(dur: f64) -> Self {
        Self(dur)
    }

    pub fn dur(&self) -> f64 {
        self.0
    }
}

impl Default for Rest {
    fn default() -> Self {
        Self(1.0)
    }
}

impl fmt::Display for Rest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<rest: {}>", self.0)
    }
}

macro_rules! impl_rest_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<f64> for Rest {
            type Output = Rest;
            fn $method(self, rhs: f64) -> Rest { Rest(self.0 $op rhs) }
        }

        impl $trait<Rest> for f64 {
            type Output = Rest;
            fn $method(self, rhs: Rest) -> Rest { Rest(self $op rhs.0) }
        }
    };
}

impl_rest_op!(Add, add, +);
impl_rest_op!(Sub, sub, -);
impl_rest_op!(Mul, mul, *);
impl_rest_op!(Div, div, /);
impl_rest_op!(Rem, rem, %);

impl From<Rest> for f64 {
    fn from(rest: Rest) -> f64 {
        rest.0
    }
}

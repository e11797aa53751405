use std::fmt::{Display, Formatter};
use std::num::ParseFloatError;
use std::str::FromStr;

use num_traits::{FromPrimitive, NumCast, ToPrimitive};

/// A `longdouble` value.
///
/// Values are held in memory with `f64` precision. The binary codec widens them to the 80-bit
/// extended format on write and narrows them on read.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct LongDouble(pub f64);

impl LongDouble {
    #[inline]
    pub const fn new(value: f64) -> Self {
        Self(value)
    }
}

impl From<f64> for LongDouble {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<LongDouble> for f64 {
    fn from(value: LongDouble) -> Self {
        value.0
    }
}

impl Display for LongDouble {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for LongDouble {
    type Err = ParseFloatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<f64>().map(Self)
    }
}

impl ToPrimitive for LongDouble {
    fn to_i64(&self) -> Option<i64> {
        self.0.to_i64()
    }

    fn to_u64(&self) -> Option<u64> {
        self.0.to_u64()
    }

    fn to_f32(&self) -> Option<f32> {
        self.0.to_f32()
    }

    fn to_f64(&self) -> Option<f64> {
        Some(self.0)
    }
}

impl FromPrimitive for LongDouble {
    fn from_i64(n: i64) -> Option<Self> {
        n.to_f64().map(Self)
    }

    fn from_u64(n: u64) -> Option<Self> {
        n.to_f64().map(Self)
    }

    fn from_f64(n: f64) -> Option<Self> {
        Some(Self(n))
    }
}

impl NumCast for LongDouble {
    fn from<T: ToPrimitive>(n: T) -> Option<Self> {
        n.to_f64().map(Self)
    }
}

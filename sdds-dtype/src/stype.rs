use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use num_traits::{FromPrimitive, NumCast, ToPrimitive};
use sdds_error::{SddsError, SddsResult, sdds_err};

use crate::LongDouble;

/// The closed set of scalar types a field can hold.
///
/// The discriminants are the on-disk type ordinals and must not change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum SType {
    /// An 80-bit extended precision float, `longdouble`
    F80 = 1,
    /// A 64-bit float, `double`
    F64 = 2,
    /// A 32-bit float, `float`
    F32 = 3,
    /// A signed 64-bit integer, `long64`
    I64 = 4,
    /// An unsigned 64-bit integer, `ulong64`
    U64 = 5,
    /// A signed 32-bit integer, `long`
    I32 = 6,
    /// An unsigned 32-bit integer, `ulong`
    U32 = 7,
    /// A signed 16-bit integer, `short`
    I16 = 8,
    /// An unsigned 16-bit integer, `ushort`
    U16 = 9,
    /// A single byte, `character`
    Char = 10,
    /// A variable length string, `string`
    String = 11,
}

impl SType {
    /// Every type, in ordinal order.
    pub const ALL: [SType; 11] = [
        SType::F80,
        SType::F64,
        SType::F32,
        SType::I64,
        SType::U64,
        SType::I32,
        SType::U32,
        SType::I16,
        SType::U16,
        SType::Char,
        SType::String,
    ];

    /// The stable 1-based ordinal of this type.
    #[inline]
    pub fn ordinal(self) -> u8 {
        self.into()
    }

    /// Look up a type by ordinal, returning `None` for values outside `1..=11`.
    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        u8::try_from(ordinal)
            .ok()
            .and_then(|o| Self::try_from(o).ok())
    }

    /// Returns true if `ordinal` names a type.
    pub fn valid(ordinal: i32) -> bool {
        Self::from_ordinal(ordinal).is_some()
    }

    /// The header name of this type.
    pub const fn name(self) -> &'static str {
        match self {
            SType::F80 => "longdouble",
            SType::F64 => "double",
            SType::F32 => "float",
            SType::I64 => "long64",
            SType::U64 => "ulong64",
            SType::I32 => "long",
            SType::U32 => "ulong",
            SType::I16 => "short",
            SType::U16 => "ushort",
            SType::Char => "character",
            SType::String => "string",
        }
    }

    /// Case-insensitive lookup of a header type name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
    }

    /// The number of bytes one value occupies in a binary page, or `None` for strings.
    pub const fn byte_width(self) -> Option<usize> {
        match self {
            SType::F80 => Some(16),
            SType::F64 | SType::I64 | SType::U64 => Some(8),
            SType::F32 | SType::I32 | SType::U32 => Some(4),
            SType::I16 | SType::U16 => Some(2),
            SType::Char => Some(1),
            SType::String => None,
        }
    }

    /// Returns true for the integer and floating point types.
    #[inline]
    pub const fn is_numeric(self) -> bool {
        !matches!(self, SType::Char | SType::String)
    }

    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            SType::I64 | SType::U64 | SType::I32 | SType::U32 | SType::I16 | SType::U16
        )
    }

    #[inline]
    pub const fn is_floating(self) -> bool {
        matches!(self, SType::F80 | SType::F64 | SType::F32)
    }

    #[inline]
    pub const fn is_unsigned(self) -> bool {
        matches!(self, SType::U64 | SType::U32 | SType::U16)
    }

    /// The lowest header version able to declare this type.
    pub const fn min_version(self) -> u32 {
        match self {
            SType::U16 | SType::U32 => 2,
            SType::F80 => 3,
            SType::I64 | SType::U64 => 4,
            _ => 1,
        }
    }
}

impl Display for SType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SType {
    type Err = SddsError;

    fn from_str(s: &str) -> SddsResult<Self> {
        Self::from_name(s).ok_or_else(|| sdds_err!(TypeMismatch: "unknown data type {}", s))
    }
}

/// A Rust type that stores values of a numeric [`SType`].
pub trait NativeSType:
    Send
    + Sync
    + Clone
    + Copy
    + Debug
    + Display
    + Default
    + PartialEq
    + PartialOrd
    + NumCast
    + ToPrimitive
    + FromPrimitive
    + FromStr
    + 'static
{
    /// The type this native type stores.
    const STYPE: SType;

    /// Convert a double into this type, truncating toward zero for integers.
    fn from_f64_lossy(value: f64) -> Option<Self> {
        <Self as NumCast>::from(value)
    }

    /// Widen to a double.
    fn to_f64_lossy(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }
}

macro_rules! native_stype {
    ($T:ty, $stype:tt) => {
        impl NativeSType for $T {
            const STYPE: SType = SType::$stype;
        }
    };
}

native_stype!(LongDouble, F80);
native_stype!(f64, F64);
native_stype!(f32, F32);
native_stype!(i64, I64);
native_stype!(u64, U64);
native_stype!(i32, I32);
native_stype!(u32, U32);
native_stype!(i16, I16);
native_stype!(u16, U16);

/// Dispatch on a numeric [`SType`], binding `$T` to its native Rust type.
///
/// Panics if the type is `character` or `string`; callers handle those first.
#[macro_export]
macro_rules! match_each_numeric_stype {
    ($self:expr, | $_:tt $enc:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $enc:ident ) => ( $($body)* )}
        #[allow(unused_imports)]
        use $crate::LongDouble;
        let stype: $crate::SType = $self;
        match stype {
            $crate::SType::F80 => __with__! { LongDouble },
            $crate::SType::F64 => __with__! { f64 },
            $crate::SType::F32 => __with__! { f32 },
            $crate::SType::I64 => __with__! { i64 },
            $crate::SType::U64 => __with__! { u64 },
            $crate::SType::I32 => __with__! { i32 },
            $crate::SType::U32 => __with__! { u32 },
            $crate::SType::I16 => __with__! { i16 },
            $crate::SType::U16 => __with__! { u16 },
            $crate::SType::Char | $crate::SType::String => {
                #[allow(clippy::panic)]
                {
                    panic!("{} is not a numeric type", stype)
                }
            }
        }
    })
}

/// Dispatch on an integer [`SType`], binding `$T` to its native Rust type.
#[macro_export]
macro_rules! match_each_integer_stype {
    ($self:expr, | $_:tt $enc:ident | $($body:tt)*) => ({
        macro_rules! __with__ {( $_ $enc:ident ) => ( $($body)* )}
        let stype: $crate::SType = $self;
        match stype {
            $crate::SType::I64 => __with__! { i64 },
            $crate::SType::U64 => __with__! { u64 },
            $crate::SType::I32 => __with__! { i32 },
            $crate::SType::U32 => __with__! { u32 },
            $crate::SType::I16 => __with__! { i16 },
            $crate::SType::U16 => __with__! { u16 },
            _ => {
                #[allow(clippy::panic)]
                {
                    panic!("{} is not an integer type", stype)
                }
            }
        }
    })
}

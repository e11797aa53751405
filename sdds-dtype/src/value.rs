use std::fmt::{Display, Formatter};

use log::warn;
use num_traits::{NumCast, ToPrimitive};
use paste::paste;
use sdds_error::{SddsResult, sdds_bail, sdds_err};

use crate::escape::unescape_bytes;
use crate::{LongDouble, NativeSType, SType, match_each_numeric_stype};

/// A single typed cell: a parameter value, an array element or one row of a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    F80(LongDouble),
    F64(f64),
    F32(f32),
    I64(i64),
    U64(u64),
    I32(i32),
    U32(u32),
    I16(i16),
    U16(u16),
    Char(u8),
    String(String),
}

macro_rules! as_native {
    ($T:ident) => {
        paste! {
            #[doc = "Access the value as `" $T "`, returning `None` if it is not numeric or does not fit"]
            pub fn [<as_ $T>](&self) -> Option<$T> {
                match self {
                    Value::F80(v) => <$T as NumCast>::from(*v),
                    Value::F64(v) => <$T as NumCast>::from(*v),
                    Value::F32(v) => <$T as NumCast>::from(*v),
                    Value::I64(v) => <$T as NumCast>::from(*v),
                    Value::U64(v) => <$T as NumCast>::from(*v),
                    Value::I32(v) => <$T as NumCast>::from(*v),
                    Value::U32(v) => <$T as NumCast>::from(*v),
                    Value::I16(v) => <$T as NumCast>::from(*v),
                    Value::U16(v) => <$T as NumCast>::from(*v),
                    Value::Char(_) | Value::String(_) => None,
                }
            }
        }
    };
}

impl Value {
    pub fn stype(&self) -> SType {
        match self {
            Value::F80(_) => SType::F80,
            Value::F64(_) => SType::F64,
            Value::F32(_) => SType::F32,
            Value::I64(_) => SType::I64,
            Value::U64(_) => SType::U64,
            Value::I32(_) => SType::I32,
            Value::U32(_) => SType::U32,
            Value::I16(_) => SType::I16,
            Value::U16(_) => SType::U16,
            Value::Char(_) => SType::Char,
            Value::String(_) => SType::String,
        }
    }

    /// The zero value of a type: `0` for numbers, a NUL byte for characters and `""` for strings.
    pub fn zero(stype: SType) -> Self {
        match stype {
            SType::Char => Value::Char(0),
            SType::String => Value::String(String::new()),
            numeric => match_each_numeric_stype!(numeric, |$T| Value::from(<$T>::default())),
        }
    }

    as_native!(f64);
    as_native!(f32);
    as_native!(i64);
    as_native!(u64);
    as_native!(i32);
    as_native!(u32);
    as_native!(i16);
    as_native!(u16);

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a numeric value to the native type `T`.
    pub fn as_native<T: NativeSType>(&self) -> Option<T> {
        match self {
            Value::F80(v) => <T as NumCast>::from(*v),
            Value::F64(v) => <T as NumCast>::from(*v),
            Value::F32(v) => <T as NumCast>::from(*v),
            Value::I64(v) => <T as NumCast>::from(*v),
            Value::U64(v) => <T as NumCast>::from(*v),
            Value::I32(v) => <T as NumCast>::from(*v),
            Value::U32(v) => <T as NumCast>::from(*v),
            Value::I16(v) => <T as NumCast>::from(*v),
            Value::U16(v) => <T as NumCast>::from(*v),
            Value::Char(_) | Value::String(_) => None,
        }
    }

    /// Convert into `target`.
    ///
    /// Numeric values convert to any numeric type whose range holds them, with floats truncated
    /// toward zero when the target is an integer. A conversion that changes the value is logged.
    /// Characters and strings only convert to their own type.
    pub fn cast(&self, target: SType) -> SddsResult<Value> {
        let converted = self.convert(target)?;
        if !self.survives(&converted) {
            warn!("{} value {} became {} as {}", self.stype(), self, converted, target);
        }
        Ok(converted)
    }

    /// Convert into `target` only when no information is lost, so that converting back gives
    /// this value again.
    pub fn cast_exact(&self, target: SType) -> Option<Value> {
        let converted = self.convert(target).ok()?;
        self.survives(&converted).then_some(converted)
    }

    fn survives(&self, converted: &Value) -> bool {
        if converted.stype() == self.stype() {
            return true;
        }
        let nan = |v: &Value| v.as_f64().is_some_and(f64::is_nan);
        match converted.convert(self.stype()) {
            Ok(back) => back == *self || (nan(self) && nan(&back)),
            Err(_) => false,
        }
    }

    fn convert(&self, target: SType) -> SddsResult<Value> {
        let source = self.stype();
        if source == target {
            return Ok(self.clone());
        }
        if !source.is_numeric() || !target.is_numeric() {
            sdds_bail!(TypeMismatch: "cannot convert {} value to {}", source, target);
        }
        match_each_numeric_stype!(target, |$T| {
            self.as_native::<$T>().map(Value::from).ok_or_else(|| {
                sdds_err!(TypeMismatch: "{} value {} does not fit in {}", source, self, target)
            })
        })
    }

    /// Parse a text token as a value of `stype`.
    ///
    /// The token is expected to be unquoted already. Escapes are interpreted for characters and
    /// strings; an empty character token is a NUL byte.
    pub fn parse(stype: SType, token: &str) -> SddsResult<Value> {
        match stype {
            SType::String => Ok(Value::String(crate::escape::unescape(token).into_owned())),
            SType::Char => Ok(Value::Char(
                unescape_bytes(token).first().copied().unwrap_or(0),
            )),
            numeric => match_each_numeric_stype!(numeric, |$T| parse_native::<$T>(token).map(Value::from)),
        }
    }
}

/// Parse a numeric token, accepting floating point text for integer types.
pub fn parse_native<T: NativeSType>(token: &str) -> SddsResult<T> {
    let token = token.trim();
    if let Ok(v) = token.parse::<T>() {
        return Ok(v);
    }
    let token = token.strip_prefix('+').unwrap_or(token);
    token
        .parse::<f64>()
        .ok()
        .and_then(T::from_f64_lossy)
        .ok_or_else(|| sdds_err!(TypeMismatch: "unable to parse {:?} as {}", token, T::STYPE))
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::F80(v) => Display::fmt(v, f),
            Value::F64(v) => Display::fmt(v, f),
            Value::F32(v) => Display::fmt(v, f),
            Value::I64(v) => Display::fmt(v, f),
            Value::U64(v) => Display::fmt(v, f),
            Value::I32(v) => Display::fmt(v, f),
            Value::U32(v) => Display::fmt(v, f),
            Value::I16(v) => Display::fmt(v, f),
            Value::U16(v) => Display::fmt(v, f),
            Value::Char(c) => Display::fmt(&(*c as char), f),
            Value::String(s) => Display::fmt(s, f),
        }
    }
}

macro_rules! value_from {
    ($T:ty, $variant:ident) => {
        impl From<$T> for Value {
            fn from(value: $T) -> Self {
                Value::$variant(value)
            }
        }
    };
}

value_from!(LongDouble, F80);
value_from!(f64, F64);
value_from!(f32, F32);
value_from!(i64, I64);
value_from!(u64, U64);
value_from!(i32, I32);
value_from!(u32, U32);
value_from!(i16, I16);
value_from!(u16, U16);
value_from!(u8, Char);
value_from!(String, String);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl ToPrimitive for Value {
    fn to_i64(&self) -> Option<i64> {
        self.as_i64()
    }

    fn to_u64(&self) -> Option<u64> {
        self.as_u64()
    }

    fn to_f64(&self) -> Option<f64> {
        self.as_f64()
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    #[rstest]
    #[case(SType::F64, "1.5e3", Value::F64(1500.0))]
    #[case(SType::F32, "-0.25", Value::F32(-0.25))]
    #[case(SType::F80, "2", Value::F80(LongDouble(2.0)))]
    #[case(SType::I32, "-42", Value::I32(-42))]
    #[case(SType::I32, "+7", Value::I32(7))]
    #[case(SType::I16, "3.9", Value::I16(3))]
    #[case(SType::U64, "18446744073709551615", Value::U64(u64::MAX))]
    #[case(SType::Char, "x", Value::Char(b'x'))]
    #[case(SType::Char, "", Value::Char(0))]
    #[case(SType::Char, r"\t", Value::Char(b'\t'))]
    #[case(SType::String, r#"a\"b"#, Value::String("a\"b".to_string()))]
    fn parse_tokens(#[case] stype: SType, #[case] token: &str, #[case] expected: Value) {
        assert_eq!(Value::parse(stype, token).unwrap(), expected);
    }

    #[rstest]
    #[case(SType::I32, "abc")]
    #[case(SType::U16, "-1")]
    #[case(SType::U16, "70000")]
    #[case(SType::F64, "")]
    fn parse_failures(#[case] stype: SType, #[case] token: &str) {
        let err = Value::parse(stype, token).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn numeric_casts() {
        assert_eq!(Value::I32(5).cast(SType::F64).unwrap(), Value::F64(5.0));
        assert_eq!(Value::F64(2.7).cast(SType::I64).unwrap(), Value::I64(2));
        assert_eq!(Value::U16(9).cast(SType::F80).unwrap(), Value::F80(LongDouble(9.0)));
        assert_eq!(
            Value::I32(-1).cast(SType::U32).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
    }

    #[rstest]
    #[case(Value::F64(3.0), SType::I32, Some(Value::I32(3)))]
    #[case(Value::F64(1.5), SType::I32, None)]
    #[case(Value::F64(-0.5), SType::I16, None)]
    #[case(Value::I64(1 << 53), SType::F64, Some(Value::F64(9_007_199_254_740_992.0)))]
    #[case(Value::I64((1 << 53) + 1), SType::F64, None)]
    #[case(Value::F64(0.1), SType::F32, None)]
    #[case(Value::F32(0.5), SType::F64, Some(Value::F64(0.5)))]
    #[case(Value::U64(u64::MAX), SType::F64, None)]
    #[case(Value::I32(-1), SType::U16, None)]
    #[case(Value::from("7"), SType::I32, None)]
    fn exact_casts(#[case] value: Value, #[case] target: SType, #[case] expected: Option<Value>) {
        assert_eq!(value.cast_exact(target), expected);
    }

    #[test]
    fn nan_survives_exact_cast() {
        let cast = Value::F64(f64::NAN).cast_exact(SType::F32).unwrap();
        assert!(cast.as_f64().unwrap().is_nan());
    }

    #[test]
    fn non_numeric_casts_fail() {
        assert_eq!(
            Value::from("1.0").cast(SType::F64).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
        assert_eq!(
            Value::F64(1.0).cast(SType::String).unwrap_err().kind(),
            ErrorKind::TypeMismatch
        );
        assert_eq!(Value::Char(b'a').cast(SType::Char).unwrap(), Value::Char(b'a'));
    }

    #[rstest]
    fn zero_matches_type(#[values(
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
        SType::String
    )] stype: SType) {
        let zero = Value::zero(stype);
        assert_eq!(zero.stype(), stype);
        assert_eq!(zero.as_f64().is_some(), stype.is_numeric());
    }
}

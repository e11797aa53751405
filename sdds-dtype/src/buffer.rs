use std::ops::Range;

use log::warn;
use num_traits::NumCast;
use paste::paste;
use sdds_error::{SddsResult, sdds_bail, sdds_err};

use crate::{LongDouble, NativeSType, SType, Value, match_each_numeric_stype};

/// An owned vector of values of a single [`SType`].
///
/// Columns, arrays and parsed batches of tokens are all stored as typed buffers.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedBuffer {
    F80(Vec<LongDouble>),
    F64(Vec<f64>),
    F32(Vec<f32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    Char(Vec<u8>),
    String(Vec<String>),
}

/// Run `$body` with `$v` bound to the inner vector, whatever its element type.
macro_rules! each_vec {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            TypedBuffer::F80($v) => $body,
            TypedBuffer::F64($v) => $body,
            TypedBuffer::F32($v) => $body,
            TypedBuffer::I64($v) => $body,
            TypedBuffer::U64($v) => $body,
            TypedBuffer::I32($v) => $body,
            TypedBuffer::U32($v) => $body,
            TypedBuffer::I16($v) => $body,
            TypedBuffer::U16($v) => $body,
            TypedBuffer::Char($v) => $body,
            TypedBuffer::String($v) => $body,
        }
    };
}

/// Like `each_vec!` but rebuilding a buffer of the same variant from `$body`.
macro_rules! map_vec {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            TypedBuffer::F80($v) => TypedBuffer::F80($body),
            TypedBuffer::F64($v) => TypedBuffer::F64($body),
            TypedBuffer::F32($v) => TypedBuffer::F32($body),
            TypedBuffer::I64($v) => TypedBuffer::I64($body),
            TypedBuffer::U64($v) => TypedBuffer::U64($body),
            TypedBuffer::I32($v) => TypedBuffer::I32($body),
            TypedBuffer::U32($v) => TypedBuffer::U32($body),
            TypedBuffer::I16($v) => TypedBuffer::I16($body),
            TypedBuffer::U16($v) => TypedBuffer::U16($body),
            TypedBuffer::Char($v) => TypedBuffer::Char($body),
            TypedBuffer::String($v) => TypedBuffer::String($body),
        }
    };
}

/// Like `each_vec!` for the numeric variants only, with `$other` evaluated for characters and
/// strings.
macro_rules! each_numeric_vec {
    ($buf:expr, $v:ident => $body:expr, _ => $other:expr) => {
        match $buf {
            TypedBuffer::F80($v) => $body,
            TypedBuffer::F64($v) => $body,
            TypedBuffer::F32($v) => $body,
            TypedBuffer::I64($v) => $body,
            TypedBuffer::U64($v) => $body,
            TypedBuffer::I32($v) => $body,
            TypedBuffer::U32($v) => $body,
            TypedBuffer::I16($v) => $body,
            TypedBuffer::U16($v) => $body,
            TypedBuffer::Char(_) | TypedBuffer::String(_) => $other,
        }
    };
}

macro_rules! as_slice {
    ($T:ident, $variant:ident) => {
        paste! {
            #[doc = "The values as a `" $T "` slice, or `None` if the buffer holds another type"]
            pub fn [<as_ $variant:lower>](&self) -> Option<&[$T]> {
                match self {
                    TypedBuffer::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl TypedBuffer {
    /// A zero-filled buffer of `len` values.
    pub fn zeroed(stype: SType, len: usize) -> Self {
        match stype {
            SType::Char => TypedBuffer::Char(vec![0; len]),
            SType::String => TypedBuffer::String(vec![String::new(); len]),
            numeric => match_each_numeric_stype!(numeric, |$T| TypedBuffer::from(vec![<$T>::default(); len])),
        }
    }

    /// An empty buffer with room for `capacity` values.
    pub fn with_capacity(stype: SType, capacity: usize) -> Self {
        match stype {
            SType::Char => TypedBuffer::Char(Vec::with_capacity(capacity)),
            SType::String => TypedBuffer::String(Vec::with_capacity(capacity)),
            numeric => match_each_numeric_stype!(numeric, |$T| TypedBuffer::from(Vec::<$T>::with_capacity(capacity))),
        }
    }

    pub fn stype(&self) -> SType {
        match self {
            TypedBuffer::F80(_) => SType::F80,
            TypedBuffer::F64(_) => SType::F64,
            TypedBuffer::F32(_) => SType::F32,
            TypedBuffer::I64(_) => SType::I64,
            TypedBuffer::U64(_) => SType::U64,
            TypedBuffer::I32(_) => SType::I32,
            TypedBuffer::U32(_) => SType::U32,
            TypedBuffer::I16(_) => SType::I16,
            TypedBuffer::U16(_) => SType::U16,
            TypedBuffer::Char(_) => SType::Char,
            TypedBuffer::String(_) => SType::String,
        }
    }

    pub fn len(&self) -> usize {
        each_vec!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow or shrink to `len`, filling new slots with zero values.
    pub fn resize(&mut self, len: usize) {
        match self {
            TypedBuffer::String(v) => v.resize(len, String::new()),
            TypedBuffer::Char(v) => v.resize(len, 0),
            other => each_numeric_vec!(other, v => v.resize(len, Default::default()), _ => {}),
        }
    }

    pub fn truncate(&mut self, len: usize) {
        each_vec!(self, v => v.truncate(len))
    }

    pub fn clear(&mut self) {
        each_vec!(self, v => v.clear())
    }

    /// The value at `index`.
    pub fn get(&self, index: usize) -> Option<Value> {
        match self {
            TypedBuffer::String(v) => v.get(index).cloned().map(Value::String),
            TypedBuffer::Char(v) => v.get(index).copied().map(Value::Char),
            other => each_numeric_vec!(other, v => v.get(index).copied().map(Value::from), _ => None),
        }
    }

    /// Overwrite the value at `index`, converting `value` to this buffer's type.
    pub fn set(&mut self, index: usize, value: &Value) -> SddsResult<()> {
        let len = self.len();
        if index >= len {
            sdds_bail!(OutOfRange: "index {} is beyond the buffer length {}", index, len);
        }
        let stype = self.stype();
        match (self, value.cast(stype)?) {
            (TypedBuffer::F80(v), Value::F80(x)) => v[index] = x,
            (TypedBuffer::F64(v), Value::F64(x)) => v[index] = x,
            (TypedBuffer::F32(v), Value::F32(x)) => v[index] = x,
            (TypedBuffer::I64(v), Value::I64(x)) => v[index] = x,
            (TypedBuffer::U64(v), Value::U64(x)) => v[index] = x,
            (TypedBuffer::I32(v), Value::I32(x)) => v[index] = x,
            (TypedBuffer::U32(v), Value::U32(x)) => v[index] = x,
            (TypedBuffer::I16(v), Value::I16(x)) => v[index] = x,
            (TypedBuffer::U16(v), Value::U16(x)) => v[index] = x,
            (TypedBuffer::Char(v), Value::Char(x)) => v[index] = x,
            (TypedBuffer::String(v), Value::String(x)) => v[index] = x,
            (_, other) => sdds_bail!(TypeMismatch: "cannot store {} in a {} buffer", other.stype(), stype),
        }
        Ok(())
    }

    /// Append a value, converting it to this buffer's type.
    pub fn push(&mut self, value: &Value) -> SddsResult<()> {
        let len = self.len();
        self.resize(len + 1);
        self.set(len, value).inspect_err(|_| self.truncate(len))
    }

    /// Build a buffer of `stype` from a list of values.
    pub fn from_values(stype: SType, values: &[Value]) -> SddsResult<Self> {
        let mut buffer = TypedBuffer::zeroed(stype, values.len());
        for (i, value) in values.iter().enumerate() {
            buffer.set(i, value)?;
        }
        Ok(buffer)
    }

    /// Copy of the values at `range`.
    pub fn slice(&self, range: Range<usize>) -> SddsResult<Self> {
        if range.start > range.end || range.end > self.len() {
            sdds_bail!(OutOfRange: "range {:?} is outside the buffer length {}", range, self.len());
        }
        Ok(map_vec!(self, v => v[range].to_vec()))
    }

    /// Copy of the values at `indices`, in order.
    pub fn take(&self, indices: &[usize]) -> SddsResult<Self> {
        let len = self.len();
        if let Some(bad) = indices.iter().find(|&&i| i >= len) {
            sdds_bail!(OutOfRange: "index {} is beyond the buffer length {}", bad, len);
        }
        Ok(map_vec!(self, v => indices.iter().map(|&i| v[i].clone()).collect()))
    }

    /// Write `source` into this buffer starting at `offset`, growing it if needed.
    pub fn splice(&mut self, offset: usize, source: &TypedBuffer) -> SddsResult<()> {
        let source = source.cast(self.stype())?;
        let end = offset + source.len();
        if self.len() < end {
            self.resize(end);
        }
        match (self, source) {
            (TypedBuffer::String(dst), TypedBuffer::String(src)) => {
                for (d, s) in dst[offset..end].iter_mut().zip(src) {
                    *d = s;
                }
            }
            (dst, src) => {
                for i in 0..src.len() {
                    if let Some(value) = src.get(i) {
                        dst.set(offset + i, &value)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Convert every value to `target`.
    ///
    /// Numeric buffers convert to any numeric type; a value out of range for the target is a
    /// `TypeMismatch`, and values that change on the way are counted in one warning. Character
    /// and string buffers only convert to their own type.
    pub fn cast(&self, target: SType) -> SddsResult<Self> {
        let source = self.stype();
        if source == target {
            return Ok(self.clone());
        }
        if !source.is_numeric() || !target.is_numeric() {
            sdds_bail!(TypeMismatch: "cannot convert {} data to {}", source, target);
        }
        let mut changed = 0usize;
        let converted = match_each_numeric_stype!(target, |$T| {
            let converted: SddsResult<Vec<$T>> = each_numeric_vec!(self, v => v
                .iter()
                .map(|x| -> SddsResult<$T> {
                    let y = <$T as NumCast>::from(*x).ok_or_else(|| {
                        sdds_err!(TypeMismatch: "{} value {} does not fit in {}", source, x, target)
                    })?;
                    if !converts_back(*x, y) {
                        changed += 1;
                    }
                    Ok(y)
                })
                .collect(), _ => unreachable!("checked numeric"));
            converted.map(TypedBuffer::from)
        })?;
        if changed > 0 {
            warn!("{} of {} values changed converting {} data to {}", changed, self.len(), source, target);
        }
        Ok(converted)
    }

    /// Fresh vector of doubles converted from a numeric buffer.
    pub fn to_f64_vec(&self) -> SddsResult<Vec<f64>> {
        each_numeric_vec!(self, v => Ok(v.iter().map(|x| x.to_f64_lossy()).collect()),
            _ => Err(sdds_err!(TypeMismatch: "{} data is not numeric", self.stype())))
    }

    /// The values as strings, for string buffers.
    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            TypedBuffer::String(v) => Some(v),
            _ => None,
        }
    }

    /// The values as characters, for character buffers.
    pub fn as_chars(&self) -> Option<&[u8]> {
        match self {
            TypedBuffer::Char(v) => Some(v),
            _ => None,
        }
    }

    as_slice!(LongDouble, F80);
    as_slice!(f64, F64);
    as_slice!(f32, F32);
    as_slice!(i64, I64);
    as_slice!(u64, U64);
    as_slice!(i32, I32);
    as_slice!(u32, U32);
    as_slice!(i16, I16);
    as_slice!(u16, U16);

    /// Iterate over the values.
    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }
}

macro_rules! buffer_from {
    ($T:ty, $variant:ident) => {
        impl From<Vec<$T>> for TypedBuffer {
            fn from(value: Vec<$T>) -> Self {
                TypedBuffer::$variant(value)
            }
        }
    };
}

buffer_from!(LongDouble, F80);
buffer_from!(f64, F64);
buffer_from!(f32, F32);
buffer_from!(i64, I64);
buffer_from!(u64, U64);
buffer_from!(i32, I32);
buffer_from!(u32, U32);
buffer_from!(i16, I16);
buffer_from!(u16, U16);
buffer_from!(u8, Char);
buffer_from!(String, String);

impl From<Vec<&str>> for TypedBuffer {
    fn from(value: Vec<&str>) -> Self {
        TypedBuffer::String(value.into_iter().map(String::from).collect())
    }
}

/// Typed access to the vector behind a [`TypedBuffer`] of a numeric type.
pub trait NativeBuffer: NativeSType {
    fn slice(buffer: &TypedBuffer) -> Option<&[Self]>;
}

macro_rules! native_buffer {
    ($T:ty, $variant:ident) => {
        impl NativeBuffer for $T {
            fn slice(buffer: &TypedBuffer) -> Option<&[Self]> {
                match buffer {
                    TypedBuffer::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

native_buffer!(LongDouble, F80);
native_buffer!(f64, F64);
native_buffer!(f32, F32);
native_buffer!(i64, I64);
native_buffer!(u64, U64);
native_buffer!(i32, I32);
native_buffer!(u32, U32);
native_buffer!(i16, I16);
native_buffer!(u16, U16);

/// Whether `converted` turns back into `original`, counting NaN as equal to NaN.
fn converts_back<S: NativeSType, T: NativeSType>(original: S, converted: T) -> bool {
    let nan = |v: Option<f64>| v.is_some_and(f64::is_nan);
    <S as NumCast>::from(converted).is_some_and(|back| back == original)
        || (nan(original.to_f64()) && nan(converted.to_f64()))
}

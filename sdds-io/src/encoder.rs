use std::io::Write;

use bytes::{BufMut, Bytes, BytesMut};
use sdds_dtype::{TypedBuffer, Value};
use sdds_error::{SddsResult, sdds_bail};

use crate::{BinaryScalar, ByteOrder};

/// Accumulates binary page data in memory in a fixed byte order.
pub struct Encoder {
    buf: BytesMut,
    order: ByteOrder,
}

impl Encoder {
    pub fn new(order: ByteOrder) -> Self {
        Self {
            buf: BytesMut::new(),
            order,
        }
    }

    pub fn with_capacity(order: ByteOrder, capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            order,
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_scalar<T: BinaryScalar>(&mut self, value: T) {
        value.put(&mut self.buf, self.order);
    }

    pub fn put_i32(&mut self, value: i32) {
        self.put_scalar(value);
    }

    pub fn put_i64(&mut self, value: i64) {
        self.put_scalar(value);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Write a string as an `i32` byte length followed by the bytes.
    pub fn put_string(&mut self, value: &str) -> SddsResult<()> {
        let Ok(len) = i32::try_from(value.len()) else {
            sdds_bail!(OutOfRange: "string of {} bytes is too long to encode", value.len());
        };
        self.put_i32(len);
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    pub fn put_value(&mut self, value: &Value) -> SddsResult<()> {
        match value {
            Value::F80(v) => self.put_scalar(*v),
            Value::F64(v) => self.put_scalar(*v),
            Value::F32(v) => self.put_scalar(*v),
            Value::I64(v) => self.put_scalar(*v),
            Value::U64(v) => self.put_scalar(*v),
            Value::I32(v) => self.put_scalar(*v),
            Value::U32(v) => self.put_scalar(*v),
            Value::I16(v) => self.put_scalar(*v),
            Value::U16(v) => self.put_scalar(*v),
            Value::Char(v) => self.buf.put_u8(*v),
            Value::String(v) => self.put_string(v)?,
        }
        Ok(())
    }

    /// Write every element of `buffer` contiguously.
    pub fn put_buffer(&mut self, buffer: &TypedBuffer) -> SddsResult<()> {
        self.put_buffer_range(buffer, 0, buffer.len())
    }

    /// Write elements `start..end` of `buffer` contiguously.
    pub fn put_buffer_range(
        &mut self,
        buffer: &TypedBuffer,
        start: usize,
        end: usize,
    ) -> SddsResult<()> {
        if start > end || end > buffer.len() {
            sdds_bail!(OutOfRange: "range {}..{} outside buffer of {}", start, end, buffer.len());
        }
        macro_rules! scalars {
            ($values:expr) => {
                for v in &$values[start..end] {
                    self.put_scalar(*v);
                }
            };
        }
        match buffer {
            TypedBuffer::F80(v) => scalars!(v),
            TypedBuffer::F64(v) => scalars!(v),
            TypedBuffer::F32(v) => scalars!(v),
            TypedBuffer::I64(v) => scalars!(v),
            TypedBuffer::U64(v) => scalars!(v),
            TypedBuffer::I32(v) => scalars!(v),
            TypedBuffer::U32(v) => scalars!(v),
            TypedBuffer::I16(v) => scalars!(v),
            TypedBuffer::U16(v) => scalars!(v),
            TypedBuffer::Char(v) => self.buf.put_slice(&v[start..end]),
            TypedBuffer::String(v) => {
                for s in &v[start..end] {
                    self.put_string(s)?;
                }
            }
        }
        Ok(())
    }

    /// Take the encoded bytes, leaving the encoder empty.
    pub fn split(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Write the encoded bytes to `write` and clear the encoder.
    pub fn flush_to<W: Write>(&mut self, write: &mut W) -> SddsResult<usize> {
        let bytes = self.split();
        write.write_all(&bytes)?;
        Ok(bytes.len())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strings_are_length_prefixed() {
        let mut encoder = Encoder::new(ByteOrder::Big);
        encoder.put_string("ab").unwrap();
        assert_eq!(encoder.finish(), [0, 0, 0, 2, b'a', b'b']);
    }

    #[test]
    fn buffer_ranges() {
        let mut encoder = Encoder::new(ByteOrder::Little);
        let buffer = TypedBuffer::from(vec![1i16, 2, 3, 4]);
        encoder.put_buffer_range(&buffer, 1, 3).unwrap();
        assert_eq!(encoder.len(), 4);
        assert!(encoder.put_buffer_range(&buffer, 3, 5).is_err());

        let mut out = Vec::new();
        assert_eq!(encoder.flush_to(&mut out).unwrap(), 4);
        assert!(encoder.is_empty());
        assert_eq!(out, [2, 0, 3, 0]);
    }
}

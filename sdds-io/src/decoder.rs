use std::io::Read;

use sdds_dtype::{SType, TypedBuffer, Value, match_each_numeric_stype};
use sdds_error::{SddsResult, sdds_bail, sdds_err};

use crate::{BinaryScalar, ByteOrder};

/// Largest block requested from the stream at once. Longer reads grow the buffer only as data
/// arrives, so a corrupt length fails at end of input instead of allocating it up front.
const CHUNK: usize = 1 << 20;

/// Reads binary page data from a stream, swapping bytes when the data's order is not the host's.
pub struct Decoder<R> {
    read: R,
    order: ByteOrder,
    scratch: Vec<u8>,
}

impl<R: Read> Decoder<R> {
    pub fn new(read: R, order: ByteOrder) -> Self {
        Self {
            read,
            order,
            scratch: Vec::new(),
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    fn fill(&mut self, len: usize) -> SddsResult<()> {
        self.scratch.clear();
        let mut remaining = len;
        while remaining > 0 {
            let start = self.scratch.len();
            let step = remaining.min(CHUNK);
            self.scratch.resize(start + step, 0);
            self.read.read_exact(&mut self.scratch[start..])?;
            remaining -= step;
        }
        Ok(())
    }

    /// Read exactly `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> SddsResult<&[u8]> {
        self.fill(len)?;
        Ok(&self.scratch)
    }

    pub fn read_scalar<T: BinaryScalar>(&mut self) -> SddsResult<T> {
        self.fill(T::WIDTH)?;
        let mut bytes: &[u8] = &self.scratch;
        Ok(T::get(&mut bytes, self.order))
    }

    /// Read `count` consecutive scalars.
    pub fn read_scalars<T: BinaryScalar>(&mut self, count: usize) -> SddsResult<Vec<T>> {
        let len = T::WIDTH
            .checked_mul(count)
            .ok_or_else(|| sdds_err!(CorruptPage: "{} values of {} bytes do not fit in memory", count, T::WIDTH))?;
        self.fill(len)?;
        let mut bytes: &[u8] = &self.scratch;
        Ok((0..count).map(|_| T::get(&mut bytes, self.order)).collect())
    }

    pub fn read_i32(&mut self) -> SddsResult<i32> {
        self.read_scalar()
    }

    pub fn read_i64(&mut self) -> SddsResult<i64> {
        self.read_scalar()
    }

    /// Read a string stored as an `i32` byte length followed by the bytes.
    pub fn read_string(&mut self) -> SddsResult<String> {
        let len = self.read_i32()?;
        if len < 0 {
            sdds_bail!(CorruptPage: "negative string length {}", len);
        }
        let bytes = self.read_bytes(len as usize)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn read_char(&mut self) -> SddsResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_value(&mut self, stype: SType) -> SddsResult<Value> {
        Ok(match stype {
            SType::String => Value::String(self.read_string()?),
            SType::Char => Value::Char(self.read_char()?),
            numeric => match_each_numeric_stype!(numeric, |$T| Value::from(self.read_scalar::<$T>()?)),
        })
    }

    /// Read `count` values of `stype` stored contiguously.
    pub fn read_buffer(&mut self, stype: SType, count: usize) -> SddsResult<TypedBuffer> {
        Ok(match stype {
            SType::String => {
                let mut strings = Vec::with_capacity(count.min(CHUNK));
                for _ in 0..count {
                    strings.push(self.read_string()?);
                }
                TypedBuffer::String(strings)
            }
            SType::Char => TypedBuffer::Char(self.read_bytes(count)?.to_vec()),
            numeric => match_each_numeric_stype!(numeric, |$T| TypedBuffer::from(self.read_scalars::<$T>(count)?)),
        })
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;
    use crate::Encoder;

    #[rstest]
    fn values_round_trip(#[values(ByteOrder::Little, ByteOrder::Big)] order: ByteOrder) {
        let values = [
            Value::F64(1.25),
            Value::I16(-7),
            Value::U64(u64::MAX),
            Value::Char(b'q'),
            Value::from("hello"),
            Value::F80(sdds_dtype::LongDouble(0.1)),
        ];
        let mut encoder = Encoder::new(order);
        for value in &values {
            encoder.put_value(value).unwrap();
        }
        let mut decoder = Decoder::new(Cursor::new(encoder.finish()), order);
        for value in &values {
            assert_eq!(&decoder.read_value(value.stype()).unwrap(), value);
        }
        assert!(decoder.read_char().unwrap_err().is_unexpected_eof());
    }

    #[test]
    fn buffers_round_trip() {
        let mut encoder = Encoder::new(ByteOrder::Big);
        let numbers = TypedBuffer::from(vec![1u32, 2, 3]);
        let strings = TypedBuffer::from(vec!["a", "", "ccc"]);
        encoder.put_buffer(&numbers).unwrap();
        encoder.put_buffer(&strings).unwrap();
        let mut decoder = Decoder::new(Cursor::new(encoder.finish()), ByteOrder::Big);
        assert_eq!(decoder.read_buffer(SType::U32, 3).unwrap(), numbers);
        assert_eq!(decoder.read_buffer(SType::String, 3).unwrap(), strings);
    }

    #[test]
    fn short_read_is_eof() {
        let mut decoder = Decoder::new(Cursor::new(vec![1u8, 2]), ByteOrder::Little);
        let err = decoder.read_i32().unwrap_err();
        assert!(err.is_unexpected_eof());
    }

    #[test]
    fn negative_string_length() {
        let mut encoder = Encoder::new(ByteOrder::Little);
        encoder.put_i32(-4);
        let mut decoder = Decoder::new(Cursor::new(encoder.finish()), ByteOrder::Little);
        assert_eq!(
            decoder.read_string().unwrap_err().kind(),
            ErrorKind::CorruptPage
        );
    }

    #[test]
    fn oversized_counts_fail_without_allocating() {
        let mut decoder = Decoder::new(Cursor::new(vec![0u8; 16]), ByteOrder::Little);
        let err = decoder.read_scalars::<f64>(usize::MAX / 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptPage);
        let err = decoder.read_buffer(SType::F64, 1 << 40).unwrap_err();
        assert!(err.is_unexpected_eof());
    }

    #[test]
    fn long_string_length_hits_end_of_input() {
        let mut encoder = Encoder::new(ByteOrder::Big);
        encoder.put_i32(i32::MAX);
        encoder.put_i32(7);
        let mut decoder = Decoder::new(Cursor::new(encoder.finish()), ByteOrder::Big);
        assert!(decoder.read_string().unwrap_err().is_unexpected_eof());
    }

    #[test]
    fn chunked_reads_keep_every_byte() {
        let bytes: Vec<u8> = (0..CHUNK * 2 + 3).map(|i| u8::try_from(i % 251).unwrap()).collect();
        let mut decoder = Decoder::new(Cursor::new(bytes.clone()), ByteOrder::Little);
        assert_eq!(decoder.read_bytes(bytes.len()).unwrap(), bytes.as_slice());
    }
}

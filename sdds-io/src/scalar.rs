use bytes::{Buf, BufMut};
use sdds_dtype::{LongDouble, NativeSType};

use crate::{ByteOrder, f80};

/// A numeric type with a fixed-width binary encoding in either byte order.
pub trait BinaryScalar: NativeSType {
    /// Encoded width in bytes.
    const WIDTH: usize;

    /// Decode from the front of `buf`, which must hold at least [`Self::WIDTH`] bytes.
    fn get<B: Buf>(buf: &mut B, order: ByteOrder) -> Self;

    /// Append the encoding of `self`.
    fn put<B: BufMut>(self, buf: &mut B, order: ByteOrder);
}

macro_rules! binary_scalar {
    ($T:ty, $get_le:ident, $get_be:ident, $put_le:ident, $put_be:ident) => {
        impl BinaryScalar for $T {
            const WIDTH: usize = size_of::<$T>();

            #[inline]
            fn get<B: Buf>(buf: &mut B, order: ByteOrder) -> Self {
                match order {
                    ByteOrder::Little => buf.$get_le(),
                    ByteOrder::Big => buf.$get_be(),
                }
            }

            #[inline]
            fn put<B: BufMut>(self, buf: &mut B, order: ByteOrder) {
                match order {
                    ByteOrder::Little => buf.$put_le(self),
                    ByteOrder::Big => buf.$put_be(self),
                }
            }
        }
    };
}

binary_scalar!(f64, get_f64_le, get_f64, put_f64_le, put_f64);
binary_scalar!(f32, get_f32_le, get_f32, put_f32_le, put_f32);
binary_scalar!(i64, get_i64_le, get_i64, put_i64_le, put_i64);
binary_scalar!(u64, get_u64_le, get_u64, put_u64_le, put_u64);
binary_scalar!(i32, get_i32_le, get_i32, put_i32_le, put_i32);
binary_scalar!(u32, get_u32_le, get_u32, put_u32_le, put_u32);
binary_scalar!(i16, get_i16_le, get_i16, put_i16_le, put_i16);
binary_scalar!(u16, get_u16_le, get_u16, put_u16_le, put_u16);

impl BinaryScalar for LongDouble {
    const WIDTH: usize = 16;

    fn get<B: Buf>(buf: &mut B, order: ByteOrder) -> Self {
        let mut bytes = [0u8; 16];
        buf.copy_to_slice(&mut bytes);
        LongDouble(f80::decode(bytes, order))
    }

    fn put<B: BufMut>(self, buf: &mut B, order: ByteOrder) {
        buf.put_slice(&f80::encode(self.0, order));
    }
}

#[cfg(test)]
mod test {
    use bytes::BytesMut;

    use super::*;

    #[test]
    fn swapped_bytes_are_reversed() {
        let mut little = BytesMut::new();
        0x0102_0304i32.put(&mut little, ByteOrder::Little);
        let mut big = BytesMut::new();
        0x0102_0304i32.put(&mut big, ByteOrder::Big);
        assert_eq!(little.as_ref(), [4, 3, 2, 1]);
        assert_eq!(big.as_ref(), [1, 2, 3, 4]);

        let mut slice: &[u8] = &big;
        assert_eq!(i32::get(&mut slice, ByteOrder::Big), 0x0102_0304);
    }

    #[test]
    fn widths_match_types() {
        assert_eq!(<f64 as BinaryScalar>::WIDTH, 8);
        assert_eq!(<u16 as BinaryScalar>::WIDTH, 2);
        assert_eq!(<LongDouble as BinaryScalar>::WIDTH, 16);

        let mut buf = BytesMut::new();
        LongDouble(-3.25).put(&mut buf, ByteOrder::Big);
        assert_eq!(buf.len(), 16);
        let mut slice: &[u8] = &buf;
        assert_eq!(LongDouble::get(&mut slice, ByteOrder::Big), LongDouble(-3.25));
    }
}

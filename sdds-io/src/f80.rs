//! The 16-byte on-disk form of `longdouble` values: x87 80-bit extended precision, padded.

use crate::ByteOrder;

const EXP_BIAS_80: i32 = 16383;
const EXP_BIAS_64: i32 = 1023;
const INTEGER_BIT: u64 = 1 << 63;

/// Widen a double to the 80-bit extended format, returning `(significand, sign_exponent)`.
#[allow(clippy::cast_possible_truncation)]
pub fn to_extended(value: f64) -> (u64, u16) {
    let bits = value.to_bits();
    let sign: u16 = if bits >> 63 == 1 { 0x8000 } else { 0 };
    let exponent = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1 << 52) - 1);

    if exponent == 0x7ff {
        let significand = if fraction == 0 {
            INTEGER_BIT
        } else {
            INTEGER_BIT | (1 << 62) | (fraction << 11)
        };
        return (significand, sign | 0x7fff);
    }
    if exponent == 0 {
        if fraction == 0 {
            return (0, sign);
        }
        // Subnormal double: normalize so the integer bit is set.
        let leading = 63 - fraction.leading_zeros() as i32;
        let significand = fraction << (63 - leading);
        let unbiased = leading - 1074;
        return (significand, sign | (unbiased + EXP_BIAS_80) as u16);
    }

    let significand = INTEGER_BIT | (fraction << 11);
    let unbiased = exponent - EXP_BIAS_64;
    (significand, sign | (unbiased + EXP_BIAS_80) as u16)
}

/// Narrow an 80-bit extended value to a double, rounding to nearest even.
pub fn from_extended(significand: u64, sign_exponent: u16) -> f64 {
    let negative = sign_exponent & 0x8000 != 0;
    let sign_bit = if negative { 1u64 << 63 } else { 0 };
    let exponent = i32::from(sign_exponent & 0x7fff);

    if exponent == 0x7fff {
        let nan = significand << 1 != 0;
        return if nan {
            f64::NAN
        } else if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }
    if significand == 0 {
        return f64::from_bits(sign_bit);
    }

    // Normalize unnormal and denormal encodings.
    let shift = significand.leading_zeros() as i32;
    let significand = significand << shift;
    let unbiased = exponent - EXP_BIAS_80 - shift + i32::from(exponent == 0);

    if unbiased > EXP_BIAS_64 {
        return f64::from_bits(sign_bit | (0x7ff << 52));
    }

    if unbiased >= -1022 {
        let biased = (unbiased + EXP_BIAS_64) as u64;
        let mantissa = (significand << 1) >> 12;
        let dropped = significand & 0x7ff;
        let mut bits = (biased << 52) | mantissa;
        let half = 0x400;
        if dropped > half || (dropped == half && bits & 1 == 1) {
            // A carry out of the mantissa correctly bumps the exponent.
            bits += 1;
        }
        return f64::from_bits(sign_bit | bits);
    }

    let shift = 11 + (-1022 - unbiased);
    if shift >= 64 {
        return f64::from_bits(sign_bit);
    }
    f64::from_bits(sign_bit | (significand >> shift))
}

/// Encode a value into its 16-byte on-disk form.
pub fn encode(value: f64, order: ByteOrder) -> [u8; 16] {
    let (significand, sign_exponent) = to_extended(value);
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&significand.to_le_bytes());
    out[8..10].copy_from_slice(&sign_exponent.to_le_bytes());
    if order == ByteOrder::Big {
        out.reverse();
    }
    out
}

/// Decode a value from its 16-byte on-disk form.
pub fn decode(mut bytes: [u8; 16], order: ByteOrder) -> f64 {
    if order == ByteOrder::Big {
        bytes.reverse();
    }
    let mut significand = [0u8; 8];
    significand.copy_from_slice(&bytes[..8]);
    from_extended(
        u64::from_le_bytes(significand),
        u16::from_le_bytes([bytes[8], bytes[9]]),
    )
}

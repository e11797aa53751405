use std::ops::{BitAnd, BitOr, Not};

use arrow_buffer::BooleanBufferBuilder;
use sdds_error::{SddsResult, sdds_bail, sdds_panic};

use crate::{AllOr, Mask};

/// How a freshly computed selection combines with the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogicOp {
    /// Keep positions selected by both.
    #[default]
    And,
    /// Keep positions selected by either.
    Or,
}

impl BitAnd for &Mask {
    type Output = Mask;

    fn bitand(self, rhs: Self) -> Self::Output {
        if self.len() != rhs.len() {
            sdds_panic!("Masks must have the same length");
        }

        match (self.boolean_buffer(), rhs.boolean_buffer()) {
            (AllOr::All, _) => rhs.clone(),
            (_, AllOr::All) => self.clone(),
            (AllOr::None, _) | (_, AllOr::None) => Mask::new_false(self.len()),
            (AllOr::Some(lhs), AllOr::Some(rhs)) => Mask::from_buffer(lhs & rhs),
        }
    }
}

impl BitOr for &Mask {
    type Output = Mask;

    fn bitor(self, rhs: Self) -> Self::Output {
        if self.len() != rhs.len() {
            sdds_panic!("Masks must have the same length");
        }

        match (self.boolean_buffer(), rhs.boolean_buffer()) {
            (AllOr::None, _) => rhs.clone(),
            (_, AllOr::None) => self.clone(),
            (AllOr::All, _) | (_, AllOr::All) => Mask::new_true(self.len()),
            (AllOr::Some(lhs), AllOr::Some(rhs)) => Mask::from_buffer(lhs | rhs),
        }
    }
}

impl Not for &Mask {
    type Output = Mask;

    fn not(self) -> Self::Output {
        match self {
            Mask::AllTrue(len) => Mask::new_false(*len),
            Mask::AllFalse(len) => Mask::new_true(*len),
            Mask::Values(values) => Mask::from_buffer(!values.boolean_buffer()),
        }
    }
}

impl Mask {
    /// Combine with `other` under `op`. Both masks must have the same length.
    pub fn combine(&self, other: &Mask, op: LogicOp) -> SddsResult<Mask> {
        if self.len() != other.len() {
            sdds_bail!(OutOfRange: "cannot combine masks of length {} and {}", self.len(), other.len());
        }
        Ok(match op {
            LogicOp::And => self & other,
            LogicOp::Or => self | other,
        })
    }

    /// Set every position in the inclusive range `[lo, hi]` to `flag`.
    ///
    /// `hi` is clamped to the last position; `lo` must lie inside the mask and not exceed `hi`.
    pub fn assert_range(&self, lo: usize, hi: usize, flag: bool) -> SddsResult<Mask> {
        let len = self.len();
        if lo >= len || lo > hi {
            sdds_bail!(OutOfRange: "invalid range [{}, {}] for {} positions", lo, hi, len);
        }
        let hi = hi.min(len - 1);
        let mut buf = BooleanBufferBuilder::new(len);
        self.iter_bools(|iter| {
            for (i, bit) in iter.enumerate() {
                buf.append(if (lo..=hi).contains(&i) { flag } else { bit });
            }
        });
        Ok(Mask::from_buffer(buf.finish()))
    }

    /// Set every listed position to `flag`, leaving the others unchanged.
    pub fn assert_indices(&self, indices: &[usize], flag: bool) -> SddsResult<Mask> {
        let listed = Mask::from_indices(self.len(), indices.to_vec())?;
        Ok(if flag { self | &listed } else { self & &!&listed })
    }

    /// Set a single position to `flag`.
    pub fn with_value(&self, idx: usize, flag: bool) -> SddsResult<Mask> {
        self.assert_indices(&[idx], flag)
    }

    /// Grow or shrink to `len` positions, filling new positions with `fill`.
    pub fn resized(&self, len: usize, fill: bool) -> Mask {
        let current = self.len();
        if current == len {
            return self.clone();
        }
        match self {
            Mask::AllTrue(_) if fill || len < current => return Mask::new_true(len),
            Mask::AllFalse(_) if !fill || len < current => return Mask::new_false(len),
            _ => {}
        }
        let mut buf = BooleanBufferBuilder::new(len);
        self.iter_bools(|iter| {
            for bit in iter.take(len) {
                buf.append(bit);
            }
        });
        if len > current {
            buf.append_n(len - current, fill);
        }
        Mask::from_buffer(buf.finish())
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;
    use sdds_error::ErrorKind;

    use super::*;

    fn bools(mask: &Mask) -> Vec<bool> {
        mask.iter_bools(|iter| iter.collect())
    }

    #[test]
    fn and_or_not() {
        let a = Mask::from_iter([true, true, false, false]);
        let b = Mask::from_iter([true, false, true, false]);
        assert_eq!(bools(&(&a & &b)), [true, false, false, false]);
        assert_eq!(bools(&(&a | &b)), [true, true, true, false]);
        assert_eq!(bools(&!&a), [false, false, true, true]);
        assert_eq!(a.combine(&b, LogicOp::Or).unwrap(), &a | &b);
        assert_eq!(
            a.combine(&Mask::new_true(3), LogicOp::And)
                .unwrap_err()
                .kind(),
            ErrorKind::OutOfRange
        );
    }

    #[rstest]
    #[case(10, 2, 5, 4)]
    #[case(10, 2, 50, 8)]
    #[case(10, 0, 0, 1)]
    #[case(10, 9, 9, 1)]
    fn range_after_clear(
        #[case] len: usize,
        #[case] lo: usize,
        #[case] hi: usize,
        #[case] expected: usize,
    ) {
        let mask = Mask::new_false(len).assert_range(lo, hi, true).unwrap();
        assert_eq!(mask.true_count(), expected);
        assert_eq!(expected, hi.min(len - 1) - lo + 1);
    }

    #[test]
    fn range_rejects_bad_bounds() {
        let mask = Mask::new_true(4);
        assert!(mask.assert_range(4, 6, false).is_err());
        assert!(mask.assert_range(3, 1, false).is_err());
        assert_eq!(
            bools(&mask.assert_range(1, 2, false).unwrap()),
            [true, false, false, true]
        );
    }

    #[test]
    fn indices_set_and_clear() {
        let mask = Mask::new_false(5).assert_indices(&[4, 1], true).unwrap();
        assert_eq!(bools(&mask), [false, true, false, false, true]);
        let mask = mask.with_value(4, false).unwrap();
        assert_eq!(mask.true_count(), 1);
        assert!(mask.assert_indices(&[5], true).is_err());
    }

    #[test]
    fn resize_keeps_prefix() {
        let mask = Mask::from_iter([true, false, true]);
        assert_eq!(bools(&mask.resized(5, true)), [true, false, true, true, true]);
        assert_eq!(bools(&mask.resized(2, true)), [true, false]);
        assert_eq!(Mask::new_true(2).resized(4, false).true_count(), 2);
        assert!(Mask::new_true(2).resized(4, true).all_true());
    }
}

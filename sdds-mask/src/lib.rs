//! Selection bitmaps over the rows or columns of a page.
//!
//! A row is "of interest" when its bit is set. Pages start with every bit set and filters clear
//! or set bits through the combinators in this crate; the number of set bits is the logical row
//! count seen by ASCII writers and by [`Mask::true_count`].
#![deny(missing_docs)]
mod eq;
mod iter_bools;
mod ops;

use std::fmt::{Debug, Formatter};
use std::sync::{Arc, OnceLock};

use arrow_buffer::{BooleanBuffer, BooleanBufferBuilder};
use sdds_error::{SddsResult, sdds_bail};

pub use ops::LogicOp;

/// Represents a set of positions that are all selected, none selected, or a mixture.
pub enum AllOr<T> {
    /// Every position is selected.
    All,
    /// No position is selected.
    None,
    /// Some positions are selected.
    Some(T),
}

impl<T> AllOr<T> {
    /// Returns the `Some` variant of the enum, or a default value.
    pub fn unwrap_or_else<F, G>(self, all_true: F, all_false: G) -> T
    where
        F: FnOnce() -> T,
        G: FnOnce() -> T,
    {
        match self {
            Self::Some(v) => v,
            AllOr::All => all_true(),
            AllOr::None => all_false(),
        }
    }
}

impl<T> Debug for AllOr<T>
where
    T: Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::None => f.write_str("None"),
            Self::Some(v) => f.debug_tuple("Some").field(v).finish(),
        }
    }
}

impl<T> PartialEq for AllOr<T>
where
    T: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::All, Self::All) => true,
            (Self::None, Self::None) => true,
            (Self::Some(lhs), Self::Some(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

impl<T> Eq for AllOr<T> where T: Eq {}

/// A fixed-length selection bitmap.
///
/// Masks are immutable; every update returns a new mask. The uniform cases are stored without
/// a buffer.
#[derive(Clone, Debug)]
pub enum Mask {
    /// Every position is selected.
    AllTrue(usize),
    /// No position is selected.
    AllFalse(usize),
    /// A mixture, backed by a [`BooleanBuffer`].
    Values(Arc<MaskValues>),
}

/// The bits of a [`Mask`] holding both selected and unselected positions.
#[derive(Debug)]
pub struct MaskValues {
    buffer: BooleanBuffer,
    indices: OnceLock<Vec<usize>>,
    true_count: usize,
}

impl MaskValues {
    /// Returns the length of the mask.
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the number of selected positions.
    pub fn true_count(&self) -> usize {
        self.true_count
    }

    /// Returns the boolean buffer representation of the mask.
    pub fn boolean_buffer(&self) -> &BooleanBuffer {
        &self.buffer
    }

    /// Returns the selected positions in ascending order, computing them on first use.
    pub fn indices(&self) -> &[usize] {
        self.indices
            .get_or_init(|| self.buffer.set_indices().collect())
    }
}

impl Mask {
    /// Create a mask with every position selected.
    pub fn new_true(length: usize) -> Self {
        Self::AllTrue(length)
    }

    /// Create a mask with no position selected.
    pub fn new_false(length: usize) -> Self {
        Self::AllFalse(length)
    }

    /// Create a mask of `length` positions that are all `flag`.
    pub fn new(length: usize, flag: bool) -> Self {
        if flag {
            Self::AllTrue(length)
        } else {
            Self::AllFalse(length)
        }
    }

    /// Create a new [`Mask`] from a [`BooleanBuffer`].
    pub fn from_buffer(buffer: BooleanBuffer) -> Self {
        let len = buffer.len();
        let true_count = buffer.count_set_bits();

        if true_count == 0 {
            return Self::AllFalse(len);
        }
        if true_count == len {
            return Self::AllTrue(len);
        }

        Self::Values(Arc::new(MaskValues {
            buffer,
            indices: OnceLock::new(),
            true_count,
        }))
    }

    /// Create a mask selecting exactly `indices`.
    ///
    /// Indices may be given in any order and may repeat; an index at or beyond `len` is an
    /// `OutOfRange` error.
    pub fn from_indices(len: usize, mut indices: Vec<usize>) -> SddsResult<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
            sdds_bail!(OutOfRange: "index {} is beyond the mask length {}", bad, len);
        }
        indices.sort_unstable();
        indices.dedup();

        let true_count = indices.len();
        if true_count == 0 {
            return Ok(Self::AllFalse(len));
        }
        if true_count == len {
            return Ok(Self::AllTrue(len));
        }

        let mut buf = BooleanBufferBuilder::new(len);
        buf.append_n(len, false);
        indices.iter().for_each(|idx| buf.set_bit(*idx, true));
        debug_assert_eq!(buf.len(), len);

        Ok(Self::Values(Arc::new(MaskValues {
            buffer: buf.finish(),
            indices: OnceLock::from(indices),
            true_count,
        })))
    }

    /// Returns the length of the mask, not the number of selected positions.
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        match &self {
            Self::AllTrue(len) => *len,
            Self::AllFalse(len) => *len,
            Self::Values(values) => values.buffer.len(),
        }
    }

    /// The number of selected positions.
    #[inline]
    pub fn true_count(&self) -> usize {
        match &self {
            Self::AllTrue(len) => *len,
            Self::AllFalse(_) => 0,
            Self::Values(values) => values.true_count,
        }
    }

    /// The number of unselected positions.
    #[inline]
    pub fn false_count(&self) -> usize {
        self.len() - self.true_count()
    }

    /// Returns true if every position is selected.
    #[inline]
    pub fn all_true(&self) -> bool {
        self.true_count() == self.len()
    }

    /// Returns true if no position is selected.
    #[inline]
    pub fn all_false(&self) -> bool {
        self.true_count() == 0
    }

    /// Returns whether position `idx` is selected; positions beyond the end are not.
    pub fn value(&self, idx: usize) -> bool {
        if idx >= self.len() {
            return false;
        }
        match self {
            Mask::AllTrue(_) => true,
            Mask::AllFalse(_) => false,
            Mask::Values(values) => values.buffer.value(idx),
        }
    }

    /// Returns the first selected position.
    pub fn first(&self) -> Option<usize> {
        match &self {
            Self::AllTrue(len) => (*len > 0).then_some(0),
            Self::AllFalse(_) => None,
            Self::Values(values) => values.indices().first().copied(),
        }
    }

    /// Return the boolean buffer representation of the mask.
    pub fn boolean_buffer(&self) -> AllOr<&BooleanBuffer> {
        match &self {
            Self::AllTrue(_) => AllOr::All,
            Self::AllFalse(_) => AllOr::None,
            Self::Values(values) => AllOr::Some(&values.buffer),
        }
    }

    /// Return a boolean buffer representation of the mask, allocating new buffers for the
    /// uniform variants.
    pub fn to_boolean_buffer(&self) -> BooleanBuffer {
        match self {
            Self::AllTrue(l) => BooleanBuffer::new_set(*l),
            Self::AllFalse(l) => BooleanBuffer::new_unset(*l),
            Self::Values(values) => values.boolean_buffer().clone(),
        }
    }

    /// Return the selected positions.
    pub fn indices(&self) -> AllOr<&[usize]> {
        match &self {
            Self::AllTrue(_) => AllOr::All,
            Self::AllFalse(_) => AllOr::None,
            Self::Values(values) => AllOr::Some(values.indices()),
        }
    }

    /// Return the selected positions as an owned vector.
    pub fn to_indices(&self) -> Vec<usize> {
        self.indices()
            .cloned_vec()
            .unwrap_or_else(|| (0..self.len()).collect(), Vec::new)
    }
}

impl AllOr<&[usize]> {
    fn cloned_vec(self) -> AllOr<Vec<usize>> {
        match self {
            AllOr::All => AllOr::All,
            AllOr::None => AllOr::None,
            AllOr::Some(v) => AllOr::Some(v.to_vec()),
        }
    }
}

impl From<BooleanBuffer> for Mask {
    fn from(value: BooleanBuffer) -> Self {
        Self::from_buffer(value)
    }
}

impl FromIterator<bool> for Mask {
    fn from_iter<T: IntoIterator<Item = bool>>(iter: T) -> Self {
        Self::from_buffer(BooleanBuffer::from_iter(iter))
    }
}

#[cfg(test)]
mod test {
    use sdds_error::ErrorKind;

    use super::*;

    #[test]
    fn mask_all_true() {
        let mask = Mask::new_true(5);
        assert_eq!(mask.len(), 5);
        assert_eq!(mask.true_count(), 5);
        assert_eq!(mask.indices(), AllOr::All);
        assert_eq!(mask.to_indices(), vec![0, 1, 2, 3, 4]);
        assert_eq!(mask.boolean_buffer(), AllOr::All);
    }

    #[test]
    fn mask_all_false() {
        let mask = Mask::new(5, false);
        assert_eq!(mask.len(), 5);
        assert_eq!(mask.true_count(), 0);
        assert_eq!(mask.indices(), AllOr::None);
        assert!(mask.to_indices().is_empty());
        assert_eq!(mask.first(), None);
    }

    #[test]
    fn mask_from_unsorted_indices() {
        let mask = Mask::from_indices(5, vec![3, 0, 2, 3]).unwrap();
        assert_eq!(mask.true_count(), 3);
        assert_eq!(mask.indices(), AllOr::Some(&[0, 2, 3][..]));
        assert_eq!(mask.first(), Some(0));
        assert!(!mask.value(1));
        assert!(!mask.value(99));
        assert_eq!(
            mask.boolean_buffer(),
            AllOr::Some(&BooleanBuffer::from_iter([true, false, true, true, false]))
        );
    }

    #[test]
    fn mask_index_out_of_range() {
        let err = Mask::from_indices(3, vec![0, 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn uniform_buffers_collapse() {
        assert!(matches!(
            Mask::from_buffer(BooleanBuffer::new_set(4)),
            Mask::AllTrue(4)
        ));
        assert!(matches!(
            Mask::from_iter([false, false]),
            Mask::AllFalse(2)
        ));
    }
}

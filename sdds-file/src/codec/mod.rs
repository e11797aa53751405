//! Page encodings.
//!
//! The data section is either ASCII text or binary, and within a page the column block is laid
//! out row by row or column by column. The two block orders are strategies implementing
//! [`BlockOrder`]; everything else about a page is shared between them.

pub(crate) mod ascii;
pub(crate) mod binary;
mod order;

pub(crate) use order::*;
use sdds_error::{SddsError, SddsResult, sdds_err};

use crate::page::checked_product;

/// Upper bound on the rows or elements reserved ahead of decoding. Counts read from a file only
/// bound how far buffers may grow.
pub(crate) const PREALLOCATED: usize = 1 << 16;

/// Which rows of a page are kept while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSelection {
    interval: usize,
    limit: Option<usize>,
}

impl RowSelection {
    /// Keep every row.
    pub const ALL: Self = Self {
        interval: 1,
        limit: None,
    };

    /// Keep rows `0, interval, 2 * interval, ...`, at most `limit` of them when `limit > 0`.
    pub fn sparse(interval: usize, limit: usize) -> Self {
        Self {
            interval: interval.max(1),
            limit: (limit > 0).then_some(limit),
        }
    }

    pub fn is_all(&self) -> bool {
        *self == Self::ALL
    }

    pub fn keeps(&self, row: usize) -> bool {
        row % self.interval == 0 && self.limit.is_none_or(|limit| row / self.interval < limit)
    }

    /// How many of `rows` rows are kept.
    pub fn kept(&self, rows: usize) -> usize {
        let every = rows.div_ceil(self.interval);
        self.limit.map_or(every, |limit| every.min(limit))
    }

    /// The kept rows out of `rows`.
    pub fn indices(&self, rows: usize) -> Vec<usize> {
        let kept = (0..rows).step_by(self.interval);
        match self.limit {
            Some(limit) => kept.take(limit).collect(),
            None => kept.collect(),
        }
    }
}

/// Element count of an array read from page `page`.
pub(crate) fn array_elements(dimensions: &[usize], name: &str, page: usize) -> SddsResult<usize> {
    checked_product(dimensions).ok_or_else(
        || sdds_err!(CorruptPage: "extents {:?} of array {} on page {} overflow", dimensions, name, page),
    )
}

/// Wrap a short read as a truncated page; other errors pass through.
pub(crate) fn truncated(err: SddsError, page: usize) -> SddsError {
    if err.is_unexpected_eof() {
        sdds_err!(CorruptPage: "page {} is truncated", page)
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(RowSelection::ALL, 4, vec![0, 1, 2, 3])]
    #[case(RowSelection::sparse(2, 0), 5, vec![0, 2, 4])]
    #[case(RowSelection::sparse(3, 2), 10, vec![0, 3])]
    #[case(RowSelection::sparse(0, 1), 10, vec![0])]
    fn selections(#[case] selection: RowSelection, #[case] rows: usize, #[case] kept: Vec<usize>) {
        assert_eq!(selection.indices(rows), kept);
        assert_eq!(selection.kept(rows), kept.len());
        for row in 0..rows {
            assert_eq!(selection.keeps(row), kept.contains(&row));
        }
    }

    #[test]
    fn kept_count_needs_no_allocation() {
        assert_eq!(RowSelection::ALL.kept(usize::MAX), usize::MAX);
        assert_eq!(RowSelection::sparse(2, 0).kept(usize::MAX), usize::MAX / 2 + 1);
        assert_eq!(RowSelection::sparse(5, 3).kept(1 << 61), 3);
    }

    #[test]
    fn overflowing_extents_are_corrupt() {
        assert_eq!(array_elements(&[2, 3, 4], "grid", 1).unwrap(), 24);
        assert_eq!(array_elements(&[], "scalar", 1).unwrap(), 1);
        let err = array_elements(&[usize::MAX, 2], "grid", 3).unwrap_err();
        assert_eq!(err.kind(), sdds_error::ErrorKind::CorruptPage);
    }
}

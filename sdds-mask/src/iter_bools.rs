use std::iter;

use crate::{AllOr, Mask};

impl Mask {
    /// Provides a closure with an iterator over the flags of the mask, one per position.
    ///
    /// The iterator type depends on the representation, so it is lent to the closure rather
    /// than returned.
    pub fn iter_bools<F, T>(&self, mut f: F) -> T
    where
        F: FnMut(&mut dyn Iterator<Item = bool>) -> T,
    {
        match self.boolean_buffer() {
            AllOr::All => f(&mut iter::repeat_n(true, self.len())),
            AllOr::None => f(&mut iter::repeat_n(false, self.len())),
            AllOr::Some(buffer) => f(&mut buffer.iter()),
        }
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;

    use crate::Mask;

    #[test]
    fn iter_bools_all_true() {
        let mask = Mask::new_true(10);
        assert_eq!(mask.iter_bools(|iter| iter.collect_vec()), vec![true; 10]);
    }

    #[test]
    fn iter_bools_all_false() {
        let mask = Mask::new_false(10);
        assert_eq!(mask.iter_bools(|iter| iter.collect_vec()), vec![false; 10]);
    }

    #[test]
    fn iter_bools_indices() {
        assert_eq!(
            Mask::from_indices(5, vec![]).unwrap().iter_bools(|iter| iter.collect_vec()),
            vec![false; 5],
        );
        assert_eq!(
            Mask::from_indices(5, vec![4, 0]).unwrap().iter_bools(|iter| iter.collect_vec()),
            vec![true, false, false, false, true],
        );
    }

    #[test]
    fn iter_bools_drives_row_selection() {
        let mask = Mask::from_iter([false, true, true, false]);
        let rows = ["a", "b", "c", "d"];
        let kept = mask.iter_bools(|iter| {
            iter.zip(rows)
                .filter_map(|(keep, row)| keep.then_some(row))
                .collect_vec()
        });
        assert_eq!(kept, ["b", "c"]);
    }
}

use crate::{AllOr, Mask};

impl PartialEq for Mask {
    fn eq(&self, other: &Self) -> bool {
        if self.len() != other.len() || self.true_count() != other.true_count() {
            return false;
        }

        // With equal counts, a uniform mask can only equal another uniform mask.
        if self.true_count() == 0 || self.true_count() == self.len() {
            return true;
        }

        match (self.boolean_buffer(), other.boolean_buffer()) {
            (AllOr::Some(lhs), AllOr::Some(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

impl Eq for Mask {}

#[cfg(test)]
mod test {
    use arrow_buffer::BooleanBuffer;

    use crate::Mask;

    #[test]
    fn mask_eq() {
        assert_eq!(
            Mask::new_true(5),
            Mask::from_buffer(BooleanBuffer::new_set(5))
        );
        assert_eq!(
            Mask::new_false(5),
            Mask::from_buffer(BooleanBuffer::new_unset(5))
        );
        assert_eq!(
            Mask::from_indices(5, vec![0, 2, 3]).unwrap(),
            Mask::from_iter([true, false, true, true, false])
        );
        assert_ne!(Mask::new_true(5), Mask::new_true(4));
        assert_ne!(
            Mask::from_indices(5, vec![0, 2]).unwrap(),
            Mask::from_indices(5, vec![0, 3]).unwrap()
        );
    }
}

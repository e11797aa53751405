//! Key groups for matching rows of one page against lookup values.
//!
//! Rows with equal key values form a group. Strings compare byte for byte; numbers compare by
//! value after conversion to the key column's type, with every NaN equal to every other NaN. A
//! value that the key type cannot hold exactly matches nothing.
//! Without reuse, each matched row is consumed so that repeated lookups walk through the group.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;
use sdds_dtype::{SType, TypedBuffer, Value};
use sdds_error::SddsResult;

/// A normalized key value with a total order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Key {
    Int(i128),
    /// Bits of the value rearranged so that integer order follows numeric order.
    Float(u64),
    Text(Vec<u8>),
}

fn float_key(value: f64) -> Key {
    let value = if value.is_nan() {
        f64::NAN
    } else if value == 0.0 {
        0.0
    } else {
        value
    };
    let bits = value.to_bits();
    Key::Float(if bits >> 63 == 1 { !bits } else { bits | (1 << 63) })
}

fn key_of(value: &Value, stype: SType) -> Option<Key> {
    let value = value.cast_exact(stype)?;
    Some(match value {
        Value::String(s) => Key::Text(s.into_bytes()),
        Value::Char(c) => Key::Text(vec![c]),
        Value::F80(_) | Value::F64(_) | Value::F32(_) => float_key(value.as_f64()?),
        Value::I64(v) => Key::Int(i128::from(v)),
        Value::U64(v) => Key::Int(i128::from(v)),
        Value::I32(v) => Key::Int(i128::from(v)),
        Value::U32(v) => Key::Int(i128::from(v)),
        Value::I16(v) => Key::Int(i128::from(v)),
        Value::U16(v) => Key::Int(i128::from(v)),
    })
}

#[derive(Debug, Clone)]
struct Members {
    rows: Vec<usize>,
    consumed: usize,
}

impl Members {
    fn take(&mut self, reuse: bool) -> Option<usize> {
        if reuse {
            return self.rows.first().copied();
        }
        let row = self.rows.get(self.consumed).copied()?;
        self.consumed += 1;
        Some(row)
    }
}

/// Key groups kept in key order and searched by bisection.
#[derive(Debug, Clone)]
pub struct SortedKeyGroups {
    stype: SType,
    groups: Vec<(Key, Members)>,
}

impl SortedKeyGroups {
    /// Group the rows of `keys` by value.
    pub fn new(keys: &TypedBuffer) -> SddsResult<Self> {
        let stype = keys.stype();
        let mut rows: Vec<(Key, usize)> = keys
            .iter()
            .enumerate()
            .filter_map(|(row, value)| key_of(&value, stype).map(|key| (key, row)))
            .collect();
        rows.sort();
        let mut groups: Vec<(Key, Members)> = Vec::new();
        for (key, row) in rows {
            match groups.last_mut() {
                Some((last, members)) if *last == key => members.rows.push(row),
                _ => groups.push((
                    key,
                    Members {
                        rows: vec![row],
                        consumed: 0,
                    },
                )),
            }
        }
        Ok(Self { stype, groups })
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Rows of each group, in key order.
    pub fn groups(&self) -> impl Iterator<Item = &[usize]> {
        self.groups.iter().map(|(_, members)| members.rows.as_slice())
    }

    /// The next unconsumed row whose key equals `sought`. With `reuse` the group's first row is
    /// returned every time.
    pub fn find_matching(&mut self, sought: &Value, reuse: bool) -> Option<usize> {
        let key = key_of(sought, self.stype)?;
        let idx = self
            .groups
            .binary_search_by(|(k, _)| k.cmp(&key))
            .ok()?;
        self.groups[idx].1.take(reuse)
    }

    /// Order of two values under the key normalization, if both convert to the key type.
    pub fn compare(&self, a: &Value, b: &Value) -> Option<Ordering> {
        Some(key_of(a, self.stype)?.cmp(&key_of(b, self.stype)?))
    }
}

/// Key groups in a hash map.
#[derive(Debug, Clone)]
pub struct KeyHash {
    stype: SType,
    map: FxHashMap<Key, Members>,
}

impl KeyHash {
    pub fn new(keys: &TypedBuffer) -> SddsResult<Self> {
        let stype = keys.stype();
        let mut map: FxHashMap<Key, Members> = FxHashMap::default();
        for (row, value) in keys.iter().enumerate() {
            if let Some(key) = key_of(&value, stype) {
                map.entry(key)
                    .or_insert_with(|| Members {
                        rows: Vec::new(),
                        consumed: 0,
                    })
                    .rows
                    .push(row);
            }
        }
        Ok(Self { stype, map })
    }

    pub fn group_count(&self) -> usize {
        self.map.len()
    }

    /// Same contract as [`SortedKeyGroups::find_matching`].
    pub fn find_matching(&mut self, sought: &Value, reuse: bool) -> Option<usize> {
        let key = key_of(sought, self.stype)?;
        self.map.get_mut(&key)?.take(reuse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_groups_consume_in_row_order() {
        let keys = TypedBuffer::from(vec![3i32, 1, 3, 2, 3]);
        let mut groups = SortedKeyGroups::new(&keys).unwrap();
        assert_eq!(groups.group_count(), 3);
        assert_eq!(
            groups.groups().collect::<Vec<_>>(),
            vec![&[1usize][..], &[3][..], &[0, 2, 4][..]]
        );
        assert_eq!(groups.find_matching(&Value::I32(3), false), Some(0));
        assert_eq!(groups.find_matching(&Value::I32(3), false), Some(2));
        assert_eq!(groups.find_matching(&Value::F64(3.0), false), Some(4));
        assert_eq!(groups.find_matching(&Value::I32(3), false), None);
        assert_eq!(groups.find_matching(&Value::I32(7), false), None);
    }

    #[test]
    fn reuse_returns_first_member() {
        let keys = TypedBuffer::from(vec!["a", "b", "a"]);
        let mut groups = SortedKeyGroups::new(&keys).unwrap();
        for _ in 0..3 {
            assert_eq!(groups.find_matching(&Value::from("a"), true), Some(0));
        }
        let mut hash = KeyHash::new(&keys).unwrap();
        for _ in 0..3 {
            assert_eq!(hash.find_matching(&Value::from("a"), true), Some(0));
        }
    }

    #[test]
    fn floats_group_nan_and_order_numerically() {
        let keys = TypedBuffer::from(vec![f64::NAN, -1.5, 2.0, f64::NAN, -0.0]);
        let mut groups = SortedKeyGroups::new(&keys).unwrap();
        assert_eq!(groups.group_count(), 4);
        assert_eq!(groups.find_matching(&Value::F64(f64::NAN), false), Some(0));
        assert_eq!(groups.find_matching(&Value::F64(f64::NAN), false), Some(3));
        assert_eq!(groups.find_matching(&Value::F64(0.0), false), Some(4));
        assert_eq!(
            groups.compare(&Value::F64(-1.5), &Value::F64(2.0)),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn hash_matches_sorted() {
        let keys = TypedBuffer::from(vec!["x", "y", "x", "z"]);
        let mut hash = KeyHash::new(&keys).unwrap();
        let mut sorted = SortedKeyGroups::new(&keys).unwrap();
        assert_eq!(hash.group_count(), sorted.group_count());
        for sought in ["x", "x", "x", "z", "w"] {
            let sought = Value::from(sought);
            assert_eq!(
                hash.find_matching(&sought, false),
                sorted.find_matching(&sought, false)
            );
        }
    }

    #[test]
    fn mismatched_lookup_type_never_matches() {
        let keys = TypedBuffer::from(vec![1i32, 2]);
        let mut hash = KeyHash::new(&keys).unwrap();
        assert_eq!(hash.find_matching(&Value::from("1"), false), None);
    }

    #[test]
    fn fractional_values_do_not_match_integer_keys() {
        let keys = TypedBuffer::from(vec![1i32, 2]);
        let mut sorted = SortedKeyGroups::new(&keys).unwrap();
        let mut hash = KeyHash::new(&keys).unwrap();
        assert_eq!(sorted.find_matching(&Value::F64(1.5), false), None);
        assert_eq!(hash.find_matching(&Value::F64(1.5), false), None);
        assert_eq!(sorted.compare(&Value::F64(1.5), &Value::I32(2)), None);
        assert_eq!(sorted.find_matching(&Value::F64(1.0), false), Some(0));
        assert_eq!(hash.find_matching(&Value::F32(2.0), false), Some(1));
    }
}

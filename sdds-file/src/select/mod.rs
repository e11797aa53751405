//! Row and column selection on the current page.
//!
//! Each page carries a flag per column and per row. Selection operations compute a new set of
//! flags from names, patterns or values and merge it into the current flags with a
//! [`MatchLogic`]. Writers emit only flagged rows in ASCII pages, and
//! [`Dataset::delete_unset_rows`] compacts a page to its flagged rows.

mod glob;
mod keys;

pub use glob::*;
pub use keys::*;
use sdds_dtype::SType;
use sdds_error::{SddsResult, sdds_bail};
use sdds_mask::{LogicOp, Mask};

use crate::Dataset;

/// How a freshly computed selection merges with the existing flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchLogic {
    pub op: LogicOp,
    /// Invert the fresh selection before merging.
    pub negate: bool,
}

impl MatchLogic {
    pub fn and() -> Self {
        Self {
            op: LogicOp::And,
            negate: false,
        }
    }

    pub fn or() -> Self {
        Self {
            op: LogicOp::Or,
            negate: false,
        }
    }

    pub fn negated(self) -> Self {
        Self {
            negate: !self.negate,
            ..self
        }
    }

    fn merge(self, current: &Mask, fresh: Mask) -> SddsResult<Mask> {
        let fresh = if self.negate { !&fresh } else { fresh };
        current.combine(&fresh, self.op)
    }
}

/// Which columns a column selection picks.
#[derive(Debug, Clone, Copy)]
pub enum ColumnSelector<'a> {
    /// Names matching a wildcard pattern.
    Pattern(&'a str),
    Names(&'a [&'a str]),
    Type(SType),
    Numeric,
}

/// Which rows a row-flag assertion touches.
#[derive(Debug, Clone, Copy)]
pub enum RowRange<'a> {
    Indices(&'a [usize]),
    /// Rows `lo..=hi`.
    Between(usize, usize),
}

impl Dataset {
    /// Flag or clear every column.
    pub fn set_column_flags(&mut self, flag: bool) -> SddsResult<()> {
        let page = self.current_page_mut()?;
        let len = page.column_flags().len();
        page.set_column_flags(if flag {
            Mask::new_true(len)
        } else {
            Mask::new_false(len)
        })
    }

    /// Merge a column selection into the column flags.
    pub fn set_columns_of_interest(
        &mut self,
        selector: ColumnSelector<'_>,
        logic: MatchLogic,
    ) -> SddsResult<()> {
        let columns = &self.layout().columns;
        let picked: Vec<bool> = match selector {
            ColumnSelector::Pattern(pattern) => {
                columns.iter().map(|c| wild_match(pattern, &c.name)).collect()
            }
            ColumnSelector::Names(names) => {
                for name in names {
                    self.layout().require_column(name)?;
                }
                columns
                    .iter()
                    .map(|c| names.contains(&c.name.as_str()))
                    .collect()
            }
            ColumnSelector::Type(stype) => columns.iter().map(|c| c.stype == stype).collect(),
            ColumnSelector::Numeric => columns.iter().map(|c| c.stype.is_numeric()).collect(),
        };
        let fresh = Mask::from_iter(picked);
        let page = self.current_page_mut()?;
        let merged = logic.merge(page.column_flags(), fresh)?;
        page.set_column_flags(merged)
    }

    /// Names of the flagged columns, in layout order.
    pub fn columns_of_interest(&self) -> SddsResult<Vec<String>> {
        let flags = self.current_page()?.column_flags();
        Ok(self
            .layout()
            .columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| flags.value(*idx))
            .map(|(_, c)| c.name.clone())
            .collect())
    }

    /// Flag or clear every row.
    pub fn set_row_flags(&mut self, flag: bool) -> SddsResult<()> {
        let page = self.current_page_mut()?;
        let len = page.row_count();
        page.set_row_flags(if flag {
            Mask::new_true(len)
        } else {
            Mask::new_false(len)
        })
    }

    /// Set the flags of the given rows to `flag`, leaving the others alone.
    pub fn assert_row_flags(&mut self, rows: RowRange<'_>, flag: bool) -> SddsResult<()> {
        let page = self.current_page_mut()?;
        let flags = match rows {
            RowRange::Indices(indices) => page.row_flags().assert_indices(indices, flag)?,
            RowRange::Between(lo, hi) => page.row_flags().assert_range(lo, hi, flag)?,
        };
        page.set_row_flags(flags)
    }

    pub fn count_rows_of_interest(&self) -> SddsResult<usize> {
        Ok(self.current_page()?.count_rows_of_interest())
    }

    /// Merge the rows whose string column value matches the wildcard `pattern`.
    pub fn match_rows(&mut self, column: &str, pattern: &str, logic: MatchLogic) -> SddsResult<usize> {
        let idx = self.layout().require_column(column)?;
        let page = self.current_page()?;
        let fresh = match page.column(idx).as_strings() {
            Some(values) => Mask::from_iter(values.iter().map(|v| wild_match(pattern, v))),
            None => sdds_bail!(TypeMismatch: "column {} does not hold strings", column),
        };
        self.merge_rows(fresh, logic)
    }

    /// Merge the rows whose numeric column value lies in `lo..=hi`.
    pub fn filter_rows(&mut self, column: &str, lo: f64, hi: f64, logic: MatchLogic) -> SddsResult<usize> {
        let idx = self.layout().require_column(column)?;
        let values = self.current_page()?.column(idx).to_f64_vec()?;
        let fresh = Mask::from_iter(values.iter().map(|v| (lo..=hi).contains(v)));
        self.merge_rows(fresh, logic)
    }

    fn merge_rows(&mut self, fresh: Mask, logic: MatchLogic) -> SddsResult<usize> {
        let page = self.current_page_mut()?;
        let merged = logic.merge(page.row_flags(), fresh)?;
        page.set_row_flags(merged)?;
        Ok(page.count_rows_of_interest())
    }

    /// Drop the rows whose flag is clear, returning how many were removed.
    pub fn delete_unset_rows(&mut self) -> SddsResult<usize> {
        self.current_page_mut()?.delete_unset_rows()
    }
}

#[cfg(test)]
mod tests {
    use sdds_dtype::TypedBuffer;

    use super::*;
    use crate::{ColumnDefinition, SddsWriteOptions};

    fn dataset() -> Dataset {
        let mut dataset = SddsWriteOptions::new().create_in_memory().unwrap();
        dataset
            .define_column(ColumnDefinition::new("name", SType::String))
            .unwrap();
        dataset
            .define_column(ColumnDefinition::new("x", SType::F64))
            .unwrap();
        dataset
            .define_column(ColumnDefinition::new("xn", SType::I32))
            .unwrap();
        dataset.write_layout().unwrap();
        dataset.start_page(4).unwrap();
        dataset
            .set_column("name", &TypedBuffer::from(vec!["alpha", "beta", "gamma", "alps"]))
            .unwrap();
        dataset
            .set_column("x", &TypedBuffer::from(vec![0.5f64, 1.5, 2.5, 3.5]))
            .unwrap();
        dataset
    }

    #[test]
    fn column_selection_merges() {
        let mut dataset = dataset();
        dataset.set_column_flags(false).unwrap();
        dataset
            .set_columns_of_interest(ColumnSelector::Pattern("x*"), MatchLogic::or())
            .unwrap();
        assert_eq!(dataset.columns_of_interest().unwrap(), ["x", "xn"]);
        dataset
            .set_columns_of_interest(ColumnSelector::Type(SType::I32), MatchLogic::and().negated())
            .unwrap();
        assert_eq!(dataset.columns_of_interest().unwrap(), ["x"]);
        assert!(
            dataset
                .set_columns_of_interest(ColumnSelector::Names(&["nope"]), MatchLogic::or())
                .is_err()
        );
    }

    #[test]
    fn row_matching_and_filtering() {
        let mut dataset = dataset();
        assert_eq!(dataset.match_rows("name", "al*", MatchLogic::and()).unwrap(), 2);
        assert_eq!(
            dataset
                .filter_rows("x", 1.0, 3.0, MatchLogic::or())
                .unwrap(),
            4
        );
        dataset.set_row_flags(true).unwrap();
        assert_eq!(
            dataset
                .filter_rows("x", 1.0, 3.0, MatchLogic::and().negated())
                .unwrap(),
            2
        );
        assert_eq!(dataset.delete_unset_rows().unwrap(), 2);
        assert_eq!(
            dataset.get_column("name").unwrap(),
            TypedBuffer::from(vec!["alpha", "alps"])
        );
        assert!(dataset.match_rows("x", "*", MatchLogic::and()).is_err());
    }

    #[test]
    fn asserted_rows() {
        let mut dataset = dataset();
        dataset.set_row_flags(false).unwrap();
        dataset
            .assert_row_flags(RowRange::Between(1, 2), true)
            .unwrap();
        dataset.assert_row_flags(RowRange::Indices(&[3]), true).unwrap();
        assert_eq!(dataset.count_rows_of_interest().unwrap(), 3);
        assert_eq!(
            dataset.get_column_as_f64("x").unwrap(),
            vec![1.5, 2.5, 3.5]
        );
    }
}

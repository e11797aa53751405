//! In-memory storage for the page currently being read or written.

use sdds_dtype::{SType, TypedBuffer, Value};
use sdds_error::{SddsResult, sdds_bail};
use sdds_mask::Mask;

use crate::layout::Layout;

/// The values and extents of one array on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayValue {
    pub dimensions: Vec<usize>,
    pub data: TypedBuffer,
}

impl ArrayValue {
    pub fn empty(stype: SType, dimensions: usize) -> Self {
        Self {
            dimensions: vec![0; dimensions.max(1)],
            data: TypedBuffer::zeroed(stype, 0),
        }
    }

    /// Build an array, checking that `data` holds exactly the product of `dimensions` values.
    pub fn new(dimensions: Vec<usize>, data: TypedBuffer) -> SddsResult<Self> {
        let Some(elements) = checked_product(&dimensions) else {
            sdds_bail!(OutOfRange: "array extents {:?} overflow", dimensions);
        };
        if elements != data.len() {
            sdds_bail!(
                OutOfRange: "array extents {:?} describe {} elements but {} were given",
                dimensions, elements, data.len()
            );
        }
        Ok(Self { dimensions, data })
    }

    pub fn element_count(&self) -> usize {
        self.data.len()
    }
}

/// Rows a page without columns may claim. No data on file backs such rows.
const MAX_COLUMNLESS_ROWS: usize = 1 << 24;

/// Product of array extents, or `None` when it does not fit in `usize`.
pub(crate) fn checked_product(dimensions: &[usize]) -> Option<usize> {
    dimensions.iter().try_fold(1usize, |n, d| n.checked_mul(*d))
}

/// One page of parameters, arrays and columns.
///
/// Every column holds exactly `row_count` values. The row flags cover the same rows and the
/// column flags cover the layout's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    number: usize,
    capacity: usize,
    row_count: usize,
    /// Rows below this index are already on file and can no longer change.
    frozen_rows: usize,
    parameters: Vec<Value>,
    arrays: Vec<ArrayValue>,
    columns: Vec<TypedBuffer>,
    row_flags: Mask,
    column_flags: Mask,
}

impl Page {
    /// An empty page able to hold `capacity` rows. Fixed-value parameters are filled in.
    pub fn new(layout: &Layout, number: usize, capacity: usize) -> SddsResult<Self> {
        let parameters = layout
            .parameters
            .iter()
            .map(|p| Ok(p.parsed_fixed_value()?.unwrap_or_else(|| Value::zero(p.stype))))
            .collect::<SddsResult<Vec<_>>>()?;
        Ok(Self {
            number,
            capacity,
            row_count: 0,
            frozen_rows: 0,
            parameters,
            arrays: layout
                .arrays
                .iter()
                .map(|a| ArrayValue::empty(a.stype, a.dimensions))
                .collect(),
            columns: layout
                .columns
                .iter()
                .map(|c| TypedBuffer::with_capacity(c.stype, capacity))
                .collect(),
            row_flags: Mask::new_true(0),
            column_flags: Mask::new_true(layout.columns.len()),
        })
    }

    /// Assemble a decoded page. All columns must have the same length; `rows` is the row
    /// count of a page without columns.
    pub(crate) fn from_parts(
        number: usize,
        parameters: Vec<Value>,
        arrays: Vec<ArrayValue>,
        columns: Vec<TypedBuffer>,
        rows: usize,
    ) -> SddsResult<Self> {
        if columns.is_empty() && rows > MAX_COLUMNLESS_ROWS {
            sdds_bail!(CorruptPage: "page {} claims {} rows but has no columns", number, rows);
        }
        let row_count = columns.first().map_or(rows, TypedBuffer::len);
        if columns.iter().any(|c| c.len() != row_count) {
            sdds_bail!(CorruptPage: "columns of page {} have different lengths", number);
        }
        let column_count = columns.len();
        Ok(Self {
            number,
            capacity: row_count,
            row_count,
            frozen_rows: 0,
            parameters,
            arrays,
            columns,
            row_flags: Mask::new_true(row_count),
            column_flags: Mask::new_true(column_count),
        })
    }

    /// The 1-based page number.
    pub fn number(&self) -> usize {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: usize) {
        self.number = number;
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of leading rows that are already on file.
    pub fn frozen_rows(&self) -> usize {
        self.frozen_rows
    }

    /// Mark the first `rows` rows as written. The mark never moves back.
    pub(crate) fn freeze_rows(&mut self, rows: usize) {
        self.frozen_rows = self.frozen_rows.max(rows.min(self.row_count));
    }

    fn check_writable(&self, row: usize) -> SddsResult<()> {
        if row < self.frozen_rows {
            sdds_bail!(
                State: "row {} of page {} is already written; only rows from {} on can be set",
                row, self.number, self.frozen_rows
            );
        }
        Ok(())
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    pub fn arrays(&self) -> &[ArrayValue] {
        &self.arrays
    }

    pub fn columns(&self) -> &[TypedBuffer] {
        &self.columns
    }

    pub fn parameter(&self, idx: usize) -> &Value {
        &self.parameters[idx]
    }

    pub fn array(&self, idx: usize) -> &ArrayValue {
        &self.arrays[idx]
    }

    pub fn column(&self, idx: usize) -> &TypedBuffer {
        &self.columns[idx]
    }

    pub fn row_flags(&self) -> &Mask {
        &self.row_flags
    }

    pub fn column_flags(&self) -> &Mask {
        &self.column_flags
    }

    pub fn set_row_flags(&mut self, flags: Mask) -> SddsResult<()> {
        if flags.len() != self.row_count {
            sdds_bail!(OutOfRange: "{} row flags given for {} rows", flags.len(), self.row_count);
        }
        self.row_flags = flags;
        Ok(())
    }

    pub fn set_column_flags(&mut self, flags: Mask) -> SddsResult<()> {
        if flags.len() != self.columns.len() {
            sdds_bail!(OutOfRange: "{} column flags given for {} columns", flags.len(), self.columns.len());
        }
        self.column_flags = flags;
        Ok(())
    }

    /// Number of flagged rows among `[0, row_count)`.
    pub fn count_rows_of_interest(&self) -> usize {
        self.row_flags.true_count()
    }

    /// Indices of the flagged rows, ascending.
    pub fn rows_of_interest(&self) -> Vec<usize> {
        self.row_flags.to_indices()
    }

    /// Grow the row capacity by `delta`.
    pub fn lengthen(&mut self, delta: usize) {
        self.capacity += delta;
    }

    fn ensure_rows(&mut self, rows: usize) -> SddsResult<()> {
        if rows > self.capacity {
            sdds_bail!(
                OutOfRange: "row {} exceeds the page capacity of {} rows",
                rows.saturating_sub(1), self.capacity
            );
        }
        if rows > self.row_count {
            for column in &mut self.columns {
                column.resize(rows);
            }
            self.row_flags = self.row_flags.resized(rows, true);
            self.row_count = rows;
        }
        Ok(())
    }

    /// Copy `values` into the start of a column, converting numeric types.
    pub fn set_column(&mut self, idx: usize, values: &TypedBuffer) -> SddsResult<()> {
        let target = self.columns[idx].stype();
        let converted = values.cast(target)?;
        if !converted.is_empty() {
            self.check_writable(0)?;
        }
        self.ensure_rows(converted.len())?;
        self.columns[idx].splice(0, &converted)
    }

    /// Store one cell.
    pub fn set_value(&mut self, row: usize, idx: usize, value: &Value) -> SddsResult<()> {
        self.check_writable(row)?;
        let converted = value.cast(self.columns[idx].stype())?;
        self.ensure_rows(row + 1)?;
        self.columns[idx].set(row, &converted)
    }

    pub fn set_parameter(&mut self, idx: usize, value: &Value) -> SddsResult<()> {
        self.parameters[idx] = value.cast(self.parameters[idx].stype())?;
        Ok(())
    }

    pub fn set_array(&mut self, idx: usize, array: ArrayValue) -> SddsResult<()> {
        let current = &self.arrays[idx];
        if array.dimensions.len() != current.dimensions.len() {
            sdds_bail!(
                OutOfRange: "array expects {} dimensions but {} were given",
                current.dimensions.len(), array.dimensions.len()
            );
        }
        let data = array.data.cast(current.data.stype())?;
        self.arrays[idx] = ArrayValue::new(array.dimensions, data)?;
        Ok(())
    }

    /// Drop every row whose flag is clear, keeping the rest in order.
    pub fn delete_unset_rows(&mut self) -> SddsResult<usize> {
        if self.row_flags.all_true() {
            return Ok(0);
        }
        if let Some(row) = (0..self.frozen_rows).find(|&row| !self.row_flags.value(row)) {
            self.check_writable(row)?;
        }
        let keep = self.rows_of_interest();
        for column in &mut self.columns {
            *column = column.take(&keep)?;
        }
        let removed = self.row_count - keep.len();
        self.row_count = keep.len();
        self.row_flags = Mask::new_true(self.row_count);
        Ok(removed)
    }

    /// Remove a column, as when its definition is deleted from the layout.
    pub(crate) fn remove_column(&mut self, idx: usize) {
        self.columns.remove(idx);
        let kept: Vec<usize> = (0..self.column_flags.len())
            .filter(|&i| i != idx && self.column_flags.value(i))
            .map(|i| if i > idx { i - 1 } else { i })
            .collect();
        self.column_flags = Mask::from_indices(self.columns.len(), kept)
            .unwrap_or_else(|_| Mask::new_true(self.columns.len()));
    }
}

#[cfg(test)]
mod tests {
    use sdds_error::ErrorKind;

    use super::*;
    use crate::layout::{ArrayDefinition, ColumnDefinition, ParameterDefinition};

    fn layout() -> Layout {
        let mut layout = Layout::new();
        layout
            .define_parameter(ParameterDefinition::new("run", SType::I32).with_fixed_value("7"))
            .unwrap();
        layout
            .define_parameter(ParameterDefinition::new("label", SType::String))
            .unwrap();
        layout
            .define_array(ArrayDefinition::new("grid", SType::F32, 2))
            .unwrap();
        layout
            .define_column(ColumnDefinition::new("x", SType::F64))
            .unwrap();
        layout
            .define_column(ColumnDefinition::new("name", SType::String))
            .unwrap();
        layout
    }

    #[test]
    fn new_page_defaults() {
        let page = Page::new(&layout(), 1, 4).unwrap();
        assert_eq!(page.row_count(), 0);
        assert_eq!(page.capacity(), 4);
        assert_eq!(page.parameter(0), &Value::I32(7));
        assert_eq!(page.parameter(1), &Value::from(""));
        assert_eq!(page.array(0).dimensions, [0, 0]);
        assert!(page.column_flags().all_true());
    }

    #[test]
    fn set_column_and_values() {
        let mut page = Page::new(&layout(), 1, 4).unwrap();
        page.set_column(0, &TypedBuffer::from(vec![1i32, 2, 3])).unwrap();
        assert_eq!(page.row_count(), 3);
        assert_eq!(page.column(0), &TypedBuffer::from(vec![1.0f64, 2.0, 3.0]));
        assert_eq!(page.column(1).len(), 3);

        page.set_value(3, 1, &Value::from("last")).unwrap();
        assert_eq!(page.row_count(), 4);
        assert_eq!(page.row_flags().true_count(), 4);

        let err = page.set_value(4, 0, &Value::F64(0.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);
        page.lengthen(2);
        page.set_value(5, 0, &Value::F64(6.0)).unwrap();
        assert_eq!(page.row_count(), 6);

        let err = page.set_value(0, 1, &Value::F64(1.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn frozen_rows_reject_writes() {
        let mut page = Page::new(&layout(), 1, 4).unwrap();
        page.set_column(0, &TypedBuffer::from(vec![1.0f64, 2.0])).unwrap();
        page.freeze_rows(2);
        assert_eq!(page.frozen_rows(), 2);
        for row in [0, 1] {
            let err = page.set_value(row, 0, &Value::F64(9.0)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::State);
        }
        let err = page
            .set_column(1, &TypedBuffer::from(vec!["a"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::State);
        page.set_value(2, 0, &Value::F64(3.0)).unwrap();
        assert_eq!(page.column(0), &TypedBuffer::from(vec![1.0f64, 2.0, 3.0]));

        page.freeze_rows(1);
        assert_eq!(page.frozen_rows(), 2);
    }

    #[test]
    fn arrays_check_extents() {
        let mut page = Page::new(&layout(), 1, 0).unwrap();
        page.set_array(
            0,
            ArrayValue::new(vec![2, 2], TypedBuffer::from(vec![1.0f64, 2.0, 3.0, 4.0])).unwrap(),
        )
        .unwrap();
        assert_eq!(page.array(0).data.stype(), SType::F32);
        assert!(ArrayValue::new(vec![3], TypedBuffer::from(vec![1u16])).is_err());
        let wrong_rank = ArrayValue::new(vec![1], TypedBuffer::from(vec![1.0f32])).unwrap();
        assert!(page.set_array(0, wrong_rank).is_err());
    }

    #[test]
    fn delete_unset_rows_compacts() {
        let mut page = Page::new(&layout(), 1, 5).unwrap();
        page.set_column(0, &TypedBuffer::from(vec![0.0f64, 1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        let flags = page.row_flags().assert_indices(&[1, 3], false).unwrap();
        page.set_row_flags(flags).unwrap();
        assert_eq!(page.count_rows_of_interest(), 3);
        assert_eq!(page.delete_unset_rows().unwrap(), 2);
        assert_eq!(page.column(0), &TypedBuffer::from(vec![0.0f64, 2.0, 4.0]));
        assert!(page.row_flags().all_true());
    }
}

use std::io::{BufRead, Read};

use log::warn;
use sdds_dtype::{SType, TypedBuffer};
use sdds_error::{SddsResult, sdds_bail};
use sdds_io::{Decoder, Encoder};

use super::{PREALLOCATED, RowSelection};
use super::ascii::{AsciiField, Scanner};

/// Decoded column data and whether the page ended early.
pub(crate) type Block = (Vec<TypedBuffer>, bool);

/// How the column block of a page is interleaved.
pub(crate) trait BlockOrder {
    fn read_binary<R: Read>(
        decoder: &mut Decoder<R>,
        types: &[SType],
        rows: usize,
        selection: RowSelection,
        recover: bool,
    ) -> SddsResult<Block>;

    /// Encode rows `start..end` of every column.
    fn write_binary(
        encoder: &mut Encoder,
        columns: &[TypedBuffer],
        start: usize,
        end: usize,
    ) -> SddsResult<()>;

    /// Decode `rows` rows, or rows up to the next page break when `rows` is `None`.
    fn read_ascii<R: BufRead>(
        scanner: &mut Scanner<'_, R>,
        fields: &[AsciiField],
        rows: Option<usize>,
        selection: RowSelection,
        recover: bool,
    ) -> SddsResult<Block>;

    /// Render the listed rows of every column.
    fn write_ascii(
        out: &mut String,
        fields: &[AsciiField],
        columns: &[TypedBuffer],
        rows: &[usize],
        lines_per_row: usize,
    );
}

fn empty_columns(types: &[SType], rows: usize) -> Vec<TypedBuffer> {
    types
        .iter()
        .map(|t| TypedBuffer::with_capacity(*t, rows.min(PREALLOCATED)))
        .collect()
}

/// Trim every column to the rows that were read completely.
fn complete_rows(columns: &mut [TypedBuffer]) {
    let rows = columns.iter().map(TypedBuffer::len).min().unwrap_or(0);
    for column in columns {
        column.truncate(rows);
    }
}

/// Each row stores one value of every column in turn.
pub(crate) struct RowMajor;

impl BlockOrder for RowMajor {
    fn read_binary<R: Read>(
        decoder: &mut Decoder<R>,
        types: &[SType],
        rows: usize,
        selection: RowSelection,
        recover: bool,
    ) -> SddsResult<Block> {
        let mut columns = empty_columns(types, selection.kept(rows));
        if types.is_empty() {
            return Ok((columns, false));
        }
        for row in 0..rows {
            let keep = selection.keeps(row);
            for (column, stype) in columns.iter_mut().zip(types) {
                match decoder.read_value(*stype) {
                    Ok(value) if keep => column.push(&value)?,
                    Ok(_) => {}
                    Err(e) if recover && e.is_unexpected_eof() => {
                        warn!("recovered {} of {} rows from a truncated page", row, rows);
                        complete_rows(&mut columns);
                        return Ok((columns, true));
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok((columns, false))
    }

    fn write_binary(
        encoder: &mut Encoder,
        columns: &[TypedBuffer],
        start: usize,
        end: usize,
    ) -> SddsResult<()> {
        for row in start..end {
            for column in columns {
                encoder.put_buffer_range(column, row, row + 1)?;
            }
        }
        Ok(())
    }

    fn read_ascii<R: BufRead>(
        scanner: &mut Scanner<'_, R>,
        fields: &[AsciiField],
        rows: Option<usize>,
        selection: RowSelection,
        recover: bool,
    ) -> SddsResult<Block> {
        let types: Vec<SType> = fields.iter().map(|f| f.stype).collect();
        let mut columns = empty_columns(&types, rows.unwrap_or(0));
        let mut row = 0;
        loop {
            match rows {
                Some(n) if row >= n || fields.is_empty() => break,
                None if fields.is_empty() || scanner.at_page_break()? => break,
                _ => {}
            }
            let keep = selection.keeps(row);
            for (column, field) in columns.iter_mut().zip(fields) {
                match scanner.next_field(field)? {
                    Some(value) if keep => column.push(&value)?,
                    Some(_) => {}
                    None if recover || rows.is_none() => {
                        if rows.is_some() {
                            warn!("recovered {} rows from a truncated page", row);
                        }
                        complete_rows(&mut columns);
                        return Ok((columns, rows.is_some()));
                    }
                    None => sdds_bail!(CorruptPage: "input ends inside row {}", row),
                }
            }
            row += 1;
        }
        Ok((columns, false))
    }

    fn write_ascii(
        out: &mut String,
        fields: &[AsciiField],
        columns: &[TypedBuffer],
        rows: &[usize],
        lines_per_row: usize,
    ) {
        let per_line = columns.len().div_ceil(lines_per_row.max(1)).max(1);
        for &row in rows {
            for (i, (column, field)) in columns.iter().zip(fields).enumerate() {
                if i > 0 {
                    out.push(if i % per_line == 0 { '\n' } else { ' ' });
                }
                field.render(column, row, out);
            }
            out.push('\n');
        }
    }
}

/// Each column stores all of its values contiguously.
pub(crate) struct ColumnMajor;

impl BlockOrder for ColumnMajor {
    fn read_binary<R: Read>(
        decoder: &mut Decoder<R>,
        types: &[SType],
        rows: usize,
        selection: RowSelection,
        _recover: bool,
    ) -> SddsResult<Block> {
        let mut columns = Vec::with_capacity(types.len());
        for stype in types {
            let column = decoder.read_buffer(*stype, rows)?;
            columns.push(if selection.is_all() {
                column
            } else {
                column.take(&selection.indices(column.len()))?
            });
        }
        Ok((columns, false))
    }

    fn write_binary(
        encoder: &mut Encoder,
        columns: &[TypedBuffer],
        start: usize,
        end: usize,
    ) -> SddsResult<()> {
        for column in columns {
            encoder.put_buffer_range(column, start, end)?;
        }
        Ok(())
    }

    fn read_ascii<R: BufRead>(
        scanner: &mut Scanner<'_, R>,
        fields: &[AsciiField],
        rows: Option<usize>,
        selection: RowSelection,
        _recover: bool,
    ) -> SddsResult<Block> {
        let Some(rows) = rows else {
            sdds_bail!(CorruptPage: "column-major pages need a row count");
        };
        let kept = selection.kept(rows).min(PREALLOCATED);
        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            let mut column = TypedBuffer::with_capacity(field.stype, kept);
            for row in 0..rows {
                let Some(value) = scanner.next_field(field)? else {
                    sdds_bail!(CorruptPage: "input ends inside a column at row {}", row);
                };
                if selection.keeps(row) {
                    column.push(&value)?;
                }
            }
            columns.push(column);
        }
        Ok((columns, false))
    }

    fn write_ascii(
        out: &mut String,
        fields: &[AsciiField],
        columns: &[TypedBuffer],
        rows: &[usize],
        _lines_per_row: usize,
    ) {
        if rows.is_empty() {
            return;
        }
        for (column, field) in columns.iter().zip(fields) {
            for (i, &row) in rows.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                field.render(column, row, out);
            }
            out.push('\n');
        }
    }
}

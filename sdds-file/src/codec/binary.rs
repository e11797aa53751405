use std::io::Read;

use log::debug;
use sdds_dtype::SType;
use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_io::{Decoder, Encoder};

use super::{BlockOrder, RowSelection, array_elements, truncated};
use crate::layout::Layout;
use crate::page::{ArrayValue, Page};

/// Marks a row count too large for an `i32`; the real count follows as an `i64`.
pub(crate) const LARGE_COUNT_MARKER: i32 = i32::MIN;

fn read_row_count<R: Read>(decoder: &mut Decoder<R>) -> SddsResult<usize> {
    let count = match decoder.read_i32()? {
        LARGE_COUNT_MARKER => decoder.read_i64()?,
        small => i64::from(small),
    };
    usize::try_from(count.max(0)).map_err(|_| sdds_err!(CorruptPage: "row count {} is too large", count))
}

/// Write a row count. Fixed counts always take four bytes so they can be rewritten.
pub(crate) fn put_row_count(encoder: &mut Encoder, count: usize, fixed: bool) -> SddsResult<()> {
    match i32::try_from(count) {
        Ok(small) => encoder.put_i32(small),
        Err(_) if fixed => {
            sdds_bail!(OutOfRange: "{} rows do not fit in a rewritable row count", count)
        }
        Err(_) => {
            encoder.put_i32(LARGE_COUNT_MARKER);
            encoder.put_i64(
                i64::try_from(count).map_err(|_| sdds_err!(OutOfRange: "{} rows is too many", count))?,
            );
        }
    }
    Ok(())
}

/// Decode one binary page. The caller has already checked that input remains.
pub(crate) fn read_page<O: BlockOrder, R: Read>(
    decoder: &mut Decoder<R>,
    layout: &Layout,
    number: usize,
    selection: RowSelection,
    recover: bool,
) -> SddsResult<(Page, bool)> {
    let rows = read_row_count(decoder).map_err(|e| truncated(e, number))?;
    debug!("binary page {} with {} rows", number, rows);

    let mut parameters = Vec::with_capacity(layout.parameters.len());
    for def in &layout.parameters {
        let value = match def.parsed_fixed_value()? {
            Some(fixed) => fixed,
            None => decoder
                .read_value(def.stype)
                .map_err(|e| truncated(e, number))?,
        };
        parameters.push(value);
    }

    let mut arrays = Vec::with_capacity(layout.arrays.len());
    for def in &layout.arrays {
        let mut dimensions = Vec::with_capacity(def.dimensions);
        for _ in 0..def.dimensions {
            let extent = decoder.read_i32().map_err(|e| truncated(e, number))?;
            dimensions.push(usize::try_from(extent).map_err(|_| {
                sdds_err!(CorruptPage: "array {} has negative extent {}", def.name, extent)
            })?);
        }
        let elements = array_elements(&dimensions, &def.name, number)?;
        let data = decoder
            .read_buffer(def.stype, elements)
            .map_err(|e| truncated(e, number))?;
        arrays.push(ArrayValue::new(dimensions, data)?);
    }

    let types: Vec<SType> = layout.columns.iter().map(|c| c.stype).collect();
    let (columns, cut_short) =
        O::read_binary(decoder, &types, rows, selection, recover).map_err(|e| truncated(e, number))?;
    let kept = selection.kept(rows);
    Ok((Page::from_parts(number, parameters, arrays, columns, kept)?, cut_short))
}

/// Encode the row count, parameters and arrays that precede the column block.
pub(crate) fn write_prefix(
    encoder: &mut Encoder,
    layout: &Layout,
    page: &Page,
    count: usize,
    fixed_count: bool,
) -> SddsResult<()> {
    put_row_count(encoder, count, fixed_count)?;
    for (def, value) in layout.parameters.iter().zip(page.parameters()) {
        if def.fixed_value.is_none() {
            encoder.put_value(value)?;
        }
    }
    for array in page.arrays() {
        for extent in &array.dimensions {
            encoder.put_i32(
                i32::try_from(*extent)
                    .map_err(|_| sdds_err!(OutOfRange: "array extent {} is too large", extent))?,
            );
        }
        encoder.put_buffer(&array.data)?;
    }
    Ok(())
}

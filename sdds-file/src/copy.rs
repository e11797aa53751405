//! Moving definitions and data between datasets.
//!
//! Data is matched by name: a copy fills every field of the destination that the source also
//! defines and leaves the others at their defaults.

use sdds_error::{SddsResult, sdds_bail};

use crate::layout::{ColumnDefinition, ParameterDefinition};
use crate::options::{OutputTarget, SddsWriteOptions};
use crate::{Dataset, Definition};

/// How [`initialize_copy`] opens the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyMode {
    #[default]
    Create,
    /// Add pages to an existing file whose layout matches the source.
    Append,
}

/// Open a destination with the same layout as `source`.
///
/// Settings in `options` override the source's data encoding and description. Appending requires
/// a file target.
pub fn initialize_copy(
    source: &Dataset,
    target: &OutputTarget,
    mode: CopyMode,
    options: SddsWriteOptions,
) -> SddsResult<Dataset> {
    let options = options.with_layout(source.layout());
    match (mode, target) {
        (CopyMode::Create, target) => options.create_target(target),
        (CopyMode::Append, OutputTarget::File(path)) => options.append(path),
        (CopyMode::Append, _) => sdds_bail!(Usage: "only files can be appended to"),
    }
}

/// Start a page on `dst` holding every row of the page loaded in `src`.
///
/// Parameters, arrays, columns and row flags are copied for every name both layouts define.
pub fn copy_page(dst: &mut Dataset, src: &Dataset) -> SddsResult<usize> {
    let rows = src.current_page()?.row_count();
    let number = dst.start_page(rows)?;
    copy_parameters(dst, src)?;
    copy_arrays(dst, src)?;
    copy_columns(dst, src)?;
    let flags = src.current_page()?.row_flags().clone();
    let page = dst.current_page_mut()?;
    if page.row_count() == flags.len() {
        page.set_row_flags(flags)?;
    }
    Ok(number)
}

/// Copy the value of every non-fixed parameter both datasets define.
pub fn copy_parameters(dst: &mut Dataset, src: &Dataset) -> SddsResult<()> {
    let names: Vec<String> = dst
        .layout()
        .parameters
        .iter()
        .filter(|p| p.fixed_value.is_none())
        .map(|p| p.name.clone())
        .collect();
    for name in names {
        if src.layout().parameter_index(&name).is_some() {
            let value = src.get_parameter(&name)?.clone();
            dst.set_parameter(&name, value)?;
        }
    }
    Ok(())
}

pub fn copy_arrays(dst: &mut Dataset, src: &Dataset) -> SddsResult<()> {
    let names: Vec<String> = dst.layout().array_names().map(str::to_string).collect();
    for name in names {
        if src.layout().array_index(&name).is_some() {
            let array = src.get_array(&name)?;
            dst.set_array(&name, array.dimensions.clone(), array.data.clone())?;
        }
    }
    Ok(())
}

/// Copy every row of every column both datasets define into the start of `dst`'s page.
pub fn copy_columns(dst: &mut Dataset, src: &Dataset) -> SddsResult<()> {
    let names: Vec<String> = dst.layout().column_names().map(str::to_string).collect();
    for name in names {
        if src.layout().column_index(&name).is_some() {
            let column = src.internal_column(&name)?;
            dst.set_column(&name, column)?;
        }
    }
    Ok(())
}

/// Copy one row of every shared column from `src` to row `dst_row` of `dst`.
pub fn copy_row(dst: &mut Dataset, dst_row: usize, src: &Dataset, src_row: usize) -> SddsResult<()> {
    let names: Vec<String> = dst.layout().column_names().map(str::to_string).collect();
    for name in names {
        if src.layout().column_index(&name).is_some() {
            let value = src.get_value(&name, src_row)?;
            dst.set_value(&name, dst_row, value)?;
        }
    }
    Ok(())
}

/// Copy the flagged rows of `src` after the last row of `dst`'s page, growing it as needed.
pub fn copy_rows_of_interest(dst: &mut Dataset, src: &Dataset) -> SddsResult<usize> {
    let rows = src.current_page()?.rows_of_interest();
    let start = dst.current_page()?.row_count();
    let spare = dst.current_page()?.capacity() - start;
    if rows.len() > spare {
        dst.lengthen_table(rows.len() - spare)?;
    }
    for (offset, row) in rows.iter().enumerate() {
        copy_row(dst, start + offset, src, *row)?;
    }
    Ok(rows.len())
}

/// Define a column on `dst` from `src`'s definition of `name`, optionally renamed.
pub fn transfer_column_definition(
    dst: &mut Dataset,
    src: &Dataset,
    name: &str,
    new_name: Option<&str>,
) -> SddsResult<usize> {
    let mut def = src.layout().column(name)?.clone();
    if let Some(new_name) = new_name {
        def.set_name(new_name.to_string());
    }
    dst.define_column(def)
}

pub fn transfer_parameter_definition(
    dst: &mut Dataset,
    src: &Dataset,
    name: &str,
    new_name: Option<&str>,
) -> SddsResult<usize> {
    let mut def = src.layout().parameter(name)?.clone();
    if let Some(new_name) = new_name {
        def.set_name(new_name.to_string());
    }
    dst.define_parameter(def)
}

pub fn transfer_array_definition(
    dst: &mut Dataset,
    src: &Dataset,
    name: &str,
    new_name: Option<&str>,
) -> SddsResult<usize> {
    let mut def = src.layout().array(name)?.clone();
    if let Some(new_name) = new_name {
        def.set_name(new_name.to_string());
    }
    dst.define_array(def)
}

/// Define a column on `dst` shaped like `src`'s parameter `name`.
pub fn define_column_like_parameter(
    dst: &mut Dataset,
    src: &Dataset,
    name: &str,
    new_name: Option<&str>,
) -> SddsResult<usize> {
    let param = src.layout().parameter(name)?;
    dst.define_column(column_like_parameter(param, new_name))
}

/// Define a parameter on `dst` shaped like `src`'s column `name`.
pub fn define_parameter_like_column(
    dst: &mut Dataset,
    src: &Dataset,
    name: &str,
    new_name: Option<&str>,
) -> SddsResult<usize> {
    let column = src.layout().column(name)?;
    let mut def = ParameterDefinition::new(new_name.unwrap_or(&column.name), column.stype);
    def.symbol.clone_from(&column.symbol);
    def.units.clone_from(&column.units);
    def.description.clone_from(&column.description);
    def.format_string.clone_from(&column.format_string);
    dst.define_parameter(def)
}

fn column_like_parameter(param: &ParameterDefinition, new_name: Option<&str>) -> ColumnDefinition {
    let mut def = ColumnDefinition::new(new_name.unwrap_or(&param.name), param.stype);
    def.symbol.clone_from(&param.symbol);
    def.units.clone_from(&param.units);
    def.description.clone_from(&param.description);
    def.format_string.clone_from(&param.format_string);
    def
}

#[cfg(test)]
mod tests {
    use sdds_dtype::{SType, TypedBuffer, Value};

    use super::*;
    use crate::{ArrayDefinition, SddsOpenOptions};

    fn source() -> Dataset {
        let mut out = SddsWriteOptions::new().create_in_memory().unwrap();
        out.define_parameter(ParameterDefinition::new("run", SType::I32).with_units("count"))
            .unwrap();
        out.define_array(ArrayDefinition::new("grid", SType::F64, 1))
            .unwrap();
        out.define_column(ColumnDefinition::new("x", SType::F64))
            .unwrap();
        out.define_column(ColumnDefinition::new("tag", SType::String))
            .unwrap();
        out.write_layout().unwrap();
        out.start_page(3).unwrap();
        out.set_parameter("run", 42).unwrap();
        out.set_array("grid", vec![2], TypedBuffer::from(vec![1.0f64, 2.0]))
            .unwrap();
        out.set_column("x", &TypedBuffer::from(vec![1.0f64, 2.0, 3.0]))
            .unwrap();
        out.set_column("tag", &TypedBuffer::from(vec!["a", "b", "c"]))
            .unwrap();
        let bytes = out.into_bytes().unwrap();
        let mut input = SddsOpenOptions::new().open_bytes(bytes).unwrap();
        input.read_page().unwrap();
        input
    }

    #[test]
    fn page_copy_by_name() {
        let src = source();
        let mut dst = SddsWriteOptions::new().create_in_memory().unwrap();
        transfer_parameter_definition(&mut dst, &src, "run", None).unwrap();
        transfer_column_definition(&mut dst, &src, "x", Some("position")).unwrap();
        transfer_column_definition(&mut dst, &src, "tag", None).unwrap();
        dst.write_layout().unwrap();
        copy_page(&mut dst, &src).unwrap();
        assert_eq!(dst.get_parameter("run").unwrap(), &Value::I32(42));
        assert_eq!(
            dst.internal_column("tag").unwrap(),
            &TypedBuffer::from(vec!["a", "b", "c"])
        );
        assert_eq!(dst.internal_column("position").unwrap().len(), 3);
        assert_eq!(dst.layout().column("position").unwrap().stype, SType::F64);
    }

    #[test]
    fn rows_of_interest_append() {
        let mut src = source();
        src.assert_row_flags(crate::RowRange::Indices(&[1]), false)
            .unwrap();
        let mut dst = initialize_copy(
            &src,
            &OutputTarget::Memory,
            CopyMode::Create,
            SddsWriteOptions::new(),
        )
        .unwrap();
        dst.write_layout().unwrap();
        dst.start_page(1).unwrap();
        assert_eq!(copy_rows_of_interest(&mut dst, &src).unwrap(), 2);
        assert_eq!(copy_rows_of_interest(&mut dst, &src).unwrap(), 2);
        assert_eq!(
            dst.internal_column("x").unwrap(),
            &TypedBuffer::from(vec![1.0f64, 3.0, 1.0, 3.0])
        );
    }

    #[test]
    fn parameter_becomes_column() {
        let src = source();
        let mut dst = SddsWriteOptions::new().create_in_memory().unwrap();
        define_column_like_parameter(&mut dst, &src, "run", Some("Run")).unwrap();
        define_parameter_like_column(&mut dst, &src, "x", None).unwrap();
        let column = dst.layout().column("Run").unwrap();
        assert_eq!(column.stype, SType::I32);
        assert_eq!(column.units.as_deref(), Some("count"));
        assert_eq!(dst.layout().parameter("x").unwrap().stype, SType::F64);
        assert!(initialize_copy(&src, &OutputTarget::Stdout, CopyMode::Append, SddsWriteOptions::new()).is_err());
    }
}

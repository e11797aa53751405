//! The parsed header schema of a dataset.

use std::fmt::{Display, Formatter};

use sdds_dtype::{SType, Value};
use sdds_error::{SddsResult, sdds_bail, sdds_err};
use sdds_io::ByteOrder;

/// The header version written when no feature demands a newer one.
pub const BASE_VERSION: u32 = 1;
/// The newest header version this crate reads.
pub const MAX_VERSION: u32 = 5;

/// Encoding of the data section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataMode {
    #[default]
    Binary,
    Ascii,
}

impl DataMode {
    pub fn name(self) -> &'static str {
        match self {
            DataMode::Binary => "binary",
            DataMode::Ascii => "ascii",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "binary" => Some(DataMode::Binary),
            "ascii" => Some(DataMode::Ascii),
            _ => None,
        }
    }
}

impl Display for DataMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Behavior shared by the column, parameter and array definitions.
pub trait Definition {
    fn name(&self) -> &str;
    fn stype(&self) -> SType;
    /// Rename, keeping every other attribute.
    fn set_name(&mut self, name: String);
}

macro_rules! impl_definition {
    ($T:ty) => {
        impl Definition for $T {
            fn name(&self) -> &str {
                &self.name
            }

            fn stype(&self) -> SType {
                self.stype
            }

            fn set_name(&mut self, name: String) {
                self.name = name;
            }
        }

        impl $T {
            pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
                self.symbol = Some(symbol.into());
                self
            }

            pub fn with_units(mut self, units: impl Into<String>) -> Self {
                self.units = Some(units.into());
                self
            }

            pub fn with_description(mut self, description: impl Into<String>) -> Self {
                self.description = Some(description.into());
                self
            }

            pub fn with_format_string(mut self, format_string: impl Into<String>) -> Self {
                self.format_string = Some(format_string.into());
                self
            }
        }
    };
}

/// A column: one value per row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub symbol: Option<String>,
    pub units: Option<String>,
    pub description: Option<String>,
    pub format_string: Option<String>,
    pub stype: SType,
    pub field_length: i32,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, stype: SType) -> Self {
        Self {
            name: name.into(),
            symbol: None,
            units: None,
            description: None,
            format_string: None,
            stype,
            field_length: 0,
        }
    }
}

/// A parameter: one value per page, optionally fixed in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterDefinition {
    pub name: String,
    pub symbol: Option<String>,
    pub units: Option<String>,
    pub description: Option<String>,
    pub format_string: Option<String>,
    pub stype: SType,
    /// Text of the value declared in the header. Such parameters are absent from the data.
    pub fixed_value: Option<String>,
}

impl ParameterDefinition {
    pub fn new(name: impl Into<String>, stype: SType) -> Self {
        Self {
            name: name.into(),
            symbol: None,
            units: None,
            description: None,
            format_string: None,
            stype,
            fixed_value: None,
        }
    }

    pub fn with_fixed_value(mut self, value: impl Into<String>) -> Self {
        self.fixed_value = Some(value.into());
        self
    }

    /// The declared fixed value, parsed as this parameter's type.
    pub fn parsed_fixed_value(&self) -> SddsResult<Option<Value>> {
        self.fixed_value
            .as_deref()
            .map(|text| Value::parse(self.stype, text))
            .transpose()
    }
}

/// An array: a page-level block of values with one or more dimensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDefinition {
    pub name: String,
    pub symbol: Option<String>,
    pub units: Option<String>,
    pub description: Option<String>,
    pub format_string: Option<String>,
    pub group_name: Option<String>,
    pub stype: SType,
    pub field_length: i32,
    pub dimensions: usize,
}

impl ArrayDefinition {
    pub fn new(name: impl Into<String>, stype: SType, dimensions: usize) -> Self {
        Self {
            name: name.into(),
            symbol: None,
            units: None,
            description: None,
            format_string: None,
            group_name: None,
            stype,
            field_length: 0,
            dimensions: dimensions.max(1),
        }
    }
}

impl_definition!(ColumnDefinition);
impl_definition!(ParameterDefinition);
impl_definition!(ArrayDefinition);

/// A reference to a related file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssociateDefinition {
    pub name: String,
    pub filename: Option<String>,
    pub path: Option<String>,
    pub description: Option<String>,
    pub contents: Option<String>,
    pub sdds: bool,
}

/// The `&description` record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Description {
    pub text: Option<String>,
    pub contents: Option<String>,
}

/// The `&data` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDefinition {
    pub mode: DataMode,
    pub column_major: bool,
    pub no_row_counts: bool,
    pub lines_per_row: usize,
    pub additional_header_lines: usize,
    /// Declared byte order of binary data; `None` means the host order.
    pub byte_order: Option<ByteOrder>,
    /// Row counts are written with a fixed width so they can be rewritten in place.
    pub fixed_row_count: bool,
}

impl Default for DataDefinition {
    fn default() -> Self {
        Self {
            mode: DataMode::Binary,
            column_major: false,
            no_row_counts: false,
            lines_per_row: 1,
            additional_header_lines: 0,
            byte_order: None,
            fixed_row_count: false,
        }
    }
}

impl DataDefinition {
    /// The byte order binary data is stored in.
    pub fn effective_byte_order(&self) -> ByteOrder {
        self.byte_order.unwrap_or_default()
    }
}

/// The schema of a dataset: every field definition plus the data encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Layout {
    /// Version declared by the header that was read, or 0 for a layout built in memory.
    pub version: u32,
    pub description: Description,
    pub parameters: Vec<ParameterDefinition>,
    pub arrays: Vec<ArrayDefinition>,
    pub columns: Vec<ColumnDefinition>,
    pub associates: Vec<AssociateDefinition>,
    pub data: DataDefinition,
    /// Unrecognized directives, kept verbatim for re-emission.
    pub unknown_directives: Vec<String>,
}

fn find<D: Definition>(defs: &[D], name: &str) -> Option<usize> {
    defs.iter().position(|d| d.name() == name)
}

fn push_unique<D: Definition>(defs: &mut Vec<D>, def: D, class: &str) -> SddsResult<usize> {
    if def.name().is_empty() {
        sdds_bail!(InvalidArgument: "{} name must not be empty", class);
    }
    if find(defs, def.name()).is_some() {
        sdds_bail!(DuplicateDefinition: "{} {} is already defined", class, def.name());
    }
    defs.push(def);
    Ok(defs.len() - 1)
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_column(&mut self, def: ColumnDefinition) -> SddsResult<usize> {
        push_unique(&mut self.columns, def, "column")
    }

    pub fn define_parameter(&mut self, def: ParameterDefinition) -> SddsResult<usize> {
        if let Some(text) = &def.fixed_value {
            Value::parse(def.stype, text).map_err(|e| {
                e.with_context(format!("fixed value of parameter {}", def.name))
            })?;
        }
        push_unique(&mut self.parameters, def, "parameter")
    }

    pub fn define_array(&mut self, def: ArrayDefinition) -> SddsResult<usize> {
        push_unique(&mut self.arrays, def, "array")
    }

    pub fn define_associate(&mut self, def: AssociateDefinition) -> SddsResult<usize> {
        if self.associates.iter().any(|a| a.name == def.name) {
            sdds_bail!(DuplicateDefinition: "associate {} is already defined", def.name);
        }
        self.associates.push(def);
        Ok(self.associates.len() - 1)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        find(&self.columns, name)
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        find(&self.parameters, name)
    }

    pub fn array_index(&self, name: &str) -> Option<usize> {
        find(&self.arrays, name)
    }

    /// Index of a column, or `UnknownName`.
    pub fn require_column(&self, name: &str) -> SddsResult<usize> {
        self.column_index(name)
            .ok_or_else(|| sdds_err!(UnknownName: "no column named {}", name))
    }

    pub fn require_parameter(&self, name: &str) -> SddsResult<usize> {
        self.parameter_index(name)
            .ok_or_else(|| sdds_err!(UnknownName: "no parameter named {}", name))
    }

    pub fn require_array(&self, name: &str) -> SddsResult<usize> {
        self.array_index(name)
            .ok_or_else(|| sdds_err!(UnknownName: "no array named {}", name))
    }

    pub fn column(&self, name: &str) -> SddsResult<&ColumnDefinition> {
        Ok(&self.columns[self.require_column(name)?])
    }

    pub fn parameter(&self, name: &str) -> SddsResult<&ParameterDefinition> {
        Ok(&self.parameters[self.require_parameter(name)?])
    }

    pub fn array(&self, name: &str) -> SddsResult<&ArrayDefinition> {
        Ok(&self.arrays[self.require_array(name)?])
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn parameter_names(&self) -> impl Iterator<Item = &str> {
        self.parameters.iter().map(|p| p.name.as_str())
    }

    pub fn array_names(&self) -> impl Iterator<Item = &str> {
        self.arrays.iter().map(|a| a.name.as_str())
    }

    /// Remove a column definition, returning its former index.
    pub fn delete_column(&mut self, name: &str) -> SddsResult<usize> {
        let idx = self.require_column(name)?;
        self.columns.remove(idx);
        Ok(idx)
    }

    pub fn delete_parameter(&mut self, name: &str) -> SddsResult<usize> {
        let idx = self.require_parameter(name)?;
        self.parameters.remove(idx);
        Ok(idx)
    }

    /// The oldest header version able to describe this layout.
    pub fn required_version(&self) -> u32 {
        let types = self
            .parameters
            .iter()
            .map(|p| p.stype)
            .chain(self.arrays.iter().map(|a| a.stype))
            .chain(self.columns.iter().map(|c| c.stype));
        let mut version = types
            .map(|t| u32::from(t.min_version()))
            .fold(BASE_VERSION, u32::max);
        if self.data.column_major {
            version = version.max(3);
        }
        version
    }

    /// Check that `other` describes the same fields with the same types, in the same order.
    ///
    /// Used before appending pages to an existing file.
    pub fn check_compatible(&self, other: &Layout) -> SddsResult<()> {
        fn same<D: Definition>(class: &str, ours: &[D], theirs: &[D]) -> SddsResult<()> {
            if ours.len() != theirs.len() {
                sdds_bail!(LayoutMismatch: "{} {}s expected but {} found", ours.len(), class, theirs.len());
            }
            for (a, b) in ours.iter().zip(theirs) {
                if a.name() != b.name() || a.stype() != b.stype() {
                    sdds_bail!(
                        LayoutMismatch: "{} {}:{} does not match {}:{}",
                        class, a.name(), a.stype(), b.name(), b.stype()
                    );
                }
            }
            Ok(())
        }
        same("parameter", &self.parameters, &other.parameters)?;
        same("array", &self.arrays, &other.arrays)?;
        same("column", &self.columns, &other.columns)?;
        for (a, b) in self.parameters.iter().zip(&other.parameters) {
            if a.fixed_value != b.fixed_value {
                sdds_bail!(LayoutMismatch: "fixed value of parameter {} differs", a.name);
            }
        }
        if self.data.mode != other.data.mode || self.data.column_major != other.data.column_major {
            sdds_bail!(
                LayoutMismatch: "data encoding {}{} does not match {}{}",
                self.data.mode, if self.data.column_major { " column-major" } else { "" },
                other.data.mode, if other.data.column_major { " column-major" } else { "" }
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sdds_error::ErrorKind;

    use super::*;

    #[test]
    fn duplicate_names_rejected() {
        let mut layout = Layout::new();
        layout
            .define_column(ColumnDefinition::new("x", SType::F64))
            .unwrap();
        let err = layout
            .define_column(ColumnDefinition::new("x", SType::I32))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateDefinition);
        // Parameters live in their own namespace.
        layout
            .define_parameter(ParameterDefinition::new("x", SType::String))
            .unwrap();
        assert_eq!(
            layout.column("y").unwrap_err().kind(),
            ErrorKind::UnknownName
        );
    }

    #[test]
    fn version_follows_types() {
        let mut layout = Layout::new();
        assert_eq!(layout.required_version(), 1);
        layout
            .define_column(ColumnDefinition::new("a", SType::U16))
            .unwrap();
        assert_eq!(layout.required_version(), 2);
        layout.data.column_major = true;
        assert_eq!(layout.required_version(), 3);
        layout
            .define_parameter(ParameterDefinition::new("b", SType::I64))
            .unwrap();
        assert_eq!(layout.required_version(), 4);
    }

    #[test]
    fn fixed_value_must_parse() {
        let mut layout = Layout::new();
        let err = layout
            .define_parameter(ParameterDefinition::new("p", SType::I32).with_fixed_value("abc"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        layout
            .define_parameter(ParameterDefinition::new("q", SType::I32).with_fixed_value("12"))
            .unwrap();
        assert_eq!(
            layout.parameters[0].parsed_fixed_value().unwrap(),
            Some(Value::I32(12))
        );
    }

    #[test]
    fn compatibility() {
        let mut a = Layout::new();
        a.define_column(ColumnDefinition::new("x", SType::F64)).unwrap();
        let mut b = a.clone();
        b.columns[0].units = Some("m".into());
        a.check_compatible(&b).unwrap();
        b.columns[0].stype = SType::F32;
        assert_eq!(
            a.check_compatible(&b).unwrap_err().kind(),
            ErrorKind::LayoutMismatch
        );
    }
}

use std::io::Write;
use std::path::PathBuf;

use sdds::error::{SddsResult, sdds_bail};
use sdds::{DataMode, InputTarget, Layout, SddsOpenOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ListKind {
    Columns,
    Parameters,
    Arrays,
    Associates,
}

#[derive(Debug, Clone, clap::Args)]
pub struct QueryArgs {
    /// Files to describe. Standard input is read when none are given.
    pub files: Vec<PathBuf>,

    /// Print only the names of one kind of field.
    #[arg(long)]
    pub list: Option<ListKind>,

    /// Separator printed after each listed name.
    #[arg(long, default_value = "\n")]
    pub delimiter: String,

    /// Follow each listed name with its units in parentheses.
    #[arg(long)]
    pub append_units: bool,
}

fn or_null(text: &Option<String>) -> &str {
    text.as_deref().unwrap_or("NULL")
}

/// Describe the layout of each input.
pub fn exec_query<W: Write>(args: &QueryArgs, out: &mut W) -> SddsResult<()> {
    let targets: Vec<InputTarget> = if args.files.is_empty() {
        vec![InputTarget::Stdin]
    } else {
        args.files.iter().cloned().map(InputTarget::File).collect()
    };
    for target in &targets {
        let dataset = SddsOpenOptions::new().open_target(target)?;
        let layout = dataset.layout();
        match args.list {
            Some(kind) => list(layout, kind, args, out)?,
            None => {
                let name = match target {
                    InputTarget::File(path) => path.display().to_string(),
                    InputTarget::Stdin => "stdin".to_string(),
                };
                summarize(&name, layout, out)?;
            }
        }
        dataset.terminate()?;
    }
    out.flush()?;
    Ok(())
}

fn list<W: Write>(layout: &Layout, kind: ListKind, args: &QueryArgs, out: &mut W) -> SddsResult<()> {
    let entries: Vec<(&str, Option<&str>)> = match kind {
        ListKind::Columns => layout
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.units.as_deref()))
            .collect(),
        ListKind::Parameters => layout
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), p.units.as_deref()))
            .collect(),
        ListKind::Arrays => layout
            .arrays
            .iter()
            .map(|a| (a.name.as_str(), a.units.as_deref()))
            .collect(),
        ListKind::Associates => layout
            .associates
            .iter()
            .map(|a| (a.filename.as_deref().unwrap_or(a.name.as_str()), None))
            .collect(),
    };
    for (name, units) in entries {
        write!(out, "{name}")?;
        if let Some(units) = units.filter(|u| args.append_units && !u.trim().is_empty()) {
            write!(out, " ({units})")?;
        }
        write!(out, "{}", args.delimiter)?;
    }
    Ok(())
}

fn summarize<W: Write>(name: &str, layout: &Layout, out: &mut W) -> SddsResult<()> {
    writeln!(out, "\nfile {name} is in SDDS protocol version {}", layout.version)?;
    if let Some(text) = &layout.description.text {
        writeln!(out, "description: {text}")?;
    }
    if let Some(contents) = &layout.description.contents {
        writeln!(out, "contents: {contents}")?;
    }
    let data = &layout.data;
    match data.mode {
        DataMode::Ascii => {
            writeln!(
                out,
                "\ndata is ASCII with {} lines per row and {} additional header lines expected.",
                data.lines_per_row, data.additional_header_lines
            )?;
            writeln!(out, "row counts: {}", if data.no_row_counts { "no" } else { "yes" })?;
        }
        DataMode::Binary => match data.byte_order {
            Some(order) => writeln!(out, "\ndata is {} binary", order.header_name())?,
            None => writeln!(out, "\ndata is binary (no byte order declared)")?,
        },
    }
    if data.column_major {
        writeln!(out, "data is stored in column-major order")?;
    }

    if !layout.columns.is_empty() {
        writeln!(out, "\n{} columns of data:", layout.columns.len())?;
        writeln!(
            out,
            "NAME            UNITS           SYMBOL          FORMAT          TYPE    FIELD  DESCRIPTION"
        )?;
        writeln!(out, "{:72}LENGTH", "")?;
        for c in &layout.columns {
            writeln!(
                out,
                "{:<15} {:<15} {:<15} {:<15} {:<7} {:<7} {}",
                c.name,
                or_null(&c.units),
                or_null(&c.symbol),
                or_null(&c.format_string),
                c.stype.name(),
                c.field_length,
                or_null(&c.description)
            )?;
        }
    }
    if !layout.parameters.is_empty() {
        writeln!(out, "\n{} parameters:", layout.parameters.len())?;
        writeln!(
            out,
            "NAME                UNITS               SYMBOL              TYPE                DESCRIPTION"
        )?;
        for p in &layout.parameters {
            writeln!(
                out,
                "{:<19} {:<19} {:<19} {:<19} {}",
                p.name,
                or_null(&p.units),
                or_null(&p.symbol),
                p.stype.name(),
                or_null(&p.description)
            )?;
        }
    }
    if !layout.arrays.is_empty() {
        writeln!(out, "\n{} arrays of data:", layout.arrays.len())?;
        writeln!(
            out,
            "NAME            UNITS           SYMBOL          FORMAT  TYPE            FIELD   GROUP           DESCRIPTION"
        )?;
        writeln!(out, "{:72}LENGTH  NAME", "")?;
        for a in &layout.arrays {
            writeln!(
                out,
                "{:<15} {:<15} {:<15} {:<7} {:<8}*^{:<5} {:<7} {:<15} {}",
                a.name,
                or_null(&a.units),
                or_null(&a.symbol),
                or_null(&a.format_string),
                a.stype.name(),
                a.dimensions,
                a.field_length,
                or_null(&a.group_name),
                or_null(&a.description)
            )?;
        }
    }
    if !layout.associates.is_empty() {
        writeln!(out, "\n{} associates:", layout.associates.len())?;
        writeln!(
            out,
            "SDDS  FILENAME            PATH                          CONTENTS            DESCRIPTION"
        )?;
        for a in &layout.associates {
            writeln!(
                out,
                "{:<5} {:<19} {:<29} {:<19} {}",
                if a.sdds { "yes" } else { "no" },
                or_null(&a.filename),
                or_null(&a.path),
                or_null(&a.contents),
                or_null(&a.description)
            )?;
        }
    }
    Ok(())
}

/// Reject a query that names no readable input.
pub fn check_query(args: &QueryArgs) -> SddsResult<()> {
    if let Some(missing) = args.files.iter().find(|path| !path.exists()) {
        sdds_bail!(Usage: "{} does not exist", missing.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use sdds::dtype::SType;
    use sdds::{ColumnDefinition, ParameterDefinition, SddsWriteOptions};

    use super::*;

    fn input(dir: &std::path::Path) -> PathBuf {
        let path = dir.join("query.sdds");
        let mut out = SddsWriteOptions::new()
            .mode(DataMode::Ascii)
            .description("beam data")
            .create(&path)
            .unwrap();
        out.define_parameter(ParameterDefinition::new("Step", SType::I32))
            .unwrap();
        out.define_column(ColumnDefinition::new("x", SType::F64).with_units("m"))
            .unwrap();
        out.define_column(ColumnDefinition::new("label", SType::String))
            .unwrap();
        out.terminate().unwrap();
        path
    }

    #[test]
    fn summarizes_layout() {
        let dir = tempfile::tempdir().unwrap();
        let args = QueryArgs {
            files: vec![input(dir.path())],
            list: None,
            delimiter: "\n".to_string(),
            append_units: false,
        };
        let mut out = Vec::new();
        exec_query(&args, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("is in SDDS protocol version 1"));
        assert!(text.contains("description: beam data"));
        assert!(text.contains("data is ASCII with 1 lines per row"));
        assert!(text.contains("2 columns of data:"));
        assert!(text.contains("x               m               NULL"));
        assert!(text.contains("1 parameters:"));
    }

    #[test]
    fn lists_names_with_units() {
        let dir = tempfile::tempdir().unwrap();
        let args = QueryArgs {
            files: vec![input(dir.path())],
            list: Some(ListKind::Columns),
            delimiter: ",".to_string(),
            append_units: true,
        };
        let mut out = Vec::new();
        exec_query(&args, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "x (m),label,");

        let missing = QueryArgs {
            files: vec![dir.path().join("absent.sdds")],
            ..args
        };
        assert!(check_query(&missing).is_err());
    }
}

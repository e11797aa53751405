use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::str::FromStr;

use log::debug;
use sdds::dtype::{SType, TypedBuffer, Value};
use sdds::error::{SddsError, SddsResult, sdds_bail, sdds_err};
use sdds::io::EngineConfig;
use sdds::{ColumnDefinition, DataMode};

use crate::files::{CommonArgs, plain_output};

/// Whether the leading lines of the input name the columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Labels {
    /// The first line holds column names.
    Names,
    /// The first line holds names and the second units.
    NamesAndUnits,
}

impl FromStr for Labels {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(Labels::Names),
            "units" => Ok(Labels::NamesAndUnits),
            other => Err(format!("unknown uselabels keyword {other}")),
        }
    }
}

/// An explicit column declaration, `name=<name>,type=<type>[,units=<units>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnData {
    pub name: String,
    pub stype: SType,
    pub units: Option<String>,
}

impl FromStr for ColumnData {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut name = None;
        let mut stype = SType::String;
        let mut units = None;
        for field in s.split(',') {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, not {field}"))?;
            match key.trim().to_ascii_lowercase().as_str() {
                "name" => name = Some(value.to_string()),
                "type" => {
                    stype = SType::from_name(value).ok_or_else(|| format!("unknown type {value}"))?
                }
                "units" => units = Some(value.to_string()),
                other => return Err(format!("unknown column data field {other}")),
            }
        }
        let name = name.ok_or("column data needs a name")?;
        Ok(Self { name, stype, units })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum FillIn {
    /// Empty cells hold zero, or an empty string.
    #[default]
    Zero,
    /// Empty cells repeat the value above them.
    Last,
}

#[derive(Debug, Clone, clap::Args)]
pub struct CsvArgs {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,

    /// Write ASCII data instead of binary.
    #[arg(long)]
    pub ascii_output: bool,

    /// Character between fields.
    #[arg(long, default_value_t = ',')]
    pub separator: char,

    /// Lines to skip before the data, or before the labels.
    #[arg(long, default_value_t = 0)]
    pub skiplines: usize,

    /// Read column names, and optionally units, from the leading lines.
    #[arg(
        long,
        value_name = "units",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "",
        value_parser = Labels::from_str,
        conflicts_with = "column_data"
    )]
    pub uselabels: Option<Labels>,

    /// Declare the columns in order instead of inferring them.
    #[arg(long, value_parser = ColumnData::from_str)]
    pub column_data: Vec<ColumnData>,

    /// Stop after this many data rows.
    #[arg(long)]
    pub max_rows: Option<usize>,

    #[arg(long, value_enum, default_value_t)]
    pub fill_in: FillIn,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Split one line of CSV text, honoring double-quoted fields with doubled quotes inside.
pub fn split_record(line: &str, separator: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            c if c == separator && !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            c => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

/// Convert CSV text to an SDDS dataset with one page.
pub fn exec_csv2sdds(args: CsvArgs, config: EngineConfig) -> SddsResult<()> {
    let pipe = args.common.pipe.unwrap_or_default();
    let mut names = args.input.clone().into_iter().chain(args.output.clone());
    let text = if pipe.input {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        text
    } else {
        let path = names
            .next()
            .ok_or_else(|| sdds_err!(Usage: "an input file is required"))?;
        fs::read_to_string(&path)
            .map_err(|e| SddsError::from(e).with_context(path.display().to_string()))?
    };
    let output = plain_output(names.next(), &args.common)?;

    let mut lines = text
        .lines()
        .skip(args.skiplines)
        .filter(|line| !line.trim().is_empty());
    let (labels, units) = match args.uselabels {
        None => (None, None),
        Some(kind) => {
            let labels = lines
                .next()
                .map(|line| split_record(line, args.separator))
                .ok_or_else(|| sdds_err!(Usage: "the input has no label line"))?;
            let units = match kind {
                Labels::Names => None,
                Labels::NamesAndUnits => lines.next().map(|line| split_record(line, args.separator)),
            };
            (Some(labels), units)
        }
    };
    let rows: Vec<Vec<String>> = lines
        .take(args.max_rows.unwrap_or(usize::MAX))
        .map(|line| split_record(line, args.separator))
        .collect();

    let width = if !args.column_data.is_empty() {
        args.column_data.len()
    } else if let Some(labels) = &labels {
        labels.len()
    } else {
        rows.iter().map(Vec::len).max().unwrap_or(0)
    };
    if width == 0 {
        sdds_bail!(Usage: "no columns were found in the input");
    }

    let columns: Vec<ColumnData> = if args.column_data.is_empty() {
        (0..width)
            .map(|idx| {
                let name = labels
                    .as_ref()
                    .and_then(|l| l.get(idx))
                    .filter(|name| !name.is_empty())
                    .cloned()
                    .unwrap_or_else(|| format!("Column{}", idx + 1));
                let units = units
                    .as_ref()
                    .and_then(|u| u.get(idx))
                    .filter(|u| !u.is_empty())
                    .cloned();
                let numeric = rows.iter().all(|row| {
                    row.get(idx)
                        .is_none_or(|cell| cell.is_empty() || cell.parse::<f64>().is_ok())
                });
                let stype = if numeric { SType::F64 } else { SType::String };
                ColumnData { name, stype, units }
            })
            .collect()
    } else {
        args.column_data.clone()
    };

    let mut options = args.common.write_options(config);
    if args.ascii_output {
        options = options.mode(DataMode::Ascii);
    }
    let mut dataset = options.create_target(&output.target)?;
    for column in &columns {
        let mut def = ColumnDefinition::new(column.name.as_str(), column.stype);
        def.units.clone_from(&column.units);
        dataset.define_column(def)?;
    }
    dataset.write_layout()?;
    dataset.start_page(rows.len())?;
    for (idx, column) in columns.iter().enumerate() {
        let values = column_values(&rows, idx, column, args.fill_in)?;
        dataset.set_column(&column.name, &values)?;
    }
    debug!("read {} rows of {} columns", rows.len(), columns.len());
    dataset.write_page()?;
    dataset.terminate()?;
    output.finish()
}

fn column_values(
    rows: &[Vec<String>],
    idx: usize,
    column: &ColumnData,
    fill_in: FillIn,
) -> SddsResult<TypedBuffer> {
    let mut values = Vec::with_capacity(rows.len());
    let mut last = Value::zero(column.stype);
    for (row, cells) in rows.iter().enumerate() {
        let cell = cells.get(idx).map_or("", String::as_str);
        let value = if cell.is_empty() {
            match fill_in {
                FillIn::Zero => Value::zero(column.stype),
                FillIn::Last => last.clone(),
            }
        } else if column.stype == SType::String {
            Value::String(cell.to_string())
        } else {
            Value::parse(column.stype, cell)
                .map_err(|e| e.with_context(format!("row {} of column {}", row + 1, column.name)))?
        };
        last = value.clone();
        values.push(value);
    }
    TypedBuffer::from_values(column.stype, &values)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use sdds::SddsOpenOptions;

    use super::*;

    #[rstest]
    #[case("a,b,c", &["a", "b", "c"])]
    #[case("\"x, y\",2", &["x, y", "2"])]
    #[case("\"say \"\"hi\"\"\", 3 ", &["say \"hi\"", "3"])]
    #[case("1,,3", &["1", "", "3"])]
    fn splits_records(#[case] line: &str, #[case] fields: &[&str]) {
        assert_eq!(split_record(line, ','), fields);
    }

    fn args(input: PathBuf, output: PathBuf) -> CsvArgs {
        CsvArgs {
            input: Some(input),
            output: Some(output),
            ascii_output: false,
            separator: ',',
            skiplines: 0,
            uselabels: None,
            column_data: vec![],
            max_rows: None,
            fill_in: FillIn::Zero,
            common: CommonArgs::default(),
        }
    }

    #[test]
    fn labels_units_and_inferred_types() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.sdds");
        fs::write(
            &input,
            "time,name,current\ns,,mA\n0.5,alpha,1e-3\n1.5,2,2\n2.5,gamma,\n",
        )
        .unwrap();

        let mut args = args(input, output.clone());
        args.uselabels = Some(Labels::NamesAndUnits);
        args.fill_in = FillIn::Last;
        exec_csv2sdds(args, EngineConfig::default()).unwrap();

        let mut dataset = SddsOpenOptions::new().open(&output).unwrap();
        let layout = dataset.layout();
        let described: Vec<(&str, SType, Option<&str>)> = layout
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.stype, c.units.as_deref()))
            .collect();
        assert_eq!(
            described,
            [
                ("time", SType::F64, Some("s")),
                ("name", SType::String, None),
                ("current", SType::F64, Some("mA")),
            ]
        );
        dataset.read_page().unwrap().unwrap();
        assert_eq!(dataset.get_column_as_f64("time").unwrap(), vec![0.5, 1.5, 2.5]);
        assert_eq!(
            dataset.get_column("name").unwrap(),
            TypedBuffer::from(vec!["alpha", "2", "gamma"])
        );
        assert_eq!(dataset.get_column_as_f64("current").unwrap(), vec![1e-3, 2.0, 2.0]);
    }

    #[test]
    fn declared_columns() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        let output = dir.path().join("out.sdds");
        fs::write(&input, "# exported\n7;x\n8;y\n9;z\n").unwrap();

        let mut args = args(input, output.clone());
        args.separator = ';';
        args.skiplines = 1;
        args.max_rows = Some(2);
        args.ascii_output = true;
        args.column_data = vec![
            "name=id,type=long".parse().unwrap(),
            "name=tag,type=string,units=none".parse().unwrap(),
        ];
        exec_csv2sdds(args, EngineConfig::default()).unwrap();

        let mut dataset = SddsOpenOptions::new().open(&output).unwrap();
        assert_eq!(dataset.layout().data.mode, DataMode::Ascii);
        dataset.read_page().unwrap().unwrap();
        assert_eq!(
            dataset.get_column("id").unwrap(),
            TypedBuffer::from(vec![7i32, 8])
        );
        assert_eq!(
            dataset.layout().column("tag").unwrap().units.as_deref(),
            Some("none")
        );
    }

    #[test]
    fn rejects_bad_cells_in_declared_columns() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        fs::write(&input, "1\nfoo\n").unwrap();
        let mut args = args(input, dir.path().join("out.sdds"));
        args.column_data = vec!["name=n,type=short".parse().unwrap()];
        assert!(exec_csv2sdds(args, EngineConfig::default()).is_err());
        assert!("type=double".parse::<ColumnData>().is_err());
    }
}

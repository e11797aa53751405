use std::path::PathBuf;

use log::info;
use sdds::dtype::{SType, Value};
use sdds::error::{SddsResult, sdds_err};
use sdds::io::EngineConfig;
use sdds::{ColumnDefinition, SddsOpenOptions, define_column_like_parameter};

use crate::files::{CommonArgs, Files};

const PAGE_NUMBER: &str = "PageNumber";

#[derive(Debug, Clone, clap::Args)]
pub struct CollapseArgs {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Turn every parameter into a column holding one row per input page.
pub fn exec_collapse(args: CollapseArgs, config: EngineConfig) -> SddsResult<()> {
    let files = Files::resolve(args.input, args.output, &args.common)?;
    let mut input = SddsOpenOptions::new().open_target(&files.input)?;
    let source = input.layout();

    let mut options = args.common.write_options(config).mode(source.data.mode);
    if args.common.major_order.is_none() {
        options = options.column_major(source.data.column_major);
    }
    if let Some(text) = &source.description.text {
        options = options.description(text.as_str());
    }
    if let Some(contents) = &source.description.contents {
        options = options.contents(contents.as_str());
    }
    let mut output = options.create_target(&files.output.target)?;

    let names: Vec<String> = source.parameter_names().map(str::to_string).collect();
    for name in &names {
        define_column_like_parameter(&mut output, &input, name, None)?;
    }
    let numbered = !names.iter().any(|name| name == PAGE_NUMBER);
    if numbered {
        output.define_column(ColumnDefinition::new(PAGE_NUMBER, SType::I32))?;
    }
    output.write_layout()?;
    output.start_page(0)?;

    let mut row = 0;
    while let Some(page) = input.read_page()? {
        output.lengthen_table(1)?;
        for name in &names {
            let value = input.get_parameter(name)?.clone();
            output.set_value(name, row, value)?;
        }
        if numbered {
            let number = i32::try_from(page)
                .map_err(|_| sdds_err!(OutOfRange: "page number {} does not fit a long", page))?;
            output.set_value(PAGE_NUMBER, row, Value::I32(number))?;
        }
        row += 1;
    }
    info!("collapsed {row} pages");

    output.write_page()?;
    input.terminate()?;
    output.terminate()?;
    files.output.finish()
}

#[cfg(test)]
mod tests {
    use sdds::dtype::TypedBuffer;
    use sdds::{DataMode, ParameterDefinition, SddsWriteOptions};

    use super::*;

    #[test]
    fn parameters_become_columns() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.sdds");
        let output = dir.path().join("out.sdds");

        let mut out = SddsWriteOptions::new()
            .mode(DataMode::Ascii)
            .create(&input)
            .unwrap();
        out.define_parameter(ParameterDefinition::new("A", SType::F64))
            .unwrap();
        out.define_parameter(ParameterDefinition::new("B", SType::String))
            .unwrap();
        out.write_layout().unwrap();
        for (a, b) in [(1.0, "hello"), (2.5, "world")] {
            out.start_page(0).unwrap();
            out.set_parameter("A", a).unwrap();
            out.set_parameter("B", b).unwrap();
            out.write_page().unwrap();
        }
        out.terminate().unwrap();

        let args = CollapseArgs {
            input: Some(input),
            output: Some(output.clone()),
            common: CommonArgs::default(),
        };
        exec_collapse(args, EngineConfig::default()).unwrap();

        let mut collapsed = SddsOpenOptions::new().open(&output).unwrap();
        let columns: Vec<(String, SType)> = collapsed
            .layout()
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.stype))
            .collect();
        assert_eq!(
            columns,
            [
                ("A".to_string(), SType::F64),
                ("B".to_string(), SType::String),
                ("PageNumber".to_string(), SType::I32),
            ]
        );
        assert_eq!(collapsed.read_page().unwrap(), Some(1));
        assert_eq!(collapsed.get_column_as_f64("A").unwrap(), vec![1.0, 2.5]);
        assert_eq!(
            collapsed.get_column("B").unwrap(),
            TypedBuffer::from(vec!["hello", "world"])
        );
        assert_eq!(
            collapsed.get_column("PageNumber").unwrap(),
            TypedBuffer::from(vec![1i32, 2])
        );
        assert_eq!(collapsed.read_page().unwrap(), None);
    }
}

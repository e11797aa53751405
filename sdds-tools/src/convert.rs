use std::path::PathBuf;

use log::{debug, info};
use sdds::error::SddsResult;
use sdds::io::EngineConfig;
use sdds::{DataMode, SddsOpenOptions, copy_page, wild_match};

use crate::files::{CommonArgs, Files};

#[derive(Debug, Clone, clap::Args)]
pub struct ConvertArgs {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,

    /// Write ASCII data.
    #[arg(long, conflicts_with = "binary")]
    pub ascii: bool,

    /// Write binary data.
    #[arg(long)]
    pub binary: bool,

    /// Keep only the columns matching these wildcard patterns.
    #[arg(long, value_delimiter = ',')]
    pub retain: Vec<String>,

    /// Drop the columns matching these wildcard patterns.
    #[arg(long, value_delimiter = ',')]
    pub delete: Vec<String>,

    /// First page to copy, counting from 1.
    #[arg(long)]
    pub from_page: Option<usize>,

    /// Last page to copy.
    #[arg(long)]
    pub to_page: Option<usize>,

    /// Replace the description text.
    #[arg(long)]
    pub description: Option<String>,

    /// Keep the complete rows of a truncated last page.
    #[arg(long)]
    pub recover: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl ConvertArgs {
    fn mode(&self) -> Option<DataMode> {
        if self.ascii {
            Some(DataMode::Ascii)
        } else if self.binary {
            Some(DataMode::Binary)
        } else {
            None
        }
    }

    fn keeps(&self, column: &str) -> bool {
        let retained = self.retain.is_empty() || self.retain.iter().any(|p| wild_match(p, column));
        retained && !self.delete.iter().any(|p| wild_match(p, column))
    }
}

/// Copy a dataset, changing its encoding, its columns or its page range.
pub fn exec_convert(args: ConvertArgs, config: EngineConfig) -> SddsResult<()> {
    let files = Files::resolve(args.input.clone(), args.output.clone(), &args.common)?;
    let mut input = SddsOpenOptions::new()
        .auto_recover(args.recover)
        .open_target(&files.input)?;

    let mut layout = input.layout().clone();
    let dropped: Vec<String> = layout
        .column_names()
        .filter(|name| !args.keeps(name))
        .map(str::to_string)
        .collect();
    for name in &dropped {
        layout.delete_column(name)?;
    }
    if !dropped.is_empty() {
        debug!("dropping columns {}", dropped.join(", "));
    }

    let mut options = args.common.write_options(config).with_layout(&layout);
    if let Some(mode) = args.mode() {
        options = options.mode(mode);
    }
    if let Some(text) = &args.description {
        options = options.description(text.as_str());
    }
    let mut output = options.create_target(&files.output.target)?;
    output.write_layout()?;

    let first = args.from_page.unwrap_or(1);
    let mut copied = 0;
    while let Some(page) = input.read_page()? {
        if page < first {
            continue;
        }
        if args.to_page.is_some_and(|last| page > last) {
            break;
        }
        copy_page(&mut output, &input)?;
        output.write_page()?;
        copied += 1;
    }
    info!("copied {copied} pages");

    input.terminate()?;
    output.terminate()?;
    files.output.finish()
}

#[cfg(test)]
mod tests {
    use sdds::dtype::{SType, TypedBuffer};
    use sdds::{ColumnDefinition, ParameterDefinition, SddsWriteOptions};

    use super::*;

    fn write_input(path: &std::path::Path) {
        let mut out = SddsWriteOptions::new().mode(DataMode::Ascii).create(path).unwrap();
        out.define_parameter(ParameterDefinition::new("step", SType::I32))
            .unwrap();
        out.define_column(ColumnDefinition::new("x", SType::F64))
            .unwrap();
        out.define_column(ColumnDefinition::new("xLabel", SType::String))
            .unwrap();
        out.define_column(ColumnDefinition::new("y", SType::F32))
            .unwrap();
        out.write_layout().unwrap();
        for step in 1..=3 {
            out.start_page(2).unwrap();
            out.set_parameter("step", step).unwrap();
            out.set_column("x", &TypedBuffer::from(vec![1.0f64, 2.0]))
                .unwrap();
            out.set_column("xLabel", &TypedBuffer::from(vec!["a", "b c"]))
                .unwrap();
            out.set_column("y", &TypedBuffer::from(vec![0.5f32, 0.25]))
                .unwrap();
            out.write_page().unwrap();
        }
        out.terminate().unwrap();
    }

    fn args(input: PathBuf, output: Option<PathBuf>) -> ConvertArgs {
        ConvertArgs {
            input: Some(input),
            output,
            ascii: false,
            binary: false,
            retain: vec![],
            delete: vec![],
            from_page: None,
            to_page: None,
            description: None,
            recover: false,
            common: CommonArgs::default(),
        }
    }

    #[test]
    fn converts_mode_columns_and_pages() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.sdds");
        let output = dir.path().join("out.sdds");
        write_input(&input);

        let mut args = args(input, Some(output.clone()));
        args.binary = true;
        args.retain = vec!["x*".to_string()];
        args.delete = vec!["*Label".to_string()];
        args.from_page = Some(2);
        exec_convert(args, EngineConfig::default()).unwrap();

        let mut converted = SddsOpenOptions::new().open(&output).unwrap();
        assert_eq!(converted.layout().data.mode, DataMode::Binary);
        assert_eq!(converted.layout().column_names().collect::<Vec<_>>(), ["x"]);
        let mut steps = vec![];
        while converted.read_page().unwrap().is_some() {
            steps.push(converted.get_parameter("step").unwrap().as_i32().unwrap());
            assert_eq!(converted.get_column_as_f64("x").unwrap(), vec![1.0, 2.0]);
        }
        assert_eq!(steps, [2, 3]);
    }

    #[test]
    fn replaces_input_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.sdds");
        write_input(&input);

        let mut args = args(input.clone(), None);
        args.binary = true;
        args.common.major_order = Some(crate::files::MajorOrder::Column);
        exec_convert(args, EngineConfig::default()).unwrap();

        let replaced = SddsOpenOptions::new().open(&input).unwrap();
        assert_eq!(replaced.layout().data.mode, DataMode::Binary);
        assert!(replaced.layout().data.column_major);
        let backup = SddsOpenOptions::new()
            .open(crate::files::backup_path(&input))
            .unwrap();
        assert_eq!(backup.layout().data.mode, DataMode::Ascii);
    }
}

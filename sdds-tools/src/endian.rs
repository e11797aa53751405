use std::path::PathBuf;

use log::info;
use sdds::error::SddsResult;
use sdds::io::{ByteOrder, EngineConfig};
use sdds::{DataMode, SddsOpenOptions, copy_page};

use crate::files::{CommonArgs, Files};

#[derive(Debug, Clone, clap::Args)]
pub struct EndianArgs {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,

    /// Write binary data in the byte order opposite to this host's.
    #[arg(long)]
    pub non_native: bool,

    /// Decode the input in the byte order opposite to the one its header declares.
    #[arg(long)]
    pub reinterpret: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Rewrite a dataset as binary data in the native or the non-native byte order.
pub fn exec_endian(args: EndianArgs, config: EngineConfig) -> SddsResult<()> {
    let files = Files::resolve(args.input, args.output, &args.common)?;
    let mut input = SddsOpenOptions::new()
        .non_native(args.reinterpret)
        .open_target(&files.input)?;

    let order = if args.non_native {
        ByteOrder::native().opposite()
    } else {
        ByteOrder::native()
    };
    let mut output = args
        .common
        .write_options(config)
        .with_layout(input.layout())
        .mode(DataMode::Binary)
        .byte_order(order)
        .create_target(&files.output.target)?;
    output.write_layout()?;
    info!("writing {} data", output.byte_order());

    while input.read_page()?.is_some() {
        copy_page(&mut output, &input)?;
        output.write_page()?;
    }
    input.terminate()?;
    output.terminate()?;
    files.output.finish()
}

#[cfg(test)]
mod tests {
    use sdds::dtype::{SType, TypedBuffer, Value};
    use sdds::{ColumnDefinition, ParameterDefinition, SddsWriteOptions};

    use super::*;

    #[test]
    fn writes_swapped_binary_data() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.sdds");
        let output = dir.path().join("out.sdds");

        let mut out = SddsWriteOptions::new().create(&input).unwrap();
        out.define_parameter(ParameterDefinition::new("P", SType::String))
            .unwrap();
        out.define_column(ColumnDefinition::new("x", SType::F64))
            .unwrap();
        out.write_layout().unwrap();
        for label in ["v1", "v2"] {
            out.start_page(3).unwrap();
            out.set_parameter("P", label).unwrap();
            out.set_column("x", &TypedBuffer::from(vec![1.0f64, 2.0, 3.0]))
                .unwrap();
            out.write_page().unwrap();
        }
        out.terminate().unwrap();

        let args = EndianArgs {
            input: Some(input.clone()),
            output: Some(output.clone()),
            non_native: true,
            reinterpret: false,
            common: CommonArgs::default(),
        };
        exec_endian(args, EngineConfig::default()).unwrap();

        let opposite = ByteOrder::native().opposite();
        let bytes = std::fs::read(&output).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains(&format!("!# {}", opposite.header_name())));
        assert_ne!(bytes, std::fs::read(&input).unwrap());

        let mut swapped = SddsOpenOptions::new().open(&output).unwrap();
        assert_eq!(swapped.byte_order(), opposite);
        for label in ["v1", "v2"] {
            swapped.read_page().unwrap().unwrap();
            assert_eq!(
                swapped.get_parameter("P").unwrap(),
                &Value::String(label.to_string())
            );
            assert_eq!(swapped.get_column_as_f64("x").unwrap(), vec![1.0, 2.0, 3.0]);
        }
        assert_eq!(swapped.read_page().unwrap(), None);
    }
}

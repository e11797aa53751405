//! Input and output resolution shared by every tool.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::info;
use sdds::error::{SddsError, SddsResult, sdds_bail};
use sdds::io::EngineConfig;
use sdds::{InputTarget, OutputTarget, SddsWriteOptions};
use tempfile::TempPath;

/// Which ends of a tool are attached to stdin and stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pipe {
    pub input: bool,
    pub output: bool,
}

impl FromStr for Pipe {
    type Err = String;

    /// Parses `input`, `output` or both separated by a comma. An empty value pipes both.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self {
                input: true,
                output: true,
            });
        }
        let mut pipe = Self::default();
        for word in s.split(',').map(str::trim) {
            match word.to_ascii_lowercase().as_str() {
                "input" | "in" => pipe.input = true,
                "output" | "out" => pipe.output = true,
                other => return Err(format!("unknown pipe keyword {other}")),
            }
        }
        Ok(pipe)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MajorOrder {
    Row,
    Column,
}

/// Options every tool accepts.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CommonArgs {
    /// Use stdin and/or stdout in place of the input and output files.
    #[arg(
        long,
        value_name = "input,output",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "",
        value_parser = Pipe::from_str
    )]
    pub pipe: Option<Pipe>,

    /// Order of the emitted rows.
    #[arg(long, value_enum)]
    pub major_order: Option<MajorOrder>,
}

impl CommonArgs {
    /// Write options carrying the major order override and the process configuration.
    pub fn write_options(&self, config: EngineConfig) -> SddsWriteOptions {
        let options = SddsWriteOptions::new().config(config);
        match self.major_order {
            Some(order) => options.column_major(order == MajorOrder::Column),
            None => options,
        }
    }

    fn pipe(&self) -> Pipe {
        self.pipe.unwrap_or_default()
    }
}

/// Where a tool writes, and the file it replaces once done.
#[derive(Debug)]
pub struct Output {
    pub target: OutputTarget,
    replace: Option<(PathBuf, TempPath)>,
}

impl Output {
    /// Move a completed replacement into place, keeping the original as `<file>~`.
    pub fn finish(self) -> SddsResult<()> {
        if let Some((original, temp)) = self.replace {
            let backup = backup_path(&original);
            fs::rename(&original, &backup)?;
            temp.persist(&original).map_err(|e| SddsError::from(e.error))?;
            info!(
                "replaced {} (backup in {})",
                original.display(),
                backup.display()
            );
        }
        Ok(())
    }
}

/// The input and output of a single-input tool.
#[derive(Debug)]
pub struct Files {
    pub input: InputTarget,
    pub output: Output,
}

impl Files {
    /// Resolve positional file names against the pipe flags.
    ///
    /// Without an output file, or with an output file naming the input, the input is replaced
    /// once the tool has written its result.
    pub fn resolve(
        input: Option<PathBuf>,
        output: Option<PathBuf>,
        common: &CommonArgs,
    ) -> SddsResult<Self> {
        let pipe = common.pipe();
        let names: Vec<PathBuf> = input.into_iter().chain(output).collect();
        match (pipe.input, pipe.output, names.as_slice()) {
            (true, true, []) => Ok(Self {
                input: InputTarget::Stdin,
                output: Output::stdout(),
            }),
            (true, false, [output]) => Ok(Self {
                input: InputTarget::Stdin,
                output: Output::file(output.clone()),
            }),
            (false, true, [input]) => Ok(Self {
                input: InputTarget::File(input.clone()),
                output: Output::stdout(),
            }),
            (false, false, [input]) => Ok(Self {
                input: InputTarget::File(input.clone()),
                output: Output::replacing(input)?,
            }),
            (false, false, [input, output]) if same_file(input, output) => Ok(Self {
                input: InputTarget::File(input.clone()),
                output: Output::replacing(input)?,
            }),
            (false, false, [input, output]) => Ok(Self {
                input: InputTarget::File(input.clone()),
                output: Output::file(output.clone()),
            }),
            (true, true, _) => sdds_bail!(Usage: "no file names are allowed with --pipe"),
            (true, false, _) => sdds_bail!(Usage: "--pipe=input takes exactly one output file"),
            (false, true, _) => sdds_bail!(Usage: "--pipe=output takes exactly one input file"),
            (false, false, _) => sdds_bail!(Usage: "an input file is required"),
        }
    }
}

/// Resolve an output that must not replace anything, such as a tool whose input is not SDDS.
pub fn plain_output(output: Option<PathBuf>, common: &CommonArgs) -> SddsResult<Output> {
    match (common.pipe().output, output) {
        (true, None) => Ok(Output::stdout()),
        (false, Some(path)) => Ok(Output::file(path)),
        (true, Some(_)) => sdds_bail!(Usage: "no output file is allowed with --pipe=output"),
        (false, None) => sdds_bail!(Usage: "an output file is required"),
    }
}

impl Output {
    fn stdout() -> Self {
        Self {
            target: OutputTarget::Stdout,
            replace: None,
        }
    }

    fn file(path: PathBuf) -> Self {
        Self {
            target: OutputTarget::File(path),
            replace: None,
        }
    }

    fn replacing(original: &Path) -> SddsResult<Self> {
        let dir = match original.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let temp = tempfile::Builder::new()
            .prefix(".sdds")
            .tempfile_in(dir)?
            .into_temp_path();
        Ok(Self {
            target: OutputTarget::File(temp.to_path_buf()),
            replace: Some((original.to_path_buf(), temp)),
        })
    }
}

/// `<file>~`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push("~");
    PathBuf::from(name)
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("", true, true)]
    #[case("input", true, false)]
    #[case("output", false, true)]
    #[case("input,output", true, true)]
    #[case("Out", false, true)]
    fn pipe_keywords(#[case] text: &str, #[case] input: bool, #[case] output: bool) {
        assert_eq!(Pipe::from_str(text).unwrap(), Pipe { input, output });
    }

    #[test]
    fn rejects_unknown_pipe_keyword() {
        assert!(Pipe::from_str("sideways").is_err());
    }

    #[test]
    fn resolves_names_against_pipes() {
        let piped = CommonArgs {
            pipe: Some(Pipe {
                input: true,
                output: false,
            }),
            major_order: None,
        };
        let files = Files::resolve(Some("out.sdds".into()), None, &piped).unwrap();
        assert_eq!(files.input, InputTarget::Stdin);
        assert_eq!(
            files.output.target,
            OutputTarget::File(PathBuf::from("out.sdds"))
        );

        let files = Files::resolve(
            Some("in.sdds".into()),
            Some("out.sdds".into()),
            &CommonArgs::default(),
        )
        .unwrap();
        assert_eq!(files.input, InputTarget::File("in.sdds".into()));
        assert!(files.output.replace.is_none());

        assert!(Files::resolve(None, None, &CommonArgs::default()).is_err());
        assert!(Files::resolve(Some("a".into()), Some("b".into()), &piped).is_err());
    }

    #[test]
    fn replaces_input_with_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.sdds");
        fs::write(&path, "old").unwrap();
        let files = Files::resolve(Some(path.clone()), None, &CommonArgs::default()).unwrap();
        let OutputTarget::File(temp) = &files.output.target else {
            unreachable!("replacement writes to a file")
        };
        fs::write(temp, "new").unwrap();
        files.output.finish().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), "old");
    }
}

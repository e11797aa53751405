mod check;
mod collapse;
mod convert;
mod csv2sdds;
mod endian;
mod files;
mod hist;
mod query;
mod select;

use std::io;
use std::process::ExitCode;

use clap::Parser;
use log::LevelFilter;
use sdds::error::{ErrorKind, ErrorStack, PrintLevel, SddsError};
use sdds::io::EngineConfig;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use crate::check::{CheckArgs, exec_check};
use crate::collapse::{CollapseArgs, exec_collapse};
use crate::convert::{ConvertArgs, exec_convert};
use crate::csv2sdds::{CsvArgs, exec_csv2sdds};
use crate::endian::{EndianArgs, exec_endian};
use crate::hist::{HistArgs, exec_hist};
use crate::query::{QueryArgs, check_query, exec_query};
use crate::select::{SelectArgs, exec_select};

#[derive(clap::Parser)]
#[command(name = "sdds", version, about = "Tools for working with SDDS files")]
struct Cli {
    /// Suppress warnings.
    #[arg(long, global = true)]
    nowarnings: bool,

    /// Report what the tools and the engine are doing.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Change the data mode, major order, columns or page range of a file.
    Convert(ConvertArgs),
    /// Rewrite a file as binary data in the native or non-native byte order.
    Endian(EndianArgs),
    /// Turn parameters into columns with one row per page.
    Collapse(CollapseArgs),
    /// Keep the rows of one file whose key appears, or does not appear, in another.
    Select(SelectArgs),
    /// Histogram a column, page by page.
    Hist(HistArgs),
    /// Convert comma separated values to an SDDS file.
    Csv2sdds(CsvArgs),
    /// Describe the layout of files.
    Query(QueryArgs),
    /// Report whether a file reads cleanly.
    Check(CheckArgs),
}

impl Commands {
    /// The name errors are reported under.
    fn program(&self) -> &'static str {
        match self {
            Commands::Convert(_) => "sddsconvert",
            Commands::Endian(_) => "sddsendian",
            Commands::Collapse(_) => "sddscollapse",
            Commands::Select(_) => "sddsselect",
            Commands::Hist(_) => "sddshist",
            Commands::Csv2sdds(_) => "csv2sdds",
            Commands::Query(_) => "sddsquery",
            Commands::Check(_) => "sddscheck",
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        LevelFilter::Debug
    } else if cli.nowarnings {
        LevelFilter::Error
    } else {
        LevelFilter::Warn
    };
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .ok();
}

fn run(command: Commands) -> anyhow::Result<()> {
    let config = EngineConfig::from_env()?;
    match command {
        Commands::Convert(args) => exec_convert(args, config)?,
        Commands::Endian(args) => exec_endian(args, config)?,
        Commands::Collapse(args) => exec_collapse(args, config)?,
        Commands::Select(args) => exec_select(args, config)?,
        Commands::Hist(args) => exec_hist(args, config)?,
        Commands::Csv2sdds(args) => exec_csv2sdds(args, config)?,
        Commands::Query(args) => {
            check_query(&args)?;
            exec_query(&args, &mut io::stdout().lock())?
        }
        Commands::Check(args) => exec_check(&args, &mut io::stdout().lock())?,
    };
    Ok(())
}

/// Print `err` through the error stack and pick the exit status: 2 for usage errors, else 1.
fn report(program: &str, err: &anyhow::Error) -> ExitCode {
    let mut stack = ErrorStack::new(program);
    let status = match err.downcast_ref::<SddsError>() {
        Some(sdds_err) => {
            stack.record(sdds_err);
            if sdds_err.kind() == ErrorKind::Usage {
                2
            } else {
                1
            }
        }
        None => {
            stack.push(format!("{err:#}"));
            1
        }
    };
    stack.print(&mut io::stderr(), PrintLevel::Verbose).ok();
    ExitCode::from(status)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    let program = cli.command.program();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(program, &err),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_common_flags() {
        let cli = Cli::try_parse_from([
            "sdds",
            "--nowarnings",
            "convert",
            "in.sdds",
            "--ascii",
            "--pipe=output",
            "--major-order",
            "column",
        ])
        .unwrap();
        assert!(cli.nowarnings);
        let Commands::Convert(args) = cli.command else {
            unreachable!("parsed a convert command")
        };
        assert!(args.ascii);
        assert_eq!(
            args.common.pipe,
            Some(files::Pipe {
                input: false,
                output: true
            })
        );
        assert_eq!(args.common.major_order, Some(files::MajorOrder::Column));

        let cli = Cli::try_parse_from(["sdds", "select", "a", "b", "--match", "key", "--reuse"]).unwrap();
        let Commands::Select(args) = cli.command else {
            unreachable!("parsed a select command")
        };
        assert_eq!(args.reuse.map(|r| r.rows), Some(true));
        assert!(Cli::try_parse_from(["sdds", "select", "a", "b"]).is_err());
    }

    #[test]
    fn usage_errors_exit_with_two() {
        let err = anyhow::Error::from(sdds::error::sdds_err!(Usage: "bad flag"));
        assert_eq!(report("sddstest", &err), ExitCode::from(2));
        let err = anyhow::Error::from(sdds::error::sdds_err!(CorruptPage: "short page"));
        assert_eq!(report("sddstest", &err), ExitCode::from(1));
    }
}

use std::fmt::{Display, Formatter};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;
use sdds::SddsOpenOptions;
use sdds::error::{ErrorStack, PrintLevel, SddsError, SddsResult};

#[derive(Debug, Clone, clap::Args)]
pub struct CheckArgs {
    pub file: PathBuf,

    /// Print the reason a file is not ok to stderr.
    #[arg(long)]
    pub print_errors: bool,
}

/// The health of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Ok,
    Nonexistent,
    BadHeader,
    Corrupted,
}

impl Display for Verdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Verdict::Ok => "ok",
            Verdict::Nonexistent => "nonexistent",
            Verdict::BadHeader => "badHeader",
            Verdict::Corrupted => "corrupted",
        })
    }
}

/// Read every page of `path`, returning the verdict and the error behind it.
pub fn check_file(path: &Path) -> (Verdict, Option<SddsError>) {
    if !path.exists() {
        return (Verdict::Nonexistent, None);
    }
    let mut dataset = match SddsOpenOptions::new().open(path) {
        Ok(dataset) => dataset,
        Err(err) => return (Verdict::BadHeader, Some(err)),
    };
    let mut pages = 0;
    loop {
        match dataset.read_page() {
            Ok(Some(_)) => pages += 1,
            Ok(None) => break,
            Err(err) => return (Verdict::Corrupted, Some(err)),
        }
    }
    debug!("{} pages read from {}", pages, path.display());
    match dataset.terminate() {
        Ok(()) => (Verdict::Ok, None),
        Err(err) => (Verdict::Corrupted, Some(err)),
    }
}

/// Print whether a file is readable from its header through its last page.
pub fn exec_check<W: Write>(args: &CheckArgs, out: &mut W) -> SddsResult<()> {
    let (verdict, error) = check_file(&args.file);
    writeln!(out, "{verdict}")?;
    if let (true, Some(error)) = (args.print_errors, error) {
        let mut stack = ErrorStack::new("sddscheck");
        stack.record(&error);
        stack.print(&mut std::io::stderr(), PrintLevel::Verbose)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use sdds::dtype::{SType, TypedBuffer};
    use sdds::{ColumnDefinition, SddsWriteOptions};

    use super::*;

    #[test]
    fn classifies_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.sdds");
        let mut out = SddsWriteOptions::new().create(&good).unwrap();
        out.define_column(ColumnDefinition::new("x", SType::F64))
            .unwrap();
        out.write_layout().unwrap();
        out.start_page(4).unwrap();
        out.set_column("x", &TypedBuffer::from(vec![1.0f64, 2.0, 3.0, 4.0]))
            .unwrap();
        out.write_page().unwrap();
        out.terminate().unwrap();
        assert_eq!(check_file(&good).0, Verdict::Ok);

        let bytes = std::fs::read(&good).unwrap();
        let truncated = dir.path().join("truncated.sdds");
        std::fs::write(&truncated, &bytes[..bytes.len() - 5]).unwrap();
        let (verdict, error) = check_file(&truncated);
        assert_eq!(verdict, Verdict::Corrupted);
        assert!(error.is_some());

        let garbage = dir.path().join("garbage.sdds");
        std::fs::write(&garbage, "not an sdds file\n").unwrap();
        assert_eq!(check_file(&garbage).0, Verdict::BadHeader);

        assert_eq!(
            check_file(&dir.path().join("absent.sdds")).0,
            Verdict::Nonexistent
        );

        let mut out = Vec::new();
        exec_check(
            &CheckArgs {
                file: good,
                print_errors: true,
            },
            &mut out,
        )
        .unwrap();
        assert_eq!(out, b"ok\n");
    }
}

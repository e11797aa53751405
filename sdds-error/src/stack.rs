use std::io::Write;

use crate::SddsError;

/// How [`ErrorStack::print`] finishes after draining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrintLevel {
    /// Print the messages and return.
    Verbose,
    /// Print the messages and terminate the process with status 1.
    Exit,
}

/// A last-in first-out stack of error messages.
///
/// Tools record failures here as they surface and print them once, prefixed by the program
/// name, before exiting.
#[derive(Debug, Default, Clone)]
pub struct ErrorStack {
    program: String,
    messages: Vec<String>,
}

impl ErrorStack {
    /// Create an empty stack reporting on behalf of `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            messages: Vec::new(),
        }
    }

    /// Push a message.
    pub fn push(&mut self, msg: impl Into<String>) {
        self.messages.push(msg.into());
    }

    /// Push the rendered form of an error.
    pub fn record(&mut self, err: &SddsError) {
        self.messages.push(err.to_string());
    }

    /// The number of pending messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true if no messages are pending.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Remove every message, most recent first.
    pub fn drain(&mut self) -> Vec<String> {
        let mut drained = std::mem::take(&mut self.messages);
        drained.reverse();
        drained
    }

    /// Drain the stack into `sink`.
    ///
    /// Nothing is written if the stack is empty. With [`PrintLevel::Exit`] the process exits with
    /// status 1 once the messages are written.
    pub fn print<W: Write>(&mut self, sink: &mut W, level: PrintLevel) -> std::io::Result<()> {
        if !self.is_empty() {
            writeln!(sink, "Error for {}:", self.program)?;
            for msg in self.drain() {
                writeln!(sink, "{msg}")?;
            }
            sink.flush()?;
        }
        if level == PrintLevel::Exit {
            #[allow(clippy::exit)]
            std::process::exit(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdds_err;

    #[test]
    fn drains_most_recent_first() {
        let mut stack = ErrorStack::new("sddsconvert");
        stack.push("first");
        stack.record(&sdds_err!(UnknownName: "column x does not exist"));
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.drain(), vec!["column x does not exist", "first"]);
        assert!(stack.is_empty());
    }

    #[test]
    fn print_prefixes_program() {
        let mut stack = ErrorStack::new("sddsselect");
        stack.push("unable to read page");
        let mut out = Vec::new();
        stack.print(&mut out, PrintLevel::Verbose).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Error for sddsselect:\nunable to read page\n"
        );
        assert!(stack.is_empty());
    }

    #[test]
    fn print_empty_writes_nothing() {
        let mut stack = ErrorStack::new("sdds");
        let mut out = Vec::new();
        stack.print(&mut out, PrintLevel::Verbose).unwrap();
        assert!(out.is_empty());
    }
}

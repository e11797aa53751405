#![deny(missing_docs)]

//! Error handling for the SDDS engine.
//!
//! Every fallible engine operation returns an [`SddsResult`]. The [`sdds_err!`] and
//! [`sdds_bail!`] macros build errors of a given [`ErrorKind`], and [`ErrorStack`] preserves
//! the drain-and-print channel that command-line tools report through before exiting.

mod stack;

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::fmt::{Debug, Display, Formatter};
use std::ops::Deref;
use std::{env, io};

pub use stack::*;

/// A string that can be used as an error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrString(Cow<'static, str>);

impl<T> From<T> for ErrString
where
    T: Into<Cow<'static, str>>,
{
    #[allow(clippy::panic)]
    fn from(msg: T) -> Self {
        if env::var("SDDS_PANIC_ON_ERR").as_deref().unwrap_or("") == "1" {
            panic!("{}\nBacktrace:\n{}", msg.into(), Backtrace::capture());
        } else {
            Self(msg.into())
        }
    }
}

impl AsRef<str> for ErrString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for ErrString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for ErrString {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// The category of an [`SddsError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad flags or missing required inputs at the tool level.
    Usage,
    /// Stream open, read or write failure.
    Io,
    /// The header does not parse.
    CorruptHeader,
    /// Page data is inconsistent with its row count and layout.
    CorruptPage,
    /// An appended layout does not match the one on file.
    LayoutMismatch,
    /// A referenced column, parameter, array or associate does not exist.
    UnknownName,
    /// A value cannot be converted to the target type.
    TypeMismatch,
    /// The operation is invalid in the current handle state.
    State,
    /// An index or value lies outside permitted bounds.
    OutOfRange,
    /// A field name is defined twice within its class.
    DuplicateDefinition,
    /// Any other invalid argument.
    InvalidArgument,
}

// Alias keeps thiserror from generating the nightly-only `provide` impl for backtrace fields.
type CapturedBacktrace = Backtrace;

/// The top-level error type for the SDDS engine.
#[derive(thiserror::Error)]
#[non_exhaustive]
pub enum SddsError {
    /// Bad tool flags or missing required inputs.
    #[error("{0}")]
    Usage(ErrString, CapturedBacktrace),
    /// A stream open, read or write failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// The header does not parse, names an unknown type, or is out of canonical order.
    #[error("{0}")]
    CorruptHeader(ErrString, CapturedBacktrace),
    /// Data length inconsistent with the row count and layout.
    #[error("{0}")]
    CorruptPage(ErrString, CapturedBacktrace),
    /// Append-mode layout does not match what is on file.
    #[error("{0}")]
    LayoutMismatch(ErrString, CapturedBacktrace),
    /// A referenced column, parameter, array or associate is not present.
    #[error("{0}")]
    UnknownName(ErrString, CapturedBacktrace),
    /// A value cannot be converted between the source and target types.
    #[error("{0}")]
    TypeMismatch(ErrString, CapturedBacktrace),
    /// The operation is invalid in the current handle state.
    #[error("{0}")]
    State(ErrString, CapturedBacktrace),
    /// An index or value is beyond permitted bounds.
    #[error("{0}")]
    OutOfRange(ErrString, CapturedBacktrace),
    /// A name is defined twice within its definition class.
    #[error("{0}")]
    DuplicateDefinition(ErrString, CapturedBacktrace),
    /// Any other invalid argument.
    #[error("{0}")]
    InvalidArgument(ErrString, CapturedBacktrace),
    /// An error with an additional message describing where it happened.
    #[error("{0}: {1}")]
    Context(ErrString, #[source] Box<SddsError>),
}

impl SddsError {
    /// Adds additional context to an error.
    pub fn with_context<T: Into<ErrString>>(self, msg: T) -> Self {
        SddsError::Context(msg.into(), Box::new(self))
    }

    /// The kind of this error, looking through any context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SddsError::Usage(..) => ErrorKind::Usage,
            SddsError::Io(_) => ErrorKind::Io,
            SddsError::CorruptHeader(..) => ErrorKind::CorruptHeader,
            SddsError::CorruptPage(..) => ErrorKind::CorruptPage,
            SddsError::LayoutMismatch(..) => ErrorKind::LayoutMismatch,
            SddsError::UnknownName(..) => ErrorKind::UnknownName,
            SddsError::TypeMismatch(..) => ErrorKind::TypeMismatch,
            SddsError::State(..) => ErrorKind::State,
            SddsError::OutOfRange(..) => ErrorKind::OutOfRange,
            SddsError::DuplicateDefinition(..) => ErrorKind::DuplicateDefinition,
            SddsError::InvalidArgument(..) => ErrorKind::InvalidArgument,
            SddsError::Context(_, inner) => inner.kind(),
        }
    }

    /// Returns true if the error (or the error it wraps) is an unexpected end of stream.
    pub fn is_unexpected_eof(&self) -> bool {
        match self {
            SddsError::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            SddsError::Context(_, inner) => inner.is_unexpected_eof(),
            _ => false,
        }
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            SddsError::Usage(_, bt)
            | SddsError::CorruptHeader(_, bt)
            | SddsError::CorruptPage(_, bt)
            | SddsError::LayoutMismatch(_, bt)
            | SddsError::UnknownName(_, bt)
            | SddsError::TypeMismatch(_, bt)
            | SddsError::State(_, bt)
            | SddsError::OutOfRange(_, bt)
            | SddsError::DuplicateDefinition(_, bt)
            | SddsError::InvalidArgument(_, bt) => Some(bt),
            SddsError::Context(_, inner) => inner.backtrace(),
            SddsError::Io(_) => None,
        }
    }
}

impl Debug for SddsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind(), self)?;
        if let Some(bt) = self.backtrace() {
            write!(f, "\nBacktrace:\n{bt}")?;
        }
        Ok(())
    }
}

/// A type alias for Results that return SddsErrors as their error type.
pub type SddsResult<T> = Result<T, SddsError>;

/// A convenient macro for creating an SddsError.
///
/// `sdds_err!(UnknownName: "no column {}", name)` builds an error of the given kind, while
/// `sdds_err!("bad value {}", v)` builds an [`SddsError::InvalidArgument`].
#[macro_export]
macro_rules! sdds_err {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {{
        use std::backtrace::Backtrace;
        $crate::SddsError::$variant(format!($fmt, $($arg),*).into(), Backtrace::capture())
    }};
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::sdds_err!(InvalidArgument: $fmt, $($arg),*)
    };
}

/// A convenience macro for returning an SddsError.
#[macro_export]
macro_rules! sdds_bail {
    ($($tt:tt)+) => {
        return Err($crate::sdds_err!($($tt)+))
    };
}

/// A convenience macro for panicking with an SddsError.
#[macro_export]
macro_rules! sdds_panic {
    ($variant:ident: $fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::sdds_panic!($crate::sdds_err!($variant: $fmt, $($arg),*))
    };
    ($fmt:literal $(, $arg:expr)* $(,)?) => {
        $crate::sdds_panic!($crate::sdds_err!($fmt, $($arg),*))
    };
    ($err:expr) => {{
        let err: $crate::SddsError = $err;
        #[allow(clippy::panic)]
        {
            panic!("{}", err)
        }
    }};
}

#[cfg(test)]
mod test {
    use super::*;

    fn lookup(name: &str) -> SddsResult<usize> {
        if name == "x" {
            return Ok(0);
        }
        sdds_bail!(UnknownName: "column {} does not exist", name)
    }

    #[test]
    fn bail_sets_kind_and_message() {
        let err = lookup("y").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownName);
        assert_eq!(err.to_string(), "column y does not exist");
        assert_eq!(lookup("x").unwrap(), 0);
    }

    #[test]
    fn unprefixed_err_is_invalid_argument() {
        let err = sdds_err!("bad value {}", 3);
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn context_keeps_inner_kind() {
        let err = sdds_err!(CorruptPage: "short read").with_context("page 2");
        assert_eq!(err.kind(), ErrorKind::CorruptPage);
        assert_eq!(err.to_string(), "page 2: short read");
    }

    #[test]
    fn io_errors_convert() {
        let err: SddsError = io::Error::new(io::ErrorKind::UnexpectedEof, "eof").into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.is_unexpected_eof());
        assert!(err.with_context("reading").is_unexpected_eof());
    }
}

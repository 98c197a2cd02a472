//! Error reports returned by the public API.
//!
//! Both the [reader](crate::Mp4Reader) and the [writer](crate::Mp4Writer) return their typed errors
//! ([`ParseError`](crate::ParseError) and [`WriteError`](crate::WriteError)) wrapped in a [`Report`], which records
//! where inside `mp4stream` the error was raised along with a trail of context messages.

use std::any::type_name;
use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;

use derive_more::Display;

/// A typed error together with the source location that raised it and the context gathered while it propagated.
///
/// Formatting with `{}` prints the error alone; `{:?}` prints the origin and every context line, innermost first.
/// Match on the error itself through [`get_ref`](Self::get_ref) or [`into_inner`](Self::into_inner).
#[derive(thiserror::Error)]
#[error("{error}")]
pub struct Report<E: StdError + 'static> {
    #[source]
    error: E,
    origin: &'static Location<'static>,
    context: Vec<Context>,
}

/// `Result` specialised to errors carried in a [`Report`].
pub type Result<T, E> = std::result::Result<T, Report<E>>;

/// Context messages for the error side of a [`Result`].
pub trait ResultExt: Sized {
    /// Add `message` to the context trail of the error, if any.
    #[track_caller]
    fn attach_printable<P: fmt::Display + Send + Sync + 'static>(self, message: P) -> Self;

    /// Note that the error happened while decoding a value of the success type.
    #[track_caller]
    fn while_parsing_type(self) -> Self;
}

/// Context message naming the type being decoded when an error occurred.
#[derive(Clone, Copy, Debug, Display)]
#[display(fmt = "while parsing value of type `{}`", _0)]
pub struct WhileParsingType(&'static str);

struct Context {
    message: Box<dyn fmt::Display + Send + Sync + 'static>,
    location: &'static Location<'static>,
}

impl<E: StdError + 'static> Report<E> {
    /// The error carried by this report.
    pub fn get_ref(&self) -> &E {
        &self.error
    }

    /// Discard the context and return the error.
    pub fn into_inner(self) -> E {
        self.error
    }

    /// Where the error was first turned into a report.
    pub fn origin(&self) -> &'static Location<'static> {
        self.origin
    }

    /// Add `message` to the context trail, tagged with the caller's location.
    #[track_caller]
    pub fn attach_printable<P: fmt::Display + Send + Sync + 'static>(mut self, message: P) -> Self {
        self.context.push(Context { message: Box::new(message), location: Location::caller() });
        self
    }
}

impl<E: StdError + 'static> From<E> for Report<E> {
    #[track_caller]
    fn from(error: E) -> Self {
        Self { error, origin: Location::caller(), context: Vec::new() }
    }
}

impl<E: StdError + 'static> fmt::Debug for Report<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.error, self.origin)?;
        for Context { message, location } in &self.context {
            write!(f, "\n - {message} at {location}")?;
        }
        Ok(())
    }
}

impl WhileParsingType {
    /// Context naming `T`.
    pub fn new<T: ?Sized>() -> Self {
        Self(type_name::<T>())
    }
}

impl<T, E: StdError + 'static> ResultExt for Result<T, E> {
    #[track_caller]
    fn attach_printable<P: fmt::Display + Send + Sync + 'static>(self, message: P) -> Self {
        self.map_err(|report| report.attach_printable(message))
    }

    #[track_caller]
    fn while_parsing_type(self) -> Self {
        self.attach_printable(WhileParsingType::new::<T>())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("sample table is inconsistent")]
    struct TableError;

    fn failing_lookup() -> Result<u32, TableError> {
        bail_attach!(TableError, "looking up chunk 3")
    }

    #[test]
    fn display_is_error_only() {
        let report = failing_lookup().unwrap_err();
        assert_eq!(report.to_string(), "sample table is inconsistent");
    }

    #[test]
    fn debug_lists_origin_and_context() {
        let report = failing_lookup().while_parsing_type().unwrap_err();
        let debug = format!("{report:?}");
        assert!(debug.starts_with("sample table is inconsistent at "));
        assert!(debug.contains(report.origin().file()));
        let chunk = debug.find("looking up chunk 3").unwrap();
        let type_name = debug.find("value of type `u32`").unwrap();
        assert!(chunk < type_name);
    }

    #[test]
    fn ensure_records_condition() {
        fn check(entries: u32) -> Result<(), TableError> {
            ensure_attach!(entries > 0, TableError);
            Ok(())
        }
        assert!(check(1).is_ok());
        let debug = format!("{:?}", check(0).unwrap_err());
        assert!(debug.contains("condition failed: entries > 0"));
    }
}

use std::error::Error as StdError;
use std::fmt;
use std::path::PathBuf;

use tracing_error::SpanTrace;

/* 📖 # Why a custom error type and not use anyhow/eyre/thiserror etc?

- Better control over error handling
- No dependencies to compile and integrate
- More transparency into error handling logic
 */

/// Error variants that can occur in livedoc operations.
#[derive(Debug)]
pub enum ErrorKind {
    /// File system operation failed
    FileError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Registering or running a directory watch failed
    WatchError {
        path: PathBuf,
        source: notify::Error,
    },

    /// Catch-all for other errors with a message
    Message { message: String },
}

/* 📖 # Why separate ErrorKind and LivedocError?
ErrorKind carries the structural variant (which path, which io error),
LivedocError adds the context chain attached while the error propagates and
the span trace captured where it was created. Callers can match on the kind
without parsing strings.
*/

/// Error type wrapping ErrorKind with optional context and a captured span trace.
#[derive(Debug)]
pub struct LivedocError {
    kind: ErrorKind,
    context: Vec<String>,
    span_trace: SpanTrace,
}

impl LivedocError {
    /// Creates a new error from an ErrorKind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: vec![],
            span_trace: SpanTrace::capture(),
        }
    }

    /// Creates a message error.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Message {
            message: message.into(),
        })
    }

    /// Creates a file error for the given path.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::new(ErrorKind::FileError {
            path: path.into(),
            source,
        })
    }

    /// Attaches context to an error.
    /// Context is displayed before the error message.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Attaches context using lazy evaluation.
    pub fn with_context<F>(mut self, f: F) -> Self
    where
        F: FnOnce() -> String,
    {
        self.context.push(f());
        self
    }

    /// Returns a reference to the underlying ErrorKind.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the attached context, outermost first.
    pub fn get_context(&self) -> &[String] {
        &self.context
    }

    /// Returns the span trace captured when the error was created.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.span_trace
    }

    /// Returns true if this error wraps an io error of kind `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(
            &self.kind,
            ErrorKind::FileError { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }

    /// Returns the innermost error in the chain.
    pub fn root_cause(&self) -> &(dyn StdError + 'static) {
        let mut current: &(dyn StdError + 'static) = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current
    }
}

impl From<ErrorKind> for LivedocError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl StdError for LivedocError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match &self.kind {
            ErrorKind::FileError { source, .. } => Some(source),
            ErrorKind::WatchError { source, .. } => Some(source),
            ErrorKind::Message { .. } => None,
        }
    }
}

impl fmt::Display for LivedocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, ctx) in self.context.iter().enumerate() {
            if i == 0 {
                write!(f, "{}", ctx)?;
            } else {
                write!(f, ": {}", ctx)?;
            }
        }

        if !self.context.is_empty() {
            write!(f, ": ")?;
        }

        match &self.kind {
            ErrorKind::FileError { path, source } => {
                write!(f, "File error at {}: {}", path.display(), source)
            }
            ErrorKind::WatchError { path, source } => {
                write!(f, "Watch error at {}: {}", path.display(), source)
            }
            ErrorKind::Message { message } => {
                write!(f, "{}", message)
            }
        }
    }
}

/* 📖 # Why use Box<LivedocError> in the result type?

Boxing the error reduces the size of the result type, making it more efficient to return in the common case.

*/

/// Standard result type for livedoc operations.
pub type LivedocResult<T> = std::result::Result<T, Box<LivedocError>>;

/// Extension trait for attaching context to Results.
pub trait ResultExt<T> {
    /// Attaches context to an error, consuming and re-wrapping it.
    fn context(self, context: impl Into<String>) -> LivedocResult<T>;

    /// Attaches context using lazy evaluation.
    /// Context is only evaluated if the result is an error.
    fn with_context<F>(self, f: F) -> LivedocResult<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for LivedocResult<T> {
    fn context(self, context: impl Into<String>) -> LivedocResult<T> {
        self.map_err(|err| Box::new(err.context(context)))
    }

    fn with_context<F>(self, f: F) -> LivedocResult<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|err| Box::new(err.with_context(f)))
    }
}

/// Build a boxed message error from a format string.
#[macro_export]
macro_rules! err {
    ($($arg:tt)*) => {
        Box::new($crate::error::LivedocError::message(format!($($arg)*)))
    };
}

/// Return early with a boxed message error.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::err!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_error_from_file_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let path = PathBuf::from("test.md");
        let error = LivedocError::file(path.clone(), io_err);

        match error.kind() {
            ErrorKind::FileError { path: p, .. } => {
                assert_eq!(p, &path);
            }
            _ => panic!("Expected FileError variant"),
        }
        assert!(error.is_not_found());
    }

    #[test]
    fn test_permission_error_is_not_not_found() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let error = LivedocError::file("secret.md", io_err);
        assert!(!error.is_not_found());
    }

    #[test]
    fn test_error_context_attachment() {
        let error = LivedocError::message("original error")
            .context("first context")
            .context("second context");

        assert_eq!(error.get_context().len(), 2);
        assert_eq!(error.get_context()[0], "first context");
        assert_eq!(error.get_context()[1], "second context");
    }

    #[test]
    fn test_error_with_context_lazy_evaluation() {
        let mut called = false;
        let error = LivedocError::message("error").with_context(|| {
            called = true;
            "lazy context".to_string()
        });

        assert!(called);
        assert_eq!(error.get_context()[0], "lazy context");
    }

    #[test]
    fn test_error_display_message_only() {
        let error = LivedocError::message("test message");
        assert_eq!(error.to_string(), "test message");
    }

    #[test]
    fn test_error_display_with_multiple_contexts() {
        let error = LivedocError::message("root error")
            .context("first")
            .context("second")
            .context("third");
        assert_eq!(error.to_string(), "first: second: third: root error");
    }

    #[test]
    fn test_error_display_file_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "not found");
        let error = LivedocError::file("/tmp/test.md", io_err);
        let display = error.to_string();
        assert!(display.contains("/tmp/test.md"));
        assert!(display.contains("not found"));
    }

    #[test]
    fn test_error_source() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error = LivedocError::file("test.md", io_err);
        assert!(error.source().is_some());
        assert_eq!(error.root_cause().to_string(), "access denied");

        let error = LivedocError::message("test");
        assert!(error.source().is_none());
        assert_eq!(error.root_cause().to_string(), "test");
    }

    #[test]
    fn test_result_ext_chaining() {
        let result: LivedocResult<i32> = Err(Box::new(LivedocError::message("root")));
        let final_result = result
            .context("step 1")
            .context("step 2")
            .with_context(|| "step 3".to_string());
        let err = final_result.unwrap_err();
        assert_eq!(err.to_string(), "step 1: step 2: step 3: root");
    }

    #[test]
    fn test_result_ext_success_untouched() {
        let result: LivedocResult<i32> = Ok(42);
        assert_eq!(result.context("operation failed").unwrap(), 42);
    }

    #[test]
    fn test_err_and_bail_macros() {
        fn fails(id: &str) -> LivedocResult<()> {
            bail!("Unknown project '{}'", id);
        }
        let error = fails("docs").unwrap_err();
        assert_eq!(error.to_string(), "Unknown project 'docs'");

        let error = err!("value {}", 7);
        assert_eq!(error.to_string(), "value 7");
    }
}

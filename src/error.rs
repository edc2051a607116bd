//! Error types for the frame pipeline.

use std::fmt;
use std::sync::Arc;

/// The main error type for the frame pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// A processor failed with its own (business) error
    #[error(transparent)]
    Processor(ProcessorError),

    /// A processor panicked; the payload and the stack trace captured at the
    /// stage boundary are kept.
    #[error("panic: {message}")]
    Panic { message: String, stack: String },

    /// The cancellation token fired while the operation was waiting
    #[error("operation cancelled")]
    Cancelled,

    /// The other end of a frame queue is gone
    #[error("channel was closed unexpectedly")]
    ChannelClosed,

    /// An operation timed out
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// A stage was still running when the pipeline deadline elapsed
    #[error("stage abandoned after {after_ms}ms deadline")]
    Abandoned { after_ms: u64 },

    /// Configuration could not be loaded or parsed
    #[error("config error: {0}")]
    Config(String),

    /// A custom error with a message
    #[error("{0}")]
    Custom(String),
}

// Convenience constructors
impl Error {
    /// Wrap any error type as a processor error
    pub fn processor<E: std::error::Error + Send + Sync + 'static>(error: E) -> Self {
        Error::Processor(ProcessorError(Arc::new(error)))
    }

    /// Create a custom error with a message
    pub fn custom<S: Into<String>>(message: S) -> Self {
        Error::Custom(message.into())
    }

    /// Create a timeout error
    pub fn timeout(duration_ms: u64) -> Self {
        Error::Timeout { duration_ms }
    }

    /// Build a panic error from a payload returned by `catch_unwind`.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Error::Panic {
            message,
            stack: std::backtrace::Backtrace::force_capture().to_string(),
        }
    }

    /// True when this error was converted from a panic
    pub fn is_panic(&self) -> bool {
        matches!(self, Error::Panic { .. })
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for Error {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Error::ChannelClosed
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

/// A processor's own error, shared so that [`Error`] stays `Clone`.
///
/// Displays as the wrapped error, which is also its `source()`.
#[derive(Debug, Clone)]
pub struct ProcessorError(Arc<dyn std::error::Error + Send + Sync>);

impl ProcessorError {
    /// The wrapped error
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ProcessorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.0)
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, Error>;

/// A failure recorded for one stage of a run.
#[derive(Debug, Clone)]
pub struct StepError {
    /// Name of the processor that failed
    pub processor: String,
    /// Position of the processor in the pipeline
    pub stage: usize,
    /// What went wrong
    pub error: Error,
}

impl StepError {
    pub fn new(processor: impl Into<String>, stage: usize, error: Error) -> Self {
        Self {
            processor: processor.into(),
            stage,
            error,
        }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "processor=[{}], err=[{}]", self.processor, self.error)
    }
}

impl std::error::Error for StepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn step_error_renders_processor_and_cause() {
        let err = StepError::new("upper", 1, Error::custom("boom"));
        assert_eq!(err.to_string(), "processor=[upper], err=[boom]");
    }

    #[test]
    fn step_error_source_is_the_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = StepError::new("writer", 0, Error::processor(io));
        let source = err.source().expect("cause");
        assert_eq!(source.to_string(), "disk gone");
    }

    #[test]
    fn wrapped_cause_is_reachable_through_the_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "disk gone");
        let err = StepError::new("writer", 0, Error::processor(io));

        let mut link: Option<&(dyn std::error::Error + 'static)> = Some(&err);
        let mut found = None;
        while let Some(current) = link {
            if let Some(io) = current.downcast_ref::<std::io::Error>() {
                found = Some(io.kind());
                break;
            }
            link = current.source();
        }
        assert_eq!(found, Some(std::io::ErrorKind::NotFound));

        match &err.error {
            Error::Processor(cause) => assert!(cause.inner().is::<std::io::Error>()),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn panic_payloads_are_rendered_with_marker() {
        let err = Error::from_panic(Box::new("kaboom"));
        assert!(err.is_panic());
        assert_eq!(err.to_string(), "panic: kaboom");

        let err = Error::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "panic: owned");

        let err = Error::from_panic(Box::new(42u8));
        assert!(err.to_string().starts_with("panic:"));
    }
}

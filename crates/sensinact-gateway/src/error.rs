use std::borrow::Cow;

use sensinact::value::ValueError;

/// All possible error kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A handle has been used after the command that created it completed.
    InvalidHandle,
    /// A value does not match the requested or declared type.
    TypeMismatch,
    /// The operation is not supported by the resource kind.
    UnsupportedOperation,
    /// An argument is invalid.
    InvalidArgument,
    /// A model, provider, service or resource does not exist.
    NotFound,
    /// A model, provider, service or resource already exists.
    AlreadyExists,
    /// A metadata entry does not exist.
    MetadataNotFound,
    /// An external handler failed or is missing.
    Handler,
    /// A command has been cancelled before starting.
    Cancelled,
    /// The gateway is not running.
    Shutdown,
    /// The command queue is full.
    QueueFull,
    /// A command panicked.
    Panic,
    /// The gateway configuration is invalid.
    Configuration,
    /// The gateway thread could not be spawned.
    Thread,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::InvalidHandle => "Invalid Handle",
            Self::TypeMismatch => "Type Mismatch",
            Self::UnsupportedOperation => "Unsupported Operation",
            Self::InvalidArgument => "Invalid Argument",
            Self::NotFound => "Not Found",
            Self::AlreadyExists => "Already Exists",
            Self::MetadataNotFound => "Metadata Not Found",
            Self::Handler => "Handler",
            Self::Cancelled => "Cancelled",
            Self::Shutdown => "Shutdown",
            Self::QueueFull => "Queue Full",
            Self::Panic => "Panic",
            Self::Configuration => "Configuration",
            Self::Thread => "Thread",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description().fmt(f)
    }
}

/// A gateway error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    #[must_use]
    #[inline]
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Creates an [`Error`] raised by an external handler.
    #[must_use]
    #[inline]
    pub fn handler(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Handler, description)
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl std::error::Error for Error {}

impl From<ValueError> for Error {
    fn from(e: ValueError) -> Self {
        Self::new(ErrorKind::TypeMismatch, e.to_string())
    }
}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use sensinact::value::{DataType, ValueError};

    use super::{Error, ErrorKind};

    #[test]
    fn error_display() {
        let error = Error::new(ErrorKind::NotFound, "No model with name `foo`");
        assert_eq!(error.to_string(), "Not Found: No model with name `foo`");
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(error.description(), "No model with name `foo`");
    }

    #[test]
    fn value_error_conversion() {
        let error = Error::from(ValueError::new("i32", DataType::String));
        assert_eq!(
            error,
            Error::new(
                ErrorKind::TypeMismatch,
                "Expected a value of type `i32`, found `string`"
            )
        );
    }
}

//! Error types for value-to-XML conversion.

use std::fmt::{self, Display};
use std::io;

/// Result type alias for dict_xml operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for conversion failures.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    /// Path segments from the failing value up to the top level (innermost first).
    path: Vec<String>,
}

/// The kind of error that occurred.
#[derive(Debug)]
pub enum ErrorKind {
    /// An I/O error occurred while writing output.
    Io(io::Error),
    /// A value that has no XML representation.
    UnsupportedType {
        /// Diagnostic name of the offending type.
        type_name: String,
        /// Printable representation of the offending value.
        repr: String,
    },
    /// Nesting exceeded the configured depth limit.
    DepthLimitExceeded {
        /// The configured limit.
        limit: usize,
    },
    /// The id allocator could not find a free id.
    IdSpaceExhausted {
        /// Element name the id was requested for.
        prefix: String,
        /// Number of candidates tried.
        attempts: usize,
    },
    /// A byte-string key was not valid UTF-8.
    InvalidUtf8,
    /// Custom error message.
    Custom(String),
}

impl Error {
    /// Creates a new error with the given kind.
    #[inline]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            path: Vec::new(),
        }
    }

    /// Records that the error occurred inside the given map key or list index.
    ///
    /// Called while the error bubbles up, so segments are pushed innermost first.
    #[inline]
    pub fn within<S: Into<String>>(mut self, segment: S) -> Self {
        self.path.push(segment.into());
        self
    }

    /// Returns the error kind.
    #[inline]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns the location of the failing value, e.g. `person.grades[1]`.
    ///
    /// Empty when the failure is at the top level.
    pub fn path(&self) -> String {
        let mut out = String::new();
        for segment in self.path.iter().rev() {
            if !segment.starts_with('[') && !out.is_empty() {
                out.push('.');
            }
            out.push_str(segment);
        }
        out
    }

    /// Creates an unsupported type error.
    #[inline]
    pub fn unsupported_type<S: Into<String>, R: Into<String>>(type_name: S, repr: R) -> Self {
        Self::new(ErrorKind::UnsupportedType {
            type_name: type_name.into(),
            repr: repr.into(),
        })
    }

    /// Creates a depth limit error.
    #[inline]
    pub fn depth_limit(limit: usize) -> Self {
        Self::new(ErrorKind::DepthLimitExceeded { limit })
    }

    /// Creates an id exhaustion error.
    #[inline]
    pub fn id_space_exhausted<S: Into<String>>(prefix: S, attempts: usize) -> Self {
        Self::new(ErrorKind::IdSpaceExhausted {
            prefix: prefix.into(),
            attempts,
        })
    }

    /// Creates a custom error.
    #[inline]
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        Self::new(ErrorKind::Custom(msg.into()))
    }

    /// Returns true for failures caused by resource limits rather than by the input's types.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::DepthLimitExceeded { .. } | ErrorKind::IdSpaceExhausted { .. }
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(e) => write!(f, "I/O error: {}", e),
            ErrorKind::UnsupportedType { type_name, repr } => {
                write!(f, "unsupported data type: {} ({})", repr, type_name)
            }
            ErrorKind::DepthLimitExceeded { limit } => {
                write!(f, "nesting depth exceeds limit of {}", limit)
            }
            ErrorKind::IdSpaceExhausted { prefix, attempts } => write!(
                f,
                "no unique id found for <{}> after {} attempts",
                prefix, attempts
            ),
            ErrorKind::InvalidUtf8 => write!(f, "invalid UTF-8 in key"),
            ErrorKind::Custom(msg) => write!(f, "{}", msg),
        }?;

        if !self.path.is_empty() {
            write!(f, " at {}", self.path())?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::new(ErrorKind::Io(e))
    }
}

impl serde::ser::Error for Error {
    fn custom<T: Display>(msg: T) -> Self {
        Self::custom(msg.to_string())
    }
}

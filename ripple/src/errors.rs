use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use parking_lot::RwLock;
use std::result::Result;
use std::sync::Arc;

/// Error kinds for Ripple operations.
///
/// Each kind describes one category of failure so callers can react to it
/// without parsing messages.
///
/// # Examples
///
/// ```rust
/// use ripple::errors::{ErrorKind, RippleError, RippleResult};
///
/// fn example() -> RippleResult<()> {
///     Err(RippleError::new("id already present", ErrorKind::DuplicateId))
/// }
/// assert_eq!(example().unwrap_err().kind(), &ErrorKind::DuplicateId);
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // Selector Errors
    /// Unsupported or malformed selector operator
    SelectorError,

    // Modifier Errors
    /// Operator applied to a value of the wrong type, e.g. `$inc` on a string
    TypeMismatch,

    // Identity Errors
    /// Insert of an id that is already present in the collection
    DuplicateId,
    /// The document id is not a string
    InvalidId,

    // Operation Errors
    /// The operation is not valid in the current context
    InvalidOperation,
    /// The collection has been closed
    CollectionClosed,

    // Indexing Errors
    /// Generic indexing error
    IndexingError,
    /// Index does not exist
    IndexNotFound,
    /// Index already exists on the field
    IndexAlreadyExists,

    // Persistence Errors
    /// Failure reported by a persistence adapter; carries the adapter name
    AdapterError(String),

    // Event Errors
    /// Error in event processing
    EventError,

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::SelectorError => write!(f, "Selector error"),
            ErrorKind::TypeMismatch => write!(f, "Type mismatch"),
            ErrorKind::DuplicateId => write!(f, "Duplicate id"),
            ErrorKind::InvalidId => write!(f, "Invalid id"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::CollectionClosed => write!(f, "Collection closed"),
            ErrorKind::IndexingError => write!(f, "Indexing error"),
            ErrorKind::IndexNotFound => write!(f, "Index not found"),
            ErrorKind::IndexAlreadyExists => write!(f, "Index already exists"),
            ErrorKind::AdapterError(name) => write!(f, "Adapter error ({})", name),
            ErrorKind::EventError => write!(f, "Event error"),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Error type for every fallible Ripple operation.
///
/// A `RippleError` carries a message, an [ErrorKind], an optional cause and the
/// backtrace captured where it was created.
///
/// ```rust
/// use ripple::errors::{ErrorKind, RippleError};
///
/// let cause = RippleError::new("disk unavailable", ErrorKind::InternalError);
/// let err = RippleError::new_with_cause(
///     "save failed",
///     ErrorKind::AdapterError("memory".to_string()),
///     cause,
/// );
/// assert!(err.cause().is_some());
/// ```
#[derive(Clone)]
pub struct RippleError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<RippleError>>,
    backtrace: Arc<RwLock<Backtrace>>,
}

impl RippleError {
    /// Creates a new error with the given message and kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        RippleError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: Arc::new(RwLock::new(Backtrace::new_unresolved())),
        }
    }

    /// Creates a new error wrapping `cause`.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: RippleError) -> Self {
        RippleError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: Arc::new(RwLock::new(Backtrace::new_unresolved())),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&RippleError> {
        self.cause.as_deref()
    }
}

impl Display for RippleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for RippleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {}\nCaused by: {:?}", self.error_kind, self.message, cause),
            None => {
                let mut backtrace = self.backtrace.read().clone();
                backtrace.resolve();
                write!(f, "{}: {}\n{:?}", self.error_kind, self.message, backtrace)
            }
        }
    }
}

impl Error for RippleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// Shorthand for `Result<T, RippleError>`.
pub type RippleResult<T> = Result<T, RippleError>;

impl From<std::io::Error> for RippleError {
    fn from(err: std::io::Error) -> Self {
        RippleError::new(&format!("IO error: {}", err), ErrorKind::InternalError)
    }
}

impl From<regex::Error> for RippleError {
    fn from(err: regex::Error) -> Self {
        RippleError::new(&format!("Invalid regular expression: {}", err), ErrorKind::SelectorError)
    }
}

impl From<String> for RippleError {
    fn from(msg: String) -> Self {
        RippleError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for RippleError {
    fn from(msg: &str) -> Self {
        RippleError::new(msg, ErrorKind::InternalError)
    }
}

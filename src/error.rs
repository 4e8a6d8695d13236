//! Error types for cost and inventory aggregation

use std::fmt;

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    /// Upstream data violated the provider contract (unparsable window,
    /// missing required field). Fatal to the fold of that one source.
    #[error("Malformed upstream data: {0}")]
    MalformedData(String),

    /// A cost source or scan operation failed
    ///
    /// Wraps the collaborator error with the name of the source or
    /// operation that produced it.
    #[error("{source_name}: {error}")]
    Source {
        /// Name of the cost source or scan operation
        source_name: String,
        /// Underlying failure reported by the collaborator
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The caller cancelled the operation before it finished
    #[error("{operation}: operation cancelled")]
    Cancelled {
        /// Name of the source or operation that observed cancellation
        operation: String,
    },

    /// A worker task panicked or was aborted by the runtime
    #[error("{operation}: task failed: {message}")]
    TaskFailed {
        /// Name of the source or operation the task was running
        operation: String,
        /// Join error rendered by the runtime
        message: String,
    },

    /// No factory is registered for this provider type
    #[error("Unsupported provider type: {0}")]
    UnsupportedProvider(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Several failures gathered from concurrent workers
    #[error("{0}")]
    Joined(JoinedError),
}

impl Error {
    /// Wrap a collaborator failure with the name of its source
    pub fn wrap(
        source_name: impl Into<String>,
        error: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::Source {
            source_name: source_name.into(),
            error: error.into(),
        }
    }

    /// Create a cancellation error for the named operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Error::Cancelled {
            operation: operation.into(),
        }
    }

    /// Attach a source name unless the error already carries it
    ///
    /// Cancellations and task failures already name their operation and are
    /// returned unchanged.
    pub fn with_source(self, source_name: &str) -> Self {
        match self {
            Error::Cancelled { .. } | Error::TaskFailed { .. } => self,
            Error::Source {
                source_name: ref existing,
                ..
            } if existing == source_name => self,
            other => Error::wrap(source_name, other),
        }
    }

    /// Whether this error (or every member of a joined error) is a cancellation
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled { .. } => true,
            Error::Joined(joined) => {
                !joined.is_empty() && joined.errors().iter().all(Error::is_cancelled)
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Ordered set of errors collected from concurrent workers
///
/// Members are kept in completion order. Nothing is replaced or dropped:
/// every failure that reached the gather point is present here.
#[derive(Debug, Default)]
pub struct JoinedError {
    errors: Vec<Error>,
}

impl JoinedError {
    /// Create an empty set
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Join a list of errors, returning `None` when the list is empty
    pub fn join(errors: Vec<Error>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    /// Add an error to the set
    pub fn push(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// The unwrapped members
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consume the set and return its members
    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }
}

impl fmt::Display for JoinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for JoinedError {}

impl From<JoinedError> for Error {
    fn from(e: JoinedError) -> Self {
        Error::Joined(e)
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

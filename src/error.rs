//! Error types for the ghostkit library.
//!
//! ## Key Components
//!
//! - [`ConfigError`]: Returned by fallible constructors when cache or ghost
//!   parameters are invalid (e.g. zero tick, unaligned sampled sizes).
//! - [`TraceError`]: Returned by the CSV trace readers in [`crate::trace`]
//!   when a file cannot be read or a row cannot be parsed.
//!
//! Contract violations on otherwise-infallible operations (releasing an
//! unpinned handle, querying an unaligned cache size) panic instead; see the
//! panicking constructors' docs.
//!
//! ## Example Usage
//!
//! ```
//! use ghostkit::error::ConfigError;
//! use ghostkit::ghost::GhostCache;
//!
//! // Fallible constructor for user-configurable parameters
//! let ghost: Result<GhostCache, ConfigError> = GhostCache::try_new(1, 3, 6);
//! assert!(ghost.is_ok());
//!
//! // A zero tick is caught without panicking
//! let bad: Result<GhostCache, ConfigError> = GhostCache::try_new(0, 3, 6);
//! assert!(bad.is_err());
//! ```

use std::fmt;
use std::io;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache configuration parameters are invalid.
///
/// Produced by fallible constructors such as
/// [`GhostCache::try_new`](crate::ghost::GhostCache::try_new) and
/// [`SampledGhostCache::try_new`](crate::ghost::SampledGhostCache::try_new).
/// Carries a human-readable description of which parameter failed validation.
///
/// # Example
///
/// ```
/// use ghostkit::ghost::GhostCache;
///
/// // min_size must exceed 1
/// let err = GhostCache::<ghostkit::hash::GHash>::try_new(1, 1, 4).unwrap_err();
/// assert!(err.to_string().contains("min_size"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// TraceError
// ---------------------------------------------------------------------------

/// Error returned when a CSV trace or cache-image file cannot be ingested.
///
/// `Io` wraps the underlying filesystem error; `Parse` carries the 1-based
/// line number and a description of the malformed field.
#[derive(Debug)]
pub enum TraceError {
    /// The file could not be opened or read.
    Io(io::Error),
    /// A row could not be parsed.
    Parse {
        /// 1-based line number of the offending row.
        line: usize,
        /// Description of the malformed field.
        msg: String,
    },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Io(err) => write!(f, "trace i/o error: {err}"),
            TraceError::Parse { line, msg } => write!(f, "trace parse error at line {line}: {msg}"),
        }
    }
}

impl std::error::Error for TraceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TraceError::Io(err) => Some(err),
            TraceError::Parse { .. } => None,
        }
    }
}

impl From<io::Error> for TraceError {
    fn from(err: io::Error) -> Self {
        TraceError::Io(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

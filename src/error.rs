//! Error types for the karma allocator.
//!
//! Provides a unified error type covering every fallible call on the public
//! API surface. All errors are surfaced at the call site; nothing is
//! recovered internally. Violations of internal allocation invariants are
//! bugs, not user errors, and panic instead.
//!
//! # Examples
//!
//! ```rust
//! use karma_alloc::{Error, Result};
//!
//! fn check_id(id: u32) -> Result<()> {
//!     if id == karma_alloc::DUMMY_ID {
//!         return Err(Error::invalid("reserved tenant id"));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;

/// Main error type for allocator operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Argument outside its domain, or misuse of a reserved id.
    Invalid(String),

    /// Unknown tenant id.
    NotFound(String),

    /// Duplicate tenant id on registration.
    AlreadyExists(String),
}

impl Error {
    /// Create an invalid-argument error.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use karma_alloc::Error;
    ///
    /// let err = Error::invalid("alpha must be between 0 and 1");
    /// assert!(matches!(err, Error::Invalid(_)));
    /// ```
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an already-exists error.
    pub fn already_exists(msg: impl Into<String>) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Get error code for logging and assertions.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use karma_alloc::Error;
    ///
    /// assert_eq!(Error::not_found("tenant 7").code(), "NOT_FOUND");
    /// ```
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "INVALID",
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "ALREADY_EXISTS",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid argument: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::AlreadyExists(msg) => write!(f, "already exists: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Result type alias for allocator operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the carve-core library.
//!
//! This module provides error handling using the `thiserror` crate, with
//! detailed variants for the different ways a schema definition can be wrong.
//!
//! Note that running out of input bytes is *not* an error: truncation is
//! tracked through the sticky `exhausted`/`truncated`/`corrupted` flags on
//! the cursor and the parsed nodes. The variants here all describe mistakes
//! in the schema itself (or in how the caller wired structures together),
//! which abort the parse with a descriptive message.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for carve operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all carve operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Two fields in one schema share a name
    #[error("duplicate field name '{name}' in schema '{schema}'")]
    DuplicateField {
        /// The repeated field name
        name: String,
        /// The schema declaring it twice
        schema: String,
    },

    /// A size rule or driver references a field that does not exist or has
    /// not been parsed yet (references may only point backwards in schema
    /// order)
    #[error("unknown field '{name}' referenced by '{referrer}'")]
    UnknownField {
        /// The missing field name
        name: String,
        /// The field whose rule made the reference
        referrer: String,
    },

    /// A referenced attribute exists but cannot be read as an integer
    #[error("field '{name}' cannot be converted to an integer")]
    NotNumeric {
        /// The non-numeric field name
        name: String,
    },

    /// A table's driver attribute is not a list or table
    #[error("driver '{name}' is not a record list or table")]
    InvalidDriver {
        /// The attribute named as driver
        name: String,
    },

    /// A value adopted as an anchor offset cannot yield an integer
    #[error("invalid offset source: {details}")]
    InvalidOffsetSource {
        /// Description of the rejected source
        details: String,
    },

    /// A size formula failed to parse or evaluate
    #[error("formula '{expr}' is invalid: {details}")]
    Formula {
        /// The offending formula text
        expr: String,
        /// What went wrong (syntax, division by zero, ...)
        details: String,
    },

    /// Nesting exceeded the configured recursion ceiling
    #[error("record nesting exceeded the configured limit of {limit}")]
    RecursionLimit {
        /// The configured ceiling
        limit: usize,
    },

    /// A list or table would hold more elements than the configured ceiling
    #[error("element count {count} exceeds the configured limit of {limit}")]
    ElementLimit {
        /// The declared element count
        count: usize,
        /// The configured ceiling
        limit: usize,
    },
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new duplicate field error
    pub fn duplicate_field(name: impl Into<String>, schema: impl Into<String>) -> Self {
        Self::DuplicateField {
            name: name.into(),
            schema: schema.into(),
        }
    }

    /// Creates a new unknown field reference error
    pub fn unknown_field(name: impl Into<String>, referrer: impl Into<String>) -> Self {
        Self::UnknownField {
            name: name.into(),
            referrer: referrer.into(),
        }
    }

    /// Creates a new non-numeric field error
    pub fn not_numeric(name: impl Into<String>) -> Self {
        Self::NotNumeric { name: name.into() }
    }

    /// Creates a new invalid driver error
    pub fn invalid_driver(name: impl Into<String>) -> Self {
        Self::InvalidDriver { name: name.into() }
    }

    /// Creates a new invalid offset source error
    pub fn invalid_offset_source(details: impl Into<String>) -> Self {
        Self::InvalidOffsetSource {
            details: details.into(),
        }
    }

    /// Creates a new formula error
    pub fn formula(expr: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Formula {
            expr: expr.into(),
            details: details.into(),
        }
    }

    /// Returns true if this error indicates a mistake in the schema
    /// definition itself, as opposed to a resource ceiling or I/O failure
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Self::DuplicateField { .. }
                | Self::UnknownField { .. }
                | Self::NotNumeric { .. }
                | Self::InvalidDriver { .. }
                | Self::InvalidOffsetSource { .. }
                | Self::Formula { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unknown_field("count", "items");
        assert!(err.to_string().contains("unknown field"));
        assert!(err.to_string().contains("count"));
        assert!(err.to_string().contains("items"));
    }

    #[test]
    fn test_is_schema_error() {
        assert!(Error::invalid_driver("header").is_schema_error());
        assert!(Error::formula("a +", "unexpected end").is_schema_error());
        assert!(!Error::RecursionLimit { limit: 64 }.is_schema_error());
    }
}

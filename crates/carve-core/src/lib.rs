//! # carve-core
//!
//! A library for declarative, schema-driven parsing of binary structures.
//!
//! Instead of hand-writing a parser per file format, you declare a
//! [`Schema`] (an ordered list of field descriptors) and the engine walks
//! a byte buffer producing a tree of typed values, tracking truncation as
//! it goes, and able to re-serialize the tree back to bytes.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`cursor`]: offset-tracked reads over the shared byte buffer
//! - [`value`]: fixed-size, endianness-aware leaf values and shared cells
//! - [`schema`]: field descriptors, size rules and schema validation
//! - [`record`]: the recursive parser plus lists and offset tables
//! - [`error`]: error types and handling
//!
//! Truncated input is never an error: the affected nodes latch a
//! `corrupted` flag, missing leaf bytes become zero padding, and parsing
//! stops as early as structurally possible. The [`Error`] type is reserved
//! for mistakes in the schema definition itself.
//!
//! ## Example
//!
//! ```
//! use carve_core::{ByteCursor, Endian, FieldDef, OffsetSource, Record, Schema};
//!
//! let item = Schema::new(
//!     "Item",
//!     vec![
//!         FieldDef::value("id", 4, Endian::Little),
//!         FieldDef::value("value", 4, Endian::Little),
//!     ],
//! )?;
//! let header = Schema::new(
//!     "Header",
//!     vec![
//!         FieldDef::value("magic", 4, Endian::Big),
//!         FieldDef::value("count", 4, Endian::Little),
//!         FieldDef::list("items", "count", item),
//!     ],
//! )?;
//!
//! let data = vec![
//!     0x4d, 0x5a, 0x00, 0x00, // magic
//!     0x01, 0x00, 0x00, 0x00, // count = 1
//!     0x07, 0x00, 0x00, 0x00, // items[0].id
//!     0x2a, 0x00, 0x00, 0x00, // items[0].value
//! ];
//! let mut cursor = ByteCursor::new(data.clone());
//! let record = Record::parse(&mut cursor, &header, OffsetSource::Here)?;
//!
//! let items = record.attr("items").unwrap().as_list().unwrap();
//! assert_eq!(items.get(0).unwrap().int("value"), Some(42));
//! assert!(!record.is_corrupted());
//! assert_eq!(record.to_bytes(), data);
//! # Ok::<(), carve_core::Error>(())
//! ```
//!
//! ## Extensibility
//!
//! - [`SizeRule::Computed`] plugs arbitrary size logic into a field
//! - [`Driver`] lets custom element sources drive a [`RecordTable`]

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

pub mod cursor;
pub mod error;
pub mod record;
pub mod schema;
pub mod value;

// Re-export primary types for convenience
pub use cursor::ByteCursor;
pub use error::{Error, Result};
pub use record::{
    Attribute, CountSource, Driver, OffsetSource, ParseConfig, Record, RecordList, RecordTable,
    parse_file, parse_file_with_config,
};
pub use schema::{FieldDef, FieldKind, Schema, SizeFn, SizeRule, TableSpec};
pub use value::{BinValue, Endian, ValueCell};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

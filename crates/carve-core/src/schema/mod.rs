//! Schema declarations: ordered field descriptors interpreted by the engine.
//!
//! A [`Schema`] is plain data (a named, ordered list of [`FieldDef`]s), and
//! one generic engine ([`Record`](crate::Record)) interprets it against a
//! byte buffer. There is no per-format code: declaring a new binary layout
//! means building a new `Schema` value.
//!
//! Each field couples a [`SizeRule`] (how many bytes the field covers, or
//! how many elements a list holds) with a [`FieldKind`] (what to build from
//! those bytes). Size rules that reference sibling fields may only point
//! backwards in schema order, which [`Schema::new`] enforces up front.
//!
//! ## Example
//!
//! ```
//! use carve_core::{Endian, FieldDef, Schema};
//!
//! let item = Schema::new(
//!     "Item",
//!     vec![
//!         FieldDef::value("id", 4, Endian::Little),
//!         FieldDef::value("value", 4, Endian::Little),
//!     ],
//! )?;
//!
//! let header = Schema::new(
//!     "Header",
//!     vec![
//!         FieldDef::value("magic", 4, Endian::Big),
//!         FieldDef::value("count", 4, Endian::Little),
//!         FieldDef::list("items", "count", item),
//!     ],
//! )?;
//! # Ok::<(), carve_core::Error>(())
//! ```

pub(crate) mod expr;

use std::fmt;
use std::rc::Rc;

use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::record::Record;
use crate::value::{Endian, ValueCell};

use expr::Formula;

/// Callback form of a size rule: invoked with the record parsed so far and
/// the shared cursor, returns the resolved size
pub type SizeFn = Rc<dyn Fn(&Record, &ByteCursor) -> u32>;

/// How the byte size (or element count) of a field is determined.
///
/// Resolution happens per field, strictly in schema order, so rules that
/// look at sibling fields can only see siblings that parsed earlier.
#[derive(Clone)]
pub enum SizeRule {
    /// A constant size known when the schema is written
    Const(u32),
    /// The current integer value of a shared cell, read at parse time
    Cell(ValueCell),
    /// A callback over the record parsed so far and the cursor
    Computed(SizeFn),
    /// A sibling field name, or a formula over sibling names and literals
    Expr(String),
}

impl SizeRule {
    /// Wraps a callback into a size rule
    pub fn computed(f: impl Fn(&Record, &ByteCursor) -> u32 + 'static) -> Self {
        Self::Computed(Rc::new(f))
    }
}

impl fmt::Debug for SizeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(size) => write!(f, "Const({size})"),
            Self::Cell(cell) => write!(f, "Cell({})", cell.borrow().to_int()),
            Self::Computed(_) => write!(f, "Computed(..)"),
            Self::Expr(text) => write!(f, "Expr({text:?})"),
        }
    }
}

impl From<u32> for SizeRule {
    fn from(size: u32) -> Self {
        Self::Const(size)
    }
}

impl From<usize> for SizeRule {
    fn from(size: usize) -> Self {
        Self::Const(size as u32)
    }
}

impl From<i32> for SizeRule {
    fn from(size: i32) -> Self {
        Self::Const(size as u32)
    }
}

impl From<&str> for SizeRule {
    fn from(expr: &str) -> Self {
        Self::Expr(expr.to_string())
    }
}

impl From<String> for SizeRule {
    fn from(expr: String) -> Self {
        Self::Expr(expr)
    }
}

impl From<ValueCell> for SizeRule {
    fn from(cell: ValueCell) -> Self {
        Self::Cell(cell)
    }
}

/// What a field parses into
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// A leaf byte value with the given endianness; the size rule gives its
    /// byte length
    Value(Endian),
    /// A nested record with its own schema; a resolved size of zero marks
    /// the substructure as absent
    Record(Schema),
    /// A contiguous homogeneous run of records; the size rule gives the
    /// element count
    List(Schema),
    /// Records located indirectly through offsets read from an
    /// already-parsed sibling list or table
    Table(TableSpec),
}

/// Parameters of a table field
#[derive(Debug, Clone)]
pub struct TableSpec {
    /// Schema of each table element
    pub element: Schema,
    /// Name of the sibling list/table attribute that drives this table
    pub driver: String,
    /// Name of the offset-bearing attribute on each driver element
    pub offset_field: String,
    /// Driver offsets equal to this sentinel produce no table entry
    pub ignore: Option<u32>,
}

/// One schema entry: a name, a size rule and a field kind
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Field name, unique within its schema
    pub name: String,
    /// How the field's byte size (or element count) is resolved
    pub size: SizeRule,
    /// What the field parses into
    pub kind: FieldKind,
}

impl FieldDef {
    /// Creates a field from its parts
    pub fn new(name: impl Into<String>, size: impl Into<SizeRule>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            size: size.into(),
            kind,
        }
    }

    /// Creates a leaf value field
    pub fn value(name: impl Into<String>, size: impl Into<SizeRule>, endian: Endian) -> Self {
        Self::new(name, size, FieldKind::Value(endian))
    }

    /// Creates a nested record field; a resolved size of zero makes the
    /// substructure absent
    pub fn record(name: impl Into<String>, size: impl Into<SizeRule>, element: Schema) -> Self {
        Self::new(name, size, FieldKind::Record(element))
    }

    /// Creates a list field; the size rule resolves to the element count
    pub fn list(name: impl Into<String>, count: impl Into<SizeRule>, element: Schema) -> Self {
        Self::new(name, count, FieldKind::List(element))
    }

    /// Creates a table field driven by the sibling attribute `driver`,
    /// anchoring one element per driver entry at that entry's
    /// `offset_field` value
    pub fn table(
        name: impl Into<String>,
        element: Schema,
        driver: impl Into<String>,
        offset_field: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            0u32,
            FieldKind::Table(TableSpec {
                element,
                driver: driver.into(),
                offset_field: offset_field.into(),
                ignore: None,
            }),
        )
    }

    /// Sets the ignore sentinel of a table field: driver entries whose
    /// offset equals `sentinel` are skipped. No effect on other kinds.
    pub fn ignore_offset(mut self, sentinel: u32) -> Self {
        if let FieldKind::Table(spec) = &mut self.kind {
            spec.ignore = Some(sentinel);
        }
        self
    }
}

/// A named, validated, ordered list of field descriptors.
///
/// Construction checks everything that can be checked without data:
/// duplicate field names, formula syntax, references to siblings that do
/// not exist or appear later in the schema, and table driver wiring.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<FieldDef>,
}

impl Schema {
    /// Builds a schema, validating the field list
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Result<Self> {
        let name = name.into();

        for (index, field) in fields.iter().enumerate() {
            let earlier = &fields[..index];

            if earlier.iter().any(|f| f.name == field.name) {
                return Err(Error::duplicate_field(&field.name, &name));
            }

            if let SizeRule::Expr(text) = &field.size {
                // An exact sibling-name match short-circuits formula parsing,
                // mirroring the resolution precedence at parse time
                if !earlier.iter().any(|f| f.name == *text) {
                    let formula = Formula::parse(text)?;
                    for referenced in formula.names() {
                        if !earlier.iter().any(|f| f.name == referenced) {
                            return Err(Error::unknown_field(referenced, &field.name));
                        }
                    }
                }
            }

            if let FieldKind::Table(spec) = &field.kind {
                let driver = earlier
                    .iter()
                    .find(|f| f.name == spec.driver)
                    .ok_or_else(|| Error::unknown_field(&spec.driver, &field.name))?;

                let element = match &driver.kind {
                    FieldKind::List(element) => element,
                    FieldKind::Table(driver_spec) => &driver_spec.element,
                    _ => return Err(Error::invalid_driver(&spec.driver)),
                };

                if !element.fields.iter().any(|f| f.name == spec.offset_field) {
                    return Err(Error::unknown_field(&spec.offset_field, &field.name));
                }
            }
        }

        Ok(Self { name, fields })
    }

    /// Returns the schema name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fields in definition order
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema declares no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str) -> FieldDef {
        FieldDef::value(name, 4, Endian::Little)
    }

    #[test]
    fn test_valid_schema() {
        let schema = Schema::new("Header", vec![leaf("magic"), leaf("count")]).unwrap();
        assert_eq!(schema.name(), "Header");
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let err = Schema::new("S", vec![leaf("a"), leaf("a")]).unwrap_err();
        assert!(matches!(err, Error::DuplicateField { .. }));
    }

    #[test]
    fn test_backward_reference_allowed() {
        let schema = Schema::new(
            "S",
            vec![leaf("count"), FieldDef::value("body", "count * 2", Endian::Little)],
        );
        assert!(schema.is_ok());
    }

    #[test]
    fn test_forward_reference_rejected() {
        let err = Schema::new(
            "S",
            vec![FieldDef::value("body", "count", Endian::Little), leaf("count")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
    }

    #[test]
    fn test_bad_formula_rejected() {
        let err = Schema::new(
            "S",
            vec![leaf("a"), FieldDef::value("b", "a +", Endian::Little)],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Formula { .. }));
    }

    #[test]
    fn test_name_with_exact_match_skips_formula() {
        // A sibling name that is not a valid formula still resolves by the
        // exact-match rule
        let schema = Schema::new(
            "S",
            vec![leaf("strange name"), FieldDef::value("b", "strange name", Endian::Little)],
        );
        assert!(schema.is_ok());
    }

    #[test]
    fn test_table_driver_validation() {
        let element = Schema::new("Elem", vec![leaf("off")]).unwrap();
        let entry = Schema::new("Entry", vec![leaf("x")]).unwrap();

        // Driver must exist
        let err = Schema::new(
            "S",
            vec![FieldDef::table("t", entry.clone(), "missing", "off")],
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));

        // Driver must be a list or table
        let err = Schema::new(
            "S",
            vec![
                leaf("plain"),
                FieldDef::table("t", entry.clone(), "plain", "off"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidDriver { .. }));

        // Offset field must exist on the driver's element schema
        let err = Schema::new(
            "S",
            vec![
                FieldDef::list("items", 2u32, element.clone()),
                FieldDef::table("t", entry.clone(), "items", "nope"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));

        let ok = Schema::new(
            "S",
            vec![
                FieldDef::list("items", 2u32, element),
                FieldDef::table("t", entry, "items", "off").ignore_offset(0),
            ],
        );
        assert!(ok.is_ok());
    }
}

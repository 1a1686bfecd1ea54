//! Schema-driven record parsing.
//!
//! [`Record`] is the recursive interpreter at the center of the engine: it
//! resolves its anchor offset, seeks the shared [`ByteCursor`] there, and
//! processes its schema's fields strictly in definition order, building one
//! [`Attribute`] per field. Child records, lists and tables parse from the
//! same cursor, so a single under-delivering read anywhere in the subtree
//! is observed by every node that touches the cursor afterwards. That is
//! the whole corruption-propagation mechanism.
//!
//! Anchor offsets are [`ValueCell`]s and may be shared: a table element
//! adopts the very cell it was located through, so patching that cell later
//! (through any holder) relocates the element for a subsequent re-parse or
//! re-serialization. Offsets created by the engine itself are owned
//! four-byte little-endian cells.
//!
//! ## Example
//!
//! ```
//! use carve_core::{ByteCursor, Endian, FieldDef, OffsetSource, Record, Schema};
//!
//! let schema = Schema::new(
//!     "Header",
//!     vec![
//!         FieldDef::value("magic", 4, Endian::Big),
//!         FieldDef::value("count", 4, Endian::Little),
//!     ],
//! )?;
//!
//! let mut cursor = ByteCursor::new(vec![0x4d, 0x5a, 0, 0, 2, 0, 0, 0]);
//! let record = Record::parse(&mut cursor, &schema, OffsetSource::Here)?;
//!
//! assert_eq!(record.int("count"), Some(2));
//! assert!(!record.is_corrupted());
//! assert_eq!(record.to_bytes(), vec![0x4d, 0x5a, 0, 0, 2, 0, 0, 0]);
//! # Ok::<(), carve_core::Error>(())
//! ```

mod list;
mod table;

pub use list::{CountSource, RecordList};
pub use table::{Driver, RecordTable};

use std::path::Path;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::schema::expr::Formula;
use crate::schema::{FieldKind, Schema, SizeRule};
use crate::value::{BinValue, Endian, ValueCell};

/// Ceilings applied while parsing, in the spirit of defensive limits: a
/// pathological schema fails fast instead of hanging.
#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Maximum record nesting depth
    pub max_depth: usize,
    /// Maximum number of elements a single list or table may declare
    pub max_elements: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_elements: 1 << 20,
        }
    }
}

impl ParseConfig {
    /// Creates a new config with default ceilings
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum record nesting depth
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the maximum element count for lists and tables
    pub fn max_elements(mut self, count: usize) -> Self {
        self.max_elements = count;
        self
    }
}

/// Where a record (or list) is anchored in the buffer
#[derive(Debug, Clone, Default)]
pub enum OffsetSource {
    /// The cursor's current offset at parse time
    #[default]
    Here,
    /// An absolute offset, wrapped into a new owned four-byte cell
    At(u32),
    /// An existing cell, adopted by reference: later mutation through any
    /// holder relocates every structure anchored to it
    Cell(ValueCell),
}

impl OffsetSource {
    /// Resolves this source into the anchor cell for a parse starting now
    pub(crate) fn resolve(self, cursor: &ByteCursor) -> ValueCell {
        match self {
            Self::Here => BinValue::from_int(4, Endian::Little, cursor.offset() as u32).shared(),
            Self::At(offset) => BinValue::from_int(4, Endian::Little, offset).shared(),
            Self::Cell(cell) => cell,
        }
    }
}

impl From<u32> for OffsetSource {
    fn from(offset: u32) -> Self {
        Self::At(offset)
    }
}

impl From<usize> for OffsetSource {
    fn from(offset: usize) -> Self {
        Self::At(offset as u32)
    }
}

impl From<ValueCell> for OffsetSource {
    fn from(cell: ValueCell) -> Self {
        Self::Cell(cell)
    }
}

impl From<&ValueCell> for OffsetSource {
    fn from(cell: &ValueCell) -> Self {
        Self::Cell(Rc::clone(cell))
    }
}

impl TryFrom<&Record> for OffsetSource {
    type Error = Error;

    /// Pointer-chasing through a non-leaf value: the record's leading
    /// attribute must be a leaf value, and its cell is adopted by reference
    fn try_from(record: &Record) -> Result<Self> {
        record.leading_cell().map(Self::Cell)
    }
}

/// One parsed attribute of a record
#[derive(Debug, Clone)]
pub enum Attribute {
    /// A leaf byte value (shared cell, so it can anchor other structures)
    Value(ValueCell),
    /// A nested record
    Record(Record),
    /// A contiguous list of records
    List(RecordList),
    /// An offset-indirected table of records
    Table(RecordTable),
    /// An optional substructure that resolved to size zero, or a child not
    /// attempted because the cursor was already exhausted
    Absent,
}

impl Attribute {
    /// Returns the leaf value cell, if this attribute is one
    pub fn as_value(&self) -> Option<&ValueCell> {
        match self {
            Self::Value(cell) => Some(cell),
            _ => None,
        }
    }

    /// Returns the nested record, if this attribute is one
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Returns the list, if this attribute is one
    pub fn as_list(&self) -> Option<&RecordList> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    /// Returns the table, if this attribute is one
    pub fn as_table(&self) -> Option<&RecordTable> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Returns true for absent substructures
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Returns true if this attribute (or any node under it) is corrupted
    pub fn is_corrupted(&self) -> bool {
        match self {
            Self::Value(cell) => cell.borrow().is_truncated(),
            Self::Record(record) => record.is_corrupted(),
            Self::List(list) => list.is_corrupted(),
            Self::Table(table) => table.is_corrupted(),
            Self::Absent => false,
        }
    }

    /// Serializes this attribute's bytes in parse order
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Value(cell) => cell.borrow().as_bytes().to_vec(),
            Self::Record(record) => record.to_bytes(),
            Self::List(list) => list.to_bytes(),
            Self::Table(table) => table.to_bytes(),
            Self::Absent => Vec::new(),
        }
    }

    /// Adopts this attribute as an anchor cell: leaf values directly,
    /// records through their leading leaf value
    pub fn offset_cell(&self) -> Result<ValueCell> {
        match self {
            Self::Value(cell) => Ok(Rc::clone(cell)),
            Self::Record(record) => record.leading_cell(),
            Self::List(_) => Err(Error::invalid_offset_source("a list cannot be an offset")),
            Self::Table(_) => Err(Error::invalid_offset_source("a table cannot be an offset")),
            Self::Absent => Err(Error::invalid_offset_source(
                "an absent attribute cannot be an offset",
            )),
        }
    }
}

/// A parsed record: named attributes in schema order plus a corruption flag.
///
/// Records parse eagerly and completely at construction. The attribute set
/// is fixed afterwards, but individual leaf values remain mutable through
/// their shared cells (e.g. to patch an offset before re-serializing).
#[derive(Debug, Clone)]
pub struct Record {
    name: String,
    offset: ValueCell,
    attrs: Vec<(String, Attribute)>,
    corrupted: bool,
}

impl Record {
    /// Parses one record from `cursor` according to `schema`, anchored per
    /// `offset`, with default ceilings
    pub fn parse(
        cursor: &mut ByteCursor,
        schema: &Schema,
        offset: impl Into<OffsetSource>,
    ) -> Result<Self> {
        Self::parse_with(cursor, schema, offset, &ParseConfig::default())
    }

    /// Parses one record with explicit ceilings
    pub fn parse_with(
        cursor: &mut ByteCursor,
        schema: &Schema,
        offset: impl Into<OffsetSource>,
        config: &ParseConfig,
    ) -> Result<Self> {
        debug!(
            "Parsing record '{}' ({} fields) from {} byte buffer",
            schema.name(),
            schema.len(),
            cursor.len()
        );
        Self::parse_at(cursor, schema, offset.into(), config, 0)
    }

    pub(crate) fn parse_at(
        cursor: &mut ByteCursor,
        schema: &Schema,
        offset: OffsetSource,
        config: &ParseConfig,
        depth: usize,
    ) -> Result<Self> {
        if depth > config.max_depth {
            return Err(Error::RecursionLimit {
                limit: config.max_depth,
            });
        }

        let offset = offset.resolve(cursor);
        cursor.seek(offset.borrow().to_int() as usize);
        trace!(
            "Record '{}' anchored at offset {}",
            schema.name(),
            cursor.offset()
        );

        let mut record = Self {
            name: schema.name().to_string(),
            offset,
            attrs: Vec::with_capacity(schema.len()),
            corrupted: false,
        };

        for field in schema.fields() {
            let size = record.resolve_size(&field.size, cursor, &field.name)?;
            trace!("Field '{}' resolved to size {}", field.name, size);

            match &field.kind {
                FieldKind::Value(endian) => {
                    let mut value = BinValue::new(size as usize, *endian);
                    if !cursor.is_exhausted() {
                        let chunk = cursor.read(size as usize);
                        value.init_from_bytes(&chunk);
                    }
                    record
                        .attrs
                        .push((field.name.clone(), Attribute::Value(value.shared())));
                }
                FieldKind::Record(element) => {
                    if size == 0 || cursor.is_exhausted() {
                        record.attrs.push((field.name.clone(), Attribute::Absent));
                    } else {
                        let child = Self::parse_at(
                            cursor,
                            element,
                            OffsetSource::Here,
                            config,
                            depth + 1,
                        )?;
                        record
                            .attrs
                            .push((field.name.clone(), Attribute::Record(child)));
                    }
                }
                FieldKind::List(element) => {
                    if cursor.is_exhausted() {
                        record.attrs.push((field.name.clone(), Attribute::Absent));
                    } else {
                        let count = match &field.size {
                            // Adopt the cell so the displayed count stays
                            // aliased with the field it came from
                            SizeRule::Cell(cell) => CountSource::Cell(Rc::clone(cell)),
                            _ => CountSource::Fixed(size),
                        };
                        let elements = RecordList::parse_at(
                            cursor,
                            element,
                            OffsetSource::Here,
                            count,
                            config,
                            depth + 1,
                        )?;
                        record
                            .attrs
                            .push((field.name.clone(), Attribute::List(elements)));
                    }
                }
                FieldKind::Table(spec) => {
                    if cursor.is_exhausted() {
                        record.attrs.push((field.name.clone(), Attribute::Absent));
                    } else {
                        let anchors =
                            record.table_anchors(&spec.driver, &spec.offset_field, &field.name)?;
                        let elements = RecordTable::parse_anchored(
                            cursor,
                            &spec.element,
                            anchors,
                            spec.ignore,
                            config,
                            depth + 1,
                        )?;
                        record
                            .attrs
                            .push((field.name.clone(), Attribute::Table(elements)));
                    }
                }
            }

            if cursor.is_exhausted() && !record.corrupted {
                debug!(
                    "Record '{}' corrupted at field '{}'",
                    record.name, field.name
                );
                record.corrupted = true;
            }
        }

        Ok(record)
    }

    /// Returns the schema name this record was parsed with
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the anchor offset cell (shared; mutating it relocates the
    /// record for a subsequent re-parse)
    pub fn offset(&self) -> &ValueCell {
        &self.offset
    }

    /// Returns true if the cursor became exhausted during this record's
    /// parse. The flag never clears.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    /// Looks up an attribute by field name
    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attrs
            .iter()
            .find(|(attr_name, _)| attr_name == name)
            .map(|(_, attr)| attr)
    }

    /// Returns the ordered `(name, attribute)` pairs, matching schema order
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attrs
            .iter()
            .map(|(name, attr)| (name.as_str(), attr))
    }

    /// Returns the shared cell of a leaf attribute, if `name` names one
    pub fn value(&self, name: &str) -> Option<ValueCell> {
        self.attr(name)?.as_value().cloned()
    }

    /// Returns the integer value of a leaf attribute, if `name` names one
    pub fn int(&self, name: &str) -> Option<u32> {
        self.value(name).map(|cell| cell.borrow().to_int())
    }

    /// Serializes the record: every attribute's bytes, recursively, in
    /// schema order. For an uncorrupted parse this is the exact inverse of
    /// parsing.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut blob = Vec::new();
        for (_, attr) in &self.attrs {
            blob.extend_from_slice(&attr.to_bytes());
        }
        blob
    }

    /// Returns the cell of the leading leaf attribute, the generic integer
    /// reading of a record used for pointer-chasing
    pub(crate) fn leading_cell(&self) -> Result<ValueCell> {
        match self.attrs.first() {
            Some((_, Attribute::Value(cell))) => Ok(Rc::clone(cell)),
            _ => Err(Error::invalid_offset_source(format!(
                "record '{}' has no leading leaf value",
                self.name
            ))),
        }
    }

    /// Resolves a size rule against this (possibly partial) record
    fn resolve_size(&self, rule: &SizeRule, cursor: &ByteCursor, referrer: &str) -> Result<u32> {
        match rule {
            SizeRule::Const(size) => Ok(*size),
            SizeRule::Cell(cell) => Ok(cell.borrow().to_int()),
            SizeRule::Computed(f) => Ok(f(self, cursor)),
            SizeRule::Expr(text) => {
                // Exact sibling-name match wins over formula evaluation
                if let Some(attr) = self.attr(text) {
                    return attr_int(text, attr);
                }

                let formula = Formula::parse(text)?;
                let value = formula.eval(&mut |name| {
                    let attr = self
                        .attr(name)
                        .ok_or_else(|| Error::unknown_field(name, referrer))?;
                    attr_int(name, attr).map(i64::from)
                })?;

                if value < 0 || value > i64::from(u32::MAX) {
                    return Err(Error::formula(text, format!("result {value} out of range")));
                }
                Ok(value as u32)
            }
        }
    }

    /// Collects the anchor cells a table field is driven by
    fn table_anchors(
        &self,
        driver: &str,
        offset_field: &str,
        referrer: &str,
    ) -> Result<Vec<ValueCell>> {
        let elements = match self.attr(driver) {
            Some(Attribute::List(list)) => list.records(),
            Some(Attribute::Table(table)) => table.records(),
            Some(_) => return Err(Error::invalid_driver(driver)),
            None => return Err(Error::unknown_field(driver, referrer)),
        };

        elements
            .iter()
            .map(|element| {
                element
                    .attr(offset_field)
                    .ok_or_else(|| Error::unknown_field(offset_field, referrer))?
                    .offset_cell()
            })
            .collect()
    }
}

/// Reads a leaf attribute as an integer, rejecting other kinds
fn attr_int(name: &str, attr: &Attribute) -> Result<u32> {
    attr.as_value()
        .map(|cell| cell.borrow().to_int())
        .ok_or_else(|| Error::not_numeric(name))
}

/// Parses one record from a file.
///
/// This is a convenience function that reads the whole file into the
/// cursor's buffer and parses from offset zero.
pub fn parse_file(path: impl AsRef<Path>, schema: &Schema) -> Result<Record> {
    parse_file_with_config(path, schema, &ParseConfig::default())
}

/// Parses one record from a file with explicit ceilings
pub fn parse_file_with_config(
    path: impl AsRef<Path>,
    schema: &Schema,
    config: &ParseConfig,
) -> Result<Record> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
    let mut cursor = ByteCursor::new(data);
    Record::parse_with(&mut cursor, schema, OffsetSource::Here, config)
}

//! Offset-indirected collections of records.
//!
//! A [`RecordTable`] does not parse a contiguous region: each element's
//! location is discovered by reading an offset attribute out of an
//! already-parsed driver (a list, or another table). The driver's cells are
//! adopted by reference, so an element stays aliased with the offset field
//! that located it: patch the field, and the element re-anchors.
//!
//! Drivers whose offset equals a configured ignore sentinel produce no
//! element, which filters null or self-referential offsets out of the
//! table.

use tracing::{debug, trace};

use super::{OffsetSource, ParseConfig, Record, RecordList};
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::value::ValueCell;

/// Source of driving elements for a table.
///
/// Implemented by [`RecordList`] and [`RecordTable`] so a table can be
/// driven by either; custom element sources only need to expose an ordered
/// slice of records.
pub trait Driver {
    /// The elements whose offset attributes drive the table, in order
    fn records(&self) -> &[Record];
}

impl Driver for RecordList {
    fn records(&self) -> &[Record] {
        RecordList::records(self)
    }
}

impl Driver for RecordTable {
    fn records(&self) -> &[Record] {
        RecordTable::records(self)
    }
}

/// A collection of records located via offsets read from a driver.
///
/// Elements parse eagerly at construction from the driver's state at that
/// moment; mutating the driver afterwards does not re-run the table.
#[derive(Debug, Clone)]
pub struct RecordTable {
    records: Vec<Record>,
    corrupted: bool,
}

impl RecordTable {
    /// Parses one element per driver entry, anchored at the entry's
    /// `offset_field` value, skipping entries whose offset equals `ignore`
    pub fn parse(
        cursor: &mut ByteCursor,
        schema: &Schema,
        driver: &dyn Driver,
        offset_field: &str,
        ignore: Option<u32>,
    ) -> Result<Self> {
        Self::parse_with(
            cursor,
            schema,
            driver,
            offset_field,
            ignore,
            &ParseConfig::default(),
        )
    }

    /// Parses a table with explicit ceilings
    pub fn parse_with(
        cursor: &mut ByteCursor,
        schema: &Schema,
        driver: &dyn Driver,
        offset_field: &str,
        ignore: Option<u32>,
        config: &ParseConfig,
    ) -> Result<Self> {
        let anchors = driver
            .records()
            .iter()
            .map(|entry| {
                entry
                    .attr(offset_field)
                    .ok_or_else(|| Error::unknown_field(offset_field, schema.name()))?
                    .offset_cell()
            })
            .collect::<Result<Vec<_>>>()?;

        Self::parse_anchored(cursor, schema, anchors, ignore, config, 0)
    }

    pub(crate) fn parse_anchored(
        cursor: &mut ByteCursor,
        schema: &Schema,
        anchors: Vec<ValueCell>,
        ignore: Option<u32>,
        config: &ParseConfig,
        depth: usize,
    ) -> Result<Self> {
        if anchors.len() > config.max_elements {
            return Err(Error::ElementLimit {
                count: anchors.len(),
                limit: config.max_elements,
            });
        }

        trace!(
            "Parsing table of '{}' from {} anchors",
            schema.name(),
            anchors.len()
        );

        let mut records = Vec::new();
        let mut corrupted = false;

        for anchor in anchors {
            if let Some(sentinel) = ignore {
                if anchor.borrow().to_int() == sentinel {
                    trace!("Skipping anchor equal to ignore sentinel {}", sentinel);
                    continue;
                }
            }

            let record =
                Record::parse_at(cursor, schema, OffsetSource::Cell(anchor), config, depth + 1)?;
            records.push(record);

            if cursor.is_exhausted() {
                debug!(
                    "Table of '{}' truncated after {} elements",
                    schema.name(),
                    records.len()
                );
                corrupted = true;
                break;
            }
        }

        Ok(Self { records, corrupted })
    }

    /// Returns the parsed elements in driver order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the number of parsed elements
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no element was parsed
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the element at `index`, or `None` when out of bounds
    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// Iterates over the parsed elements
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Returns the first element whose resolved anchor offset equals `key`
    pub fn find(&self, key: u32) -> Option<&Record> {
        self.records
            .iter()
            .find(|record| record.offset().borrow().to_int() == key)
    }

    /// Mutable variant of [`find`](RecordTable::find)
    pub fn find_mut(&mut self, key: u32) -> Option<&mut Record> {
        self.records
            .iter_mut()
            .find(|record| record.offset().borrow().to_int() == key)
    }

    /// Replaces the first element whose anchor offset equals `key`.
    /// Does nothing when no element matches.
    pub fn replace(&mut self, key: u32, record: Record) {
        if let Some(slot) = self.find_mut(key) {
            *slot = record;
        }
    }

    /// Returns true if the cursor ran out while parsing this table
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    /// Serializes every element in driver order
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut blob = Vec::new();
        for record in &self.records {
            blob.extend_from_slice(&record.to_bytes());
        }
        blob
    }
}

impl<'a> IntoIterator for &'a RecordTable {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CountSource;
    use crate::schema::FieldDef;
    use crate::value::Endian;

    fn pointer_schema() -> Schema {
        Schema::new("Pointer", vec![FieldDef::value("target", 4, Endian::Little)]).unwrap()
    }

    fn payload_schema() -> Schema {
        Schema::new("Payload", vec![FieldDef::value("data", 2, Endian::Little)]).unwrap()
    }

    /// Two pointers (to offsets 12 and 8) followed by payload bytes
    fn table_bytes() -> Vec<u8> {
        vec![
            12, 0, 0, 0, // pointer 0 -> offset 12
            8, 0, 0, 0, // pointer 1 -> offset 8
            0xaa, 0xbb, // payload at 8
            0xcc, 0xdd, // padding
            0xee, 0xff, // payload at 12
        ]
    }

    fn parse_driver(cursor: &mut ByteCursor) -> RecordList {
        RecordList::parse(
            cursor,
            &pointer_schema(),
            OffsetSource::Here,
            CountSource::Fixed(2),
        )
        .unwrap()
    }

    #[test]
    fn test_driven_parse() {
        let mut cursor = ByteCursor::new(table_bytes());
        let driver = parse_driver(&mut cursor);

        let table =
            RecordTable::parse(&mut cursor, &payload_schema(), &driver, "target", None).unwrap();

        assert_eq!(table.len(), 2);
        assert!(!table.is_corrupted());
        assert_eq!(table.get(0).unwrap().int("data"), Some(0xffee));
        assert_eq!(table.get(1).unwrap().int("data"), Some(0xbbaa));
    }

    #[test]
    fn test_ignore_sentinel_skips() {
        let mut data = table_bytes();
        data[0] = 0; // pointer 0 becomes the null sentinel
        let mut cursor = ByteCursor::new(data);
        let driver = parse_driver(&mut cursor);

        let table =
            RecordTable::parse(&mut cursor, &payload_schema(), &driver, "target", Some(0))
                .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0).unwrap().int("data"), Some(0xbbaa));
    }

    #[test]
    fn test_find_and_replace_by_offset() {
        let mut cursor = ByteCursor::new(table_bytes());
        let driver = parse_driver(&mut cursor);
        let mut table =
            RecordTable::parse(&mut cursor, &payload_schema(), &driver, "target", None).unwrap();

        assert_eq!(table.find(8).unwrap().int("data"), Some(0xbbaa));
        assert_eq!(table.find(12).unwrap().int("data"), Some(0xffee));
        assert!(table.find(99).is_none());

        let replacement = table.find(12).unwrap().clone();
        table.replace(8, replacement);
        assert_eq!(table.find(8).unwrap().int("data"), Some(0xffee));

        // Replacing a missing key is a silent no-op
        let spare = table.find(8).unwrap().clone();
        table.replace(1234, spare);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_anchor_aliasing_with_driver() {
        let mut cursor = ByteCursor::new(table_bytes());
        let driver = parse_driver(&mut cursor);
        let table =
            RecordTable::parse(&mut cursor, &payload_schema(), &driver, "target", None).unwrap();

        // The element's anchor is the very cell of the driver's offset field
        let driver_cell = driver.get(0).unwrap().value("target").unwrap();
        assert!(std::rc::Rc::ptr_eq(table.get(0).unwrap().offset(), &driver_cell));

        // Patching the driver's field is visible through the element
        driver_cell.borrow_mut().init_from_int(8);
        assert_eq!(table.get(0).unwrap().offset().borrow().to_int(), 8);
        assert_eq!(table.find(8).unwrap().int("data"), Some(0xffee));
    }

    #[test]
    fn test_out_of_range_anchor_corrupts() {
        let mut data = table_bytes();
        data[4] = 200; // pointer 1 far past the buffer end
        let mut cursor = ByteCursor::new(data);
        let driver = parse_driver(&mut cursor);

        let table =
            RecordTable::parse(&mut cursor, &payload_schema(), &driver, "target", None).unwrap();

        assert!(table.is_corrupted());
        assert_eq!(table.len(), 2);
        assert!(table.get(1).unwrap().is_corrupted());
        assert!(!table.get(0).unwrap().is_corrupted());
    }

    #[test]
    fn test_table_driven_by_table() {
        // The first table's payloads are themselves pointers
        let data = vec![
            4, 0, 0, 0, // pointer -> offset 4
            12, 0, 0, 0, // chained pointer at 4 -> offset 12
            0, 0, 0, 0, // padding
            0x21, 0x43, 0, 0, // final payload at 12
        ];
        let chain = Schema::new("Chain", vec![FieldDef::value("next", 4, Endian::Little)]).unwrap();
        let leaf = Schema::new("Leaf", vec![FieldDef::value("v", 2, Endian::Little)]).unwrap();

        let mut cursor = ByteCursor::new(data);
        let driver = RecordList::parse(
            &mut cursor,
            &pointer_schema(),
            OffsetSource::Here,
            CountSource::Fixed(1),
        )
        .unwrap();

        let first = RecordTable::parse(&mut cursor, &chain, &driver, "target", None).unwrap();
        let second = RecordTable::parse(&mut cursor, &leaf, &first, "next", None).unwrap();

        assert_eq!(second.len(), 1);
        assert_eq!(second.get(0).unwrap().int("v"), Some(0x4321));
    }

    #[test]
    fn test_missing_offset_field_is_fatal() {
        let mut cursor = ByteCursor::new(table_bytes());
        let driver = parse_driver(&mut cursor);

        let err = RecordTable::parse(&mut cursor, &payload_schema(), &driver, "nope", None)
            .unwrap_err();
        assert!(matches!(err, Error::UnknownField { .. }));
    }
}

//! Contiguous homogeneous runs of records.
//!
//! A [`RecordList`] parses a declared number of same-schema records back to
//! back, each element picking up where the previous one ended. The declared
//! count is kept as a [`ValueCell`] so consumers can display it even when
//! truncation cut the run short; a list holding fewer elements than its
//! count is always marked corrupted.

use std::rc::Rc;

use tracing::{debug, trace};

use super::{OffsetSource, ParseConfig, Record};
use crate::cursor::ByteCursor;
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::value::{BinValue, Endian, ValueCell};

/// How many elements a list holds
#[derive(Debug, Clone)]
pub enum CountSource {
    /// A literal element count, wrapped into a new owned cell
    Fixed(u32),
    /// An existing cell, adopted by reference
    Cell(ValueCell),
}

impl From<u32> for CountSource {
    fn from(count: u32) -> Self {
        Self::Fixed(count)
    }
}

impl From<usize> for CountSource {
    fn from(count: usize) -> Self {
        Self::Fixed(count as u32)
    }
}

impl From<ValueCell> for CountSource {
    fn from(cell: ValueCell) -> Self {
        Self::Cell(cell)
    }
}

impl From<&ValueCell> for CountSource {
    fn from(cell: &ValueCell) -> Self {
        Self::Cell(Rc::clone(cell))
    }
}

/// A contiguous run of records sharing one schema.
///
/// Elements parse eagerly at construction. `records.len()` never exceeds
/// the declared count, and is smaller only when the cursor ran out
/// mid-list (in which case the list is corrupted and parsing stopped at
/// the first incomplete element).
#[derive(Debug, Clone)]
pub struct RecordList {
    offset: ValueCell,
    count: ValueCell,
    records: Vec<Record>,
    corrupted: bool,
}

impl RecordList {
    /// Parses a list from `cursor` with default ceilings
    pub fn parse(
        cursor: &mut ByteCursor,
        schema: &Schema,
        offset: impl Into<OffsetSource>,
        count: impl Into<CountSource>,
    ) -> Result<Self> {
        Self::parse_with(cursor, schema, offset, count, &ParseConfig::default())
    }

    /// Parses a list with explicit ceilings
    pub fn parse_with(
        cursor: &mut ByteCursor,
        schema: &Schema,
        offset: impl Into<OffsetSource>,
        count: impl Into<CountSource>,
        config: &ParseConfig,
    ) -> Result<Self> {
        Self::parse_at(cursor, schema, offset.into(), count.into(), config, 0)
    }

    pub(crate) fn parse_at(
        cursor: &mut ByteCursor,
        schema: &Schema,
        offset: OffsetSource,
        count: CountSource,
        config: &ParseConfig,
        depth: usize,
    ) -> Result<Self> {
        let count = match count {
            CountSource::Fixed(value) => {
                BinValue::from_int(4, Endian::Little, value).shared()
            }
            CountSource::Cell(cell) => cell,
        };
        let declared = count.borrow().to_int() as usize;
        if declared > config.max_elements {
            return Err(Error::ElementLimit {
                count: declared,
                limit: config.max_elements,
            });
        }

        let offset = offset.resolve(cursor);
        cursor.seek(offset.borrow().to_int() as usize);
        trace!(
            "Parsing {} '{}' elements at offset {}",
            declared,
            schema.name(),
            cursor.offset()
        );

        let mut records = Vec::new();
        let mut corrupted = false;

        for _ in 0..declared {
            let before = cursor.offset();
            let record = Record::parse_at(cursor, schema, OffsetSource::Here, config, depth + 1)?;

            if cursor.is_exhausted() {
                corrupted = true;
                // Keep a partially-read element; an element that consumed
                // nothing never existed in the buffer
                if cursor.offset() > before {
                    records.push(record);
                }
                debug!(
                    "List of '{}' truncated after {} of {} elements",
                    schema.name(),
                    records.len(),
                    declared
                );
                break;
            }

            records.push(record);
        }

        Ok(Self {
            offset,
            count,
            records,
            corrupted,
        })
    }

    /// Returns the anchor offset cell
    pub fn offset(&self) -> &ValueCell {
        &self.offset
    }

    /// Returns the declared-count cell, kept for display even when the
    /// list parsed short or empty
    pub fn count(&self) -> &ValueCell {
        &self.count
    }

    /// Returns the declared element count as an integer
    pub fn declared_len(&self) -> usize {
        self.count.borrow().to_int() as usize
    }

    /// Returns the parsed elements in buffer order
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Returns the number of elements actually parsed
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

    /// Returns a mutable reference to the element at `index`
    pub fn get_mut(&mut self, index: usize) -> Option<&mut Record> {
        self.records.get_mut(index)
    }

    /// Replaces the element at `index`. Out-of-bounds writes are silently
    /// ignored; elements are never added this way.
    pub fn set(&mut self, index: usize, record: Record) {
        if let Some(slot) = self.records.get_mut(index) {
            *slot = record;
        }
    }

    /// Iterates over the parsed elements
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    /// Returns true if the cursor ran out while parsing this list
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    /// Serializes every element in order
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut blob = Vec::new();
        for record in &self.records {
            blob.extend_from_slice(&record.to_bytes());
        }
        blob
    }
}

impl<'a> IntoIterator for &'a RecordList {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

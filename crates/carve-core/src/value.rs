//! Fixed-size, endianness-aware byte values.
//!
//! [`BinValue`] is the leaf node of a parse tree: a declared number of raw
//! bytes plus the endianness used to interpret them as an unsigned integer.
//! A value materialized from fewer bytes than declared is zero-padded on its
//! most-significant side (so the numeric reading of the partial data is
//! preserved) and permanently marked as truncated.
//!
//! [`ValueCell`] is the shared form used for anchor offsets: one cell can be
//! referenced by several structures at once, so patching an offset through
//! any holder relocates every structure anchored to it. This aliasing is the
//! mechanism behind pointer-chasing and post-parse offset fixups.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A shared, mutable [`BinValue`] cell.
///
/// Parses are single-threaded, so plain `Rc<RefCell<_>>` shared ownership is
/// enough; the last writer wins.
pub type ValueCell = Rc<RefCell<BinValue>>;

/// Byte order of a [`BinValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    /// Most significant byte first
    Big,
    /// Least significant byte first
    #[default]
    Little,
}

/// A fixed-size binary value with truncation tracking.
///
/// The raw content always holds exactly the declared number of bytes, even
/// when the source under-delivered: missing bytes become zero padding and
/// the `truncated` flag latches.
///
/// # Example
///
/// ```
/// use carve_core::{BinValue, Endian};
///
/// let mut value = BinValue::new(4, Endian::Little);
/// value.init_from_bytes(&[0x0a, 0x00, 0x00, 0x00]);
/// assert_eq!(value.to_int(), 10);
/// assert_eq!(value.to_hex_string(), "0a000000");
/// assert!(!value.is_truncated());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BinValue {
    size: usize,
    endian: Endian,
    data: Vec<u8>,
    truncated: bool,
}

impl BinValue {
    /// Creates a zero-filled value of `size` bytes
    pub fn new(size: usize, endian: Endian) -> Self {
        Self {
            size,
            endian,
            data: vec![0; size],
            truncated: false,
        }
    }

    /// Creates a value of `size` bytes initialized from an integer
    pub fn from_int(size: usize, endian: Endian, value: u32) -> Self {
        let mut out = Self::new(size, endian);
        out.init_from_int(value);
        out
    }

    /// Returns the declared byte size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the byte order
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Returns the raw content (always exactly `size` bytes)
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the raw byte length (equal to the declared size)
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true for zero-size values
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if this value was ever initialized from fewer bytes than
    /// its declared size. The flag is permanent: a later complete
    /// re-initialization does not clear it.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Initializes the raw content from `data`.
    ///
    /// Extra bytes are ignored. If `data` is shorter than the declared size,
    /// the missing bytes become zero padding on the most-significant side
    /// (leading for big-endian, trailing for little-endian) and the
    /// truncated flag latches.
    pub fn init_from_bytes(&mut self, data: &[u8]) {
        if data.len() >= self.size {
            self.data.copy_from_slice(&data[..self.size]);
            return;
        }

        self.truncated = true;
        let stub = self.size - data.len();
        match self.endian {
            Endian::Big => {
                self.data[..stub].fill(0);
                self.data[stub..].copy_from_slice(data);
            }
            Endian::Little => {
                self.data[..data.len()].copy_from_slice(data);
                self.data[data.len()..].fill(0);
            }
        }
    }

    /// Initializes the raw content from an unsigned integer, serialized into
    /// exactly the declared number of bytes per the value's endianness.
    ///
    /// Values wider than the declared size keep their low-order bytes.
    pub fn init_from_int(&mut self, value: u32) {
        let wide = (value as u64).to_le_bytes();
        match self.endian {
            Endian::Little => {
                for (i, byte) in self.data.iter_mut().enumerate() {
                    *byte = if i < wide.len() { wide[i] } else { 0 };
                }
            }
            Endian::Big => {
                let size = self.size;
                for (i, byte) in self.data.iter_mut().enumerate() {
                    let pos = size - 1 - i;
                    *byte = if pos < wide.len() { wide[pos] } else { 0 };
                }
            }
        }
    }

    /// Interprets the leading raw bytes as an unsigned 32-bit integer.
    ///
    /// Values shorter than four bytes are zero-extended per endianness.
    /// Values longer than four bytes expose only their first four raw bytes
    /// this way, an intentional limitation: offset, size and count
    /// fields are at most four bytes in practice.
    pub fn to_int(&self) -> u32 {
        let mut quad = [0u8; 4];
        if self.data.len() >= 4 {
            quad.copy_from_slice(&self.data[..4]);
        } else {
            match self.endian {
                Endian::Big => quad[4 - self.data.len()..].copy_from_slice(&self.data),
                Endian::Little => quad[..self.data.len()].copy_from_slice(&self.data),
            }
        }

        match self.endian {
            Endian::Big => u32::from_be_bytes(quad),
            Endian::Little => u32::from_le_bytes(quad),
        }
    }

    /// Returns the raw content as a lowercase hex dump, e.g. `"4d5a0000"`
    pub fn to_hex_string(&self) -> String {
        self.data.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Returns the integer interpretation rendered in decimal
    pub fn to_display_string(&self) -> String {
        self.to_int().to_string()
    }

    /// Wraps this value into a shared [`ValueCell`]
    pub fn shared(self) -> ValueCell {
        Rc::new(RefCell::new(self))
    }
}

impl fmt::Display for BinValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.data {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_full() {
        let mut value = BinValue::new(4, Endian::Little);
        value.init_from_bytes(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(value.as_bytes(), &[1, 2, 3, 4]);
        assert!(!value.is_truncated());
    }

    #[test]
    fn test_init_short_little_endian() {
        let mut value = BinValue::new(4, Endian::Little);
        value.init_from_bytes(&[0x0a, 0x0b]);
        // Padding lands on the most-significant (trailing) side
        assert_eq!(value.as_bytes(), &[0x0a, 0x0b, 0, 0]);
        assert!(value.is_truncated());
        assert_eq!(value.to_int(), 0x0b0a);
    }

    #[test]
    fn test_init_short_big_endian() {
        let mut value = BinValue::new(4, Endian::Big);
        value.init_from_bytes(&[0x0a, 0x0b]);
        // Padding lands on the most-significant (leading) side
        assert_eq!(value.as_bytes(), &[0, 0, 0x0a, 0x0b]);
        assert!(value.is_truncated());
        assert_eq!(value.to_int(), 0x0a0b);
    }

    #[test]
    fn test_truncated_latches() {
        let mut value = BinValue::new(2, Endian::Little);
        value.init_from_bytes(&[1]);
        assert!(value.is_truncated());

        value.init_from_bytes(&[1, 2]);
        assert!(value.is_truncated());
    }

    #[test]
    fn test_init_from_int_round_trips() {
        for endian in [Endian::Big, Endian::Little] {
            let value = BinValue::from_int(4, endian, 0xdead_beef);
            assert_eq!(value.to_int(), 0xdead_beef);
            assert!(!value.is_truncated());
        }
    }

    #[test]
    fn test_init_from_int_byte_layout() {
        let le = BinValue::from_int(4, Endian::Little, 0x0102_0304);
        assert_eq!(le.as_bytes(), &[4, 3, 2, 1]);

        let be = BinValue::from_int(4, Endian::Big, 0x0102_0304);
        assert_eq!(be.as_bytes(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_init_from_int_narrow_keeps_low_bytes() {
        let le = BinValue::from_int(2, Endian::Little, 0x0102_0304);
        assert_eq!(le.as_bytes(), &[4, 3]);
        assert_eq!(le.to_int(), 0x0304);

        let be = BinValue::from_int(2, Endian::Big, 0x0102_0304);
        assert_eq!(be.as_bytes(), &[3, 4]);
        assert_eq!(be.to_int(), 0x0304);
    }

    #[test]
    fn test_init_from_int_wide() {
        let le = BinValue::from_int(8, Endian::Little, 7);
        assert_eq!(le.as_bytes(), &[7, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(le.to_int(), 7);

        let be = BinValue::from_int(8, Endian::Big, 7);
        assert_eq!(be.as_bytes(), &[0, 0, 0, 0, 0, 0, 0, 7]);
        // Only the leading four raw bytes participate in the conversion
        assert_eq!(be.to_int(), 0);
    }

    #[test]
    fn test_to_int_short() {
        let mut value = BinValue::new(2, Endian::Little);
        value.init_from_bytes(&[0x34, 0x12]);
        assert_eq!(value.to_int(), 0x1234);

        let mut value = BinValue::new(2, Endian::Big);
        value.init_from_bytes(&[0x12, 0x34]);
        assert_eq!(value.to_int(), 0x1234);
    }

    #[test]
    fn test_display_helpers() {
        let value = BinValue::from_int(4, Endian::Big, 0x4d5a_0000);
        assert_eq!(value.to_hex_string(), "4d5a0000");
        assert_eq!(format!("{value}"), "4d5a0000");
        assert_eq!(value.to_display_string(), "1297612800");
    }

    #[test]
    fn test_equality() {
        let a = BinValue::from_int(4, Endian::Little, 42);
        let b = BinValue::from_int(4, Endian::Little, 42);
        assert_eq!(a, b);

        // Same bytes, different endianness: not equal
        let c = BinValue::from_int(4, Endian::Big, 42);
        assert_ne!(a, c);

        // Same bytes, one truncated: not equal
        let mut d = BinValue::new(4, Endian::Little);
        d.init_from_bytes(&[42, 0]);
        assert_ne!(a, d);
    }

    #[test]
    fn test_shared_cell_aliasing() {
        let cell = BinValue::from_int(4, Endian::Little, 0x10).shared();
        let alias = Rc::clone(&cell);

        alias.borrow_mut().init_from_int(0x20);
        assert_eq!(cell.borrow().to_int(), 0x20);
    }
}

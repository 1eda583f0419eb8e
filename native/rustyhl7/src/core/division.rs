//! Division - offset and length into a divider's buffer
//!
//! One delimiter-bounded slice of a message buffer. Offsets are always
//! buffer-absolute, so a division computed inside a bounded sub-range still
//! points straight into the shared buffer.

/// A delimited slice of a buffer.
///
/// `valid == false` is the only way to say "not found / out of range";
/// callers check `valid` rather than looking for sentinel lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Division {
    /// Byte offset into the buffer
    pub offset: usize,
    /// Length in bytes
    pub length: usize,
    /// Whether this division exists at all
    pub valid: bool,
}

impl Division {
    /// Sentinel for a slot that does not exist
    pub const INVALID: Division = Division {
        offset: 0,
        length: 0,
        valid: false,
    };

    /// Create a valid division
    #[inline]
    pub const fn new(offset: usize, length: usize) -> Self {
        Self {
            offset,
            length,
            valid: true,
        }
    }

    /// End offset (exclusive)
    #[inline]
    pub const fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Valid but zero-length
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Extract the slice from the buffer; invalid or out-of-bounds divisions read as ""
    #[inline]
    pub fn slice<'a>(&self, buffer: &'a str) -> &'a str {
        if !self.valid {
            return "";
        }
        buffer.get(self.offset..self.end()).unwrap_or("")
    }

    /// Sub-division at `offset..offset + length` relative to this one,
    /// invalid when it does not fit
    pub fn within(&self, offset: usize, length: usize) -> Division {
        if self.valid && offset + length <= self.length {
            Division::new(self.offset + offset, length)
        } else {
            Division::INVALID
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_division_basic() {
        let div = Division::new(5, 10);
        assert_eq!(div.offset, 5);
        assert_eq!(div.length, 10);
        assert_eq!(div.end(), 15);
        assert!(div.valid);
        assert!(!div.is_empty());
    }

    #[test]
    fn test_invalid_reads_empty() {
        assert_eq!(Division::INVALID.slice("hello"), "");
        assert!(!Division::default().valid);
    }

    #[test]
    fn test_slice() {
        let div = Division::new(6, 5);
        assert_eq!(div.slice("hello world"), "world");
        assert_eq!(Division::new(8, 10).slice("hello world"), "");
    }

    #[test]
    fn test_within() {
        let div = Division::new(10, 8);
        assert_eq!(div.within(3, 1), Division::new(13, 1));
        assert!(!div.within(7, 2).valid);
        assert!(!Division::INVALID.within(0, 0).valid);
    }
}

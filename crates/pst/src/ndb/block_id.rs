//! [BID (Block ID)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/9e6d3858-028d-4954-a8b2-4e1568eb7df8)
//!
//! Stored on disk as either 32 bits (ANSI) or 64 bits (Unicode, Unicode 4K); widened to `u64`
//! immediately on read so every layer above [`super::header::Variant`] is width-agnostic.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use super::header::Width;

/// A block identifier. Bit 1 (`0x2`) marks an *internal* block (an XBlock/XXBlock array of
/// child BIDs); all other blocks are *data* leaves.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u64);

impl BlockId {
    pub fn new(is_internal: bool, index: u64) -> Self {
        let flag = if is_internal { 0x2 } else { 0x0 };
        Self((index << 2) | flag)
    }

    pub fn is_internal(&self) -> bool {
        self.0 & 0x2 == 0x2
    }

    pub fn index(&self) -> u64 {
        self.0 >> 2
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn read(f: &mut dyn Read, width: Width) -> io::Result<Self> {
        let value = match width {
            Width::Bit32 => u64::from(f.read_u32::<LittleEndian>()?),
            Width::Bit64 => f.read_u64::<LittleEndian>()?,
        };
        Ok(Self(value))
    }

    pub fn write(&self, f: &mut dyn Write, width: Width) -> io::Result<()> {
        match width {
            Width::Bit32 => f.write_u32::<LittleEndian>(self.0 as u32),
            Width::Bit64 => f.write_u64::<LittleEndian>(self.0),
        }
    }
}

impl From<u64> for BlockId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<BlockId> for u64 {
    fn from(value: BlockId) -> Self {
        value.0
    }
}

impl std::fmt::Debug for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BlockId {{ internal: {}, index: {:#x} }}",
            self.is_internal(),
            self.index()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinguishes_internal_from_data() {
        let data = BlockId::new(false, 7);
        let internal = BlockId::new(true, 7);
        assert!(!data.is_internal());
        assert!(internal.is_internal());
        assert_eq!(data.index(), 7);
        assert_eq!(internal.index(), 7);
    }
}

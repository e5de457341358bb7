//! [Header (HEADER)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/c9876f5a-664d-46a3-9887-ba63f113abf5)

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::Read;
use tracing::{debug, instrument};

use super::block_id::BlockId;
use super::NdbError;

/// The true on-disk magic, `NDB!` read big-endian from the first four bytes of the file.
pub const HEADER_MAGIC: u32 = 0x4E444221;

/// Number of leading header bytes this decoder inspects (spec.md §4.4).
pub const HEADER_READ_LEN: usize = 514;

/// Byte width of NIDs/BIDs/offsets on disk, derived from [Variant].
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Width {
    Bit32,
    Bit64,
}

/// The three on-disk shapes a PST/OST header can declare.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Variant {
    /// `NDB_VERSION_ANSI` (read as 14; on-disk byte 15 is accepted and normalized to 14)
    Ansi,
    /// `NDB_VERSION_UNICODE`
    Unicode,
    /// `NDB_VERSION_UNICODE_4K` (Outlook 2013+, 4 KiB pages)
    Unicode4k,
}

impl Variant {
    fn from_header_byte(byte: u8) -> Result<Self, NdbError> {
        match byte {
            14 | 15 => Ok(Self::Ansi),
            23 => Ok(Self::Unicode),
            36 => Ok(Self::Unicode4k),
            invalid => Err(NdbError::UnsupportedVariant(invalid)),
        }
    }

    pub fn width(&self) -> Width {
        match self {
            Self::Ansi => Width::Bit32,
            Self::Unicode | Self::Unicode4k => Width::Bit64,
        }
    }

    /// On-disk page size: 512 bytes, except the 2013 "4K" variant.
    pub fn page_size(&self) -> usize {
        match self {
            Self::Ansi | Self::Unicode => 512,
            Self::Unicode4k => 4096,
        }
    }

    fn bref_size(&self) -> usize {
        match self.width() {
            Width::Bit32 => 8,
            Width::Bit64 => 16,
        }
    }

    fn encryption_offset(&self) -> usize {
        match self.width() {
            Width::Bit32 => 461,
            Width::Bit64 => 513,
        }
    }

    fn nbt_root_offset(&self) -> usize {
        match self.width() {
            Width::Bit32 => 188,
            Width::Bit64 => 224,
        }
    }

    fn bbt_root_offset(&self) -> usize {
        self.nbt_root_offset() + self.bref_size()
    }
}

/// `bCryptMethod`
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NdbCryptMethod {
    /// `NDB_CRYPT_NONE`
    None = 0x00,
    /// `NDB_CRYPT_PERMUTE`: the "compressible encryption" substitution cipher (C3).
    Permute = 0x01,
    /// `NDB_CRYPT_CYCLIC`: the "high encryption" variant. Decoding it is out of scope; a
    /// header declaring it fails to open.
    Cyclic = 0x02,
}

impl TryFrom<u8> for NdbCryptMethod {
    type Error = NdbError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::Permute),
            0x02 => Ok(Self::Cyclic),
            invalid => Err(NdbError::InvalidNdbCryptMethod(invalid)),
        }
    }
}

/// A root B-tree reference (`BREF`): the block holding the tree's root page, and the file
/// offset at which that page was last known to live.
#[derive(Copy, Clone, Debug)]
pub struct RootRef {
    block_id: BlockId,
    file_offset: u64,
}

impl RootRef {
    #[cfg(test)]
    pub(crate) fn new(block_id: BlockId, file_offset: u64) -> Self {
        Self {
            block_id,
            file_offset,
        }
    }

    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    pub fn file_offset(&self) -> u64 {
        self.file_offset
    }

    fn read(buffer: &[u8], width: Width) -> Self {
        match width {
            Width::Bit32 => {
                let block_id = BlockId::from(u64::from(LittleEndian::read_u32(&buffer[0..4])));
                let file_offset = u64::from(LittleEndian::read_u32(&buffer[4..8]));
                Self {
                    block_id,
                    file_offset,
                }
            }
            Width::Bit64 => {
                let block_id = BlockId::from(LittleEndian::read_u64(&buffer[0..8]));
                let file_offset = LittleEndian::read_u64(&buffer[8..16]);
                Self {
                    block_id,
                    file_offset,
                }
            }
        }
    }
}

/// The validated file header: variant, encryption method, and the two B-tree roots.
#[derive(Clone, Debug)]
pub struct Header {
    variant: Variant,
    crypt_method: NdbCryptMethod,
    node_btree_root: RootRef,
    block_btree_root: RootRef,
}

impl Header {
    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn width(&self) -> Width {
        self.variant.width()
    }

    pub fn crypt_method(&self) -> NdbCryptMethod {
        self.crypt_method
    }

    pub fn node_btree_root(&self) -> RootRef {
        self.node_btree_root
    }

    pub fn block_btree_root(&self) -> RootRef {
        self.block_btree_root
    }

    #[cfg(test)]
    pub(crate) fn for_test(
        variant: Variant,
        crypt_method: NdbCryptMethod,
        node_btree_root: RootRef,
        block_btree_root: RootRef,
    ) -> Self {
        Self {
            variant,
            crypt_method,
            node_btree_root,
            block_btree_root,
        }
    }

    #[instrument(skip_all)]
    pub fn read(f: &mut dyn Read) -> Result<Self, NdbError> {
        let mut buffer = [0_u8; HEADER_READ_LEN];
        f.read_exact(&mut buffer).map_err(NdbError::from)?;

        let magic = BigEndian::read_u32(&buffer[0..4]);
        if magic != HEADER_MAGIC {
            return Err(NdbError::InvalidNdbHeaderMagicValue(magic));
        }

        let variant = Variant::from_header_byte(buffer[10])?;
        debug!(?variant, "parsed NDB header variant");

        let crypt_method = NdbCryptMethod::try_from(buffer[variant.encryption_offset()])?;
        if crypt_method == NdbCryptMethod::Cyclic {
            return Err(NdbError::EncryptedRejected);
        }

        let bref_size = variant.bref_size();
        let nbt_start = variant.nbt_root_offset();
        let bbt_start = variant.bbt_root_offset();
        let node_btree_root = RootRef::read(
            &buffer[nbt_start..nbt_start + bref_size],
            variant.width(),
        );
        let block_btree_root = RootRef::read(
            &buffer[bbt_start..bbt_start + bref_size],
            variant.width(),
        );

        Ok(Self {
            variant,
            crypt_method,
            node_btree_root,
            block_btree_root,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_header(variant_byte: u8, width: Width, crypt: u8) -> Vec<u8> {
        let mut buffer = vec![0_u8; HEADER_READ_LEN];
        BigEndian::write_u32(&mut buffer[0..4], HEADER_MAGIC);
        buffer[10] = variant_byte;

        let bref_size = match width {
            Width::Bit32 => 8,
            Width::Bit64 => 16,
        };
        let nbt_start = match width {
            Width::Bit32 => 188,
            Width::Bit64 => 224,
        };
        let bbt_start = nbt_start + bref_size;
        match width {
            Width::Bit32 => {
                LittleEndian::write_u32(&mut buffer[nbt_start..nbt_start + 4], 0x10);
                LittleEndian::write_u32(&mut buffer[nbt_start + 4..nbt_start + 8], 0x1000);
                LittleEndian::write_u32(&mut buffer[bbt_start..bbt_start + 4], 0x12);
                LittleEndian::write_u32(&mut buffer[bbt_start + 4..bbt_start + 8], 0x2000);
            }
            Width::Bit64 => {
                LittleEndian::write_u64(&mut buffer[nbt_start..nbt_start + 8], 0x10);
                LittleEndian::write_u64(&mut buffer[nbt_start + 8..nbt_start + 16], 0x1000);
                LittleEndian::write_u64(&mut buffer[bbt_start..bbt_start + 8], 0x12);
                LittleEndian::write_u64(&mut buffer[bbt_start + 8..bbt_start + 16], 0x2000);
            }
        }

        let encryption_offset = match width {
            Width::Bit32 => 461,
            Width::Bit64 => 513,
        };
        buffer[encryption_offset] = crypt;
        buffer
    }

    #[test]
    fn parses_unicode_header() {
        let buffer = make_header(23, Width::Bit64, 1);
        let header = Header::read(&mut &buffer[..]).unwrap();
        assert_eq!(header.variant(), Variant::Unicode);
        assert_eq!(header.crypt_method(), NdbCryptMethod::Permute);
        assert_eq!(header.node_btree_root().file_offset(), 0x1000);
        assert_eq!(header.block_btree_root().file_offset(), 0x2000);
    }

    #[test]
    fn normalizes_variant_byte_15_to_ansi() {
        let buffer = make_header(15, Width::Bit32, 0);
        let header = Header::read(&mut &buffer[..]).unwrap();
        assert_eq!(header.variant(), Variant::Ansi);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buffer = make_header(23, Width::Bit64, 0);
        buffer[0] = 0;
        assert!(matches!(
            Header::read(&mut &buffer[..]),
            Err(NdbError::InvalidNdbHeaderMagicValue(_))
        ));
    }

    #[test]
    fn rejects_cyclic_encryption() {
        let buffer = make_header(23, Width::Bit64, 2);
        assert!(matches!(
            Header::read(&mut &buffer[..]),
            Err(NdbError::EncryptedRejected)
        ));
    }

    #[test]
    fn rejects_unsupported_variant() {
        let buffer = make_header(99, Width::Bit64, 0);
        assert!(matches!(
            Header::read(&mut &buffer[..]),
            Err(NdbError::UnsupportedVariant(99))
        ));
    }
}

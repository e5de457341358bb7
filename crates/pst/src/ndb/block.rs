//! [Blocks (BID) and the logical node stream](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/7d53d413-b492-4483-b624-4e2fa2a08cf3)
//!
//! A node's primary data is either a single *data* block, or an *internal* XBlock/XXBlock
//! array of child BIDs that logically concatenate into one stream (C6).

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};
use tracing::{instrument, trace};

use super::block_id::BlockId;
use super::header::{Header, NdbCryptMethod, Width};
use super::page::BlockBTree;
use super::NdbError;
use crate::encode;

fn read_bid(f: &mut dyn Read, width: Width) -> std::io::Result<BlockId> {
    BlockId::read(f, width)
}

/// Reads one data leaf's bytes at its resolved file offset, applying compressible-encryption
/// decoding when the crypt method calls for it (spec.md §4.3 — internal blocks never decode,
/// so this must only be called with a non-internal [`BlockId`]).
fn read_data_leaf<R: Read + Seek>(
    f: &mut R,
    header: &Header,
    block_btree: &BlockBTree,
    bid: BlockId,
) -> Result<Vec<u8>, NdbError> {
    debug_assert!(!bid.is_internal());
    let entry = block_btree.resolve(f, bid)?;
    f.seek(SeekFrom::Start(entry.file_offset))?;
    let mut buffer = vec![0_u8; entry.size as usize];
    f.read_exact(&mut buffer)?;

    if header.crypt_method() == NdbCryptMethod::Permute {
        encode::decode_block(&mut buffer);
    }

    Ok(buffer)
}

struct DataTreeHeader {
    level: u8,
    entry_count: u16,
    total_size: u32,
}

/// Parses the 8-byte `{btype, cLevel, cEnt, lcbTotal}` header shared by XBlocks and XXBlocks.
fn read_data_tree_header(cursor: &mut &[u8]) -> Result<DataTreeHeader, NdbError> {
    let btype = cursor.read_u8()?;
    if btype != 0x01 {
        return Err(NdbError::InvalidDataTreeBlockType(btype));
    }
    let level = cursor.read_u8()?;
    if level != 1 && level != 2 {
        return Err(NdbError::InvalidDataTreeBlockLevel(level));
    }
    let entry_count = cursor.read_u16::<LittleEndian>()?;
    let total_size = cursor.read_u32::<LittleEndian>()?;
    Ok(DataTreeHeader {
        level,
        entry_count,
        total_size,
    })
}

fn read_internal_block<R: Read + Seek>(
    f: &mut R,
    block_btree: &BlockBTree,
    bid: BlockId,
) -> Result<Vec<u8>, NdbError> {
    debug_assert!(bid.is_internal());
    let entry = block_btree.resolve(f, bid)?;
    f.seek(SeekFrom::Start(entry.file_offset))?;
    let mut buffer = vec![0_u8; entry.size as usize];
    f.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// Flattens an XBlock (`level == 1`) or XXBlock (`level == 2`, each child itself an XBlock)
/// into the ordered list of data-leaf [`BlockId`]s it references.
fn expand_into_leaves<R: Read + Seek>(
    f: &mut R,
    header: &Header,
    block_btree: &BlockBTree,
    bid: BlockId,
    leaves: &mut Vec<BlockId>,
) -> Result<(), NdbError> {
    let raw = read_internal_block(f, block_btree, bid)?;
    let mut cursor = raw.as_slice();
    let tree_header = read_data_tree_header(&mut cursor)?;
    let width = header.width();

    for _ in 0..tree_header.entry_count {
        let child = read_bid(&mut cursor, width)?;
        if tree_header.level == 1 {
            leaves.push(child);
        } else {
            expand_into_leaves(f, header, block_btree, child, leaves)?;
        }
    }

    Ok(())
}

/// Resolves a node's primary data [`BlockId`] into its ordered list of decoded data-leaf
/// buffers (C6): a single-element list for a data block, or, for an XBlock/XXBlock chain, one
/// element per leaf in pre-order. The Heap-on-Node layer (C7) needs these page boundaries
/// individually, since a HID's page number indexes one leaf, not a byte offset into the
/// concatenated stream.
#[instrument(skip(f, header, block_btree))]
pub fn read_node_leaves<R: Read + Seek>(
    f: &mut R,
    header: &Header,
    block_btree: &BlockBTree,
    bid: BlockId,
) -> Result<Vec<Vec<u8>>, NdbError> {
    if bid.is_zero() {
        return Ok(Vec::new());
    }

    if !bid.is_internal() {
        return Ok(vec![read_data_leaf(f, header, block_btree, bid)?]);
    }

    let entry = block_btree.resolve(f, bid)?;
    f.seek(SeekFrom::Start(entry.file_offset))?;
    let mut raw = vec![0_u8; entry.size as usize];
    f.read_exact(&mut raw)?;
    let mut cursor = raw.as_slice();
    let tree_header = read_data_tree_header(&mut cursor)?;
    let width = header.width();

    let mut leaf_bids = Vec::with_capacity(tree_header.entry_count as usize);
    for _ in 0..tree_header.entry_count {
        let child = read_bid(&mut cursor, width)?;
        if tree_header.level == 1 {
            leaf_bids.push(child);
        } else {
            expand_into_leaves(f, header, block_btree, child, &mut leaf_bids)?;
        }
    }

    let mut total = 0_u64;
    let mut leaves = Vec::with_capacity(leaf_bids.len());
    for leaf in leaf_bids {
        let bytes = read_data_leaf(f, header, block_btree, leaf)?;
        total += bytes.len() as u64;
        leaves.push(bytes);
    }

    if total != u64::from(tree_header.total_size) {
        return Err(NdbError::XBlockTotalSizeMismatch(
            tree_header.total_size,
            total as u32,
        ));
    }

    trace!(leaves = leaves.len(), total, "assembled logical node leaves");
    Ok(leaves)
}

/// Resolves a node's primary data [`BlockId`] into its full logical byte stream (C6): the
/// in-order concatenation of [`read_node_leaves`].
pub fn read_node_stream<R: Read + Seek>(
    f: &mut R,
    header: &Header,
    block_btree: &BlockBTree,
    bid: BlockId,
) -> Result<Vec<u8>, NdbError> {
    Ok(read_node_leaves(f, header, block_btree, bid)?
        .into_iter()
        .flatten()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndb::header::{RootRef, Variant};
    use crate::ndb::page::test_support::block_btree_over;
    use crate::ndb::page::BbtEntry;
    use std::io::Cursor;

    fn test_header(variant: Variant, crypt: NdbCryptMethod) -> Header {
        let root = RootRef::new(BlockId::from(0), 0);
        Header::for_test(variant, crypt, root, root)
    }

    fn bbt_entry(block_id: BlockId, file_offset: u64, size: u16) -> BbtEntry {
        BbtEntry {
            block_id,
            file_offset,
            size,
            ref_count: 1,
        }
    }

    /// Lays `regions` out back to back, then appends a real BBT leaf page describing their
    /// offsets, returning the full synthetic file and a [`BlockBTree`] pointed at that page.
    fn build_file(
        variant: Variant,
        regions: &[(BlockId, Vec<u8>)],
    ) -> (Cursor<Vec<u8>>, BlockBTree) {
        let mut file = Vec::new();
        let mut entries = Vec::new();
        for (bid, bytes) in regions {
            let offset = file.len() as u64;
            file.extend_from_slice(bytes);
            entries.push(bbt_entry(*bid, offset, bytes.len() as u16));
        }
        let root_offset = file.len() as u64;
        let (page, block_btree) = block_btree_over(variant, root_offset, &entries);
        file.extend_from_slice(&page);
        (Cursor::new(file), block_btree)
    }

    #[test]
    fn zero_bid_yields_empty_stream() {
        let header = test_header(Variant::Unicode, NdbCryptMethod::None);
        let (mut cursor, block_btree) = build_file(Variant::Unicode, &[]);
        let data = read_node_stream(&mut cursor, &header, &block_btree, BlockId::from(0)).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn reads_single_data_leaf() {
        let header = test_header(Variant::Unicode, NdbCryptMethod::None);
        let bid = BlockId::new(false, 1);
        let payload = b"hello world".to_vec();
        let (mut cursor, block_btree) =
            build_file(Variant::Unicode, &[(bid, payload.clone())]);

        let data = read_node_stream(&mut cursor, &header, &block_btree, bid).unwrap();
        assert_eq!(data, payload);
    }

    #[test]
    fn stitches_xblock_children() {
        let header = test_header(Variant::Unicode, NdbCryptMethod::None);
        let leaf_a = BlockId::new(false, 1);
        let leaf_b = BlockId::new(false, 2);
        let xblock_id = BlockId::new(true, 3);

        let data_a = b"0123456789".to_vec();
        let data_b = b"abcdefghij".to_vec();

        let mut xblock = Vec::new();
        xblock.push(0x01);
        xblock.push(1);
        xblock.extend_from_slice(&2u16.to_le_bytes());
        xblock.extend_from_slice(&((data_a.len() + data_b.len()) as u32).to_le_bytes());
        leaf_a.write(&mut xblock, Width::Bit64).unwrap();
        leaf_b.write(&mut xblock, Width::Bit64).unwrap();

        let (mut cursor, block_btree) = build_file(
            Variant::Unicode,
            &[
                (leaf_a, data_a.clone()),
                (leaf_b, data_b.clone()),
                (xblock_id, xblock),
            ],
        );

        let data = read_node_stream(&mut cursor, &header, &block_btree, xblock_id).unwrap();
        assert_eq!(data, [data_a, data_b].concat());
    }

    #[test]
    fn detects_xblock_total_size_mismatch() {
        let header = test_header(Variant::Unicode, NdbCryptMethod::None);
        let leaf_a = BlockId::new(false, 1);
        let xblock_id = BlockId::new(true, 2);
        let data_a = b"12345".to_vec();

        let mut xblock = Vec::new();
        xblock.push(0x01);
        xblock.push(1);
        xblock.extend_from_slice(&1u16.to_le_bytes());
        xblock.extend_from_slice(&999u32.to_le_bytes());
        leaf_a.write(&mut xblock, Width::Bit64).unwrap();

        let (mut cursor, block_btree) = build_file(
            Variant::Unicode,
            &[(leaf_a, data_a), (xblock_id, xblock)],
        );

        assert!(matches!(
            read_node_stream(&mut cursor, &header, &block_btree, xblock_id),
            Err(NdbError::XBlockTotalSizeMismatch(_, _))
        ));
    }
}

//! [Sub-node B-tree (SLBLOCK/SIBLOCK)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/3386c489-944f-4a8f-ba8c-f6ae14f09ad2)
//!
//! The secondary descriptor table hanging off an NBT entry's `subNodeBid` (C10). Structurally
//! similar to the XBlock/XXBlock data-tree (§4.6) but with its own entry shape and its own
//! `btype` (0x02, not 0x01), so it is read directly rather than through [`super::block`].

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::BTreeMap;
use std::io::{Read, Seek, SeekFrom};
use tracing::instrument;

use super::block_id::BlockId;
use super::header::Width;
use super::node_id::NodeId;
use super::page::BlockBTree;
use super::NdbError;

/// `{ localNodeId -> {dataBid, subNodeBid} }` (spec.md §3, §4.10).
#[derive(Copy, Clone, Debug)]
pub struct SubNodeEntry {
    pub data_bid: BlockId,
    pub sub_node_bid: BlockId,
}

/// A node's fully-parsed sub-node descriptor map, keyed by local [`NodeId`].
#[derive(Default, Debug)]
pub struct SubNodeMap(BTreeMap<u32, SubNodeEntry>);

impl SubNodeMap {
    pub fn get(&self, nid: NodeId) -> Option<SubNodeEntry> {
        self.0.get(&u32::from(nid)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[instrument(skip(f, block_btree))]
    pub fn open<R: Read + Seek>(
        f: &mut R,
        block_btree: &BlockBTree,
        width: Width,
        bid: BlockId,
    ) -> Result<Self, NdbError> {
        let mut map = BTreeMap::new();
        if !bid.is_zero() {
            read_block(f, block_btree, width, bid, &mut map)?;
        }
        Ok(Self(map))
    }
}

/// `SLENTRY`/`SIENTRY` share an 8-byte header: `{ btype=0x02, cLevel, cEnt(u16), padding(u32) }`.
struct BlockHeader {
    level: u8,
    entry_count: u16,
}

fn read_block_header(cursor: &mut &[u8]) -> Result<BlockHeader, NdbError> {
    let btype = cursor.read_u8()?;
    if btype != 0x02 {
        return Err(NdbError::InvalidDataTreeBlockType(btype));
    }
    let level = cursor.read_u8()?;
    if level > 1 {
        return Err(NdbError::InvalidDataTreeBlockLevel(level));
    }
    let entry_count = cursor.read_u16::<LittleEndian>()?;
    let _padding = cursor.read_u32::<LittleEndian>()?;
    Ok(BlockHeader { level, entry_count })
}

fn read_block<R: Read + Seek>(
    f: &mut R,
    block_btree: &BlockBTree,
    width: Width,
    bid: BlockId,
    out: &mut BTreeMap<u32, SubNodeEntry>,
) -> Result<(), NdbError> {
    let entry = block_btree.resolve(f, bid)?;
    f.seek(SeekFrom::Start(entry.file_offset))?;
    let mut raw = vec![0_u8; entry.size as usize];
    f.read_exact(&mut raw)?;
    let mut cursor = raw.as_slice();
    let header = read_block_header(&mut cursor)?;

    if header.level == 0 {
        // SLBLOCK: { nid, bidData, bidSub } per entry.
        for _ in 0..header.entry_count {
            let nid = NodeId::read(&mut cursor)?;
            if width == Width::Bit64 {
                let mut pad = [0_u8; 4];
                cursor.read_exact(&mut pad)?;
            }
            let data_bid = BlockId::read(&mut cursor, width)?;
            let sub_node_bid = BlockId::read(&mut cursor, width)?;
            out.insert(
                u32::from(nid),
                SubNodeEntry {
                    data_bid,
                    sub_node_bid,
                },
            );
        }
        return Ok(());
    }

    // SIBLOCK: { nid, bidSubNode } per entry, each child itself a sub-node block.
    let mut children = Vec::with_capacity(header.entry_count as usize);
    for _ in 0..header.entry_count {
        let _nid = NodeId::read(&mut cursor)?;
        if width == Width::Bit64 {
            let mut pad = [0_u8; 4];
            cursor.read_exact(&mut pad)?;
        }
        children.push(BlockId::read(&mut cursor, width)?);
    }
    for child in children {
        read_block(f, block_btree, width, child, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndb::header::Variant;
    use crate::ndb::node_id::NodeIdType;
    use crate::ndb::page::test_support::block_btree_over;
    use crate::ndb::page::BbtEntry;
    use std::io::Cursor;

    fn bbt_entry(block_id: BlockId, file_offset: u64, size: u16) -> BbtEntry {
        BbtEntry {
            block_id,
            file_offset,
            size,
            ref_count: 1,
        }
    }

    #[test]
    fn parses_single_level_sub_node_block() {
        let local_nid = NodeId::new(NodeIdType::Attachment, 1).unwrap();
        let data_bid = BlockId::new(false, 10);
        let sub_bid = BlockId::from(0);

        let mut block = Vec::new();
        block.push(0x02);
        block.push(0); // cLevel = 0 (SLBLOCK)
        block.extend_from_slice(&1u16.to_le_bytes());
        block.extend_from_slice(&0u32.to_le_bytes());
        local_nid.write(&mut block).unwrap();
        block.extend_from_slice(&0u32.to_le_bytes()); // padding (unicode width)
        data_bid.write(&mut block, Width::Bit64).unwrap();
        sub_bid.write(&mut block, Width::Bit64).unwrap();

        let block_bid = BlockId::new(false, 99);
        let mut file = block.clone();
        let root_offset = file.len() as u64;
        let (page, block_btree) = block_btree_over(
            Variant::Unicode,
            root_offset,
            &[bbt_entry(block_bid, 0, block.len() as u16)],
        );
        file.extend_from_slice(&page);
        let mut cursor = Cursor::new(file);

        let map = SubNodeMap::open(&mut cursor, &block_btree, Width::Bit64, block_bid).unwrap();
        let found = map.get(local_nid).unwrap();
        assert_eq!(found.data_bid, data_bid);
    }

    #[test]
    fn zero_bid_yields_empty_map() {
        let (page, block_btree) = block_btree_over(Variant::Unicode, 0, &[]);
        let mut cursor = Cursor::new(page);
        let map =
            SubNodeMap::open(&mut cursor, &block_btree, Width::Bit64, BlockId::from(0)).unwrap();
        assert!(map.is_empty());
    }
}

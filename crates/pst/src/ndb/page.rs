//! [B-tree pages (BTPAGE)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/844a5ebf-488a-45fd-8a3b-ac4efc3e4538)
//!
//! The Node B-Tree (NBT, "descriptor index") and Block B-Tree (BBT, "offset index") share a
//! page format; only the leaf entry shape differs. Both are implemented here as one generic
//! walker (C5) parameterized over a [`LeafEntry`].

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};
use tracing::{instrument, trace, warn};

use super::block_id::BlockId;
use super::header::{Header, RootRef, Variant, Width};
use super::node_id::NodeId;
use super::NdbError;

pub(crate) const PAGE_TYPE_BLOCK_BTREE: u8 = 0x80;
pub(crate) const PAGE_TYPE_NODE_BTREE: u8 = 0x81;

fn read_nid(f: &mut dyn Read, width: Width) -> std::io::Result<NodeId> {
    let value = match width {
        Width::Bit32 => f.read_u32::<LittleEndian>()?,
        Width::Bit64 => {
            let low = f.read_u32::<LittleEndian>()?;
            let _padding = f.read_u32::<LittleEndian>()?;
            low
        }
    };
    Ok(NodeId::from(value))
}

fn read_bid(f: &mut dyn Read, width: Width) -> std::io::Result<BlockId> {
    BlockId::read(f, width)
}

/// Trailer metadata common to every B-tree page, read at the tail of the page just before the
/// 12- or 16-byte [`PageTrailer`] (spec.md §4.5).
#[derive(Copy, Clone, Debug)]
struct BTreeMetadata {
    count: u16,
    max_count: u16,
    entry_size: u8,
    levels_to_leaf: u8,
}

impl BTreeMetadata {
    fn read(f: &mut dyn Read, variant: Variant) -> std::io::Result<Self> {
        match variant {
            Variant::Unicode4k => Ok(Self {
                count: f.read_u16::<LittleEndian>()?,
                max_count: f.read_u16::<LittleEndian>()?,
                entry_size: f.read_u8()?,
                levels_to_leaf: f.read_u8()?,
            }),
            Variant::Ansi | Variant::Unicode => Ok(Self {
                count: u16::from(f.read_u8()?),
                max_count: u16::from(f.read_u8()?),
                entry_size: f.read_u8()?,
                levels_to_leaf: f.read_u8()?,
            }),
        }
    }
}

/// The page trailer carried by every NDB page (`PAGETRAILER`). ANSI orders `crc` last; Unicode
/// and Unicode-4K order it before the block id.
#[derive(Copy, Clone, Debug)]
struct PageTrailer {
    page_type: u8,
    #[allow(dead_code)]
    signature: u16,
    #[allow(dead_code)]
    crc: u32,
    block_id: BlockId,
}

impl PageTrailer {
    fn read(f: &mut dyn Read, variant: Variant) -> Result<Self, NdbError> {
        Ok(match variant.width() {
            Width::Bit32 => {
                let page_type = f.read_u8()?;
                let page_type_repeat = f.read_u8()?;
                if page_type != page_type_repeat {
                    return Err(NdbError::MismatchPageTypeRepeat(page_type, page_type_repeat));
                }
                let signature = f.read_u16::<LittleEndian>()?;
                let block_id = read_bid(f, Width::Bit32)?;
                let crc = f.read_u32::<LittleEndian>()?;
                Self {
                    page_type,
                    signature,
                    crc,
                    block_id,
                }
            }
            Width::Bit64 => {
                let page_type = f.read_u8()?;
                let page_type_repeat = f.read_u8()?;
                if page_type != page_type_repeat {
                    return Err(NdbError::MismatchPageTypeRepeat(page_type, page_type_repeat));
                }
                let signature = f.read_u16::<LittleEndian>()?;
                let crc = f.read_u32::<LittleEndian>()?;
                let block_id = read_bid(f, Width::Bit64)?;
                Self {
                    page_type,
                    signature,
                    crc,
                    block_id,
                }
            }
        })
    }
}

/// A key-ordered leaf record stored in a B-tree page: either an NBT descriptor or a BBT
/// offset-index entry.
pub trait LeafEntry: Copy {
    const ANSI_SIZE: usize;
    const UNICODE_SIZE: usize;

    fn key(&self) -> u64;
    fn read(buffer: &[u8], width: Width) -> Self;
    #[cfg(test)]
    fn write(&self, buf: &mut Vec<u8>, width: Width);
}

/// `{ descriptorId, dataBid, subNodeBid, parentId }` (spec.md §3).
#[derive(Copy, Clone, Debug)]
pub struct NbtEntry {
    pub node_id: NodeId,
    pub data_bid: BlockId,
    pub sub_node_bid: BlockId,
    pub parent_id: NodeId,
}

impl LeafEntry for NbtEntry {
    const ANSI_SIZE: usize = 16;
    const UNICODE_SIZE: usize = 32;

    fn key(&self) -> u64 {
        u64::from(u32::from(self.node_id))
    }

    fn read(buffer: &[u8], width: Width) -> Self {
        let mut cursor = buffer;
        let node_id = read_nid(&mut cursor, width).expect("buffer pre-sized");
        let data_bid = read_bid(&mut cursor, width).expect("buffer pre-sized");
        let sub_node_bid = read_bid(&mut cursor, width).expect("buffer pre-sized");
        let parent_id = read_nid(&mut cursor, width).expect("buffer pre-sized");
        Self {
            node_id,
            data_bid,
            sub_node_bid,
            parent_id,
        }
    }

    #[cfg(test)]
    fn write(&self, buf: &mut Vec<u8>, width: Width) {
        self.node_id.write(buf).unwrap();
        if width == Width::Bit64 {
            buf.extend_from_slice(&[0u8; 4]);
        }
        self.data_bid.write(buf, width).unwrap();
        self.sub_node_bid.write(buf, width).unwrap();
        self.parent_id.write(buf).unwrap();
        if width == Width::Bit64 {
            buf.extend_from_slice(&[0u8; 4]);
        }
    }
}

/// `{ bid, fileOffset, size, refCount }` (spec.md §3).
#[derive(Copy, Clone, Debug)]
pub struct BbtEntry {
    pub block_id: BlockId,
    pub file_offset: u64,
    pub size: u16,
    pub ref_count: u16,
}

impl LeafEntry for BbtEntry {
    const ANSI_SIZE: usize = 12;
    const UNICODE_SIZE: usize = 24;

    fn key(&self) -> u64 {
        u64::from(self.block_id)
    }

    fn read(buffer: &[u8], width: Width) -> Self {
        let mut cursor = buffer;
        let block_id = read_bid(&mut cursor, width).expect("buffer pre-sized");
        let file_offset = match width {
            Width::Bit32 => u64::from(cursor.read_u32::<LittleEndian>().unwrap()),
            Width::Bit64 => cursor.read_u64::<LittleEndian>().unwrap(),
        };
        let size = cursor.read_u16::<LittleEndian>().unwrap();
        let ref_count = cursor.read_u16::<LittleEndian>().unwrap();
        Self {
            block_id,
            file_offset,
            size,
            ref_count,
        }
    }

    #[cfg(test)]
    fn write(&self, buf: &mut Vec<u8>, width: Width) {
        self.block_id.write(buf, width).unwrap();
        match width {
            Width::Bit32 => buf.extend_from_slice(&(self.file_offset as u32).to_le_bytes()),
            Width::Bit64 => buf.extend_from_slice(&self.file_offset.to_le_bytes()),
        }
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf.extend_from_slice(&self.ref_count.to_le_bytes());
        if width == Width::Bit64 {
            buf.extend_from_slice(&[0u8; 4]);
        }
    }
}

/// A non-leaf entry: `{ key, child page BREF }` (spec.md §4.5).
#[derive(Copy, Clone, Debug)]
struct BranchEntry {
    key: u64,
    child_block_id: BlockId,
    child_offset: u64,
}

impl BranchEntry {
    const ANSI_SIZE: usize = 12;
    const UNICODE_SIZE: usize = 24;

    fn size(width: Width) -> usize {
        match width {
            Width::Bit32 => Self::ANSI_SIZE,
            Width::Bit64 => Self::UNICODE_SIZE,
        }
    }

    fn read(buffer: &[u8], width: Width) -> Self {
        let mut cursor = buffer;
        let key = match width {
            Width::Bit32 => u64::from(cursor.read_u32::<LittleEndian>().unwrap()),
            Width::Bit64 => cursor.read_u64::<LittleEndian>().unwrap(),
        };
        let child_block_id = read_bid(&mut cursor, width).unwrap();
        let child_offset = match width {
            Width::Bit32 => u64::from(cursor.read_u32::<LittleEndian>().unwrap()),
            Width::Bit64 => cursor.read_u64::<LittleEndian>().unwrap(),
        };
        Self {
            key,
            child_block_id,
            child_offset,
        }
    }
}

pub(crate) fn leaf_entry_size<E: LeafEntry>(width: Width) -> usize {
    match width {
        Width::Bit32 => E::ANSI_SIZE,
        Width::Bit64 => E::UNICODE_SIZE,
    }
}

/// Size of the non-entries tail of a page, between the entries region and the trailer: the
/// `BTreeMetadata` fields themselves, plus any trailing `dwPadding` the on-disk layout inserts
/// before the trailer. The Unicode BTPAGE carries 4 bytes of `dwPadding` after the 4-byte
/// metadata block (spec.md §4.5: "Unicode: payload 488 bytes + metadata at 488"; the teacher's
/// `UNICODE_BTREE_ENTRIES_SIZE = 488` implies the same 8-byte tail with a 512-byte page and
/// 16-byte trailer).
pub(crate) fn metadata_size(variant: Variant) -> usize {
    match variant {
        Variant::Ansi => 4,
        Variant::Unicode => 8,
        Variant::Unicode4k => 8,
    }
}

pub(crate) fn trailer_size(width: Width) -> usize {
    match width {
        Width::Bit32 => 12,
        Width::Bit64 => 16,
    }
}

/// Read one page at `offset`, returning its metadata, trailer, and the raw entries region.
fn read_page<R: Read + Seek>(
    f: &mut R,
    variant: Variant,
    offset: u64,
    expected_page_type: u8,
) -> Result<(BTreeMetadata, PageTrailer, Vec<u8>), NdbError> {
    f.seek(SeekFrom::Start(offset))?;
    let page_size = variant.page_size();
    let mut page = vec![0_u8; page_size];
    f.read_exact(&mut page)?;

    let trailer_len = trailer_size(variant.width());
    let meta_len = metadata_size(variant);
    let entries_len = page_size - trailer_len - meta_len;

    let entries = page[0..entries_len].to_vec();
    let mut meta_cursor = &page[entries_len..entries_len + meta_len];
    let metadata = BTreeMetadata::read(&mut meta_cursor, variant)?;

    let mut trailer_cursor = &page[entries_len + meta_len..];
    let trailer = PageTrailer::read(&mut trailer_cursor, variant)?;
    if trailer.page_type != expected_page_type {
        return Err(NdbError::InvalidPageType(trailer.page_type));
    }

    if metadata.count > metadata.max_count {
        return Err(NdbError::InvalidBTreeEntryCount(
            metadata.count,
            metadata.max_count,
        ));
    }

    trace!(
        offset,
        count = metadata.count,
        levels_to_leaf = metadata.levels_to_leaf,
        "read B-tree page"
    );

    Ok((metadata, trailer, entries))
}

/// Walks one of the two NDB B-trees: lookup by key, and full in-order traversal.
pub struct BTree<E: LeafEntry> {
    variant: Variant,
    root: RootRef,
    page_type: u8,
    _marker: std::marker::PhantomData<E>,
}

impl<E: LeafEntry> BTree<E> {
    fn new(variant: Variant, root: RootRef, page_type: u8) -> Self {
        Self {
            variant,
            root,
            page_type,
            _marker: std::marker::PhantomData,
        }
    }

    /// Recursive lookup (spec.md §4.5): descend through branch pages choosing the last entry
    /// whose key is `<=` the target, then linear-scan the leaf.
    #[instrument(skip(self, f), fields(key))]
    pub fn find_entry<R: Read + Seek>(&self, f: &mut R, key: u64) -> Result<E, NdbError> {
        self.find_entry_at(f, self.root.file_offset(), key)
    }

    fn find_entry_at<R: Read + Seek>(
        &self,
        f: &mut R,
        offset: u64,
        key: u64,
    ) -> Result<E, NdbError> {
        let (metadata, _trailer, entries) = read_page(f, self.variant, offset, self.page_type)?;
        let width = self.variant.width();

        if metadata.levels_to_leaf == 0 {
            let entry_size = leaf_entry_size::<E>(width);
            for i in 0..metadata.count as usize {
                let raw = &entries[i * entry_size..(i + 1) * entry_size];
                let entry = E::read(raw, width);
                if entry.key() == key {
                    return Ok(entry);
                }
            }
            return Err(NdbError::BTreeKeyNotFound(key));
        }

        let branch_size = BranchEntry::size(width);
        let mut chosen: Option<BranchEntry> = None;
        for i in 0..metadata.count as usize {
            let raw = &entries[i * branch_size..(i + 1) * branch_size];
            let branch = BranchEntry::read(raw, width);
            if branch.key <= key {
                chosen = Some(branch);
            } else {
                break;
            }
        }
        let chosen = chosen.ok_or(NdbError::BTreeKeyNotFound(key))?;
        self.find_entry_at(f, chosen.child_offset, key)
    }

    /// Full traversal, used to build the NBT-fallback `parent -> children` map (spec.md §4.5).
    pub fn all_entries<R: Read + Seek>(&self, f: &mut R) -> Result<Vec<E>, NdbError> {
        let mut out = Vec::new();
        self.collect_entries(f, self.root.file_offset(), &mut out)?;
        Ok(out)
    }

    fn collect_entries<R: Read + Seek>(
        &self,
        f: &mut R,
        offset: u64,
        out: &mut Vec<E>,
    ) -> Result<(), NdbError> {
        let (metadata, _trailer, entries) = read_page(f, self.variant, offset, self.page_type)?;
        let width = self.variant.width();

        if metadata.levels_to_leaf == 0 {
            let entry_size = leaf_entry_size::<E>(width);
            for i in 0..metadata.count as usize {
                let raw = &entries[i * entry_size..(i + 1) * entry_size];
                out.push(E::read(raw, width));
            }
            return Ok(());
        }

        let branch_size = BranchEntry::size(width);
        for i in 0..metadata.count as usize {
            let raw = &entries[i * branch_size..(i + 1) * branch_size];
            let branch = BranchEntry::read(raw, width);
            self.collect_entries(f, branch.child_offset, out)?;
        }
        Ok(())
    }
}

pub type NodeBTree = BTree<NbtEntry>;
pub type BlockBTree = BTree<BbtEntry>;

impl NodeBTree {
    pub fn open(header: &Header) -> Self {
        Self::new(
            header.variant(),
            header.node_btree_root(),
            PAGE_TYPE_NODE_BTREE,
        )
    }
}

impl BlockBTree {
    pub fn open(header: &Header) -> Self {
        Self::new(
            header.variant(),
            header.block_btree_root(),
            PAGE_TYPE_BLOCK_BTREE,
        )
    }

    /// Convenience: resolve a [`BlockId`] straight to its `{fileOffset, size}` pair.
    pub fn resolve<R: Read + Seek>(
        &self,
        f: &mut R,
        block_id: BlockId,
    ) -> Result<BbtEntry, NdbError> {
        self.find_entry(f, u64::from(block_id))
            .map_err(|_| NdbError::BlockNotFound(block_id))
    }
}

/// Builds the `parentNid -> [childNid]` fallback map from a full NBT traversal, silently
/// skipping duplicate or self-parenting entries (spec.md §4.5, §4.13).
pub fn build_parent_child_map<R: Read + Seek>(
    tree: &NodeBTree,
    f: &mut R,
) -> Result<std::collections::BTreeMap<u32, Vec<NodeId>>, NdbError> {
    let mut map: std::collections::BTreeMap<u32, Vec<NodeId>> = std::collections::BTreeMap::new();
    let mut seen = std::collections::BTreeSet::new();

    for entry in tree.all_entries(f)? {
        let child = u32::from(entry.node_id);
        let parent = u32::from(entry.parent_id);

        if child == parent {
            warn!(child, "skipping self-parenting NBT entry");
            continue;
        }
        if !seen.insert(child) {
            warn!(child, "skipping duplicate NBT entry");
            continue;
        }

        map.entry(parent).or_default().push(entry.node_id);
    }

    Ok(map)
}

/// Test-only page-building support shared across NDB test modules: building a real, byte-exact
/// leaf page (and a [`BTree`] pointed at it) is more honest than faking the lookup layer.
#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn write_trailer(
        buf: &mut Vec<u8>,
        variant: Variant,
        page_type: u8,
        block_id: BlockId,
    ) {
        match variant.width() {
            Width::Bit32 => {
                buf.push(page_type);
                buf.push(page_type);
                buf.extend_from_slice(&0u16.to_le_bytes());
                block_id.write(buf, Width::Bit32).unwrap();
                buf.extend_from_slice(&0u32.to_le_bytes());
            }
            Width::Bit64 => {
                buf.push(page_type);
                buf.push(page_type);
                buf.extend_from_slice(&0u16.to_le_bytes());
                buf.extend_from_slice(&0u32.to_le_bytes());
                block_id.write(buf, Width::Bit64).unwrap();
            }
        }
    }

    /// Builds a single-level (leaf-only) page of the given variant containing `entries`.
    pub(crate) fn build_leaf_page<E: LeafEntry>(
        variant: Variant,
        page_type: u8,
        entries: &[E],
    ) -> Vec<u8> {
        let width = variant.width();
        let page_size = variant.page_size();
        let mut page = Vec::new();

        for entry in entries {
            entry.write(&mut page, width);
        }

        let entries_region = page_size - trailer_size(width) - metadata_size(variant);
        page.resize(entries_region, 0);

        match variant {
            Variant::Unicode4k => {
                page.extend_from_slice(&(entries.len() as u16).to_le_bytes());
                page.extend_from_slice(&(entries.len() as u16).to_le_bytes());
                page.push(leaf_entry_size::<E>(width) as u8);
                page.push(0); // levels_to_leaf = 0 (leaf page)
            }
            Variant::Ansi => {
                page.push(entries.len() as u8);
                page.push(entries.len() as u8);
                page.push(leaf_entry_size::<E>(width) as u8);
                page.push(0); // levels_to_leaf = 0 (leaf page)
            }
            Variant::Unicode => {
                page.push(entries.len() as u8);
                page.push(entries.len() as u8);
                page.push(leaf_entry_size::<E>(width) as u8);
                page.push(0); // levels_to_leaf = 0 (leaf page)
                page.extend_from_slice(&0u32.to_le_bytes()); // dwPadding
            }
        }

        write_trailer(&mut page, variant, page_type, BlockId::from(0));
        assert_eq!(page.len(), page_size);
        page
    }

    /// Builds a [`BlockBTree`] whose single leaf page (embedded at `root_offset` in the caller's
    /// synthetic file) lists `entries`.
    pub(crate) fn block_btree_over(
        variant: Variant,
        root_offset: u64,
        entries: &[BbtEntry],
    ) -> (Vec<u8>, BlockBTree) {
        let page = build_leaf_page(variant, PAGE_TYPE_BLOCK_BTREE, entries);
        let root = RootRef::new(BlockId::from(0), root_offset);
        (page, BTree::new(variant, root, PAGE_TYPE_BLOCK_BTREE))
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::build_leaf_page;
    use super::*;
    use crate::ndb::node_id::NodeIdType;
    use std::io::Cursor;

    /// Builds a single-level (leaf-only) Unicode NBT page containing the given entries.
    fn build_leaf_nbt_page(entries: &[NbtEntry]) -> Vec<u8> {
        build_leaf_page(Variant::Unicode, PAGE_TYPE_NODE_BTREE, entries)
    }

    #[test]
    fn finds_leaf_entry_by_key() {
        let target = NbtEntry {
            node_id: NodeId::new(NodeIdType::NormalFolder, 42).unwrap(),
            data_bid: BlockId::new(false, 5),
            sub_node_bid: BlockId::from(0),
            parent_id: NodeId::new(NodeIdType::NormalFolder, 1).unwrap(),
        };
        let other = NbtEntry {
            node_id: NodeId::new(NodeIdType::NormalFolder, 7).unwrap(),
            data_bid: BlockId::new(false, 9),
            sub_node_bid: BlockId::from(0),
            parent_id: NodeId::new(NodeIdType::NormalFolder, 1).unwrap(),
        };
        let page = build_leaf_nbt_page(&[other, target]);
        let mut cursor = Cursor::new(page);

        let root = RootRef::new(BlockId::from(0), 0);
        let tree = NodeBTree::new(Variant::Unicode, root, PAGE_TYPE_NODE_BTREE);

        let found = tree.find_entry(&mut cursor, target.key()).unwrap();
        assert_eq!(u32::from(found.node_id), u32::from(target.node_id));

        let all = tree.all_entries(&mut cursor).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn missing_key_is_not_found() {
        let entry = NbtEntry {
            node_id: NodeId::new(NodeIdType::NormalFolder, 42).unwrap(),
            data_bid: BlockId::new(false, 5),
            sub_node_bid: BlockId::from(0),
            parent_id: NodeId::new(NodeIdType::NormalFolder, 1).unwrap(),
        };
        let page = build_leaf_nbt_page(&[entry]);
        let mut cursor = Cursor::new(page);
        let root = RootRef::new(BlockId::from(0), 0);
        let tree = NodeBTree::new(Variant::Unicode, root, PAGE_TYPE_NODE_BTREE);

        assert!(matches!(
            tree.find_entry(&mut cursor, 0xDEAD),
            Err(NdbError::BTreeKeyNotFound(_))
        ));
    }

    #[test]
    fn parent_child_map_skips_self_parent_and_duplicates() {
        let folder = NodeId::new(NodeIdType::NormalFolder, 42).unwrap();
        let self_parented = NbtEntry {
            node_id: folder,
            data_bid: BlockId::new(false, 5),
            sub_node_bid: BlockId::from(0),
            parent_id: folder,
        };
        let page = build_leaf_nbt_page(&[self_parented]);
        let mut cursor = Cursor::new(page);
        let root = RootRef::new(BlockId::from(0), 0);
        let tree = NodeBTree::new(Variant::Unicode, root, PAGE_TYPE_NODE_BTREE);

        let map = build_parent_child_map(&tree, &mut cursor).unwrap();
        assert!(map.values().all(|children| children.is_empty()));
    }
}

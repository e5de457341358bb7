//! [HN (Heap-on-Node)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/77ce49a3-3772-4d8d-bb2c-2f7520a238a6)
//!
//! A node's data stream, divided into pages (one page per underlying data leaf). Page 0 opens
//! with a header declaring the heap's "user root" [`HeapId`]; every page ends with a page map
//! of allocation offsets that a [`HeapId`] indexes into (C7).

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek};
use tracing::instrument;

use super::{LtpError, LtpResult};
use crate::ndb::block::read_node_leaves;
use crate::ndb::block_id::BlockId;
use crate::ndb::header::Header as NdbHeader;
use crate::ndb::node_id::{NodeId, NodeIdType};
use crate::ndb::page::BlockBTree;

/// A Heap Id (HID): `{ index, pageNumber }`, packed the same way a sub-node id is (low 5 bits
/// `NID_TYPE_HID`, next 11 bits the in-page allocation index, remaining bits the page number).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct HeapId(u32);

impl HeapId {
    /// `index` is the raw on-disk `hidIndex` (1-based; 0 is reserved and rejected), matching
    /// the bits [`Self::from_u32`] parses unmodified.
    pub fn new(index: u16, page_number: u16) -> LtpResult<Self> {
        if index == 0 || index > 0x7FF {
            return Err(LtpError::NotAHeapId(index as u32));
        }
        let node_index = (u32::from(page_number) << 11) | u32::from(index);
        let value = (node_index << 5) | (NodeIdType::HeapNode as u32);
        Ok(Self(value))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// The 0-based position into a page's `rgibAlloc` allocation list. The on-disk `hidIndex`
    /// is 1-based (`[rgibAlloc[index-1]..rgibAlloc[index])`, spec.md §4.7); index 0 never names
    /// an allocation.
    pub fn index(&self) -> LtpResult<u16> {
        let raw = (self.0 >> 5) & 0x7FF;
        if raw == 0 {
            return Err(LtpError::NotAHeapId(self.0));
        }
        Ok((raw - 1) as u16)
    }

    pub fn page_number(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn from_u32(value: u32) -> LtpResult<Self> {
        let node_id = NodeId::from(value);
        match node_id.id_type() {
            Ok(NodeIdType::HeapNode) => Ok(Self(value)),
            _ => Err(LtpError::NotAHeapId(value)),
        }
    }
}

impl From<HeapId> for u32 {
    fn from(value: HeapId) -> Self {
        value.0
    }
}

/// `bClientSig` (`HNHDR`/`bType` in the generic BTH/PC/TC headers share this byte).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum HeapClientSignature {
    /// `bTypeTC`
    Table,
    /// `bTypeBTH`
    Tree,
    /// `bTypePC`
    Properties,
    Other(u8),
}

impl From<u8> for HeapClientSignature {
    fn from(value: u8) -> Self {
        match value {
            0x7C => Self::Table,
            0xB5 => Self::Tree,
            0xBC => Self::Properties,
            other => Self::Other(other),
        }
    }
}

struct HeapNodeHeader {
    page_map_offset: u16,
    client_signature: HeapClientSignature,
    user_root: HeapId,
}

impl HeapNodeHeader {
    fn read(buffer: &[u8]) -> LtpResult<Self> {
        let mut cursor = buffer;
        let page_map_offset = cursor.read_u16::<LittleEndian>()?;
        let signature = cursor.read_u8()?;
        if signature != 0xEC {
            return Err(LtpError::InvalidHeapSignature(signature));
        }
        let client_signature = HeapClientSignature::from(cursor.read_u8()?);
        let user_root = HeapId::from_u32(cursor.read_u32::<LittleEndian>()?)?;
        Ok(Self {
            page_map_offset,
            client_signature,
            user_root,
        })
    }
}

/// `{ cAlloc, cFree, rgibAlloc[cAlloc+1] }`: offsets into the page delimiting allocations.
fn read_page_map(page: &[u8], page_map_offset: u16) -> LtpResult<Vec<(usize, usize)>> {
    let mut cursor = &page[page_map_offset as usize..];
    let alloc_count = cursor.read_u16::<LittleEndian>()?;
    let _free_count = cursor.read_u16::<LittleEndian>()?;

    let mut offsets = Vec::with_capacity(alloc_count as usize + 1);
    for _ in 0..=alloc_count {
        offsets.push(cursor.read_u16::<LittleEndian>()? as usize);
    }

    Ok(offsets.windows(2).map(|w| (w[0], w[1])).collect())
}

/// A decoded Heap-on-Node: one page per underlying data leaf, plus the page-0 header.
pub struct Heap {
    pages: Vec<Vec<u8>>,
    header: HeapNodeHeader,
}

impl Heap {
    #[instrument(skip(f, ndb_header, block_btree))]
    pub fn open<R: Read + Seek>(
        f: &mut R,
        ndb_header: &NdbHeader,
        block_btree: &BlockBTree,
        bid: BlockId,
    ) -> LtpResult<Self> {
        let pages = read_node_leaves(f, ndb_header, block_btree, bid)?;
        let first = pages
            .first()
            .ok_or_else(|| LtpError::HeapPageNotFound(NodeId::from(0), 0, 0))?;
        let header = HeapNodeHeader::read(first)?;
        Ok(Self { pages, header })
    }

    pub fn client_signature(&self) -> HeapClientSignature {
        self.header.client_signature
    }

    pub fn user_root(&self) -> HeapId {
        self.header.user_root
    }

    /// Resolves a [`HeapId`] to the byte range it names (spec.md §4.7).
    pub fn resolve(&self, hid: HeapId) -> LtpResult<&[u8]> {
        let page_number = hid.page_number() as usize;
        let page = self.pages.get(page_number).ok_or_else(|| {
            LtpError::HeapPageNotFound(NodeId::from(u32::from(hid)), hid.page_number(), self.pages.len())
        })?;

        let page_map_offset = if page_number == 0 {
            self.header.page_map_offset
        } else {
            let mut cursor = &page[0..2];
            cursor.read_u16::<LittleEndian>()?
        };

        let allocations = read_page_map(page, page_map_offset)?;
        let index = hid.index()? as usize;
        let (start, end) = allocations.get(index).copied().ok_or_else(|| {
            LtpError::HeapAllocNotFound(NodeId::from(u32::from(hid)), index as u16, allocations.len())
        })?;

        Ok(&page[start..end])
    }

    #[cfg(test)]
    pub(crate) fn from_single_page_for_test(
        page: Vec<u8>,
        client_signature: HeapClientSignature,
    ) -> Self {
        let header = HeapNodeHeader::read(&page).expect("test page is well-formed");
        assert_eq!(header.client_signature, client_signature);
        Self {
            pages: vec![page],
            header,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_page(entries: &[&[u8]], client_sig: u8) -> Vec<u8> {
        let mut page = Vec::new();
        page.extend_from_slice(&[0u8, 0u8]); // placeholder for page_map_offset
        page.push(0xEC);
        page.push(client_sig);
        page.extend_from_slice(&0u32.to_le_bytes()); // placeholder user_root, fixed below

        let mut offsets = vec![page.len() as u16];
        for entry in entries {
            page.extend_from_slice(entry);
            offsets.push(page.len() as u16);
        }

        let page_map_offset = page.len() as u16;
        page.extend_from_slice(&((offsets.len() - 1) as u16).to_le_bytes());
        page.extend_from_slice(&0u16.to_le_bytes());
        for offset in &offsets {
            page.extend_from_slice(&offset.to_le_bytes());
        }

        page[0..2].copy_from_slice(&page_map_offset.to_le_bytes());
        page
    }

    #[test]
    fn resolves_heap_id_to_entry_bytes() {
        let entry_a = b"alpha".as_slice();
        let entry_b = b"beta!!".as_slice();
        let mut page = build_page(&[entry_a, entry_b], 0xBC);
        let root_hid = HeapId::new(1, 0).unwrap();
        page[4..8].copy_from_slice(&u32::from(root_hid).to_le_bytes());

        let header = HeapNodeHeader::read(&page).unwrap();
        assert_eq!(header.client_signature, HeapClientSignature::Properties);

        let heap = Heap {
            pages: vec![page],
            header,
        };

        let first = heap.resolve(HeapId::new(1, 0).unwrap()).unwrap();
        assert_eq!(first, entry_a);
        let second = heap.resolve(HeapId::new(2, 0).unwrap()).unwrap();
        assert_eq!(second, entry_b);
    }

    #[test]
    fn rejects_on_disk_index_zero() {
        assert!(matches!(HeapId::new(0, 0), Err(LtpError::NotAHeapId(_))));
    }

    #[test]
    fn rejects_non_heap_node_id() {
        let foreign = (42_u32 << 5) | NodeIdType::NormalFolder as u32;
        assert!(matches!(
            HeapId::from_u32(foreign),
            Err(LtpError::NotAHeapId(_))
        ));
    }
}

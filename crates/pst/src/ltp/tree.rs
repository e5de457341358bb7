//! [BTree-on-Heap (BTH)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/2dd1a95a-c8b1-4ac5-87d1-10cb8de64053)
//!
//! A B-tree stored inside a [`Heap`], used by the PC and TC tables to map a fixed-size key to
//! a fixed-size value. The lookup algorithm mirrors the NBT/BBT walker (spec.md §4.5): descend
//! choosing the last intermediate entry whose key is `<=` the target, linear-scan the leaf.

use byteorder::{ByteOrder, LittleEndian};

use super::heap::{Heap, HeapId};
use super::{LtpError, LtpResult};

/// `BTHHEADER`: `{ bType=0xB5, cbKey, cbEnt, cLevels, hidRoot }`.
#[derive(Copy, Clone, Debug)]
pub struct HeapTreeHeader {
    key_size: u8,
    entry_size: u8,
    levels: u8,
    root: HeapId,
}

impl HeapTreeHeader {
    fn read(buffer: &[u8]) -> LtpResult<Self> {
        let key_size = buffer[1];
        if !matches!(key_size, 2 | 4 | 8) {
            return Err(LtpError::InvalidBthKeySize(key_size));
        }
        let entry_size = buffer[2];
        if entry_size == 0 {
            return Err(LtpError::InvalidBthEntrySize(entry_size));
        }
        let levels = buffer[3];
        let root = HeapId::from_u32(LittleEndian::read_u32(&buffer[4..8]))?;
        Ok(Self {
            key_size,
            entry_size,
            levels,
            root,
        })
    }

    pub fn entry_size(&self) -> u8 {
        self.entry_size
    }
}

fn read_key(buffer: &[u8], key_size: u8) -> u64 {
    match key_size {
        2 => u64::from(LittleEndian::read_u16(buffer)),
        4 => u64::from(LittleEndian::read_u32(buffer)),
        8 => LittleEndian::read_u64(buffer),
        _ => unreachable!("validated in HeapTreeHeader::read"),
    }
}

/// A BTH view over a [`Heap`]: point lookup by key, and full in-key-order traversal.
pub struct HeapTree<'a> {
    heap: &'a Heap,
    header: HeapTreeHeader,
}

impl<'a> HeapTree<'a> {
    /// Opens the BTH whose header lives at `root_hid` (the PC/TC `hidRoot`/`hidRowIndex`).
    pub fn open(heap: &'a Heap, root_hid: HeapId) -> LtpResult<Self> {
        let buffer = heap.resolve(root_hid)?;
        let header = HeapTreeHeader::read(buffer)?;
        Ok(Self { heap, header })
    }

    pub fn entry_size(&self) -> u8 {
        self.header.entry_size
    }

    pub fn find(&self, key: u64) -> LtpResult<Option<&'a [u8]>> {
        self.find_at(self.header.root, key, self.header.levels)
    }

    fn find_at(&self, hid: HeapId, key: u64, level: u8) -> LtpResult<Option<&'a [u8]>> {
        let buffer = self.heap.resolve(hid)?;
        let key_size = self.header.key_size as usize;

        if level == 0 {
            let stride = key_size + self.header.entry_size as usize;
            if stride == 0 {
                return Ok(None);
            }
            for record in buffer.chunks_exact(stride) {
                if read_key(&record[..key_size], self.header.key_size) == key {
                    return Ok(Some(&record[key_size..]));
                }
            }
            return Ok(None);
        }

        let stride = key_size + 4;
        let mut chosen: Option<HeapId> = None;
        for record in buffer.chunks_exact(stride) {
            if read_key(&record[..key_size], self.header.key_size) <= key {
                chosen = Some(HeapId::from_u32(LittleEndian::read_u32(
                    &record[key_size..key_size + 4],
                ))?);
            } else {
                break;
            }
        }
        match chosen {
            Some(next) => self.find_at(next, key, level - 1),
            None => Ok(None),
        }
    }

    /// Every leaf entry's `{key-bytes, value-bytes}`, in ascending key order.
    pub fn all_entries(&self) -> LtpResult<Vec<&'a [u8]>> {
        let mut out = Vec::new();
        self.collect_at(self.header.root, self.header.levels, &mut out)?;
        Ok(out)
    }

    fn collect_at(&self, hid: HeapId, level: u8, out: &mut Vec<&'a [u8]>) -> LtpResult<()> {
        let buffer = self.heap.resolve(hid)?;
        let key_size = self.header.key_size as usize;

        if level == 0 {
            let stride = key_size + self.header.entry_size as usize;
            if stride == 0 {
                return Ok(());
            }
            for record in buffer.chunks_exact(stride) {
                out.push(record);
            }
            return Ok(());
        }

        let stride = key_size + 4;
        for record in buffer.chunks_exact(stride) {
            let next = HeapId::from_u32(LittleEndian::read_u32(&record[key_size..key_size + 4]))?;
            self.collect_at(next, level - 1, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ltp::heap::HeapClientSignature;

    fn leaf_entry(key: u16, value: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&key.to_le_bytes());
        buf.extend_from_slice(&value.to_le_bytes());
        buf
    }

    fn build_heap_with_bth(entries: &[(u16, u32)]) -> Heap {
        let mut page = vec![0u8; 8]; // HN page-0 header placeholder region
        page[2] = 0xEC;
        page[3] = 0xBC;

        let bth_header_offset = page.len();
        page.push(0xB5); // bType
        page.push(2); // cbKey
        page.push(4); // cbEnt (value size only; leaf record = cbKey + cbEnt bytes)
        page.push(0); // cLevels = 0 (single leaf page)
        let root_offset = page.len();
        page.extend_from_slice(&0u32.to_le_bytes()); // hidRoot placeholder

        let leaf_offset = page.len();
        for &(key, value) in entries {
            page.extend_from_slice(&leaf_entry(key, value));
        }

        let page_map_offset = page.len();
        let offsets = [bth_header_offset, leaf_offset, page_map_offset];
        page.extend_from_slice(&(offsets.len() as u16 - 1).to_le_bytes());
        page.extend_from_slice(&0u16.to_le_bytes());
        for off in offsets {
            page.extend_from_slice(&(off as u16).to_le_bytes());
        }

        let root_hid = HeapId::new(2, 0).unwrap();
        page[root_offset..root_offset + 4].copy_from_slice(&u32::from(root_hid).to_le_bytes());
        let user_root_hid = HeapId::new(1, 0).unwrap();
        page[4..8].copy_from_slice(&u32::from(user_root_hid).to_le_bytes());

        let page_map_offset_bytes = (page_map_offset as u16).to_le_bytes();
        page[0..2].copy_from_slice(&page_map_offset_bytes);

        Heap::from_single_page_for_test(page, HeapClientSignature::Properties)
    }

    #[test]
    fn finds_and_lists_leaf_entries() {
        let heap = build_heap_with_bth(&[(10, 100), (20, 200), (30, 300)]);
        let tree = HeapTree::open(&heap, heap.user_root()).unwrap();

        let found = tree.find(20).unwrap().unwrap();
        assert_eq!(LittleEndian::read_u32(found), 200);

        assert!(tree.find(99).unwrap().is_none());

        let all = tree.all_entries().unwrap();
        assert_eq!(all.len(), 3);
    }
}

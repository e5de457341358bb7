//! [Table Context (TC)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/5e48be0d-a75a-4918-a277-50408ff96740)
//!
//! A rowset table: column descriptors plus a row-index (stable row-id -> row position) and a
//! rows blob holding fixed-stride records (C9). Recipient tables, attachment tables, and a
//! folder's hierarchy/contents tables are all TCs.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::BTreeMap;
use std::io::{Read, Seek};
use tracing::instrument;

use super::heap::{Heap, HeapId};
use super::prop_context::{parse_value, PropertyValue};
use super::prop_type::PropertyType;
use super::tree::HeapTree;
use super::{LtpError, LtpResult};
use crate::ndb::block::read_node_stream;
use crate::ndb::block_id::BlockId;
use crate::ndb::header::Header as NdbHeader;
use crate::ndb::node_id::{NodeId, NodeIdType};
use crate::ndb::page::BlockBTree;
use crate::ndb::subnode::SubNodeMap;

/// `TCOLDESC`: `{ propType(u16), propId(u16), ibData(u16), cbData(u8), iBit(u8) }`.
#[derive(Copy, Clone, Debug)]
pub struct TableColumnDescriptor {
    pub prop_type: PropertyType,
    pub prop_id: u16,
    pub offset: u16,
    pub size: u8,
    pub existence_bitmap_index: u8,
}

impl TableColumnDescriptor {
    fn read(cursor: &mut &[u8]) -> LtpResult<Self> {
        let prop_type = PropertyType::try_from(cursor.read_u16::<LittleEndian>()?)?;
        let prop_id = cursor.read_u16::<LittleEndian>()?;
        let offset = cursor.read_u16::<LittleEndian>()?;
        let size = cursor.read_u8()?;
        let existence_bitmap_index = cursor.read_u8()?;
        Ok(Self {
            prop_type,
            prop_id,
            offset,
            size,
            existence_bitmap_index,
        })
    }
}

/// `TCINFO`: `{ bType=0x7C, cCols, rgib[4], hidRowIndex, hnidRows, hidIndex }` followed by
/// `cCols` column descriptors.
struct TableContextInfo {
    end_1byte_values: u16,
    end_existence_bitmap: u16,
    row_index: HeapId,
    rows: Option<NodeId>,
    columns: Vec<TableColumnDescriptor>,
}

impl TableContextInfo {
    fn read(buffer: &[u8]) -> LtpResult<Self> {
        let mut cursor = buffer;
        let signature = cursor.read_u8()?;
        if signature != 0x7C {
            return Err(LtpError::InvalidTcSignature(signature));
        }
        let column_count = cursor.read_u8()?;
        let _end_4byte_values = cursor.read_u16::<LittleEndian>()?;
        let _end_2byte_values = cursor.read_u16::<LittleEndian>()?;
        let end_1byte_values = cursor.read_u16::<LittleEndian>()?;
        let end_existence_bitmap = cursor.read_u16::<LittleEndian>()?;
        let row_index = HeapId::from_u32(cursor.read_u32::<LittleEndian>()?)?;
        let rows_raw = cursor.read_u32::<LittleEndian>()?;
        let rows = if rows_raw == 0 {
            None
        } else {
            Some(NodeId::from(rows_raw))
        };
        let _deprecated_index = cursor.read_u32::<LittleEndian>()?;

        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            columns.push(TableColumnDescriptor::read(&mut cursor)?);
        }

        Ok(Self {
            end_1byte_values,
            end_existence_bitmap,
            row_index,
            rows,
            columns,
        })
    }
}

fn existence_bitmap_size(column_count: usize) -> usize {
    column_count / 8 + usize::from(column_count % 8 != 0)
}

/// The row-index BTH's value is a row number, stored 2 bytes wide (ANSI) or 4 (Unicode).
fn row_number(entry_size: u8, bytes: &[u8]) -> LtpResult<u32> {
    match entry_size {
        2 => Ok(u32::from(LittleEndian::read_u16(bytes))),
        4 => Ok(LittleEndian::read_u32(bytes)),
        other => Err(LtpError::InvalidBthEntrySize(other)),
    }
}

/// A decoded table: columns, every row's raw bytes in on-disk storage order, and the heap
/// backing any heap-resident (non-fixed-width) column value.
pub struct TableContext {
    columns: Vec<TableColumnDescriptor>,
    end_1byte_values: u16,
    end_existence_bitmap: u16,
    heap: Heap,
    rows: Vec<Vec<u8>>,
    row_id_to_position: BTreeMap<u32, usize>,
    position_to_row_id: Vec<Option<u32>>,
}

impl TableContext {
    #[instrument(skip(f, ndb_header, block_btree, sub_nodes))]
    pub fn open<R: Read + Seek>(
        f: &mut R,
        ndb_header: &NdbHeader,
        block_btree: &BlockBTree,
        data_bid: BlockId,
        sub_nodes: &SubNodeMap,
    ) -> LtpResult<Self> {
        let heap = Heap::open(f, ndb_header, block_btree, data_bid)?;
        let info = TableContextInfo::read(heap.resolve(heap.user_root())?)?;
        let stride = info.end_existence_bitmap as usize;

        let row_blobs: Vec<Vec<u8>> = match info.rows {
            None => Vec::new(),
            Some(nid) => match nid.id_type() {
                Ok(NodeIdType::HeapNode) => {
                    vec![heap.resolve(HeapId::from_u32(u32::from(nid))?)?.to_vec()]
                }
                _ => {
                    let entry = sub_nodes.get(nid).ok_or(LtpError::SubNodeNotFound(nid))?;
                    vec![read_node_stream(
                        f,
                        ndb_header,
                        block_btree,
                        entry.data_bid,
                    )?]
                }
            },
        };

        let mut rows = Vec::new();
        if stride > 0 {
            for blob in row_blobs {
                for chunk in blob.chunks_exact(stride) {
                    rows.push(chunk.to_vec());
                }
            }
        }

        let row_index_tree = HeapTree::open(&heap, info.row_index)?;
        let entry_size = row_index_tree.entry_size();
        let mut row_id_to_position = BTreeMap::new();
        let mut position_to_row_id = vec![None; rows.len()];
        for record in row_index_tree.all_entries()? {
            if record.len() < 4 {
                continue;
            }
            let row_id = LittleEndian::read_u32(&record[..4]);
            let position = row_number(entry_size, &record[4..])? as usize;
            if position < rows.len() {
                row_id_to_position.insert(row_id, position);
                position_to_row_id[position] = Some(row_id);
            }
        }

        Ok(Self {
            columns: info.columns,
            end_1byte_values: info.end_1byte_values,
            end_existence_bitmap: info.end_existence_bitmap,
            heap,
            rows,
            row_id_to_position,
            position_to_row_id,
        })
    }

    pub fn columns(&self) -> &[TableColumnDescriptor] {
        &self.columns
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Rows in on-disk storage order (spec.md §4.9: "ordered by row-index insertion, not key").
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        self.rows.iter().map(|row| row.as_slice())
    }

    pub fn find_row(&self, row_id: u32) -> Option<&[u8]> {
        self.row_id_to_position
            .get(&row_id)
            .map(|&pos| self.rows[pos].as_slice())
    }

    /// Rows paired with their stable row-id, in on-disk storage order (spec.md §4.9). A row
    /// whose row-index entry is missing or corrupt (no id resolved for its position) is
    /// skipped rather than surfaced with a fabricated id; folder/message child-enumeration
    /// (C13) relies on the row-id being the child's real [`NodeId`].
    pub fn rows_with_ids(&self) -> impl Iterator<Item = (u32, &[u8])> {
        self.rows
            .iter()
            .zip(self.position_to_row_id.iter())
            .filter_map(|(row, id)| id.map(|id| (id, row.as_slice())))
    }

    fn is_present(&self, row: &[u8], column: &TableColumnDescriptor) -> bool {
        let bitmap = &row[self.end_1byte_values as usize..self.end_existence_bitmap as usize];
        let bit = column.existence_bitmap_index as usize;
        match bitmap.get(bit / 8) {
            Some(byte) => byte & (1_u8 << (7 - (bit % 8))) != 0,
            None => false,
        }
    }

    /// Resolves one column's value out of `row` (a buffer previously returned by [`Self::rows`]
    /// or [`Self::find_row`]). `Ok(None)` when the column's presence bit is unset.
    pub fn get<R: Read + Seek>(
        &self,
        f: &mut R,
        ndb_header: &NdbHeader,
        block_btree: &BlockBTree,
        sub_nodes: &SubNodeMap,
        row: &[u8],
        column: &TableColumnDescriptor,
    ) -> LtpResult<Option<PropertyValue>> {
        if !self.is_present(row, column) {
            return Ok(None);
        }

        let offset = column.offset as usize;
        let size = column.size as usize;
        let slot = &row[offset..offset + size];

        match column.prop_type.fixed_width() {
            Some(width) if width == size => Ok(Some(parse_value(column.prop_type, slot)?)),
            _ => {
                let raw = LittleEndian::read_u32(slot);
                let node = NodeId::from(raw);
                match node.id_type() {
                    Ok(NodeIdType::HeapNode) => {
                        let hid = HeapId::from_u32(raw)?;
                        Ok(Some(parse_value(column.prop_type, self.heap.resolve(hid)?)?))
                    }
                    _ => {
                        let entry = sub_nodes.get(node).ok_or(LtpError::SubNodeNotFound(node))?;
                        let bytes = read_node_stream(f, ndb_header, block_btree, entry.data_bid)?;
                        Ok(Some(parse_value(column.prop_type, &bytes)?))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ltp::heap::HeapClientSignature;

    fn column(
        prop_type: PropertyType,
        prop_id: u16,
        offset: u16,
        size: u8,
        bit: u8,
    ) -> TableColumnDescriptor {
        TableColumnDescriptor {
            prop_type,
            prop_id,
            offset,
            size,
            existence_bitmap_index: bit,
        }
    }

    fn empty_heap() -> Heap {
        let mut page = vec![0u8; 8];
        page[2] = 0xEC;
        page[3] = 0x7C;
        let page_map_offset = page.len();
        page.extend_from_slice(&0u16.to_le_bytes());
        page.extend_from_slice(&0u16.to_le_bytes());
        page.extend_from_slice(&(page_map_offset as u16).to_le_bytes());
        page[0..2].copy_from_slice(&(page_map_offset as u16).to_le_bytes());
        Heap::from_single_page_for_test(page, HeapClientSignature::Table)
    }

    #[test]
    fn existence_bitmap_size_rounds_up() {
        assert_eq!(existence_bitmap_size(0), 0);
        assert_eq!(existence_bitmap_size(1), 1);
        assert_eq!(existence_bitmap_size(8), 1);
        assert_eq!(existence_bitmap_size(9), 2);
    }

    #[test]
    fn presence_bit_is_msb_first() {
        let col_a = column(PropertyType::Integer32, 1, 0, 4, 0);
        let col_b = column(PropertyType::Integer32, 2, 4, 4, 1);
        let row = vec![0u8, 0, 0, 0, 0, 0, 0, 0, 0b1000_0000];
        let table = TableContext {
            columns: vec![col_a, col_b],
            end_1byte_values: 8,
            end_existence_bitmap: 9,
            heap: empty_heap(),
            rows: vec![],
            row_id_to_position: BTreeMap::new(),
            position_to_row_id: vec![],
        };
        assert!(table.is_present(&row, &col_a));
        assert!(!table.is_present(&row, &col_b));
    }

    #[test]
    fn rows_with_ids_skips_unresolved_positions() {
        let mut row_id_to_position = BTreeMap::new();
        row_id_to_position.insert(7_u32, 0_usize);
        let table = TableContext {
            columns: vec![],
            end_1byte_values: 0,
            end_existence_bitmap: 0,
            heap: empty_heap(),
            rows: vec![vec![1, 2, 3], vec![4, 5, 6]],
            row_id_to_position,
            position_to_row_id: vec![Some(7), None],
        };
        let pairs: Vec<_> = table.rows_with_ids().collect();
        assert_eq!(pairs, vec![(7, [1, 2, 3].as_slice())]);
    }
}

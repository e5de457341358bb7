//! [Property Context (PC)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/294c83c6-ff92-42f5-b6b6-876c29fa9737)
//!
//! The property-id -> typed-value map backing every folder, message, attachment, and recipient
//! (C8). Built eagerly from a node's heap: the BTH keyed by property tag gives each entry's raw
//! 4-byte value, which is either the value itself, a [`HeapId`] into the same heap, or a
//! [`NodeId`] into the node's sub-node descriptor map for out-of-line storage.

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::BTreeMap;
use std::io::{Read, Seek};
use tracing::instrument;

use super::heap::{Heap, HeapId};
use super::prop_type::PropertyType;
use super::tree::HeapTree;
use super::{LtpError, LtpResult};
use crate::ndb::block::read_node_stream;
use crate::ndb::block_id::BlockId;
use crate::ndb::header::Header as NdbHeader;
use crate::ndb::node_id::{NodeId, NodeIdType};
use crate::ndb::page::BlockBTree;
use crate::ndb::subnode::SubNodeMap;

/// `{Data1, Data2, Data3, Data4[8]}`, little-endian per `PtypGuid`.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct GuidValue {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl std::fmt::Debug for GuidValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7],
        )
    }
}

fn read_guid(cursor: &mut &[u8]) -> LtpResult<GuidValue> {
    let data1 = cursor.read_u32::<LittleEndian>()?;
    let data2 = cursor.read_u16::<LittleEndian>()?;
    let data3 = cursor.read_u16::<LittleEndian>()?;
    let mut data4 = [0_u8; 8];
    cursor.read_exact(&mut data4)?;
    Ok(GuidValue {
        data1,
        data2,
        data3,
        data4,
    })
}

/// A fully decoded property value (spec.md §3, §4.8). `Time` and `MultipleTime` stay raw
/// FILETIME tick counts; converting them to an instant is [`crate::ndb::filetime`]'s job, kept
/// out of this type so the PC layer has no calendar-date dependency of its own.
#[derive(Clone, Debug)]
pub enum PropertyValue {
    Integer16(i16),
    Integer32(i32),
    Floating32(f32),
    Floating64(f64),
    Currency(i64),
    FloatingTime(f64),
    ErrorCode(i32),
    Boolean(bool),
    Integer64(i64),
    String8(Vec<u8>),
    Unicode(String),
    Time(i64),
    Guid(GuidValue),
    Binary(Vec<u8>),
    /// `PtypObject`: a sub-node reference, never dereferenced here (see [`PropertyType::Object`]).
    Object(NodeId),
    MultipleInteger32(Vec<i32>),
    MultipleUnicode(Vec<String>),
    MultipleTime(Vec<i64>),
    MultipleBinary(Vec<Vec<u8>>),
}

impl From<&PropertyValue> for PropertyType {
    fn from(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Integer16(_) => PropertyType::Integer16,
            PropertyValue::Integer32(_) => PropertyType::Integer32,
            PropertyValue::Floating32(_) => PropertyType::Floating32,
            PropertyValue::Floating64(_) => PropertyType::Floating64,
            PropertyValue::Currency(_) => PropertyType::Currency,
            PropertyValue::FloatingTime(_) => PropertyType::FloatingTime,
            PropertyValue::ErrorCode(_) => PropertyType::ErrorCode,
            PropertyValue::Boolean(_) => PropertyType::Boolean,
            PropertyValue::Integer64(_) => PropertyType::Integer64,
            PropertyValue::String8(_) => PropertyType::String8,
            PropertyValue::Unicode(_) => PropertyType::Unicode,
            PropertyValue::Time(_) => PropertyType::Time,
            PropertyValue::Guid(_) => PropertyType::Guid,
            PropertyValue::Binary(_) => PropertyType::Binary,
            PropertyValue::Object(_) => PropertyType::Object,
            PropertyValue::MultipleInteger32(_) => PropertyType::MultipleInteger32,
            PropertyValue::MultipleUnicode(_) => PropertyType::MultipleUnicode,
            PropertyValue::MultipleTime(_) => PropertyType::MultipleTime,
            PropertyValue::MultipleBinary(_) => PropertyType::MultipleBinary,
        }
    }
}

fn decode_unicode(bytes: &[u8]) -> LtpResult<String> {
    if bytes.len() % 2 != 0 {
        return Err(LtpError::StringNotNulTerminated);
    }
    let mut units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    match units.last() {
        Some(0) => {
            units.pop();
        }
        _ => return Err(LtpError::StringNotNulTerminated),
    }
    String::from_utf16(&units).map_err(|_| LtpError::StringNotNulTerminated)
}

fn decode_string8(bytes: &[u8]) -> LtpResult<Vec<u8>> {
    match bytes.last() {
        Some(0) => Ok(bytes[..bytes.len() - 1].to_vec()),
        _ => Err(LtpError::StringNotNulTerminated),
    }
}

/// Parses `prop_type`'s bytes out of an already-resolved buffer (heap-local or sub-node
/// external; the caller has already dereferenced the HID/NID).
pub(crate) fn parse_value(prop_type: PropertyType, bytes: &[u8]) -> LtpResult<PropertyValue> {
    let mut cursor = bytes;
    Ok(match prop_type {
        PropertyType::Integer16 => PropertyValue::Integer16(cursor.read_i16::<LittleEndian>()?),
        PropertyType::Integer32 => PropertyValue::Integer32(cursor.read_i32::<LittleEndian>()?),
        PropertyType::Floating32 => PropertyValue::Floating32(cursor.read_f32::<LittleEndian>()?),
        PropertyType::Floating64 => PropertyValue::Floating64(cursor.read_f64::<LittleEndian>()?),
        PropertyType::Currency => PropertyValue::Currency(cursor.read_i64::<LittleEndian>()?),
        PropertyType::FloatingTime => {
            PropertyValue::FloatingTime(cursor.read_f64::<LittleEndian>()?)
        }
        PropertyType::ErrorCode => PropertyValue::ErrorCode(cursor.read_i32::<LittleEndian>()?),
        PropertyType::Boolean => PropertyValue::Boolean(cursor.read_u16::<LittleEndian>()? != 0),
        PropertyType::Integer64 => PropertyValue::Integer64(cursor.read_i64::<LittleEndian>()?),
        PropertyType::String8 => PropertyValue::String8(decode_string8(bytes)?),
        PropertyType::Unicode => PropertyValue::Unicode(decode_unicode(bytes)?),
        PropertyType::Time => PropertyValue::Time(cursor.read_i64::<LittleEndian>()?),
        PropertyType::Guid => PropertyValue::Guid(read_guid(&mut cursor)?),
        PropertyType::Binary => PropertyValue::Binary(bytes.to_vec()),
        PropertyType::Object => PropertyValue::Object(NodeId::from(cursor.read_u32::<LittleEndian>()?)),
        PropertyType::MultipleInteger32 => {
            let count = cursor.read_u32::<LittleEndian>()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(cursor.read_i32::<LittleEndian>()?);
            }
            PropertyValue::MultipleInteger32(values)
        }
        PropertyType::MultipleUnicode => {
            let count = cursor.read_u32::<LittleEndian>()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let len = cursor.read_u32::<LittleEndian>()? as usize;
                let mut units = Vec::with_capacity(len / 2);
                for _ in 0..len / 2 {
                    units.push(cursor.read_u16::<LittleEndian>()?);
                }
                values.push(String::from_utf16(&units).map_err(|_| LtpError::StringNotNulTerminated)?);
            }
            PropertyValue::MultipleUnicode(values)
        }
        PropertyType::MultipleTime => {
            let count = cursor.read_u32::<LittleEndian>()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                values.push(cursor.read_i64::<LittleEndian>()?);
            }
            PropertyValue::MultipleTime(values)
        }
        PropertyType::MultipleBinary => {
            let count = cursor.read_u32::<LittleEndian>()?;
            let mut values = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let len = cursor.read_u32::<LittleEndian>()? as usize;
                let mut buf = vec![0_u8; len];
                cursor.read_exact(&mut buf)?;
                values.push(buf);
            }
            PropertyValue::MultipleBinary(values)
        }
    })
}

/// `{bType=0xBC, hidRoot}`, the PC header stored at the heap's user root.
fn read_pc_header(buffer: &[u8]) -> LtpResult<HeapId> {
    let signature = buffer[0];
    if signature != 0xBC {
        return Err(LtpError::InvalidPcSignature(signature));
    }
    HeapId::from_u32(LittleEndian::read_u32(&buffer[1..5]))
}

/// Disambiguates an external `dwValueHnid`: the low 5 bits are a [`NodeIdType`]; the heap-node
/// sentinel (`0x00`) means the value is a [`HeapId`], anything else a sub-node-map [`NodeId`]
/// (spec.md §4.8 describes this loosely as "the low two bits").
fn is_external_node_ref(raw: u32) -> bool {
    !matches!(NodeId::from(raw).id_type(), Ok(NodeIdType::HeapNode))
}

/// A node's fully materialized property map (spec.md §4.8). Built once at construction; `get`
/// and `all` are then plain map lookups.
#[derive(Debug)]
pub struct PropertyContext(BTreeMap<u16, PropertyValue>);

impl PropertyContext {
    #[instrument(skip(f, ndb_header, block_btree, sub_nodes))]
    pub fn open<R: Read + Seek>(
        f: &mut R,
        ndb_header: &NdbHeader,
        block_btree: &BlockBTree,
        data_bid: BlockId,
        sub_nodes: &SubNodeMap,
    ) -> LtpResult<Self> {
        let heap = Heap::open(f, ndb_header, block_btree, data_bid)?;
        let root_hid = read_pc_header(heap.resolve(heap.user_root())?)?;
        let tree = HeapTree::open(&heap, root_hid)?;

        let mut map = BTreeMap::new();
        for record in tree.all_entries()? {
            let mut cursor = record;
            let prop_id = cursor.read_u16::<LittleEndian>()?;
            let prop_type = PropertyType::try_from(cursor.read_u16::<LittleEndian>()?)?;
            let raw = cursor.read_u32::<LittleEndian>()?;

            let value = match prop_type.fixed_width() {
                Some(width) if width <= 4 => {
                    let bytes = raw.to_le_bytes();
                    parse_value(prop_type, &bytes[..width])?
                }
                Some(_) => {
                    let hid = HeapId::from_u32(raw)?;
                    parse_value(prop_type, heap.resolve(hid)?)?
                }
                None => {
                    if is_external_node_ref(raw) {
                        let nid = NodeId::from(raw);
                        let entry = sub_nodes
                            .get(nid)
                            .ok_or(LtpError::SubNodeNotFound(nid))?;
                        let bytes =
                            read_node_stream(f, ndb_header, block_btree, entry.data_bid)?;
                        parse_value(prop_type, &bytes)?
                    } else {
                        let hid = HeapId::from_u32(raw)?;
                        parse_value(prop_type, heap.resolve(hid)?)?
                    }
                }
            };
            map.insert(prop_id, value);
        }

        Ok(Self(map))
    }

    pub fn get(&self, prop_id: u16) -> Option<&PropertyValue> {
        self.0.get(&prop_id)
    }

    pub fn all(&self) -> &BTreeMap<u16, PropertyValue> {
        &self.0
    }

    /// Builds a property context directly from an already-resolved map, for callers (such as a
    /// table-context row, which carries its values inline rather than behind a node id) that
    /// have no heap of their own to parse.
    pub(crate) fn from_map(map: BTreeMap<u16, PropertyValue>) -> Self {
        Self(map)
    }

    #[cfg(test)]
    pub(crate) fn from_map_for_test(map: BTreeMap<u16, PropertyValue>) -> Self {
        Self::from_map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_width_scalars() {
        assert!(matches!(
            parse_value(PropertyType::Integer32, &999_i32.to_le_bytes()).unwrap(),
            PropertyValue::Integer32(999)
        ));
        assert!(matches!(
            parse_value(PropertyType::Boolean, &1_u16.to_le_bytes()).unwrap(),
            PropertyValue::Boolean(true)
        ));
    }

    #[test]
    fn decodes_unicode_string_stripping_nul() {
        let mut bytes = Vec::new();
        for ch in "hi".encode_utf16() {
            bytes.extend_from_slice(&ch.to_le_bytes());
        }
        bytes.extend_from_slice(&0u16.to_le_bytes());
        match parse_value(PropertyType::Unicode, &bytes).unwrap() {
            PropertyValue::Unicode(s) => assert_eq!(s, "hi"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_unterminated_unicode_string() {
        let bytes = 1u16.to_le_bytes();
        assert!(matches!(
            parse_value(PropertyType::Unicode, &bytes),
            Err(LtpError::StringNotNulTerminated)
        ));
    }

    #[test]
    fn decodes_string8_stripping_nul() {
        let bytes = b"hello\0".to_vec();
        match parse_value(PropertyType::String8, &bytes).unwrap() {
            PropertyValue::String8(s) => assert_eq!(s, b"hello"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_object_as_sub_node_reference() {
        let nid = NodeId::new(NodeIdType::Attachment, 7).unwrap();
        match parse_value(PropertyType::Object, &u32::from(nid).to_le_bytes()).unwrap() {
            PropertyValue::Object(value) => assert_eq!(value, nid),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn property_context_get_and_all() {
        let mut map = BTreeMap::new();
        map.insert(0x3001, PropertyValue::Unicode("Inbox".to_string()));
        map.insert(0x3602, PropertyValue::Integer32(4));
        let pc = PropertyContext::from_map_for_test(map);

        match pc.get(0x3001).unwrap() {
            PropertyValue::Unicode(s) => assert_eq!(s, "Inbox"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(pc.get(0x9999).is_none());
        assert_eq!(pc.all().len(), 2);
    }
}

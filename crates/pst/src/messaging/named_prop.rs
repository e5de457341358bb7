//! [Named Property Lookup Map](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/e17e195d-0454-4b9b-b398-c9127a26a678)
//!
//! Resolves a named property (a GUID plus either a numeric id or a string name) to the
//! 16-bit property tag (`0x8000 + propIndex`) a PC/TC actually carries on disk (C11). Built
//! once from the PC at `NID_NAME_TO_ID_MAP`'s three blob properties: GUIDs (0x0002), entries
//! (0x0003), and the string stream (0x0004).

use byteorder::{LittleEndian, ReadBytesExt};
use std::collections::BTreeMap;
use std::io::{Read, Seek};
use tracing::instrument;

use super::{MessagingError, MessagingResult};
use crate::ltp::prop_context::{GuidValue, PropertyContext, PropertyValue};
use crate::ndb::header::Header as NdbHeader;
use crate::ndb::node_id::NID_NAME_TO_ID_MAP;
use crate::ndb::page::{BlockBTree, NodeBTree};
use crate::ndb::subnode::SubNodeMap;

pub const PS_MAPI: GuidValue = GuidValue {
    data1: 0x0002_0328,
    data2: 0x0000,
    data3: 0x0000,
    data4: [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
};

pub const PS_PUBLIC_STRINGS: GuidValue = GuidValue {
    data1: 0x0002_0329,
    data2: 0x0000,
    data3: 0x0000,
    data4: [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
};

/// Which GUID a named property is scoped to: the two well-known property sets, or an index
/// into the map's own GUID table (`guidIndexes[guidRef - 3]`).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum NamedPropertyGuid {
    Mapi,
    PublicStrings,
    GuidIndex(u16),
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum NamedPropertyName {
    Numeric(u32),
    String(String),
}

fn read_guid(chunk: &[u8]) -> MessagingResult<GuidValue> {
    let mut cursor = chunk;
    Ok(GuidValue {
        data1: cursor.read_u32::<LittleEndian>()?,
        data2: cursor.read_u16::<LittleEndian>()?,
        data3: cursor.read_u16::<LittleEndian>()?,
        data4: {
            let mut data4 = [0_u8; 8];
            cursor.read_exact(&mut data4)?;
            data4
        },
    })
}

/// Reads the `{len(u32), bytes[len]}` UTF-16LE record at `offset` in the string stream.
fn lookup_string(stream: &[u8], offset: u32) -> MessagingResult<String> {
    let invalid = || MessagingError::InvalidNamedPropertyStringOffset(offset);
    let offset = offset as usize;
    let len_bytes = stream.get(offset..offset + 4).ok_or_else(invalid)?;
    let len = LittleEndian::read_u32(len_bytes) as usize;
    let start = offset + 4;
    let bytes = stream.get(start..start + len).ok_or_else(invalid)?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| invalid())
}

/// Bidirectional `(guid, name) <-> propId` lookup built once at open (spec.md §5: "the
/// name-to-ID map is initialized exactly once at open and is thereafter immutable").
#[derive(Debug, Default)]
pub struct NamedPropertyMap {
    guids: Vec<GuidValue>,
    by_name: BTreeMap<(NamedPropertyGuid, NamedPropertyName), u16>,
    by_prop_id: BTreeMap<u16, (NamedPropertyGuid, NamedPropertyName)>,
}

impl NamedPropertyMap {
    #[instrument(skip_all)]
    pub fn open<R: Read + Seek>(
        f: &mut R,
        ndb_header: &NdbHeader,
        node_btree: &NodeBTree,
        block_btree: &BlockBTree,
    ) -> MessagingResult<Self> {
        let nbt_entry = node_btree.find_entry(f, u64::from(u32::from(NID_NAME_TO_ID_MAP)))?;
        let sub_nodes = SubNodeMap::open(
            f,
            block_btree,
            ndb_header.width(),
            nbt_entry.sub_node_bid,
        )?;
        let pc = PropertyContext::open(f, ndb_header, block_btree, nbt_entry.data_bid, &sub_nodes)?;

        let guids = match pc.get(0x0002) {
            Some(PropertyValue::Binary(bytes)) => bytes
                .chunks_exact(16)
                .map(read_guid)
                .collect::<MessagingResult<Vec<_>>>()?,
            _ => Vec::new(),
        };

        let empty = Vec::new();
        let string_stream = match pc.get(0x0004) {
            Some(PropertyValue::Binary(bytes)) => bytes,
            _ => &empty,
        };

        let mut by_name = BTreeMap::new();
        let mut by_prop_id = BTreeMap::new();

        if let Some(PropertyValue::Binary(bytes)) = pc.get(0x0003) {
            for chunk in bytes.chunks_exact(8) {
                let mut cursor = chunk;
                let id = cursor.read_u32::<LittleEndian>()?;
                let guid_ref = cursor.read_u16::<LittleEndian>()?;
                let prop_index = cursor.read_u16::<LittleEndian>()?;

                let is_string = guid_ref & 1 == 1;
                let prop_id = 0x8000_u16.wrapping_add(prop_index);
                let guid = match guid_ref >> 1 {
                    1 => NamedPropertyGuid::Mapi,
                    2 => NamedPropertyGuid::PublicStrings,
                    other => NamedPropertyGuid::GuidIndex(other.saturating_sub(3)),
                };
                let name = if is_string {
                    NamedPropertyName::String(lookup_string(string_stream, id)?)
                } else {
                    NamedPropertyName::Numeric(id)
                };

                by_name.insert((guid, name.clone()), prop_id);
                by_prop_id.insert(prop_id, (guid, name));
            }
        }

        Ok(Self {
            guids,
            by_name,
            by_prop_id,
        })
    }

    /// Resolves a named property to its on-disk property tag (always `>= 0x8000`, per
    /// spec.md §8 invariant 5).
    pub fn prop_id(&self, guid: NamedPropertyGuid, name: &NamedPropertyName) -> Option<u16> {
        self.by_name.get(&(guid, name.clone())).copied()
    }

    pub fn name(&self, prop_id: u16) -> Option<&(NamedPropertyGuid, NamedPropertyName)> {
        self.by_prop_id.get(&prop_id)
    }

    pub fn guid_table(&self) -> &[GuidValue] {
        &self.guids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_numeric_prop_id_is_at_least_0x8000() {
        let mut by_name = BTreeMap::new();
        let mut by_prop_id = BTreeMap::new();
        let key = (NamedPropertyGuid::PublicStrings, NamedPropertyName::Numeric(5));
        by_name.insert(key.clone(), 0x8001);
        by_prop_id.insert(0x8001, key);
        let map = NamedPropertyMap {
            guids: Vec::new(),
            by_name,
            by_prop_id,
        };
        let prop_id = map
            .prop_id(NamedPropertyGuid::PublicStrings, &NamedPropertyName::Numeric(5))
            .unwrap();
        assert!(prop_id >= 0x8000);
    }

    #[test]
    fn lookup_string_reads_length_prefixed_utf16() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&4u32.to_le_bytes());
        for ch in "hi".encode_utf16() {
            stream.extend_from_slice(&ch.to_le_bytes());
        }
        assert_eq!(lookup_string(&stream, 0).unwrap(), "hi");
    }

    #[test]
    fn lookup_string_rejects_out_of_bounds_offset() {
        let stream = vec![0_u8; 2];
        assert!(lookup_string(&stream, 100).is_err());
    }
}

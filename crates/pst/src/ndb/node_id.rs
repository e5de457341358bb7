//! [NID (Node ID)](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/18d7644e-cb33-4e11-95c0-34d8a84fbff6)

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use super::NdbError;

/// `nidType`: the low 5 bits of a [NodeId].
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NodeIdType {
    /// `NID_TYPE_HID`: Heap node
    HeapNode = 0x00,
    /// `NID_TYPE_INTERNAL`: Internal node
    Internal = 0x01,
    /// `NID_TYPE_NORMAL_FOLDER`: Normal Folder object (PC)
    NormalFolder = 0x02,
    /// `NID_TYPE_SEARCH_FOLDER`: Search Folder object (PC)
    SearchFolder = 0x03,
    /// `NID_TYPE_NORMAL_MESSAGE`: Normal Message object (PC)
    NormalMessage = 0x04,
    /// `NID_TYPE_ATTACHMENT`: Attachment object (PC)
    Attachment = 0x05,
    /// `NID_TYPE_SEARCH_UPDATE_QUEUE`: Queue of changed objects for search Folder objects
    SearchUpdateQueue = 0x06,
    /// `NID_TYPE_SEARCH_CRITERIA_OBJECT`: Defines the search criteria for a search Folder object
    SearchCriteria = 0x07,
    /// `NID_TYPE_ASSOC_MESSAGE`: Folder associated information (FAI) Message object (PC)
    AssociatedMessage = 0x08,
    /// `NID_TYPE_CONTENTS_TABLE_INDEX`: Internal, persisted view-related
    ContentsTableIndex = 0x0A,
    /// `NID_TYPE_RECEIVE_FOLDER_TABLE`: Receive Folder object (Inbox)
    ReceiveFolderTable = 0x0B,
    /// `NID_TYPE_OUTGOING_QUEUE_TABLE`: Outbound queue (Outbox)
    OutgoingQueueTable = 0x0C,
    /// `NID_TYPE_HIERARCHY_TABLE`: Hierarchy table (TC)
    HierarchyTable = 0x0D,
    /// `NID_TYPE_CONTENTS_TABLE`: Contents table (TC)
    ContentsTable = 0x0E,
    /// `NID_TYPE_ASSOC_CONTENTS_TABLE`: FAI contents table (TC)
    AssociatedContentsTable = 0x0F,
    /// `NID_TYPE_SEARCH_CONTENTS_TABLE`: Contents table (TC) of a search Folder object
    SearchContentsTable = 0x10,
    /// `NID_TYPE_ATTACHMENT_TABLE`: Attachment table (TC)
    AttachmentTable = 0x11,
    /// `NID_TYPE_RECIPIENT_TABLE`: Recipient table (TC)
    RecipientTable = 0x12,
    /// `NID_TYPE_SEARCH_TABLE_INDEX`: Internal, persisted view-related
    SearchTableIndex = 0x13,
    /// `NID_TYPE_LTP`: heap/table node used directly as a sub-node container
    ListsTablesProperties = 0x1F,
}

impl TryFrom<u8> for NodeIdType {
    type Error = NdbError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Self::HeapNode),
            0x01 => Ok(Self::Internal),
            0x02 => Ok(Self::NormalFolder),
            0x03 => Ok(Self::SearchFolder),
            0x04 => Ok(Self::NormalMessage),
            0x05 => Ok(Self::Attachment),
            0x06 => Ok(Self::SearchUpdateQueue),
            0x07 => Ok(Self::SearchCriteria),
            0x08 => Ok(Self::AssociatedMessage),
            0x0A => Ok(Self::ContentsTableIndex),
            0x0B => Ok(Self::ReceiveFolderTable),
            0x0C => Ok(Self::OutgoingQueueTable),
            0x0D => Ok(Self::HierarchyTable),
            0x0E => Ok(Self::ContentsTable),
            0x0F => Ok(Self::AssociatedContentsTable),
            0x10 => Ok(Self::SearchContentsTable),
            0x11 => Ok(Self::AttachmentTable),
            0x12 => Ok(Self::RecipientTable),
            0x13 => Ok(Self::SearchTableIndex),
            0x1F => Ok(Self::ListsTablesProperties),
            invalid => Err(NdbError::InvalidNodeIdType(invalid)),
        }
    }
}

pub const MAX_NODE_INDEX: u32 = 1_u32.rotate_right(5) - 1;

/// A 32-bit node identifier: low 5 bits are the [NodeIdType], high 27 bits the instance index.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn new(id_type: NodeIdType, index: u32) -> Result<Self, NdbError> {
        if index > MAX_NODE_INDEX {
            return Err(NdbError::InvalidNodeIndex(index));
        }
        Ok(Self((index << 5) | id_type as u32))
    }

    pub fn id_type(&self) -> Result<NodeIdType, NdbError> {
        NodeIdType::try_from((self.0 & 0x1F) as u8)
    }

    pub fn index(&self) -> u32 {
        self.0 >> 5
    }

    pub fn read(f: &mut dyn Read) -> io::Result<Self> {
        Ok(Self(f.read_u32::<LittleEndian>()?))
    }

    pub fn write(&self, f: &mut dyn Write) -> io::Result<()> {
        f.write_u32::<LittleEndian>(self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<NodeId> for u32 {
    fn from(value: NodeId) -> Self {
        value.0
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.id_type() {
            Ok(id_type) => write!(f, "NodeId {{ {id_type:?}, index: {:#x} }}", self.index()),
            Err(_) => write!(f, "NodeId(0x{:08X})", self.0),
        }
    }
}

/// `NID_MESSAGE_STORE`
pub const NID_MESSAGE_STORE: NodeId = NodeId(0x21);
/// `NID_NAME_TO_ID_MAP`
pub const NID_NAME_TO_ID_MAP: NodeId = NodeId(0x61);
/// `NID_ROOT_FOLDER`
pub const NID_ROOT_FOLDER: NodeId = NodeId(0x122);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_type_and_index() {
        let nid = NodeId::new(NodeIdType::NormalMessage, 12345).unwrap();
        assert_eq!(nid.id_type().unwrap(), NodeIdType::NormalMessage);
        assert_eq!(nid.index(), 12345);
    }

    #[test]
    fn rejects_index_overflow() {
        assert!(NodeId::new(NodeIdType::NormalMessage, MAX_NODE_INDEX + 1).is_err());
    }

    #[test]
    fn well_known_nids_decode() {
        assert_eq!(NID_MESSAGE_STORE.id_type().unwrap(), NodeIdType::Internal);
        assert_eq!(NID_ROOT_FOLDER.id_type().unwrap(), NodeIdType::NormalFolder);
    }
}

//! ## [Node Database (NDB) Layer](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/3db307c8-bf08-4c56-ad00-4bbbfee74538)
//!
//! The header parser (C4), the two B-trees (C5), and the block/sub-block logical stream
//! reader (C6).

pub mod block;
pub mod block_id;
pub mod filetime;
pub mod header;
pub mod node_id;
pub mod page;
pub mod subnode;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NdbError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid NDB header magic value {0:#010X}")]
    InvalidNdbHeaderMagicValue(u32),
    #[error("unsupported NDB variant byte {0}")]
    UnsupportedVariant(u8),
    #[error("invalid NDB crypt method {0:#04X}")]
    InvalidNdbCryptMethod(u8),
    #[error("file declares the unsupported high-encryption (cyclic) method")]
    EncryptedRejected,

    #[error("invalid node id type {0:#04X}")]
    InvalidNodeIdType(u8),
    #[error("node index {0} exceeds the 27-bit node id range")]
    InvalidNodeIndex(u32),

    #[error("invalid page type byte {0:#04X}")]
    InvalidPageType(u8),
    #[error("repeated page type bytes disagree: {0:#04X} != {1:#04X}")]
    MismatchPageTypeRepeat(u8, u8),
    #[error("invalid B-tree page level {0}")]
    InvalidBTreePageLevel(u8),
    #[error("B-tree entry count {0} exceeds max entry count {1}")]
    InvalidBTreeEntryCount(u16, u16),
    #[error("B-tree entry size {0} is smaller than the minimum {1}")]
    InvalidBTreeEntrySize(u16, u16),
    #[error("B-tree key {0:#x} not found")]
    BTreeKeyNotFound(u64),

    #[error("block {0:?} claims size {1} but trailer reports {2}")]
    BlockSizeMismatch(crate::ndb::block_id::BlockId, u16, u16),
    #[error("block {0:?} is not the expected internal/data kind")]
    WrongBlockKind(crate::ndb::block_id::BlockId),
    #[error("XBlock declares total size {0} but data leaves sum to {1}")]
    XBlockTotalSizeMismatch(u32, u32),
    #[error("invalid data-tree block type byte {0:#04X}")]
    InvalidDataTreeBlockType(u8),
    #[error("invalid data-tree block level {0}")]
    InvalidDataTreeBlockLevel(u8),

    #[error("block id {0:?} not found in the block B-tree")]
    BlockNotFound(crate::ndb::block_id::BlockId),
    #[error("node id {0:?} not found in the node B-tree")]
    NodeNotFound(crate::ndb::node_id::NodeId),
}

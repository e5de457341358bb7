//! ## [Lists, Tables, and Properties (LTP) Layer](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/4c24c7d2-5c5a-4b99-88b2-f4b84cc293ae)
//!
//! The Heap-on-Node (C7), the property context / "BC" table (C8), and the table context /
//! "TC" table (C9).

use thiserror::Error;

pub mod heap;
pub mod prop_context;
pub mod prop_type;
pub mod table_context;
pub mod tree;

#[derive(Debug, Error)]
pub enum LtpError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Ndb(#[from] crate::ndb::NdbError),

    #[error("invalid heap node signature {0:#04X}")]
    InvalidHeapSignature(u8),
    #[error("invalid heap client signature {0:#04X}")]
    InvalidHeapClientSignature(u8),
    #[error("heap id {0:?} references page {1} but the heap has {2}")]
    HeapPageNotFound(super::ndb::node_id::NodeId, u16, usize),
    #[error("heap id {0:?} references allocation {1} but the page has {2}")]
    HeapAllocNotFound(super::ndb::node_id::NodeId, u16, usize),
    #[error("heap id {0:#010X} is not a heap-node id")]
    NotAHeapId(u32),

    #[error("invalid BTH key size {0}")]
    InvalidBthKeySize(u8),
    #[error("invalid BTH entry size {0}")]
    InvalidBthEntrySize(u8),

    #[error("invalid property context signature {0:#04X}")]
    InvalidPcSignature(u8),
    #[error("invalid property type {0:#06X}")]
    InvalidPropertyType(u16),
    #[error("property {0:#06X} not found")]
    PropertyNotFound(u16),
    #[error("property {0:#06X} has unexpected width: expected {1}, found {2}")]
    UnexpectedPropertyWidth(u16, usize, usize),
    #[error("a variable-length property value was neither a heap id nor a sub-node id")]
    UnresolvedExternalValue,
    #[error("sub-node {0:?} not found")]
    SubNodeNotFound(super::ndb::node_id::NodeId),
    #[error("string property is not NUL-terminated")]
    StringNotNulTerminated,

    #[error("invalid table context signature {0:#04X}")]
    InvalidTcSignature(u8),
}

pub type LtpResult<T> = Result<T, LtpError>;

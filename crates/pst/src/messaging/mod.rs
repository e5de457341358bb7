//! ## Messaging Layer
//!
//! The name-to-id map (C11), the message-class object factory (C12), and the typed
//! Folder/Message/Attachment/Recipient views built on top of the property and table contexts
//! the LTP layer exposes (C13).

pub mod attachment;
pub mod folder;
pub mod item;
pub mod message;
pub mod named_prop;
pub mod object;
pub mod recipient;
pub mod store;

use thiserror::Error;

use crate::ndb::node_id::{NodeId, NodeIdType};

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error(transparent)]
    Ndb(#[from] crate::ndb::NdbError),
    #[error(transparent)]
    Ltp(#[from] crate::ltp::LtpError),

    #[error("named property map string offset {0} is out of bounds")]
    InvalidNamedPropertyStringOffset(u32),

    #[error("required property {0:#06X} ({1}) is missing")]
    MissingProperty(u16, &'static str),

    #[error("node {0:?} is not a folder node")]
    InvalidFolderNodeIdType(NodeIdType),

    #[error("node {0:?} is not a message node")]
    InvalidMessageNodeIdType(NodeIdType),

    #[error("node {0:?} is not an attachment node")]
    InvalidAttachmentNodeIdType(NodeIdType),

    #[error("attachment sub-node {0:?} not found in owning message's sub-node map")]
    AttachmentSubNodeNotFound(NodeId),

    #[error("invalid attachment method {0:#x}")]
    InvalidAttachmentMethod(i32),
}

pub type MessagingResult<T> = Result<T, MessagingError>;

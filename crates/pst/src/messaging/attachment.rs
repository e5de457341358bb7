//! Attachment objects (C13): a sub-node of the owning message's sub-node map, addressed by the
//! attachment table row's `dwRowID` (spec.md §4.10, §4.12).

use std::rc::Rc;

use crate::ltp::prop_context::{PropertyContext, PropertyValue};
use crate::ndb::node_id::{NodeId, NodeIdType};
use crate::ndb::subnode::SubNodeMap;
use crate::{PstFile, PstResult};

use super::item::PropertyAccess;
use super::message::Message;
use super::MessagingError;

/// `PidTagAttachDataBinary` / `PidTagAttachDataObject`.
const PR_ATTACH_DATA: u16 = 0x3701;
/// `PidTagAttachFilename` (8.3 short form).
const PR_ATTACH_FILENAME: u16 = 0x3704;
/// `PidTagAttachMethod`.
const PR_ATTACH_METHOD: u16 = 0x3705;
/// `PidTagAttachLongFilename`.
const PR_ATTACH_LONG_FILENAME: u16 = 0x3707;
/// `PidTagAttachSize`.
const PR_ATTACH_SIZE: u16 = 0x0E20;
/// `PidTagAttachMimeTag`.
const PR_ATTACH_MIME_TAG: u16 = 0x370E;

/// `PidTagAttachMethod` (spec.md §4.12's attachment view).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum AttachmentMethod {
    None,
    ByValue,
    ByReference,
    ByReferenceOnly,
    EmbeddedMessage,
    Storage,
    ByWebReference,
}

impl TryFrom<i32> for AttachmentMethod {
    type Error = MessagingError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::ByValue),
            2 => Ok(Self::ByReference),
            4 => Ok(Self::ByReferenceOnly),
            5 => Ok(Self::EmbeddedMessage),
            6 => Ok(Self::Storage),
            7 => Ok(Self::ByWebReference),
            other => Err(MessagingError::InvalidAttachmentMethod(other)),
        }
    }
}

/// An attachment's own PC, opened out of the owning message's sub-node map rather than the
/// main NBT (spec.md §4.10).
pub struct Attachment {
    file: Rc<PstFile>,
    properties: PropertyContext,
    sub_nodes: SubNodeMap,
}

impl Attachment {
    pub(crate) fn open(
        file: Rc<PstFile>,
        message_sub_nodes: &SubNodeMap,
        node_id: NodeId,
    ) -> PstResult<Self> {
        if node_id.id_type()? != NodeIdType::Attachment {
            return Err(MessagingError::InvalidAttachmentNodeIdType(node_id.id_type()?).into());
        }
        let entry = message_sub_nodes
            .get(node_id)
            .ok_or(MessagingError::AttachmentSubNodeNotFound(node_id))?;
        let (properties, sub_nodes) = file.open_sub_node(entry)?;
        Ok(Self {
            file,
            properties,
            sub_nodes,
        })
    }

    pub fn filename(&self) -> Option<String> {
        self.string_property(PR_ATTACH_FILENAME)
    }

    pub fn long_filename(&self) -> Option<String> {
        self.string_property(PR_ATTACH_LONG_FILENAME)
    }

    pub fn mime_tag(&self) -> Option<String> {
        self.string_property(PR_ATTACH_MIME_TAG)
    }

    pub fn size(&self) -> Option<i32> {
        self.i32_property(PR_ATTACH_SIZE)
    }

    pub fn method(&self) -> Option<AttachmentMethod> {
        AttachmentMethod::try_from(self.i32_property(PR_ATTACH_METHOD)?).ok()
    }

    /// The raw attachment bytes, present when [`Self::method`] is [`AttachmentMethod::ByValue`].
    pub fn file_input_stream(&self) -> Option<&[u8]> {
        self.binary_property(PR_ATTACH_DATA)
    }

    /// The embedded message, present when [`Self::method`] is
    /// [`AttachmentMethod::EmbeddedMessage`] (spec.md §4.10: `PtypObject` points into this
    /// attachment's own sub-node map).
    pub fn embedded_message(&self) -> PstResult<Option<Message>> {
        if self.method() != Some(AttachmentMethod::EmbeddedMessage) {
            return Ok(None);
        }
        let Some(PropertyValue::Object(object_nid)) = self.properties.get(PR_ATTACH_DATA) else {
            return Ok(None);
        };
        let entry = self
            .sub_nodes
            .get(*object_nid)
            .ok_or(MessagingError::AttachmentSubNodeNotFound(*object_nid))?;
        let (properties, sub_nodes) = self.file.open_sub_node(entry)?;
        Ok(Some(Message::from_embedded(
            Rc::clone(&self.file),
            *object_nid,
            properties,
            sub_nodes,
        )))
    }
}

impl PropertyAccess for Attachment {
    fn properties(&self) -> &PropertyContext {
        &self.properties
    }
}

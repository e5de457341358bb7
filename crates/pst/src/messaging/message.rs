//! Message objects (C13): the PC at a `NormalMessage`/`AssociatedMessage` node, plus its
//! recipient and (optional) attachment tables.

use std::rc::Rc;

use crate::ltp::prop_context::{PropertyContext, PropertyValue};
use crate::ndb::node_id::{NodeId, NodeIdType};
use crate::ndb::subnode::SubNodeMap;
use crate::{sibling_node_id, PstFile, PstResult};

use super::attachment::Attachment;
use super::item::PropertyAccess;
use super::recipient::Recipient;
use super::MessagingError;

/// `PidTagMessageClass`.
const PR_MESSAGE_CLASS: u16 = 0x001A;
/// `PidTagSubject`.
const PR_SUBJECT: u16 = 0x0037;
/// `PidTagBody`.
const PR_BODY: u16 = 0x1000;
/// `PidTagHtml`.
const PR_HTML: u16 = 0x1013;
/// `PidTagRtfCompressed`.
const PR_RTF_COMPRESSED: u16 = 0x1009;
/// `PidTagSenderName`.
const PR_SENDER_NAME: u16 = 0x0C1A;
/// `PidTagTransportMessageHeaders`.
const PR_TRANSPORT_MESSAGE_HEADERS: u16 = 0x007D;
/// `PidTagCreationTime`.
const PR_CREATION_TIME: u16 = 0x3007;
/// `PidTagLastModificationTime`.
const PR_LAST_MODIFICATION_TIME: u16 = 0x3008;

/// A folder/FAI message, opened directly by node-id (spec.md §4.12: messages are normal
/// top-level NBT nodes, not sub-nodes of their folder).
pub struct Message {
    file: Rc<PstFile>,
    node_id: NodeId,
    properties: PropertyContext,
    sub_nodes: SubNodeMap,
}

impl Message {
    pub(crate) fn open(file: Rc<PstFile>, node_id: NodeId) -> PstResult<Self> {
        match node_id.id_type()? {
            NodeIdType::NormalMessage | NodeIdType::AssociatedMessage => {}
            other => return Err(MessagingError::InvalidMessageNodeIdType(other).into()),
        }
        let (properties, sub_nodes) = file.open_node(node_id)?;
        Ok(Self {
            file,
            node_id,
            properties,
            sub_nodes,
        })
    }

    /// Builds a message view directly from an already-opened sub-node (an embedded message
    /// reached through an attachment's `PtypObject` property, spec.md §4.10).
    pub(crate) fn from_embedded(
        file: Rc<PstFile>,
        node_id: NodeId,
        properties: PropertyContext,
        sub_nodes: SubNodeMap,
    ) -> Self {
        Self {
            file,
            node_id,
            properties,
            sub_nodes,
        }
    }

    pub fn message_class(&self) -> Option<String> {
        self.string_property(PR_MESSAGE_CLASS)
    }

    pub fn subject(&self) -> Option<String> {
        self.string_property(PR_SUBJECT)
    }

    pub fn body(&self) -> Option<String> {
        self.string_property(PR_BODY)
    }

    /// Raw `PidTagHtml` bytes; either an 8-bit or Unicode string property depending on the
    /// message, so this is exposed as bytes rather than forcing a codepage decision here (that
    /// conversion is the codepage→text external collaborator's job, spec.md §1).
    pub fn body_html(&self) -> Option<Vec<u8>> {
        match self.properties.get(PR_HTML)? {
            PropertyValue::Binary(bytes) => Some(bytes.clone()),
            PropertyValue::String8(bytes) => Some(bytes.clone()),
            PropertyValue::Unicode(s) => Some(s.clone().into_bytes()),
            _ => None,
        }
    }

    /// Raw, still-LZFu-compressed `PidTagRtfCompressed` bytes. Decompressing to the literal
    /// RTF body is an external collaborator's job (spec.md §1).
    pub fn body_rtf(&self) -> Option<&[u8]> {
        self.binary_property(PR_RTF_COMPRESSED)
    }

    pub fn sender_name(&self) -> Option<String> {
        self.string_property(PR_SENDER_NAME)
    }

    pub fn transport_message_headers(&self) -> Option<String> {
        self.string_property(PR_TRANSPORT_MESSAGE_HEADERS)
    }

    pub fn creation_time_millis(&self) -> Option<i64> {
        self.time_property_millis(PR_CREATION_TIME)
    }

    pub fn last_modification_time_millis(&self) -> Option<i64> {
        self.time_property_millis(PR_LAST_MODIFICATION_TIME)
    }

    /// `PidTagRecipientTable` rows (spec.md §4.12), each a thin wrapper over the row's own
    /// inline properties.
    pub fn recipients(&self) -> PstResult<Vec<Recipient>> {
        let table_nid = sibling_node_id(self.node_id, NodeIdType::RecipientTable)?;
        let Some((table, sub_nodes)) = self.file.open_table(table_nid)? else {
            return Ok(Vec::new());
        };
        table
            .rows_with_ids()
            .map(|(_row_id, row)| {
                self.file
                    .row_properties(&table, &sub_nodes, row)
                    .map(Recipient::new)
            })
            .collect()
    }

    /// `PidTagAttachmentTable` rows; each row's id is the attachment's own [`NodeId`] inside
    /// this message's sub-node map (spec.md §4.10, §4.12).
    pub fn attachments(&self) -> PstResult<Vec<Attachment>> {
        let table_nid = sibling_node_id(self.node_id, NodeIdType::AttachmentTable)?;
        let Some((table, _sub_nodes)) = self.file.open_table(table_nid)? else {
            return Ok(Vec::new());
        };
        table
            .rows_with_ids()
            .map(|(row_id, _row)| {
                Attachment::open(Rc::clone(&self.file), &self.sub_nodes, NodeId::from(row_id))
            })
            .collect()
    }
}

impl PropertyAccess for Message {
    fn properties(&self) -> &PropertyContext {
        &self.properties
    }
}

//! The top-level message store object (C13), rooted at `NID_MESSAGE_STORE`.

use std::rc::Rc;

use crate::ltp::prop_context::PropertyContext;
use crate::ndb::node_id::NID_MESSAGE_STORE;
use crate::{PstFile, PstResult};

use super::item::PropertyAccess;

/// The PC living at `NID_MESSAGE_STORE`: mailbox-wide properties such as the display name
/// shown for the root of the folder tree.
pub struct Store {
    properties: PropertyContext,
}

impl Store {
    pub(crate) fn open(file: Rc<PstFile>) -> PstResult<Self> {
        let (properties, _sub_nodes) = file.open_node(NID_MESSAGE_STORE)?;
        Ok(Self { properties })
    }

    /// `PidTagDisplayName` (0x3001).
    pub fn display_name(&self) -> Option<String> {
        self.string_property(0x3001)
    }
}

impl PropertyAccess for Store {
    fn properties(&self) -> &PropertyContext {
        &self.properties
    }
}

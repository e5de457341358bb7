//! Recipient objects (C13): a thin view over one row of a message's recipient table. Unlike
//! folders and messages, a recipient has no node of its own — its properties are carried
//! inline in the table-context row (spec.md §4.9, §4.12).

use crate::ltp::prop_context::PropertyContext;

use super::item::PropertyAccess;

/// `PidTagDisplayName`.
const PR_DISPLAY_NAME: u16 = 0x3001;
/// `PidTagEmailAddress`.
const PR_EMAIL_ADDRESS: u16 = 0x3003;
/// `PidTagRecipientType`.
const PR_RECIPIENT_TYPE: u16 = 0x0C15;

pub struct Recipient {
    properties: PropertyContext,
}

impl Recipient {
    pub(crate) fn new(properties: PropertyContext) -> Self {
        Self { properties }
    }

    pub fn display_name(&self) -> Option<String> {
        self.string_property(PR_DISPLAY_NAME)
    }

    pub fn email_address(&self) -> Option<String> {
        self.string_property(PR_EMAIL_ADDRESS)
    }

    /// `MAPI_TO` (1), `MAPI_CC` (2), or `MAPI_BCC` (3).
    pub fn recipient_type(&self) -> Option<i32> {
        self.i32_property(PR_RECIPIENT_TYPE)
    }
}

impl PropertyAccess for Recipient {
    fn properties(&self) -> &PropertyContext {
        &self.properties
    }
}

//! Message-class object factory (C12, spec.md §4.12, §9).
//!
//! The source dispatched on duck-typed objects sharing property getters; here the factory
//! returns the tagged [`Item`] variant and callers match on it instead of calling virtual
//! methods (spec.md §9).

use std::rc::Rc;

use crate::ndb::node_id::{NodeId, NodeIdType};
use crate::{PstFile, PstResult};

use super::folder::Folder;
use super::item::Item;
use super::message::Message;

/// Opens `node_id` as whatever typed object its NID type and (for messages) `MessageClass`
/// property select.
pub(crate) fn open_item(file: Rc<PstFile>, node_id: NodeId) -> PstResult<Item> {
    match node_id.id_type()? {
        NodeIdType::NormalFolder | NodeIdType::SearchFolder => {
            Ok(Item::Folder(Folder::open(file, node_id)?))
        }
        _ => {
            let message = Message::open(file, node_id)?;
            let class = message.message_class().unwrap_or_default();
            Ok(wrap_by_class(&class, message))
        }
    }
}

/// The classification spec.md §4.12's prefix table selects, independent of any concrete
/// [`Message`] so it stays unit-testable on its own.
#[derive(Debug, PartialEq, Eq)]
enum MessageKind {
    Message,
    Appointment,
    Contact,
    Task,
    Activity,
}

/// Classifies a `MessageClass` property value. Absent or unrecognized classes fall back to
/// `Message` (spec.md §4.13, §7, scenario S6) rather than failing.
fn classify_message_class(class: &str) -> MessageKind {
    let class = class.to_ascii_uppercase();
    if class.starts_with("IPM.APPOINTMENT") || class.starts_with("IPM.SCHEDULE.MEETING") {
        MessageKind::Appointment
    } else if class.starts_with("IPM.CONTACT") {
        MessageKind::Contact
    } else if class.starts_with("IPM.TASK") {
        MessageKind::Task
    } else if class.starts_with("IPM.ACTIVITY") {
        MessageKind::Activity
    } else {
        if !class.is_empty() && !class.starts_with("IPM.NOTE") && !class.starts_with("REPORT.IPM.NOTE")
        {
            tracing::debug!(message_class = %class, "unrecognized message class, treating as generic Message");
        }
        MessageKind::Message
    }
}

fn wrap_by_class(class: &str, message: Message) -> Item {
    match classify_message_class(class) {
        MessageKind::Message => Item::Message(message),
        MessageKind::Appointment => Item::Appointment(message),
        MessageKind::Contact => Item::Contact(message),
        MessageKind::Task => Item::Task(message),
        MessageKind::Activity => Item::Activity(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_class_falls_back_to_message() {
        assert_eq!(classify_message_class("IPM.Zzz"), MessageKind::Message);
    }

    #[test]
    fn empty_class_falls_back_to_message() {
        assert_eq!(classify_message_class(""), MessageKind::Message);
    }

    #[test]
    fn recognizes_note_and_report_variants() {
        assert_eq!(classify_message_class("IPM.Note"), MessageKind::Message);
        assert_eq!(classify_message_class("IPM.Note.SMIME.MultipartSigned"), MessageKind::Message);
        assert_eq!(classify_message_class("REPORT.IPM.Note.NDR"), MessageKind::Message);
    }

    #[test]
    fn recognizes_appointment_and_meeting_request() {
        assert_eq!(classify_message_class("IPM.Appointment"), MessageKind::Appointment);
        assert_eq!(
            classify_message_class("IPM.Schedule.Meeting.Request"),
            MessageKind::Appointment
        );
    }

    #[test]
    fn recognizes_contact_class() {
        assert_eq!(classify_message_class("IPM.Contact"), MessageKind::Contact);
    }

    #[test]
    fn recognizes_task_and_task_request_subclass() {
        assert_eq!(classify_message_class("IPM.Task"), MessageKind::Task);
        assert_eq!(classify_message_class("IPM.TaskRequest.Accept"), MessageKind::Task);
    }

    #[test]
    fn recognizes_activity_journal_class() {
        assert_eq!(classify_message_class("IPM.Activity"), MessageKind::Activity);
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify_message_class("ipm.contact"), MessageKind::Contact);
    }
}

//! Shared by-tag property accessors, and the tagged variant the object factory (C12) returns
//! in place of the source's duck-typed dispatch (spec.md §9).

use crate::ltp::prop_context::{PropertyContext, PropertyValue};
use crate::ndb::filetime::filetime_to_unix_millis;

use super::folder::Folder;
use super::message::Message;

/// Common by-tag accessors every typed view shares, implemented once against a
/// [`PropertyContext`] (spec.md §4.12: "exposes property accessors by tag").
pub trait PropertyAccess {
    fn properties(&self) -> &PropertyContext;

    fn string_property(&self, prop_id: u16) -> Option<String> {
        match self.properties().get(prop_id)? {
            PropertyValue::Unicode(s) => Some(s.clone()),
            PropertyValue::String8(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
            _ => None,
        }
    }

    fn i32_property(&self, prop_id: u16) -> Option<i32> {
        match self.properties().get(prop_id)? {
            PropertyValue::Integer32(v) => Some(*v),
            _ => None,
        }
    }

    fn bool_property(&self, prop_id: u16) -> Option<bool> {
        match self.properties().get(prop_id)? {
            PropertyValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    fn binary_property(&self, prop_id: u16) -> Option<&[u8]> {
        match self.properties().get(prop_id)? {
            PropertyValue::Binary(bytes) => Some(bytes.as_slice()),
            _ => None,
        }
    }

    /// Milliseconds since the Unix epoch. The PC layer keeps `Time` values as raw FILETIME
    /// ticks; converting is C2's job, applied here at the point of use.
    fn time_property_millis(&self, prop_id: u16) -> Option<i64> {
        match self.properties().get(prop_id)? {
            PropertyValue::Time(ticks) => Some(filetime_to_unix_millis(*ticks as u64)),
            _ => None,
        }
    }
}

/// The tagged variant spec.md §9 asks for: the factory returns one of these, keyed by
/// `MessageClass` prefix, and callers match on it rather than calling virtual methods.
pub enum Item {
    Folder(Folder),
    Message(Message),
    Appointment(Message),
    Contact(Message),
    Task(Message),
    Activity(Message),
}

impl Item {
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Item::Message(m)
            | Item::Appointment(m)
            | Item::Contact(m)
            | Item::Task(m)
            | Item::Activity(m) => Some(m),
            Item::Folder(_) => None,
        }
    }
}

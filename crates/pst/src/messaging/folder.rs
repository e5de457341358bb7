//! Folder objects (C13): the PC at a `NormalFolder`/`SearchFolder` node, its hierarchy/contents
//! tables, and the NBT-fallback child enumeration spec.md §4.12 calls for.

use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

use crate::ltp::prop_context::PropertyContext;
use crate::ndb::node_id::{NodeId, NodeIdType};
use crate::{sibling_node_id, PstFile, PstResult};

use super::item::{Item, PropertyAccess};
use super::object;
use super::MessagingError;

/// `PidTagDisplayName`.
const PR_DISPLAY_NAME: u16 = 0x3001;
/// `PidTagContentCount`.
const PR_CONTENT_COUNT: u16 = 0x3602;
/// `PidTagContentUnreadCount`.
const PR_CONTENT_UNREAD_COUNT: u16 = 0x3603;
/// `PidTagSubfolders`.
const PR_SUBFOLDERS: u16 = 0x360A;

/// A folder: its own properties plus lazily-opened hierarchy/contents tables (spec.md §4.12,
/// §5: "nodes, tables, and heap handles are constructed lazily per request").
pub struct Folder {
    file: Rc<PstFile>,
    node_id: NodeId,
    properties: PropertyContext,
    contents_row_ids: OnceCell<Vec<u32>>,
    cursor: RefCell<usize>,
}

impl Folder {
    pub(crate) fn open(file: Rc<PstFile>, node_id: NodeId) -> PstResult<Self> {
        match node_id.id_type()? {
            NodeIdType::NormalFolder | NodeIdType::SearchFolder => {}
            other => return Err(MessagingError::InvalidFolderNodeIdType(other).into()),
        }
        let (properties, _sub_nodes) = file.open_node(node_id)?;
        Ok(Self {
            file,
            node_id,
            properties,
            contents_row_ids: OnceCell::new(),
            cursor: RefCell::new(0),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn display_name(&self) -> Option<String> {
        self.string_property(PR_DISPLAY_NAME)
    }

    pub fn content_count(&self) -> Option<i32> {
        self.i32_property(PR_CONTENT_COUNT)
    }

    pub fn unread_count(&self) -> Option<i32> {
        self.i32_property(PR_CONTENT_UNREAD_COUNT)
    }

    pub fn has_sub_folders(&self) -> Option<bool> {
        self.bool_property(PR_SUBFOLDERS)
    }

    /// Child folders via the NBT-fallback `parent -> children` map, filtered to folder-shaped
    /// NID types (spec.md §4.12: "children via NBT fallback map, filtering by NID type ∈
    /// {2,3}").
    pub fn sub_folders(&self) -> PstResult<Vec<Folder>> {
        self.file
            .children_of(self.node_id)?
            .iter()
            .filter(|nid| {
                matches!(
                    nid.id_type(),
                    Ok(NodeIdType::NormalFolder) | Ok(NodeIdType::SearchFolder)
                )
            })
            .map(|&nid| Folder::open(Rc::clone(&self.file), nid))
            .collect()
    }

    /// Row count of the hierarchy table (TC at `NID|0x0D`), for comparison against
    /// [`Self::sub_folders`] (spec.md §8 invariant 7).
    pub fn hierarchy_table_row_count(&self) -> PstResult<usize> {
        let nid = sibling_node_id(self.node_id, NodeIdType::HierarchyTable)?;
        Ok(self
            .file
            .open_table(nid)?
            .map(|(table, _sub_nodes)| table.row_count())
            .unwrap_or(0))
    }

    /// Row count of the contents table (TC at `NID|0x0E`).
    pub fn contents_table_row_count(&self) -> PstResult<usize> {
        let nid = sibling_node_id(self.node_id, NodeIdType::ContentsTable)?;
        Ok(self
            .file
            .open_table(nid)?
            .map(|(table, _sub_nodes)| table.row_count())
            .unwrap_or(0))
    }

    fn contents_row_ids(&self) -> PstResult<&[u32]> {
        if self.contents_row_ids.get().is_none() {
            let nid = sibling_node_id(self.node_id, NodeIdType::ContentsTable)?;
            let ids = match self.file.open_table(nid)? {
                Some((table, _sub_nodes)) => table.rows_with_ids().map(|(id, _row)| id).collect(),
                None => Vec::new(),
            };
            let _ = self.contents_row_ids.set(ids);
        }
        Ok(self.contents_row_ids.get().expect("just initialized"))
    }

    /// Advances the contents-table cursor, dispatching the next row's id through the object
    /// factory (spec.md §4.12). `Ok(None)` once every row has been yielded.
    pub fn get_next_child(&self) -> PstResult<Option<Item>> {
        let ids = self.contents_row_ids()?;
        let mut cursor = self.cursor.borrow_mut();
        if *cursor >= ids.len() {
            return Ok(None);
        }
        let row_id = ids[*cursor];
        *cursor += 1;
        drop(cursor);
        object::open_item(Rc::clone(&self.file), NodeId::from(row_id)).map(Some)
    }

    /// Rewinds [`Self::get_next_child`] back to the first row.
    pub fn reset_cursor(&self) {
        *self.cursor.borrow_mut() = 0;
    }
}

impl PropertyAccess for Folder {
    fn properties(&self) -> &PropertyContext {
        &self.properties
    }
}

//! A read-only decoder for Microsoft Outlook PST/OST mailbox files ([MS-PST]).
//!
//! Opening a file validates its header (ANSI/Unicode/Unicode-4K, §[`ndb::header`]), then gives
//! access to the Node B-Tree and Block B-Tree (§[`ndb::page`]) that every other layer is built
//! on: the logical block/XBlock stream reader (§[`ndb::block`]), the Heap-on-Node and its two
//! table formats (§[`ltp`]), the name-to-id map, and the typed folder/message/attachment view
//! layer (§[`messaging`]).
//!
//! [MS-PST]: https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/

use std::cell::{OnceCell, RefCell};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek};
use std::path::Path;
use std::rc::Rc;

use thiserror::Error;
use tracing::instrument;

mod encode;
pub mod ltp;
pub mod messaging;
pub mod ndb;

use ltp::{LtpError, LtpResult};
use messaging::folder::Folder;
use messaging::named_prop::NamedPropertyMap;
use messaging::store::Store;
use messaging::{MessagingError, MessagingResult};
use ndb::block_id::BlockId;
use ndb::header::Header;
use ndb::node_id::{NodeId, NodeIdType, NID_MESSAGE_STORE, NID_ROOT_FOLDER};
use ndb::page::{build_parent_child_map, BbtEntry, BlockBTree, NbtEntry, NodeBTree};
use ndb::subnode::{SubNodeEntry, SubNodeMap};
use ndb::NdbError;

/// The crate-wide error taxonomy (spec.md §6). Every module-level error (`NdbError`,
/// `LtpError`, `MessagingError`) carries its own structural detail; this enum maps each onto
/// the caller-facing shape a client of the library actually needs to branch on.
#[derive(Debug, Error)]
pub enum PstError {
    #[error("not a PST/OST file: bad header magic")]
    BadHeader,
    #[error("unsupported NDB variant")]
    UnsupportedVariant,
    #[error("file uses the unsupported high-encryption (cyclic) method")]
    Encrypted,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("corrupt node: {0}")]
    CorruptNode(String),
    #[error("external property reference could not be resolved")]
    ExternalRefMissing,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<NdbError> for PstError {
    fn from(err: NdbError) -> Self {
        match err {
            NdbError::InvalidNdbHeaderMagicValue(_) => Self::BadHeader,
            NdbError::UnsupportedVariant(_) => Self::UnsupportedVariant,
            NdbError::EncryptedRejected => Self::Encrypted,
            NdbError::Io(io_err) => Self::Io(io_err),
            NdbError::BTreeKeyNotFound(key) => Self::NotFound(format!("b-tree key {key:#x}")),
            NdbError::BlockNotFound(bid) => Self::NotFound(format!("block {bid:?}")),
            NdbError::NodeNotFound(nid) => Self::NotFound(format!("node {nid:?}")),
            other => Self::CorruptNode(other.to_string()),
        }
    }
}

impl From<LtpError> for PstError {
    fn from(err: LtpError) -> Self {
        match err {
            LtpError::Io(io_err) => Self::Io(io_err),
            LtpError::Ndb(ndb_err) => Self::from(ndb_err),
            LtpError::SubNodeNotFound(nid) => Self::ExternalRefMissing.with_context(nid),
            LtpError::UnresolvedExternalValue => Self::ExternalRefMissing,
            LtpError::PropertyNotFound(tag) => Self::NotFound(format!("property {tag:#06X}")),
            other => Self::CorruptNode(other.to_string()),
        }
    }
}

impl From<MessagingError> for PstError {
    fn from(err: MessagingError) -> Self {
        match err {
            MessagingError::Ndb(ndb_err) => Self::from(ndb_err),
            MessagingError::Ltp(ltp_err) => Self::from(ltp_err),
            other => Self::CorruptNode(other.to_string()),
        }
    }
}

/// Tiny extension so `ExternalRefMissing` can still carry a diagnostic id without widening the
/// public enum's shape (spec.md §7: "all structural parse failures carry the offending id").
trait WithContext {
    fn with_context(self, nid: NodeId) -> Self;
}

impl WithContext for PstError {
    fn with_context(self, nid: NodeId) -> Self {
        match self {
            Self::ExternalRefMissing => Self::NotFound(format!("sub-node {nid:?}")),
            other => other,
        }
    }
}

pub type PstResult<T> = Result<T, PstError>;

/// Anything [`PstFile::open_reader`] can read from: a plain file, or an in-memory buffer
/// (spec.md §4.1, C1: "must support both a file path ... and an in-memory buffer").
pub trait PstSource: Read + Seek {}
impl<T: Read + Seek> PstSource for T {}

/// An open PST/OST file: the validated header, the two root B-trees, and the name-to-id map
/// built once at open (spec.md §5). Derived views ([`Folder`], [`messaging::message::Message`],
/// ...) hold an [`Rc`] to this rather than a mutable back-reference, matching the read-only,
/// single-threaded resource model spec.md §5 describes.
pub struct PstFile {
    header: Header,
    node_btree: NodeBTree,
    block_btree: BlockBTree,
    named_props: NamedPropertyMap,
    reader: RefCell<Box<dyn PstSource>>,
    parent_child_map: OnceCell<BTreeMap<u32, Vec<NodeId>>>,
}

impl PstFile {
    /// Opens a PST/OST file from a filesystem path.
    #[instrument(skip_all)]
    pub fn open(path: impl AsRef<Path>) -> PstResult<Rc<Self>> {
        Self::open_reader(Box::new(File::open(path)?))
    }

    /// Opens a PST/OST file already held in memory.
    pub fn open_buffer(buffer: Vec<u8>) -> PstResult<Rc<Self>> {
        Self::open_reader(Box::new(Cursor::new(buffer)))
    }

    /// Validates the header (C4), opens the NBT/BBT (C5), and eagerly builds the name-to-id
    /// map (C11) over whatever byte source the caller provides (C1).
    #[instrument(skip_all)]
    pub fn open_reader(mut reader: Box<dyn PstSource>) -> PstResult<Rc<Self>> {
        let header = Header::read(&mut reader)?;
        let node_btree = NodeBTree::open(&header);
        let block_btree = BlockBTree::open(&header);
        let named_props = NamedPropertyMap::open(&mut reader, &header, &node_btree, &block_btree)?;

        Ok(Rc::new(Self {
            header,
            node_btree,
            block_btree,
            named_props,
            reader: RefCell::new(reader),
            parent_child_map: OnceCell::new(),
        }))
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn named_props(&self) -> &NamedPropertyMap {
        &self.named_props
    }

    pub(crate) fn block_btree(&self) -> &BlockBTree {
        &self.block_btree
    }

    /// Looks up a node's NBT leaf entry directly (the "is this here at all" question; B-tree
    /// `NotFound` is surfaced to the caller per spec.md §4.13).
    pub(crate) fn nbt_entry(&self, nid: NodeId) -> PstResult<NbtEntry> {
        let mut reader = self.reader.borrow_mut();
        self.node_btree
            .find_entry(&mut *reader, u64::from(u32::from(nid)))
            .map_err(PstError::from)
    }

    pub(crate) fn bbt_entry(&self, bid: BlockId) -> PstResult<BbtEntry> {
        let mut reader = self.reader.borrow_mut();
        self.block_btree
            .resolve(&mut *reader, bid)
            .map_err(PstError::from)
    }

    pub(crate) fn sub_nodes(&self, sub_node_bid: BlockId) -> PstResult<SubNodeMap> {
        let mut reader = self.reader.borrow_mut();
        SubNodeMap::open(&mut *reader, &self.block_btree, self.header.width(), sub_node_bid)
            .map_err(|err| PstError::from(NdbError::from(err)))
    }

    pub(crate) fn node_stream(&self, bid: BlockId) -> PstResult<Vec<u8>> {
        let mut reader = self.reader.borrow_mut();
        ndb::block::read_node_stream(&mut *reader, &self.header, &self.block_btree, bid)
            .map_err(PstError::from)
    }

    /// Builds the property context and sub-node map for `nid`'s NBT entry in one step — the
    /// shape every [`messaging`] typed view is constructed from (spec.md §4.12).
    pub(crate) fn open_node(&self, nid: NodeId) -> PstResult<(ltp::prop_context::PropertyContext, SubNodeMap)> {
        let entry = self.nbt_entry(nid)?;
        let sub_nodes = self.sub_nodes(entry.sub_node_bid)?;
        let mut reader = self.reader.borrow_mut();
        let pc = ltp::prop_context::PropertyContext::open(
            &mut *reader,
            &self.header,
            &self.block_btree,
            entry.data_bid,
            &sub_nodes,
        )?;
        Ok((pc, sub_nodes))
    }

    /// Builds the property context and (nested) sub-node map for an entry already resolved out
    /// of a node's own sub-node map — the shape an attachment's PC is built from, since
    /// attachments live as sub-nodes of their owning message rather than as their own NBT entry
    /// (spec.md §4.10).
    pub(crate) fn open_sub_node(
        &self,
        entry: SubNodeEntry,
    ) -> PstResult<(ltp::prop_context::PropertyContext, SubNodeMap)> {
        let nested_sub_nodes = self.sub_nodes(entry.sub_node_bid)?;
        let mut reader = self.reader.borrow_mut();
        let pc = ltp::prop_context::PropertyContext::open(
            &mut *reader,
            &self.header,
            &self.block_btree,
            entry.data_bid,
            &nested_sub_nodes,
        )?;
        Ok((pc, nested_sub_nodes))
    }

    /// Opens the table context living at `nid` (a folder's hierarchy/contents table, or a
    /// message's attachment/recipient table), if that auxiliary node exists.
    pub(crate) fn open_table(
        &self,
        nid: NodeId,
    ) -> PstResult<Option<(ltp::table_context::TableContext, SubNodeMap)>> {
        let entry = match self.nbt_entry(nid) {
            Ok(entry) => entry,
            Err(PstError::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };
        let sub_nodes = self.sub_nodes(entry.sub_node_bid)?;
        let mut reader = self.reader.borrow_mut();
        let tc = ltp::table_context::TableContext::open(
            &mut *reader,
            &self.header,
            &self.block_btree,
            entry.data_bid,
            &sub_nodes,
        )?;
        Ok(Some((tc, sub_nodes)))
    }

    /// Reconstructs one table-context row's full property map (a recipient row carries its
    /// values inline, rather than behind a node id, so this is the PC a [`messaging::recipient
    /// ::Recipient`] is built from).
    pub(crate) fn row_properties(
        &self,
        table: &ltp::table_context::TableContext,
        sub_nodes: &SubNodeMap,
        row: &[u8],
    ) -> PstResult<ltp::prop_context::PropertyContext> {
        let mut reader = self.reader.borrow_mut();
        let mut map = BTreeMap::new();
        for column in table.columns() {
            if let Some(value) =
                table.get(&mut *reader, &self.header, &self.block_btree, sub_nodes, row, column)?
            {
                map.insert(column.prop_id, value);
            }
        }
        Ok(ltp::prop_context::PropertyContext::from_map(map))
    }

    /// The NBT-fallback `parentNid -> childNid[]` map (spec.md §4.5, §5: "lazily built on first
    /// access and memoized"), used when a folder's hierarchy table is missing or broken.
    pub(crate) fn children_of(&self, parent: NodeId) -> PstResult<&[NodeId]> {
        if self.parent_child_map.get().is_none() {
            let mut reader = self.reader.borrow_mut();
            let map = build_parent_child_map(&self.node_btree, &mut *reader)?;
            drop(reader);
            // Another call may have raced us via a re-entrant borrow; OnceCell::set tolerates
            // losing that race since the computed map is identical either way.
            let _ = self.parent_child_map.set(map);
        }
        Ok(self
            .parent_child_map
            .get()
            .expect("just initialized")
            .get(&u32::from(parent))
            .map(Vec::as_slice)
            .unwrap_or(&[]))
    }

    /// The top-level message store object (`NID_MESSAGE_STORE`).
    pub fn message_store(self: &Rc<Self>) -> PstResult<Store> {
        Store::open(Rc::clone(self))
    }

    /// The IPM sub-tree root folder (`NID_ROOT_FOLDER`).
    pub fn root_folder(self: &Rc<Self>) -> PstResult<Folder> {
        Folder::open(Rc::clone(self), NID_ROOT_FOLDER)
    }
}

/// Rebuilds `nid`'s index with a different [`NodeIdType`] — the auxiliary hierarchy/contents/
/// attachment/recipient-table nodes and a folder/message's own descriptor share the same
/// instance number, only the low 5 type bits differ (spec.md §3, §4.12).
pub(crate) fn sibling_node_id(nid: NodeId, id_type: NodeIdType) -> MessagingResult<NodeId> {
    NodeId::new(id_type, nid.index()).map_err(MessagingError::from)
}

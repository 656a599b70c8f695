//! A process-shared replicated document: named map/array roots, nested
//! nodes, and atomic multi-write transactions tagged with an origin.
//!
//! Collaborative deployments hang these documents off a sync layer which
//! ships one update per committed transaction, so writers are expected to
//! keep each transaction below the wire-size limit of that layer. The
//! version store is one writer among several modules sharing a document,
//! which is why roots may pre-exist in a foreign or untyped state and need
//! normalizing before use (see [`Doc::get_or_insert_map`]).
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::err::Error;

/// A value stored in a document: scalars, byte buffers, or nested
/// containers.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Text(String),
	Bytes(Bytes),
	Map(BTreeMap<String, Node>),
	Array(Vec<Node>),
}

impl Node {
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Node::Bool(v) => Some(*v),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Node::Int(v) => Some(*v),
			Node::Float(v) if v.fract() == 0.0 => Some(*v as i64),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Node::Text(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_bytes(&self) -> Option<&Bytes> {
		match self {
			Node::Bytes(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_map(&self) -> Option<&BTreeMap<String, Node>> {
		match self {
			Node::Map(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_array(&self) -> Option<&Vec<Node>> {
		match self {
			Node::Array(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Node>> {
		match self {
			Node::Map(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_array_mut(&mut self) -> Option<&mut Vec<Node>> {
		match self {
			Node::Array(v) => Some(v),
			_ => None,
		}
	}
}

impl From<bool> for Node {
	fn from(v: bool) -> Self {
		Node::Bool(v)
	}
}

impl From<i64> for Node {
	fn from(v: i64) -> Self {
		Node::Int(v)
	}
}

impl From<&str> for Node {
	fn from(v: &str) -> Self {
		Node::Text(v.to_owned())
	}
}

impl From<String> for Node {
	fn from(v: String) -> Self {
		Node::Text(v)
	}
}

impl From<Bytes> for Node {
	fn from(v: Bytes) -> Self {
		Node::Bytes(v)
	}
}

/// One root in the document's share table.
#[derive(Clone, Debug)]
enum Share {
	Map(BTreeMap<String, Node>),
	Array(Vec<Node>),
	/// A placeholder created before any module declared the root's type,
	/// e.g. by a sync layer integrating updates for a root the local code
	/// has not touched yet.
	Abstract(AbstractRoot),
}

/// The internal state of a placeholder root: its keyed entries and its
/// sequence content.
#[derive(Clone, Debug, Default)]
pub struct AbstractRoot {
	doc_id: Uuid,
	entries: BTreeMap<String, Node>,
	items: Vec<Node>,
}

/// One committed transaction, as seen by update observers.
#[derive(Clone, Debug)]
pub struct UpdateEvent {
	pub origin: Option<String>,
	pub sequence: u64,
}

#[derive(Default)]
struct DocState {
	shares: BTreeMap<String, Share>,
}

type Observer = Box<dyn Fn(&UpdateEvent) + Send + Sync>;

struct DocInner {
	state: RwLock<DocState>,
	observers: Mutex<Vec<Observer>>,
	sequence: AtomicU64,
}

/// A shared replicated document. Clones are handles onto the same
/// underlying state.
#[derive(Clone)]
pub struct Doc {
	id: Uuid,
	inner: Arc<DocInner>,
}

impl Default for Doc {
	fn default() -> Self {
		Doc::new()
	}
}

impl Doc {
	pub fn new() -> Self {
		Doc {
			id: Uuid::new_v4(),
			inner: Arc::new(DocInner {
				state: RwLock::new(DocState::default()),
				observers: Mutex::new(Vec::new()),
				sequence: AtomicU64::new(0),
			}),
		}
	}

	pub fn id(&self) -> Uuid {
		self.id
	}

	/// Register a callback invoked once per committed transaction.
	pub fn observe_update<F>(&self, f: F)
	where
		F: Fn(&UpdateEvent) + Send + Sync + 'static,
	{
		self.inner.observers.lock().push(Box::new(f));
	}

	/// Whether locally constructed nested arrays can be integrated into
	/// this document's roots. Always true for roots this library created;
	/// hosts mixing library copies lose this and fall back to flat
	/// encodings.
	pub fn supports_nested_arrays(&self) -> bool {
		true
	}

	/// Ensure a root exists as a map, normalizing as needed.
	///
	/// Missing roots are created. An existing map is reused as is. A
	/// placeholder abstract root belonging to this document is rewrapped:
	/// its internal entry state carries over and every child is reparented
	/// into the new map. A placeholder from a different document instance
	/// is never rewrapped, and a root whose content is genuinely
	/// sequence-typed cannot become a map.
	pub fn get_or_insert_map(&self, name: &str) -> Result<(), Error> {
		let mut state = self.inner.state.write();
		match state.shares.get(name) {
			None => {
				state.shares.insert(name.to_owned(), Share::Map(BTreeMap::new()));
				Ok(())
			}
			Some(Share::Map(_)) => Ok(()),
			Some(Share::Array(_)) => Err(Error::RootTypeMismatch(name.to_owned())),
			Some(Share::Abstract(placeholder)) => {
				if placeholder.doc_id != self.id {
					return Err(Error::Store(format!(
						"root `{name}` was created by a different document instance and cannot be rewrapped"
					)));
				}
				if !placeholder.items.is_empty() {
					return Err(Error::RootTypeMismatch(name.to_owned()));
				}
				debug!("rewrapping placeholder root `{name}` into a map");
				let entries = placeholder.entries.clone();
				state.shares.insert(name.to_owned(), Share::Map(entries));
				Ok(())
			}
		}
	}

	/// Create a placeholder root, keeping whatever state it already has.
	/// This is how generic modules touch roots without typing them.
	pub fn get_or_insert_abstract(&self, name: &str) {
		let mut state = self.inner.state.write();
		if !state.shares.contains_key(name) {
			state.shares.insert(
				name.to_owned(),
				Share::Abstract(AbstractRoot {
					doc_id: self.id,
					..Default::default()
				}),
			);
		}
	}

	/// Seed a placeholder root with entries, as an integrated update for an
	/// untyped root would. `doc_id` records which document instance created
	/// the placeholder.
	pub fn insert_abstract_root(
		&self,
		name: &str,
		doc_id: Uuid,
		entries: BTreeMap<String, Node>,
		items: Vec<Node>,
	) {
		let mut state = self.inner.state.write();
		state.shares.insert(
			name.to_owned(),
			Share::Abstract(AbstractRoot {
				doc_id,
				entries,
				items,
			}),
		);
	}

	/// Begin a read transaction.
	pub fn transact(&self) -> Transaction<'_> {
		Transaction {
			guard: self.inner.state.read(),
		}
	}

	/// Begin a write transaction with no origin.
	pub fn transact_mut(&self) -> TransactionMut<'_> {
		self.begin(None)
	}

	/// Begin a write transaction tagged with an origin, so observers can
	/// attribute and filter the resulting update.
	pub fn transact_mut_with(&self, origin: impl Into<String>) -> TransactionMut<'_> {
		self.begin(Some(origin.into()))
	}

	fn begin(&self, origin: Option<String>) -> TransactionMut<'_> {
		let guard = self.inner.state.write();
		let snapshot = DocState {
			shares: guard.shares.clone(),
		};
		TransactionMut {
			doc: self.clone(),
			guard: Some(guard),
			snapshot: Some(snapshot),
			origin,
			committed: false,
		}
	}

	fn emit(&self, event: &UpdateEvent) {
		for observer in self.inner.observers.lock().iter() {
			observer(event);
		}
	}
}

/// A read transaction. Holds the document open for consistent reads.
pub struct Transaction<'a> {
	guard: RwLockReadGuard<'a, DocState>,
}

impl Transaction<'_> {
	/// A map root's entries, if the root exists as a map.
	pub fn map_root(&self, name: &str) -> Option<&BTreeMap<String, Node>> {
		match self.guard.shares.get(name) {
			Some(Share::Map(entries)) => Some(entries),
			_ => None,
		}
	}
}

/// A write transaction. All writes land atomically on commit; dropping the
/// transaction without committing rolls every write back.
pub struct TransactionMut<'a> {
	doc: Doc,
	guard: Option<RwLockWriteGuard<'a, DocState>>,
	snapshot: Option<DocState>,
	origin: Option<String>,
	committed: bool,
}

impl TransactionMut<'_> {
	/// Mutable access to a map root's entries.
	pub fn map_root_mut(&mut self, name: &str) -> Result<&mut BTreeMap<String, Node>, Error> {
		let state = self.guard.as_mut().ok_or(Error::TxFinished)?;
		match state.shares.get_mut(name) {
			Some(Share::Map(entries)) => Ok(entries),
			Some(_) => Err(Error::RootTypeMismatch(name.to_owned())),
			None => Err(Error::Store(format!("root `{name}` does not exist"))),
		}
	}

	/// Commit the transaction, publishing one update to observers.
	pub fn commit(mut self) {
		self.committed = true;
		self.snapshot = None;
		// release the lock before observers run
		self.guard = None;
		let event = UpdateEvent {
			origin: self.origin.take(),
			sequence: self.doc.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1,
		};
		self.doc.emit(&event);
	}
}

impl Drop for TransactionMut<'_> {
	fn drop(&mut self) {
		if !self.committed {
			if let (Some(guard), Some(snapshot)) = (self.guard.as_mut(), self.snapshot.take()) {
				warn!("a transaction was dropped without being committed; rolling back");
				**guard = snapshot;
			}
		}
	}
}

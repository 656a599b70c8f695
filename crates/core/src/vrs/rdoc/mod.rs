#![cfg(feature = "store-rdoc")]

//! The streaming version store backed by a shared replicated document.
//!
//! Records live under two map roots the store exclusively owns:
//! `versions` (id to record map) and `versionsMeta` (an `order` array used
//! as the insertion-order tie-breaker). Snapshots are written as chunk
//! batches across many small transactions so that no single replicated
//! update exceeds the sync layer's wire-size limit; a crashed writer
//! leaves a record which a later prune pass either finalizes or removes.
use std::collections::{BTreeMap, HashSet};

use bytes::{Bytes, BytesMut};

use crate::cnf::{PRUNE_INCOMPLETE_AFTER_MS, SNAPSHOT_CHUNK_SIZE, SNAPSHOT_TRANSACTION_BYTES};
use crate::err::Error;
use crate::rdc::{Doc, Node};
use crate::vrs::now_ms;
use crate::vrs::rec::field;
use crate::vrs::rec::{
	CheckpointMeta, Compression, SnapshotEncoding, VersionAuthor, VersionKind, VersionRecord,
	VersionUpdate, SCHEMA_VERSION,
};
use crate::vrs::{enc, sort_listing};

/// The map root holding one record map per version id.
pub const VERSIONS_ROOT: &str = "versions";

/// The map root holding the `order` array.
pub const META_ROOT: &str = "versionsMeta";

/// The default transaction origin, so other observers of the shared
/// document can filter this store's writes.
pub const DEFAULT_ORIGIN: &str = "gridbook.versions";

#[derive(Clone, Debug)]
pub struct RdocStoreOptions {
	/// Bytes per chunk in streaming mode.
	pub chunk_size: usize,
	/// Chunks per transaction; derived from the transaction byte budget
	/// when not set explicitly.
	pub max_chunks_per_transaction: Option<usize>,
	pub compression: Compression,
	pub encoding: SnapshotEncoding,
	/// Whether saves stream across multiple transactions.
	pub streaming: bool,
	pub origin: String,
}

impl Default for RdocStoreOptions {
	fn default() -> Self {
		RdocStoreOptions {
			chunk_size: *SNAPSHOT_CHUNK_SIZE,
			max_chunks_per_transaction: None,
			compression: Compression::None,
			encoding: SnapshotEncoding::Chunks,
			streaming: true,
			origin: DEFAULT_ORIGIN.to_owned(),
		}
	}
}

/// Controls for [`RdocStore::prune_incomplete_versions`].
#[derive(Clone, Copy, Debug)]
pub struct PruneOptions {
	/// How old an unfinalizable incomplete record must be before removal.
	pub older_than_ms: i64,
}

impl Default for PruneOptions {
	fn default() -> Self {
		PruneOptions {
			older_than_ms: *PRUNE_INCOMPLETE_AFTER_MS,
		}
	}
}

/// What one prune pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PruneOutcome {
	pub finalized: usize,
	pub pruned: usize,
}

pub struct RdocStore {
	doc: Doc,
	opts: RdocStoreOptions,
	/// Serializes writers sharing this store handle.
	write_lock: tokio::sync::Mutex<()>,
}

impl RdocStore {
	/// Attach a store to a shared document, normalizing both roots.
	pub fn new(doc: Doc, opts: RdocStoreOptions) -> Result<RdocStore, Error> {
		doc.get_or_insert_map(VERSIONS_ROOT)?;
		doc.get_or_insert_map(META_ROOT)?;
		Ok(RdocStore {
			doc,
			opts,
			write_lock: tokio::sync::Mutex::new(()),
		})
	}

	fn max_chunks_per_transaction(&self) -> usize {
		match self.opts.max_chunks_per_transaction {
			Some(n) => n.max(1),
			None => (*SNAPSHOT_TRANSACTION_BYTES / self.opts.chunk_size).max(1),
		}
	}

	pub async fn save_version(&self, record: &VersionRecord) -> Result<(), Error> {
		let _guard = self.write_lock.lock().await;
		let payload = match self.opts.compression {
			Compression::Gzip => enc::gzip_compress(&record.snapshot)?,
			Compression::None => record.snapshot.clone(),
		};
		if self.opts.streaming
			&& self.opts.encoding == SnapshotEncoding::Chunks
			&& self.doc.supports_nested_arrays()
		{
			self.save_streaming(record, payload)
		} else if self.opts.encoding == SnapshotEncoding::Chunks
			&& self.doc.supports_nested_arrays()
		{
			self.save_single(record, payload, SnapshotEncoding::Chunks)
		} else {
			// nested chunk arrays cannot be constructed; fall back to one
			// base64 transaction
			self.save_single(record, payload, SnapshotEncoding::Base64)
		}
	}

	fn save_streaming(&self, record: &VersionRecord, payload: Bytes) -> Result<(), Error> {
		let chunks = split_chunks(&payload, self.opts.chunk_size);
		let expected = chunks.len();
		{
			let mut txn = self.doc.transact_mut_with(self.opts.origin.clone());
			let entries =
				metadata_entries(record, self.opts.compression, SnapshotEncoding::Chunks, expected);
			let versions = txn.map_root_mut(VERSIONS_ROOT)?;
			versions.insert(record.id.clone(), Node::Map(entries));
			append_order(txn.map_root_mut(META_ROOT)?, &record.id);
			txn.commit();
		}
		for batch in chunks.chunks(self.max_chunks_per_transaction()) {
			let mut txn = self.doc.transact_mut_with(self.opts.origin.clone());
			let versions = txn.map_root_mut(VERSIONS_ROOT)?;
			let chunk_array = versions
				.get_mut(&record.id)
				.and_then(Node::as_map_mut)
				.and_then(|entries| entries.get_mut(field::SNAPSHOT_CHUNKS))
				.and_then(Node::as_array_mut)
				.ok_or_else(|| {
					Error::Store(format!("record `{}` vanished mid-stream", record.id))
				})?;
			chunk_array.extend(batch.iter().cloned().map(Node::Bytes));
			txn.commit();
		}
		{
			let mut txn = self.doc.transact_mut_with(self.opts.origin.clone());
			let versions = txn.map_root_mut(VERSIONS_ROOT)?;
			let entries = versions
				.get_mut(&record.id)
				.and_then(Node::as_map_mut)
				.ok_or_else(|| {
					Error::Store(format!("record `{}` vanished mid-stream", record.id))
				})?;
			entries.insert(field::SNAPSHOT_COMPLETE.to_owned(), Node::Bool(true));
			txn.commit();
		}
		Ok(())
	}

	fn save_single(
		&self,
		record: &VersionRecord,
		payload: Bytes,
		encoding: SnapshotEncoding,
	) -> Result<(), Error> {
		let mut txn = self.doc.transact_mut_with(self.opts.origin.clone());
		let mut entries = match encoding {
			SnapshotEncoding::Chunks => {
				let chunks = split_chunks(&payload, self.opts.chunk_size);
				let expected = chunks.len();
				let mut entries = metadata_entries(
					record,
					self.opts.compression,
					SnapshotEncoding::Chunks,
					expected,
				);
				entries.insert(
					field::SNAPSHOT_CHUNKS.to_owned(),
					Node::Array(chunks.into_iter().map(Node::Bytes).collect()),
				);
				entries
			}
			SnapshotEncoding::Base64 => {
				let mut entries =
					metadata_entries(record, self.opts.compression, SnapshotEncoding::Base64, 0);
				entries.insert(
					field::SNAPSHOT_BASE64.to_owned(),
					Node::Text(enc::bytes_to_base64(&payload)),
				);
				entries
			}
		};
		entries.insert(field::SNAPSHOT_COMPLETE.to_owned(), Node::Bool(true));
		let versions = txn.map_root_mut(VERSIONS_ROOT)?;
		versions.insert(record.id.clone(), Node::Map(entries));
		append_order(txn.map_root_mut(META_ROOT)?, &record.id);
		txn.commit();
		Ok(())
	}

	/// Fetch a readable record. Incomplete or missing records yield `None`;
	/// corrupt metadata on an otherwise complete record is an error.
	pub async fn get_version(&self, id: &str) -> Result<Option<VersionRecord>, Error> {
		let txn = self.doc.transact();
		let versions = txn
			.map_root(VERSIONS_ROOT)
			.ok_or_else(|| Error::Store("versions root is missing".to_owned()))?;
		match versions.get(id).and_then(Node::as_map) {
			Some(entries) => read_record(id, entries),
			None => Ok(None),
		}
	}

	/// List readable records, newest first. Stale incomplete records are
	/// opportunistically finalized or removed beforehand.
	pub async fn list_versions(&self) -> Result<Vec<VersionRecord>, Error> {
		if let Err(e) = self.prune_incomplete_versions(PruneOptions::default()).await {
			debug!("opportunistic prune failed: {e}");
		}
		let (ids, order) = {
			let txn = self.doc.transact();
			let versions = txn
				.map_root(VERSIONS_ROOT)
				.ok_or_else(|| Error::Store("versions root is missing".to_owned()))?;
			let ids: Vec<String> = versions.keys().cloned().collect();
			(ids, self.read_order(&txn))
		};
		let mut listing = Vec::with_capacity(ids.len());
		for id in ids {
			if let Some(record) = self.get_version(&id).await? {
				let insertion = order.iter().position(|o| *o == record.id).unwrap_or(0);
				listing.push((record, insertion));
			}
		}
		Ok(sort_listing(listing))
	}

	pub async fn update_version(&self, id: &str, update: VersionUpdate) -> Result<(), Error> {
		let _guard = self.write_lock.lock().await;
		let exists = {
			let txn = self.doc.transact();
			txn.map_root(VERSIONS_ROOT).is_some_and(|v| v.contains_key(id))
		};
		if !exists {
			return Err(Error::VersionNotFound(id.to_owned()));
		}
		let Some(locked) = update.checkpoint_locked else {
			return Ok(());
		};
		let mut txn = self.doc.transact_mut_with(self.opts.origin.clone());
		if let Some(entries) = txn.map_root_mut(VERSIONS_ROOT)?.get_mut(id).and_then(Node::as_map_mut)
		{
			entries.insert(field::CHECKPOINT_LOCKED.to_owned(), Node::Bool(locked));
		}
		txn.commit();
		Ok(())
	}

	/// Remove a record and scrub every occurrence of its id from the order
	/// array. Removing an absent id is a no-op.
	pub async fn delete_version(&self, id: &str) -> Result<(), Error> {
		let _guard = self.write_lock.lock().await;
		let mut txn = self.doc.transact_mut_with(self.opts.origin.clone());
		txn.map_root_mut(VERSIONS_ROOT)?.remove(id);
		scrub_order(txn.map_root_mut(META_ROOT)?, &HashSet::from([id.to_owned()]));
		txn.commit();
		Ok(())
	}

	/// Finalize or remove incomplete records left behind by crashed
	/// writers.
	///
	/// A record whose payload is fully present and whose metadata is valid
	/// is finalized in place. Anything else is removed once it has been
	/// incomplete for longer than the staleness threshold, judged from
	/// `createdAtMs`, falling back to `timestampMs`. When neither yields a
	/// trustworthy local time the record is stamped on first observation
	/// and ages from there, so it never becomes younger again.
	pub async fn prune_incomplete_versions(
		&self,
		opts: PruneOptions,
	) -> Result<PruneOutcome, Error> {
		let _guard = self.write_lock.lock().await;
		let now = now_ms();
		let mut finalize: Vec<String> = Vec::new();
		let mut prune: HashSet<String> = HashSet::new();
		let mut stamp: Vec<String> = Vec::new();
		{
			let txn = self.doc.transact();
			let versions = txn
				.map_root(VERSIONS_ROOT)
				.ok_or_else(|| Error::Store("versions root is missing".to_owned()))?;
			for (id, node) in versions.iter() {
				let Some(entries) = node.as_map() else {
					prune.insert(id.clone());
					continue;
				};
				if !is_incomplete(entries) {
					continue;
				}
				if payload_present(entries) && metadata_valid(entries) {
					finalize.push(id.clone());
					continue;
				}
				let own = entries
					.get(field::CREATED_AT_MS)
					.and_then(Node::as_int)
					.or_else(|| entries.get(field::TIMESTAMP_MS).and_then(Node::as_int));
				let age_from = match own {
					Some(v) if v <= now => v.clamp(0, now),
					// a future timestamp is untrustworthy; age from first
					// observation instead
					Some(_) => match entries.get(field::INCOMPLETE_SINCE_MS).and_then(Node::as_int)
					{
						Some(since) => since.clamp(0, now),
						None => {
							stamp.push(id.clone());
							now
						}
					},
					None => 0,
				};
				if now - age_from >= opts.older_than_ms {
					prune.insert(id.clone());
				}
			}
		}
		let outcome = PruneOutcome {
			finalized: finalize.len(),
			pruned: prune.len(),
		};
		if finalize.is_empty() && prune.is_empty() && stamp.is_empty() {
			return Ok(outcome);
		}
		let mut txn = self.doc.transact_mut_with(self.opts.origin.clone());
		let versions = txn.map_root_mut(VERSIONS_ROOT)?;
		let mut finalized = 0;
		for id in &finalize {
			if let Some(entries) = versions.get_mut(id).and_then(Node::as_map_mut) {
				// the record must still qualify at commit time
				if payload_present(entries) && metadata_valid(entries) {
					entries.insert(field::SNAPSHOT_COMPLETE.to_owned(), Node::Bool(true));
					finalized += 1;
				}
			}
		}
		for id in &stamp {
			if let Some(entries) = versions.get_mut(id).and_then(Node::as_map_mut) {
				entries.entry(field::INCOMPLETE_SINCE_MS.to_owned()).or_insert(Node::Int(now));
			}
		}
		for id in &prune {
			versions.remove(id);
		}
		scrub_order(txn.map_root_mut(META_ROOT)?, &prune);
		txn.commit();
		Ok(PruneOutcome {
			finalized,
			pruned: outcome.pruned,
		})
	}

	fn read_order(&self, txn: &crate::rdc::Transaction<'_>) -> Vec<String> {
		txn.map_root(META_ROOT)
			.and_then(|meta| meta.get(field::ORDER))
			.and_then(Node::as_array)
			.map(|order| order.iter().filter_map(|n| n.as_str().map(str::to_owned)).collect())
			.unwrap_or_default()
	}
}

fn split_chunks(payload: &Bytes, size: usize) -> Vec<Bytes> {
	// an empty snapshot still streams as a single empty chunk
	if payload.is_empty() {
		return vec![Bytes::new()];
	}
	let size = size.max(1);
	(0..payload.len())
		.step_by(size)
		.map(|offset| payload.slice(offset..(offset + size).min(payload.len())))
		.collect()
}

fn metadata_entries(
	record: &VersionRecord,
	compression: Compression,
	encoding: SnapshotEncoding,
	expected_chunks: usize,
) -> BTreeMap<String, Node> {
	let mut entries = BTreeMap::new();
	entries.insert(field::SCHEMA_VERSION.to_owned(), Node::Int(SCHEMA_VERSION));
	entries.insert(field::ID.to_owned(), Node::from(record.id.as_str()));
	entries.insert(field::KIND.to_owned(), Node::from(record.kind.to_str()));
	entries.insert(field::TIMESTAMP_MS.to_owned(), Node::Int(record.timestamp_ms));
	entries.insert(
		field::CREATED_AT_MS.to_owned(),
		Node::Int(record.created_at_ms.unwrap_or_else(now_ms)),
	);
	if let Some(author) = &record.author {
		entries.insert(field::AUTHOR_USER_ID.to_owned(), Node::from(author.user_id.as_str()));
		entries
			.insert(field::AUTHOR_USER_NAME.to_owned(), Node::from(author.user_name.as_str()));
	}
	if let Some(description) = &record.description {
		entries.insert(field::DESCRIPTION.to_owned(), Node::from(description.as_str()));
	}
	if let Some(checkpoint) = &record.checkpoint {
		if let Some(name) = &checkpoint.name {
			entries.insert(field::CHECKPOINT_NAME.to_owned(), Node::from(name.as_str()));
		}
		entries.insert(field::CHECKPOINT_LOCKED.to_owned(), Node::Bool(checkpoint.locked));
		if let Some(annotations) = &checkpoint.annotations {
			entries.insert(
				field::CHECKPOINT_ANNOTATIONS.to_owned(),
				Node::from(annotations.to_string()),
			);
		}
	}
	entries.insert(field::COMPRESSION.to_owned(), Node::from(compression.to_str()));
	entries.insert(field::SNAPSHOT_ENCODING.to_owned(), Node::from(encoding.to_str()));
	entries.insert(
		field::SNAPSHOT_CHUNK_COUNT_EXPECTED.to_owned(),
		Node::Int(expected_chunks as i64),
	);
	entries.insert(field::SNAPSHOT_COMPLETE.to_owned(), Node::Bool(false));
	if encoding == SnapshotEncoding::Chunks {
		entries.insert(field::SNAPSHOT_CHUNKS.to_owned(), Node::Array(Vec::new()));
	}
	entries
}

fn append_order(meta: &mut BTreeMap<String, Node>, id: &str) {
	let order = meta
		.entry(field::ORDER.to_owned())
		.or_insert_with(|| Node::Array(Vec::new()));
	if let Some(items) = order.as_array_mut() {
		if !items.iter().any(|n| n.as_str() == Some(id)) {
			items.push(Node::from(id));
		}
	}
}

fn scrub_order(meta: &mut BTreeMap<String, Node>, ids: &HashSet<String>) {
	if let Some(order) = meta.get_mut(field::ORDER).and_then(Node::as_array_mut) {
		// tail to head, so every occurrence goes
		for i in (0..order.len()).rev() {
			if order[i].as_str().is_some_and(|s| ids.contains(s)) {
				order.remove(i);
			}
		}
	}
}

/// Whether a record is *not* readable yet: completion flag unset, or the
/// encoded payload missing or short.
fn is_incomplete(entries: &BTreeMap<String, Node>) -> bool {
	let complete = entries
		.get(field::SNAPSHOT_COMPLETE)
		.and_then(Node::as_bool)
		.unwrap_or(false);
	!complete || !payload_present(entries)
}

/// Whether the snapshot payload is fully present for the record's
/// encoding.
fn payload_present(entries: &BTreeMap<String, Node>) -> bool {
	let encoding = entries
		.get(field::SNAPSHOT_ENCODING)
		.and_then(Node::as_str)
		.and_then(SnapshotEncoding::parse);
	match encoding {
		Some(SnapshotEncoding::Base64) => {
			matches!(entries.get(field::SNAPSHOT_BASE64), Some(Node::Text(_)))
		}
		Some(SnapshotEncoding::Chunks) => {
			let expected = entries
				.get(field::SNAPSHOT_CHUNK_COUNT_EXPECTED)
				.and_then(Node::as_int)
				.unwrap_or(i64::MAX);
			match entries.get(field::SNAPSHOT_CHUNKS).and_then(Node::as_array) {
				Some(chunks) => (chunks.len() as i64) >= expected,
				None => false,
			}
		}
		None => false,
	}
}

/// Whether the scalar metadata would pass [`read_record`]'s checks.
fn metadata_valid(entries: &BTreeMap<String, Node>) -> bool {
	entries.get(field::SCHEMA_VERSION).and_then(Node::as_int) == Some(SCHEMA_VERSION)
		&& entries
			.get(field::KIND)
			.and_then(Node::as_str)
			.and_then(VersionKind::parse)
			.is_some()
		&& entries.get(field::TIMESTAMP_MS).and_then(Node::as_int).is_some()
}

fn read_record(
	id: &str,
	entries: &BTreeMap<String, Node>,
) -> Result<Option<VersionRecord>, Error> {
	// incomplete records are hidden, never surfaced as errors
	if is_incomplete(entries) {
		return Ok(None);
	}
	let schema = entries.get(field::SCHEMA_VERSION).and_then(Node::as_int);
	if schema != Some(SCHEMA_VERSION) {
		return Err(Error::CorruptVersion(format!(
			"{id}: unsupported schema version {schema:?}"
		)));
	}
	let kind = entries
		.get(field::KIND)
		.and_then(Node::as_str)
		.and_then(VersionKind::parse)
		.ok_or_else(|| Error::CorruptVersion(format!("{id}: unrecognized kind")))?;
	let timestamp_ms = entries
		.get(field::TIMESTAMP_MS)
		.and_then(Node::as_int)
		.ok_or_else(|| Error::CorruptVersion(format!("{id}: timestampMs is not a number")))?;
	let compression = entries
		.get(field::COMPRESSION)
		.and_then(Node::as_str)
		.and_then(Compression::parse)
		.ok_or_else(|| Error::CorruptVersion(format!("{id}: unrecognized compression")))?;
	let encoding = entries
		.get(field::SNAPSHOT_ENCODING)
		.and_then(Node::as_str)
		.and_then(SnapshotEncoding::parse)
		.ok_or_else(|| Error::CorruptVersion(format!("{id}: unrecognized encoding")))?;

	let payload = match encoding {
		SnapshotEncoding::Base64 => {
			let text = entries
				.get(field::SNAPSHOT_BASE64)
				.and_then(Node::as_str)
				.unwrap_or_default();
			enc::base64_to_bytes(text)?
		}
		SnapshotEncoding::Chunks => {
			let chunks = entries
				.get(field::SNAPSHOT_CHUNKS)
				.and_then(Node::as_array)
				.cloned()
				.unwrap_or_default();
			let mut assembled = BytesMut::new();
			for chunk in &chunks {
				match chunk.as_bytes() {
					Some(bytes) => assembled.extend_from_slice(bytes),
					None => {
						return Err(Error::CorruptVersion(format!(
							"{id}: chunk array holds a non-buffer entry"
						)))
					}
				}
			}
			assembled.freeze()
		}
	};
	let snapshot = match compression {
		Compression::Gzip => enc::gzip_decompress(&payload)?,
		Compression::None => payload,
	};

	let author = match (
		entries.get(field::AUTHOR_USER_ID).and_then(Node::as_str),
		entries.get(field::AUTHOR_USER_NAME).and_then(Node::as_str),
	) {
		(Some(user_id), Some(user_name)) => Some(VersionAuthor {
			user_id: user_id.to_owned(),
			user_name: user_name.to_owned(),
		}),
		_ => None,
	};
	let checkpoint = match (
		entries.get(field::CHECKPOINT_NAME).and_then(Node::as_str),
		entries.get(field::CHECKPOINT_LOCKED).and_then(Node::as_bool),
	) {
		(None, None) => None,
		(name, locked) => Some(CheckpointMeta {
			name: name.map(str::to_owned),
			locked: locked.unwrap_or(false),
			annotations: entries
				.get(field::CHECKPOINT_ANNOTATIONS)
				.and_then(Node::as_str)
				.and_then(|s| serde_json::from_str(s).ok()),
		}),
	};

	Ok(Some(VersionRecord {
		id: id.to_owned(),
		kind,
		timestamp_ms,
		created_at_ms: entries.get(field::CREATED_AT_MS).and_then(Node::as_int),
		author,
		description: entries.get(field::DESCRIPTION).and_then(Node::as_str).map(str::to_owned),
		checkpoint,
		snapshot,
	}))
}

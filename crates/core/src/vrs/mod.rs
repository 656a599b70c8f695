//! Version stores for collaborative workbooks.
//!
//! All backends share one minimal contract: save, get, list, update,
//! delete. Retention and concurrency semantics beyond write serialization
//! are backend-specific. The primary backend streams chunked snapshots
//! into a shared replicated document (`rdoc`); the others persist to
//! memory, a JSON file, IndexedDB, or a remote HTTP API.
pub mod rec;

pub(crate) mod enc;

#[cfg(feature = "store-file")]
mod file;
#[cfg(feature = "store-http")]
mod http;
#[cfg(feature = "store-indxdb")]
mod indxdb;
#[cfg(feature = "store-mem")]
mod mem;
#[cfg(feature = "store-rdoc")]
pub mod rdoc;
#[cfg(test)]
mod tests;

use crate::err::Error;
use crate::vrs::rec::{VersionRecord, VersionUpdate};

/// A pluggable version store.
///
/// Implementations are safe to call concurrently; each backend serializes
/// its own writes.
#[non_exhaustive]
pub struct VersionStore {
	inner: Inner,
}

#[allow(clippy::large_enum_variant)]
enum Inner {
	#[cfg(feature = "store-mem")]
	Mem(mem::MemStore),
	#[cfg(feature = "store-rdoc")]
	Rdoc(rdoc::RdocStore),
	#[cfg(feature = "store-file")]
	File(file::FileStore),
	#[cfg(feature = "store-http")]
	Http(http::HttpStore),
	#[cfg(feature = "store-indxdb")]
	Indxdb(indxdb::IndxdbStore),
}

impl VersionStore {
	/// Open a version store from a connection path.
	///
	/// ```text
	/// memory                  in-memory store
	/// file://history.json     JSON file store
	/// indxdb://workbook       browser IndexedDB store
	/// https://api.host/       remote HTTP store
	/// ```
	pub async fn new(path: &str) -> Result<VersionStore, Error> {
		match path {
			// Initiate an in-memory version store
			#[cfg(feature = "store-mem")]
			"memory" => {
				info!("Starting version store in {path}");
				Ok(VersionStore {
					inner: Inner::Mem(mem::MemStore::new()),
				})
			}
			// Initiate a file-backed version store
			#[cfg(feature = "store-file")]
			s if s.starts_with("file:") => {
				info!("Starting version store at {path}");
				let path = s.trim_start_matches("file://").trim_start_matches("file:");
				Ok(VersionStore {
					inner: Inner::File(file::FileStore::new(path)),
				})
			}
			// Initiate a browser IndexedDB version store
			#[cfg(feature = "store-indxdb")]
			s if s.starts_with("indxdb:") => {
				info!("Starting version store at {path}");
				let name = s.trim_start_matches("indxdb://").trim_start_matches("indxdb:");
				Ok(VersionStore {
					inner: Inner::Indxdb(indxdb::IndxdbStore::new(name).await?),
				})
			}
			// Initiate a remote HTTP version store
			#[cfg(feature = "store-http")]
			s if s.starts_with("http://") || s.starts_with("https://") => {
				info!("Starting version store at {path}");
				Ok(VersionStore {
					inner: Inner::Http(http::HttpStore::new(s)?),
				})
			}
			_ => Err(Error::Store(format!("unsupported version store path `{path}`"))),
		}
	}

	/// Attach a streaming store to a shared replicated document.
	#[cfg(feature = "store-rdoc")]
	pub fn new_rdoc(
		doc: crate::rdc::Doc,
		opts: rdoc::RdocStoreOptions,
	) -> Result<VersionStore, Error> {
		Ok(VersionStore {
			inner: Inner::Rdoc(rdoc::RdocStore::new(doc, opts)?),
		})
	}

	/// Persist a record. The record is observable to a subsequent list
	/// before this returns.
	pub async fn save_version(&self, record: &VersionRecord) -> Result<(), Error> {
		match &self.inner {
			#[cfg(feature = "store-mem")]
			Inner::Mem(v) => v.save_version(record).await,
			#[cfg(feature = "store-rdoc")]
			Inner::Rdoc(v) => v.save_version(record).await,
			#[cfg(feature = "store-file")]
			Inner::File(v) => v.save_version(record).await,
			#[cfg(feature = "store-http")]
			Inner::Http(v) => v.save_version(record).await,
			#[cfg(feature = "store-indxdb")]
			Inner::Indxdb(v) => v.save_version(record).await,
		}
	}

	/// Fetch a readable record, or `None` when it is missing or not yet
	/// fully persisted.
	pub async fn get_version(&self, id: &str) -> Result<Option<VersionRecord>, Error> {
		match &self.inner {
			#[cfg(feature = "store-mem")]
			Inner::Mem(v) => v.get_version(id).await,
			#[cfg(feature = "store-rdoc")]
			Inner::Rdoc(v) => v.get_version(id).await,
			#[cfg(feature = "store-file")]
			Inner::File(v) => v.get_version(id).await,
			#[cfg(feature = "store-http")]
			Inner::Http(v) => v.get_version(id).await,
			#[cfg(feature = "store-indxdb")]
			Inner::Indxdb(v) => v.get_version(id).await,
		}
	}

	/// List readable records sorted by timestamp descending, tie-broken by
	/// insertion order and then id, both descending.
	pub async fn list_versions(&self) -> Result<Vec<VersionRecord>, Error> {
		match &self.inner {
			#[cfg(feature = "store-mem")]
			Inner::Mem(v) => v.list_versions().await,
			#[cfg(feature = "store-rdoc")]
			Inner::Rdoc(v) => v.list_versions().await,
			#[cfg(feature = "store-file")]
			Inner::File(v) => v.list_versions().await,
			#[cfg(feature = "store-http")]
			Inner::Http(v) => v.list_versions().await,
			#[cfg(feature = "store-indxdb")]
			Inner::Indxdb(v) => v.list_versions().await,
		}
	}

	/// Apply a partial update. Fails when the id is not present.
	pub async fn update_version(&self, id: &str, update: VersionUpdate) -> Result<(), Error> {
		match &self.inner {
			#[cfg(feature = "store-mem")]
			Inner::Mem(v) => v.update_version(id, update).await,
			#[cfg(feature = "store-rdoc")]
			Inner::Rdoc(v) => v.update_version(id, update).await,
			#[cfg(feature = "store-file")]
			Inner::File(v) => v.update_version(id, update).await,
			#[cfg(feature = "store-http")]
			Inner::Http(v) => v.update_version(id, update).await,
			#[cfg(feature = "store-indxdb")]
			Inner::Indxdb(v) => v.update_version(id, update).await,
		}
	}

	/// Remove a record. Removing an absent id is a no-op.
	pub async fn delete_version(&self, id: &str) -> Result<(), Error> {
		match &self.inner {
			#[cfg(feature = "store-mem")]
			Inner::Mem(v) => v.delete_version(id).await,
			#[cfg(feature = "store-rdoc")]
			Inner::Rdoc(v) => v.delete_version(id).await,
			#[cfg(feature = "store-file")]
			Inner::File(v) => v.delete_version(id).await,
			#[cfg(feature = "store-http")]
			Inner::Http(v) => v.delete_version(id).await,
			#[cfg(feature = "store-indxdb")]
			Inner::Indxdb(v) => v.delete_version(id).await,
		}
	}

	/// Finalize or remove incomplete records. Only the streaming backend
	/// leaves incomplete records behind; on every other backend this is a
	/// no-op.
	#[cfg(feature = "store-rdoc")]
	pub async fn prune_incomplete_versions(
		&self,
		opts: rdoc::PruneOptions,
	) -> Result<rdoc::PruneOutcome, Error> {
		match &self.inner {
			Inner::Rdoc(v) => v.prune_incomplete_versions(opts).await,
			_ => Ok(rdoc::PruneOutcome::default()),
		}
	}
}

/// Sort a listing of (record, insertion index) pairs into the order the
/// contract promises.
pub(crate) fn sort_listing(mut listing: Vec<(VersionRecord, usize)>) -> Vec<VersionRecord> {
	listing.sort_by(|(a, a_ins), (b, b_ins)| {
		b.timestamp_ms
			.cmp(&a.timestamp_ms)
			.then_with(|| b_ins.cmp(a_ins))
			.then_with(|| b.id.cmp(&a.id))
	});
	listing.into_iter().map(|(record, _)| record).collect()
}

/// Wall-clock milliseconds since the epoch.
pub(crate) fn now_ms() -> i64 {
	use std::time::{SystemTime, UNIX_EPOCH};
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as i64)
		.unwrap_or(0)
}

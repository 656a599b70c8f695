#![cfg(feature = "store-file")]

//! The file version store: one JSON document on disk, rewritten atomically
//! through a temporary file on every change.
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::err::Error;
use crate::vrs::rec::{StoredRecord, VersionRecord, VersionUpdate};
use crate::vrs::sort_listing;

#[derive(Default, Serialize, Deserialize)]
struct FileState {
	/// Records in insertion order.
	versions: Vec<StoredRecord>,
}

pub struct FileStore {
	path: PathBuf,
	/// Serializes read-modify-write cycles on the backing file.
	lock: Mutex<()>,
}

impl FileStore {
	pub fn new(path: impl Into<PathBuf>) -> FileStore {
		FileStore {
			path: path.into(),
			lock: Mutex::new(()),
		}
	}

	fn load(&self) -> Result<FileState, Error> {
		match std::fs::read(&self.path) {
			Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileState::default()),
			Err(e) => Err(e.into()),
		}
	}

	fn persist(&self, state: &FileState) -> Result<(), Error> {
		let parent = self.path.parent().unwrap_or(Path::new("."));
		std::fs::create_dir_all(parent)?;
		let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
		tmp.write_all(&serde_json::to_vec_pretty(state)?)?;
		tmp.persist(&self.path).map_err(|e| Error::Store(e.to_string()))?;
		Ok(())
	}

	pub async fn save_version(&self, record: &VersionRecord) -> Result<(), Error> {
		let _guard = self.lock.lock().await;
		let mut state = self.load()?;
		let stored = StoredRecord::from(record);
		match state.versions.iter_mut().find(|r| r.id == record.id) {
			Some(slot) => *slot = stored,
			None => state.versions.push(stored),
		}
		self.persist(&state)
	}

	pub async fn get_version(&self, id: &str) -> Result<Option<VersionRecord>, Error> {
		let _guard = self.lock.lock().await;
		let state = self.load()?;
		match state.versions.into_iter().find(|r| r.id == id) {
			Some(stored) => Ok(Some(VersionRecord::try_from(stored)?)),
			None => Ok(None),
		}
	}

	pub async fn list_versions(&self) -> Result<Vec<VersionRecord>, Error> {
		let _guard = self.lock.lock().await;
		let state = self.load()?;
		let mut listing = Vec::with_capacity(state.versions.len());
		for (insertion, stored) in state.versions.into_iter().enumerate() {
			listing.push((VersionRecord::try_from(stored)?, insertion));
		}
		Ok(sort_listing(listing))
	}

	pub async fn update_version(&self, id: &str, update: VersionUpdate) -> Result<(), Error> {
		let _guard = self.lock.lock().await;
		let mut state = self.load()?;
		let stored = state
			.versions
			.iter_mut()
			.find(|r| r.id == id)
			.ok_or_else(|| Error::VersionNotFound(id.to_owned()))?;
		if let Some(locked) = update.checkpoint_locked {
			stored.checkpoint.get_or_insert_with(Default::default).locked = locked;
			self.persist(&state)?;
		}
		Ok(())
	}

	pub async fn delete_version(&self, id: &str) -> Result<(), Error> {
		let _guard = self.lock.lock().await;
		let mut state = self.load()?;
		let before = state.versions.len();
		state.versions.retain(|r| r.id != id);
		if state.versions.len() != before {
			self.persist(&state)?;
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::vrs::rec::VersionKind;

	#[tokio::test]
	async fn round_trip_through_disk() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(dir.path().join("versions.json"));
		let record =
			VersionRecord::new("v1", VersionKind::Snapshot, 1000, vec![9u8, 8, 7]);
		store.save_version(&record).await.unwrap();
		// a second handle over the same path sees the record
		let other = FileStore::new(dir.path().join("versions.json"));
		let loaded = other.get_version("v1").await.unwrap().unwrap();
		assert_eq!(loaded, record);
	}

	#[tokio::test]
	async fn delete_is_idempotent() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(dir.path().join("versions.json"));
		store.delete_version("missing").await.unwrap();
	}
}

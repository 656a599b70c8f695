#![cfg(feature = "store-mem")]

//! The in-memory version store, used as the baseline backend and in
//! tests.
use std::collections::BTreeMap;

use tokio::sync::RwLock;

use crate::err::Error;
use crate::vrs::rec::{VersionRecord, VersionUpdate};
use crate::vrs::sort_listing;

#[derive(Default)]
struct MemState {
	versions: BTreeMap<String, (VersionRecord, usize)>,
	counter: usize,
}

pub struct MemStore {
	state: RwLock<MemState>,
}

impl MemStore {
	pub fn new() -> MemStore {
		MemStore {
			state: RwLock::new(MemState::default()),
		}
	}

	pub async fn save_version(&self, record: &VersionRecord) -> Result<(), Error> {
		let mut state = self.state.write().await;
		// a resave keeps its original insertion slot
		let insertion = match state.versions.get(&record.id) {
			Some((_, insertion)) => *insertion,
			None => {
				state.counter += 1;
				state.counter
			}
		};
		state.versions.insert(record.id.clone(), (record.clone(), insertion));
		Ok(())
	}

	pub async fn get_version(&self, id: &str) -> Result<Option<VersionRecord>, Error> {
		let state = self.state.read().await;
		Ok(state.versions.get(id).map(|(record, _)| record.clone()))
	}

	pub async fn list_versions(&self) -> Result<Vec<VersionRecord>, Error> {
		let state = self.state.read().await;
		let listing = state.versions.values().cloned().collect();
		Ok(sort_listing(listing))
	}

	pub async fn update_version(&self, id: &str, update: VersionUpdate) -> Result<(), Error> {
		let mut state = self.state.write().await;
		let (record, _) = state
			.versions
			.get_mut(id)
			.ok_or_else(|| Error::VersionNotFound(id.to_owned()))?;
		if let Some(locked) = update.checkpoint_locked {
			record.checkpoint.get_or_insert_with(Default::default).locked = locked;
		}
		Ok(())
	}

	pub async fn delete_version(&self, id: &str) -> Result<(), Error> {
		let mut state = self.state.write().await;
		state.versions.remove(id);
		Ok(())
	}
}

impl Default for MemStore {
	fn default() -> Self {
		MemStore::new()
	}
}

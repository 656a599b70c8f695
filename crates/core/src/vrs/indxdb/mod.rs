#![cfg(feature = "store-indxdb")]

//! The browser version store, persisting into IndexedDB for wasm
//! deployments.
//!
//! Each record is stored as one JSON value under its id, with a reserved
//! key carrying the insertion-order id list.
use crate::err::Error;
use crate::vrs::rec::{StoredRecord, VersionRecord, VersionUpdate};
use crate::vrs::sort_listing;

/// The reserved key holding the insertion-order id list. Record ids are
/// prefixed so they can never collide with it.
const ORDER_KEY: &str = "!order";
const RECORD_PREFIX: &str = "version:";

pub struct IndxdbStore {
	db: indxdb::Db,
}

impl IndxdbStore {
	/// Open (or create) the named database.
	pub async fn new(path: &str) -> Result<IndxdbStore, Error> {
		match indxdb::db::new(path).await {
			Ok(db) => Ok(IndxdbStore {
				db,
			}),
			Err(e) => Err(Error::Store(e.to_string())),
		}
	}

	fn record_key(id: &str) -> Vec<u8> {
		format!("{RECORD_PREFIX}{id}").into_bytes()
	}

	async fn read_order(tx: &mut indxdb::Tx) -> Result<Vec<String>, Error> {
		match tx.get(ORDER_KEY.as_bytes().to_vec()).await {
			Ok(Some(bytes)) => Ok(serde_json::from_slice(&bytes)?),
			Ok(None) => Ok(Vec::new()),
			Err(e) => Err(Error::Store(e.to_string())),
		}
	}

	async fn write_order(tx: &mut indxdb::Tx, order: &[String]) -> Result<(), Error> {
		tx.set(ORDER_KEY.as_bytes().to_vec(), serde_json::to_vec(order)?)
			.await
			.map_err(|e| Error::Store(e.to_string()))
	}

	pub async fn save_version(&self, record: &VersionRecord) -> Result<(), Error> {
		let mut tx = self.db.begin(true).await.map_err(|e| Error::Store(e.to_string()))?;
		let stored = StoredRecord::from(record);
		tx.set(Self::record_key(&record.id), serde_json::to_vec(&stored)?)
			.await
			.map_err(|e| Error::Store(e.to_string()))?;
		let mut order = Self::read_order(&mut tx).await?;
		if !order.iter().any(|id| *id == record.id) {
			order.push(record.id.clone());
			Self::write_order(&mut tx, &order).await?;
		}
		tx.commit().await.map_err(|e| Error::Store(e.to_string()))?;
		Ok(())
	}

	pub async fn get_version(&self, id: &str) -> Result<Option<VersionRecord>, Error> {
		let mut tx = self.db.begin(false).await.map_err(|e| Error::Store(e.to_string()))?;
		let res = tx.get(Self::record_key(id)).await.map_err(|e| Error::Store(e.to_string()))?;
		match res {
			Some(bytes) => {
				let stored: StoredRecord = serde_json::from_slice(&bytes)?;
				Ok(Some(VersionRecord::try_from(stored)?))
			}
			None => Ok(None),
		}
	}

	pub async fn list_versions(&self) -> Result<Vec<VersionRecord>, Error> {
		let order = {
			let mut tx =
				self.db.begin(false).await.map_err(|e| Error::Store(e.to_string()))?;
			Self::read_order(&mut tx).await?
		};
		let mut listing = Vec::with_capacity(order.len());
		for (insertion, id) in order.iter().enumerate() {
			if let Some(record) = self.get_version(id).await? {
				listing.push((record, insertion));
			}
		}
		Ok(sort_listing(listing))
	}

	pub async fn update_version(&self, id: &str, update: VersionUpdate) -> Result<(), Error> {
		let mut tx = self.db.begin(true).await.map_err(|e| Error::Store(e.to_string()))?;
		let key = Self::record_key(id);
		let bytes = tx
			.get(key.clone())
			.await
			.map_err(|e| Error::Store(e.to_string()))?
			.ok_or_else(|| Error::VersionNotFound(id.to_owned()))?;
		if let Some(locked) = update.checkpoint_locked {
			let mut stored: StoredRecord = serde_json::from_slice(&bytes)?;
			stored.checkpoint.get_or_insert_with(Default::default).locked = locked;
			tx.set(key, serde_json::to_vec(&stored)?)
				.await
				.map_err(|e| Error::Store(e.to_string()))?;
		}
		tx.commit().await.map_err(|e| Error::Store(e.to_string()))?;
		Ok(())
	}

	pub async fn delete_version(&self, id: &str) -> Result<(), Error> {
		let mut tx = self.db.begin(true).await.map_err(|e| Error::Store(e.to_string()))?;
		tx.del(Self::record_key(id)).await.map_err(|e| Error::Store(e.to_string()))?;
		let mut order = Self::read_order(&mut tx).await?;
		let before = order.len();
		order.retain(|o| o != id);
		if order.len() != before {
			Self::write_order(&mut tx, &order).await?;
		}
		tx.commit().await.map_err(|e| Error::Store(e.to_string()))?;
		Ok(())
	}
}

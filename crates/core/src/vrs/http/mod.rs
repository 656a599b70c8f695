#![cfg(feature = "store-http")]

//! The remote version store, speaking JSON to an HTTP backend.
//!
//! Endpoint shape: `GET /versions`, `GET|PUT|PATCH|DELETE /versions/{id}`.
//! Records travel as [`StoredRecord`] with the snapshot base64-encoded.
use reqwest::StatusCode;
use serde_json::json;
use url::Url;

use crate::err::Error;
use crate::vrs::rec::{StoredRecord, VersionRecord, VersionUpdate};
use crate::vrs::sort_listing;

pub struct HttpStore {
	client: reqwest::Client,
	base: Url,
}

impl HttpStore {
	pub fn new(base: impl AsRef<str>) -> Result<HttpStore, Error> {
		let base = Url::parse(base.as_ref())
			.map_err(|e| Error::Store(format!("invalid base url: {e}")))?;
		Ok(HttpStore {
			client: reqwest::Client::new(),
			base,
		})
	}

	fn versions_url(&self, id: Option<&str>) -> Result<Url, Error> {
		let path = match id {
			Some(id) => format!("versions/{id}"),
			None => "versions".to_owned(),
		};
		self.base.join(&path).map_err(|e| Error::Store(e.to_string()))
	}

	pub async fn save_version(&self, record: &VersionRecord) -> Result<(), Error> {
		let url = self.versions_url(Some(&record.id))?;
		let response = self
			.client
			.put(url)
			.json(&StoredRecord::from(record))
			.send()
			.await
			.map_err(|e| Error::Store(e.to_string()))?;
		match response.error_for_status() {
			Ok(_) => Ok(()),
			Err(e) => Err(Error::Store(e.to_string())),
		}
	}

	pub async fn get_version(&self, id: &str) -> Result<Option<VersionRecord>, Error> {
		let url = self.versions_url(Some(id))?;
		let response =
			self.client.get(url).send().await.map_err(|e| Error::Store(e.to_string()))?;
		if response.status() == StatusCode::NOT_FOUND {
			return Ok(None);
		}
		let response = response.error_for_status().map_err(|e| Error::Store(e.to_string()))?;
		let stored: StoredRecord =
			response.json().await.map_err(|e| Error::Store(e.to_string()))?;
		Ok(Some(VersionRecord::try_from(stored)?))
	}

	pub async fn list_versions(&self) -> Result<Vec<VersionRecord>, Error> {
		let url = self.versions_url(None)?;
		let response = self
			.client
			.get(url)
			.send()
			.await
			.map_err(|e| Error::Store(e.to_string()))?
			.error_for_status()
			.map_err(|e| Error::Store(e.to_string()))?;
		let stored: Vec<StoredRecord> =
			response.json().await.map_err(|e| Error::Store(e.to_string()))?;
		let mut listing = Vec::with_capacity(stored.len());
		for (insertion, record) in stored.into_iter().enumerate() {
			listing.push((VersionRecord::try_from(record)?, insertion));
		}
		Ok(sort_listing(listing))
	}

	pub async fn update_version(&self, id: &str, update: VersionUpdate) -> Result<(), Error> {
		let Some(locked) = update.checkpoint_locked else {
			// still surface a missing id
			return match self.get_version(id).await? {
				Some(_) => Ok(()),
				None => Err(Error::VersionNotFound(id.to_owned())),
			};
		};
		let url = self.versions_url(Some(id))?;
		let response = self
			.client
			.patch(url)
			.json(&json!({ "checkpointLocked": locked }))
			.send()
			.await
			.map_err(|e| Error::Store(e.to_string()))?;
		if response.status() == StatusCode::NOT_FOUND {
			return Err(Error::VersionNotFound(id.to_owned()));
		}
		response.error_for_status().map_err(|e| Error::Store(e.to_string()))?;
		Ok(())
	}

	pub async fn delete_version(&self, id: &str) -> Result<(), Error> {
		let url = self.versions_url(Some(id))?;
		let response =
			self.client.delete(url).send().await.map_err(|e| Error::Store(e.to_string()))?;
		// deleting an absent record is not an error
		if response.status() == StatusCode::NOT_FOUND {
			return Ok(());
		}
		response.error_for_status().map_err(|e| Error::Store(e.to_string()))?;
		Ok(())
	}
}

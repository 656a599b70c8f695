use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::err::Error;
use crate::vrs::enc;

/// The storage schema version written into every persisted record.
pub const SCHEMA_VERSION: i64 = 1;

/// What a version entry represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionKind {
	Snapshot,
	Checkpoint,
	Restore,
}

impl VersionKind {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"snapshot" => Some(Self::Snapshot),
			"checkpoint" => Some(Self::Checkpoint),
			"restore" => Some(Self::Restore),
			_ => None,
		}
	}

	pub fn to_str(self) -> &'static str {
		match self {
			Self::Snapshot => "snapshot",
			Self::Checkpoint => "checkpoint",
			Self::Restore => "restore",
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionAuthor {
	pub user_id: String,
	pub user_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointMeta {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default)]
	pub locked: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub annotations: Option<Json>,
}

/// One immutable version entry, as callers see it. The storage-plane
/// bookkeeping (chunking, encodings, completion flags) never leaves the
/// backends.
#[derive(Clone, Debug, PartialEq)]
pub struct VersionRecord {
	pub id: String,
	pub kind: VersionKind,
	pub timestamp_ms: i64,
	pub created_at_ms: Option<i64>,
	pub author: Option<VersionAuthor>,
	pub description: Option<String>,
	pub checkpoint: Option<CheckpointMeta>,
	pub snapshot: Bytes,
}

impl VersionRecord {
	pub fn new(
		id: impl Into<String>,
		kind: VersionKind,
		timestamp_ms: i64,
		snapshot: impl Into<Bytes>,
	) -> Self {
		VersionRecord {
			id: id.into(),
			kind,
			timestamp_ms,
			created_at_ms: None,
			author: None,
			description: None,
			checkpoint: None,
			snapshot: snapshot.into(),
		}
	}
}

/// A partial update. Absent fields are left untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VersionUpdate {
	pub checkpoint_locked: Option<bool>,
}

/// How snapshot bytes are compressed at rest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
	#[default]
	None,
	Gzip,
}

impl Compression {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"none" => Some(Self::None),
			"gzip" => Some(Self::Gzip),
			_ => None,
		}
	}

	pub fn to_str(self) -> &'static str {
		match self {
			Self::None => "none",
			Self::Gzip => "gzip",
		}
	}
}

/// How snapshot bytes are laid out at rest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotEncoding {
	#[default]
	Chunks,
	Base64,
}

impl SnapshotEncoding {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"chunks" => Some(Self::Chunks),
			"base64" => Some(Self::Base64),
			_ => None,
		}
	}

	pub fn to_str(self) -> &'static str {
		match self {
			Self::Chunks => "chunks",
			Self::Base64 => "base64",
		}
	}
}

/// Field names used by the replicated-document backend. Consumers must
/// tolerate additional unknown fields on stored records.
pub mod field {
	pub const SCHEMA_VERSION: &str = "schemaVersion";
	pub const ID: &str = "id";
	pub const KIND: &str = "kind";
	pub const TIMESTAMP_MS: &str = "timestampMs";
	pub const CREATED_AT_MS: &str = "createdAtMs";
	pub const AUTHOR_USER_ID: &str = "authorUserId";
	pub const AUTHOR_USER_NAME: &str = "authorUserName";
	pub const DESCRIPTION: &str = "description";
	pub const CHECKPOINT_NAME: &str = "checkpointName";
	pub const CHECKPOINT_LOCKED: &str = "checkpointLocked";
	pub const CHECKPOINT_ANNOTATIONS: &str = "checkpointAnnotations";
	pub const COMPRESSION: &str = "compression";
	pub const SNAPSHOT_ENCODING: &str = "snapshotEncoding";
	pub const SNAPSHOT_CHUNKS: &str = "snapshotChunks";
	pub const SNAPSHOT_BASE64: &str = "snapshotBase64";
	pub const SNAPSHOT_CHUNK_COUNT_EXPECTED: &str = "snapshotChunkCountExpected";
	pub const SNAPSHOT_COMPLETE: &str = "snapshotComplete";
	pub const INCOMPLETE_SINCE_MS: &str = "incompleteSinceMs";
	pub const ORDER: &str = "order";
}

/// The flat serde shape shared by the file, HTTP and browser backends,
/// with the snapshot held as base64 text.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
	pub schema_version: i64,
	pub id: String,
	pub kind: VersionKind,
	pub timestamp_ms: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub created_at_ms: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub author: Option<VersionAuthor>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub checkpoint: Option<CheckpointMeta>,
	pub snapshot_base64: String,
}

impl From<&VersionRecord> for StoredRecord {
	fn from(record: &VersionRecord) -> Self {
		StoredRecord {
			schema_version: SCHEMA_VERSION,
			id: record.id.clone(),
			kind: record.kind,
			timestamp_ms: record.timestamp_ms,
			created_at_ms: record.created_at_ms,
			author: record.author.clone(),
			description: record.description.clone(),
			checkpoint: record.checkpoint.clone(),
			snapshot_base64: enc::bytes_to_base64(&record.snapshot),
		}
	}
}

impl TryFrom<StoredRecord> for VersionRecord {
	type Error = Error;

	fn try_from(stored: StoredRecord) -> Result<Self, Error> {
		if stored.schema_version != SCHEMA_VERSION {
			return Err(Error::CorruptVersion(format!(
				"{}: unsupported schema version {}",
				stored.id, stored.schema_version
			)));
		}
		Ok(VersionRecord {
			id: stored.id,
			kind: stored.kind,
			timestamp_ms: stored.timestamp_ms,
			created_at_ms: stored.created_at_ms,
			author: stored.author,
			description: stored.description,
			checkpoint: stored.checkpoint,
			snapshot: enc::base64_to_bytes(&stored.snapshot_base64)?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn kind_names_round_trip() {
		for kind in [VersionKind::Snapshot, VersionKind::Checkpoint, VersionKind::Restore] {
			assert_eq!(VersionKind::parse(kind.to_str()), Some(kind));
		}
		assert_eq!(VersionKind::parse("backup"), None);
	}

	#[test]
	fn stored_record_round_trip() {
		let mut record =
			VersionRecord::new("v1", VersionKind::Checkpoint, 1_700_000_000_000, vec![1u8, 2, 3]);
		record.description = Some("before refactor".to_owned());
		record.checkpoint = Some(CheckpointMeta {
			name: Some("baseline".to_owned()),
			locked: true,
			annotations: None,
		});
		let stored = StoredRecord::from(&record);
		let back = VersionRecord::try_from(stored).unwrap();
		assert_eq!(back, record);
	}
}

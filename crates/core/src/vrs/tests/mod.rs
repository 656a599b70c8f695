#![cfg(all(feature = "store-mem", feature = "store-rdoc"))]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::rdc::{Doc, Node};
use crate::vrs::rec::field;
use crate::vrs::rec::{
	CheckpointMeta, Compression, SnapshotEncoding, VersionKind, VersionRecord, VersionUpdate,
	SCHEMA_VERSION,
};
use crate::vrs::rdoc::{
	PruneOptions, RdocStore, RdocStoreOptions, META_ROOT, VERSIONS_ROOT,
};
use crate::vrs::VersionStore;

fn record(id: &str, timestamp_ms: i64, snapshot: &[u8]) -> VersionRecord {
	VersionRecord::new(id, VersionKind::Snapshot, timestamp_ms, snapshot.to_vec())
}

fn rdoc_store(doc: &Doc, opts: RdocStoreOptions) -> RdocStore {
	RdocStore::new(doc.clone(), opts).unwrap()
}

fn count_updates(doc: &Doc) -> Arc<AtomicUsize> {
	let count = Arc::new(AtomicUsize::new(0));
	let handle = count.clone();
	doc.observe_update(move |_| {
		handle.fetch_add(1, Ordering::SeqCst);
	});
	count
}

/// Insert a raw record map, bypassing the store, the way a crashed writer
/// would leave one behind.
fn plant_record(doc: &Doc, id: &str, entries: BTreeMap<String, Node>, in_order: bool) {
	let mut txn = doc.transact_mut();
	txn.map_root_mut(VERSIONS_ROOT).unwrap().insert(id.to_owned(), Node::Map(entries));
	if in_order {
		let meta = txn.map_root_mut(META_ROOT).unwrap();
		let order = meta
			.entry(field::ORDER.to_owned())
			.or_insert_with(|| Node::Array(Vec::new()));
		if let Some(items) = order.as_array_mut() {
			items.push(Node::from(id));
		}
	}
	txn.commit();
}

fn base_entries(id: &str, chunks: Vec<Node>, expected: i64, complete: bool) -> BTreeMap<String, Node> {
	let mut entries = BTreeMap::new();
	entries.insert(field::SCHEMA_VERSION.to_owned(), Node::Int(SCHEMA_VERSION));
	entries.insert(field::ID.to_owned(), Node::from(id));
	entries.insert(field::KIND.to_owned(), Node::from("snapshot"));
	entries.insert(field::TIMESTAMP_MS.to_owned(), Node::Int(1_700_000_000_000));
	entries.insert(field::CREATED_AT_MS.to_owned(), Node::Int(1_700_000_000_000));
	entries.insert(field::COMPRESSION.to_owned(), Node::from("none"));
	entries.insert(field::SNAPSHOT_ENCODING.to_owned(), Node::from("chunks"));
	entries.insert(field::SNAPSHOT_CHUNK_COUNT_EXPECTED.to_owned(), Node::Int(expected));
	entries.insert(field::SNAPSHOT_COMPLETE.to_owned(), Node::Bool(complete));
	entries.insert(field::SNAPSHOT_CHUNKS.to_owned(), Node::Array(chunks));
	entries
}

#[tokio::test]
async fn streaming_save_spans_multiple_updates_and_round_trips() {
	let doc = Doc::new();
	let store = rdoc_store(&doc, RdocStoreOptions {
		chunk_size: 1024,
		max_chunks_per_transaction: Some(2),
		..Default::default()
	});
	let updates = count_updates(&doc);

	let snapshot: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
	store.save_version(&record("v1", 1000, &snapshot)).await.unwrap();

	// 10 chunks in batches of 2, plus the metadata and completion writes
	assert!(updates.load(Ordering::SeqCst) >= 2);
	assert_eq!(updates.load(Ordering::SeqCst), 7);

	let loaded = store.get_version("v1").await.unwrap().unwrap();
	assert_eq!(&loaded.snapshot[..], &snapshot[..]);
	assert_eq!(loaded.kind, VersionKind::Snapshot);
}

#[tokio::test]
async fn partially_streamed_records_are_hidden() {
	let doc = Doc::new();
	let store = rdoc_store(&doc, RdocStoreOptions::default());
	// two of three expected chunks present, not finalized
	plant_record(
		&doc,
		"partial",
		base_entries(
			"partial",
			vec![
				Node::Bytes(Bytes::from_static(b"aa")),
				Node::Bytes(Bytes::from_static(b"bb")),
			],
			3,
			false,
		),
		true,
	);
	assert!(store.get_version("partial").await.unwrap().is_none());
	assert!(store.list_versions().await.unwrap().is_empty());
}

#[tokio::test]
async fn prune_finalizes_records_with_all_chunks_present() {
	let doc = Doc::new();
	let store = rdoc_store(&doc, RdocStoreOptions::default());
	plant_record(
		&doc,
		"stalled",
		base_entries(
			"stalled",
			vec![
				Node::Bytes(Bytes::from_static(b"hello ")),
				Node::Bytes(Bytes::from_static(b"world")),
			],
			2,
			false,
		),
		true,
	);
	let outcome = store
		.prune_incomplete_versions(PruneOptions {
			older_than_ms: 0,
		})
		.await
		.unwrap();
	assert_eq!(outcome.finalized, 1);
	assert_eq!(outcome.pruned, 0);
	let loaded = store.get_version("stalled").await.unwrap().unwrap();
	assert_eq!(&loaded.snapshot[..], b"hello world");
}

#[tokio::test]
async fn prune_removes_stale_unfinalizable_records() {
	let doc = Doc::new();
	let store = rdoc_store(&doc, RdocStoreOptions::default());
	let mut entries = base_entries("doomed", vec![Node::Bytes(Bytes::from_static(b"x"))], 5, false);
	entries.insert(field::CREATED_AT_MS.to_owned(), Node::Int(1));
	entries.insert(field::TIMESTAMP_MS.to_owned(), Node::Int(1));
	plant_record(&doc, "doomed", entries, true);

	let outcome = store
		.prune_incomplete_versions(PruneOptions {
			older_than_ms: 0,
		})
		.await
		.unwrap();
	assert_eq!(outcome.pruned, 1);

	let txn = doc.transact();
	assert!(!txn.map_root(VERSIONS_ROOT).unwrap().contains_key("doomed"));
	let order = txn
		.map_root(META_ROOT)
		.unwrap()
		.get(field::ORDER)
		.and_then(Node::as_array)
		.cloned()
		.unwrap_or_default();
	assert!(!order.iter().any(|n| n.as_str() == Some("doomed")));
}

#[tokio::test]
async fn fresh_incomplete_records_survive_the_default_policy() {
	let doc = Doc::new();
	let store = rdoc_store(&doc, RdocStoreOptions::default());
	let mut entries = base_entries("young", vec![], 5, false);
	entries.insert(field::CREATED_AT_MS.to_owned(), Node::Int(crate::vrs::now_ms()));
	plant_record(&doc, "young", entries, true);

	let outcome = store.prune_incomplete_versions(PruneOptions::default()).await.unwrap();
	assert_eq!(outcome.pruned, 0);
	let txn = doc.transact();
	assert!(txn.map_root(VERSIONS_ROOT).unwrap().contains_key("young"));
}

#[tokio::test]
async fn empty_snapshot_streams_as_a_single_empty_chunk() {
	let doc = Doc::new();
	let store = rdoc_store(&doc, RdocStoreOptions::default());
	store.save_version(&record("empty", 1, &[])).await.unwrap();
	{
		let txn = doc.transact();
		let entries = txn
			.map_root(VERSIONS_ROOT)
			.unwrap()
			.get("empty")
			.and_then(Node::as_map)
			.unwrap()
			.clone();
		assert_eq!(
			entries.get(field::SNAPSHOT_CHUNK_COUNT_EXPECTED).and_then(Node::as_int),
			Some(1)
		);
		let chunks = entries.get(field::SNAPSHOT_CHUNKS).and_then(Node::as_array).unwrap().clone();
		assert_eq!(chunks.len(), 1);
	}
	let loaded = store.get_version("empty").await.unwrap().unwrap();
	assert!(loaded.snapshot.is_empty());
}

#[tokio::test]
async fn gzip_compression_round_trips() {
	let doc = Doc::new();
	let store = rdoc_store(&doc, RdocStoreOptions {
		compression: Compression::Gzip,
		..Default::default()
	});
	let snapshot: Vec<u8> = std::iter::repeat(b"workbook-bytes".as_slice())
		.take(500)
		.flatten()
		.copied()
		.collect();
	store.save_version(&record("gz", 42, &snapshot)).await.unwrap();
	let loaded = store.get_version("gz").await.unwrap().unwrap();
	assert_eq!(&loaded.snapshot[..], &snapshot[..]);
}

#[tokio::test]
async fn base64_mode_writes_one_update() {
	let doc = Doc::new();
	let store = rdoc_store(&doc, RdocStoreOptions {
		encoding: SnapshotEncoding::Base64,
		..Default::default()
	});
	let updates = count_updates(&doc);
	store.save_version(&record("b64", 7, b"payload")).await.unwrap();
	assert_eq!(updates.load(Ordering::SeqCst), 1);
	let loaded = store.get_version("b64").await.unwrap().unwrap();
	assert_eq!(&loaded.snapshot[..], b"payload");
}

#[tokio::test]
async fn corrupt_schema_on_a_complete_record_is_an_error() {
	let doc = Doc::new();
	let store = rdoc_store(&doc, RdocStoreOptions::default());
	let mut entries =
		base_entries("bad", vec![Node::Bytes(Bytes::from_static(b"x"))], 1, true);
	entries.insert(field::SCHEMA_VERSION.to_owned(), Node::Int(99));
	plant_record(&doc, "bad", entries, true);
	assert!(store.get_version("bad").await.is_err());
}

#[tokio::test]
async fn listing_sorts_newest_first_with_insertion_tie_break() {
	let doc = Doc::new();
	let store = rdoc_store(&doc, RdocStoreOptions::default());
	store.save_version(&record("a", 100, b"1")).await.unwrap();
	store.save_version(&record("b", 300, b"2")).await.unwrap();
	// same timestamp as `b`; inserted later, so it lists first
	store.save_version(&record("c", 300, b"3")).await.unwrap();
	let ids: Vec<String> =
		store.list_versions().await.unwrap().into_iter().map(|r| r.id).collect();
	assert_eq!(ids, vec!["c", "b", "a"]);
}

#[tokio::test]
async fn checkpoint_metadata_round_trips_and_updates() {
	let doc = Doc::new();
	let store = rdoc_store(&doc, RdocStoreOptions::default());
	let mut rec = record("cp", 50, b"snapshot");
	rec.kind = VersionKind::Checkpoint;
	rec.checkpoint = Some(CheckpointMeta {
		name: Some("baseline".to_owned()),
		locked: false,
		annotations: Some(serde_json::json!({"reviewed": true})),
	});
	store.save_version(&rec).await.unwrap();

	store
		.update_version("cp", VersionUpdate {
			checkpoint_locked: Some(true),
		})
		.await
		.unwrap();
	let loaded = store.get_version("cp").await.unwrap().unwrap();
	let checkpoint = loaded.checkpoint.unwrap();
	assert!(checkpoint.locked);
	assert_eq!(checkpoint.name.as_deref(), Some("baseline"));
	assert_eq!(checkpoint.annotations, Some(serde_json::json!({"reviewed": true})));

	assert!(store
		.update_version("missing", VersionUpdate {
			checkpoint_locked: Some(true),
		})
		.await
		.is_err());
}

#[tokio::test]
async fn delete_scrubs_every_order_occurrence() {
	let doc = Doc::new();
	let store = rdoc_store(&doc, RdocStoreOptions::default());
	store.save_version(&record("dup", 10, b"x")).await.unwrap();
	// simulate a duplicated order entry left by a concurrent writer
	{
		let mut txn = doc.transact_mut();
		let meta = txn.map_root_mut(META_ROOT).unwrap();
		if let Some(items) = meta.get_mut(field::ORDER).and_then(Node::as_array_mut) {
			items.push(Node::from("dup"));
		}
		txn.commit();
	}
	store.delete_version("dup").await.unwrap();
	let txn = doc.transact();
	let order = txn
		.map_root(META_ROOT)
		.unwrap()
		.get(field::ORDER)
		.and_then(Node::as_array)
		.cloned()
		.unwrap_or_default();
	assert!(order.is_empty());
	// deleting again is a no-op
	drop(txn);
	store.delete_version("dup").await.unwrap();
}

#[tokio::test]
async fn normalization_recovers_roots_created_by_other_modules() {
	let doc = Doc::new();
	// another module already touched the roots generically
	doc.get_or_insert_abstract(VERSIONS_ROOT);
	doc.get_or_insert_abstract(META_ROOT);
	let store = rdoc_store(&doc, RdocStoreOptions::default());
	store.save_version(&record("v1", 1, b"ok")).await.unwrap();
	assert!(store.get_version("v1").await.unwrap().is_some());
}

#[tokio::test]
async fn facade_memory_backend_honors_the_contract() {
	let store = VersionStore::new("memory").await.unwrap();
	store.save_version(&record("a", 100, b"one")).await.unwrap();
	store.save_version(&record("b", 200, b"two")).await.unwrap();
	let ids: Vec<String> =
		store.list_versions().await.unwrap().into_iter().map(|r| r.id).collect();
	assert_eq!(ids, vec!["b", "a"]);
	assert!(store.get_version("missing").await.unwrap().is_none());
	store.delete_version("a").await.unwrap();
	assert!(store.get_version("a").await.unwrap().is_none());
	assert!(store
		.update_version("a", VersionUpdate {
			checkpoint_locked: Some(true),
		})
		.await
		.is_err());
}

#[tokio::test]
async fn unsupported_store_paths_are_rejected() {
	assert!(VersionStore::new("carrier-pigeon://coop").await.is_err());
}

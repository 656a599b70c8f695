use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::cnf::CLEAR_STYLE_ID;

/// The interning table for cell styles.
///
/// Styles are opaque JSON objects; interning the same object twice yields
/// the same id. Id 0 is reserved as the clear sentinel and is never
/// allocated.
#[derive(Clone, Debug, Default)]
pub struct StyleTable {
	styles: Vec<Json>,
	index: HashMap<String, u32>,
}

impl StyleTable {
	pub fn new() -> Self {
		StyleTable::default()
	}

	/// Intern a style object, returning its id. Ids start at 1.
	pub fn intern(&mut self, style: &Json) -> u32 {
		let key = canonical_key(style);
		if let Some(id) = self.index.get(&key) {
			return *id;
		}
		self.styles.push(style.clone());
		let id = self.styles.len() as u32;
		self.index.insert(key, id);
		id
	}

	/// Look up a previously interned style.
	pub fn get(&self, id: u32) -> Option<&Json> {
		if id == CLEAR_STYLE_ID {
			return None;
		}
		self.styles.get((id - 1) as usize)
	}

	/// Whether an id refers to an interned style or the clear sentinel.
	pub fn is_known(&self, id: u32) -> bool {
		id == CLEAR_STYLE_ID || (id as usize) <= self.styles.len()
	}

	pub fn len(&self) -> usize {
		self.styles.len()
	}

	pub fn is_empty(&self) -> bool {
		self.styles.is_empty()
	}
}

// Object keys in JSON have no guaranteed order, so the interning key is the
// serialization of a sorted rendering.
fn canonical_key(style: &Json) -> String {
	fn sort(v: &Json) -> Json {
		match v {
			Json::Object(map) => {
				let mut entries: Vec<(&String, &Json)> = map.iter().collect();
				entries.sort_by(|a, b| a.0.cmp(b.0));
				Json::Object(entries.into_iter().map(|(k, v)| (k.clone(), sort(v))).collect())
			}
			Json::Array(items) => Json::Array(items.iter().map(sort).collect()),
			other => other.clone(),
		}
	}
	sort(style).to_string()
}

/// A run of rows within one column sharing a style, used for columnar
/// formatting updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatRun {
	pub start_row: u32,
	pub end_row_exclusive: u32,
	pub style_id: u32,
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn interning_deduplicates() {
		let mut table = StyleTable::new();
		let a = table.intern(&json!({"bold": true, "size": 11}));
		let b = table.intern(&json!({"size": 11, "bold": true}));
		let c = table.intern(&json!({"bold": false}));
		assert_eq!(a, b);
		assert_ne!(a, c);
		assert_eq!(a, 1);
	}

	#[test]
	fn zero_is_reserved() {
		let mut table = StyleTable::new();
		let id = table.intern(&json!({}));
		assert_ne!(id, CLEAR_STYLE_ID);
		assert!(table.get(CLEAR_STYLE_ID).is_none());
	}
}

use bytes::Bytes;

use crate::err::Error;

/// A typed view over a slice of a larger backing buffer, as callers hand
/// byte payloads to the RPC layer.
#[derive(Clone, Debug)]
pub struct ByteView {
	backing: Bytes,
	byte_offset: usize,
	byte_length: usize,
}

impl ByteView {
	/// A view over a sub-range of `backing`.
	pub fn new(backing: Bytes, byte_offset: usize, byte_length: usize) -> Result<Self, Error> {
		let end = byte_offset.checked_add(byte_length);
		match end {
			Some(end) if end <= backing.len() => Ok(ByteView {
				backing,
				byte_offset,
				byte_length,
			}),
			_ => Err(Error::InvalidField {
				field: "bytes".to_owned(),
				message: "view extends beyond its backing buffer".to_owned(),
			}),
		}
	}

	/// A view covering an entire buffer.
	pub fn whole(backing: Bytes) -> Self {
		let byte_length = backing.len();
		ByteView {
			backing,
			byte_offset: 0,
			byte_length,
		}
	}

	pub fn len(&self) -> usize {
		self.byte_length
	}

	pub fn is_empty(&self) -> bool {
		self.byte_length == 0
	}

	/// The exact buffer to attach to an outgoing request.
	///
	/// When the view covers its whole backing buffer the backing moves as
	/// is. Otherwise only the live range is copied out, so data the caller
	/// keeps elsewhere in the same buffer never crosses the boundary.
	pub fn extract_for_transfer(&self) -> Bytes {
		if self.byte_offset == 0 && self.byte_length == self.backing.len() {
			self.backing.clone()
		} else {
			Bytes::copy_from_slice(
				&self.backing[self.byte_offset..self.byte_offset + self.byte_length],
			)
		}
	}
}

impl From<Bytes> for ByteView {
	fn from(bytes: Bytes) -> Self {
		ByteView::whole(bytes)
	}
}

impl From<Vec<u8>> for ByteView {
	fn from(bytes: Vec<u8>) -> Self {
		ByteView::whole(Bytes::from(bytes))
	}
}

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;

use crate::err::Error;

/// Encode bytes as standard base64 text.
pub fn bytes_to_base64(bytes: &[u8]) -> String {
	STANDARD.encode(bytes)
}

/// Decode standard base64 text back into bytes.
pub fn base64_to_bytes(s: &str) -> Result<Bytes, Error> {
	STANDARD
		.decode(s)
		.map(Bytes::from)
		.map_err(|_| Error::Encoding("invalid base64".to_owned()))
}

/// Gzip-compress a snapshot payload.
pub fn gzip_compress(bytes: &[u8]) -> Result<Bytes, Error> {
	let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
	encoder.write_all(bytes)?;
	Ok(Bytes::from(encoder.finish()?))
}

/// Decompress a gzip snapshot payload.
pub fn gzip_decompress(bytes: &[u8]) -> Result<Bytes, Error> {
	let mut decoder = GzDecoder::new(bytes);
	let mut out = Vec::new();
	decoder
		.read_to_end(&mut out)
		.map_err(|e| Error::Encoding(format!("invalid gzip payload: {e}")))?;
	Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn base64_round_trip() {
		let data = b"\x00\x01binary\xff";
		let text = bytes_to_base64(data);
		assert_eq!(&base64_to_bytes(&text).unwrap()[..], data);
		assert!(base64_to_bytes("not base64!!!").is_err());
	}

	#[test]
	fn gzip_round_trip() {
		let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
		let packed = gzip_compress(&data).unwrap();
		assert!(packed.len() < data.len());
		assert_eq!(&gzip_decompress(&packed).unwrap()[..], &data[..]);
	}

	#[test]
	fn gzip_rejects_garbage() {
		assert!(gzip_decompress(b"definitely not gzip").is_err());
	}
}

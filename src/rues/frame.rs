//! Binary framing of RUES events.
//!
//! Every WebSocket message carries one event laid out as
//! `[u32 LE header length][JSON headers][payload]`.

use super::types::{EventPath, Payload, RuesError, RuesEvent};
use bytes::Bytes;
use serde_json::{Map, Value};

const LENGTH_PREFIX: usize = 4;

pub const CONTENT_LOCATION: &str = "content-location";
pub const CONTENT_TYPE: &str = "content-type";

/// Decode one frame into an event.
pub fn decode_frame(data: &[u8]) -> Result<RuesEvent, RuesError> {
	if data.len() < LENGTH_PREFIX {
		return Err(RuesError::Frame(format!(
			"frame too short: {} bytes",
			data.len()
		)));
	}

	let mut prefix = [0u8; LENGTH_PREFIX];
	prefix.copy_from_slice(&data[..LENGTH_PREFIX]);
	let header_len = u32::from_le_bytes(prefix) as usize;

	let header_end = LENGTH_PREFIX
		.checked_add(header_len)
		.filter(|end| *end <= data.len())
		.ok_or_else(|| {
			RuesError::Frame(format!(
				"header length {} exceeds frame of {} bytes",
				header_len,
				data.len()
			))
		})?;

	let headers: Map<String, Value> = serde_json::from_slice(&data[LENGTH_PREFIX..header_end])?;

	let location = headers
		.get(CONTENT_LOCATION)
		.and_then(Value::as_str)
		.ok_or_else(|| RuesError::Frame("missing content-location header".to_string()))?;
	let path = EventPath::parse(location)?;

	let content_type = headers.get(CONTENT_TYPE).and_then(Value::as_str);
	let payload = decode_payload(content_type, &data[header_end..]);

	Ok(RuesEvent {
		path,
		headers,
		payload,
	})
}

/// Decode a body according to its content type.
///
/// JSON is attempted unless the content type names something else, falling
/// back to the raw bytes when the body does not parse.
pub fn decode_payload(content_type: Option<&str>, body: &[u8]) -> Payload {
	let try_json = match content_type {
		Some(content_type) => content_type.contains("json"),
		None => true,
	};

	if try_json && !body.is_empty() {
		if let Ok(value) = serde_json::from_slice::<Value>(body) {
			return Payload::Json(value);
		}
	}

	Payload::Raw(Bytes::copy_from_slice(body))
}

/// Encode headers and payload into a frame.
pub fn encode_frame(headers: &Map<String, Value>, payload: &[u8]) -> Vec<u8> {
	let header_bytes = Value::Object(headers.clone()).to_string().into_bytes();
	let mut frame = Vec::with_capacity(LENGTH_PREFIX + header_bytes.len() + payload.len());
	frame.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
	frame.extend_from_slice(&header_bytes);
	frame.extend_from_slice(payload);
	frame
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn headers(location: &str, content_type: Option<&str>) -> Map<String, Value> {
		let mut headers = Map::new();
		headers.insert(CONTENT_LOCATION.to_string(), json!(location));
		if let Some(content_type) = content_type {
			headers.insert(CONTENT_TYPE.to_string(), json!(content_type));
		}
		headers
	}

	#[test]
	fn decodes_json_payload_by_default() {
		let frame = encode_frame(
			&headers("/on/blocks:ff00/accepted", None),
			br#"{"height":12}"#,
		);
		let event = decode_frame(&frame).unwrap();

		assert_eq!(event.path.to_string(), "/on/blocks:ff00/accepted");
		assert_eq!(event.payload, Payload::Json(json!({ "height": 12 })));
	}

	#[test]
	fn falls_back_to_raw_bytes() {
		let frame = encode_frame(&headers("/on/blocks/accepted", None), &[0xde, 0xad]);
		let event = decode_frame(&frame).unwrap();
		assert_eq!(
			event.payload,
			Payload::Raw(Bytes::from_static(&[0xde, 0xad]))
		);
	}

	#[test]
	fn content_type_selects_raw_decoding() {
		let frame = encode_frame(
			&headers("/on/blocks/accepted", Some("application/octet-stream")),
			b"123",
		);
		let event = decode_frame(&frame).unwrap();
		assert_eq!(event.payload, Payload::Raw(Bytes::from_static(b"123")));
		assert_eq!(event.header(CONTENT_TYPE), Some("application/octet-stream"));
	}

	#[test]
	fn rejects_truncated_frames() {
		assert!(decode_frame(&[1, 0]).is_err());

		let mut frame = encode_frame(&headers("/on/blocks/accepted", None), b"");
		frame[0] = 0xff;
		assert!(matches!(decode_frame(&frame), Err(RuesError::Frame(_))));
	}

	#[test]
	fn requires_content_location() {
		let frame = encode_frame(&Map::new(), b"{}");
		assert!(matches!(decode_frame(&frame), Err(RuesError::Frame(_))));
	}
}

//! Event codec: typed [`DomainEvent`] ⇄ `(type name, opaque payload)`.
//!
//! The payload is the JSON encoding of the variant's inner data, without the
//! type tag; the tag travels separately as the stored `event_type`. Decoding
//! checks the name against [`EVENT_TYPES`] first so an unknown type is a
//! distinct error from a malformed payload.

use serde_json::Value;

use crate::{
  Error, Result,
  event::{DomainEvent, EVENT_TYPES},
};

/// Encode `event` into its type name and payload bytes.
pub fn encode(event: &DomainEvent) -> Result<(&'static str, Vec<u8>)> {
  let event_type = event.event_type();
  let encoding = |source| Error::Encoding {
    event_type: event_type.to_owned(),
    source,
  };

  // The full serialised form is `{"type": "...", "data": <payload>}`.
  let full = serde_json::to_value(event).map_err(encoding)?;
  let data = full.get("data").cloned().unwrap_or(Value::Null);
  let bytes = serde_json::to_vec(&data).map_err(encoding)?;
  Ok((event_type, bytes))
}

/// Decode a stored `(event_type, payload)` pair.
pub fn decode(event_type: &str, payload: &[u8]) -> Result<DomainEvent> {
  if !is_registered(event_type) {
    return Err(Error::UnknownEventType(event_type.to_owned()));
  }
  let decoding = |source| Error::Decoding {
    event_type: event_type.to_owned(),
    source,
  };

  let data: Value = serde_json::from_slice(payload).map_err(decoding)?;
  let wrapped = serde_json::json!({ "type": event_type, "data": data });
  serde_json::from_value(wrapped).map_err(decoding)
}

/// Is `event_type` known to this build?
pub fn is_registered(event_type: &str) -> bool {
  EVENT_TYPES.contains(&event_type)
}

//! The [`Event`] wire type and the raw-JSON payload wrapper.
//!
//! Payloads are held as already-serialized JSON and passed through
//! verbatim on write and read -- never re-quoted, never re-typed until a
//! consumer asks the [`crate::registry::EventTypeRegistry`] to resolve it.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Free-form key/value metadata carried by an [`Event`] or a commit.
pub type Metadata = HashMap<String, String>;

/// A JSON payload held verbatim: serializing a [`RawPayload`] writes exactly
/// the bytes it was built from, never re-quoting or re-escaping them.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPayload(Box<RawValue>);

impl RawPayload {
    /// An empty JSON object, the wire default for an absent payload.
    pub fn empty() -> Self {
        Self(RawValue::from_string("{}".to_string()).expect("`{}` is valid JSON"))
    }

    pub fn from_value<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        Ok(Self(RawValue::from_string(serde_json::to_string(value)?)?))
    }

    pub fn from_raw_json(raw: impl Into<String>) -> serde_json::Result<Self> {
        Ok(Self(RawValue::from_string(raw.into())?))
    }

    pub fn get(&self) -> &str {
        self.0.get()
    }

    pub fn parse<'a, T: Deserialize<'a>>(&'a self) -> serde_json::Result<T> {
        serde_json::from_str(self.0.get())
    }
}

impl Clone for RawPayload {
    fn clone(&self) -> Self {
        Self(self.0.to_owned())
    }
}

impl fmt::Debug for RawPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RawPayload").field(&self.0.get()).finish()
    }
}

impl PartialEq for RawPayload {
    fn eq(&self, other: &Self) -> bool {
        self.0.get() == other.0.get()
    }
}

impl Default for RawPayload {
    fn default() -> Self {
        Self::empty()
    }
}

/// Caller-supplied context attached to an appended event (e.g. actor, cause,
/// correlation id). Opaque to the engine; carried through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

/// An immutable, versioned record in a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub event_version: u32,
    pub payload: RawPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_metadata: Option<ActionMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Physical timestamp the row was written with; preserved on migration
    /// when `preserve_timestamp` is requested at append time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_schema_version() -> u32 {
    1
}

impl Event {
    pub fn new(event_type: impl Into<String>, event_version: u32, payload: RawPayload) -> Self {
        Self {
            event_type: event_type.into(),
            schema_version: default_schema_version(),
            event_version,
            payload,
            action_metadata: None,
            metadata: None,
            timestamp: None,
        }
    }

    pub fn with_schema_version(mut self, schema_version: u32) -> Self {
        self.schema_version = schema_version;
        self
    }

    pub fn with_action_metadata(mut self, action_metadata: ActionMetadata) -> Self {
        self.action_metadata = Some(action_metadata);
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// The `(eventName, schemaVersion)` key used to resolve this event
    /// against the [`crate::registry::EventTypeRegistry`].
    pub fn type_key(&self) -> (&str, u32) {
        (&self.event_type, self.schema_version)
    }
}

/// A request to append one event, buffered in a [`crate::session::LeasedSession`]
/// before `eventVersion` is known.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: Option<String>,
    pub schema_version: u32,
    pub payload: RawPayload,
    pub action_metadata: Option<ActionMetadata>,
    pub external_sequencer: Option<String>,
    pub metadata: Option<Metadata>,
}

impl NewEvent {
    pub fn new(payload: RawPayload) -> Self {
        Self {
            event_type: None,
            schema_version: default_schema_version(),
            payload,
            action_metadata: None,
            external_sequencer: None,
            metadata: None,
        }
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_action_metadata(mut self, action_metadata: ActionMetadata) -> Self {
        self.action_metadata = Some(action_metadata);
        self
    }

    pub fn with_external_sequencer(mut self, external_sequencer: impl Into<String>) -> Self {
        self.external_sequencer = Some(external_sequencer.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A [`NewEvent`] that has been assigned its `eventVersion` within an
/// in-flight commit buffer, returned to the caller as a handle by
/// [`crate::session::LeasedSession::append`].
#[derive(Debug, Clone)]
pub struct StagedEvent {
    pub event_version: u32,
    pub request: NewEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_payload_passes_through_verbatim() {
        let raw = RawPayload::from_raw_json(r#"{"qty":2,"sku":"A-1"}"#).unwrap();
        assert_eq!(raw.get(), r#"{"qty":2,"sku":"A-1"}"#);
        let cloned = raw.clone();
        assert_eq!(raw, cloned);
    }

    #[test]
    fn empty_payload_is_braces() {
        assert_eq!(RawPayload::empty().get(), "{}");
    }

    #[test]
    fn event_serializes_payload_inline_not_as_string() {
        let event = Event::new("OrderCreated", 0, RawPayload::from_raw_json(r#"{"orderId":"ORD-1"}"#).unwrap());
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""payload":{"orderId":"ORD-1"}"#));
        assert!(!json.contains(r#""payload":"{"#));
    }
}

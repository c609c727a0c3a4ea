//! Canonical parse/format for object identifiers and version tokens.
//!
//! All three tokens here are schema-versioned wire values: a fixed prefix,
//! a bracketed body, and a trailing integer schema version. Formatting is
//! always the current form; parsing additionally tolerates the legacy
//! `versionToken[...]` prefix for [`VersionToken`] (read-compat only, never
//! written).

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

const OID_PREFIX: &str = "oid";
const VT_PREFIX: &str = "vt";
const VT_LEGACY_PREFIX: &str = "versionToken";

/// `(objectName, objectId)`, schema-versioned.
///
/// Wire form: `oid[{objectName}__{objectId}]{schemaVersion}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectIdentifier {
    pub object_name: String,
    pub object_id: String,
    pub schema_version: u32,
}

impl ObjectIdentifier {
    pub fn new(object_name: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            object_id: object_id.into(),
            schema_version: 1,
        }
    }

    pub fn with_schema_version(mut self, schema_version: u32) -> Self {
        self.schema_version = schema_version;
        self
    }
}

impl fmt::Display for ObjectIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{OID_PREFIX}[{}__{}]{}",
            self.object_name, self.object_id, self.schema_version
        )
    }
}

impl FromStr for ObjectIdentifier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = strip_bracketed(s, OID_PREFIX)
            .ok_or_else(|| Error::invalid_input(format!("not an ObjectIdentifier: {s}")))?;
        let (inner, schema_version) = split_trailing_version(body, s)?;

        let mut parts = inner.splitn(2, "__");
        let object_name = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::invalid_input(format!("missing objectName in {s}")))?;
        let object_id = parts
            .next()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::invalid_input(format!("missing objectId in {s}")))?;

        Ok(Self {
            object_name: object_name.to_string(),
            object_id: object_id.to_string(),
            schema_version,
        })
    }
}

/// `(streamIdentifier, version)`; `version == -1` means "no events yet".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionIdentifier {
    pub stream_identifier: String,
    pub version: i64,
}

impl VersionIdentifier {
    pub const NO_EVENTS: i64 = -1;

    pub fn new(stream_identifier: impl Into<String>, version: i64) -> Self {
        Self {
            stream_identifier: stream_identifier.into(),
            version,
        }
    }

    pub fn empty(stream_identifier: impl Into<String>) -> Self {
        Self::new(stream_identifier, Self::NO_EVENTS)
    }

    pub fn is_empty(&self) -> bool {
        self.version == Self::NO_EVENTS
    }
}

/// Fully-qualified pointer to one event:
/// `{objectName}__{objectId}__{streamIndex:d4}__{eventVersion:d4}`.
///
/// Wire form: `vt[...]{schemaVersion}`; the legacy `versionToken[...]` prefix
/// is accepted on read but never produced by [`VersionToken::to_string`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken {
    pub object_name: String,
    pub object_id: String,
    pub stream_index: u32,
    pub event_version: u32,
    pub schema_version: u32,
}

impl VersionToken {
    pub fn new(
        object_name: impl Into<String>,
        object_id: impl Into<String>,
        stream_index: u32,
        event_version: u32,
    ) -> Self {
        Self {
            object_name: object_name.into(),
            object_id: object_id.into(),
            stream_index,
            event_version,
            schema_version: 1,
        }
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{VT_PREFIX}[{}__{}__{:04}__{:04}]{}",
            self.object_name, self.object_id, self.stream_index, self.event_version, self.schema_version
        )
    }
}

impl FromStr for VersionToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = strip_bracketed(s, VT_PREFIX)
            .or_else(|| strip_bracketed(s, VT_LEGACY_PREFIX))
            .ok_or_else(|| Error::invalid_input(format!("not a VersionToken: {s}")))?;
        let (inner, schema_version) = split_trailing_version(body, s)?;

        let parts: Vec<&str> = inner.split("__").collect();
        let [object_name, object_id, stream_index, event_version] = parts.as_slice() else {
            return Err(Error::invalid_input(format!(
                "VersionToken must have 4 segments: {s}"
            )));
        };

        Ok(Self {
            object_name: (*object_name).to_string(),
            object_id: (*object_id).to_string(),
            stream_index: stream_index
                .parse()
                .map_err(|_| Error::invalid_input(format!("invalid streamIndex in {s}")))?,
            event_version: event_version
                .parse()
                .map_err(|_| Error::invalid_input(format!("invalid eventVersion in {s}")))?,
            schema_version,
        })
    }
}

/// Strips a `{prefix}[...]` wrapper, returning the bracketed body plus the
/// trailing schema-version suffix as one string (split by the caller).
fn strip_bracketed<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = s.strip_prefix(prefix)?;
    rest.strip_prefix('[')
}

/// Splits `{body}]{schemaVersion}` into `(body, schemaVersion)`.
fn split_trailing_version<'a>(rest: &'a str, original: &str) -> Result<(&'a str, u32), Error> {
    let close = rest
        .rfind(']')
        .ok_or_else(|| Error::invalid_input(format!("missing ']' in {original}")))?;
    let (body, tail) = rest.split_at(close);
    let version_str = &tail[1..];
    if version_str.is_empty() {
        return Err(Error::invalid_input(format!(
            "missing schemaVersion in {original}"
        )));
    }
    let schema_version: u32 = version_str
        .parse()
        .map_err(|_| Error::invalid_input(format!("invalid schemaVersion in {original}")))?;
    Ok((body, schema_version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_identifier_round_trips() {
        let oid = ObjectIdentifier::new("order", "o-1").with_schema_version(2);
        let formatted = oid.to_string();
        assert_eq!(formatted, "oid[order__o-1]2");
        assert_eq!(oid, formatted.parse().unwrap());
    }

    #[test]
    fn object_identifier_rejects_missing_brackets() {
        assert!("oid(order__o-1)2".parse::<ObjectIdentifier>().is_err());
        assert!("order__o-1".parse::<ObjectIdentifier>().is_err());
    }

    #[test]
    fn version_token_round_trips() {
        let tok = VersionToken::new("order", "o-1", 0, 7);
        let formatted = tok.to_string();
        assert_eq!(formatted, "vt[order__o-1__0000__0007]1");
        assert_eq!(tok, formatted.parse().unwrap());
    }

    #[test]
    fn version_token_accepts_legacy_prefix() {
        let tok = VersionToken::new("order", "o-1", 0, 7);
        let legacy = format!(
            "versionToken[{}__{}__{:04}__{:04}]{}",
            tok.object_name, tok.object_id, tok.stream_index, tok.event_version, tok.schema_version
        );
        assert_eq!(tok, legacy.parse().unwrap());
        assert_eq!(legacy.parse::<VersionToken>().unwrap(), tok.to_string().parse().unwrap());
    }

    #[test]
    fn version_identifier_no_events_sentinel() {
        let vi = VersionIdentifier::empty("s-1");
        assert!(vi.is_empty());
        assert_eq!(vi.version, -1);
    }
}

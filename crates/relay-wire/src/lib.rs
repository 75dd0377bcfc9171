// Message envelope and its JSON wire form.
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to serialize envelope")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to deserialize envelope")]
    Deserialize(#[source] serde_json::Error),
}

/// Unit of pub/sub payload: an opaque byte blob.
///
/// The envelope is structured rather than a bare blob so standardized
/// metadata can be added later without changing the wire shape. On the
/// wire the content is a base64 string: `{"content":"aGVsbG8="}`.
///
/// ```
/// use bytes::Bytes;
/// use relay_wire::Envelope;
///
/// let envelope = Envelope::new(Bytes::from_static(b"hello"));
/// let text = envelope.to_json().expect("encode");
/// let decoded = Envelope::from_json(&text).expect("decode");
/// assert_eq!(decoded, envelope);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(with = "base64_bytes")]
    pub content: Bytes,
}

impl Envelope {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::Serialize)
    }

    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(Error::Deserialize)
    }
}

mod base64_bytes {
    use super::*;
    use base64::Engine;
    use serde::de::Error;

    // Encode Bytes as base64 string for JSON payloads.
    pub fn serialize<S>(value: &Bytes, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let encoded = base64::engine::general_purpose::STANDARD.encode(value);
        serializer.serialize_str(&encoded)
    }

    // Decode base64 string into Bytes.
    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<Bytes, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(D::Error::custom)?;
        Ok(Bytes::from(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trip() {
        let envelope = Envelope::new(Bytes::from_static(b"hello"));
        let text = envelope.to_json().expect("encode");
        let decoded = Envelope::from_json(&text).expect("decode");
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn content_is_base64_on_the_wire() {
        let envelope = Envelope::new(Bytes::from_static(b"hello"));
        let text = envelope.to_json().expect("encode");
        assert_eq!(text, r#"{"content":"aGVsbG8="}"#);
    }

    #[test]
    fn empty_content_round_trips() {
        let envelope = Envelope::new(Bytes::new());
        let text = envelope.to_json().expect("encode");
        assert_eq!(text, r#"{"content":""}"#);
        assert_eq!(Envelope::from_json(&text).expect("decode"), envelope);
    }

    #[test]
    fn equal_content_makes_envelopes_indistinguishable() {
        // No identity beyond the payload; exact duplicates compare equal.
        let left = Envelope::new(Bytes::from_static(b"same"));
        let right = Envelope::new(Bytes::copy_from_slice(b"same"));
        assert_eq!(left, right);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = Envelope::from_json("{not json").expect_err("decode");
        assert!(matches!(err, Error::Deserialize(_)));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let err = Envelope::from_json(r#"{"content":"%%%"}"#).expect_err("decode");
        assert!(matches!(err, Error::Deserialize(_)));
    }

    #[test]
    fn missing_content_field_is_rejected() {
        let err = Envelope::from_json("{}").expect_err("decode");
        assert!(matches!(err, Error::Deserialize(_)));
    }
}

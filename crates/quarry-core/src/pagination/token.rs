//! Opaque cursor tokens.
//!
//! A token is `<payload>.<digest>`, both URL-safe base64 without padding.
//! The payload is JSON `{"c": column, "d": direction, "v": tagged value}`;
//! the digest is the first 12 bytes of `SHA-256(secret || payload)`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PaginationError;
use crate::query::Direction;
use crate::value::SqlValue;

const DIGEST_LEN: usize = 12;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
enum TaggedValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Payload {
    c: String,
    d: String,
    v: TaggedValue,
}

fn direction_tag(direction: Direction) -> &'static str {
    match direction {
        Direction::Asc => "asc",
        Direction::Desc => "desc",
    }
}

/// Encodes and verifies cursor tokens.
#[derive(Clone, Default)]
pub struct CursorCodec {
    secret: Vec<u8>,
}

impl std::fmt::Debug for CursorCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorCodec")
            .field("keyed", &!self.secret.is_empty())
            .finish()
    }
}

impl CursorCodec {
    /// Codec whose digests are keyed with `secret`.
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Codec with an unkeyed digest. Detects corruption, not forgery.
    #[must_use]
    pub fn unkeyed() -> Self {
        Self::default()
    }

    fn digest(&self, payload: &[u8]) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(payload);
        hasher.finalize()[..DIGEST_LEN].to_vec()
    }

    /// Builds a token for `value` of `column` in `direction`.
    pub fn encode(
        &self,
        column: &str,
        direction: Direction,
        value: &SqlValue,
    ) -> Result<String, PaginationError> {
        let unsupported = |kind: &'static str| PaginationError::UnsupportedCursorValue {
            column: column.to_string(),
            kind,
        };
        let tagged = match value {
            SqlValue::Bool(b) => TaggedValue::Bool(*b),
            SqlValue::Int(n) => TaggedValue::Int(*n),
            SqlValue::Float(f) if f.is_finite() => TaggedValue::Float(*f),
            SqlValue::Float(_) => return Err(unsupported("non-finite float")),
            SqlValue::Text(s) => TaggedValue::Text(s.clone()),
            SqlValue::Null => return Err(unsupported("null")),
            SqlValue::Blob(_) => return Err(unsupported("blob")),
        };
        let payload = Payload {
            c: column.to_string(),
            d: direction_tag(direction).to_string(),
            v: tagged,
        };
        let json = serde_json::to_vec(&payload)
            .map_err(|e| PaginationError::InvalidCursor(e.to_string()))?;
        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(&json),
            URL_SAFE_NO_PAD.encode(self.digest(&json))
        ))
    }

    /// Verifies `token` and returns its value.
    ///
    /// The token must have been issued for the same `column` and `direction`.
    pub fn decode(
        &self,
        token: &str,
        column: &str,
        direction: Direction,
    ) -> Result<SqlValue, PaginationError> {
        let invalid = |reason: &str| PaginationError::InvalidCursor(reason.to_string());

        let (payload, digest) = token
            .split_once('.')
            .ok_or_else(|| invalid("malformed token"))?;
        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| invalid("malformed payload encoding"))?;
        let digest = URL_SAFE_NO_PAD
            .decode(digest)
            .map_err(|_| invalid("malformed digest encoding"))?;
        if digest != self.digest(&json) {
            return Err(invalid("digest mismatch"));
        }

        let payload: Payload =
            serde_json::from_slice(&json).map_err(|_| invalid("malformed payload"))?;
        if payload.c != column {
            return Err(invalid("token was issued for another column"));
        }
        if payload.d != direction_tag(direction) {
            return Err(invalid("token was issued for another direction"));
        }

        Ok(match payload.v {
            TaggedValue::Bool(b) => SqlValue::Bool(b),
            TaggedValue::Int(n) => SqlValue::Int(n),
            TaggedValue::Float(f) => SqlValue::Float(f),
            TaggedValue::Text(s) => SqlValue::Text(s),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip_keeps_type() {
        let codec = CursorCodec::new("s3cret");
        for value in [
            SqlValue::Int(42),
            SqlValue::Text("42".into()),
            SqlValue::Float(1.5),
            SqlValue::Bool(true),
        ] {
            let token = codec.encode("id", Direction::Asc, &value).unwrap();
            assert!(!token.contains('='));
            assert_eq!(codec.decode(&token, "id", Direction::Asc).unwrap(), value);
        }
    }

    #[test]
    fn test_tampered_token_rejected() {
        let codec = CursorCodec::new("s3cret");
        let token = codec.encode("id", Direction::Asc, &SqlValue::Int(10)).unwrap();
        let (_, digest) = token.split_once('.').unwrap();

        let forged = Payload {
            c: "id".into(),
            d: "asc".into(),
            v: TaggedValue::Int(11),
        };
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).unwrap());
        let tampered = format!("{forged_payload}.{digest}");

        assert!(matches!(
            codec.decode(&tampered, "id", Direction::Asc),
            Err(PaginationError::InvalidCursor(_))
        ));
        assert!(codec.decode("garbage", "id", Direction::Asc).is_err());
        assert!(codec.decode("", "id", Direction::Asc).is_err());
    }

    #[test]
    fn test_secret_and_context_must_match() {
        let token = CursorCodec::new("a")
            .encode("id", Direction::Desc, &SqlValue::Int(1))
            .unwrap();
        assert!(CursorCodec::new("b").decode(&token, "id", Direction::Desc).is_err());

        let codec = CursorCodec::new("a");
        assert!(codec.decode(&token, "created_at", Direction::Desc).is_err());
        assert!(codec.decode(&token, "id", Direction::Asc).is_err());
        assert!(codec.decode(&token, "id", Direction::Desc).is_ok());
    }

    #[test]
    fn test_unsupported_values() {
        let codec = CursorCodec::unkeyed();
        assert!(matches!(
            codec.encode("id", Direction::Asc, &SqlValue::Null),
            Err(PaginationError::UnsupportedCursorValue { kind: "null", .. })
        ));
        assert!(codec
            .encode("id", Direction::Asc, &SqlValue::Blob(vec![1]))
            .is_err());
        assert!(codec
            .encode("id", Direction::Asc, &SqlValue::Float(f64::NAN))
            .is_err());
    }
}

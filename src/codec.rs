//! Payload encodings.
//!
//! The collector accepts the same logical payload in more than one encoding.
//! [`JsonCodec`] is used unless another [`Codec`] is configured.

use std::fmt;

use statsum_types::protocol::{ErrorBody, Payload};
use thiserror::Error;

/// Raised if a payload cannot be encoded.
#[derive(Debug, Error)]
#[error("failed to encode payload as {content_type}")]
pub struct CodecError {
    content_type: &'static str,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl CodecError {
    /// Wraps an encoder failure.
    pub fn new<E>(content_type: &'static str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        CodecError {
            content_type,
            source: source.into(),
        }
    }
}

/// Encodes payloads and decodes collector error bodies.
pub trait Codec: Send + Sync + fmt::Debug {
    /// The value of the `content-type` and `accept` headers.
    fn content_type(&self) -> &'static str;

    /// Encodes a payload into a request body.
    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, CodecError>;

    /// Decodes the body of a rejected submission.
    ///
    /// Returns `None` if the body does not carry a structured error.
    fn decode_error(&self, body: &[u8]) -> Option<ErrorBody>;
}

/// Encodes payloads as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(payload).map_err(|err| CodecError::new(self.content_type(), err))
    }

    fn decode_error(&self, body: &[u8]) -> Option<ErrorBody> {
        serde_json::from_slice(body).ok()
    }
}

/// Encodes payloads as MessagePack.
///
/// **Feature:** `msgpack` (*disabled by default*)
#[cfg(feature = "msgpack")]
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgPackCodec;

#[cfg(feature = "msgpack")]
impl Codec for MsgPackCodec {
    fn content_type(&self) -> &'static str {
        "application/msgpack"
    }

    fn encode(&self, payload: &Payload) -> Result<Vec<u8>, CodecError> {
        rmp_serde::to_vec_named(payload).map_err(|err| CodecError::new(self.content_type(), err))
    }

    fn decode_error(&self, body: &[u8]) -> Option<ErrorBody> {
        // collectors answer with JSON errors even for binary submissions
        rmp_serde::from_slice(body)
            .ok()
            .or_else(|| serde_json::from_slice(body).ok())
    }
}

#[cfg(test)]
mod tests {
    use statsum_types::protocol::{CounterEntry, MeasureEntry};

    use super::*;

    fn payload() -> Payload {
        Payload {
            counters: vec![CounterEntry::new("requests", 10)],
            measures: vec![MeasureEntry::new("latency", vec![1.5])],
        }
    }

    #[test]
    fn test_json_encode() {
        let body = JsonCodec.encode(&payload()).unwrap();
        assert_eq!(
            std::str::from_utf8(&body).unwrap(),
            r#"{"counters":[{"k":"requests","v":10}],"measures":[{"k":"latency","v":[1.5]}]}"#
        );
    }

    #[test]
    fn test_json_decode_error() {
        let body = br#"{"code":"AuthorizationFailed","message":"bad token"}"#;
        let error = JsonCodec.decode_error(body).unwrap();
        assert_eq!(error.code, "AuthorizationFailed");
        assert_eq!(error.message, "bad token");

        assert_eq!(JsonCodec.decode_error(b"<html>Bad Request</html>"), None);
        assert_eq!(JsonCodec.decode_error(br#"{"code":"X"}"#), None);
    }

    #[cfg(feature = "msgpack")]
    #[test]
    fn test_msgpack_encode() {
        let body = MsgPackCodec.encode(&payload()).unwrap();
        let decoded: Payload = rmp_serde::from_slice(&body).unwrap();
        assert_eq!(decoded, payload());
        assert!(MsgPackCodec
            .decode_error(br#"{"code":"X","message":"y"}"#)
            .is_some());
    }
}

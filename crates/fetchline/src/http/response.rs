//! Response envelopes and payload decoding.

use bytes::Bytes;
use fetchline_core::TransferProgress;
use serde::de::DeserializeOwned;
use serde::de::value::{Error as ValueError, SeqDeserializer};
use serde_json::Value;

use super::config::{ProgressCallback, ResponseType};
use crate::error::{NetworkError, Result};

/// A decoded response payload, before conversion to the caller's type.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseData {
    /// Parsed JSON (or the raw text wrapped as a JSON string when the body
    /// was not valid JSON).
    Json(Value),
    /// The body as text.
    Text(String),
    /// The raw body bytes.
    Bytes(Bytes),
}

impl ResponseData {
    /// Interpret a raw body according to the response type.
    pub fn from_body(body: Bytes, response_type: ResponseType) -> Self {
        if response_type.is_binary() {
            return Self::Bytes(body);
        }
        if response_type != ResponseType::Json {
            return Self::Text(String::from_utf8_lossy(&body).into_owned());
        }

        if body.iter().all(u8::is_ascii_whitespace) {
            return Self::Json(Value::Null);
        }
        match serde_json::from_slice(&body) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Json(Value::String(String::from_utf8_lossy(&body).into_owned())),
        }
    }

    /// Convert the payload into the caller's type.
    ///
    /// JSON payloads deserialize directly, text payloads deserialize from a
    /// string and byte payloads from a sequence of `u8` (so `Vec<u8>` works).
    pub fn deserialize<R: DeserializeOwned>(self) -> Result<R> {
        match self {
            Self::Json(value) => {
                serde_json::from_value(value).map_err(|e| NetworkError::Decode(e.to_string()))
            }
            Self::Text(text) => serde_json::from_value(Value::String(text))
                .map_err(|e| NetworkError::Decode(e.to_string())),
            Self::Bytes(bytes) => {
                let deserializer = SeqDeserializer::<_, ValueError>::new(bytes.iter().copied());
                R::deserialize(deserializer).map_err(|e| NetworkError::Decode(e.to_string()))
            }
        }
    }
}

/// A successful response before it is unwrapped to its payload.
///
/// Response interceptors see this envelope; callers only ever receive the
/// payload.
#[derive(Clone, Debug)]
pub struct ResponseEnvelope {
    /// The HTTP status code.
    pub status: u16,
    /// The response headers.
    pub headers: http::HeaderMap,
    /// The final URL after redirects.
    pub url: String,
    /// The decoded payload.
    pub data: ResponseData,
}

impl ResponseEnvelope {
    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Discard the envelope and keep the payload.
    pub fn into_data(self) -> ResponseData {
        self.data
    }
}

/// Upper bound on the buffer reserved up front from `Content-Length`.
const MAX_INITIAL_CAPACITY: usize = 64 * 1024;

/// Capacity to reserve for a body of the advertised length. Beyond the cap the
/// buffer grows only as bytes arrive.
fn initial_capacity(content_length: Option<u64>) -> usize {
    content_length
        .map_or(0, |len| usize::try_from(len).unwrap_or(usize::MAX))
        .min(MAX_INITIAL_CAPACITY)
}

/// Read a whole response body, reporting download progress per chunk.
pub(crate) async fn read_body(
    mut response: reqwest::Response,
    on_progress: Option<&ProgressCallback>,
) -> Result<Bytes> {
    let Some(on_progress) = on_progress else {
        return Ok(response.bytes().await?);
    };

    let total_bytes = response.content_length();
    let mut buffer = Vec::with_capacity(initial_capacity(total_bytes));
    let mut received = 0u64;

    while let Some(chunk) = response.chunk().await? {
        received += chunk.len() as u64;
        buffer.extend_from_slice(&chunk);
        on_progress(&TransferProgress::download(
            received,
            total_bytes,
            chunk.len() as u64,
        ));
    }

    Ok(Bytes::from(buffer))
}

/// Parse a failure body as JSON, if it is JSON.
pub(crate) fn error_body(body: &Bytes) -> Option<Value> {
    serde_json::from_slice(body).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_body() {
        let data = ResponseData::from_body(Bytes::from_static(b"[1,2,3]"), ResponseType::Json);
        assert_eq!(data, ResponseData::Json(json!([1, 2, 3])));

        let items: Vec<u32> = data.deserialize().unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }

    #[test]
    fn test_empty_json_body_is_null() {
        let data = ResponseData::from_body(Bytes::new(), ResponseType::Json);
        assert_eq!(data, ResponseData::Json(Value::Null));

        data.clone().deserialize::<()>().unwrap();
        let maybe: Option<u32> = data.deserialize().unwrap();
        assert_eq!(maybe, None);
    }

    #[test]
    fn test_invalid_json_falls_back_to_text() {
        let data = ResponseData::from_body(Bytes::from_static(b"hello"), ResponseType::Json);
        assert_eq!(data, ResponseData::Json(json!("hello")));

        let text: String = data.deserialize().unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn test_text_body() {
        let data = ResponseData::from_body(Bytes::from_static(b"{\"a\":1}"), ResponseType::Text);
        let text: String = data.deserialize().unwrap();
        assert_eq!(text, "{\"a\":1}");
    }

    #[test]
    fn test_binary_body() {
        let data = ResponseData::from_body(Bytes::from_static(&[0, 159, 255]), ResponseType::Blob);
        assert_eq!(data, ResponseData::Bytes(Bytes::from_static(&[0, 159, 255])));

        let bytes: Vec<u8> = data.deserialize().unwrap();
        assert_eq!(bytes, vec![0, 159, 255]);
    }

    #[test]
    fn test_decode_mismatch_is_decode_error() {
        let data = ResponseData::from_body(Bytes::from_static(b"{\"a\":1}"), ResponseType::Json);
        let result: Result<Vec<u32>> = data.deserialize();
        assert!(matches!(result, Err(NetworkError::Decode(_))));
    }

    #[test]
    fn test_envelope_header_lookup() {
        let mut headers = http::HeaderMap::new();
        headers.insert("x-request-id", http::HeaderValue::from_static("abc"));
        let envelope = ResponseEnvelope {
            status: 200,
            headers,
            url: "https://example.com/items".to_string(),
            data: ResponseData::Json(Value::Null),
        };

        assert_eq!(envelope.header("X-Request-Id"), Some("abc"));
        assert_eq!(envelope.header("x-missing"), None);
        assert_eq!(envelope.into_data(), ResponseData::Json(Value::Null));
    }

    #[test]
    fn test_initial_capacity_is_capped() {
        assert_eq!(initial_capacity(None), 0);
        assert_eq!(initial_capacity(Some(10)), 10);
        assert_eq!(initial_capacity(Some(1_000_000_000_000_000)), MAX_INITIAL_CAPACITY);
        assert_eq!(initial_capacity(Some(u64::MAX)), MAX_INITIAL_CAPACITY);
    }

    #[test]
    fn test_error_body() {
        assert_eq!(
            error_body(&Bytes::from_static(b"{\"message\":\"X\"}")),
            Some(json!({"message": "X"}))
        );
        assert_eq!(error_body(&Bytes::from_static(b"Not Found")), None);
    }
}

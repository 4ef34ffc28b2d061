//! Request configuration types.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fetchline_core::logging::targets;
use fetchline_core::{CancelSignal, TransferProgress};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Callback invoked with upload or download progress.
pub type ProgressCallback = Arc<dyn Fn(&TransferProgress) + Send + Sync>;

/// Untyped query parameters.
pub type QueryParams = Map<String, Value>;

/// HTTP request methods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// HTTP GET method.
    #[default]
    Get,
    /// HTTP POST method.
    Post,
    /// HTTP PUT method.
    Put,
    /// HTTP DELETE method.
    Delete,
    /// HTTP PATCH method.
    Patch,
    /// HTTP HEAD method.
    Head,
    /// HTTP OPTIONS method.
    Options,
}

impl HttpMethod {
    /// Convert to reqwest method.
    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
            Self::Head => reqwest::Method::HEAD,
            Self::Options => reqwest::Method::OPTIONS,
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Patch => write!(f, "PATCH"),
            Self::Head => write!(f, "HEAD"),
            Self::Options => write!(f, "OPTIONS"),
        }
    }
}

/// How the response body is interpreted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Structured text: the body is parsed as JSON.
    #[default]
    Json,
    /// The body as a string.
    Text,
    /// Opaque binary data.
    Blob,
    /// Raw bytes.
    ArrayBuffer,
}

impl ResponseType {
    /// Check if the body is kept as raw bytes.
    pub fn is_binary(self) -> bool {
        matches!(self, Self::Blob | Self::ArrayBuffer)
    }
}

impl std::fmt::Display for ResponseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Text => write!(f, "text"),
            Self::Blob => write!(f, "blob"),
            Self::ArrayBuffer => write!(f, "arraybuffer"),
        }
    }
}

/// The body of an HTTP request.
#[derive(Clone, Debug)]
pub enum RequestBody {
    /// Plain text body, sent as-is.
    Text(String),
    /// JSON body.
    Json(Value),
    /// URL-encoded form data.
    Form(HashMap<String, String>),
    /// Raw binary body.
    Bytes(Bytes),
}

impl RequestBody {
    /// Build a body from any serializable value.
    ///
    /// Strings are sent verbatim, everything else as JSON.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(match serde_json::to_value(value)? {
            Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        })
    }

    /// Encode the body, returning the bytes and the content type it implies.
    ///
    /// Text and JSON bodies return no content type so the request's
    /// `Content-Type` header applies unchanged.
    pub(crate) fn encode(&self) -> Result<(Bytes, Option<&'static str>)> {
        match self {
            Self::Text(text) => Ok((Bytes::from(text.clone()), None)),
            Self::Json(value) => Ok((Bytes::from(serde_json::to_vec(value)?), None)),
            Self::Form(data) => {
                let mut pairs: Vec<_> = data.iter().collect();
                pairs.sort();
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                Ok((
                    Bytes::from(encoded),
                    Some("application/x-www-form-urlencoded"),
                ))
            }
            Self::Bytes(bytes) => Ok((bytes.clone(), Some("application/octet-stream"))),
        }
    }
}

/// Authentication credentials for a request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authentication {
    /// HTTP Basic authentication.
    Basic {
        /// Username.
        username: String,
        /// Password (optional).
        password: Option<String>,
    },
    /// Bearer token authentication.
    Bearer(String),
}

/// Convert an arbitrary serializable value into query parameters.
///
/// Returns `None` (and logs) when the value is not a map.
pub(crate) fn params_from_serialize<T: Serialize + ?Sized>(value: &T) -> Option<QueryParams> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Some(map),
        Ok(Value::Null) => Some(QueryParams::new()),
        Ok(other) => {
            tracing::error!(target: targets::BODY, "Query parameters must be a map, got: {}", other);
            None
        }
        Err(e) => {
            tracing::error!(target: targets::BODY, "Failed to serialize query parameters: {}", e);
            None
        }
    }
}

/// Flatten query parameters into string pairs.
///
/// Strings are kept verbatim, numbers and booleans are stringified, `null`
/// is skipped, arrays become repeated `key[]` entries and nested objects are
/// JSON-encoded.
pub(crate) fn flatten_params(params: &QueryParams) -> Vec<(String, String)> {
    fn scalar(value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }

    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Array(items) => {
                let key = format!("{key}[]");
                pairs.extend(
                    items
                        .iter()
                        .filter_map(scalar)
                        .map(|item| (key.clone(), item)),
                );
            }
            other => {
                if let Some(item) = scalar(other) {
                    pairs.push((key.clone(), item));
                }
            }
        }
    }
    pairs
}

/// A complete description of one call handed to
/// [`RequestService::request`](super::RequestService::request).
#[derive(Clone, Default)]
pub struct RequestConfig {
    /// Absolute URL, or a path relative to the service's base URL.
    pub url: String,
    /// The HTTP method.
    pub method: HttpMethod,
    /// Request body.
    pub data: Option<RequestBody>,
    /// Query parameters.
    pub params: Option<QueryParams>,
    /// Per-request headers, layered over the service defaults.
    pub headers: HashMap<String, String>,
    /// Request timeout override.
    pub timeout: Option<Duration>,
    /// Authentication.
    pub auth: Option<Authentication>,
    /// Cancellation signal observed while the call is in flight.
    pub signal: Option<CancelSignal>,
    /// Upload progress callback.
    pub on_upload_progress: Option<ProgressCallback>,
    /// Download progress callback.
    pub on_download_progress: Option<ProgressCallback>,
}

impl RequestConfig {
    /// Create a configuration for the given method and URL.
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            ..Default::default()
        }
    }

    /// Overlay passthrough options; every field set in `options` wins.
    pub fn merge(mut self, options: RequestOptions) -> Self {
        if let Some(url) = options.url {
            self.url = url;
        }
        if let Some(method) = options.method {
            self.method = method;
        }
        if let Some(data) = options.data {
            self.data = Some(data);
        }
        if let Some(params) = options.params {
            self.params = Some(params);
        }
        if let Some(headers) = options.headers {
            self.headers = headers;
        }
        if let Some(timeout) = options.timeout {
            self.timeout = Some(timeout);
        }
        if let Some(auth) = options.auth {
            self.auth = Some(auth);
        }
        if let Some(signal) = options.signal {
            self.signal = Some(signal);
        }
        if let Some(callback) = options.on_upload_progress {
            self.on_upload_progress = Some(callback);
        }
        if let Some(callback) = options.on_download_progress {
            self.on_download_progress = Some(callback);
        }
        self
    }
}

impl std::fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestConfig")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("data", &self.data)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("has_auth", &self.auth.is_some())
            .field("has_signal", &self.signal.is_some())
            .field("has_upload_progress", &self.on_upload_progress.is_some())
            .field("has_download_progress", &self.on_download_progress.is_some())
            .finish()
    }
}

/// Free-form passthrough options, merged last over everything the builder
/// assembled.
#[derive(Clone, Default)]
pub struct RequestOptions {
    /// Replaces the URL.
    pub url: Option<String>,
    /// Replaces the method.
    pub method: Option<HttpMethod>,
    /// Replaces the body.
    pub data: Option<RequestBody>,
    /// Replaces the query parameters.
    pub params: Option<QueryParams>,
    /// Replaces the whole per-request header map.
    pub headers: Option<HashMap<String, String>>,
    /// Replaces the response interpretation mode.
    pub response_type: Option<ResponseType>,
    /// Replaces the timeout.
    pub timeout: Option<Duration>,
    /// Replaces the authentication.
    pub auth: Option<Authentication>,
    /// Replaces the cancellation signal.
    pub signal: Option<CancelSignal>,
    /// Replaces the upload progress callback.
    pub on_upload_progress: Option<ProgressCallback>,
    /// Replaces the download progress callback.
    pub on_download_progress: Option<ProgressCallback>,
}

impl RequestOptions {
    /// Create empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Override the method.
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = Some(method);
        self
    }

    /// Override the body with a JSON (or verbatim string) value.
    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        match RequestBody::from_serialize(body) {
            Ok(body) => self.data = Some(body),
            Err(e) => {
                tracing::error!(target: targets::BODY, "Failed to serialize JSON body: {}", e);
            }
        }
        self
    }

    /// Override the body.
    pub fn body(mut self, body: RequestBody) -> Self {
        self.data = Some(body);
        self
    }

    /// Override the query parameters.
    pub fn params<T: Serialize>(mut self, params: &T) -> Self {
        if let Some(params) = params_from_serialize(params) {
            self.params = Some(params);
        }
        self
    }

    /// Override the per-request headers.
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Override the response interpretation mode.
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    /// Override the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the authentication.
    pub fn auth(mut self, auth: Authentication) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Override the cancellation signal.
    pub fn signal(mut self, signal: CancelSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Override the upload progress callback.
    pub fn on_upload_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TransferProgress) + Send + Sync + 'static,
    {
        self.on_upload_progress = Some(Arc::new(callback));
        self
    }

    /// Override the download progress callback.
    pub fn on_download_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TransferProgress) + Send + Sync + 'static,
    {
        self.on_download_progress = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestOptions")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("data", &self.data)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("response_type", &self.response_type)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_method_defaults_to_get() {
        assert_eq!(HttpMethod::default(), HttpMethod::Get);
        assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
        assert_eq!(HttpMethod::Delete.to_reqwest(), reqwest::Method::DELETE);
    }

    #[test]
    fn test_response_type_defaults_to_json() {
        assert_eq!(ResponseType::default(), ResponseType::Json);
        assert!(ResponseType::ArrayBuffer.is_binary());
        assert!(!ResponseType::Text.is_binary());
        assert_eq!(
            serde_json::to_value(ResponseType::ArrayBuffer).unwrap(),
            json!("arraybuffer")
        );
    }

    #[test]
    fn test_string_body_is_sent_verbatim() {
        let body = RequestBody::from_serialize("raw text").unwrap();
        let (bytes, content_type) = body.encode().unwrap();
        assert_eq!(&bytes[..], b"raw text");
        assert_eq!(content_type, None);
    }

    #[test]
    fn test_struct_body_is_json() {
        #[derive(Serialize)]
        struct Item {
            id: u32,
        }

        let body = RequestBody::from_serialize(&Item { id: 7 }).unwrap();
        assert!(matches!(body, RequestBody::Json(_)));
        let (bytes, _) = body.encode().unwrap();
        assert_eq!(&bytes[..], br#"{"id":7}"#);
    }

    #[test]
    fn test_form_body_encoding() {
        let mut form = HashMap::new();
        form.insert("user".to_string(), "a b".to_string());
        form.insert("pass".to_string(), "x&y".to_string());

        let (bytes, content_type) = RequestBody::Form(form).encode().unwrap();
        assert_eq!(&bytes[..], b"pass=x%26y&user=a+b");
        assert_eq!(content_type, Some("application/x-www-form-urlencoded"));
    }

    #[test]
    fn test_flatten_params() {
        let params = params_from_serialize(&json!({
            "q": "rust",
            "page": 2,
            "exact": true,
            "skip": null,
            "tags": ["a", "b"],
            "filter": {"min": 1},
        }))
        .unwrap();

        let mut pairs = flatten_params(&params);
        pairs.sort();
        assert_eq!(
            pairs,
            vec![
                ("exact".to_string(), "true".to_string()),
                ("filter".to_string(), r#"{"min":1}"#.to_string()),
                ("page".to_string(), "2".to_string()),
                ("q".to_string(), "rust".to_string()),
                ("tags[]".to_string(), "a".to_string()),
                ("tags[]".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_non_map_params_are_rejected() {
        assert!(params_from_serialize(&json!([1, 2])).is_none());
        assert_eq!(params_from_serialize(&()), Some(QueryParams::new()));
    }

    #[test]
    fn test_merge_options_win() {
        let mut headers = HashMap::new();
        headers.insert("X-Base".to_string(), "1".to_string());
        let config = RequestConfig {
            headers,
            timeout: Some(Duration::from_secs(1)),
            ..RequestConfig::new(HttpMethod::Get, "/a")
        };

        let mut override_headers = HashMap::new();
        override_headers.insert("X-Override".to_string(), "2".to_string());
        let merged = config.merge(
            RequestOptions::new()
                .url("/b")
                .method(HttpMethod::Put)
                .headers(override_headers)
                .json(&json!({"k": "v"})),
        );

        assert_eq!(merged.url, "/b");
        assert_eq!(merged.method, HttpMethod::Put);
        assert_eq!(merged.timeout, Some(Duration::from_secs(1)));
        assert!(merged.headers.contains_key("X-Override"));
        assert!(!merged.headers.contains_key("X-Base"));
        assert!(matches!(merged.data, Some(RequestBody::Json(_))));
    }

    #[test]
    fn test_merge_empty_options_is_identity() {
        let config = RequestConfig::new(HttpMethod::Post, "/items");
        let merged = config.merge(RequestOptions::default());
        assert_eq!(merged.url, "/items");
        assert_eq!(merged.method, HttpMethod::Post);
        assert!(merged.data.is_none());
    }
}

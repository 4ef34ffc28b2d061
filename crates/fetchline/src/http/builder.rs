//! Fluent request builder with lifecycle callbacks.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use fetchline_core::logging::targets;
use fetchline_core::{CancellationToken, TransferProgress};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::config::{
    Authentication, HttpMethod, ProgressCallback, QueryParams, RequestBody, RequestConfig,
    RequestOptions, ResponseType, params_from_serialize,
};
use super::service::RequestService;
use crate::error::{RequestError, Result};

type LoadingCallback = Arc<dyn Fn(bool) + Send + Sync>;
type CompletedCallback<R> = Arc<dyn Fn(&R) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&RequestError) + Send + Sync>;

/// At most one callback of each kind; setting one again replaces it.
struct Callbacks<R> {
    loading: Option<LoadingCallback>,
    completed: Option<CompletedCallback<R>>,
    error: Option<ErrorCallback>,
    progress: Option<ProgressCallback>,
}

impl<R> Default for Callbacks<R> {
    fn default() -> Self {
        Self {
            loading: None,
            completed: None,
            error: None,
            progress: None,
        }
    }
}

/// Reports `loading(true)` on creation and `loading(false)` on drop, so the
/// closing notification also fires when a `send` future is dropped early.
struct LoadingGuard(Option<LoadingCallback>);

impl LoadingGuard {
    fn start(callback: Option<LoadingCallback>) -> Self {
        if let Some(callback) = &callback {
            callback(true);
        }
        Self(callback)
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        if let Some(callback) = self.0.take() {
            callback(false);
        }
    }
}

enum Payload<B> {
    Typed(B),
    Raw(RequestBody),
}

/// A chainable description of one HTTP call.
///
/// Setters consume and return the builder. [`send`](Self::send) and
/// [`abort`](Self::abort) borrow it, so a shared builder can be aborted while
/// its `send` future is pending.
///
/// `B` is the request body type and `R` the decoded payload type.
///
/// # Example
///
/// ```ignore
/// let items: Vec<u32> = service
///     .builder::<(), Vec<u32>>()
///     .url("/items")
///     .on_loading(|busy| println!("loading: {busy}"))
///     .on_completed(|items| println!("got {} items", items.len()))
///     .send()
///     .await?;
/// ```
pub struct RequestBuilder<B = Value, R = Value> {
    service: RequestService,
    url: Option<String>,
    method: HttpMethod,
    data: Option<Payload<B>>,
    params: Option<QueryParams>,
    headers: HashMap<String, String>,
    options: RequestOptions,
    response_type: ResponseType,
    timeout: Option<Duration>,
    auth: Option<Authentication>,
    callbacks: Callbacks<R>,
    token: Mutex<Option<CancellationToken>>,
    _result: PhantomData<fn() -> R>,
}

impl<B, R> RequestBuilder<B, R> {
    /// Create a builder bound to a service.
    pub fn new(service: RequestService) -> Self {
        Self {
            service,
            url: None,
            method: HttpMethod::Get,
            data: None,
            params: None,
            headers: HashMap::new(),
            options: RequestOptions::default(),
            response_type: ResponseType::Json,
            timeout: None,
            auth: None,
            callbacks: Callbacks::default(),
            token: Mutex::new(None),
            _result: PhantomData,
        }
    }

    /// Set the URL, absolute or relative to the service's base URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the HTTP method.
    pub fn method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Set the request body.
    ///
    /// Strings are sent verbatim, other values as JSON.
    pub fn data(mut self, data: B) -> Self {
        self.data = Some(Payload::Typed(data));
        self
    }

    /// Set a pre-encoded body such as a form or raw bytes.
    pub fn body(mut self, body: RequestBody) -> Self {
        self.data = Some(Payload::Raw(body));
        self
    }

    /// Set the query parameters from any value serializing to a map.
    pub fn params<T: Serialize + ?Sized>(mut self, params: &T) -> Self {
        if let Some(params) = params_from_serialize(params) {
            self.params = Some(params);
        }
        self
    }

    /// Add a single query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.params
                    .get_or_insert_with(QueryParams::new)
                    .insert(key.into(), value);
            }
            Err(e) => {
                tracing::error!(target: targets::BODY, "Failed to serialize query parameter: {}", e);
            }
        }
        self
    }

    /// Set the per-request headers, layered over the service defaults.
    ///
    /// Headers passed through [`config`](Self::config) replace this map.
    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Add a single custom header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set passthrough options, merged last over everything else.
    pub fn config(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// Set how the response body is interpreted.
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set bearer token authentication.
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(Authentication::Bearer(token.into()));
        self
    }

    /// Set basic authentication.
    pub fn basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.auth = Some(Authentication::Basic {
            username: username.into(),
            password,
        });
        self
    }

    /// Register the completion callback, called with the decoded payload.
    pub fn on_completed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&R) + Send + Sync + 'static,
    {
        self.callbacks.completed = Some(Arc::new(callback));
        self
    }

    /// Register the error callback, called with the normalized error.
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RequestError) + Send + Sync + 'static,
    {
        self.callbacks.error = Some(Arc::new(callback));
        self
    }

    /// Register the loading callback: `true` before the call, `false` once it
    /// has settled.
    pub fn on_loading<F>(mut self, callback: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.callbacks.loading = Some(Arc::new(callback));
        self
    }

    /// Register the progress callback, used for both upload and download.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TransferProgress) + Send + Sync + 'static,
    {
        self.callbacks.progress = Some(Arc::new(callback));
        self
    }

    /// Cancel the most recent `send`. Does nothing if `send` was never called.
    pub fn abort(&self) {
        if let Some(token) = self.token.lock().as_ref() {
            tracing::debug!(target: targets::BUILDER, "aborting request to {:?}", self.url);
            token.abort();
        }
    }

    /// The token of the most recent `send`, if any.
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.token.lock().clone()
    }

    /// Get the service this builder sends through.
    pub fn service(&self) -> &RequestService {
        &self.service
    }
}

impl<B: Serialize, R: DeserializeOwned> RequestBuilder<B, R> {
    /// Issue the request.
    ///
    /// Callbacks fire in order: loading(true), then completed or error, then
    /// loading(false). Each call creates a fresh cancellation token; only the
    /// latest one is reachable through [`abort`](Self::abort).
    pub async fn send(&self) -> std::result::Result<R, RequestError> {
        let _loading = LoadingGuard::start(self.callbacks.loading.clone());

        let token = CancellationToken::new();
        *self.token.lock() = Some(token.clone());

        let result = match self.request_config(&token) {
            Ok(config) => {
                let response_type = self.options.response_type.unwrap_or(self.response_type);
                self.service.request::<R>(config, None, response_type).await
            }
            Err(error) => {
                tracing::warn!(target: targets::BUILDER, "failed to prepare request: {}", error);
                Err(RequestError::from(error))
            }
        };

        match &result {
            Ok(payload) => {
                if let Some(callback) = &self.callbacks.completed {
                    callback(payload);
                }
            }
            Err(error) => {
                if let Some(callback) = &self.callbacks.error {
                    callback(error);
                }
            }
        }

        result
    }

    /// Assemble the configuration handed to the service for one `send`.
    fn request_config(&self, token: &CancellationToken) -> Result<RequestConfig> {
        let data = match &self.data {
            Some(Payload::Typed(data)) => Some(RequestBody::from_serialize(data)?),
            Some(Payload::Raw(body)) => Some(body.clone()),
            None => None,
        };

        let config = RequestConfig {
            url: self.url.clone().unwrap_or_default(),
            method: self.method,
            data,
            params: self.params.clone(),
            headers: self.headers.clone(),
            timeout: self.timeout,
            auth: self.auth.clone(),
            signal: Some(token.signal()),
            on_upload_progress: self.callbacks.progress.clone(),
            on_download_progress: self.callbacks.progress.clone(),
        };

        Ok(config.merge(self.options.clone()))
    }
}

impl<B, R> std::fmt::Debug for RequestBuilder<B, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("url", &self.url)
            .field("method", &self.method)
            .field("has_data", &self.data.is_some())
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("options", &self.options)
            .field("response_type", &self.response_type)
            .field("timeout", &self.timeout)
            .field("has_token", &self.token.lock().is_some())
            .finish_non_exhaustive()
    }
}

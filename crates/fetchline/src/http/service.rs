//! The request service: owner of the HTTP client and of error normalization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fetchline_core::logging::targets;
use fetchline_core::{CancelSignal, TransferProgress};
use futures_util::StreamExt;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use url::Url;

use super::builder::RequestBuilder;
use super::config::{
    Authentication, ProgressCallback, QueryParams, RequestConfig, ResponseType, flatten_params,
};
use super::response::{ResponseData, ResponseEnvelope, error_body, read_body};
use super::xsrf;
use crate::error::{NetworkError, RequestError, Result};

/// Default `Accept` header sent with every request.
pub const DEFAULT_ACCEPT: &str = "application/json";

/// Default `Content-Type` header sent with every request that has a body.
pub const DEFAULT_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Request bodies are streamed in chunks of this size when upload progress
/// is observed.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Request interceptors run before each call and may rewrite it.
pub type RequestInterceptor = Arc<dyn Fn(&mut RequestConfig) + Send + Sync>;

/// Response interceptors run on each successful envelope. Returning an error
/// fails the request.
pub type ResponseInterceptor = Arc<dyn Fn(&ResponseEnvelope) -> Result<()> + Send + Sync>;

/// Error transformers run once on a failure, before normalization.
pub type ErrorTransformer = Arc<dyn Fn(NetworkError) -> NetworkError + Send + Sync>;

#[derive(Clone, Default)]
struct Interceptors {
    request: Vec<RequestInterceptor>,
    response: Vec<ResponseInterceptor>,
    error: Option<ErrorTransformer>,
}

/// Identifier used to correlate log lines of one call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Configuration for the request service.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Base URL that relative request URLs are joined onto.
    pub base_url: Option<String>,
    /// Request timeout.
    pub timeout: Option<Duration>,
    /// Connect timeout.
    pub connect_timeout: Option<Duration>,
    /// Whether to follow redirects.
    pub follow_redirects: bool,
    /// Maximum number of redirects to follow.
    pub max_redirects: usize,
    /// Whether to keep a cookie jar.
    pub cookies_enabled: bool,
    /// Whether the anti-forgery header is also sent to other origins.
    pub with_credentials: bool,
    /// Cookie holding the anti-forgery token.
    pub xsrf_cookie_name: String,
    /// Header the anti-forgery token is copied into.
    pub xsrf_header_name: String,
    /// Default user agent.
    pub user_agent: Option<String>,
    /// Proxy URL.
    pub proxy: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Some(Duration::from_secs(30)),
            connect_timeout: Some(Duration::from_secs(10)),
            follow_redirects: true,
            max_redirects: 10,
            cookies_enabled: true,
            with_credentials: false,
            xsrf_cookie_name: "XSRF-TOKEN".to_string(),
            xsrf_header_name: "X-XSRF-TOKEN".to_string(),
            user_agent: Some(format!("fetchline/{} (Rust)", env!("CARGO_PKG_VERSION"))),
            proxy: None,
        }
    }
}

/// Builder for creating a request service with custom configuration.
pub struct RequestServiceBuilder {
    config: ServiceConfig,
    default_headers: HeaderMap,
    interceptors: Interceptors,
}

impl Default for RequestServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestServiceBuilder {
    /// Create a new builder with default configuration and JSON headers.
    pub fn new() -> Self {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(ACCEPT, HeaderValue::from_static(DEFAULT_ACCEPT));
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

        Self {
            config: ServiceConfig::default(),
            default_headers,
            interceptors: Interceptors::default(),
        }
    }

    /// Set the base URL for relative request URLs.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.base_url = Some(base_url.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Disable request timeout.
    pub fn no_timeout(mut self) -> Self {
        self.config.timeout = None;
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Disable redirect following.
    pub fn no_redirects(mut self) -> Self {
        self.config.follow_redirects = false;
        self
    }

    /// Set the maximum number of redirects to follow.
    pub fn max_redirects(mut self, max: usize) -> Self {
        self.config.max_redirects = max;
        self
    }

    /// Disable cookie storage. This also disables anti-forgery tokens.
    pub fn no_cookies(mut self) -> Self {
        self.config.cookies_enabled = false;
        self
    }

    /// Send the anti-forgery header to every origin, not only the base URL's.
    pub fn with_credentials(mut self, enabled: bool) -> Self {
        self.config.with_credentials = enabled;
        self
    }

    /// Set the cookie the anti-forgery token is read from.
    pub fn xsrf_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.config.xsrf_cookie_name = name.into();
        self
    }

    /// Set the header the anti-forgery token is written to.
    pub fn xsrf_header_name(mut self, name: impl Into<String>) -> Self {
        self.config.xsrf_header_name = name.into();
        self
    }

    /// Set the user agent string.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Set a proxy URL.
    pub fn proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy_url.into());
        self
    }

    /// Add or replace a default header sent with every request.
    pub fn default_header(
        mut self,
        name: impl TryInto<HeaderName>,
        value: impl TryInto<HeaderValue>,
    ) -> Result<Self> {
        let name = name
            .try_into()
            .map_err(|_| NetworkError::InvalidHeader("Invalid header name".to_string()))?;
        let value = value
            .try_into()
            .map_err(|_| NetworkError::InvalidHeader("Invalid header value".to_string()))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Add a request interceptor.
    ///
    /// Request interceptors are called in order before each request is sent.
    ///
    /// ```ignore
    /// RequestService::configure().add_request_interceptor(|config| {
    ///     config.headers.insert("X-Request-Source".into(), "dashboard".into());
    /// })
    /// ```
    pub fn add_request_interceptor<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(&mut RequestConfig) + Send + Sync + 'static,
    {
        self.interceptors.request.push(Arc::new(interceptor));
        self
    }

    /// Add a response interceptor.
    ///
    /// Response interceptors are called in order after each successful
    /// response and can fail the request by returning an error.
    pub fn add_response_interceptor<F>(mut self, interceptor: F) -> Self
    where
        F: Fn(&ResponseEnvelope) -> Result<()> + Send + Sync + 'static,
    {
        self.interceptors.response.push(Arc::new(interceptor));
        self
    }

    /// Set an error transformer, applied before normalization.
    pub fn error_transformer<F>(mut self, transformer: F) -> Self
    where
        F: Fn(NetworkError) -> NetworkError + Send + Sync + 'static,
    {
        self.interceptors.error = Some(Arc::new(transformer));
        self
    }

    /// Build the request service.
    pub fn build(self) -> Result<RequestService> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(connect_timeout) = self.config.connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }

        if self.config.follow_redirects {
            builder = builder.redirect(Policy::limited(self.config.max_redirects));
        } else {
            builder = builder.redirect(Policy::none());
        }

        let cookie_jar = if self.config.cookies_enabled {
            let jar = Arc::new(Jar::default());
            builder = builder.cookie_provider(jar.clone());
            Some(jar)
        } else {
            None
        };

        if let Some(ref ua) = self.config.user_agent {
            builder = builder.user_agent(ua);
        }

        if let Some(ref proxy_url) = self.config.proxy {
            let proxy =
                reqwest::Proxy::all(proxy_url).map_err(|e| NetworkError::Proxy(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let base_origin = self
            .config
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()?;

        let client = builder.build()?;

        Ok(RequestService {
            inner: Arc::new(RequestServiceInner {
                client,
                config: self.config,
                default_headers: self.default_headers,
                base_origin,
                cookie_jar,
                interceptors: self.interceptors,
            }),
        })
    }
}

impl std::fmt::Debug for RequestServiceBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestServiceBuilder")
            .field("config", &self.config)
            .field("default_headers", &self.default_headers)
            .finish_non_exhaustive()
    }
}

struct RequestServiceInner {
    client: reqwest::Client,
    config: ServiceConfig,
    default_headers: HeaderMap,
    base_origin: Option<Url>,
    cookie_jar: Option<Arc<Jar>>,
    interceptors: Interceptors,
}

/// Owns the HTTP client, its defaults, and the single point where failures
/// are normalized.
///
/// The service is cheaply cloneable. Clones share the same client, cookie jar
/// and configuration.
///
/// # Example
///
/// ```ignore
/// use fetchline::RequestService;
///
/// let service = RequestService::configure()
///     .base_url("https://api.example.com")
///     .build()?;
///
/// let items: Vec<u32> = service.builder::<(), _>().url("/items").send().await?;
/// ```
#[derive(Clone)]
pub struct RequestService {
    inner: Arc<RequestServiceInner>,
}

impl RequestService {
    /// Create a service with the default configuration.
    pub fn initialize() -> Result<Self> {
        RequestServiceBuilder::new().build()
    }

    /// Create a builder for configuring a new service.
    pub fn configure() -> RequestServiceBuilder {
        RequestServiceBuilder::new()
    }

    /// Get the service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Get the headers sent with every request.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.inner.default_headers
    }

    /// Get the cookie jar, if cookies are enabled.
    pub fn cookie_jar(&self) -> Option<&Arc<Jar>> {
        self.inner.cookie_jar.as_ref()
    }

    /// Create a request builder bound to this service.
    pub fn builder<B, R>(&self) -> RequestBuilder<B, R> {
        RequestBuilder::new(self.clone())
    }

    /// Merge headers: defaults, then per-request config headers, then custom
    /// headers. Later layers win on the same (case-insensitive) name.
    pub fn effective_headers(
        &self,
        config_headers: &HashMap<String, String>,
        custom_headers: Option<&HashMap<String, String>>,
    ) -> Result<HeaderMap> {
        let mut headers = self.inner.default_headers.clone();
        for layer in std::iter::once(config_headers).chain(custom_headers) {
            for (name, value) in layer {
                headers.insert(
                    HeaderName::try_from(name.as_str())?,
                    HeaderValue::try_from(value.as_str())?,
                );
            }
        }
        Ok(headers)
    }

    /// Resolve a request URL against the base URL and append query params.
    pub fn resolve_url(&self, url: &str, params: Option<&QueryParams>) -> Result<Url> {
        let mut resolved = match Url::parse(url) {
            Ok(resolved) => resolved,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.inner.config.base_url.as_deref().ok_or_else(|| {
                    NetworkError::InvalidUrl(format!("relative URL '{url}' without a base URL"))
                })?;
                Url::parse(&join_url(base, url))?
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(params) = params {
            let pairs = flatten_params(params);
            if !pairs.is_empty() {
                resolved.query_pairs_mut().extend_pairs(pairs);
            }
        }
        Ok(resolved)
    }

    /// Issue a request and decode its payload.
    ///
    /// Headers are merged as described in [`effective_headers`]. If the call
    /// fails after `config.signal` was triggered the result is exactly
    /// [`RequestError::canceled`]; any other failure is normalized once here.
    ///
    /// [`effective_headers`]: RequestService::effective_headers
    pub async fn request<R: DeserializeOwned>(
        &self,
        mut config: RequestConfig,
        custom_headers: Option<&HashMap<String, String>>,
        response_type: ResponseType,
    ) -> std::result::Result<R, RequestError> {
        for interceptor in &self.inner.interceptors.request {
            interceptor(&mut config);
        }

        let id = RequestId::next();
        let signal = config.signal.clone();
        tracing::debug!(
            target: targets::SERVICE,
            "[{}] {} {} (response type: {})",
            id,
            config.method,
            config.url,
            response_type
        );

        let outcome = match &signal {
            Some(signal) => tokio::select! {
                result = self.execute::<R>(config, custom_headers, response_type) => result,
                () = signal.cancelled() => Err(NetworkError::Cancelled),
            },
            None => self.execute::<R>(config, custom_headers, response_type).await,
        };

        match outcome {
            Ok(payload) => {
                tracing::debug!(target: targets::SERVICE, "[{}] completed", id);
                Ok(payload)
            }
            Err(error) => Err(self.normalize_failure(id, error, signal.as_ref())),
        }
    }

    async fn execute<R: DeserializeOwned>(
        &self,
        config: RequestConfig,
        custom_headers: Option<&HashMap<String, String>>,
        response_type: ResponseType,
    ) -> Result<R> {
        let envelope = self.dispatch(config, custom_headers, response_type).await?;
        for interceptor in &self.inner.interceptors.response {
            interceptor(&envelope)?;
        }
        envelope.into_data().deserialize()
    }

    /// Send the request and collect a successful envelope.
    async fn dispatch(
        &self,
        config: RequestConfig,
        custom_headers: Option<&HashMap<String, String>>,
        response_type: ResponseType,
    ) -> Result<ResponseEnvelope> {
        let url = self.resolve_url(&config.url, config.params.as_ref())?;
        let mut headers = self.effective_headers(&config.headers, custom_headers)?;
        self.attach_xsrf_token(&url, &mut headers);

        let explicit_content_type = config
            .headers
            .keys()
            .chain(custom_headers.into_iter().flat_map(|h| h.keys()))
            .any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));

        let body = match &config.data {
            Some(data) => {
                let (bytes, content_type) = data.encode()?;
                if let Some(content_type) = content_type
                    && !explicit_content_type
                {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
                }
                Some(bytes)
            }
            None => {
                headers.remove(CONTENT_TYPE);
                None
            }
        };

        let mut req_builder = self
            .inner
            .client
            .request(config.method.to_reqwest(), url)
            .headers(headers);

        if let Some(auth) = &config.auth {
            match auth {
                Authentication::Basic { username, password } => {
                    req_builder = req_builder.basic_auth(username, password.as_ref());
                }
                Authentication::Bearer(token) => {
                    req_builder = req_builder.bearer_auth(token);
                }
            }
        }

        if let Some(timeout) = config.timeout {
            req_builder = req_builder.timeout(timeout);
        }

        if let Some(bytes) = body {
            req_builder = req_builder.body(upload_body(bytes, config.on_upload_progress.clone()));
        }

        let response = req_builder.send().await?;
        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        let final_url = response.url().to_string();
        let body = read_body(response, config.on_download_progress.as_ref()).await?;

        if !(200..300).contains(&status) {
            return Err(NetworkError::HttpStatus {
                status,
                body: error_body(&body),
            });
        }

        Ok(ResponseEnvelope {
            status,
            headers: response_headers,
            url: final_url,
            data: ResponseData::from_body(body, response_type),
        })
    }

    /// Copy the anti-forgery cookie into its header when the target is
    /// eligible: always with `with_credentials`, otherwise only for the base
    /// URL's origin (or any origin when no base URL is configured).
    fn attach_xsrf_token(&self, url: &Url, headers: &mut HeaderMap) {
        let Some(jar) = &self.inner.cookie_jar else {
            return;
        };
        let config = &self.inner.config;
        let eligible = config.with_credentials
            || self
                .inner
                .base_origin
                .as_ref()
                .is_none_or(|base| xsrf::same_origin(base, url));
        if !eligible {
            return;
        }

        if let Some(token) = xsrf::token_for(jar, url, &config.xsrf_cookie_name)
            && let (Ok(name), Ok(value)) = (
                HeaderName::try_from(config.xsrf_header_name.as_str()),
                HeaderValue::try_from(token),
            )
        {
            headers.insert(name, value);
        }
    }

    fn normalize_failure(
        &self,
        id: RequestId,
        error: NetworkError,
        signal: Option<&CancelSignal>,
    ) -> RequestError {
        if error.is_cancelled() || signal.is_some_and(CancelSignal::is_cancelled) {
            tracing::debug!(target: targets::SERVICE, "[{}] canceled", id);
            return RequestError::canceled();
        }

        let error = match &self.inner.interceptors.error {
            Some(transformer) => transformer(error),
            None => error,
        };
        tracing::warn!(target: targets::SERVICE, "[{}] request failed: {}", id, error);
        RequestError::normalize(&error)
    }
}

impl std::fmt::Debug for RequestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestService")
            .field("config", &self.inner.config)
            .field("has_cookie_jar", &self.inner.cookie_jar.is_some())
            .field("request_interceptors", &self.inner.interceptors.request.len())
            .field("response_interceptors", &self.inner.interceptors.response.len())
            .finish()
    }
}

/// Join a relative path onto a base URL with exactly one `/` between them.
fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    if path.is_empty() {
        base.to_string()
    } else if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Wrap a body for sending, streaming it chunk by chunk when upload progress
/// is observed.
fn upload_body(bytes: Bytes, on_progress: Option<ProgressCallback>) -> reqwest::Body {
    let Some(on_progress) = on_progress else {
        return reqwest::Body::from(bytes);
    };

    let total_bytes = bytes.len() as u64;
    let chunks: Vec<Bytes> = (0..bytes.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| bytes.slice(start..(start + UPLOAD_CHUNK_SIZE).min(bytes.len())))
        .collect();

    let mut sent = 0u64;
    let stream = futures_util::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        on_progress(&TransferProgress::upload(
            sent,
            Some(total_bytes),
            chunk.len() as u64,
        ));
        Ok::<_, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(stream)
}

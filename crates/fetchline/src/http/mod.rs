//! HTTP request layer for fetchline.
//!
//! This module provides the [`RequestService`], which owns the HTTP client and
//! turns every failure into a [`RequestError`](crate::RequestError), and the
//! [`RequestBuilder`], a chainable description of one call with lifecycle
//! callbacks.
//!
//! # Example
//!
//! ```ignore
//! use fetchline::http::{HttpMethod, RequestConfig, RequestService, ResponseType};
//!
//! let service = RequestService::configure()
//!     .base_url("https://api.example.com")
//!     .build()?;
//!
//! // Issue a request directly
//! let config = RequestConfig::new(HttpMethod::Get, "/users");
//! let users: serde_json::Value = service.request(config, None, ResponseType::Json).await?;
//!
//! // Or through a builder with callbacks
//! let created: serde_json::Value = service
//!     .builder()
//!     .url("/users")
//!     .method(HttpMethod::Post)
//!     .data(serde_json::json!({"name": "John"}))
//!     .on_error(|error| eprintln!("failed: {}", error.message))
//!     .send()
//!     .await?;
//! ```
//!
//! # Cancellation
//!
//! ```ignore
//! let builder = Arc::new(service.builder::<(), Vec<u8>>().url("/large"));
//!
//! let pending = tokio::spawn({
//!     let builder = builder.clone();
//!     async move { builder.send().await }
//! });
//!
//! builder.abort();
//! assert!(pending.await?.unwrap_err().is_canceled());
//! ```

mod builder;
mod config;
mod response;
mod service;
mod xsrf;

pub use builder::RequestBuilder;
pub use config::{
    Authentication, HttpMethod, ProgressCallback, QueryParams, RequestBody, RequestConfig,
    RequestOptions, ResponseType,
};
pub use response::{ResponseData, ResponseEnvelope};
pub use service::{
    DEFAULT_ACCEPT, DEFAULT_CONTENT_TYPE, ErrorTransformer, RequestId, RequestInterceptor,
    RequestService, RequestServiceBuilder, ResponseInterceptor, ServiceConfig,
};

//! Fluent HTTP requests with lifecycle callbacks and normalized errors.
//!
//! This crate wraps [`reqwest`] with two pieces:
//!
//! - **Request Service**: owns the client, default headers, anti-forgery
//!   token handling and the single place where failures are normalized
//! - **Request Builder**: a chainable call description with loading,
//!   progress, completion and error callbacks plus cooperative cancellation
//!
//! Every failure reaching a caller has the same shape, [`RequestError`]:
//! `{success: false, message, error_code?}`.
//!
//! # Quick Start
//!
//! ```ignore
//! use fetchline::{HttpMethod, RequestService};
//!
//! let service = RequestService::configure()
//!     .base_url("https://api.example.com")
//!     .build()?;
//!
//! let items: Vec<u32> = service
//!     .builder::<(), Vec<u32>>()
//!     .url("/items")
//!     .method(HttpMethod::Get)
//!     .on_loading(|busy| println!("loading: {busy}"))
//!     .on_completed(|items| println!("received {items:?}"))
//!     .send()
//!     .await?;
//! ```
//!
//! ## Errors
//!
//! ```ignore
//! match service.builder::<(), Value>().url("/missing").send().await {
//!     Ok(value) => println!("{value}"),
//!     Err(error) if error.is_canceled() => println!("cancelled"),
//!     Err(error) => println!("{} ({:?})", error.message, error.error_code),
//! }
//! ```
//!
//! ## Configuration
//!
//! ```ignore
//! let service = RequestService::configure()
//!     .timeout(Duration::from_secs(60))
//!     .default_header("X-Client", "dashboard")?
//!     .with_credentials(true)
//!     .add_request_interceptor(|config| {
//!         config.headers.insert("X-Trace".into(), "1".into());
//!     })
//!     .build()?;
//! ```

mod error;
pub mod http;

pub use error::{CANCELED_MESSAGE, GENERIC_MESSAGE, NetworkError, RequestError, Result};

// Re-export commonly used types at the crate root
pub use fetchline_core::{CancelSignal, CancellationToken, TransferDirection, TransferProgress};
pub use http::{
    Authentication, HttpMethod, RequestBody, RequestBuilder, RequestConfig, RequestOptions,
    RequestService, RequestServiceBuilder, ResponseData, ResponseEnvelope, ResponseType,
    ServiceConfig,
};

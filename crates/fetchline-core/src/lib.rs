//! Core primitives for fetchline.
//!
//! This crate provides the small building blocks shared by the request layer:
//!
//! - **Cancellation**: [`CancellationToken`] and its observing [`CancelSignal`]
//! - **Progress**: [`TransferProgress`] events for uploads and downloads
//! - **Logging**: target names used by the `tracing` instrumentation
//!
//! # Cancellation Example
//!
//! ```
//! use fetchline_core::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let signal = token.signal();
//!
//! assert!(!signal.is_cancelled());
//! token.abort();
//! assert!(signal.is_cancelled());
//! ```

pub mod cancel;
pub mod logging;
pub mod progress;

pub use cancel::{CancelSignal, CancellationToken};
pub use progress::{TransferDirection, TransferProgress};

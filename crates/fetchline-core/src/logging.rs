//! Logging facilities for fetchline.
//!
//! fetchline uses the `tracing` crate for instrumentation and never installs a
//! subscriber itself. To see logs, install one in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("fetchline=debug")
//!     .init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Request service target (dispatch, normalization).
    pub const SERVICE: &str = "fetchline::service";
    /// Request builder target (send lifecycle, callbacks).
    pub const BUILDER: &str = "fetchline::builder";
    /// Body encoding and response decoding target.
    pub const BODY: &str = "fetchline::body";
}

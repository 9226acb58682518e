//! # code-index-shared
//!
//! Foundational types used by every other crate in the workspace:
//!
//! - the [`ErrorEnvelope`] error model and the [`Result`] alias
//! - request context, cancellation and bounded worker pools
//! - retry with backoff and timeouts
//! - secret redaction
//!
//! This crate has no workspace dependencies.

pub mod concurrency;
pub mod errors;
pub mod redaction;
pub mod result;
pub mod retry;
pub mod timeout;

pub use concurrency::{
    BoundedQueue, CancellationToken, CorrelationId, RequestContext, TaskTicket, WorkerPool,
    WorkerPoolOptions,
};
pub use errors::{ErrorClass, ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata};
pub use redaction::{REDACTED, SecretString, is_secret_key, redact_if_secret};
pub use result::{Result, ResultExt};
pub use retry::{RetryPolicy, retry_async, retry_async_with_observer};
pub use timeout::timeout_with_context;

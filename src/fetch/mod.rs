//! FetchPipeline (spec §4.2): retries, backoff, error classification, abort tokens.

mod pipeline;
mod retry;

pub use pipeline::{FetchKind, FetchPipeline, Response};
pub use retry::RetryPolicy;

//! FetchPipeline: authenticated fetch with retry/backoff and abort tokens
//! (spec §4.2).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::bandwidth::BandwidthEstimator;
use crate::config::FetchConfig;
use crate::error::{FetchError, StreamError};
use crate::proxy::{Body, ProxyError, ProxyErrorKind, ProxyHeader, RequestProxy, Want};

use super::retry::{RetryAction, RetryPolicy, retry_with_backoff};

/// What shape of body the caller wants (mirrors `proxy::Want`; kept as a
/// distinct type so the fetch layer doesn't leak the transport's vocabulary).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Text,
    Bytes,
}

impl From<FetchKind> for Want {
    fn from(kind: FetchKind) -> Self {
        match kind {
            FetchKind::Text => Want::Text,
            FetchKind::Bytes => Want::Bytes,
        }
    }
}

/// Successful fetch result.
#[derive(Debug, Clone)]
pub struct Response {
    pub body: Body,
    pub final_url: String,
}

/// Retries, backoff, error classification and abort tokens over a
/// `RequestProxy`. Scoped to one `StreamSession`.
pub struct FetchPipeline {
    proxy: Arc<dyn RequestProxy>,
    config: FetchConfig,
    estimator: Arc<BandwidthEstimator>,
    root_token: Mutex<CancellationToken>,
    active_requests: AtomicUsize,
}

impl FetchPipeline {
    pub fn new(
        proxy: Arc<dyn RequestProxy>,
        config: FetchConfig,
        estimator: Arc<BandwidthEstimator>,
    ) -> Self {
        Self {
            proxy,
            config,
            estimator,
            root_token: Mutex::new(CancellationToken::new()),
            active_requests: AtomicUsize::new(0),
        }
    }

    /// Number of requests currently in flight. Exposed for tests verifying
    /// backpressure/cancellation behavior.
    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::Relaxed)
    }

    /// Cancel every in-flight and future request issued through this
    /// pipeline. Idempotent; safe to call more than once. This is the final
    /// shutdown path (spec §5) — the token is never replaced, so every
    /// subsequent `get()` keeps failing with `Cancelled`.
    pub fn abort_all(&self) {
        self.root_token.lock().cancel();
    }

    /// Cancel only what's in flight right now, then swap in a fresh token so
    /// later `get()` calls aren't affected (spec §4.7 `seek`: abort the
    /// stale fetches for the pre-seek position without wedging the session).
    pub fn abort_in_flight(&self) {
        let mut root = self.root_token.lock();
        root.cancel();
        *root = CancellationToken::new();
    }

    pub fn is_aborted(&self) -> bool {
        self.root_token.lock().is_cancelled()
    }

    #[instrument(skip(self, headers), fields(url = %url))]
    pub async fn get(
        &self,
        url: &str,
        kind: FetchKind,
        headers: &[ProxyHeader],
    ) -> Result<Response, FetchError> {
        let root = self.root_token.lock().clone();
        if root.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let request_token = root.child_token();
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        let guard = ActiveRequestGuard {
            counter: &self.active_requests,
        };

        let policy = RetryPolicy {
            max_retries: self.config.max_retries,
            base_delay: self.config.backoff_base,
            jitter: true,
        };

        let result = retry_with_backoff(&policy, &request_token, |_attempt| async {
            self.attempt(url, kind, headers, &request_token).await
        })
        .await;

        drop(guard);
        result
    }

    async fn attempt(
        &self,
        url: &str,
        kind: FetchKind,
        headers: &[ProxyHeader],
        token: &CancellationToken,
    ) -> RetryAction<Response> {
        let started = Instant::now();
        let fetch = self.proxy.fetch(url, kind.into(), headers, self.config.attempt_timeout);

        let outcome = tokio::select! {
            _ = token.cancelled() => return RetryAction::Fail(FetchError::Cancelled),
            outcome = fetch => outcome,
        };

        match outcome {
            Ok(response) => {
                // Guarantee invariant 6 (cancellation completeness): a
                // completion racing an abort must not mutate session state.
                if token.is_cancelled() {
                    return RetryAction::Fail(FetchError::Cancelled);
                }
                let byte_len = response.body.as_bytes().len();
                let elapsed_ms = started.elapsed().as_millis().max(1) as u64;
                self.estimator.report(byte_len, elapsed_ms);
                RetryAction::Success(Response {
                    body: response.body,
                    final_url: response.final_url,
                })
            }
            Err(err) => classify(err),
        }
    }
}

struct ActiveRequestGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for ActiveRequestGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Classify a `ProxyError` per spec §4.2's status/condition table.
fn classify(err: ProxyError) -> RetryAction<Response> {
    match err.kind {
        ProxyErrorKind::Http => match err.status {
            Some(401) | Some(403) => {
                RetryAction::Fail(FetchError::Fatal(StreamError::AuthExpired))
            }
            Some(410) => RetryAction::Fail(FetchError::Fatal(StreamError::StreamEnded)),
            Some(404) => RetryAction::Fail(FetchError::Skip {
                reason: "404 not found".to_string(),
            }),
            Some(status) if (500..600).contains(&status) => {
                RetryAction::Retry(FetchError::Transient {
                    reason: format!("server error {status}"),
                })
            }
            Some(status) => RetryAction::Fail(FetchError::Skip {
                reason: format!("unhandled HTTP status {status}"),
            }),
            None => RetryAction::Retry(FetchError::Transient {
                reason: err.message,
            }),
        },
        ProxyErrorKind::Network | ProxyErrorKind::Timeout => {
            RetryAction::Retry(FetchError::Transient {
                reason: err.message,
            })
        }
    }
}

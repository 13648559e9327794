//! Shared fakes for the scenario tests (spec §8 S1–S6): a `RequestProxy`
//! scripted by URL, with per-URL response queues so a live-refresh sequence
//! can return different bodies across calls, and a `Sink` that records
//! appends and can be told to reject the next N with `QuotaExceeded`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Mutex as AsyncMutex;

use streamcore::proxy::{Body, ProxyError, ProxyHeader, ProxyResponse, RequestProxy, Want};
use streamcore::sink::{BufferedRange, MediaKind, QuotaExceeded, Sink};

pub struct ScriptedProxy {
    queues: Mutex<HashMap<String, VecDeque<Result<ProxyResponse, ProxyError>>>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedProxy {
    pub fn new() -> Self {
        Self { queues: Mutex::new(HashMap::new()), calls: Mutex::new(Vec::new()) }
    }

    pub fn push(&self, url: &str, response: Result<ProxyResponse, ProxyError>) {
        self.queues.lock().entry(url.to_string()).or_default().push_back(response);
    }
}

#[async_trait]
impl RequestProxy for ScriptedProxy {
    async fn fetch(
        &self,
        url: &str,
        _want: Want,
        _headers: &[ProxyHeader],
        _timeout: Duration,
    ) -> Result<ProxyResponse, ProxyError> {
        self.calls.lock().push(url.to_string());
        let mut queues = self.queues.lock();
        let queue = queues.entry(url.to_string()).or_default();
        queue
            .pop_front()
            .unwrap_or_else(|| Err(ProxyError::http(404, format!("no more scripted responses for {url}"))))
    }
}

pub fn ok_text(body: impl Into<String>, final_url: &str) -> Result<ProxyResponse, ProxyError> {
    Ok(ProxyResponse { status: 200, body: Body::Text(body.into()), final_url: final_url.to_string() })
}

pub fn ok_bytes(final_url: &str) -> Result<ProxyResponse, ProxyError> {
    Ok(ProxyResponse { status: 200, body: Body::Bytes(Bytes::from_static(b"tsdata")), final_url: final_url.to_string() })
}

/// Like `ok_bytes`, but with a body large enough that `BandwidthEstimator`'s
/// `bytes/elapsed` sample reads as a genuinely high bitrate even over the
/// near-instant round-trips a scripted proxy makes (tests that need the ABR
/// to see ample bandwidth, e.g. a step-up scenario).
pub fn ok_bytes_sized(len: usize, final_url: &str) -> Result<ProxyResponse, ProxyError> {
    Ok(ProxyResponse { status: 200, body: Body::Bytes(Bytes::from(vec![0u8; len])), final_url: final_url.to_string() })
}

pub fn media_playlist(first_sequence: u64, count: u64, base_url: &str, live: bool) -> String {
    let mut text = format!("#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:{first_sequence}\n");
    for i in first_sequence..(first_sequence + count) {
        text.push_str(&format!("#EXTINF:6.0,\n{base_url}/seg{i}.ts\n"));
    }
    if !live {
        text.push_str("#EXT-X-ENDLIST\n");
    }
    text
}

pub fn master_playlist(variants: &[(u64, &str)]) -> String {
    let mut text = String::from("#EXTM3U\n");
    for (bitrate, url) in variants {
        text.push_str(&format!("#EXT-X-STREAM-INF:BANDWIDTH={bitrate}\n{url}\n"));
    }
    text
}

pub struct RecordingSink {
    current_time: Mutex<f64>,
    ranges: Mutex<Vec<BufferedRange>>,
    pub appended: AsyncMutex<Vec<Bytes>>,
    reject_next_n: AtomicUsize,
    pub removed: Mutex<Vec<(f64, f64)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            current_time: Mutex::new(0.0),
            ranges: Mutex::new(Vec::new()),
            appended: AsyncMutex::new(Vec::new()),
            reject_next_n: AtomicUsize::new(0),
            removed: Mutex::new(Vec::new()),
        }
    }

    pub fn reject_next(&self, n: usize) {
        self.reject_next_n.store(n, Ordering::SeqCst);
    }

    pub fn set_current_time(&self, t: f64) {
        *self.current_time.lock() = t;
    }

    /// Seed an already-buffered range, simulating prior normal playback
    /// before quota pressure hits (S6 needs something evictable).
    pub fn seed_range(&self, start_s: f64, end_s: f64) {
        self.ranges.lock().push(BufferedRange { start_s, end_s });
    }
}

#[async_trait]
impl Sink for RecordingSink {
    async fn append(&self, _kind: MediaKind, bytes: Bytes) -> Result<(), QuotaExceeded> {
        if self.reject_next_n.load(Ordering::SeqCst) > 0 {
            self.reject_next_n.fetch_sub(1, Ordering::SeqCst);
            return Err(QuotaExceeded);
        }
        self.appended.lock().await.push(bytes);
        let mut ranges = self.ranges.lock();
        let start = ranges.last().map(|r: &BufferedRange| r.end_s).unwrap_or(0.0);
        ranges.push(BufferedRange { start_s: start, end_s: start + 6.0 });
        Ok(())
    }

    fn buffered(&self, _kind: MediaKind) -> Vec<BufferedRange> {
        self.ranges.lock().clone()
    }

    fn current_time_s(&self) -> f64 {
        *self.current_time.lock()
    }

    async fn remove(&self, _kind: MediaKind, start_s: f64, end_s: f64) {
        self.removed.lock().push((start_s, end_s));
        let mut ranges = self.ranges.lock();
        if let Some(first) = ranges.first_mut() {
            if (first.start_s - start_s).abs() < 1e-6 {
                first.start_s = end_s;
            }
        }
        ranges.retain(|r| r.end_s > r.start_s + 1e-9);
    }

    async fn end_of_stream(&self) {}
}

/// Drain `events` until `pred` matches one, or `attempts` iterations pass.
pub async fn wait_for<F>(events: &mut tokio::sync::mpsc::UnboundedReceiver<streamcore::StreamEvent>, attempts: usize, mut pred: F) -> bool
where
    F: FnMut(&streamcore::StreamEvent) -> bool,
{
    for _ in 0..attempts {
        match tokio::time::timeout(Duration::from_millis(500), events.recv()).await {
            Ok(Some(event)) if pred(&event) => return true,
            Ok(Some(_)) => continue,
            _ => return false,
        }
    }
    false
}

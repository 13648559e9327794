//! StreamSession (spec §4.7): the per-stream state machine. One `run()` task
//! drives Resolving -> Downloading/LiveRefreshing -> Ended/Failed; a second
//! task refreshes the live media playlist. Grounded on the teacher's
//! `HlsStreamCoordinator`: an actor owning its mutable state, reachable only
//! through a command channel, with a `CancellationToken` torn down on close.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::abr::AbrController;
use crate::append_queue::AppendQueue;
use crate::bandwidth::BandwidthEstimator;
use crate::config::StreamConfig;
use crate::error::{FetchError, StreamError};
use crate::events::StreamEvent;
use crate::fetch::{FetchKind, FetchPipeline};
use crate::playlist::{ContainerKind, PlaylistKind, SegmentRef, Variant, parse_playlist};
use crate::proxy::{Body, RequestProxy};
use crate::sink::{MediaKind, Sink, Transmuxer};
use crate::store::{SegmentKey, SegmentStore};

/// Reported lifecycle state (spec §4.7), pushed as `StreamEvent::StateChanged`.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Resolving,
    Downloading,
    LiveRefreshing,
    Paused,
    Ended,
    Failed(String),
}

enum Command {
    Pause,
    Resume,
    Seek(f64),
    SetQuality(Option<usize>),
    Close,
}

/// Owner-facing handle to a running session. Cheap to clone (an `Arc` around
/// a channel sender and a state snapshot).
pub struct StreamSession {
    pub id: String,
    pub owner_id: String,
    cmd_tx: mpsc::UnboundedSender<Command>,
    state: Arc<RwLock<SessionState>>,
    root_token: CancellationToken,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl StreamSession {
    /// Start resolving `manifest_url` and return the handle plus its event
    /// stream. The caller chooses `container_kind` up front (SPEC_FULL.md §3
    /// supplement; Open Question 1: no filename-extension sniffing).
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: String,
        owner_id: String,
        manifest_url: String,
        container_kind: ContainerKind,
        config: StreamConfig,
        proxy: Arc<dyn RequestProxy>,
        sink: Arc<dyn Sink>,
        transmuxer: Option<Arc<dyn Transmuxer>>,
        store: Arc<SegmentStore>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<StreamEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = Arc::new(RwLock::new(SessionState::Resolving));
        let root_token = CancellationToken::new();

        let estimator = Arc::new(BandwidthEstimator::new(config.estimator.clone()));
        let fetch = Arc::new(FetchPipeline::new(Arc::clone(&proxy), config.fetch.clone(), Arc::clone(&estimator)));
        let append_queue = Arc::new(AppendQueue::new(Arc::clone(&sink), config.append_queue.clone()));

        let resources = Resources {
            fetch,
            store,
            estimator,
            append_queue,
            sink,
            transmuxer,
            config,
            events_tx,
            state: Arc::clone(&state),
            session_id: id.clone(),
            root_token: root_token.clone(),
        };

        let task = tokio::spawn(run(resources, cmd_rx, manifest_url, container_kind));

        let session = Arc::new(Self {
            id,
            owner_id,
            cmd_tx,
            state,
            root_token,
            task: parking_lot::Mutex::new(Some(task)),
        });
        (session, events_rx)
    }

    pub fn state(&self) -> SessionState {
        self.state.read().clone()
    }

    pub fn pause(&self) {
        let _ = self.cmd_tx.send(Command::Pause);
    }

    pub fn resume(&self) {
        let _ = self.cmd_tx.send(Command::Resume);
    }

    pub fn seek(&self, t_seconds: f64) {
        let _ = self.cmd_tx.send(Command::Seek(t_seconds));
    }

    pub fn set_quality(&self, variant_ix: Option<usize>) {
        let _ = self.cmd_tx.send(Command::SetQuality(variant_ix));
    }

    /// Abort everything in flight and end the run loop (spec §4.8 teardown).
    pub fn close(&self) {
        self.root_token.cancel();
        let _ = self.cmd_tx.send(Command::Close);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

/// Shared, never-mutated-in-place resources the actor loop reads from.
struct Resources {
    fetch: Arc<FetchPipeline>,
    store: Arc<SegmentStore>,
    estimator: Arc<BandwidthEstimator>,
    append_queue: Arc<AppendQueue>,
    sink: Arc<dyn Sink>,
    transmuxer: Option<Arc<dyn Transmuxer>>,
    config: StreamConfig,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
    state: Arc<RwLock<SessionState>>,
    session_id: String,
    root_token: CancellationToken,
}

/// Mutable state owned exclusively by the `run()` task.
struct DownloadState {
    segments: Vec<SegmentRef>,
    cursor: usize,
    seen_ids: HashSet<String>,
    stream_id: String,
    variants_ascending: Vec<Variant>,
    current_variant_ix: usize,
    abr: Option<AbrController>,
    is_live: bool,
    paused: bool,
    closed: bool,
    total_duration_s: Option<f64>,
    bytes_downloaded: u64,
    segment_count: u64,
    append_seq: u64,
    live_refresh_token: CancellationToken,
    playback_start_signaled: bool,
}

enum StepOutcome {
    Continue,
    Sleep(Duration),
    Ended,
    Failed(StreamError),
    RestartLiveRefresh { media_url: String, is_live: bool },
}

fn body_to_text(body: Body) -> String {
    match body {
        Body::Text(s) => s,
        Body::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
    }
}

fn set_state(resources: &Resources, s: SessionState) {
    *resources.state.write() = s.clone();
    let _ = resources.events_tx.send(StreamEvent::StateChanged(s));
}

fn fail(resources: &Resources, err: StreamError) {
    let _ = resources.events_tx.send(StreamEvent::error(&err));
    set_state(resources, SessionState::Failed(err.to_string()));
}

/// Schedule `StreamEvent::PlaybackStarted` after the configured grace period
/// (spec §4.7 step 3). Detached rather than awaited in line: `step()` runs as
/// one branch of the outer `select!` in `run()` and can be cancelled mid-poll
/// by another branch completing first, which would silently drop the event
/// while `playback_start_signaled` stayed `true` and never let us retry.
fn signal_playback_start(resources: &Resources) {
    let events_tx = resources.events_tx.clone();
    let grace = resources.config.session.playback_start_grace;
    let token = resources.root_token.child_token();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(grace) => {
                let _ = events_tx.send(StreamEvent::PlaybackStarted);
            }
        }
    });
}

fn buffered_ahead(sink: &dyn Sink, current: f64) -> Duration {
    let secs = sink
        .buffered(MediaKind::Video)
        .last()
        .map(|r| (r.end_s - current).max(0.0))
        .unwrap_or(0.0);
    Duration::from_secs_f64(secs)
}

#[instrument(skip(resources, cmd_rx))]
async fn run(
    resources: Resources,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    manifest_url: String,
    container_kind: ContainerKind,
) {
    set_state(&resources, SessionState::Resolving);

    let (mut state, mut live_rx) = match resolve(&resources, &manifest_url, container_kind).await {
        Ok(v) => v,
        Err(e) => {
            fail(&resources, e);
            return;
        }
    };

    if !state.variants_ascending.is_empty() {
        let mut descending = state.variants_ascending.clone();
        descending.reverse();
        let _ = resources.events_tx.send(StreamEvent::Qualities(descending));
    }
    set_state(
        &resources,
        if state.is_live { SessionState::LiveRefreshing } else { SessionState::Downloading },
    );

    loop {
        if state.closed {
            break;
        }
        if state.paused {
            match cmd_rx.recv().await {
                Some(cmd) => {
                    if !handle_command(cmd, &mut state, &resources) {
                        break;
                    }
                }
                None => break,
            }
            continue;
        }

        tokio::select! {
            biased;
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(c) => {
                        if !handle_command(c, &mut state, &resources) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            msg = async { live_rx.as_mut().unwrap().recv().await }, if live_rx.is_some() => {
                match msg {
                    Some(new_segments) => merge_live_segments(&mut state, new_segments),
                    None => { live_rx = None; state.is_live = false; }
                }
            }
            outcome = step(&resources, &mut state) => {
                match outcome {
                    StepOutcome::Continue => {}
                    StepOutcome::Sleep(d) => tokio::time::sleep(d).await,
                    StepOutcome::Ended => {
                        resources.sink.end_of_stream().await;
                        set_state(&resources, SessionState::Ended);
                        break;
                    }
                    StepOutcome::Failed(err) => {
                        fail(&resources, err);
                        break;
                    }
                    StepOutcome::RestartLiveRefresh { media_url, is_live } => {
                        state.live_refresh_token.cancel();
                        if is_live {
                            let token = resources.root_token.child_token();
                            state.live_refresh_token = token.clone();
                            live_rx = Some(spawn_live_refresh(&resources, media_url, token));
                        } else {
                            live_rx = None;
                        }
                    }
                }
            }
        }
    }

    state.live_refresh_token.cancel();
    resources.fetch.abort_all();
}

fn handle_command(cmd: Command, state: &mut DownloadState, resources: &Resources) -> bool {
    match cmd {
        Command::Pause => {
            state.paused = true;
            set_state(resources, SessionState::Paused);
            true
        }
        Command::Resume => {
            state.paused = false;
            set_state(
                resources,
                if state.is_live { SessionState::LiveRefreshing } else { SessionState::Downloading },
            );
            true
        }
        Command::Seek(target_s) => {
            seek_to(resources, state, target_s);
            true
        }
        Command::SetQuality(ix) => {
            if let Some(abr) = state.abr.as_mut() {
                abr.set_locked(ix);
            }
            true
        }
        Command::Close => {
            state.closed = true;
            false
        }
    }
}

/// Jump the playback cursor to a new target time (spec §4.7 `seek`): abort
/// whatever the fetch pipeline has in flight for the pre-seek position,
/// drop anything queued in the `AppendQueue` that hasn't reached the sink
/// yet, then recompute the cursor by cumulative `duration_s`. Clears
/// `seen_ids` so previously-delivered segments can be re-appended after
/// seeking backward; a simplification over tracking per-range liveness,
/// acceptable since `AppendQueue`/`Sink` own the real buffer state.
fn seek_to(resources: &Resources, state: &mut DownloadState, target_s: f64) {
    resources.fetch.abort_in_flight();
    resources.append_queue.clear_pending();

    let mut acc = 0.0;
    let mut idx = state.segments.len();
    for (i, seg) in state.segments.iter().enumerate() {
        if acc + seg.duration_s > target_s {
            idx = i;
            break;
        }
        acc += seg.duration_s;
    }
    state.cursor = idx.min(state.segments.len());
    state.seen_ids.clear();
}

fn merge_live_segments(state: &mut DownloadState, new_segments: Vec<SegmentRef>) {
    for seg in new_segments {
        if state.segments.iter().any(|s| s.id == seg.id) {
            continue;
        }
        state.segments.push(seg);
    }
}

async fn resolve(
    resources: &Resources,
    manifest_url: &str,
    container_kind: ContainerKind,
) -> Result<(DownloadState, Option<mpsc::UnboundedReceiver<Vec<SegmentRef>>>), StreamError> {
    if container_kind == ContainerKind::Progressive {
        let snapshot = crate::playlist::PlaylistSnapshot::progressive(manifest_url.to_string(), manifest_url.to_string());
        let segments = snapshot.segments.unwrap_or_default();
        let state = DownloadState {
            segments,
            cursor: 0,
            seen_ids: HashSet::new(),
            stream_id: manifest_url.to_string(),
            variants_ascending: Vec::new(),
            current_variant_ix: 0,
            abr: None,
            is_live: false,
            paused: false,
            closed: false,
            total_duration_s: Some(0.0),
            bytes_downloaded: 0,
            segment_count: 0,
            append_seq: 0,
            live_refresh_token: resources.root_token.child_token(),
            playback_start_signaled: false,
        };
        return Ok((state, None));
    }

    let manifest_response = resources
        .fetch
        .get(manifest_url, FetchKind::Text, &[])
        .await
        .map_err(fetch_err_to_stream_err)?;
    let manifest_base = manifest_response.final_url.clone();
    let manifest_text = body_to_text(manifest_response.body);
    let (manifest_snapshot, _warnings) =
        parse_playlist(&manifest_text, &manifest_base).map_err(|e| StreamError::manifest_malformed(e.reason))?;

    let (media_url, variants_ascending, initial_variant_ix, abr) = match manifest_snapshot.kind {
        PlaylistKind::Media => (manifest_url.to_string(), Vec::new(), 0, None),
        PlaylistKind::Master => {
            let descending = manifest_snapshot.variants.unwrap_or_default();
            let mut ascending = descending;
            ascending.reverse();
            if ascending.is_empty() {
                return Err(StreamError::manifest_malformed("master playlist has no variants"));
            }
            let mut controller =
                AbrController::new(&ascending, resources.config.abr.clone(), Arc::clone(&resources.estimator));
            let initial_ix = controller.decide(Duration::ZERO, Instant::now());
            let media_url = ascending[initial_ix].url.clone();
            (media_url, ascending, initial_ix, Some(controller))
        }
    };

    let media_response = resources
        .fetch
        .get(&media_url, FetchKind::Text, &[])
        .await
        .map_err(fetch_err_to_stream_err)?;
    let media_base = media_response.final_url;
    let media_text = body_to_text(media_response.body);
    let (media_snapshot, _warnings) =
        parse_playlist(&media_text, &media_base).map_err(|e| StreamError::manifest_malformed(e.reason))?;
    let segments = media_snapshot
        .segments
        .ok_or_else(|| StreamError::manifest_malformed("media playlist has no segments"))?;

    let total_duration_s = if media_snapshot.is_live {
        None
    } else {
        Some(segments.iter().map(|s| s.duration_s).sum())
    };

    let live_refresh_token = resources.root_token.child_token();
    let live_rx = if media_snapshot.is_live {
        Some(spawn_live_refresh(resources, media_url.clone(), live_refresh_token.clone()))
    } else {
        None
    };

    let state = DownloadState {
        segments,
        cursor: 0,
        seen_ids: HashSet::new(),
        stream_id: media_url,
        variants_ascending,
        current_variant_ix: initial_variant_ix,
        abr,
        is_live: media_snapshot.is_live,
        paused: false,
        closed: false,
        total_duration_s,
        bytes_downloaded: 0,
        segment_count: 0,
        append_seq: 0,
        live_refresh_token,
        playback_start_signaled: false,
    };

    Ok((state, live_rx))
}

fn fetch_err_to_stream_err(err: FetchError) -> StreamError {
    match err {
        FetchError::Fatal(e) => e,
        FetchError::Skip { reason } => StreamError::manifest_malformed(reason),
        FetchError::Transient { reason } => StreamError::transient(reason),
        FetchError::Cancelled => StreamError::Cancelled,
    }
}

fn spawn_live_refresh(
    resources: &Resources,
    media_url: String,
    token: CancellationToken,
) -> mpsc::UnboundedReceiver<Vec<SegmentRef>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let fetch = Arc::clone(&resources.fetch);
    let interval = resources.config.session.live_refresh_interval;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            match fetch.get(&media_url, FetchKind::Text, &[]).await {
                Ok(response) => {
                    let text = body_to_text(response.body);
                    match parse_playlist(&text, &response.final_url) {
                        Ok((snapshot, _warnings)) => {
                            let still_live = snapshot.is_live;
                            if let Some(segments) = snapshot.segments {
                                if tx.send(segments).is_err() {
                                    break;
                                }
                            }
                            if !still_live {
                                break;
                            }
                        }
                        Err(err) => warn!(%err, "live refresh: parse failed, will retry"),
                    }
                }
                Err(err) => warn!(%err, "live refresh: fetch failed, will retry"),
            }
        }
    });

    rx
}

async fn step(resources: &Resources, state: &mut DownloadState) -> StepOutcome {
    // Nothing left to fetch takes priority over backpressure and ABR: a VOD
    // tail that exactly fills the buffer-ahead window must still reach
    // `Ended` rather than sit gated forever with nothing left to gate.
    if state.cursor >= state.segments.len() {
        return if state.is_live {
            StepOutcome::Sleep(resources.config.session.backpressure_poll_interval)
        } else {
            StepOutcome::Ended
        };
    }

    if !resources.append_queue.needs_more_data(MediaKind::Video) {
        return StepOutcome::Sleep(resources.config.session.backpressure_poll_interval);
    }

    if let Some(abr) = state.abr.as_mut() {
        let buffered = buffered_ahead(&*resources.sink, resources.sink.current_time_s());
        let target_ix = abr.decide(buffered, Instant::now());
        if target_ix != state.current_variant_ix {
            match switch_variant(resources, state, target_ix).await {
                Ok((media_url, is_live)) => {
                    return StepOutcome::RestartLiveRefresh { media_url, is_live };
                }
                Err(e) if e.is_fatal() => return StepOutcome::Failed(e),
                Err(e) => warn!(%e, "variant switch failed, staying on current variant"),
            }
        }
    }

    let seg = state.segments[state.cursor].clone();
    if state.seen_ids.contains(&seg.id) {
        state.cursor += 1;
        return StepOutcome::Continue;
    }

    match resources.fetch.get(&seg.url, FetchKind::Bytes, &[]).await {
        Ok(response) => {
            let bytes = response.body.into_bytes();
            let key = SegmentKey::new(resources.session_id.clone(), state.stream_id.clone(), seg.sequence);
            resources.store.insert(key, bytes.clone());
            state.seen_ids.insert(seg.id.clone());
            state.cursor += 1;
            state.bytes_downloaded += bytes.len() as u64;
            state.segment_count += 1;

            if !state.playback_start_signaled && state.cursor >= 1 {
                state.playback_start_signaled = true;
                signal_playback_start(resources);
            }

            deliver_to_sink(resources, state, bytes).await;

            let _ = resources.events_tx.send(StreamEvent::Stats {
                bytes_downloaded: state.bytes_downloaded,
                segment_count: state.segment_count,
                bps_ema: resources.estimator.ema(),
            });
            let current = resources.sink.current_time_s();
            let _ = resources.events_tx.send(StreamEvent::Progress {
                current_s: current,
                duration_s: state.total_duration_s,
                buffered_ahead_s: buffered_ahead(&*resources.sink, current).as_secs_f64(),
            });
            StepOutcome::Continue
        }
        Err(FetchError::Fatal(e)) => StepOutcome::Failed(e),
        Err(FetchError::Skip { reason }) => {
            warn!(url = %seg.url, reason, "skipping segment");
            state.cursor += 1;
            StepOutcome::Continue
        }
        Err(FetchError::Transient { reason }) => {
            warn!(url = %seg.url, reason, "segment fetch exhausted retries, will retry after delay");
            StepOutcome::Sleep(resources.config.session.retry_segment_delay)
        }
        Err(FetchError::Cancelled) => StepOutcome::Ended,
    }
}

async fn deliver_to_sink(resources: &Resources, state: &mut DownloadState, bytes: Bytes) {
    if let Some(transmuxer) = &resources.transmuxer {
        transmuxer.push(bytes).await;
        transmuxer.flush().await;
        for chunk in transmuxer.drain().await {
            if let Some(init) = chunk.init {
                resources.append_queue.set_init(chunk.kind, init);
            }
            if let Some(data) = chunk.data {
                state.append_seq += 1;
                resources.append_queue.enqueue(chunk.kind, state.append_seq, data).await;
            }
        }
    } else {
        state.append_seq += 1;
        resources.append_queue.enqueue(MediaKind::Video, state.append_seq, bytes).await;
    }
}

/// Realign to a new variant's media playlist. Resolves Open Question 3: if
/// the new variant has no segment at/after the current sequence, start at 0
/// (clamped) rather than failing the session — see SPEC_FULL.md §9.
async fn switch_variant(
    resources: &Resources,
    state: &mut DownloadState,
    target_ix: usize,
) -> Result<(String, bool), StreamError> {
    let variant = state.variants_ascending[target_ix].clone();
    let response = resources
        .fetch
        .get(&variant.url, FetchKind::Text, &[])
        .await
        .map_err(fetch_err_to_stream_err)?;
    let text = body_to_text(response.body);
    let (snapshot, _warnings) =
        parse_playlist(&text, &response.final_url).map_err(|e| StreamError::manifest_malformed(e.reason))?;
    let segments = snapshot
        .segments
        .ok_or_else(|| StreamError::manifest_malformed("variant playlist has no segments"))?;

    let target_sequence = state
        .segments
        .get(state.cursor.saturating_sub(1))
        .map(|s| s.sequence)
        .unwrap_or(0);
    let realigned_cursor = segments.iter().position(|s| s.sequence >= target_sequence).unwrap_or(0);

    state.segments = segments;
    state.cursor = realigned_cursor;
    state.is_live = snapshot.is_live;
    state.current_variant_ix = target_ix;
    state.stream_id = variant.url.clone();
    state.seen_ids.clear();

    Ok((variant.url, snapshot.is_live))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::proxy::{ProxyError, ProxyHeader, ProxyResponse, Want};
    use crate::sink::{BufferedRange, QuotaExceeded};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex as AsyncMutex;

    struct ScriptedUrlProxy {
        responses: StdMutex<std::collections::HashMap<String, Result<ProxyResponse, ProxyError>>>,
    }

    #[async_trait]
    impl RequestProxy for ScriptedUrlProxy {
        async fn fetch(
            &self,
            url: &str,
            _want: Want,
            _headers: &[ProxyHeader],
            _timeout: Duration,
        ) -> Result<ProxyResponse, ProxyError> {
            self.responses
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(ProxyError::http(404, "not scripted")))
        }
    }

    struct RecordingSink {
        current_time: parking_lot::Mutex<f64>,
        ranges: parking_lot::Mutex<Vec<BufferedRange>>,
        appended: AsyncMutex<Vec<Bytes>>,
        ended: std::sync::atomic::AtomicBool,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                current_time: parking_lot::Mutex::new(0.0),
                ranges: parking_lot::Mutex::new(Vec::new()),
                appended: AsyncMutex::new(Vec::new()),
                ended: std::sync::atomic::AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        async fn append(&self, _kind: MediaKind, bytes: Bytes) -> Result<(), QuotaExceeded> {
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
        async fn remove(&self, _kind: MediaKind, _start_s: f64, _end_s: f64) {}
        async fn end_of_stream(&self) {
            self.ended.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn media_playlist(segment_count: u32) -> String {
        let mut text = String::from("#EXTM3U\n#EXT-X-MEDIA-SEQUENCE:0\n");
        for i in 0..segment_count {
            text.push_str(&format!("#EXTINF:6.0,\nhttps://x/seg{i}.ts\n"));
        }
        text.push_str("#EXT-X-ENDLIST\n");
        text
    }

    fn ok_text(body: String) -> Result<ProxyResponse, ProxyError> {
        Ok(ProxyResponse {
            status: 200,
            body: Body::Text(body),
            final_url: "https://x/media.m3u8".to_string(),
        })
    }

    fn ok_bytes() -> Result<ProxyResponse, ProxyError> {
        Ok(ProxyResponse {
            status: 200,
            body: Body::Bytes(Bytes::from_static(b"tsdata")),
            final_url: "https://x/seg.ts".to_string(),
        })
    }

    #[tokio::test]
    async fn vod_session_runs_to_end() {
        let mut responses = std::collections::HashMap::new();
        responses.insert("https://x/media.m3u8".to_string(), ok_text(media_playlist(2)));
        responses.insert("https://x/seg0.ts".to_string(), ok_bytes());
        responses.insert("https://x/seg1.ts".to_string(), ok_bytes());
        let proxy = Arc::new(ScriptedUrlProxy { responses: StdMutex::new(responses) });
        let sink = Arc::new(RecordingSink::new());
        let store = Arc::new(SegmentStore::new(Default::default()));

        let (session, mut events) = StreamSession::open(
            "sess-1".to_string(),
            "owner-1".to_string(),
            "https://x/media.m3u8".to_string(),
            ContainerKind::Hls,
            StreamConfig::default(),
            proxy,
            sink.clone() as Arc<dyn Sink>,
            None,
            store,
        );

        let mut ended = false;
        for _ in 0..50 {
            match tokio::time::timeout(Duration::from_millis(500), events.recv()).await {
                Ok(Some(StreamEvent::StateChanged(SessionState::Ended))) => {
                    ended = true;
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(ended, "session should reach Ended for a fully-scripted VOD playlist");
        assert_eq!(sink.appended.lock().await.len(), 2);
        session.close();
    }

    #[tokio::test]
    async fn auth_failure_transitions_to_failed() {
        let mut responses = std::collections::HashMap::new();
        responses.insert("https://x/media.m3u8".to_string(), Err(ProxyError::http(403, "forbidden")));
        let proxy = Arc::new(ScriptedUrlProxy { responses: StdMutex::new(responses) });
        let sink = Arc::new(RecordingSink::new());
        let store = Arc::new(SegmentStore::new(Default::default()));

        let (session, mut events) = StreamSession::open(
            "sess-2".to_string(),
            "owner-1".to_string(),
            "https://x/media.m3u8".to_string(),
            ContainerKind::Hls,
            StreamConfig::default(),
            proxy,
            sink as Arc<dyn Sink>,
            None,
            store,
        );

        let mut failed = false;
        for _ in 0..10 {
            match tokio::time::timeout(Duration::from_millis(500), events.recv()).await {
                Ok(Some(StreamEvent::StateChanged(SessionState::Failed(_)))) => {
                    failed = true;
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(failed);
        session.close();
    }

    #[tokio::test]
    async fn pause_suspends_state_until_resume() {
        let mut responses = std::collections::HashMap::new();
        responses.insert("https://x/media.m3u8".to_string(), ok_text(media_playlist(1)));
        responses.insert("https://x/seg0.ts".to_string(), ok_bytes());
        let proxy = Arc::new(ScriptedUrlProxy { responses: StdMutex::new(responses) });
        let sink = Arc::new(RecordingSink::new());
        let store = Arc::new(SegmentStore::new(Default::default()));

        let (session, mut events) = StreamSession::open(
            "sess-3".to_string(),
            "owner-1".to_string(),
            "https://x/media.m3u8".to_string(),
            ContainerKind::Hls,
            StreamConfig::default(),
            proxy,
            sink as Arc<dyn Sink>,
            None,
            store,
        );

        session.pause();
        let mut paused = false;
        for _ in 0..20 {
            match tokio::time::timeout(Duration::from_millis(500), events.recv()).await {
                Ok(Some(StreamEvent::StateChanged(SessionState::Paused))) => {
                    paused = true;
                    break;
                }
                Ok(Some(_)) => continue,
                _ => break,
            }
        }
        assert!(paused);
        session.close();
    }
}

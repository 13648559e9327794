//! S4 (spec §8): one segment 404s. Expect it's skipped (not surfaced as an
//! error or a fatal failure) and the next segment is fetched normally.

mod common;

use std::sync::Arc;

use common::{RecordingSink, ScriptedProxy, media_playlist, ok_bytes, ok_text, wait_for};
use streamcore::proxy::ProxyError;
use streamcore::{ContainerKind, SessionState, StreamConfig, StreamEvent, StreamSession};

#[tokio::test]
async fn missing_segment_is_skipped_and_download_continues() {
    let proxy = Arc::new(ScriptedProxy::new());
    proxy.push(
        "https://cdn/live.m3u8",
        ok_text(media_playlist(50, 3, "https://cdn/live", false), "https://cdn/live.m3u8"),
    );
    proxy.push("https://cdn/live/seg50.ts", Err(ProxyError::http(404, "missing")));
    proxy.push("https://cdn/live/seg51.ts", ok_bytes("https://cdn/live/seg51.ts"));
    proxy.push("https://cdn/live/seg52.ts", ok_bytes("https://cdn/live/seg52.ts"));

    let sink = Arc::new(RecordingSink::new());
    let (session, mut events) = StreamSession::open(
        "s4".to_string(),
        "owner".to_string(),
        "https://cdn/live.m3u8".to_string(),
        ContainerKind::Hls,
        StreamConfig::default(),
        proxy.clone(),
        sink.clone(),
        None,
        Arc::new(streamcore::store::SegmentStore::new(Default::default())),
    );

    let ended = wait_for(&mut events, 50, |e| matches!(e, StreamEvent::StateChanged(SessionState::Ended))).await;
    assert!(ended);
    // Only seg51 and seg52 made it into the sink; seg50 was skipped.
    assert_eq!(sink.appended.lock().await.len(), 2);

    session.close();
    let _ = events.recv().await;
}

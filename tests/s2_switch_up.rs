//! S2 (spec §8): buffer builds past the rich-buffer threshold under ample
//! bandwidth. Expect a step-up to the higher-bitrate variant, with segment
//! fetches continuing in non-decreasing sequence order afterward.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{RecordingSink, ScriptedProxy, master_playlist, media_playlist, ok_bytes_sized, ok_text, wait_for};
use streamcore::{ContainerKind, StreamConfig, StreamSession};

#[tokio::test]
async fn ample_bandwidth_and_buffer_steps_up_to_higher_variant() {
    let proxy = Arc::new(ScriptedProxy::new());
    proxy.push(
        "https://cdn/master.m3u8",
        ok_text(master_playlist(&[(2_000_000, "https://cdn/lo.m3u8"), (5_000_000, "https://cdn/hi.m3u8")]), "https://cdn/master.m3u8"),
    );
    // Enough segments on each rendition for buffer to climb past rich_buffer (60s @ 6s/segment).
    proxy.push("https://cdn/lo.m3u8", ok_text(media_playlist(0, 20, "https://cdn/lo", false), "https://cdn/lo.m3u8"));
    proxy.push("https://cdn/hi.m3u8", ok_text(media_playlist(0, 20, "https://cdn/hi", false), "https://cdn/hi.m3u8"));
    // Large bodies so the bandwidth estimator's bytes/elapsed sample reads as
    // comfortably more than either variant's bitrate (spec §8 S2's "ema = 6
    // Mbps" precondition), even over this scripted proxy's near-instant
    // round-trips.
    for i in 0..20u64 {
        proxy.push(&format!("https://cdn/lo/seg{i}.ts"), ok_bytes_sized(500_000, &format!("https://cdn/lo/seg{i}.ts")));
        proxy.push(&format!("https://cdn/hi/seg{i}.ts"), ok_bytes_sized(500_000, &format!("https://cdn/hi/seg{i}.ts")));
    }

    let sink = Arc::new(RecordingSink::new());
    // The producer's own backpressure gate (BUFFER_AHEAD_LIMIT = 30s, spec
    // §4.6) caps buffered-ahead well below rich_buffer (60s) during steady
    // download — spec §8's S2 setup ("buffer reaches 65s") is a precondition
    // on the player's real buffer, not something this harness's instant fake
    // fetches would otherwise reach. Raise the gate so downloads keep
    // landing past 66s and the ABR step-up actually gets exercised here.
    let mut config = StreamConfig::default();
    config.append_queue.buffer_ahead_limit = Duration::from_secs(120);
    let (session, mut events) = StreamSession::open(
        "s2".to_string(),
        "owner".to_string(),
        "https://cdn/master.m3u8".to_string(),
        ContainerKind::Hls,
        config,
        proxy.clone(),
        sink.clone(),
        None,
        Arc::new(streamcore::store::SegmentStore::new(Default::default())),
    );

    // Drain events until the append count shows at least 11 segments landed
    // (11 * 6s = 66s > rich_buffer's 60s), or give up.
    for _ in 0..200 {
        if sink.appended.lock().await.len() >= 11 {
            break;
        }
        if !wait_for(&mut events, 1, |_| true).await {
            break;
        }
    }
    let _ = tokio::time::sleep(Duration::from_millis(50)).await;

    let calls = proxy.calls.lock().clone();
    assert!(
        calls.iter().any(|u| u == "https://cdn/hi/seg0.ts" || u.starts_with("https://cdn/hi/seg")),
        "expected at least one fetch from the higher-bitrate variant after the buffer grew, calls: {calls:?}"
    );

    session.close();
    let _ = events.recv().await;
}

//! HLS playlist parsing (spec §4.1), layered on `m3u8-rs`.
//!
//! Mirrors the teacher's `PlaylistEngine`: hand the raw bytes straight to
//! `m3u8_rs::parse_playlist_res` and match on `m3u8_rs::Playlist::{Master,
//! Media}Playlist`, then build the spec's own `PlaylistSnapshot` model on top
//! of its `VariantStream`/`MediaSegment` output — the `"{sequence}_{url}"`
//! dedup key and the descending-bitrate-stable-tie variant sort are this
//! crate's own layer, not something `m3u8-rs` provides.

use m3u8_rs::Playlist;
use url::Url;

use super::model::{ByteRange, PlaylistKind, PlaylistSnapshot, SegmentRef, Variant};
use crate::error::{ParseError, ParseWarning};

/// Parse playlist text into a typed snapshot.
///
/// `base_url` is the directory URL of the fetched playlist, used to resolve
/// relative segment/variant URLs. Returns any non-fatal warnings alongside
/// the snapshot (spec §7 `Ignorable`).
pub fn parse_playlist(
    text: &str,
    base_url: &str,
) -> Result<(PlaylistSnapshot, Vec<ParseWarning>), ParseError> {
    let mut warnings = Vec::new();

    let playlist = m3u8_rs::parse_playlist_res(text.as_bytes())
        .map_err(|e| ParseError::new(format!("m3u8-rs failed to parse playlist: {e}")))?;

    match playlist {
        Playlist::MasterPlaylist(master) => {
            let variants = convert_variants(&master, base_url, &mut warnings);
            if variants.is_empty() {
                return Err(ParseError::new(
                    "master playlist contains no variants",
                ));
            }
            Ok((
                PlaylistSnapshot {
                    kind: PlaylistKind::Master,
                    variants: Some(variants),
                    segments: None,
                    media_sequence: None,
                    is_live: false,
                    base_url: base_url.to_string(),
                },
                warnings,
            ))
        }
        Playlist::MediaPlaylist(media) => {
            let media_sequence = media.media_sequence;
            let is_live = !media.end_list;
            let segments = convert_segments(&media, base_url, media_sequence, &mut warnings);
            if segments.is_empty() {
                return Err(ParseError::new(
                    "media playlist contains zero segments",
                ));
            }
            Ok((
                PlaylistSnapshot {
                    kind: PlaylistKind::Media,
                    variants: None,
                    segments: Some(segments),
                    media_sequence: Some(media_sequence),
                    is_live,
                    base_url: base_url.to_string(),
                },
                warnings,
            ))
        }
    }
}

fn resolve_url(base_url: &str, uri: &str) -> String {
    match Url::parse(base_url).and_then(|base| base.join(uri)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => uri.to_string(),
    }
}

fn convert_variants(
    master: &m3u8_rs::MasterPlaylist,
    base_url: &str,
    warnings: &mut Vec<ParseWarning>,
) -> Vec<Variant> {
    let mut variants: Vec<(usize, Variant)> = Vec::with_capacity(master.variants.len());

    for (i, v) in master.variants.iter().enumerate() {
        if v.uri.trim().is_empty() {
            warnings.push(ParseWarning {
                line: i,
                message: "#EXT-X-STREAM-INF variant with an empty URI".to_string(),
            });
            continue;
        }
        variants.push((
            i,
            Variant {
                url: resolve_url(base_url, &v.uri),
                bitrate_bps: v.bandwidth,
                resolution: v.resolution.map(|r| (r.width as u32, r.height as u32)),
                codecs: v.codecs.clone(),
            },
        ));
    }

    // Descending bitrate; ties broken by original order (stable sort on a
    // key that embeds the original index preserves this directly).
    variants.sort_by_key(|(order, v)| (std::cmp::Reverse(v.bitrate_bps), *order));
    variants.into_iter().map(|(_, v)| v).collect()
}

fn convert_segments(
    media: &m3u8_rs::MediaPlaylist,
    base_url: &str,
    media_sequence_start: u64,
    warnings: &mut Vec<ParseWarning>,
) -> Vec<SegmentRef> {
    let mut segments = Vec::with_capacity(media.segments.len());

    for (i, seg) in media.segments.iter().enumerate() {
        if seg.uri.trim().is_empty() {
            warnings.push(ParseWarning {
                line: i,
                message: "#EXTINF segment with an empty URI".to_string(),
            });
            continue;
        }
        let sequence = media_sequence_start + i as u64;
        let byte_range = seg.byte_range.as_ref().map(|br| ByteRange {
            start: br.offset.unwrap_or(0),
            end: br.offset.unwrap_or(0).saturating_add(br.length).saturating_sub(1),
        });
        segments.push(SegmentRef::new(
            sequence,
            resolve_url(base_url, &seg.uri),
            seg.duration as f64,
            byte_range,
        ));
    }

    segments
}

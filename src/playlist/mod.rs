//! PlaylistParser (spec §4.1) and its data model (spec §3).

mod model;
mod parser;

pub use model::{ByteRange, ContainerKind, PlaylistKind, PlaylistSnapshot, SegmentRef, Variant};
pub use parser::parse_playlist;

//! Adaptive HLS streaming core for mobile apps: manifest resolution, ABR
//! variant selection, segment fetch with retry/backoff, a bounded segment
//! cache, and a demand-driven feed into an app-supplied media sink.
//!
//! The engine never touches the network or the media pipeline directly —
//! both are injected through the `RequestProxy`/`Sink`/`Transmuxer` traits in
//! [`proxy`] and [`sink`] — so an embedder wires in its own HTTP stack and
//! its own `MediaSource`-equivalent without this crate knowing about either.

pub mod abr;
pub mod append_queue;
pub mod bandwidth;
pub mod config;
pub mod error;
pub mod events;
pub mod fetch;
pub mod playlist;
pub mod proxy;
pub mod registry;
pub mod session;
pub mod sink;
pub mod store;

pub use config::StreamConfig;
pub use error::{FetchError, StreamError};
pub use events::StreamEvent;
pub use playlist::ContainerKind;
pub use registry::{SessionRegistry, SessionSnapshot};
pub use session::{SessionState, StreamSession};

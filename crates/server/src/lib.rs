//! Singalong media server
//!
//! Serves karaoke videos and sound effects to the playback terminal with
//! byte-range support and coordinates the shared song request queue.

pub mod api;
pub mod media;
pub mod queue;
pub mod registry;
pub mod resolve;
pub mod server;

pub use singalong_config as config;
pub use singalong_config::Config;
pub use api::{create_router, ApiError, AppState, ResolveReport, StreamError};
pub use media::{content_type, parse_range, MediaError, MediaServer, RangeSpec};
pub use queue::{QueueEntry, QueueError, QueueStore};
pub use registry::{ConfigRegistry, MediaKind, MediaRoots};
pub use resolve::{
    inspect, prefix_candidates, resolve, resolve_exact, Resolution, ResolveError,
    AUDIO_EXTENSIONS, VIDEO_EXTENSIONS,
};
pub use server::{BoundServer, Server, ServerError};

//! Media root registry
//!
//! Holds the two directories media is served from. Roots are seeded from the
//! startup configuration and can be replaced at runtime through `POST /config`.
//! A replacement only affects lookups that start after it; streams already open
//! keep reading from the file they resolved.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::MediaConfig;

/// The two kinds of media the server delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Karaoke videos, looked up by song number.
    Video,
    /// Sound effects played by the terminal.
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of both roots, serialized as the `/config` body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MediaRoots {
    pub videos_path: String,
    pub sounds_path: String,
}

impl From<&MediaConfig> for MediaRoots {
    fn from(cfg: &MediaConfig) -> Self {
        Self {
            videos_path: cfg.videos_path.clone(),
            sounds_path: cfg.sounds_path.clone(),
        }
    }
}

/// Process-wide owner of the active media roots.
///
/// Cheap to clone; clones share the same underlying cell.
#[derive(Debug, Clone)]
pub struct ConfigRegistry {
    roots: Arc<RwLock<MediaRoots>>,
}

impl ConfigRegistry {
    pub fn new(initial: MediaRoots) -> Self {
        Self {
            roots: Arc::new(RwLock::new(initial)),
        }
    }

    /// Current root for `kind`.
    pub async fn get(&self, kind: MediaKind) -> String {
        let roots = self.roots.read().await;
        match kind {
            MediaKind::Video => roots.videos_path.clone(),
            MediaKind::Audio => roots.sounds_path.clone(),
        }
    }

    /// Current root for `kind` as a filesystem path.
    pub async fn root(&self, kind: MediaKind) -> PathBuf {
        PathBuf::from(self.get(kind).await)
    }

    /// Both roots under a single read.
    pub async fn snapshot(&self) -> MediaRoots {
        self.roots.read().await.clone()
    }

    /// Replace the root for `kind`.
    ///
    /// Blank candidates are ignored and leave the current value in place.
    /// Returns whether the root changed hands.
    pub async fn set(&self, kind: MediaKind, candidate: &str) -> bool {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            tracing::debug!(%kind, "ignoring blank media root");
            return false;
        }

        let mut roots = self.roots.write().await;
        let slot = match kind {
            MediaKind::Video => &mut roots.videos_path,
            MediaKind::Audio => &mut roots.sounds_path,
        };
        *slot = trimmed.to_string();
        tracing::info!(%kind, path = %trimmed, "media root updated");
        true
    }
}

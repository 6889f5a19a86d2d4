//! Filename resolution for media requests.
//!
//! Songs are addressed by a logical identifier (usually the five digit song
//! number) while the files on disk are often named `20001 - Artist - Title.mkv`.
//! Resolution tries the exact name first and then falls back to the first file,
//! in lexicographic order, whose name starts with the identifier and carries an
//! allowed extension.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::registry::MediaKind;

/// Video extensions accepted by prefix resolution (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &[".mp4", ".mkv", ".mov", ".avi"];

/// Audio extensions accepted by prefix resolution and the sounds route.
pub const AUDIO_EXTENSIONS: &[&str] = &[".mp3", ".wav", ".ogg"];

/// Errors produced while mapping a request onto a file.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The requested name would escape the media root or is empty.
    #[error("invalid media name: {0:?}")]
    InvalidName(String),

    /// The media root does not exist or is not a directory.
    #[error("media root cannot be listed: {}", .0.display())]
    RootUnavailable(PathBuf),

    /// No exact or prefix match exists.
    #[error("no {kind} file matches {requested:?}")]
    NotFound { kind: MediaKind, requested: String },
}

/// Extensions a kind may be served with.
pub fn allowed_extensions(kind: MediaKind) -> &'static [&'static str] {
    match kind {
        MediaKind::Video => VIDEO_EXTENSIONS,
        MediaKind::Audio => AUDIO_EXTENSIONS,
    }
}

/// Extension appended to a bare identifier when building the exact name.
pub fn default_extension(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "mp4",
        MediaKind::Audio => "mp3",
    }
}

/// Checks if a file name has one of the kind's extensions (case-insensitive).
pub fn has_allowed_extension(name: &str, kind: MediaKind) -> bool {
    let lower = name.to_lowercase();
    allowed_extensions(kind)
        .iter()
        .any(|ext| lower.ends_with(ext))
}

/// Rejects names that are empty or that could address anything outside the root.
pub fn validate_name(name: &str) -> Result<(), ResolveError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || Path::new(name).is_absolute();
    if bad {
        return Err(ResolveError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// The name tried before any directory listing.
///
/// A request that already carries an extension is used as-is; a bare
/// identifier gets the kind's default extension.
pub fn exact_name(kind: MediaKind, requested: &str) -> String {
    if Path::new(requested).extension().is_some() {
        requested.to_string()
    } else {
        format!("{}.{}", requested, default_extension(kind))
    }
}

/// The identifier used for prefix matching: the requested name minus its extension.
pub fn identifier(requested: &str) -> &str {
    Path::new(requested)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(requested)
}

/// Lists regular files directly under `root` whose name starts with `prefix`
/// and has an allowed extension, sorted by file name.
pub fn prefix_candidates(
    root: &Path,
    kind: MediaKind,
    prefix: &str,
) -> Result<Vec<String>, ResolveError> {
    use walkdir::WalkDir;

    if !root.is_dir() {
        return Err(ResolveError::RootUnavailable(root.to_path_buf()));
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    let candidates = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| name.starts_with(prefix) && has_allowed_extension(name, kind))
        .collect();

    Ok(candidates)
}

/// Resolves `requested` under `root`, falling back to prefix matching.
pub fn resolve(root: &Path, kind: MediaKind, requested: &str) -> Result<PathBuf, ResolveError> {
    validate_name(requested)?;

    let exact = root.join(exact_name(kind, requested));
    if exact.is_file() {
        return Ok(exact);
    }

    let id = identifier(requested);
    tracing::debug!(%kind, requested, id, "exact name missing, trying prefix match");

    prefix_candidates(root, kind, id)?
        .into_iter()
        .next()
        .map(|name| root.join(name))
        .ok_or_else(|| ResolveError::NotFound {
            kind,
            requested: requested.to_string(),
        })
}

/// Resolves `requested` under `root` without any fallback.
pub fn resolve_exact(root: &Path, kind: MediaKind, requested: &str) -> Result<PathBuf, ResolveError> {
    validate_name(requested)?;

    let path = root.join(requested);
    if path.is_file() {
        Ok(path)
    } else {
        Err(ResolveError::NotFound {
            kind,
            requested: requested.to_string(),
        })
    }
}

/// Everything the resolver considered for one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub exact: PathBuf,
    pub exists_exact: bool,
    pub candidates: Vec<String>,
    pub resolved: Option<PathBuf>,
}

/// Diagnostic variant of [`resolve`] that reports every step.
pub fn inspect(root: &Path, kind: MediaKind, id: &str) -> Result<Resolution, ResolveError> {
    validate_name(id)?;

    let exact = root.join(format!("{}.{}", id, default_extension(kind)));
    let exists_exact = exact.is_file();
    let candidates = prefix_candidates(root, kind, id)?;
    let resolved = if exists_exact {
        Some(exact.clone())
    } else {
        candidates.first().map(|name| root.join(name))
    };

    Ok(Resolution {
        exact,
        exists_exact,
        candidates,
        resolved,
    })
}

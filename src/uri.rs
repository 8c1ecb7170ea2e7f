//! File-URI helpers for the editor boundary.
//!
//! The protocol addresses documents by URI; editor code works in paths.
//! These conversions live here so the embedding application never builds
//! `file://` strings by hand.

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub struct PathToUriError {
    path: PathBuf,
}

/// Convert an absolute path into a `file://` URI.
pub fn path_to_file_uri(path: &Path) -> Result<url::Url, PathToUriError> {
    url::Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}

/// Convert a `file://` URI back into a path. Returns `None` for other
/// schemes or unparseable input.
pub fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    url::Url::parse(uri).ok().and_then(|u| u.to_file_path().ok())
}

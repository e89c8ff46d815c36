use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MediaRefError {
    #[error("media reference cannot be empty")]
    Empty,

    #[error("invalid media URL: {0}")]
    InvalidUrl(String),
}

/// Location of a lesson's video, as stored by the catalog.
///
/// Two references are the same media iff they compare equal; the playback
/// manager relies on this to decide whether a resource can be kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaRef {
    File(PathBuf),
    Url(Url),
}

impl MediaRef {
    /// Build a file reference.
    ///
    /// # Errors
    ///
    /// Returns `MediaRefError::Empty` for an empty path.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, MediaRefError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(MediaRefError::Empty);
        }
        Ok(Self::File(path))
    }

    /// Build a URL reference.
    ///
    /// # Errors
    ///
    /// Returns `MediaRefError` if the string is blank or not a URL.
    pub fn from_url(raw: impl AsRef<str>) -> Result<Self, MediaRefError> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return Err(MediaRefError::Empty);
        }
        let url = Url::parse(raw).map_err(|_| MediaRefError::InvalidUrl(raw.to_owned()))?;
        Ok(Self::Url(url))
    }

    /// Parse the catalog's stored form: anything with a scheme other than
    /// `file` is a URL, everything else a path.
    ///
    /// # Errors
    ///
    /// Returns `MediaRefError` for blank input or a malformed URL.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, MediaRefError> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return Err(MediaRefError::Empty);
        }
        if let Some(path) = raw.strip_prefix("file://") {
            return Self::from_file(path);
        }
        match raw.split_once("://") {
            Some((scheme, _)) if !scheme.is_empty() && !scheme.contains('/') => {
                Self::from_url(raw)
            }
            _ => Self::from_file(raw),
        }
    }

    #[must_use]
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            MediaRef::File(p) => Some(p.as_path()),
            MediaRef::Url(_) => None,
        }
    }

    #[must_use]
    pub fn as_url(&self) -> Option<&Url> {
        match self {
            MediaRef::Url(u) => Some(u),
            MediaRef::File(_) => None,
        }
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaRef::File(p) => write!(f, "{}", p.display()),
            MediaRef::Url(u) => write!(f, "{u}"),
        }
    }
}

//! Media backend that checks local video files without decoding them.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lesson_core::model::MediaRef;
use services::{MediaBackend, MediaError, MediaSession};
use tokio::io::AsyncReadExt;
use tracing::debug;

const HEADER_LEN: usize = 4096;

/// Opens lesson videos under `root` and reads their first bytes.
#[derive(Debug, Clone)]
pub struct FileProbeBackend {
    root: PathBuf,
}

impl FileProbeBackend {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, media: &MediaRef) -> Result<PathBuf, MediaError> {
        let Some(path) = media.as_path() else {
            return Err(MediaError::new(format!("remote media is not supported: {media}")));
        };
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(self.root.join(path))
        }
    }
}

async fn probe(path: &Path) -> Result<usize, MediaError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|err| MediaError::new(format!("cannot open {}: {err}", path.display())))?;
    let mut header = vec![0_u8; HEADER_LEN];
    let read = file
        .read(&mut header)
        .await
        .map_err(|err| MediaError::new(format!("cannot read {}: {err}", path.display())))?;
    if read == 0 {
        return Err(MediaError::new(format!("{} is empty", path.display())));
    }
    Ok(read)
}

#[async_trait]
impl MediaBackend for FileProbeBackend {
    async fn create(&self, media: &MediaRef) -> Result<Box<dyn MediaSession>, MediaError> {
        let path = self.resolve(media)?;
        let read = probe(&path).await?;
        debug!(path = %path.display(), read, "media session opened");
        Ok(Box::new(FileProbeSession {
            backend: self.clone(),
            path: Some(path),
        }))
    }
}

/// Holds the probed path until disposed.
#[derive(Debug)]
struct FileProbeSession {
    backend: FileProbeBackend,
    path: Option<PathBuf>,
}

#[async_trait]
impl MediaSession for FileProbeSession {
    async fn load(&mut self, media: &MediaRef) -> Result<(), MediaError> {
        let path = self.backend.resolve(media)?;
        probe(&path).await?;
        debug!(path = %path.display(), "media session switched");
        self.path = Some(path);
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.path.is_some()
    }

    fn dispose(&mut self) {
        if let Some(path) = self.path.take() {
            debug!(path = %path.display(), "media session closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media(raw: &str) -> MediaRef {
        MediaRef::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn probes_files_relative_to_the_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("intro.mp4"), b"\x00\x00\x00\x18ftypmp42").unwrap();
        std::fs::write(dir.path().join("empty.mp4"), b"").unwrap();
        let backend = FileProbeBackend::new(dir.path());

        let mut session = backend.create(&media("intro.mp4")).await.unwrap();
        assert!(session.is_initialized());

        assert!(session.load(&media("missing.mp4")).await.is_err());
        assert!(session.load(&media("empty.mp4")).await.is_err());
        session.load(&media("intro.mp4")).await.unwrap();

        session.dispose();
        session.dispose();
        assert!(!session.is_initialized());
    }

    #[tokio::test]
    async fn rejects_missing_files_and_urls() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileProbeBackend::new(dir.path());

        let missing = backend.create(&media("nope.mp4")).await.err().unwrap();
        assert!(missing.0.contains("cannot open"));

        let remote = backend
            .create(&media("https://cdn.example.com/a.mp4"))
            .await
            .err()
            .unwrap();
        assert!(remote.0.contains("remote media"));
    }
}

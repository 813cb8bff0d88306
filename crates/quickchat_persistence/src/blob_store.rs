//! Filesystem object storage for uploaded chat media.

use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::StoreError;

/// Bucket name the public keys are reported under.
pub const MEDIA_BUCKET: &str = "chat-media";

pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `name`, replacing any previous object. Returns the
    /// bucket-qualified key, e.g. `chat-media/photos/a.png`.
    fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StoreError>;

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Use `root` as the bucket directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an object name to a path inside the bucket. Only plain relative
    /// names are accepted.
    fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(name);
        let plain = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, name: &str, bytes: &[u8]) -> Result<String, StoreError> {
        let path = self.resolve(name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;

        debug!(name, size = bytes.len(), "stored media object");
        Ok(format!("{MEDIA_BUCKET}/{name}"))
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.resolve(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

//! Artifact storage: a local directory plus an optional NAS mirror.
//!
//! Local writes are authoritative and fail hard. NAS writes are best
//! effort: a failure is logged and the NAS path is simply left unset.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Neither the local directory nor the NAS accepted the file.
    #[error("{0} was not written to any storage location")]
    NotStored(String),
}

/// Storage locations for one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    pub local_enabled: bool,
    /// Local root, e.g. `static/hunyuan`. Stored paths start with it.
    pub storage_dir: PathBuf,
    /// NAS mirror root. `None` disables the mirror.
    pub nas_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn local(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            local_enabled: true,
            storage_dir: storage_dir.into(),
            nas_dir: None,
        }
    }
}

/// Where a single saved file landed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredFile {
    pub local_path: Option<String>,
    pub nas_path: Option<String>,
}

impl StoredFile {
    /// Local path if present, else the NAS path.
    pub fn preferred_path(&self) -> Option<String> {
        self.local_path.clone().or_else(|| self.nas_path.clone())
    }

    pub fn is_stored(&self) -> bool {
        self.local_path.is_some() || self.nas_path.is_some()
    }
}

/// Destination for downloaded artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Save `data` as `<root>/<sub_path>/<file_name>` in every enabled
    /// location. `sub_path` may be empty.
    async fn save(
        &self,
        sub_path: &str,
        file_name: &str,
        data: &[u8],
    ) -> Result<StoredFile, StorageError>;
}

/// [`ArtifactStore`] writing to plain directories with `tokio::fs`.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    config: StorageConfig,
}

impl FileArtifactStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }
}

#[async_trait]
impl ArtifactStore for FileArtifactStore {
    async fn save(
        &self,
        sub_path: &str,
        file_name: &str,
        data: &[u8],
    ) -> Result<StoredFile, StorageError> {
        let mut stored = StoredFile::default();

        if self.config.local_enabled {
            let path = write_file(&self.config.storage_dir, sub_path, file_name, data).await?;
            tracing::debug!(path = %path, bytes = data.len(), "Saved artifact locally");
            stored.local_path = Some(path);
        }

        if let Some(nas_dir) = &self.config.nas_dir {
            match write_file(nas_dir, sub_path, file_name, data).await {
                Ok(path) => {
                    tracing::info!(path = %path, bytes = data.len(), "Saved artifact to NAS");
                    stored.nas_path = Some(path);
                }
                Err(e) => {
                    tracing::warn!(error = %e, file = %file_name, "NAS write failed");
                }
            }
        }

        Ok(stored)
    }
}

async fn write_file(
    root: &Path,
    sub_path: &str,
    file_name: &str,
    data: &[u8],
) -> Result<String, StorageError> {
    let dir = if sub_path.is_empty() {
        root.to_path_buf()
    } else {
        root.join(sub_path)
    };
    let io_err = |path: &Path| {
        let path = path.display().to_string();
        move |source: std::io::Error| StorageError::Io { path, source }
    };

    tokio::fs::create_dir_all(&dir).await.map_err(io_err(&dir))?;
    let file = dir.join(file_name);
    tokio::fs::write(&file, data).await.map_err(io_err(&file))?;
    Ok(file.display().to_string())
}

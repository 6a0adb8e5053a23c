//! Volume backend abstraction.
//!
//! The storage stage talks to its medium through [`VolumeBackend`] so the
//! same session and rotation logic runs against a directory tree in tests and
//! a removable card behind a filesystem driver on the device. Paths handed to
//! the trait are relative to the volume root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Volume-level failures.
#[derive(Error, Debug)]
pub enum VolumeError {
    /// Operation attempted before a successful mount.
    #[error("volume is not mounted")]
    NotMounted,

    /// The medium refused to mount.
    #[error("mount failed: {0}")]
    Mount(String),

    /// Formatting the medium failed.
    #[error("format failed: {0}")]
    Format(String),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One root-level directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeEntry {
    /// Entry name without any path prefix.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Storage medium operations used by the logging stage.
#[async_trait]
pub trait VolumeBackend: Send + Sync {
    /// Mounts the medium. Fails on unformatted or absent media.
    async fn mount(&mut self) -> Result<(), VolumeError>;

    /// Unmounts the medium.
    async fn unmount(&mut self) -> Result<(), VolumeError>;

    /// Re-creates an empty filesystem, destroying existing content.
    async fn format(&mut self) -> Result<(), VolumeError>;

    /// Creates a directory, including missing parents.
    async fn create_dir(&self, path: &Path) -> Result<(), VolumeError>;

    /// Lists the entries directly under the volume root.
    async fn list_root(&self) -> Result<Vec<VolumeEntry>, VolumeError>;

    /// Creates an empty file, leaving an existing one untouched.
    async fn touch(&self, path: &Path) -> Result<(), VolumeError>;

    /// Appends `data` to `path`, creating the file if needed. Returns the
    /// number of bytes accepted by the medium.
    async fn append(&self, path: &Path, data: &[u8]) -> Result<usize, VolumeError>;
}

/// Directory-tree volume over the host filesystem.
///
/// Mounting requires the root directory to exist; [`format`] creates it.
/// Every append opens, writes, and closes the file so a power cut loses at
/// most the record in flight.
///
/// [`format`]: VolumeBackend::format
#[derive(Debug)]
pub struct DirVolume {
    root: PathBuf,
    mounted: bool,
}

impl DirVolume {
    /// A volume rooted at `root`. The directory does not need to exist yet.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: false,
        }
    }

    /// The volume root on the host filesystem.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, VolumeError> {
        if self.mounted {
            Ok(self.root.join(path))
        } else {
            Err(VolumeError::NotMounted)
        }
    }
}

#[async_trait]
impl VolumeBackend for DirVolume {
    async fn mount(&mut self) -> Result<(), VolumeError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {
                self.mounted = true;
                info!(root = %self.root.display(), "volume mounted");
                Ok(())
            }
            Ok(_) => Err(VolumeError::Mount(format!(
                "{} is not a directory",
                self.root.display()
            ))),
            Err(err) => Err(VolumeError::Mount(format!(
                "{}: {err}",
                self.root.display()
            ))),
        }
    }

    async fn unmount(&mut self) -> Result<(), VolumeError> {
        self.mounted = false;
        info!(root = %self.root.display(), "volume unmounted");
        Ok(())
    }

    async fn format(&mut self) -> Result<(), VolumeError> {
        self.mounted = false;
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(VolumeError::Format(err.to_string())),
        }
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| VolumeError::Format(err.to_string()))?;
        info!(root = %self.root.display(), "volume formatted");
        Ok(())
    }

    async fn create_dir(&self, path: &Path) -> Result<(), VolumeError> {
        let full = self.resolve(path)?;
        tokio::fs::create_dir_all(&full).await?;
        debug!(path = %full.display(), "directory created");
        Ok(())
    }

    async fn list_root(&self) -> Result<Vec<VolumeEntry>, VolumeError> {
        if !self.mounted {
            return Err(VolumeError::NotMounted);
        }
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            entries.push(VolumeEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: file_type.is_dir(),
            });
        }
        Ok(entries)
    }

    async fn touch(&self, path: &Path) -> Result<(), VolumeError> {
        let full = self.resolve(path)?;
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&full)
            .await?;
        Ok(())
    }

    async fn append(&self, path: &Path, data: &[u8]) -> Result<usize, VolumeError> {
        let full = self.resolve(path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .await?;
        let written = file.write(data).await?;
        file.flush().await?;
        Ok(written)
    }
}

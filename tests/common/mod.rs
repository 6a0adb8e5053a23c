//! Shared fixtures for the integration tests.

// Each test binary compiles this module separately and uses a subset.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use bfp_logger::storage::volume::{DirVolume, VolumeBackend, VolumeEntry, VolumeError};

#[derive(Default)]
struct Controls {
    fail_mounts: AtomicU32,
    fail_formats: AtomicU32,
    fail_appends: AtomicU32,
    appends: AtomicU32,
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Directory volume whose next failures can be scripted from the test body
/// while a storage stage owns the volume.
pub struct ScriptedVolume {
    inner: DirVolume,
    controls: Arc<Controls>,
}

/// Test-side handle to a [`ScriptedVolume`] already handed to a stage.
#[derive(Clone)]
pub struct VolumeScript {
    controls: Arc<Controls>,
}

impl ScriptedVolume {
    pub fn new(root: impl Into<std::path::PathBuf>) -> (Self, VolumeScript) {
        let controls = Arc::new(Controls::default());
        (
            Self {
                inner: DirVolume::new(root),
                controls: Arc::clone(&controls),
            },
            VolumeScript { controls },
        )
    }
}

impl VolumeScript {
    pub fn fail_mounts(&self, times: u32) {
        self.controls.fail_mounts.store(times, Ordering::SeqCst);
    }

    pub fn fail_formats(&self, times: u32) {
        self.controls.fail_formats.store(times, Ordering::SeqCst);
    }

    pub fn fail_appends(&self, times: u32) {
        self.controls.fail_appends.store(times, Ordering::SeqCst);
    }

    /// Append attempts seen so far, failed ones included.
    pub fn appends(&self) -> u32 {
        self.controls.appends.load(Ordering::SeqCst)
    }

    /// Polls until `predicate` holds, panicking after a second.
    pub async fn wait_until(&self, predicate: impl Fn(u32) -> bool) {
        for _ in 0..1_000 {
            if predicate(self.appends()) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        panic!("volume never reached the expected append count");
    }
}

#[async_trait]
impl VolumeBackend for ScriptedVolume {
    async fn mount(&mut self) -> Result<(), VolumeError> {
        if take_one(&self.controls.fail_mounts) {
            return Err(VolumeError::Mount("scripted mount failure".to_owned()));
        }
        self.inner.mount().await
    }

    async fn unmount(&mut self) -> Result<(), VolumeError> {
        self.inner.unmount().await
    }

    async fn format(&mut self) -> Result<(), VolumeError> {
        if take_one(&self.controls.fail_formats) {
            return Err(VolumeError::Format("scripted format failure".to_owned()));
        }
        self.inner.format().await
    }

    async fn create_dir(&self, path: &Path) -> Result<(), VolumeError> {
        self.inner.create_dir(path).await
    }

    async fn list_root(&self) -> Result<Vec<VolumeEntry>, VolumeError> {
        self.inner.list_root().await
    }

    async fn touch(&self, path: &Path) -> Result<(), VolumeError> {
        self.inner.touch(path).await
    }

    async fn append(&self, path: &Path, data: &[u8]) -> Result<usize, VolumeError> {
        self.controls.appends.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.controls.fail_appends) {
            return Err(VolumeError::Io(std::io::Error::other(
                "scripted append failure",
            )));
        }
        self.inner.append(path, data).await
    }
}

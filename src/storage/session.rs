//! Recording sessions.
//!
//! Each boot that reaches storage opens a fresh session: a root-level
//! directory named with an eight-digit zero-padded number, one higher than
//! the highest existing session on the volume. Log files inside the session
//! are numbered the same way starting from zero. Marker files record which
//! boot and which device produced the session.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::identity::IdentityProvider;
use crate::storage::volume::VolumeBackend;

/// Parses `name` as a session directory name: exactly eight ASCII digits.
#[must_use]
pub fn is_session_dir_name(name: &str) -> Option<u32> {
    if name.len() == 8 && name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse().ok()
    } else {
        None
    }
}

/// Picks the next free session number on `volume`.
///
/// Non-session entries are skipped. If the root cannot be listed the scan
/// is treated as empty; colliding with stale data is preferable to never
/// recording.
pub async fn next_session_number(volume: &dyn VolumeBackend) -> u32 {
    let entries = match volume.list_root().await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(%err, "session scan failed, starting from session 1");
            Vec::new()
        }
    };
    entries
        .iter()
        .filter(|entry| entry.is_dir)
        .filter_map(|entry| is_session_dir_name(&entry.name))
        .max()
        .map_or(1, |highest| highest + 1)
}

/// One recording session on a mounted volume.
#[derive(Debug)]
pub struct Session {
    number: u32,
    dir: PathBuf,
    next_log_index: u32,
    extension: String,
}

impl Session {
    /// Opens the next session on `volume`: numbers it, creates its
    /// directory, and drops boot and device markers.
    ///
    /// Directory and marker failures are logged and tolerated; the session
    /// proceeds and individual appends surface any real damage.
    pub async fn create(
        volume: &dyn VolumeBackend,
        identity: &dyn IdentityProvider,
        extension: &str,
    ) -> Session {
        let number = next_session_number(volume).await;
        let dir = PathBuf::from(format!("{number:08}"));

        if let Err(err) = volume.create_dir(&dir).await {
            warn!(session = number, %err, "session directory creation failed");
        }
        for marker in [
            format!("boot_{}", identity.boot_id()),
            format!("dev_{}", identity.device_id()),
        ] {
            if let Err(err) = volume.touch(&dir.join(&marker)).await {
                warn!(session = number, marker, %err, "marker creation failed");
            }
        }

        info!(
            session = number,
            boot_id = identity.boot_id(),
            device_id = identity.device_id(),
            "session opened"
        );
        Session {
            number,
            dir,
            next_log_index: 0,
            extension: extension.to_owned(),
        }
    }

    /// This session's number.
    #[must_use]
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Session directory, relative to the volume root.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for the next log file. Each call consumes an index, so a
    /// rotation attempt that fails never reuses a file name.
    pub fn next_log_path(&mut self) -> PathBuf {
        let index = self.next_log_index;
        self.next_log_index += 1;
        self.dir
            .join(format!("{index:08}{ext}", ext = self.extension))
    }
}

//! Storage stage.
//!
//! Consumes the storage channel and persists events to the volume as framed
//! records inside rotating, session-scoped log files. The stage owns the
//! volume for its whole life: mount (with a format-and-retry fallback for
//! fresh or corrupt media), session creation, rotation, append, unmount.
//!
//! ## Failure policy
//!
//! Mounting is the only fatal failure. Everything after it degrades:
//! encode and append failures are logged and counted per record, a failed
//! rotation leaves the stage with no open file until the next rotation tick,
//! and records arriving in that window are counted as dropped.

pub mod framing;
pub mod session;
pub mod volume;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::channel::EventReceiver;
use crate::codec::EventCodec;
use crate::error::{BfpError, BfpResult};
use crate::event::Event;
use crate::identity::IdentityProvider;
use session::Session;
use volume::VolumeBackend;

/// What one storage run did, returned when the stage exits.
#[derive(Debug, Clone)]
pub struct StorageReport {
    /// Session number the run recorded into.
    pub session: u32,
    /// Wall-clock time the run started.
    pub started_at: DateTime<Utc>,
    /// Records fully written.
    pub records_written: u64,
    /// Bytes accepted by the medium, headers excluded.
    pub bytes_written: u64,
    /// Appends the medium refused.
    pub write_failures: u64,
    /// Appends the medium only partially accepted.
    pub short_writes: u64,
    /// Events that failed to encode or frame.
    pub encode_failures: u64,
    /// Log files opened.
    pub rotations: u64,
    /// Rotation attempts that failed to open a file.
    pub rotate_failures: u64,
    /// Records dropped because no log file was open.
    pub dropped_no_file: u64,
}

impl StorageReport {
    fn begin() -> Self {
        Self {
            session: 0,
            started_at: Utc::now(),
            records_written: 0,
            bytes_written: 0,
            write_failures: 0,
            short_writes: 0,
            encode_failures: 0,
            rotations: 0,
            rotate_failures: 0,
            dropped_no_file: 0,
        }
    }
}

/// Drains the storage channel onto a volume.
pub struct StorageStage {
    volume: Box<dyn VolumeBackend>,
    codec: Box<dyn EventCodec>,
    identity: Arc<dyn IdentityProvider>,
    input: EventReceiver,
    terminate: oneshot::Receiver<()>,
    rotate_interval: Duration,
    extension: String,
}

impl StorageStage {
    /// A stage that records `input` onto `volume`, rotating log files every
    /// `rotate_interval`.
    pub fn new(
        volume: Box<dyn VolumeBackend>,
        codec: Box<dyn EventCodec>,
        identity: Arc<dyn IdentityProvider>,
        input: EventReceiver,
        terminate: oneshot::Receiver<()>,
        rotate_interval: Duration,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            volume,
            codec,
            identity,
            input,
            terminate,
            rotate_interval,
            extension: extension.into(),
        }
    }

    /// Runs the stage to completion.
    ///
    /// Exits when the storage channel closes (all producers gone, queue
    /// drained) or when the terminate line fires; dropping the terminate
    /// sender counts as firing it. Queued events take priority over both.
    pub async fn run(self) -> BfpResult<StorageReport> {
        let StorageStage {
            mut volume,
            codec,
            identity,
            mut input,
            mut terminate,
            rotate_interval,
            extension,
        } = self;
        let mut report = StorageReport::begin();

        mount_with_recovery(volume.as_mut()).await?;
        let mut session = Session::create(volume.as_ref(), identity.as_ref(), &extension).await;
        report.session = session.number();

        let mut current = rotate(volume.as_ref(), &mut session, &mut report).await;
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + rotate_interval,
            rotate_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                maybe_event = input.recv() => match maybe_event {
                    Some(event) => match &current {
                        Some(path) => {
                            append_record(
                                volume.as_ref(),
                                codec.as_ref(),
                                path,
                                &event,
                                &mut report,
                            )
                            .await;
                        }
                        None => {
                            report.dropped_no_file += 1;
                            debug!("no open log file, record dropped");
                        }
                    },
                    None => {
                        info!("storage channel closed, recording finished");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    current = rotate(volume.as_ref(), &mut session, &mut report).await;
                }
                _ = &mut terminate => {
                    info!("terminate signalled, storage stopping");
                    break;
                }
            }
        }

        if let Err(err) = volume.unmount().await {
            warn!(%err, "unmount failed");
        }
        info!(
            session = report.session,
            records = report.records_written,
            bytes = report.bytes_written,
            rotations = report.rotations,
            "storage stage stopped"
        );
        Ok(report)
    }
}

/// Mounts the volume, formatting once if the first mount is refused.
async fn mount_with_recovery(volume: &mut dyn VolumeBackend) -> BfpResult<()> {
    match volume.mount().await {
        Ok(()) => return Ok(()),
        Err(err) => warn!(%err, "mount failed, formatting volume"),
    }
    volume
        .format()
        .await
        .map_err(|err| BfpError::MountFailed(format!("format: {err}")))?;
    volume
        .mount()
        .await
        .map_err(|err| BfpError::MountFailed(format!("mount after format: {err}")))
}

/// Opens the next log file and writes its header. Returns `None` on
/// failure; the stage runs fileless until the next tick retries.
async fn rotate(
    volume: &dyn VolumeBackend,
    session: &mut Session,
    report: &mut StorageReport,
) -> Option<PathBuf> {
    let path = session.next_log_path();
    match volume.append(&path, &framing::LOG_FILE_HEADER).await {
        Ok(written) if written == framing::LOG_FILE_HEADER.len() => {
            report.rotations += 1;
            info!(file = %path.display(), "log file opened");
            Some(path)
        }
        Ok(written) => {
            report.rotate_failures += 1;
            let err = BfpError::ShortWrite {
                written,
                expected: framing::LOG_FILE_HEADER.len(),
            };
            error!(file = %path.display(), %err, "header write torn, file abandoned");
            None
        }
        Err(err) => {
            report.rotate_failures += 1;
            error!(file = %path.display(), %err, "log rotation failed");
            None
        }
    }
}

async fn append_record(
    volume: &dyn VolumeBackend,
    codec: &dyn EventCodec,
    path: &Path,
    event: &Event,
    report: &mut StorageReport,
) {
    let payload = match codec.encode(event) {
        Ok(payload) => payload,
        Err(err) => {
            report.encode_failures += 1;
            error!(%err, "event encode failed");
            return;
        }
    };
    let frame = match framing::encode_record(&payload) {
        Ok(frame) => frame,
        Err(err) => {
            report.encode_failures += 1;
            error!(%err, "record framing failed");
            return;
        }
    };
    match volume.append(path, &frame).await {
        Ok(written) if written == frame.len() => {
            report.records_written += 1;
            report.bytes_written += written as u64;
        }
        Ok(written) => {
            report.short_writes += 1;
            let err = BfpError::ShortWrite {
                written,
                expected: frame.len(),
            };
            warn!(file = %path.display(), %err, "record torn");
        }
        Err(err) => {
            report.write_failures += 1;
            let err = BfpError::WriteFailed(err.to_string());
            error!(file = %path.display(), %err, "record dropped");
        }
    }
}

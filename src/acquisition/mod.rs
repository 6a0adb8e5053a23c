//! EXG acquisition controller.
//!
//! Owns the lifecycle of the biopotential front-end and the worker task that
//! turns data-ready triggers into events. The hardware is reached only
//! through the [`SampleBus`](bus::SampleBus) seam, so the same controller
//! drives real transports and the mock front-end.
//!
//! ## Trigger path
//!
//! The device raises a data-ready line once per conversion. [`DrdyLine`] is
//! that line's software end: `raise` never allocates, blocks, or touches the
//! bus; it only wakes the worker (or reports the raise as ignored while a
//! read is still in flight). All bus traffic happens on the worker task,
//! one transaction at a time, with a buffer loaned from the pool for the
//! duration of the transaction.

pub mod bus;
pub mod frame;
pub mod mock;
pub mod settle;

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::EventSender;
use crate::clock::Clock;
use crate::config::AcquisitionSettings;
use crate::error::{BfpError, BfpResult};
use crate::event::Event;
use crate::pool::BufferPool;

use bus::{DeviceCommand, SampleBus};
use settle::{settle_time_us, DataRate};

/// Lifecycle states of the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionState {
    /// Powered but unconfigured; no worker traffic.
    Idle,
    /// Device reset and base-configured, ready to start.
    Armed,
    /// Conversions running, trigger enabled.
    Sampling,
    /// Tear-down in progress; triggers are ignored.
    Stopping,
}

impl AcquisitionState {
    fn name(self) -> &'static str {
        match self {
            AcquisitionState::Idle => "idle",
            AcquisitionState::Armed => "armed",
            AcquisitionState::Sampling => "sampling",
            AcquisitionState::Stopping => "stopping",
        }
    }
}

/// Outcome of raising the data-ready line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerAck {
    /// The worker will service this trigger.
    Scheduled,
    /// A previous read is still in flight; the raise was dropped.
    Ignored,
    /// The line is not enabled; nothing scheduled.
    Disabled,
}

struct DrdyInner {
    notify: Notify,
    enabled: AtomicBool,
    busy: AtomicBool,
    ignored: AtomicU64,
}

/// Software end of the device's data-ready line.
///
/// Clone freely; all clones share the same line. `raise` is safe from any
/// context, including timer callbacks simulating the hardware interrupt.
#[derive(Clone)]
pub struct DrdyLine {
    inner: Arc<DrdyInner>,
}

impl DrdyLine {
    fn new() -> Self {
        Self {
            inner: Arc::new(DrdyInner {
                notify: Notify::new(),
                enabled: AtomicBool::new(false),
                busy: AtomicBool::new(false),
                ignored: AtomicU64::new(0),
            }),
        }
    }

    /// Signals that a frame is ready to read.
    ///
    /// Returns what happened to the raise. While a read is in flight the
    /// raise is counted and dropped instead of queued, so a slow bus can
    /// never build a backlog of stale triggers.
    pub fn raise(&self) -> TriggerAck {
        if !self.inner.enabled.load(Ordering::Acquire) {
            return TriggerAck::Disabled;
        }
        if self.inner.busy.load(Ordering::Acquire) {
            self.inner.ignored.fetch_add(1, Ordering::Relaxed);
            warn!("data-ready raised before previous read completed");
            return TriggerAck::Ignored;
        }
        self.inner.notify.notify_one();
        TriggerAck::Scheduled
    }

    /// Whether the line is currently enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Raises dropped because a read was in flight.
    #[must_use]
    pub fn ignored_count(&self) -> u64 {
        self.inner.ignored.load(Ordering::Relaxed)
    }

    fn enable(&self) {
        self.inner.enabled.store(true, Ordering::Release);
    }

    fn disable(&self) {
        self.inner.enabled.store(false, Ordering::Release);
    }

    fn set_busy(&self) {
        self.inner.busy.store(true, Ordering::Release);
    }

    fn clear_busy(&self) {
        self.inner.busy.store(false, Ordering::Release);
    }

    async fn triggered(&self) {
        self.inner.notify.notified().await;
    }
}

impl std::fmt::Debug for DrdyLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrdyLine")
            .field("enabled", &self.is_enabled())
            .field("ignored", &self.ignored_count())
            .finish()
    }
}

#[derive(Default)]
struct StatsInner {
    frames: AtomicU64,
    pool_exhausted: AtomicU64,
    bus_failures: AtomicU64,
    malformed_frames: AtomicU64,
    channel_drops: AtomicU64,
}

/// Snapshot of acquisition counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Frames successfully read and published (or attempted to publish).
    pub frames: u64,
    /// Samples dropped because the buffer pool was exhausted.
    pub pool_exhausted: u64,
    /// Failed bus read transactions.
    pub bus_failures: u64,
    /// Frames the bus returned with the wrong length.
    pub malformed_frames: u64,
    /// Events dropped because the ingest channel was full.
    pub channel_drops: u64,
    /// Triggers ignored while a read was in flight.
    pub triggers_ignored: u64,
}

/// Everything the worker task needs, bundled for the spawn.
struct WorkerContext {
    state: Arc<Mutex<AcquisitionState>>,
    bus: Arc<tokio::sync::Mutex<Box<dyn SampleBus>>>,
    drdy: DrdyLine,
    pool: BufferPool,
    ingest: EventSender,
    clock: Arc<dyn Clock>,
    stats: Arc<StatsInner>,
    sequence: AtomicU32,
}

/// Controller for the EXG front-end.
///
/// Drives the Idle / Armed / Sampling lifecycle, owns the worker task, and
/// hands out [`DrdyLine`] clones for whatever simulates or forwards the
/// hardware interrupt.
pub struct ExgController {
    state: Arc<Mutex<AcquisitionState>>,
    bus: Arc<tokio::sync::Mutex<Box<dyn SampleBus>>>,
    drdy: DrdyLine,
    pool: BufferPool,
    ingest: EventSender,
    clock: Arc<dyn Clock>,
    stats: Arc<StatsInner>,
    rate: DataRate,
    high_resolution: bool,
    worker: Option<JoinHandle<()>>,
    worker_stop: Option<oneshot::Sender<()>>,
}

impl ExgController {
    /// Builds a controller over the given bus.
    ///
    /// The configured sample rate must be one the settle table covers, and
    /// the pool's slots must hold at least one frame; both are validated
    /// here rather than discovered mid-acquisition.
    pub fn new(
        bus: Box<dyn SampleBus>,
        pool: BufferPool,
        ingest: EventSender,
        clock: Arc<dyn Clock>,
        settings: &AcquisitionSettings,
    ) -> BfpResult<Self> {
        let rate = DataRate::from_sps(settings.sample_rate_sps)?;
        if pool.slot_len() < frame::FRAME_LEN {
            return Err(BfpError::Configuration(format!(
                "pool slot length {} is below the frame length {}",
                pool.slot_len(),
                frame::FRAME_LEN
            )));
        }

        Ok(Self {
            state: Arc::new(Mutex::new(AcquisitionState::Idle)),
            bus: Arc::new(tokio::sync::Mutex::new(bus)),
            drdy: DrdyLine::new(),
            pool,
            ingest,
            clock,
            stats: Arc::new(StatsInner::default()),
            rate,
            high_resolution: settings.high_resolution,
            worker: None,
            worker_stop: None,
        })
    }

    /// Resets and base-configures the device, then arms the controller.
    ///
    /// A probe or configuration failure surfaces as `DeviceNotReady` and the
    /// controller stays Idle.
    pub async fn initialize(&mut self) -> BfpResult<()> {
        self.expect_state(AcquisitionState::Idle)?;

        self.bus.lock().await.initialize().await?;

        if self.worker.is_none() {
            let (stop_tx, stop_rx) = oneshot::channel();
            let context = WorkerContext {
                state: Arc::clone(&self.state),
                bus: Arc::clone(&self.bus),
                drdy: self.drdy.clone(),
                pool: self.pool.clone(),
                ingest: self.ingest.clone(),
                clock: Arc::clone(&self.clock),
                stats: Arc::clone(&self.stats),
                sequence: AtomicU32::new(0),
            };
            self.worker = Some(tokio::spawn(async move {
                acquire_loop(context, stop_rx).await;
            }));
            self.worker_stop = Some(stop_tx);
        }

        *self.state.lock() = AcquisitionState::Armed;
        info!("EXG front-end armed");
        Ok(())
    }

    /// Starts continuous acquisition.
    ///
    /// Order matters: the continuous-read command goes out first, then the
    /// settle delay for the configured rate elapses in full, and only then
    /// is the trigger enabled and conversion driven on.
    pub async fn start(&mut self) -> BfpResult<()> {
        self.expect_state(AcquisitionState::Armed)?;

        let mut bus = self.bus.lock().await;
        bus.send_command(DeviceCommand::ReadContinuous).await?;

        let settle_us = settle_time_us(self.rate, self.high_resolution);
        // The settle window is a few microseconds, far below timer
        // resolution; the trigger must stay disabled until it has passed.
        spin_wait_us(settle_us);
        self.drdy.enable();

        if let Err(err) = bus.set_conversion(true).await {
            self.drdy.disable();
            return Err(err);
        }

        *self.state.lock() = AcquisitionState::Sampling;
        info!(
            rate = ?self.rate,
            high_resolution = self.high_resolution,
            settle_us,
            "acquisition started"
        );
        Ok(())
    }

    /// Stops acquisition and returns the device to a register-readable mode.
    ///
    /// Disables the trigger first so no new reads schedule, waits out any
    /// in-flight transaction, then stops conversion and leaves continuous
    /// read mode. The controller is Idle afterwards even if a bus error is
    /// reported on the way down.
    pub async fn stop(&mut self) -> BfpResult<()> {
        self.expect_state(AcquisitionState::Sampling)?;
        *self.state.lock() = AcquisitionState::Stopping;

        self.drdy.disable();

        // Taking the bus lock waits for an in-flight read to finish.
        let mut bus = self.bus.lock().await;
        let conversion = bus.set_conversion(false).await;
        let command = bus.send_command(DeviceCommand::StopReadContinuous).await;
        drop(bus);

        *self.state.lock() = AcquisitionState::Idle;
        info!("acquisition stopped");

        conversion?;
        command?;
        Ok(())
    }

    /// Stops the worker task. Call after `stop` when tearing the pipeline
    /// down; the controller can be re-initialized afterwards.
    pub async fn shutdown_worker(&mut self) {
        if let Some(tx) = self.worker_stop.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            if let Err(err) = worker.await {
                error!(%err, "acquisition worker did not exit cleanly");
            }
        }
    }

    /// Handle to the data-ready line.
    #[must_use]
    pub fn trigger(&self) -> DrdyLine {
        self.drdy.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> AcquisitionState {
        *self.state.lock()
    }

    /// Snapshot of the acquisition counters.
    #[must_use]
    pub fn stats(&self) -> AcquisitionStats {
        AcquisitionStats {
            frames: self.stats.frames.load(Ordering::Relaxed),
            pool_exhausted: self.stats.pool_exhausted.load(Ordering::Relaxed),
            bus_failures: self.stats.bus_failures.load(Ordering::Relaxed),
            malformed_frames: self.stats.malformed_frames.load(Ordering::Relaxed),
            channel_drops: self.stats.channel_drops.load(Ordering::Relaxed),
            triggers_ignored: self.drdy.ignored_count(),
        }
    }

    fn expect_state(&self, expected: AcquisitionState) -> BfpResult<()> {
        let found = *self.state.lock();
        if found == expected {
            Ok(())
        } else {
            Err(BfpError::AcquisitionState {
                expected: expected.name(),
                found: found.name(),
            })
        }
    }
}

impl Drop for ExgController {
    fn drop(&mut self) {
        if let Some(tx) = self.worker_stop.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

impl std::fmt::Debug for ExgController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExgController")
            .field("state", &self.state())
            .field("rate", &self.rate)
            .field("high_resolution", &self.high_resolution)
            .finish()
    }
}

/// Busy-waits for a microsecond window. Only used for settle delays, which
/// are far shorter than what the async timer can resolve.
fn spin_wait_us(micros: u32) {
    let deadline = Instant::now() + Duration::from_micros(u64::from(micros));
    while Instant::now() < deadline {
        std::hint::spin_loop();
    }
}

async fn acquire_loop(context: WorkerContext, mut stop_rx: oneshot::Receiver<()>) {
    debug!("acquisition worker running");
    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            () = context.drdy.triggered() => {
                handle_data_ready(&context).await;
            }
        }
    }
    debug!("acquisition worker exiting");
}

async fn handle_data_ready(context: &WorkerContext) {
    if *context.state.lock() != AcquisitionState::Sampling {
        return;
    }
    context.drdy.set_busy();
    read_one_frame(context).await;
    context.drdy.clear_busy();
}

async fn read_one_frame(context: &WorkerContext) {
    let Some(mut buffer) = context.pool.try_acquire() else {
        context.stats.pool_exhausted.fetch_add(1, Ordering::Relaxed);
        warn!(
            exhausted = context.pool.exhausted_count(),
            "sample dropped: buffer pool exhausted"
        );
        return;
    };

    let result = {
        let mut bus = context.bus.lock().await;
        bus.read_frame(&mut buffer).await
    };

    match result {
        Err(err) => {
            context.stats.bus_failures.fetch_add(1, Ordering::Relaxed);
            error!(%err, "frame read failed");
        }
        Ok(read) => {
            let frame_bytes = &buffer[..read.min(buffer.len())];
            let sequence = context.sequence.load(Ordering::Relaxed);
            match frame::sample_from_frame(frame_bytes, sequence) {
                Some(sample) => {
                    context.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
                    context.stats.frames.fetch_add(1, Ordering::Relaxed);
                    let event = Event::exg(context.clock.now_micros(), sample);
                    match context.ingest.try_publish(event) {
                        Ok(()) => {}
                        Err(BfpError::ChannelFull { .. }) => {
                            context.stats.channel_drops.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(_) => {
                            debug!("ingest channel closed; pipeline is shutting down");
                        }
                    }
                }
                None => {
                    context.stats.malformed_frames.fetch_add(1, Ordering::Relaxed);
                    error!(
                        read,
                        expected = frame::FRAME_LEN,
                        "bus returned a malformed frame"
                    );
                }
            }
        }
    }
    // `buffer` drops here: the loan is transaction-scoped on every path.
}

//! Pipeline assembly.
//!
//! Wires the three stages together in dependency order, storage first so a
//! consumer exists before any producer can publish:
//!
//! ```text
//! EXG worker ──┐
//! aux samplers ─┼─ ingest ──> processing ──> storage ──> volume
//! external ────┘
//! ```
//!
//! [`PipelineBuilder`] owns the swappable seams: volume backend, codec,
//! identity, clock, sample bus, sensors. Everything not supplied falls back
//! to the production default. Shutdown reverses the order: producers stop
//! first, then the channels close and each stage drains and exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::acquisition::bus::SampleBus;
use crate::acquisition::frame;
use crate::acquisition::{AcquisitionState, AcquisitionStats, DrdyLine, ExgController};
use crate::channel::{event_channel, EventSender};
use crate::clock::{Clock, MonotonicClock};
use crate::codec::{BincodeCodec, EventCodec};
use crate::config::Settings;
use crate::error::{BfpError, BfpResult};
use crate::identity::{IdentityProvider, UuidIdentity};
use crate::pool::BufferPool;
use crate::processing::{ProcessingStage, ProcessingStats};
use crate::sensors::{AuxSampler, AuxSamplerHandle, AuxSensor};
use crate::storage::volume::{DirVolume, VolumeBackend};
use crate::storage::{StorageReport, StorageStage};

/// Everything the pipeline counted, collected at shutdown.
#[derive(Debug)]
pub struct PipelineReport {
    /// Front-end worker counters.
    pub acquisition: AcquisitionStats,
    /// Processing stage counters.
    pub processing: ProcessingStats,
    /// Storage stage counters.
    pub storage: StorageReport,
    /// Readings published by auxiliary samplers.
    pub aux_published: u64,
}

/// Builder for a running pipeline.
pub struct PipelineBuilder {
    settings: Settings,
    volume: Option<Box<dyn VolumeBackend>>,
    codec: Option<Box<dyn EventCodec>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    clock: Option<Arc<dyn Clock>>,
    bus: Option<Box<dyn SampleBus>>,
    sensors: Vec<(Box<dyn AuxSensor>, Duration)>,
}

impl PipelineBuilder {
    /// A builder over `settings` with all seams at their defaults.
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            volume: None,
            codec: None,
            identity: None,
            clock: None,
            bus: None,
            sensors: Vec::new(),
        }
    }

    /// Replaces the storage medium. Defaults to a [`DirVolume`] at the
    /// configured mount root.
    #[must_use]
    pub fn volume(mut self, volume: Box<dyn VolumeBackend>) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Replaces the record codec. Defaults to [`BincodeCodec`].
    #[must_use]
    pub fn codec(mut self, codec: Box<dyn EventCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Replaces the identity provider. Defaults to a fresh boot id and the
    /// configured device id.
    #[must_use]
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Replaces the timestamp source. Defaults to [`MonotonicClock`].
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Supplies the EXG sample bus. Required.
    #[must_use]
    pub fn exg_bus(mut self, bus: Box<dyn SampleBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Adds an auxiliary sensor polled every `period`.
    #[must_use]
    pub fn aux_sensor(mut self, sensor: Box<dyn AuxSensor>, period: Duration) -> Self {
        self.sensors.push((sensor, period));
        self
    }

    /// Spawns the stages, arms the front-end, and hands back the controls.
    ///
    /// The front-end is armed but not sampling; call
    /// [`PipelineHandle::start`] to begin conversion.
    pub async fn launch(self) -> BfpResult<PipelineHandle> {
        let PipelineBuilder {
            settings,
            volume,
            codec,
            identity,
            clock,
            bus,
            sensors,
        } = self;
        settings.validate()?;

        let bus = bus.ok_or_else(|| {
            BfpError::Configuration("pipeline needs an EXG sample bus".to_owned())
        })?;
        let volume = volume
            .unwrap_or_else(|| Box::new(DirVolume::new(settings.storage.mount_root.clone())));
        let codec = codec.unwrap_or_else(|| Box::new(BincodeCodec));
        let identity: Arc<dyn IdentityProvider> = identity
            .unwrap_or_else(|| Arc::new(UuidIdentity::new(settings.device_id.clone())));
        let clock: Arc<dyn Clock> = clock.unwrap_or_else(|| Arc::new(MonotonicClock::default()));

        let (ingest_tx, ingest_rx) =
            event_channel("ingest", settings.pipeline.ingest_capacity)?;
        let (storage_tx, storage_rx) =
            event_channel("storage", settings.pipeline.storage_capacity)?;
        let (terminate_tx, terminate_rx) = oneshot::channel();

        let storage = tokio::spawn(
            StorageStage::new(
                volume,
                codec,
                Arc::clone(&identity),
                storage_rx,
                terminate_rx,
                Duration::from_secs(settings.storage.rotate_interval_secs),
                settings.storage.file_extension.clone(),
            )
            .run(),
        );
        let processing = tokio::spawn(ProcessingStage::new(ingest_rx, storage_tx).run());

        let pool = BufferPool::new(settings.pipeline.pool_slots, frame::FRAME_LEN)?;
        let mut controller = ExgController::new(
            bus,
            pool,
            ingest_tx.clone(),
            Arc::clone(&clock),
            &settings.acquisition,
        )?;
        controller.initialize().await?;

        let aux = sensors
            .into_iter()
            .map(|(sensor, period)| {
                AuxSampler::spawn(sensor, period, ingest_tx.clone(), Arc::clone(&clock))
            })
            .collect();

        info!(
            boot_id = identity.boot_id(),
            device_id = identity.device_id(),
            "pipeline launched"
        );
        Ok(PipelineHandle {
            controller,
            aux,
            ingest: ingest_tx,
            terminate: Some(terminate_tx),
            processing,
            storage,
        })
    }
}

/// Controls for a launched pipeline.
#[derive(Debug)]
pub struct PipelineHandle {
    controller: ExgController,
    aux: Vec<AuxSamplerHandle>,
    ingest: EventSender,
    terminate: Option<oneshot::Sender<()>>,
    processing: JoinHandle<ProcessingStats>,
    storage: JoinHandle<BfpResult<StorageReport>>,
}

impl PipelineHandle {
    /// Starts EXG conversion.
    pub async fn start(&mut self) -> BfpResult<()> {
        self.controller.start().await
    }

    /// Stops EXG conversion, leaving the front-end armed.
    pub async fn stop(&mut self) -> BfpResult<()> {
        self.controller.stop().await
    }

    /// The data-ready line feeding the front-end worker.
    #[must_use]
    pub fn trigger(&self) -> DrdyLine {
        self.controller.trigger()
    }

    /// A publisher onto the ingest channel for out-of-band events.
    #[must_use]
    pub fn publisher(&self) -> EventSender {
        self.ingest.clone()
    }

    /// Snapshot of the front-end counters.
    #[must_use]
    pub fn acquisition_stats(&self) -> AcquisitionStats {
        self.controller.stats()
    }

    /// Fires the storage escape hatch: storage exits at its next idle
    /// point without waiting for the channels to drain.
    pub fn terminate(&mut self) {
        if let Some(tx) = self.terminate.take() {
            let _ = tx.send(());
        }
    }

    /// Orderly teardown: stop producers, drain the channels, join the
    /// stages, and collect their reports.
    pub async fn shutdown(self) -> BfpResult<PipelineReport> {
        let PipelineHandle {
            mut controller,
            aux,
            ingest,
            terminate,
            processing,
            storage,
        } = self;

        if controller.state() == AcquisitionState::Sampling {
            if let Err(err) = controller.stop().await {
                warn!(%err, "front-end stop failed during shutdown");
            }
        }
        controller.shutdown_worker().await;
        let acquisition = controller.stats();
        drop(controller);

        let mut aux_published = 0;
        for handle in aux {
            aux_published += handle.stop().await;
        }

        // Last ingest sender; dropping it lets processing drain and exit,
        // which in turn closes the storage channel.
        drop(ingest);

        let processing = processing
            .await
            .map_err(|err| BfpError::Shutdown(format!("processing task: {err}")))?;
        let storage = storage
            .await
            .map_err(|err| BfpError::Shutdown(format!("storage task: {err}")))??;

        // Alive until storage has joined; dropping it earlier reads as an
        // early terminate.
        drop(terminate);

        Ok(PipelineReport {
            acquisition,
            processing,
            storage,
            aux_published,
        })
    }
}

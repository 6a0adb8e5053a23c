//! Auxiliary sensor sampling.
//!
//! Pressure, temperature, ambient light, and battery telemetry ride the same
//! event pipeline as the EXG front-end, but at far lower rates and without a
//! hardware trigger: a periodic task polls each sensor and publishes the raw
//! reading. Sensor read failures are warned and skipped; a full ingest
//! channel drops the reading like any other producer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::channel::EventSender;
use crate::clock::Clock;
use crate::error::BfpResult;
use crate::event::{AuxReading, AuxSource, Event};

/// One pollable auxiliary sensor.
#[async_trait]
pub trait AuxSensor: Send {
    /// Which source this sensor reports as.
    fn source(&self) -> AuxSource;

    /// Reads one raw device-unit value.
    async fn sample(&mut self) -> BfpResult<i32>;
}

/// Periodic sampler task for one auxiliary sensor.
pub struct AuxSampler;

impl AuxSampler {
    /// Spawns a task that polls `sensor` every `period` and publishes the
    /// readings. The first poll happens immediately.
    pub fn spawn(
        sensor: Box<dyn AuxSensor>,
        period: Duration,
        sender: EventSender,
        clock: Arc<dyn Clock>,
    ) -> AuxSamplerHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            sample_loop(sensor, period, sender, clock, stop_rx).await
        });
        AuxSamplerHandle {
            task,
            stop: Some(stop_tx),
        }
    }
}

/// Handle to a running sampler.
#[derive(Debug)]
pub struct AuxSamplerHandle {
    task: JoinHandle<u64>,
    stop: Option<oneshot::Sender<()>>,
}

impl AuxSamplerHandle {
    /// Stops the sampler and returns how many readings it published.
    pub async fn stop(mut self) -> u64 {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(published) => published,
            Err(err) => {
                error!(%err, "aux sampler did not exit cleanly");
                0
            }
        }
    }
}

async fn sample_loop(
    mut sensor: Box<dyn AuxSensor>,
    period: Duration,
    sender: EventSender,
    clock: Arc<dyn Clock>,
    mut stop_rx: oneshot::Receiver<()>,
) -> u64 {
    let source = sensor.source();
    debug!(?source, ?period, "aux sampler running");

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut published = 0u64;
    loop {
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                match sensor.sample().await {
                    Ok(raw) => {
                        let event = Event::aux(clock.now_micros(), AuxReading { source, raw });
                        if sender.try_publish(event).is_ok() {
                            published += 1;
                        }
                    }
                    Err(err) => warn!(?source, %err, "aux sensor read failed"),
                }
            }
        }
    }
    debug!(?source, published, "aux sampler stopped");
    published
}

/// Ramp-pattern sensor for demos and tests.
pub struct MockAuxSensor {
    source: AuxSource,
    value: i32,
    step: i32,
    fail_remaining: u32,
}

impl MockAuxSensor {
    /// A sensor that reports `base`, `base + step`, `base + 2*step`, ...
    #[must_use]
    pub fn new(source: AuxSource, base: i32, step: i32) -> Self {
        Self {
            source,
            value: base,
            step,
            fail_remaining: 0,
        }
    }

    /// Scripts the next `times` reads to fail.
    #[must_use]
    pub fn fail_reads(mut self, times: u32) -> Self {
        self.fail_remaining = times;
        self
    }
}

#[async_trait]
impl AuxSensor for MockAuxSensor {
    fn source(&self) -> AuxSource {
        self.source
    }

    async fn sample(&mut self) -> BfpResult<i32> {
        if self.fail_remaining > 0 {
            self.fail_remaining -= 1;
            return Err(crate::error::BfpError::Bus(
                "scripted sensor failure".into(),
            ));
        }
        let value = self.value;
        self.value = self.value.wrapping_add(self.step);
        Ok(value)
    }
}

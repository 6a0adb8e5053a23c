//! Simulated EXG front-end for demos and tests.
//!
//! Behaves like the real device as seen through [`SampleBus`]: it must be
//! initialized before it produces frames, it records every command so tests
//! can assert ordering, and it synthesizes a per-channel waveform with a
//! seeded generator so runs are reproducible. Failures are scripted up
//! front, in the same spirit as the driver mocks in the parent project.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Semaphore;

use crate::error::{BfpError, BfpResult};

use super::bus::{DeviceCommand, SampleBus};
use super::frame::{FRAME_BYTES_PER_CHANNEL, FRAME_CHANNELS, FRAME_LEN, FRAME_STATUS_LEN};

const DEFAULT_SEED: u64 = 0x4246_5047;

struct MockShared {
    commands: Mutex<Vec<DeviceCommand>>,
    conversion: AtomicBool,
    reads_started: AtomicU64,
}

/// Scriptable in-memory front-end.
pub struct MockExgBus {
    shared: Arc<MockShared>,
    initialized: bool,
    fail_initialize_remaining: u32,
    fail_reads_remaining: u32,
    short_reads_remaining: u32,
    read_gate: Option<Arc<Semaphore>>,
    phase: u64,
    rng: StdRng,
}

impl MockExgBus {
    /// A healthy front-end with the default waveform seed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(MockShared {
                commands: Mutex::new(Vec::new()),
                conversion: AtomicBool::new(false),
                reads_started: AtomicU64::new(0),
            }),
            initialized: false,
            fail_initialize_remaining: 0,
            fail_reads_remaining: 0,
            short_reads_remaining: 0,
            read_gate: None,
            phase: 0,
            rng: StdRng::seed_from_u64(DEFAULT_SEED),
        }
    }

    /// Reseeds the waveform generator.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Scripts the next `times` initialize calls to fail the probe.
    #[must_use]
    pub fn fail_initialize(mut self, times: u32) -> Self {
        self.fail_initialize_remaining = times;
        self
    }

    /// Scripts the next `times` frame reads to fail the transaction.
    #[must_use]
    pub fn fail_reads(mut self, times: u32) -> Self {
        self.fail_reads_remaining = times;
        self
    }

    /// Scripts the next `times` frame reads to come back one byte short.
    #[must_use]
    pub fn short_reads(mut self, times: u32) -> Self {
        self.short_reads_remaining = times;
        self
    }

    /// Gates every read on a semaphore permit, letting a test hold a
    /// transaction in flight.
    #[must_use]
    pub fn with_read_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.read_gate = Some(gate);
        self
    }

    /// Observer handle that stays valid after the bus moves into the
    /// controller.
    #[must_use]
    pub fn probe(&self) -> MockBusProbe {
        MockBusProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    fn record(&self, command: DeviceCommand) {
        self.shared.commands.lock().push(command);
    }

    fn synth_channel(&mut self, channel: usize) -> i32 {
        let phase = self.phase as f64 / 50.0;
        let base = (phase * std::f64::consts::TAU).sin() * 8_000.0;
        let offset = i32::try_from(channel).unwrap_or(0) * 150;
        let noise: i32 = self.rng.gen_range(-32..=32);
        base as i32 + offset + noise
    }
}

impl Default for MockExgBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SampleBus for MockExgBus {
    async fn initialize(&mut self) -> BfpResult<()> {
        if self.fail_initialize_remaining > 0 {
            self.fail_initialize_remaining -= 1;
            return Err(BfpError::DeviceNotReady("scripted probe failure".into()));
        }
        // Reset, then leave continuous mode so base registers are writable.
        self.record(DeviceCommand::Reset);
        self.record(DeviceCommand::StopReadContinuous);
        self.initialized = true;
        Ok(())
    }

    async fn send_command(&mut self, command: DeviceCommand) -> BfpResult<()> {
        self.record(command);
        Ok(())
    }

    async fn set_conversion(&mut self, enabled: bool) -> BfpResult<()> {
        self.shared.conversion.store(enabled, Ordering::Release);
        Ok(())
    }

    async fn read_frame(&mut self, frame: &mut [u8]) -> BfpResult<usize> {
        self.shared.reads_started.fetch_add(1, Ordering::Release);

        if let Some(gate) = &self.read_gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| BfpError::Bus("read gate closed".into()))?;
            permit.forget();
        }

        if !self.initialized {
            return Err(BfpError::DeviceNotReady(
                "front-end was never initialized".into(),
            ));
        }
        if self.fail_reads_remaining > 0 {
            self.fail_reads_remaining -= 1;
            return Err(BfpError::Bus("scripted read failure".into()));
        }
        if frame.len() < FRAME_LEN {
            return Err(BfpError::Bus(format!(
                "frame buffer holds {} bytes, need {}",
                frame.len(),
                FRAME_LEN
            )));
        }

        frame[..FRAME_STATUS_LEN].copy_from_slice(&[0xC0, 0x00, 0x00]);
        for channel in 0..FRAME_CHANNELS {
            let value = self.synth_channel(channel);
            let word = (value as u32) & 0x00FF_FFFF;
            let offset = FRAME_STATUS_LEN + channel * FRAME_BYTES_PER_CHANNEL;
            frame[offset] = (word >> 16) as u8;
            frame[offset + 1] = (word >> 8) as u8;
            frame[offset + 2] = word as u8;
        }
        self.phase += 1;

        if self.short_reads_remaining > 0 {
            self.short_reads_remaining -= 1;
            return Ok(FRAME_LEN - 1);
        }
        Ok(FRAME_LEN)
    }
}

/// Test-side observer for a [`MockExgBus`].
#[derive(Clone)]
pub struct MockBusProbe {
    shared: Arc<MockShared>,
}

impl MockBusProbe {
    /// Commands the bus has seen, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<DeviceCommand> {
        self.shared.commands.lock().clone()
    }

    /// Whether the conversion line is currently driven.
    #[must_use]
    pub fn conversion_on(&self) -> bool {
        self.shared.conversion.load(Ordering::Acquire)
    }

    /// Read transactions entered (including gated and failed ones).
    #[must_use]
    pub fn reads_started(&self) -> u64 {
        self.shared.reads_started.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::frame::sample_from_frame;
    use std::time::Duration;

    #[tokio::test]
    async fn initialize_records_the_base_sequence() {
        let mut bus = MockExgBus::new();
        let probe = bus.probe();
        bus.initialize().await.expect("probe succeeds");
        assert_eq!(
            probe.commands(),
            vec![DeviceCommand::Reset, DeviceCommand::StopReadContinuous]
        );
    }

    #[tokio::test]
    async fn scripted_probe_failures_run_out() {
        let mut bus = MockExgBus::new().fail_initialize(1);
        assert!(matches!(
            bus.initialize().await,
            Err(BfpError::DeviceNotReady(_))
        ));
        bus.initialize().await.expect("second probe succeeds");
    }

    #[tokio::test]
    async fn reads_require_initialization() {
        let mut bus = MockExgBus::new();
        let mut frame = [0u8; FRAME_LEN];
        assert!(matches!(
            bus.read_frame(&mut frame).await,
            Err(BfpError::DeviceNotReady(_))
        ));
    }

    #[tokio::test]
    async fn frames_decode_to_plausible_samples() {
        let mut bus = MockExgBus::new();
        bus.initialize().await.expect("probe succeeds");

        let mut frame = [0u8; FRAME_LEN];
        let read = bus.read_frame(&mut frame).await.expect("read succeeds");
        assert_eq!(read, FRAME_LEN);

        let sample = sample_from_frame(&frame, 0).expect("full frame");
        assert_eq!(sample.status[0], 0xC0);
        for channel in 0..FRAME_CHANNELS {
            let value = sample.channel_value(channel).expect("in range");
            assert!(value.abs() < 10_000, "channel {channel} value {value}");
        }
    }

    #[tokio::test]
    async fn short_reads_are_scripted_once() {
        let mut bus = MockExgBus::new().short_reads(1);
        bus.initialize().await.expect("probe succeeds");

        let mut frame = [0u8; FRAME_LEN];
        assert_eq!(
            bus.read_frame(&mut frame).await.expect("read succeeds"),
            FRAME_LEN - 1
        );
        assert_eq!(
            bus.read_frame(&mut frame).await.expect("read succeeds"),
            FRAME_LEN
        );
    }

    #[tokio::test]
    async fn read_gate_holds_the_transaction() {
        let gate = Arc::new(Semaphore::new(0));
        let mut bus = MockExgBus::new().with_read_gate(Arc::clone(&gate));
        bus.initialize().await.expect("probe succeeds");

        let mut frame = [0u8; FRAME_LEN];
        let gated = tokio::time::timeout(
            Duration::from_millis(20),
            bus.read_frame(&mut frame),
        )
        .await;
        assert!(gated.is_err(), "read should park on the gate");

        gate.add_permits(1);
        let read = bus.read_frame(&mut frame).await.expect("read succeeds");
        assert_eq!(read, FRAME_LEN);
    }
}

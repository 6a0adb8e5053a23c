//! Event types flowing through the pipeline.
//!
//! Every producer (the EXG front-end, auxiliary sensors) wraps its samples in
//! an [`Event`] before publishing. Events are small, fixed-maximum-size values
//! that are moved through bounded channels; nothing downstream ever needs to
//! reach back into driver-owned memory.

use serde::{Deserialize, Serialize};

use crate::acquisition::frame;

/// Classification tag carried by every event.
///
/// `Unknown` is the default tag: an event whose producer never set one
/// classifies as unknown downstream and is persisted anyway. `Audio` is part
/// of the taxonomy but no front-end in this crate produces it yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Untagged event; logged with a warning but still persisted.
    #[default]
    Unknown,
    /// Biopotential sample frame from the EXG front-end.
    ExgData,
    /// Reading from an auxiliary sensor.
    AuxData,
    /// Audio chunk from the codec front-end.
    Audio,
}

/// Scheduling hint attached to events. The pipeline currently routes all
/// priorities identically; the tag is persisted for downstream tooling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Background telemetry.
    Low,
    /// Normal sample data.
    #[default]
    Normal,
    /// Events that downstream tooling should surface first.
    High,
}

/// One EXG hardware frame: status word plus eight 24-bit channel words.
///
/// # Fields
/// * `status` - Three status bytes leading the frame
/// * `channels` - Eight channels of 24-bit big-endian samples
/// * `sequence` - Controller-assigned frame number, per session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExgSample {
    /// Three status bytes leading the frame.
    pub status: [u8; 3],
    /// Eight channels of 24-bit big-endian samples.
    pub channels: [[u8; 3]; frame::FRAME_CHANNELS],
    /// Controller-assigned frame number, per session.
    pub sequence: u32,
}

impl ExgSample {
    /// Sign-extended value of one channel, `None` for an out-of-range index.
    pub fn channel_value(&self, index: usize) -> Option<i32> {
        self.channels.get(index).map(|raw| frame::sign_extend_24(*raw))
    }
}

/// Which auxiliary sensor produced a reading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuxSource {
    /// Barometric/differential pressure sensor.
    Pressure,
    /// Skin/board temperature sensor.
    Temperature,
    /// Ambient light sensor.
    AmbientLight,
    /// Battery fuel gauge.
    Battery,
}

/// Raw reading from an auxiliary sensor. Values are kept in device units;
/// conversion happens offline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxReading {
    /// Sensor that produced the reading.
    pub source: AuxSource,
    /// Raw device-unit value.
    pub raw: i32,
}

/// Payload variants an event can carry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// No payload; markers and untagged events.
    None,
    /// EXG frame.
    Exg(ExgSample),
    /// Auxiliary sensor reading.
    Aux(AuxReading),
}

/// Tagged record moved through the pipeline and persisted to log files.
///
/// # Fields
/// * `event_type` - Classification tag, `Unknown` when never set
/// * `priority` - Scheduling hint, `Normal` by default
/// * `timestamp_us` - Monotonic microseconds from the pipeline clock
/// * `payload` - The sample data itself
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Classification tag.
    pub event_type: EventType,
    /// Scheduling hint.
    pub priority: Priority,
    /// Monotonic microseconds from the pipeline clock.
    pub timestamp_us: u64,
    /// The sample data itself.
    pub payload: EventPayload,
}

impl Event {
    /// Builds an event with explicit tag and priority.
    pub fn new(
        event_type: EventType,
        priority: Priority,
        timestamp_us: u64,
        payload: EventPayload,
    ) -> Self {
        Self {
            event_type,
            priority,
            timestamp_us,
            payload,
        }
    }

    /// Wraps an EXG frame as a normal-priority `ExgData` event.
    pub fn exg(timestamp_us: u64, sample: ExgSample) -> Self {
        Self::new(
            EventType::ExgData,
            Priority::Normal,
            timestamp_us,
            EventPayload::Exg(sample),
        )
    }

    /// Wraps an auxiliary reading as a normal-priority `AuxData` event.
    pub fn aux(timestamp_us: u64, reading: AuxReading) -> Self {
        Self::new(
            EventType::AuxData,
            Priority::Normal,
            timestamp_us,
            EventPayload::Aux(reading),
        )
    }

    /// An untagged, payload-free event.
    pub fn unknown(timestamp_us: u64) -> Self {
        Self::new(
            EventType::Unknown,
            Priority::Normal,
            timestamp_us,
            EventPayload::None,
        )
    }
}

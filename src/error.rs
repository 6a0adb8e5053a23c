//! Custom error types for the logger core.
//!
//! This module defines the primary error type, `BfpError`, for the entire crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to
//! handle the failure classes of the pipeline, from configuration and I/O issues
//! to acquisition and storage problems.
//!
//! ## Error Hierarchy
//!
//! `BfpError` is an enum that consolidates various error sources:
//!
//! - **`Config`**: Wraps errors from the `config` crate, typically file parsing
//!   or format issues in the configuration files.
//! - **`Configuration`**: Semantic errors in the configuration, such as values
//!   that parse but are logically invalid (a zero channel capacity, an
//!   unsupported sample rate). Out-of-range values are rejected here, never
//!   silently clamped.
//! - **`Io`**: Wraps standard `std::io::Error`.
//! - **`DeviceNotReady`** / **`Bus`**: Acquisition front-end failures, from
//!   initialization through individual sample-frame transactions.
//! - **`PoolExhausted`** / **`ChannelFull`**: Backpressure conditions. Both are
//!   expected during overload; callers log and drop rather than block.
//! - **`MountFailed`** / **`WriteFailed`** / **`ShortWrite`**: Storage failures.
//!   Only `MountFailed` is fatal for the storage stage.
//! - **`Codec`** / **`Framing`** / **`Volume`**: Wrapped collaborator errors.
//!
//! By using `#[from]`, `BfpError` can be seamlessly created from underlying
//! error types, simplifying error handling throughout the crate with the `?`
//! operator.

use thiserror::Error;

use crate::codec::CodecError;
use crate::storage::framing::FramingError;
use crate::storage::volume::VolumeError;

/// Convenience alias for results using the crate error type.
pub type BfpResult<T> = std::result::Result<T, BfpError>;

/// Unified error type for the logger pipeline.
#[derive(Error, Debug)]
pub enum BfpError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("EXG front-end not ready: {0}")]
    DeviceNotReady(String),

    #[error("Bus transaction failed: {0}")]
    Bus(String),

    #[error("Buffer pool exhausted")]
    PoolExhausted,

    #[error("Channel '{channel}' is full")]
    ChannelFull {
        /// Name of the channel that rejected the event.
        channel: &'static str,
    },

    #[error("Channel '{channel}' is closed")]
    ChannelClosed {
        /// Name of the channel whose peer is gone.
        channel: &'static str,
    },

    #[error("Acquisition controller is {found}, expected {expected}")]
    AcquisitionState {
        /// State required for the requested transition.
        expected: &'static str,
        /// State the controller was actually in.
        found: &'static str,
    },

    #[error("Volume mount failed after format-and-retry: {0}")]
    MountFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes the backend reported written.
        written: usize,
        /// Bytes that were submitted.
        expected: usize,
    },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("Volume error: {0}")]
    Volume(#[from] VolumeError),

    #[error("Pipeline shutdown failed: {0}")]
    Shutdown(String),
}

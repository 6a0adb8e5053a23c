//! # BFP Logger Core Library
//!
//! This crate is the core of the `bfp-logger` wearable data recorder. It
//! covers the full path from the EXG analog front-end to framed records on a
//! removable volume: triggered frame acquisition, auxiliary sensor polling,
//! event classification, and session-scoped log file storage. Organizing the
//! project as a library keeps the same pipeline usable from the demo binary
//! (`main.rs`), integration tests, and host-side tooling.
//!
//! ## Crate Structure
//!
//! The library is organized into several modules, each with a distinct
//! responsibility:
//!
//! - **`acquisition`**: The EXG front-end: the `SampleBus` device trait, the
//!   data-ready trigger line, settle-time tables, frame parsing, and the
//!   `ExgController` that owns the sampling worker.
//! - **`channel`**: Bounded event channels with drop-new overflow accounting,
//!   connecting the pipeline stages.
//! - **`clock`**: The `Clock` trait and the monotonic and manual timestamp
//!   sources.
//! - **`codec`**: The `EventCodec` trait and the `bincode`-backed record
//!   codec.
//! - **`config`**: Defines the structures for loading and validating
//!   application configuration from TOML files. See `config::Settings`.
//! - **`error`**: Defines the custom `BfpError` enum for centralized error
//!   handling across the crate.
//! - **`event`**: The `Event` envelope and its EXG and auxiliary payloads.
//! - **`identity`**: Boot and device identifiers recorded with every
//!   session.
//! - **`pipeline`**: Assembles channels, stages, and the front-end into a
//!   running pipeline and tears it down in order.
//! - **`pool`**: Fixed pool of pre-allocated frame buffers loaned to the
//!   acquisition worker.
//! - **`processing`**: The classification stage between ingest and storage.
//! - **`sensors`**: The `AuxSensor` trait and the periodic sampler that
//!   polls pressure, temperature, light, and battery readings.
//! - **`storage`**: Volume backends, record framing, recording sessions,
//!   and the storage stage that persists the event stream.

pub mod acquisition;
pub mod channel;
pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod pipeline;
pub mod pool;
pub mod processing;
pub mod sensors;
pub mod storage;

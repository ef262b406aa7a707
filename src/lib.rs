//! # LCLS1 BSA Bridge for the LCLS2 MPS Link Node
//!
//! The link-node firmware forwards LCLS1 Beam Synchronous Acquisition data
//! as a stream of fixed 148-byte frames. This crate reads that stream on a
//! dedicated thread, corrects the timestamp and archives the 24 data words
//! of every frame under the names `<prefix>:LC1_BSA_00` .. `<prefix>:LC1_BSA_23`.
//!
//! ## Crate Structure
//!
//! - **`frame`**: wire layout of a stream frame and its decoder.
//! - **`timestamp`**: timestamp word-order correction.
//! - **`registry`**: channel names and their archiving handles.
//! - **`archive`**: `ChannelRegistrar` / `Archiver` seam plus memory, CSV
//!   and log backends.
//! - **`source`**: `FrameSource` trait with UDP, file-replay and in-process
//!   implementations.
//! - **`control`**: per-instance enable/debug flags and frame counter.
//! - **`acquisition`**: the acquisition thread (`BsaStream`).
//! - **`console`**: iocsh-style operator commands.
//! - **`config`**: Figment-based configuration.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: `BsaError` and `FrameError`.

pub mod acquisition;
pub mod archive;
pub mod config;
pub mod console;
pub mod control;
pub mod error;
pub mod frame;
pub mod logging;
pub mod registry;
pub mod source;
pub mod timestamp;

pub use acquisition::{AcquisitionState, AcquisitionStats, BsaStream, StreamConfig};
pub use archive::{
    Archiver, ChannelHandle, ChannelRegistrar, CsvArchive, LogArchive, MemoryArchive, Sample,
};
pub use console::{Console, DefaultStreamFactory, StreamFactory};
pub use control::ControlHandle;
pub use error::{BsaError, FrameError, Result};
pub use frame::{StreamFrame, FRAME_SIZE};
pub use source::{open_source, ChannelFrameSource, FrameFeeder, FrameSource};
pub use timestamp::{BsaTimestamp, TimestampPolicy};

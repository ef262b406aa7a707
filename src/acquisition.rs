//! Continuous acquisition of the LCLS1 BSA stream.
//!
//! A [`BsaStream`] owns one dedicated thread that repeatedly reads a frame
//! from its [`FrameSource`], validates the size, corrects the timestamp and
//! hands one [`Sample`] per channel to the [`Archiver`].
//!
//! ```text
//!   FrameSource ──read(timeout)──► size check ──► decode ──► TimestampPolicy
//!                                                                │
//!                          ChannelRegistry[0..24] ◄──────────────┘
//!                                    │
//!                                    ▼
//!                           Archiver::store_sample
//! ```
//!
//! # Loop contract
//!
//! - A read that returns `0` bytes is a timeout and is retried silently.
//! - While disabled, frames are still read (so the firmware is never
//!   back-pressured) and then discarded. Discarded frames do not advance
//!   the frame counter.
//! - Frames of the wrong size are reported and dropped; they neither advance
//!   the counter nor produce samples.
//! - Transport and archive errors are logged and counted; they never end
//!   the loop.
//! - [`BsaStream::stop`] returns within one read timeout. No sample is
//!   dispatched once the stop request has been observed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use l2mps_bsa::{open_source, BsaStream, MemoryArchive, StreamConfig};
//!
//! # fn example() -> l2mps_bsa::Result<()> {
//! let config = StreamConfig::builder()
//!     .stream_name("udp://0.0.0.0:8198")
//!     .record_prefix("MPLN:LI21:MP01")
//!     .build()?;
//!
//! let archive = Arc::new(MemoryArchive::new());
//! let source = open_source(&config.stream_name)?;
//! let stream = BsaStream::start(config, source, archive.as_ref(), archive.clone())?;
//!
//! stream.control().set_debug(true);
//! println!("frames: {}", stream.control().frame_counter());
//!
//! stream.stop();
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, info_span, warn};

use crate::archive::{Archiver, ChannelRegistrar, Sample};
use crate::control::ControlHandle;
use crate::error::{BsaError, FrameError, Result};
use crate::frame::{self, FrameDump, StreamFrame, FRAME_SIZE, WORD_SIZE};
use crate::registry::ChannelRegistry;
use crate::source::FrameSource;
use crate::timestamp::TimestampPolicy;

/// Default blocking-read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default number of accepted frames between debug dumps.
pub const DEFAULT_DEBUG_INTERVAL: u64 = 360;

/// Name given to the acquisition thread.
pub const THREAD_NAME: &str = "L2MpsLcls1Bsa";

// One word of headroom so oversized frames show up as a size mismatch
// instead of being silently truncated to a valid length.
const READ_BUFFER_SIZE: usize = FRAME_SIZE + WORD_SIZE;

/// Configuration of one BSA stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Stream identity, e.g. `udp://0.0.0.0:8198`
    pub stream_name: String,
    /// Prefix of the archived channel names
    pub record_prefix: String,
    /// Blocking-read timeout; also bounds shutdown latency
    pub read_timeout: Duration,
    /// Accepted frames between debug dumps
    pub debug_interval: u64,
    /// Timestamp word-order policy
    pub timestamp_policy: TimestampPolicy,
    /// Initial value of the enable flag
    pub enabled: bool,
    /// Initial value of the debug flag
    pub debug: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            record_prefix: String::new(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            debug_interval: DEFAULT_DEBUG_INTERVAL,
            timestamp_policy: TimestampPolicy::default(),
            enabled: true,
            debug: false,
        }
    }
}

impl StreamConfig {
    /// Create a new builder for stream configuration.
    pub fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.stream_name.is_empty() {
            return Err(BsaError::EmptyStreamName);
        }

        if self.record_prefix.is_empty() {
            return Err(BsaError::EmptyRecordPrefix);
        }

        if self.read_timeout.is_zero() {
            return Err(BsaError::invalid_config("Read timeout must be greater than 0"));
        }

        if self.debug_interval == 0 {
            return Err(BsaError::invalid_config(
                "Debug interval must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Builder for [`StreamConfig`].
#[derive(Debug, Default)]
pub struct StreamConfigBuilder {
    config: StreamConfig,
}

impl StreamConfigBuilder {
    /// Set the stream identity.
    pub fn stream_name(mut self, name: impl Into<String>) -> Self {
        self.config.stream_name = name.into();
        self
    }

    /// Set the record prefix.
    pub fn record_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.record_prefix = prefix.into();
        self
    }

    /// Set the blocking-read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the number of accepted frames between debug dumps.
    pub fn debug_interval(mut self, interval: u64) -> Self {
        self.config.debug_interval = interval;
        self
    }

    /// Set the timestamp word-order policy.
    pub fn timestamp_policy(mut self, policy: TimestampPolicy) -> Self {
        self.config.timestamp_policy = policy;
        self
    }

    /// Set the initial enable flag.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the initial debug flag.
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<StreamConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Lifecycle state of the acquisition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    /// The thread is polling the stream
    Running,
    /// The thread has exited; terminal
    Stopped,
}

/// Snapshot of acquisition counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    /// Frames that passed the size check (the frame counter)
    pub frames_accepted: u64,
    /// Frames read while disabled
    pub frames_discarded: u64,
    /// Reads that timed out
    pub timeouts: u64,
    /// Reads that failed
    pub read_errors: u64,
    /// Reads of the wrong size
    pub size_mismatches: u64,
    /// Samples accepted by the archiver
    pub samples_stored: u64,
    /// Samples the archiver rejected
    pub store_errors: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    frames_discarded: AtomicU64,
    timeouts: AtomicU64,
    read_errors: AtomicU64,
    size_mismatches: AtomicU64,
    samples_stored: AtomicU64,
    store_errors: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Marks the loop as stopped when the thread leaves `run`, including by panic.
struct ExitGuard(Arc<AtomicBool>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// State moved into the acquisition thread.
struct AcquisitionLoop {
    stream_name: String,
    source: Box<dyn FrameSource>,
    registry: ChannelRegistry,
    archiver: Arc<dyn Archiver>,
    control: ControlHandle,
    stats: Arc<StatsCounters>,
    stop: Arc<AtomicBool>,
    read_timeout: Duration,
    debug_interval: u64,
    policy: TimestampPolicy,
    buf: Vec<u8>,
}

impl AcquisitionLoop {
    fn run(mut self) {
        let span = info_span!("bsa_stream", stream = %self.stream_name);
        let _enter = span.enter();
        debug!("Acquisition thread started");

        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }

            // A source reporting more than the buffer holds is treated as oversized
            let got = match self.source.read(&mut self.buf, self.read_timeout) {
                Ok(got) => got.min(self.buf.len()),
                Err(e) => {
                    StatsCounters::bump(&self.stats.read_errors);
                    warn!("Stream read failed: {}", e);
                    thread::sleep(self.read_timeout);
                    continue;
                }
            };

            if self.stop.load(Ordering::SeqCst) {
                break;
            }

            if got == 0 {
                StatsCounters::bump(&self.stats.timeouts);
                continue;
            }

            // Still read while disabled so the firmware is never back-pressured
            if !self.control.is_enabled() {
                StatsCounters::bump(&self.stats.frames_discarded);
                continue;
            }

            match frame::decode(&self.buf[..got]) {
                Ok(frame) => self.process(&frame),
                Err(e @ FrameError::SizeMismatch { .. }) => {
                    StatsCounters::bump(&self.stats.size_mismatches);
                    error!("LCLS1 BSA Stream: {}", e);
                }
            }
        }

        debug!("Acquisition thread exiting");
    }

    fn process(&self, frame: &StreamFrame) {
        let counter = self.control.increment_counter();
        let timestamp = self
            .policy
            .correct(frame.timestamp_high, frame.timestamp_low);

        for ch in self.registry.channels() {
            let Some(value) = frame.value(ch.index) else {
                continue;
            };
            let sample = Sample::new(ch.handle, timestamp, value);
            match self.archiver.store_sample(&sample) {
                Ok(()) => StatsCounters::bump(&self.stats.samples_stored),
                Err(e) => {
                    StatsCounters::bump(&self.stats.store_errors);
                    debug!(channel = %ch.name, "Failed to store sample: {}", e);
                }
            }
        }

        if self.control.is_debug() && counter % self.debug_interval == 0 {
            let dump = FrameDump {
                frame,
                timestamp,
                counter,
            };
            info!(target: "l2mps_bsa::dump", stream = %self.stream_name, "\n{}", dump);
        }
    }
}

/// A running LCLS1 BSA stream acquisition.
///
/// Dropping the stream stops it.
pub struct BsaStream {
    config: StreamConfig,
    control: ControlHandle,
    stats: Arc<StatsCounters>,
    stop: Arc<AtomicBool>,
    exited: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BsaStream {
    /// Register the channels and start the acquisition thread.
    ///
    /// The channel registry is complete before the thread is spawned. On any
    /// error no thread is started.
    pub fn start(
        config: StreamConfig,
        source: Box<dyn FrameSource>,
        registrar: &dyn ChannelRegistrar,
        archiver: Arc<dyn Archiver>,
    ) -> Result<Self> {
        config.validate()?;

        let registry =
            ChannelRegistry::register(&config.stream_name, &config.record_prefix, registrar)?;

        let control = ControlHandle::new(config.enabled, config.debug);
        let stats = Arc::new(StatsCounters::default());
        let stop = Arc::new(AtomicBool::new(false));
        let exited = Arc::new(AtomicBool::new(false));

        let acquisition = AcquisitionLoop {
            stream_name: config.stream_name.clone(),
            source,
            registry,
            archiver,
            control: control.clone(),
            stats: Arc::clone(&stats),
            stop: Arc::clone(&stop),
            read_timeout: config.read_timeout,
            debug_interval: config.debug_interval,
            policy: config.timestamp_policy,
            buf: vec![0u8; READ_BUFFER_SIZE],
        };

        let guard = ExitGuard(Arc::clone(&exited));
        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let _guard = guard;
                acquisition.run();
            })
            .map_err(BsaError::Spawn)?;

        info!(
            stream = %config.stream_name,
            prefix = %config.record_prefix,
            timeout_ms = config.read_timeout.as_millis() as u64,
            "Started LCLS1 BSA stream"
        );

        Ok(Self {
            config,
            control,
            stats,
            stop,
            exited,
            thread: Mutex::new(Some(handle)),
        })
    }

    /// Request the loop to stop and wait for the thread to exit.
    ///
    /// The loop checks the stop request once per read, so this returns
    /// within one read timeout. Calling it again is a no-op.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);

        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        if let Err(e) = handle.join() {
            error!("Acquisition thread panicked: {:?}", e);
        }

        let stats = self.stats();
        info!(
            stream = %self.config.stream_name,
            frames = stats.frames_accepted,
            discarded = stats.frames_discarded,
            size_mismatches = stats.size_mismatches,
            "Stopped LCLS1 BSA stream"
        );
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AcquisitionState {
        if self.exited.load(Ordering::SeqCst) {
            AcquisitionState::Stopped
        } else {
            AcquisitionState::Running
        }
    }

    /// Handle to the enable/debug flags and frame counter.
    pub fn control(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Stream identity.
    pub fn stream_name(&self) -> &str {
        &self.config.stream_name
    }

    /// Record prefix of the archived channels.
    pub fn record_prefix(&self) -> &str {
        &self.config.record_prefix
    }

    /// Configuration the stream was started with.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Get current statistics.
    pub fn stats(&self) -> AcquisitionStats {
        let s = &self.stats;
        AcquisitionStats {
            frames_accepted: self.control.frame_counter(),
            frames_discarded: s.frames_discarded.load(Ordering::Relaxed),
            timeouts: s.timeouts.load(Ordering::Relaxed),
            read_errors: s.read_errors.load(Ordering::Relaxed),
            size_mismatches: s.size_mismatches.load(Ordering::Relaxed),
            samples_stored: s.samples_stored.load(Ordering::Relaxed),
            store_errors: s.store_errors.load(Ordering::Relaxed),
        }
    }
}

impl Drop for BsaStream {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = StreamConfig::builder()
            .stream_name("udp://127.0.0.1:0")
            .record_prefix("P")
            .build()
            .unwrap();
        assert_eq!(config.read_timeout, DEFAULT_READ_TIMEOUT);
        assert_eq!(config.debug_interval, 360);
        assert_eq!(config.timestamp_policy, TimestampPolicy::SwappedWords);
        assert!(config.enabled);
        assert!(!config.debug);
    }

    #[test]
    fn test_builder_rejects_empty_names() {
        assert!(matches!(
            StreamConfig::builder().record_prefix("P").build(),
            Err(BsaError::EmptyStreamName)
        ));
        assert!(matches!(
            StreamConfig::builder().stream_name("s").build(),
            Err(BsaError::EmptyRecordPrefix)
        ));
    }

    #[test]
    fn test_builder_rejects_zero_timeout_and_interval() {
        let base = || StreamConfig::builder().stream_name("s").record_prefix("P");
        assert!(base().read_timeout(Duration::ZERO).build().is_err());
        assert!(base().debug_interval(0).build().is_err());
    }

    #[test]
    fn test_read_buffer_has_headroom() {
        assert!(READ_BUFFER_SIZE > FRAME_SIZE);
    }
}

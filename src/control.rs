//! Shared control state of one acquisition instance.
//!
//! The control surface writes the `enabled` and `debug` flags; the
//! acquisition thread reads them once per iteration and is the only writer
//! of the frame counter. Each field is an independent atomic; nothing relies
//! on two of them changing together.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct ControlState {
    enabled: AtomicBool,
    debug: AtomicBool,
    frame_counter: AtomicU64,
}

/// Cloneable handle to an instance's enable/debug flags and frame counter.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    state: Arc<ControlState>,
}

impl Default for ControlHandle {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ControlHandle {
    /// Create a handle with the given initial flags and a zero counter.
    pub fn new(enabled: bool, debug: bool) -> Self {
        Self {
            state: Arc::new(ControlState {
                enabled: AtomicBool::new(enabled),
                debug: AtomicBool::new(debug),
                frame_counter: AtomicU64::new(0),
            }),
        }
    }

    /// Enable or disable sample processing.
    pub fn set_enabled(&self, enabled: bool) {
        self.state.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether sample processing is enabled.
    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::Relaxed)
    }

    /// Enable or disable the periodic debug dump.
    pub fn set_debug(&self, debug: bool) {
        self.state.debug.store(debug, Ordering::Relaxed);
    }

    /// Whether the periodic debug dump is enabled.
    pub fn is_debug(&self) -> bool {
        self.state.debug.load(Ordering::Relaxed)
    }

    /// Number of frames that passed the size check.
    pub fn frame_counter(&self) -> u64 {
        self.state.frame_counter.load(Ordering::Relaxed)
    }

    /// Count an accepted frame and return the new counter value.
    pub(crate) fn increment_counter(&self) -> u64 {
        self.state
            .frame_counter
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
    }
}
